//! Leases on pooled upstream clients.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics;

/// One generation of an upstream client.
///
/// Connections opened by a generation live inside its client; dropping the
/// last reference to the generation closes them.
#[derive(Debug)]
pub struct Generation<C> {
    pub(crate) id: u64,
    pub(crate) created: Instant,
    pub(crate) client: C,
}

impl<C> Generation<C> {
    pub(crate) fn new(id: u64, client: C) -> Self {
        Self {
            id,
            created: Instant::now(),
            client,
        }
    }
}

/// Temporary ownership of pooled capacity for one call.
///
/// Holds a capacity permit and pins the client generation it was issued
/// from. Dropping the lease (completion, error, or the owning stream being
/// dropped on client disconnect) returns the capacity.
#[derive(Debug)]
pub struct Lease<C> {
    pool: Arc<str>,
    generation: Arc<Generation<C>>,
    outstanding: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl<C> Lease<C> {
    pub(crate) fn new(
        pool: Arc<str>,
        generation: Arc<Generation<C>>,
        outstanding: Arc<AtomicUsize>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_pool_leases(&pool, now);
        Self {
            pool,
            generation,
            outstanding,
            _permit: permit,
        }
    }

    /// Generation this lease was issued from.
    pub fn generation(&self) -> u64 {
        self.generation.id
    }
}

impl<C> Deref for Lease<C> {
    type Target = C;
    fn deref(&self) -> &Self::Target {
        &self.generation.client
    }
}

impl<C> Drop for Lease<C> {
    fn drop(&mut self) {
        let now = self.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_pool_leases(&self.pool, now);
        tracing::trace!(pool = %self.pool, outstanding = now, "Lease released");
    }
}
