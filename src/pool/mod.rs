//! Outbound connection pool management.
//!
//! # Data Flow
//! ```text
//! Relay call
//!     → ConnectionPool::acquire (wait ≤ pending_acquire_timeout for capacity)
//!     → Lease (permit + pinned client generation)
//!     → upstream call through the leased client
//!     → Lease dropped → capacity returned
//!
//! Background sweep (every evict_interval):
//!     generation older than max_lifetime → swap in a fresh client
//!     → old connections close once their last lease is gone
//! ```
//!
//! # Design Decisions
//! - The underlying HTTP clients own their sockets and idle eviction;
//!   this layer bounds concurrency and recycles whole client generations
//! - No two concurrent calls share one lease; leases are not `Clone`
//! - Acquire never blocks forever: pending callers give up with `Exhausted`

pub mod clients;
pub mod lease;

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;

pub use clients::{backend_client, chat_client, BackendClient, ChatHttpClient};
pub use lease::Lease;

/// Errors raised while leasing from a pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("pool '{pool}' exhausted: no connection freed within {waited:?}")]
    Exhausted { pool: String, waited: Duration },

    #[error("pool '{0}' is closed")]
    Closed(String),

    #[error("failed to build client for pool '{pool}': {message}")]
    Build { pool: String, message: String },
}

type ClientFactory<C> = Box<dyn Fn(&PoolConfig) -> Result<C, String> + Send + Sync>;

/// Bounded pool of leases over a recyclable upstream client.
pub struct ConnectionPool<C> {
    name: Arc<str>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    generation: ArcSwap<lease::Generation<C>>,
    next_generation: AtomicU64,
    factory: ClientFactory<C>,
}

/// Point-in-time view of a pool, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub capacity: usize,
    pub outstanding: usize,
    pub available: usize,
    pub generation: u64,
    pub generation_age_secs: u64,
}

impl<C> ConnectionPool<C>
where
    C: Send + Sync + 'static,
{
    /// Build a pool, creating the first client generation eagerly.
    pub fn new<F>(name: &str, config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: Fn(&PoolConfig) -> Result<C, String> + Send + Sync + 'static,
    {
        let client = factory(&config).map_err(|message| PoolError::Build {
            pool: name.to_string(),
            message,
        })?;

        Ok(Self {
            name: Arc::from(name),
            permits: Arc::new(Semaphore::new(config.max_connections)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            generation: ArcSwap::from_pointee(lease::Generation::new(0, client)),
            next_generation: AtomicU64::new(1),
            factory: Box::new(factory),
            config,
        })
    }

    /// Lease capacity, waiting at most `pending_acquire_timeout`.
    pub async fn acquire(&self) -> Result<Lease<C>, PoolError> {
        let waited = self.config.pending_acquire_timeout();
        let permit = match tokio::time::timeout(waited, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed(self.name.to_string())),
            Err(_) => {
                tracing::warn!(pool = %self.name, ?waited, "Pending acquire timed out");
                return Err(PoolError::Exhausted {
                    pool: self.name.to_string(),
                    waited,
                });
            }
        };

        Ok(Lease::new(
            self.name.clone(),
            self.generation.load_full(),
            self.outstanding.clone(),
            permit,
        ))
    }

    /// Number of leases currently held.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Recycle the client generation if it outlived `max_lifetime`.
    ///
    /// Returns true when a new generation was installed.
    pub fn evict(&self) -> bool {
        let current = self.generation.load();
        if current.created.elapsed() < self.config.max_lifetime() {
            return false;
        }

        match (self.factory)(&self.config) {
            Ok(client) => {
                let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
                self.generation
                    .store(Arc::new(lease::Generation::new(id, client)));
                tracing::debug!(pool = %self.name, generation = id, "Client generation recycled");
                true
            }
            Err(message) => {
                tracing::error!(pool = %self.name, error = %message, "Failed to rebuild client, keeping current generation");
                false
            }
        }
    }

    /// Stop issuing leases. Pending and future acquires fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn stats(&self) -> PoolStats {
        let generation = self.generation.load();
        PoolStats {
            name: self.name.to_string(),
            capacity: self.config.max_connections,
            outstanding: self.outstanding(),
            available: self.permits.available_permits(),
            generation: generation.id,
            generation_age_secs: generation.created.elapsed().as_secs(),
        }
    }

    /// Spawn the periodic eviction sweep. Exits on shutdown.
    pub fn spawn_eviction(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.evict_interval());
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.evict();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(pool = %pool.name, "Eviction sweep stopping");
                        pool.close();
                        break;
                    }
                }
            }
        })
    }
}

impl<C> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("capacity", &self.config.max_connections)
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish()
    }
}
