//! Process-wide registry of rayon thread pools.
//!
//! Plans asking for the same thread count share one pool. The registry keeps
//! a pool alive while any plan holds it; [`Registry::teardown`] releases the
//! idle ones.

use alloc::format;
use alloc::sync::Arc;
use std::sync::{Mutex, OnceLock};

use hashbrown::HashMap;
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::NufftError;

pub struct Registry {
    pools: Mutex<HashMap<usize, Arc<ThreadPool>>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// The process-wide registry, created on first use.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| Registry {
            pools: Mutex::new(HashMap::new()),
        })
    }

    /// Shared pool with exactly `threads` workers (at least one).
    pub fn acquire(&self, threads: usize) -> Result<Arc<ThreadPool>, NufftError> {
        let threads = threads.max(1);
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| NufftError::internal("thread pool registry poisoned"))?;
        if let Some(pool) = pools.get(&threads) {
            return Ok(Arc::clone(pool));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("nufft-worker-{}", i))
            .build()
            .map_err(|e| NufftError::ResourceExhausted(format!("cannot start thread pool: {}", e)))?;
        debug!("started {}-thread pool", threads);
        let pool = Arc::new(pool);
        pools.insert(threads, Arc::clone(&pool));
        Ok(pool)
    }

    /// Drop pools no plan references any more. Returns how many were released.
    pub fn teardown(&self) -> usize {
        let Ok(mut pools) = self.pools.lock() else {
            return 0;
        };
        let before = pools.len();
        pools.retain(|_, pool| Arc::strong_count(pool) > 1);
        let released = before - pools.len();
        if released > 0 {
            debug!("released {} idle thread pool(s)", released);
        }
        released
    }

    /// Number of pools currently registered.
    pub fn len(&self) -> usize {
        self.pools.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
