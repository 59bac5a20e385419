use std::{future::Future, sync::Arc};

use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::{
    array::DataArray,
    compute::Executor,
    errors::{Error, Result},
    mapper::Mapper,
    materialized::Materialized,
    progress::{NoProgress, Progress},
    resolver::Resolver,
};

/// Worker pool settings
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Number of worker threads, which is also the most chunk reads in flight at once
    pub workers: usize,

    /// Size limit, in bytes, for the LRU cache of loaded chunks
    pub cache_bytes: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cache_bytes: 256 * 1024 * 1024,
        }
    }
}

/// A local pool of workers that deferred computations are submitted to.
///
/// Computation is blocking from the caller's point of view: `compute` returns once the whole
/// graph has been evaluated on the pool. Must not be called from within an async context.
///
pub struct Cluster {
    config: ClusterConfig,
    runtime: Runtime,
}

impl Cluster {
    /// Start the worker pool
    ///
    pub fn provision(config: ClusterConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::Provision(String::from(
                "at least one worker is required",
            )));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.workers)
            .thread_name("ensemble-worker")
            .enable_all()
            .build()
            .map_err(|err| Error::Provision(err.to_string()))?;
        info!(
            workers = config.workers,
            cache_bytes = config.cache_bytes,
            "provisioned worker pool"
        );

        Ok(Self { config, runtime })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Run a future to completion on the pool, blocking the caller
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// A resolver over `mapper` with this cluster's cache size
    pub fn connect(&self, mapper: Box<dyn Mapper>) -> Arc<Resolver> {
        Arc::new(Resolver::new(mapper, self.config.cache_bytes))
    }

    /// Evaluate `array` and everything it depends on
    pub fn compute(&self, array: &DataArray) -> Result<Materialized> {
        self.compute_with_progress(array, &NoProgress)
    }

    pub fn compute_with_progress(
        &self,
        array: &DataArray,
        progress: &dyn Progress,
    ) -> Result<Materialized> {
        let executor = Executor::new(self.config.workers, progress);
        let result = self.block_on(executor.run(array))?;
        info!(array = %array.name(), shape = ?result.shape(), "computed");

        Ok(result)
    }
}
