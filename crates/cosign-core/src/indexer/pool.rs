//! Bounded fan-out/fan-in worker pool shared by every pipeline stage.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::clamp_workers;
use crate::errors::CosignResult;

/// Outcome of one completed stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageStats {
    pub stage: &'static str,
    pub units: usize,
    pub elapsed_ms: u64,
}

/// At most `workers` units run at once; `run` returns only after every
/// admitted unit has finished.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = clamp_workers(workers);
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cosign-worker-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Falling back to sequential units, thread pool failed: {e}");
                None
            }
        };
        Self { pool, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `unit` once per item. The first failing unit stops admission of
    /// further units and its error is returned once in-flight units drain.
    pub fn run<T, F>(&self, stage: &'static str, items: &[T], unit: F) -> CosignResult<StageStats>
    where
        T: Sync,
        F: Fn(&T) -> CosignResult<()> + Sync + Send,
    {
        let started = Instant::now();
        info!(
            "{stage}: dispatching {} units across {} workers",
            items.len(),
            self.workers
        );

        match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().try_for_each(&unit))?,
            None => items.iter().try_for_each(&unit)?,
        }

        let stats = StageStats {
            stage,
            units: items.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!("{stage}: {} units done in {} ms", stats.units, stats.elapsed_ms);
        Ok(stats)
    }
}
