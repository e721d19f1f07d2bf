use anyhow::{anyhow, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::alignment_tools::SimilarityOracle;
use crate::models::{BatchResult, BatchStatus};
use crate::screening::batching::Batch;

/// Per-status tally of a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub success: usize,
    pub timeout: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut counts = StatusCounts::default();
        for result in results {
            match result.status {
                BatchStatus::Success => counts.success += 1,
                BatchStatus::Timeout => counts.timeout += 1,
                BatchStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn failed(&self) -> usize {
        self.timeout + self.error
    }
}

/// Runs every batch through `oracle` on a pool of `workers` threads.
///
/// Blocks until all batches have finished or timed out. The returned vector
/// holds one result per batch, in batch-number order.
pub fn run_batches<O: SimilarityOracle + ?Sized>(
    oracle: &O,
    batches: &[Batch],
    workers: usize,
) -> Result<Vec<BatchResult>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("batch-worker-{}", i))
        .build()
        .map_err(|err| anyhow!("failed to initialize rayon thread pool: {err}"))?;

    let effective_parallelism = batches.len().min(workers);
    info!(
        batches = batches.len(),
        workers,
        effective_parallelism,
        engine = oracle.name(),
        "Starting batch search"
    );

    let results: Vec<BatchResult> = pool.install(|| {
        batches
            .par_iter()
            .with_max_len(1)
            .map(|batch| oracle.run(batch))
            .collect()
    });

    let counts = StatusCounts::from_results(&results);
    info!(
        success = counts.success,
        timeout = counts.timeout,
        error = counts.error,
        "Batch search finished"
    );
    if counts.failed() > 0 {
        warn!("{} of {} batches returned no data", counts.failed(), results.len());
    }
    Ok(results)
}
