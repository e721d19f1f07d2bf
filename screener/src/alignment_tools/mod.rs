pub mod blastn_integration;

use crate::models::BatchResult;
use crate::screening::batching::Batch;

/// A batch similarity search engine.
///
/// Implementations must never panic or return early on engine failure: a
/// failed search is reported through [`BatchResult::status`] so the scheduler
/// can keep going with the other batches.
pub trait SimilarityOracle: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, batch: &Batch) -> BatchResult;
}
