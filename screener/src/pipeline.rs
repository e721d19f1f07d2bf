use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::alignment_tools::SimilarityOracle;
use crate::analysis::result_compiler::ResultCompiler;
use crate::analysis::summary::RunSummary;
use crate::config::ScreenConfig;
use crate::models::{BatchResult, Candidate, CandidateResult};
use crate::screening::batching::partition;
use crate::screening::classifier::HitClassifier;
use crate::screening::dedup::deduplicate;
use crate::screening::scheduler::run_batches;

pub struct ScreenRun {
    pub results: Vec<CandidateResult>,
    pub batch_results: Vec<BatchResult>,
    pub summary: RunSummary,
}

/// Dedup, batch, search, classify and score one pair of strand pools.
pub fn screen_candidates(
    config: &ScreenConfig,
    sense: &[Candidate],
    antisense: &[Candidate],
    oracle: &dyn SimilarityOracle,
) -> Result<ScreenRun> {
    let classifier =
        HitClassifier::new(&config.thresholds).context("invalid on-target gene names")?;

    let unique = deduplicate(sense, antisense);
    if unique.is_empty() {
        warn!("No candidate sequences to screen");
    }
    let batches = partition(&unique.sequences, config.batch_size)?;
    info!(
        "Screening {} unique sequences in {} batches of up to {}",
        unique.len(),
        batches.len(),
        config.batch_size
    );

    let batch_results = run_batches(oracle, &batches, config.workers)?;

    let compiler = ResultCompiler::new(&classifier, config.failure_policy);
    let verdicts = compiler.verdicts(&unique, &batch_results);
    let (results, unpaired) = compiler.compile(sense, antisense, &verdicts);

    let summary = RunSummary::new(&results, &batch_results, unique.len(), unpaired);
    Ok(ScreenRun {
        results,
        batch_results,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchStatus, Orientation};
    use crate::screening::batching::Batch;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Reports an off-target hit for every query whose sequence is listed,
    /// and times out on the listed batch numbers.
    struct TableOracle {
        off_target: Vec<String>,
        timeouts: Vec<usize>,
        queried: Mutex<Vec<String>>,
    }

    impl SimilarityOracle for TableOracle {
        fn name(&self) -> &str {
            "table"
        }

        fn run(&self, batch: &Batch) -> BatchResult {
            self.queried.lock().unwrap().extend(batch.sequences.iter().cloned());
            if self.timeouts.contains(&batch.number) {
                return BatchResult::failed(
                    batch.number,
                    batch.offset,
                    batch.len(),
                    BatchStatus::Timeout,
                    "slow".into(),
                );
            }
            let mut hits: HashMap<String, Vec<String>> = HashMap::new();
            for (id, seq) in batch.labeled() {
                if self.off_target.iter().any(|s| s == seq) {
                    let n = seq.len();
                    let line = format!(
                        "{}\tNM_1\t100.0\t{}\t0\t0\t1\t{}\t1\t{}\t0.01\t40\tBRCA1 mRNA",
                        id, n, n, n
                    );
                    hits.entry(id).or_default().push(line);
                }
            }
            BatchResult {
                number: batch.number,
                offset: batch.offset,
                size: batch.len(),
                status: BatchStatus::Success,
                hits,
                elapsed_secs: 0.0,
                message: None,
            }
        }
    }

    fn pools(n: usize) -> (Vec<Candidate>, Vec<Candidate>) {
        // distinct 19-mers: a strand-specific stem plus i written in base 4
        let strand = |stem: &str, i: usize| -> String {
            let digits: String = (0..5)
                .rev()
                .map(|d| ['A', 'C', 'G', 'U'][(i >> (2 * d)) & 3])
                .collect();
            format!("{}{}", stem, digits)
        };
        let sense = (0..n)
            .map(|i| {
                let id = format!("19_{}", i);
                Candidate::new(&id, Orientation::Sense, &strand("AAAAAAAAAAAAAA", i))
            })
            .collect();
        let antisense = (0..n)
            .map(|i| {
                let id = format!("19_{}", i);
                Candidate::new(&id, Orientation::Antisense, &strand("CCCCCCCCCCCCCC", i))
            })
            .collect();
        (sense, antisense)
    }

    #[test]
    fn every_unique_sequence_is_queried_once() {
        let (sense, antisense) = pools(12);
        let oracle = TableOracle {
            off_target: vec![],
            timeouts: vec![],
            queried: Mutex::new(vec![]),
        };
        let config = ScreenConfig {
            batch_size: 5,
            workers: 3,
            ..ScreenConfig::default()
        };

        let run = screen_candidates(&config, &sense, &antisense, &oracle).unwrap();
        let mut queried = oracle.queried.lock().unwrap().clone();
        let total = queried.len();
        queried.sort();
        queried.dedup();
        assert_eq!(total, queried.len());
        assert_eq!(total, run.summary.unique_sequences);
        assert!(total <= sense.len() + antisense.len());
        assert_eq!(run.results.len(), 12);
        assert!(run.results.iter().all(|r| r.blast_score == 2));
    }

    #[test]
    fn middle_batch_timeout_keeps_the_rest() {
        let (sense, antisense) = pools(6);
        let flagged = sense[0].sequence.clone();
        let oracle = TableOracle {
            off_target: vec![flagged],
            timeouts: vec![1],
            queried: Mutex::new(vec![]),
        };
        let config = ScreenConfig {
            batch_size: 4,
            workers: 2,
            ..ScreenConfig::default()
        };

        let run = screen_candidates(&config, &sense, &antisense, &oracle).unwrap();
        assert_eq!(run.batch_results.len(), 3);
        assert_eq!(run.batch_results[0].status, BatchStatus::Success);
        assert_eq!(run.batch_results[1].status, BatchStatus::Timeout);
        assert_eq!(run.batch_results[2].status, BatchStatus::Success);
        assert_eq!(run.summary.batches_timed_out, 1);

        assert_eq!(run.results.len(), 6);
        let first = &run.results[0];
        assert!(!first.sense_specific);
        assert_eq!(first.blast_score, 1);
        assert!(run
            .results
            .iter()
            .any(|r| r.sense_reason == "no data" || r.antisense_reason == "no data"));
    }
}
