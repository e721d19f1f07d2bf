use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::helper_functions::dataframe_to_csv;
use crate::models::{BatchResult, CandidateResult};
use crate::screening::scheduler::StatusCounts;

pub const FULL_RESULTS_FILE: &str = "blast_results_full.csv";
pub const BEST_RESULTS_FILE: &str = "blast_results_best.csv";
pub const BATCH_STATUS_FILE: &str = "batch_status.csv";
pub const SUMMARY_FILE: &str = "run_summary.json";

const TOP_LISTED: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub candidates_analysed: usize,
    pub unpaired_fragments: usize,
    pub unique_sequences: usize,
    pub mean_score: f64,
    /// Number of candidates scoring 0, 1 and 2.
    pub score_distribution: [usize; 3],
    pub batches_total: usize,
    pub batches_succeeded: usize,
    pub batches_timed_out: usize,
    pub batches_failed: usize,
}

impl RunSummary {
    pub fn new(
        results: &[CandidateResult],
        batch_results: &[BatchResult],
        unique_sequences: usize,
        unpaired_fragments: usize,
    ) -> Self {
        let mut score_distribution = [0usize; 3];
        for r in results {
            score_distribution[usize::from(r.blast_score.min(2))] += 1;
        }
        let total: usize = results.iter().map(|r| usize::from(r.blast_score)).sum();
        let mean_score = if results.is_empty() {
            0.0
        } else {
            total as f64 / results.len() as f64
        };
        let counts = StatusCounts::from_results(batch_results);

        RunSummary {
            candidates_analysed: results.len(),
            unpaired_fragments,
            unique_sequences,
            mean_score,
            score_distribution,
            batches_total: batch_results.len(),
            batches_succeeded: counts.success,
            batches_timed_out: counts.timeout,
            batches_failed: counts.error,
        }
    }

    pub fn log(&self, results: &[CandidateResult]) {
        info!("Analysed siRNA pairs: {}", self.candidates_analysed);
        info!("Mean BLAST score: {:.2}/2", self.mean_score);
        for (score, count) in self.score_distribution.iter().enumerate().rev() {
            let share = if self.candidates_analysed == 0 {
                0.0
            } else {
                100.0 * *count as f64 / self.candidates_analysed as f64
            };
            info!("  score {}: {} siRNA ({:.1}%)", score, count, share);
        }

        let best: Vec<&CandidateResult> = results.iter().filter(|r| r.blast_score == 2).collect();
        info!("Best siRNA (score 2): {}", best.len());
        for r in best.iter().take(TOP_LISTED) {
            info!("  {} ({} nt): {}", r.fragment_id, r.size_nt, r.sense_sequence);
        }

        info!(
            "Batches: {} succeeded, {} timed out, {} failed (of {})",
            self.batches_succeeded, self.batches_timed_out, self.batches_failed, self.batches_total
        );
        if self.batches_timed_out + self.batches_failed > 0 {
            warn!(
                "Some batches produced no data; \
                 consider re-running with a larger timeout or a smaller batch size"
            );
        }
    }
}

fn text(name: &str, values: Vec<String>) -> Column {
    Series::new(PlSmallStr::from(name), values).into()
}

fn count(name: &str, values: Vec<i64>) -> Column {
    Series::new(PlSmallStr::from(name), values).into()
}

fn flag(name: &str, values: Vec<bool>) -> Column {
    Series::new(PlSmallStr::from(name), values).into()
}

/// Tabular form of the per-candidate results, one row per fragment id.
pub fn results_dataframe(results: &[CandidateResult]) -> PolarsResult<DataFrame> {
    let columns = vec![
        text("fragment_id", results.iter().map(|r| r.fragment_id.clone()).collect()),
        count("size_nt", results.iter().map(|r| r.size_nt as i64).collect()),
        text("sense_sequence", results.iter().map(|r| r.sense_sequence.clone()).collect()),
        text("antisense_sequence", results.iter().map(|r| r.antisense_sequence.clone()).collect()),
        text("seed_sequence", results.iter().map(|r| r.seed_sequence.clone()).collect()),
        count("blast_score", results.iter().map(|r| i64::from(r.blast_score)).collect()),
        flag("sense_specific", results.iter().map(|r| r.sense_specific).collect()),
        flag("antisense_specific", results.iter().map(|r| r.antisense_specific).collect()),
        text("sense_reason", results.iter().map(|r| r.sense_reason.clone()).collect()),
        text("antisense_reason", results.iter().map(|r| r.antisense_reason.clone()).collect()),
        count("sense_hits", results.iter().map(|r| r.sense_hits as i64).collect()),
        count("antisense_hits", results.iter().map(|r| r.antisense_hits as i64).collect()),
    ];
    DataFrame::new(columns)
}

fn write_batch_status(batch_results: &[BatchResult], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    wtr.write_record([
        "batch",
        "offset",
        "batch_size",
        "status",
        "hits_found",
        "elapsed_secs",
        "message",
    ])?;
    for r in batch_results {
        wtr.write_record([
            r.number.to_string(),
            r.offset.to_string(),
            r.size.to_string(),
            r.status.to_string(),
            r.hit_count().to_string(),
            format!("{:.2}", r.elapsed_secs),
            r.message.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the full table, the score-2 subset, per-batch status and the run summary.
pub fn write_outputs(
    output_dir: &Path,
    results: &[CandidateResult],
    batch_results: &[BatchResult],
    summary: &RunSummary,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("cannot create output dir {}", output_dir.display()))?;

    let mut full = results_dataframe(results)?;
    dataframe_to_csv(&mut full, &output_dir.join(FULL_RESULTS_FILE))?;

    let best: Vec<CandidateResult> =
        results.iter().filter(|r| r.blast_score == 2).cloned().collect();
    let mut best = results_dataframe(&best)?;
    dataframe_to_csv(&mut best, &output_dir.join(BEST_RESULTS_FILE))?;

    write_batch_status(batch_results, &output_dir.join(BATCH_STATUS_FILE))?;

    let summary_path = output_dir.join(SUMMARY_FILE);
    serde_json::to_writer_pretty(File::create(&summary_path)?, summary)
        .with_context(|| format!("cannot write {}", summary_path.display()))?;
    info!("Run summary saved to {}", summary_path.display());
    Ok(())
}
