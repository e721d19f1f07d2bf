use std::fmt::Write as _;

use anyhow::{bail, Result};
use tracing::debug;

const QUERY_PREFIX: &str = "seq_";

/// A contiguous slice of the unique-sequence list submitted in one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub number: usize,
    pub offset: usize,
    pub sequences: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// `(query_id, sequence)` pairs with ids that encode the global position.
    pub fn labeled(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.sequences
            .iter()
            .enumerate()
            .map(move |(i, seq)| (query_id(self.offset + i), seq.as_str()))
    }

    /// FASTA text for the engine. RNA input is written with T for U so it can
    /// be searched against a nucleotide database.
    pub fn to_fasta(&self) -> String {
        let mut fasta = String::with_capacity(self.sequences.iter().map(|s| s.len() + 16).sum());
        for (id, seq) in self.labeled() {
            let _ = writeln!(fasta, ">{}", id);
            fasta.extend(seq.chars().map(|c| if c == 'U' { 'T' } else { c }));
            fasta.push('\n');
        }
        fasta
    }
}

pub fn query_id(global_index: usize) -> String {
    format!("{}{}", QUERY_PREFIX, global_index)
}

/// Inverse of [`query_id`]; `None` for ids the pipeline did not issue.
pub fn global_index(query_id: &str) -> Option<usize> {
    query_id.strip_prefix(QUERY_PREFIX)?.parse().ok()
}

/// Splits `sequences` into batches of `batch_size`; the last one may be short.
pub fn partition(sequences: &[String], batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        bail!("batch size must be positive");
    }
    let batches: Vec<Batch> = sequences
        .chunks(batch_size)
        .enumerate()
        .map(|(number, chunk)| Batch {
            number,
            offset: number * batch_size,
            sequences: chunk.to_vec(),
        })
        .collect();
    debug!(
        "Partitioned {} sequences into {} batches of up to {}",
        sequences.len(),
        batches.len(),
        batch_size
    );
    Ok(batches)
}
