use std::collections::HashMap;
use std::fmt;

/// Which half of the duplex a candidate strand belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Sense,
    Antisense,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Sense => write!(f, "sense"),
            Orientation::Antisense => write!(f, "antisense"),
        }
    }
}

/// One strand of an siRNA duplex, as read from a candidate table.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub fragment_id: String,
    pub orientation: Orientation,
    pub sequence: String,
    pub length_nt: usize,
}

impl Candidate {
    #[cfg(test)]
    pub fn new(fragment_id: &str, orientation: Orientation, sequence: &str) -> Self {
        let sequence = normalize_sequence(sequence);
        Candidate {
            fragment_id: fragment_id.to_string(),
            orientation,
            length_nt: sequence.len(),
            sequence,
        }
    }
}

/// Upper-cases and trims a nucleotide string so identical strands key identically.
pub fn normalize_sequence(raw: &str) -> String {
    raw.trim().trim_matches('"').to_ascii_uppercase()
}

/// Outcome of a single alignment-engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    Timeout,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Success => "success",
            BatchStatus::Timeout => "timeout",
            BatchStatus::Error => "error",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What came back from the engine for one batch.
///
/// `hits` maps a query id (`seq_{global_index}`) to its raw tabular lines in
/// the order the engine emitted them. It is empty unless `status` is
/// [`BatchStatus::Success`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub number: usize,
    pub offset: usize,
    pub size: usize,
    pub status: BatchStatus,
    pub hits: HashMap<String, Vec<String>>,
    pub elapsed_secs: f64,
    pub message: Option<String>,
}

impl BatchResult {
    pub fn failed(
        number: usize,
        offset: usize,
        size: usize,
        status: BatchStatus,
        message: String,
    ) -> Self {
        BatchResult {
            number,
            offset,
            size,
            status,
            hits: HashMap::new(),
            elapsed_secs: 0.0,
            message: Some(message),
        }
    }

    pub fn hit_count(&self) -> usize {
        self.hits.values().map(Vec::len).sum()
    }
}

/// A single parsed line of `-outfmt 6` output.
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
    pub alignment_length: usize,
    pub mismatches: usize,
    pub gap_opens: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub subject_start: usize,
    pub subject_end: usize,
    pub evalue: f64,
    pub bit_score: f64,
    pub subject_title: String,
}

/// Specificity call for one unique sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub specific: bool,
    pub reason: String,
    pub hit_count: usize,
}

impl Verdict {
    pub fn specific(reason: &str, hit_count: usize) -> Self {
        Verdict {
            specific: true,
            reason: reason.to_string(),
            hit_count,
        }
    }

    pub fn off_target(reason: String, hit_count: usize) -> Self {
        Verdict {
            specific: false,
            reason,
            hit_count,
        }
    }
}

/// Final per-duplex row: both strand verdicts folded into a 0..=2 score.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateResult {
    pub fragment_id: String,
    pub size_nt: usize,
    pub sense_sequence: String,
    pub antisense_sequence: String,
    pub seed_sequence: String,
    pub blast_score: u8,
    pub sense_specific: bool,
    pub antisense_specific: bool,
    pub sense_reason: String,
    pub antisense_reason: String,
    pub sense_hits: usize,
    pub antisense_hits: usize,
}
