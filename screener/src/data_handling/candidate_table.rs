use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info, warn};

use crate::helper_functions::read_csv;
use crate::models::{normalize_sequence, Candidate, Orientation};

/// One strand pool on disk: a CSV with `fragment_id`, `sequence` and
/// `size_nt` or `length_nt` columns.
pub struct CandidateTable {
    pub path: PathBuf,
    pub orientation: Orientation,
}

impl CandidateTable {
    pub fn load(&self) -> PolarsResult<Vec<Candidate>> {
        info!("Reading {} candidates from {}", self.orientation, self.path.display());
        let df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read candidate CSV {}: {}", self.path.display(), e);
                return Err(e);
            }
        };
        candidates_from_dataframe(&df, self.orientation)
    }
}

/// Pulls typed candidates out of a table. Rows with an empty id or sequence are dropped.
pub fn candidates_from_dataframe(
    df: &DataFrame,
    orientation: Orientation,
) -> PolarsResult<Vec<Candidate>> {
    let schema = df.schema();
    for required in ["fragment_id", "sequence"] {
        if !schema.contains(required) {
            error!("Candidate table is missing the '{}' column", required);
            return Err(PolarsError::ColumnNotFound(required.into()));
        }
    }

    let ids = df.column("fragment_id")?.cast(&DataType::String)?;
    let ids = ids.str()?;
    let sequences = df.column("sequence")?.cast(&DataType::String)?;
    let sequences = sequences.str()?;

    let length_column = ["size_nt", "length_nt"]
        .into_iter()
        .find(|name| schema.contains(name));
    let lengths = match length_column {
        Some(name) => Some(df.column(name)?.cast(&DataType::Int64)?),
        None => None,
    };
    let lengths = match &lengths {
        Some(column) => Some(column.i64()?),
        None => None,
    };

    let mut candidates = Vec::with_capacity(df.height());
    let mut dropped = 0usize;
    for i in 0..df.height() {
        let (Some(id), Some(raw_seq)) = (ids.get(i), sequences.get(i)) else {
            dropped += 1;
            continue;
        };
        let id = id.trim().trim_matches('"');
        let sequence = normalize_sequence(raw_seq);
        if id.is_empty() || sequence.is_empty() {
            dropped += 1;
            continue;
        }
        let length_nt = lengths
            .and_then(|l| l.get(i))
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(sequence.len());
        candidates.push(Candidate {
            fragment_id: id.to_string(),
            orientation,
            sequence,
            length_nt,
        });
    }

    if dropped > 0 {
        warn!("Dropped {} {} rows with a missing id or sequence", dropped, orientation);
    }
    info!("Loaded {} {} candidates", candidates.len(), orientation);
    Ok(candidates)
}
