use std::collections::HashMap;

use tracing::info;

use crate::models::{Candidate, Orientation};

/// Distinct sequences across both strand pools, in first-seen order, plus a
/// reverse index back to every candidate that produced each one.
#[derive(Debug, Default, Clone)]
pub struct UniqueSequences {
    pub sequences: Vec<String>,
    pub back_refs: HashMap<String, Vec<(Orientation, String)>>,
}

impl UniqueSequences {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn referrers(&self, sequence: &str) -> &[(Orientation, String)] {
        self.back_refs.get(sequence).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Collapses the sense and antisense pools into one query set. The sense pool
/// is walked first, so ordering is stable for a given input.
pub fn deduplicate(sense: &[Candidate], antisense: &[Candidate]) -> UniqueSequences {
    let mut sequences = Vec::new();
    let mut back_refs: HashMap<String, Vec<(Orientation, String)>> = HashMap::new();

    for candidate in sense.iter().chain(antisense) {
        let refs = back_refs.entry(candidate.sequence.clone()).or_insert_with(|| {
            sequences.push(candidate.sequence.clone());
            Vec::new()
        });
        refs.push((candidate.orientation, candidate.fragment_id.clone()));
    }
    let unique = UniqueSequences {
        sequences,
        back_refs,
    };

    let total = sense.len() + antisense.len();
    if total > 0 {
        info!(
            strands = total,
            unique = unique.len(),
            "Deduplicated candidate strands ({:.1}% reduction)",
            100.0 * (total - unique.len()) as f64 / total as f64
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strand(id: &str, orientation: Orientation, seq: &str) -> Candidate {
        Candidate::new(id, orientation, seq)
    }

    #[test]
    fn shared_sequences_collapse_across_pools() {
        let sense = vec![
            strand("19_1", Orientation::Sense, "AAAAAAAAAAAAAAAAAAA"),
            strand("19_20", Orientation::Sense, "CCCCCCCCCCCCCCCCCCC"),
            strand("19_39", Orientation::Sense, "AAAAAAAAAAAAAAAAAAA"),
        ];
        let antisense = vec![
            strand("19_1", Orientation::Antisense, "UUUUUUUUUUUUUUUUUUU"),
            strand("19_20", Orientation::Antisense, "CCCCCCCCCCCCCCCCCCC"),
        ];

        let unique = deduplicate(&sense, &antisense);
        assert_eq!(unique.len(), 3);
        assert!(unique.len() <= sense.len() + antisense.len());
        assert_eq!(
            unique.sequences,
            vec!["AAAAAAAAAAAAAAAAAAA", "CCCCCCCCCCCCCCCCCCC", "UUUUUUUUUUUUUUUUUUU"]
        );
        assert_eq!(
            unique.referrers("CCCCCCCCCCCCCCCCCCC"),
            &[
                (Orientation::Sense, "19_20".to_string()),
                (Orientation::Antisense, "19_20".to_string())
            ]
        );
        assert_eq!(unique.referrers("AAAAAAAAAAAAAAAAAAA").len(), 2);
    }

    #[test]
    fn distinct_sequences_are_all_kept() {
        let sense = vec![
            strand("a", Orientation::Sense, "ACGU"),
            strand("b", Orientation::Sense, "ACGG"),
        ];
        let antisense = vec![strand("a", Orientation::Antisense, "UGCA")];
        let unique = deduplicate(&sense, &antisense);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn every_candidate_maps_to_exactly_one_entry() {
        let sense = vec![
            strand("a", Orientation::Sense, "ACGU"),
            strand("b", Orientation::Sense, "acgu"),
        ];
        let unique = deduplicate(&sense, &[]);
        assert_eq!(unique.len(), 1);
        let total_refs: usize = unique.back_refs.values().map(Vec::len).sum();
        assert_eq!(total_refs, 2);
    }

    #[test]
    fn empty_pools_give_empty_output() {
        let unique = deduplicate(&[], &[]);
        assert!(unique.is_empty());
        assert!(unique.back_refs.is_empty());
    }
}
