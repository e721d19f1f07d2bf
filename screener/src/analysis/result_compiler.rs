use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::FailurePolicy;
use crate::helper_functions::seed_region;
use crate::models::{BatchResult, BatchStatus, Candidate, CandidateResult, Verdict};
use crate::screening::batching::{global_index, query_id};
use crate::screening::classifier::HitClassifier;
use crate::screening::dedup::UniqueSequences;

/// 2 when both strands are specific, 1 when one is, 0 when neither.
pub fn composite_score(sense_specific: bool, antisense_specific: bool) -> u8 {
    sense_specific as u8 + antisense_specific as u8
}

/// Folds batch-level hits back onto candidates.
pub struct ResultCompiler<'a> {
    classifier: &'a HitClassifier,
    failure_policy: FailurePolicy,
}

impl<'a> ResultCompiler<'a> {
    pub fn new(classifier: &'a HitClassifier, failure_policy: FailurePolicy) -> Self {
        ResultCompiler {
            classifier,
            failure_policy,
        }
    }

    fn no_data(&self) -> Verdict {
        match self.failure_policy {
            FailurePolicy::Optimistic => Verdict::specific("no data", 0),
            FailurePolicy::Pessimistic => Verdict::off_target("no data".to_string(), 0),
        }
    }

    /// One verdict per unique sequence. Each sequence is classified exactly
    /// once, from the batch that carried it; sequences of failed batches get
    /// the failure-policy default.
    pub fn verdicts(
        &self,
        unique: &UniqueSequences,
        batches: &[BatchResult],
    ) -> HashMap<String, Verdict> {
        let mut verdicts: HashMap<String, Verdict> = HashMap::with_capacity(unique.len());
        let mut no_data = 0usize;

        for batch in batches {
            let range = batch.offset..batch.offset + batch.size;
            for id in batch.hits.keys() {
                if !global_index(id).is_some_and(|g| range.contains(&g)) {
                    warn!("Batch {} returned hits for unknown query {}", batch.number, id);
                }
            }
            for global in batch.offset..batch.offset + batch.size {
                let Some(sequence) = unique.sequences.get(global) else {
                    warn!(
                        "Batch {} refers to sequence {} beyond the query set",
                        batch.number, global
                    );
                    continue;
                };
                let verdict = match batch.status {
                    BatchStatus::Success => {
                        let raw = batch
                            .hits
                            .get(&query_id(global))
                            .map(Vec::as_slice)
                            .unwrap_or(&[]);
                        self.classifier.classify(sequence, raw)
                    }
                    BatchStatus::Timeout | BatchStatus::Error => {
                        no_data += 1;
                        self.no_data()
                    }
                };
                verdicts.insert(sequence.clone(), verdict);
            }
        }

        for sequence in &unique.sequences {
            if !verdicts.contains_key(sequence) {
                no_data += 1;
                verdicts.insert(sequence.clone(), self.no_data());
            }
        }

        if no_data > 0 {
            warn!(
                "{} sequences had no alignment data and were marked {:?} ({})",
                no_data,
                self.failure_policy,
                if self.no_data().specific { "specific" } else { "not specific" }
            );
        }
        debug!("Classified {} unique sequences", verdicts.len());
        verdicts
    }

    /// One result per fragment id present in both pools, in sense-pool order.
    /// A fragment id repeated within a pool keeps its first occurrence, and
    /// each strand is scored by the verdict of its own sequence.
    /// Returns the results and the number of fragment ids that lacked a partner.
    pub fn compile(
        &self,
        sense: &[Candidate],
        antisense: &[Candidate],
        verdicts: &HashMap<String, Verdict>,
    ) -> (Vec<CandidateResult>, usize) {
        let mut antisense_by_id: HashMap<&str, &Candidate> =
            HashMap::with_capacity(antisense.len());
        for candidate in antisense {
            antisense_by_id.entry(candidate.fragment_id.as_str()).or_insert(candidate);
        }

        let fallback = self.no_data();
        let mut paired: HashSet<&str> = HashSet::new();
        let mut results = Vec::with_capacity(sense.len().min(antisense.len()));
        let mut unpaired = 0usize;

        for sense_strand in sense {
            let id = sense_strand.fragment_id.as_str();
            if paired.contains(id) {
                continue;
            }
            let Some(antisense_strand) = antisense_by_id.get(id) else {
                debug!("Fragment {} has no antisense strand, skipping", id);
                unpaired += 1;
                continue;
            };
            paired.insert(id);

            let sense_verdict = verdicts.get(&sense_strand.sequence).unwrap_or(&fallback);
            let antisense_verdict = verdicts.get(&antisense_strand.sequence).unwrap_or(&fallback);

            results.push(CandidateResult {
                fragment_id: id.to_string(),
                size_nt: sense_strand.length_nt,
                sense_sequence: sense_strand.sequence.clone(),
                antisense_sequence: antisense_strand.sequence.clone(),
                seed_sequence: seed_region(&sense_strand.sequence).unwrap_or("N/A").to_string(),
                blast_score: composite_score(sense_verdict.specific, antisense_verdict.specific),
                sense_specific: sense_verdict.specific,
                antisense_specific: antisense_verdict.specific,
                sense_reason: sense_verdict.reason.clone(),
                antisense_reason: antisense_verdict.reason.clone(),
                sense_hits: sense_verdict.hit_count,
                antisense_hits: antisense_verdict.hit_count,
            });
        }

        let antisense_only = antisense_by_id.keys().filter(|id| !paired.contains(*id)).count();
        unpaired += antisense_only;
        if unpaired > 0 {
            info!("{} fragment ids lacked a partner strand and were excluded", unpaired);
        }
        (results, unpaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierThresholds;
    use crate::models::Orientation;
    use crate::screening::batching::partition;
    use crate::screening::dedup::deduplicate;

    fn off_target_line(id: &str) -> String {
        format!(
            "{}\tNM_007294\t95.0\t19\t1\t0\t1\t19\t10\t28\t0.2\t35.0\tBRCA1 mRNA",
            id
        )
    }

    fn success(number: usize, offset: usize, size: usize, hits: &[(&str, String)]) -> BatchResult {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (id, line) in hits {
            map.entry(id.to_string()).or_default().push(line.clone());
        }
        BatchResult {
            number,
            offset,
            size,
            status: BatchStatus::Success,
            hits: map,
            elapsed_secs: 0.0,
            message: None,
        }
    }

    fn pair(id: &str, sense: &str, antisense: &str) -> (Candidate, Candidate) {
        (
            Candidate::new(id, Orientation::Sense, sense),
            Candidate::new(id, Orientation::Antisense, antisense),
        )
    }

    #[test]
    fn score_law() {
        assert_eq!(composite_score(true, true), 2);
        assert_eq!(composite_score(true, false), 1);
        assert_eq!(composite_score(false, true), 1);
        assert_eq!(composite_score(false, false), 0);
    }

    #[test]
    fn homopolymer_pair_without_hits_scores_two() {
        let (s, a) = pair("19_1", "AAAAAAAAAAAAAAAAAAA", "GGGGGGGGGGGGGGGGGGG");
        let (sense, antisense) = (vec![s], vec![a]);
        let unique = deduplicate(&sense, &antisense);
        let batches = partition(&unique.sequences, 1).unwrap();
        assert_eq!(batches.len(), 2);
        let results: Vec<BatchResult> = batches
            .iter()
            .map(|b| success(b.number, b.offset, b.len(), &[]))
            .collect();

        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();
        let compiler = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let verdicts = compiler.verdicts(&unique, &results);
        for sequence in &unique.sequences {
            assert_eq!(verdicts[sequence], Verdict::specific("no hits", 0));
        }

        let (compiled, unpaired) = compiler.compile(&sense, &antisense, &verdicts);
        assert_eq!(unpaired, 0);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].blast_score, 2);
        assert_eq!(compiled[0].seed_sequence, "AAAAAAA");
    }

    #[test]
    fn shared_sequence_gets_one_verdict_for_all_referrers() {
        let shared = "ACGUACGUACGUACGUACG";
        let (s1, a1) = pair("f1", shared, "CCCCCCCCCCCCCCCCCCC");
        let (s2, a2) = pair("f2", "GGGGGGGGGGGGGGGGGGG", shared);
        let sense = vec![s1, s2];
        let antisense = vec![a1, a2];
        let unique = deduplicate(&sense, &antisense);
        assert_eq!(unique.len(), 3);

        let batches = vec![success(0, 0, 3, &[("seq_0", off_target_line("seq_0"))])];
        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();
        let compiler = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let verdicts = compiler.verdicts(&unique, &batches);
        assert_eq!(verdicts.len(), 3);

        let (compiled, _) = compiler.compile(&sense, &antisense, &verdicts);
        assert_eq!(compiled.len(), 2);
        assert!(!compiled[0].sense_specific);
        assert!(!compiled[1].antisense_specific);
        assert_eq!(compiled[0].sense_reason, compiled[1].antisense_reason);
        assert_eq!(compiled[0].blast_score, 1);
        assert_eq!(compiled[1].blast_score, 1);
        assert_eq!(compiled[0].sense_hits, 1);
    }

    #[test]
    fn failed_batch_follows_failure_policy_and_others_survive() {
        let pairs = [
            pair("a", "AAAAAAAAAAAAAAAAAAA", "UUUUUUUUUUUUUUUUUUU"),
            pair("b", "CCCCCCCCCCCCCCCCCCC", "GGGGGGGGGGGGGGGGGGG"),
            pair("c", "ACACACACACACACACACA", "UGUGUGUGUGUGUGUGUGU"),
        ];
        let sense: Vec<Candidate> = pairs.iter().map(|p| p.0.clone()).collect();
        let antisense: Vec<Candidate> = pairs.iter().map(|p| p.1.clone()).collect();
        let unique = deduplicate(&sense, &antisense);
        // six sequences, batches of two: [a/s b/s] [c/s a/as] [b/as c/as]
        let batches = vec![
            success(0, 0, 2, &[("seq_1", off_target_line("seq_1"))]),
            BatchResult::failed(1, 2, 2, BatchStatus::Timeout, "timed out".into()),
            success(2, 4, 2, &[]),
        ];
        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();

        let optimistic = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let verdicts = optimistic.verdicts(&unique, &batches);
        let (compiled, _) = optimistic.compile(&sense, &antisense, &verdicts);
        assert_eq!(compiled.len(), 3);
        assert_eq!(compiled[0].antisense_reason, "no data");
        assert!(compiled[0].antisense_specific);
        assert_eq!(compiled[1].blast_score, 1);
        assert_eq!(compiled[2].sense_reason, "no data");
        assert_eq!(compiled[2].blast_score, 2);

        let pessimistic = ResultCompiler::new(&classifier, FailurePolicy::Pessimistic);
        let verdicts = pessimistic.verdicts(&unique, &batches);
        let (compiled, _) = pessimistic.compile(&sense, &antisense, &verdicts);
        assert_eq!(compiled[0].blast_score, 1);
        assert_eq!(compiled[2].blast_score, 1);
        assert!(!compiled[2].sense_specific);
    }

    #[test]
    fn one_sided_fragments_are_skipped() {
        let sense = vec![
            Candidate::new("both", Orientation::Sense, "AAAAAAAAAAAAAAAAAAA"),
            Candidate::new("sense_only", Orientation::Sense, "CCCCCCCCCCCCCCCCCCC"),
        ];
        let antisense = vec![
            Candidate::new("both", Orientation::Antisense, "UUUUUUUUUUUUUUUUUUU"),
            Candidate::new("antisense_only", Orientation::Antisense, "GGGGGGGGGGGGGGGGGGG"),
        ];
        let unique = deduplicate(&sense, &antisense);
        let batches = vec![success(0, 0, unique.len(), &[])];
        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();
        let compiler = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let verdicts = compiler.verdicts(&unique, &batches);

        let (compiled, unpaired) = compiler.compile(&sense, &antisense, &verdicts);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].fragment_id, "both");
        assert_eq!(unpaired, 2);
    }

    #[test]
    fn score_does_not_depend_on_which_strand_is_off_target() {
        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();
        let compiler = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let (s, a) = pair("x", "AAAAAAAAAAAAAAAAAAA", "CCCCCCCCCCCCCCCCCCC");
        let (sense, antisense) = (vec![s], vec![a]);
        let unique = deduplicate(&sense, &antisense);

        for flagged in ["seq_0", "seq_1"] {
            let batches = vec![success(0, 0, 2, &[(flagged, off_target_line(flagged))])];
            let verdicts = compiler.verdicts(&unique, &batches);
            let (compiled, _) = compiler.compile(&sense, &antisense, &verdicts);
            assert_eq!(compiled[0].blast_score, 1);
        }
    }

    #[test]
    fn repeated_fragment_id_keeps_first_strand_and_its_own_verdict() {
        let sense = vec![
            Candidate::new("x", Orientation::Sense, "AAAAAAAAAAAAAAAAAAA"),
            Candidate::new("y", Orientation::Sense, "GGGGGGGGGGGGGGGGGGG"),
            Candidate::new("x", Orientation::Sense, "UUUUUUUUUUUUUUUUUUU"),
        ];
        let antisense = vec![
            Candidate::new("x", Orientation::Antisense, "CCCCCCCCCCCCCCCCCCC"),
            Candidate::new("x", Orientation::Antisense, "GGGGGGGGGGGGGGGGGGG"),
            Candidate::new("y", Orientation::Antisense, "ACACACACACACACACACA"),
        ];
        let unique = deduplicate(&sense, &antisense);
        // unique order: AAAA, GGGG, UUUU, CCCC, ACAC; only GGGG is off-target
        let flagged = [("seq_1", off_target_line("seq_1"))];
        let batches = vec![success(0, 0, unique.len(), &flagged)];
        let classifier = HitClassifier::new(&ClassifierThresholds::default()).unwrap();
        let compiler = ResultCompiler::new(&classifier, FailurePolicy::Optimistic);
        let verdicts = compiler.verdicts(&unique, &batches);

        let (compiled, unpaired) = compiler.compile(&sense, &antisense, &verdicts);
        assert_eq!(unpaired, 0);
        assert_eq!(compiled.len(), 2);

        let x = &compiled[0];
        assert_eq!(x.fragment_id, "x");
        assert_eq!(x.sense_sequence, "AAAAAAAAAAAAAAAAAAA");
        assert_eq!(x.antisense_sequence, "CCCCCCCCCCCCCCCCCCC");
        assert!(x.antisense_specific);
        assert_eq!(x.blast_score, 2);

        for row in &compiled {
            assert_eq!(row.sense_specific, verdicts[&row.sense_sequence].specific);
            assert_eq!(row.antisense_specific, verdicts[&row.antisense_sequence].specific);
            assert_eq!(row.antisense_reason, verdicts[&row.antisense_sequence].reason);
        }
        assert!(!compiled[1].sense_specific);
        assert_eq!(compiled[1].blast_score, 1);
    }
}
