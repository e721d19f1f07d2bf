use regex::Regex;
use tracing::debug;

use crate::alignment_tools::blastn_integration::parse_hit_line;
use crate::config::ClassifierThresholds;
use crate::models::{HitRecord, Verdict};

/// Decides whether a sequence's hits contain an off-target alignment.
pub struct HitClassifier {
    min_coverage: f64,
    min_identity: f64,
    on_target: Option<Regex>,
    max_matching_bases: Option<usize>,
}

impl HitClassifier {
    pub fn new(thresholds: &ClassifierThresholds) -> Result<Self, regex::Error> {
        let names: Vec<String> = thresholds
            .on_target_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(regex::escape)
            .collect();
        // whole-word, so ATXN1 does not excuse a hit on ATXN10
        let on_target = if names.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|")))?)
        };
        Ok(HitClassifier {
            min_coverage: thresholds.min_coverage,
            min_identity: thresholds.min_identity,
            on_target,
            max_matching_bases: thresholds.max_matching_bases,
        })
    }

    pub fn is_on_target(&self, hit: &HitRecord) -> bool {
        self.on_target.as_ref().map_or(false, |re| {
            re.is_match(&hit.subject_title) || re.is_match(&hit.subject_id)
        })
    }

    /// The verdict for `sequence` given its raw hit lines in engine order.
    /// The first qualifying hit names the reason; unparseable lines are ignored.
    pub fn classify(&self, sequence: &str, raw_hits: &[String]) -> Verdict {
        if raw_hits.is_empty() {
            return Verdict::specific("no hits", 0);
        }
        let query_len = sequence.len().max(1) as f64;

        for line in raw_hits {
            let Some(hit) = parse_hit_line(line) else {
                debug!("Ignoring unparseable hit line: {}", line);
                continue;
            };
            if self.is_on_target(&hit) {
                continue;
            }
            let coverage = hit.alignment_length as f64 / query_len * 100.0;

            if coverage > self.min_coverage && hit.percent_identity > self.min_identity {
                return Verdict::off_target(
                    format!(
                        "off-target {} (coverage {:.1}%, identity {:.1}%)",
                        subject_label(&hit),
                        coverage,
                        hit.percent_identity
                    ),
                    raw_hits.len(),
                );
            }

            if let Some(limit) = self.max_matching_bases {
                let matches = (hit.alignment_length as f64 * hit.percent_identity / 100.0) as usize;
                let allowed = limit.min(sequence.len().saturating_sub(2));
                if matches >= allowed {
                    return Verdict::off_target(
                        format!(
                            "off-target {} ({} matching bases of {})",
                            subject_label(&hit),
                            matches,
                            sequence.len()
                        ),
                        raw_hits.len(),
                    );
                }
            }
        }
        Verdict::specific("specific", raw_hits.len())
    }
}

fn subject_label(hit: &HitRecord) -> &str {
    if hit.subject_title.is_empty() {
        &hit.subject_id
    } else {
        &hit.subject_title
    }
}
