// src/pipeline/merge.rs

//! Same-fingerprint merging and ranking.
//!
//! Several sources (or several search terms) can return the same opening.
//! Results are merged per fingerprint before the dedup store is touched.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{RejectReason, ScoredPosting};

/// Counts from a merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub input: usize,
    pub output: usize,
}

impl MergeStats {
    pub fn merged_away(&self) -> usize {
        self.input - self.output
    }
}

/// Collapse results that share a fingerprint.
///
/// A member with negative evidence (remote veto or foreign location) wins.
/// A malformed member loses to any well-formed one. Otherwise the highest
/// score wins, earliest first on ties. Results without a fingerprint pass
/// through untouched. First-appearance order is kept.
pub fn merge_by_fingerprint(scored: Vec<ScoredPosting>) -> (Vec<ScoredPosting>, MergeStats) {
    let input = scored.len();
    let mut slots: Vec<ScoredPosting> = Vec::with_capacity(input);
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in scored {
        let fp = candidate.result.fingerprint.clone();
        if fp.is_empty() {
            slots.push(candidate);
            continue;
        }

        match index.get(&fp) {
            None => {
                index.insert(fp, slots.len());
                slots.push(candidate);
            }
            Some(&slot) => {
                if prefer(&candidate, &slots[slot]) {
                    log::debug!(
                        "Merged duplicate {} from {} over {}",
                        fp,
                        candidate.posting.source_id,
                        slots[slot].posting.source_id
                    );
                    slots[slot] = candidate;
                }
            }
        }
    }

    let stats = MergeStats {
        input,
        output: slots.len(),
    };
    (slots, stats)
}

/// Merge precedence: negative evidence, then well-formed, then malformed.
fn precedence(item: &ScoredPosting) -> u8 {
    let reasons = &item.result.reasons;
    if reasons.iter().any(RejectReason::is_negative_evidence) {
        2
    } else if reasons.iter().any(|r| matches!(r, RejectReason::Malformed(_))) {
        0
    } else {
        1
    }
}

/// Whether `candidate` should replace `current`.
fn prefer(candidate: &ScoredPosting, current: &ScoredPosting) -> bool {
    match precedence(candidate).cmp(&precedence(current)) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.result.score > current.result.score,
    }
}

/// Score descending, then title, then fingerprint.
pub fn rank_order(a: &ScoredPosting, b: &ScoredPosting) -> Ordering {
    b.result
        .score
        .cmp(&a.result.score)
        .then_with(|| a.posting.title.cmp(&b.posting.title))
        .then_with(|| a.result.fingerprint.cmp(&b.result.fingerprint))
}

/// Sort in notification order.
pub fn rank(scored: &mut [ScoredPosting]) {
    scored.sort_by(rank_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NormalizedPosting, RuleSet};
    use crate::pipeline::scoring::ScoringEngine;
    use chrono::Utc;

    fn scored(source: &str, url: &str, title: &str, description: &str) -> ScoredPosting {
        let engine = ScoringEngine::new(&RuleSet::default()).unwrap();
        let posting = NormalizedPosting::new(source, url, Utc::now())
            .with_title(title)
            .with_description(description);
        let result = engine.evaluate(&posting, Utc::now());
        ScoredPosting { posting, result }
    }

    #[test]
    fn test_highest_score_wins() {
        let low = scored("gupy", "https://a.example/job/1", "Data Engineer", "");
        let high = scored(
            "greenhouse:a",
            "https://www.a.example/job/1/",
            "Data Engineer",
            "100% remoto. Python, Airflow, Spark.",
        );
        let (merged, stats) = merge_by_fingerprint(vec![low, high]);

        assert_eq!(merged.len(), 1);
        assert_eq!(stats.merged_away(), 1);
        assert_eq!(merged[0].posting.source_id, "greenhouse:a");
    }

    #[test]
    fn test_any_veto_wins() {
        let good = scored(
            "gupy",
            "https://a.example/job/1",
            "Data Engineer",
            "100% remoto. Python, Airflow, Spark.",
        );
        let vetoed = scored(
            "lever:a",
            "https://a.example/job/1?utm=x",
            "Data Engineer",
            "Modelo híbrido.",
        );
        let (merged, _) = merge_by_fingerprint(vec![good, vetoed]);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].result.vetoed);
        assert!(!merged[0].result.eligible);
    }

    #[test]
    fn test_titleless_copy_does_not_suppress_good_posting() {
        let good = scored(
            "gupy",
            "https://a.example/job/1",
            "Senior Data Engineer",
            "100% remoto para todo o Brasil. Python, Airflow, Spark.",
        );
        let titleless = scored("lever:a", "https://a.example/job/1/", "", "");
        assert_eq!(good.result.fingerprint, titleless.result.fingerprint);

        for batch in [vec![good.clone(), titleless.clone()], vec![titleless, good]] {
            let (merged, _) = merge_by_fingerprint(batch);
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].posting.source_id, "gupy");
            assert!(merged[0].result.eligible);
        }
    }

    #[test]
    fn test_strict_unconfirmed_copy_loses_to_confirmed() {
        let rules = RuleSet {
            strict_remote: true,
            ..RuleSet::default()
        };
        let engine = ScoringEngine::new(&rules).unwrap();
        let score = |source: &str, description: &str| {
            let posting = NormalizedPosting::new(source, "https://a.example/job/5", Utc::now())
                .with_title("Data Engineer")
                .with_description(description);
            let result = engine.evaluate(&posting, Utc::now());
            ScoredPosting { posting, result }
        };
        let unconfirmed = score("lever:a", "");
        let confirmed = score("gupy", "100% remoto. Python, Airflow, Spark.");

        let (merged, _) = merge_by_fingerprint(vec![unconfirmed, confirmed]);
        assert_eq!(merged[0].posting.source_id, "gupy");
        assert!(merged[0].result.eligible);
    }

    #[test]
    fn test_unfingerprinted_pass_through() {
        let a = scored("x", "", "Data Engineer", "");
        let b = scored("y", "", "Data Engineer", "");
        let (merged, stats) = merge_by_fingerprint(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(stats.merged_away(), 0);
    }

    #[test]
    fn test_rank_order() {
        let mut items = vec![
            scored("s", "https://a.example/2", "B Data Engineer", "remoto"),
            scored("s", "https://a.example/1", "A Data Engineer", "remoto"),
            scored("s", "https://a.example/3", "Data Engineer", "100% remoto. Python, Spark, Airflow."),
        ];
        rank(&mut items);
        assert!(items[0].result.score >= items[1].result.score);
        assert_eq!(items[1].posting.title, "A Data Engineer");
        assert_eq!(items[2].posting.title, "B Data Engineer");
    }
}
