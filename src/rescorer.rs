use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    context::ContextVector,
    document,
    language::LanguagePair,
    search::ScoreEntry,
};

/// Second ranking pass over retrieved candidates.
///
/// Implementations must be pure: the output depends only on the inputs.
pub trait Rescorer: Send + Sync + std::fmt::Debug {
    /// Reorder `candidates` (given in retrieval order) for `sentence`.
    fn rescore(
        &self,
        direction: &LanguagePair,
        sentence: &str,
        candidates: Vec<ScoreEntry>,
        context: Option<&ContextVector>,
    ) -> Vec<ScoreEntry>;
}

/// Ranks candidates by a BLEU-style n-gram F1 between their source text
/// and the query sentence.
///
/// Precision and recall are geometric means of the per-order clipped
/// n-gram ratios, so a candidate must share both words and word order
/// with the query to score well. The candidate's score is replaced by its
/// F1 in `[0, 1]`; ties keep their retrieval order.
#[derive(Debug, Clone, Copy)]
pub struct F1BleuRescorer {
    pub max_order: usize,
}

impl Default for F1BleuRescorer {
    fn default() -> Self {
        Self { max_order: 4 }
    }
}

impl F1BleuRescorer {
    /// F1 between two token sequences.
    pub fn f1(&self, candidate: &[String], reference: &[String]) -> f32 {
        let mut log_precision = 0.0f64;
        let mut log_recall = 0.0f64;
        let mut orders = 0usize;

        for n in 1..=self.max_order {
            let cand = ngram_counts(candidate, n);
            let refs = ngram_counts(reference, n);
            let cand_total = candidate.len().saturating_sub(n - 1);
            let ref_total = reference.len().saturating_sub(n - 1);
            if cand_total == 0 && ref_total == 0 {
                continue;
            }

            let matches: usize = cand
                .iter()
                .map(|(gram, &count)| {
                    count.min(refs.get(gram).copied().unwrap_or(0))
                })
                .sum();

            // Unigrams are exact; higher orders are add-one smoothed so a
            // short sentence without 4-gram overlap is not zeroed out.
            let smoothing = if n == 1 { 0.0 } else { 1.0 };
            let precision = ratio(matches, cand_total, smoothing);
            let recall = ratio(matches, ref_total, smoothing);
            if precision <= 0.0 || recall <= 0.0 {
                return 0.0;
            }
            log_precision += precision.ln();
            log_recall += recall.ln();
            orders += 1;
        }

        if orders == 0 {
            return 0.0;
        }
        let precision = (log_precision / orders as f64).exp();
        let recall = (log_recall / orders as f64).exp();
        (2.0 * precision * recall / (precision + recall)) as f32
    }
}

impl Rescorer for F1BleuRescorer {
    fn rescore(
        &self,
        _direction: &LanguagePair,
        sentence: &str,
        candidates: Vec<ScoreEntry>,
        _context: Option<&ContextVector>,
    ) -> Vec<ScoreEntry> {
        let reference = document::analyze(sentence);

        let mut rescored: Vec<ScoreEntry> = candidates
            .into_par_iter()
            .map(|mut entry| {
                let tokens = document::analyze(&entry.source);
                entry.score = self.f1(&tokens, &reference);
                entry
            })
            .collect();

        // `sort_by` is stable: equal scores keep retrieval order.
        rescored.sort_by(|a, b| b.score.total_cmp(&a.score));
        rescored
    }
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 {
        return counts;
    }
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

fn ratio(matches: usize, total: usize, smoothing: f64) -> f64 {
    let denominator = total as f64 + smoothing;
    if denominator == 0.0 {
        return 0.0;
    }
    (matches as f64 + smoothing) / denominator
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn entry(source: &str, score: f32) -> ScoreEntry {
        ScoreEntry {
            memory: 1,
            direction: en_it(),
            source: source.to_string(),
            target: format!("{source} (it)"),
            score,
            owner: None,
        }
    }

    fn en_it() -> LanguagePair {
        LanguagePair::new("en", "it").unwrap()
    }

    fn tokens(s: &str) -> Vec<String> {
        document::analyze(s)
    }

    #[test]
    fn identical_sentences_score_one() {
        let r = F1BleuRescorer::default();
        let t = tokens("the quick brown fox jumps");
        assert!((r.f1(&t, &t) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_sentences_score_zero() {
        let r = F1BleuRescorer::default();
        assert_eq!(r.f1(&tokens("red apple"), &tokens("blue sky")), 0.0);
        assert_eq!(r.f1(&[], &tokens("blue sky")), 0.0);
    }

    #[test]
    fn word_order_matters() {
        let r = F1BleuRescorer::default();
        let query = tokens("the cat sat on the mat");
        let ordered = r.f1(&tokens("the cat sat on a mat"), &query);
        let shuffled = r.f1(&tokens("mat a on sat cat the"), &query);
        assert!(ordered > shuffled);
    }

    #[test]
    fn closer_candidate_moves_first() {
        let candidates = vec![
            entry("a cat slept on the sofa all day long", 9.0),
            entry("the cat sat on the mat", 5.0),
        ];
        let out = F1BleuRescorer::default().rescore(
            &en_it(),
            "The cat sat on the mat.",
            candidates,
            None,
        );
        assert_eq!(out[0].source, "the cat sat on the mat");
        assert!((out[0].score - 1.0).abs() < 1e-6);
        assert!(out[1].score < out[0].score);
    }

    #[test]
    fn empty_candidate_list() {
        let out =
            F1BleuRescorer::default().rescore(&en_it(), "hello", vec![], None);
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn equal_scores_keep_retrieval_order(
            sources in prop::collection::vec(
                prop::sample::select(vec!["the cat", "a dog", "the cat sat"]),
                0..24,
            )
        ) {
            let candidates: Vec<ScoreEntry> = sources
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let mut e = entry(s, 0.0);
                    e.memory = i as u64 + 1;
                    e
                })
                .collect();

            let out = F1BleuRescorer::default().rescore(
                &en_it(),
                "the cat sat",
                candidates,
                None,
            );

            prop_assert_eq!(out.len(), sources.len());
            for pair in out.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].memory < pair[1].memory);
                }
            }
        }
    }
}
