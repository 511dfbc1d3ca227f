//! Weighted final score

use std::collections::BTreeMap;

use crate::domain::{
    Dimension, DimensionScores, NoveltyConfig, PostScoreResult, TopicFrequencies,
};
use crate::scoring::novelty::novelty;
use crate::scoring::validator::{MAX_SCORE, NEUTRAL_SCORE};

/// Weighted score normalized to [0, 10], times `novelty`, clamped to [0, 10].
///
/// Only dimensions present in `weights` contribute; a weighted dimension
/// with no score counts as neutral.
pub fn weighted_score(
    scores: &DimensionScores,
    weights: &BTreeMap<Dimension, f64>,
    novelty: f64,
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut max_possible = 0.0;
    for (dimension, weight) in weights {
        let score = scores.get(dimension).copied().unwrap_or(NEUTRAL_SCORE);
        weighted_sum += score * weight;
        max_possible += MAX_SCORE * weight;
    }

    if max_possible <= 0.0 {
        return 0.0;
    }

    let normalized = weighted_sum / max_possible * 10.0;
    (normalized * novelty).clamp(0.0, 10.0)
}

/// Everything needed to rank a scored post
#[derive(Debug, Clone, Copy)]
pub struct RankingInputs<'a> {
    pub weights: &'a BTreeMap<Dimension, f64>,
    pub novelty: &'a NoveltyConfig,
    pub frequencies: &'a TopicFrequencies,
    pub total_scored_count: Option<i64>,
}

impl RankingInputs<'_> {
    /// Final score for one post's scores and categories
    pub fn score<C: AsRef<str>>(&self, scores: &DimensionScores, categories: &[C]) -> f64 {
        let multiplier =
            novelty(categories, self.frequencies, self.novelty, self.total_scored_count);
        weighted_score(scores, self.weights, multiplier)
    }

    /// Fill `final_score` on every error-free result
    pub fn apply(&self, results: &mut [PostScoreResult]) {
        for result in results.iter_mut().filter(|r| r.is_ok()) {
            result.final_score = Some(self.score(&result.scores, &result.categories));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(Dimension, f64)]) -> BTreeMap<Dimension, f64> {
        pairs.iter().copied().collect()
    }

    fn scores(pairs: &[(Dimension, f64)]) -> DimensionScores {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_two_dimension_linear_check() {
        let w = weights(&[(Dimension::Absurdity, 2.0), (Dimension::Drama, 1.0)]);

        let high = scores(&[(Dimension::Absurdity, 10.0), (Dimension::Drama, 10.0)]);
        let low = scores(&[(Dimension::Absurdity, 1.0), (Dimension::Drama, 1.0)]);
        let high = weighted_score(&high, &w, 1.0);
        let low = weighted_score(&low, &w, 1.0);

        assert!((high - 10.0).abs() < 1e-12);
        assert!((low - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unweighted_dimensions_ignored_and_missing_are_neutral() {
        let w = weights(&[(Dimension::Drama, 1.0), (Dimension::NewsValue, 1.0)]);
        let s = scores(&[(Dimension::Drama, 9.0), (Dimension::Absurdity, 1.0)]);
        // (9 + 5) / 20 * 10
        assert!((weighted_score(&s, &w, 1.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_to_range() {
        let w = weights(&[(Dimension::Drama, 1.0)]);
        let s = scores(&[(Dimension::Drama, 10.0)]);
        assert_eq!(weighted_score(&s, &w, 1.5), 10.0);
        assert_eq!(weighted_score(&s, &w, -1.0), 0.0);
        assert_eq!(weighted_score(&s, &BTreeMap::new(), 1.0), 0.0);
    }

    #[test]
    fn test_apply_skips_error_results() {
        let w = weights(&[(Dimension::Drama, 1.0)]);
        let novelty_config = NoveltyConfig::default();
        let frequencies = TopicFrequencies::new();
        let inputs = RankingInputs {
            weights: &w,
            novelty: &novelty_config,
            frequencies: &frequencies,
            total_scored_count: Some(0),
        };

        let mut results = vec![
            PostScoreResult {
                post_id: "ok".to_string(),
                scores: scores(&[(Dimension::Drama, 6.0)]),
                ..Default::default()
            },
            PostScoreResult::failed("bad", "parse error"),
        ];
        inputs.apply(&mut results);

        assert_eq!(results[0].final_score, Some(6.0));
        assert_eq!(results[1].final_score, None);
    }

    #[test]
    fn test_always_in_range_for_valid_inputs() {
        let w = crate::domain::WeightConfig::default_weights();
        for novelty in [0.2, 0.5, 1.0, 1.5] {
            for value in [1.0, 3.3, 5.0, 10.0] {
                let s: DimensionScores = Dimension::ALL.iter().map(|d| (*d, value)).collect();
                let v = weighted_score(&s, &w, novelty);
                assert!((0.0..=10.0).contains(&v));
            }
        }
    }
}
