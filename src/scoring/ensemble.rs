//! Ensemble aggregation
//!
//! Combines several independent scoring runs of the same post into one
//! result. Only error-free runs take part.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{Dimension, DimensionScores, PostScoreResult, TopicCategory};
use crate::scoring::validator::MAX_CATEGORIES;

pub const ALL_RUNS_FAILED: &str = "all ensemble runs failed";

/// Median of `values` (mean of the middle pair for even counts)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Categories ranked by votes, then name; top three
fn vote_categories(runs: &[&PostScoreResult]) -> Vec<TopicCategory> {
    let mut votes: HashMap<TopicCategory, usize> = HashMap::new();
    for run in runs {
        for category in &run.categories {
            *votes.entry(*category).or_default() += 1;
        }
    }

    let mut ranked: Vec<(TopicCategory, usize)> = votes.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    ranked.into_iter().take(MAX_CATEGORIES).map(|(c, _)| c).collect()
}

/// Aggregate one post's per-run results.
///
/// Scores are the per-dimension median; summary and "why" come from the run
/// whose podcast_worthy score is closest to the median (earliest run wins
/// ties). With no successful run the result carries the last run's error.
pub fn aggregate(post_id: &str, runs: &[PostScoreResult]) -> PostScoreResult {
    let successful: Vec<&PostScoreResult> = runs.iter().filter(|r| r.is_ok()).collect();

    if successful.is_empty() {
        let error = runs
            .iter()
            .rev()
            .find_map(|r| r.error.clone())
            .unwrap_or_else(|| ALL_RUNS_FAILED.to_string());
        return PostScoreResult::failed(post_id, error);
    }

    let mut per_dimension: BTreeMap<Dimension, Vec<f64>> = BTreeMap::new();
    for run in &successful {
        for (dimension, value) in &run.scores {
            per_dimension.entry(*dimension).or_default().push(*value);
        }
    }
    let scores: DimensionScores = per_dimension
        .into_iter()
        .filter_map(|(d, values)| median(&values).map(|m| (d, m)))
        .collect();

    let representative = match scores.get(&Dimension::PodcastWorthy) {
        Some(target) => successful
            .iter()
            .min_by(|a, b| {
                let da = distance(a, *target);
                let db = distance(b, *target);
                da.total_cmp(&db)
            })
            .copied()
            .unwrap_or(successful[0]),
        None => successful[0],
    };

    PostScoreResult {
        post_id: post_id.to_string(),
        scores,
        categories: vote_categories(&successful),
        summary: representative.summary.clone(),
        why: representative.why.clone(),
        final_score: None,
        error: None,
    }
}

fn distance(run: &PostScoreResult, target: f64) -> f64 {
    run.scores
        .get(&Dimension::PodcastWorthy)
        .map(|v| (v - target).abs())
        .unwrap_or(f64::INFINITY)
}
