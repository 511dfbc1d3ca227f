//! Score validation
//!
//! Turns one parsed model item into a `PostScoreResult`. Validation never
//! fails: bad values are replaced with neutral defaults and unknown
//! categories are dropped.

use serde_json::Value;

use crate::domain::{Dimension, DimensionScores, PostScoreResult, TopicCategory};

/// Neutral value substituted for missing or out-of-range scores
pub const NEUTRAL_SCORE: f64 = 5.0;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

/// Maximum characters kept for summary and "why" text
pub const MAX_SUMMARY_LENGTH: usize = 500;

/// Maximum categories kept per post
pub const MAX_CATEGORIES: usize = 3;

/// Truncate to at most `max` characters on a char boundary
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// A score value that is numeric and within [1, 10]
pub fn checked_score(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| (MIN_SCORE..=MAX_SCORE).contains(v))
}

/// Validate a single score value: numeric and within [1, 10], else neutral
pub fn validate_score(value: Option<&Value>) -> f64 {
    checked_score(value).unwrap_or(NEUTRAL_SCORE)
}

/// Validate every known dimension from a raw `scores` object
pub fn validate_scores(raw: Option<&Value>) -> DimensionScores {
    Dimension::ALL
        .iter()
        .map(|d| (*d, validate_score(raw.and_then(|s| s.get(d.as_str())))))
        .collect()
}

/// Keep known categories, first occurrence wins, capped at three
pub fn validate_categories(raw: Option<&Value>) -> Vec<TopicCategory> {
    let mut categories = Vec::new();
    let Some(items) = raw.and_then(Value::as_array) else {
        return categories;
    };

    let parsed = items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|s| s.trim().parse::<TopicCategory>().ok());
    for category in parsed {
        if !categories.contains(&category) {
            categories.push(category);
        }
        if categories.len() == MAX_CATEGORIES {
            break;
        }
    }
    categories
}

/// Trim and truncate free text; empty becomes `None`
pub fn normalize_text(raw: Option<&Value>) -> Option<String> {
    let text = raw.and_then(Value::as_str)?.trim();
    let text = truncate_chars(text, MAX_SUMMARY_LENGTH).trim_end();
    if text.is_empty() { None } else { Some(text.to_string()) }
}

/// Validate one model item for `post_id`.
///
/// The "why" text is read from `why_podcast_worthy`, falling back to `why`.
pub fn validate_post(post_id: &str, item: &Value) -> PostScoreResult {
    let why = item.get("why_podcast_worthy").or_else(|| item.get("why"));

    PostScoreResult {
        post_id: post_id.to_string(),
        scores: validate_scores(item.get("scores")),
        categories: validate_categories(item.get("categories")),
        summary: normalize_text(item.get("summary")),
        why: normalize_text(why),
        final_score: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_out_of_range_and_non_numeric_become_neutral() {
        let scores = validate_scores(Some(&json!({
            "absurdity": 11,
            "drama": 0.5,
            "news_value": "9",
            "readability": null,
            "discussion_spark": 7.5,
            "podcast_worthy": 10,
            "emotional_intensity": 1
        })));

        assert_eq!(scores[&Dimension::Absurdity], 5.0);
        assert_eq!(scores[&Dimension::Drama], 5.0);
        assert_eq!(scores[&Dimension::NewsValue], 5.0);
        assert_eq!(scores[&Dimension::Readability], 5.0);
        assert_eq!(scores[&Dimension::DiscussionSpark], 7.5);
        assert_eq!(scores[&Dimension::PodcastWorthy], 10.0);
        assert_eq!(scores[&Dimension::EmotionalIntensity], 1.0);
    }

    #[test]
    fn test_missing_scores_object_defaults_everything() {
        let scores = validate_scores(None);
        assert_eq!(scores.len(), Dimension::ALL.len());
        assert!(scores.values().all(|v| *v == NEUTRAL_SCORE));
    }

    #[test]
    fn test_checked_score_has_no_default() {
        assert_eq!(checked_score(Some(&json!(1))), Some(1.0));
        assert_eq!(checked_score(Some(&json!(10.0))), Some(10.0));
        assert_eq!(checked_score(Some(&json!(42))), None);
        assert_eq!(checked_score(Some(&json!("7"))), None);
        assert_eq!(checked_score(None), None);
    }

    #[test]
    fn test_unknown_categories_dropped() {
        let categories = validate_categories(Some(&json!([
            "humor", "sports", "humor", 42, "crime", "noise", "wildlife"
        ])));
        assert_eq!(
            categories,
            vec![TopicCategory::Humor, TopicCategory::Crime, TopicCategory::Noise]
        );

        assert!(validate_categories(Some(&json!("humor"))).is_empty());
    }

    #[test]
    fn test_text_normalization() {
        assert_eq!(normalize_text(Some(&json!("  hi  "))), Some("hi".to_string()));
        assert_eq!(normalize_text(Some(&json!("   "))), None);
        assert_eq!(normalize_text(Some(&json!(3))), None);
        assert_eq!(normalize_text(None), None);

        let long = "é".repeat(600);
        let truncated = normalize_text(Some(&json!(long))).unwrap();
        assert_eq!(truncated.chars().count(), MAX_SUMMARY_LENGTH);
    }

    #[test]
    fn test_validate_post_reads_why_fallback() {
        let item = json!({
            "scores": {"drama": 8},
            "categories": ["drama"],
            "summary": "Neighbors argue about a fence",
            "why": "Peak pettiness"
        });
        let result = validate_post("p1", &item);

        assert!(result.is_ok());
        assert_eq!(result.post_id, "p1");
        assert_eq!(result.scores[&Dimension::Drama], 8.0);
        assert_eq!(result.why.as_deref(), Some("Peak pettiness"));
        assert!(result.final_score.is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("ñandú", 2), "ña");
    }
}
