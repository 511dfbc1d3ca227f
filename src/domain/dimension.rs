//! Scoring dimensions and topic categories
//!
//! Both vocabularies are closed: the model is asked to rate exactly these
//! dimensions and to pick categories from exactly this list. Anything else in
//! a model response is dropped during validation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named qualitative axis a post is scored on (1-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Absurdity,
    DiscussionSpark,
    Drama,
    EmotionalIntensity,
    NewsValue,
    PodcastWorthy,
    Readability,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Absurdity,
        Dimension::DiscussionSpark,
        Dimension::Drama,
        Dimension::EmotionalIntensity,
        Dimension::NewsValue,
        Dimension::PodcastWorthy,
        Dimension::Readability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Absurdity => "absurdity",
            Dimension::DiscussionSpark => "discussion_spark",
            Dimension::Drama => "drama",
            Dimension::EmotionalIntensity => "emotional_intensity",
            Dimension::NewsValue => "news_value",
            Dimension::PodcastWorthy => "podcast_worthy",
            Dimension::Readability => "readability",
        }
    }

    /// Rubric line used when prompting the model for this dimension
    pub fn description(&self) -> &'static str {
        match self {
            Dimension::Absurdity => "how strange, ridiculous or unexpected the situation is",
            Dimension::DiscussionSpark => "how likely the post is to start a conversation",
            Dimension::Drama => "amount of conflict, tension or neighborly feuding",
            Dimension::EmotionalIntensity => "strength of the feelings expressed, good or bad",
            Dimension::NewsValue => "whether it reports something new or important locally",
            Dimension::PodcastWorthy => "how well it would work read aloud on a comedy podcast",
            Dimension::Readability => "how clear and easy to follow the writing is",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown dimension '{}'", s))
    }
}

/// Topic category from the fixed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicCategory {
    Crime,
    Drama,
    Humor,
    LocalNews,
    LostPet,
    Noise,
    Suspicious,
    Wildlife,
}

impl TopicCategory {
    pub const ALL: [TopicCategory; 8] = [
        TopicCategory::Crime,
        TopicCategory::Drama,
        TopicCategory::Humor,
        TopicCategory::LocalNews,
        TopicCategory::LostPet,
        TopicCategory::Noise,
        TopicCategory::Suspicious,
        TopicCategory::Wildlife,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCategory::Crime => "crime",
            TopicCategory::Drama => "drama",
            TopicCategory::Humor => "humor",
            TopicCategory::LocalNews => "local_news",
            TopicCategory::LostPet => "lost_pet",
            TopicCategory::Noise => "noise",
            TopicCategory::Suspicious => "suspicious",
            TopicCategory::Wildlife => "wildlife",
        }
    }
}

impl AsRef<str> for TopicCategory {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Validated per-dimension scores, each in [1, 10]
pub type DimensionScores = BTreeMap<Dimension, f64>;

/// Encode scores as a JSON object keyed by dimension name
pub fn scores_to_json(scores: &DimensionScores) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = scores
        .iter()
        .map(|(d, v)| (d.as_str().to_string(), serde_json::json!(v)))
        .collect();
    serde_json::Value::Object(map)
}

/// Decode a stored scores object, skipping unknown keys and non-numeric values
pub fn scores_from_json(value: &serde_json::Value) -> DimensionScores {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Some((k.parse::<Dimension>().ok()?, v.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_round_trip_names() {
        for d in Dimension::ALL {
            assert_eq!(d.as_str().parse::<Dimension>().unwrap(), d);
        }
        assert!("vibes".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_serde_name_matches_as_str() {
        let json = serde_json::to_string(&Dimension::DiscussionSpark).unwrap();
        assert_eq!(json, "\"discussion_spark\"");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("lost_pet".parse::<TopicCategory>().unwrap(), TopicCategory::LostPet);
        assert!("sports".parse::<TopicCategory>().is_err());
        assert_eq!(TopicCategory::LocalNews.as_ref(), "local_news");
    }

    #[test]
    fn test_scores_json_skips_unknown() {
        let value = serde_json::json!({"drama": 7.0, "vibes": 9, "absurdity": "high"});
        let scores = scores_from_json(&value);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&Dimension::Drama], 7.0);

        let encoded = scores_to_json(&scores);
        assert_eq!(encoded["drama"], 7.0);
    }
}
