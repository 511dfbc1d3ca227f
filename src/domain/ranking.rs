//! Ranking configuration: weight configs, novelty config, topic frequencies

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::dimension::Dimension;
use crate::error::{PostrankError, Result};

/// Rolling per-category counts, keyed by category name
pub type TopicFrequencies = HashMap<String, i64>;

/// Dimension weights used to combine scores into a final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub id: String,
    pub name: String,
    pub weights: BTreeMap<Dimension, f64>,
}

impl WeightConfig {
    /// Build a config from a stored weights object.
    ///
    /// Non-numeric or non-positive weights and unknown dimension names are
    /// dropped with a warning. An empty result is a configuration error.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw: &Value) -> Result<Self> {
        let id = id.into();
        let obj = raw.as_object().ok_or_else(|| {
            PostrankError::Config(format!("Invalid weights format in config {}", id))
        })?;

        let mut weights = BTreeMap::new();
        let mut dropped = Vec::new();
        for (key, value) in obj {
            match (key.parse::<Dimension>(), value.as_f64()) {
                (Ok(dimension), Some(w)) if w > 0.0 && w.is_finite() => {
                    weights.insert(dimension, w);
                }
                _ => dropped.push(key.as_str()),
            }
        }

        if !dropped.is_empty() {
            log::warn!("Dropping invalid weight entries from config {}: {:?}", id, dropped);
        }
        if weights.is_empty() {
            return Err(PostrankError::Config(format!("No valid weights found in config {}", id)));
        }

        Ok(Self {
            id,
            name: name.into(),
            weights,
        })
    }

    /// Built-in weights used when no config is active
    pub fn default_weights() -> BTreeMap<Dimension, f64> {
        BTreeMap::from([
            (Dimension::Absurdity, 2.0),
            (Dimension::DiscussionSpark, 1.0),
            (Dimension::Drama, 1.5),
            (Dimension::EmotionalIntensity, 1.2),
            (Dimension::NewsValue, 1.0),
            (Dimension::PodcastWorthy, 2.0),
            (Dimension::Readability, 1.2),
        ])
    }
}

/// Average-frequency breakpoints for the novelty curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyThresholds {
    pub rare: i64,
    pub common: i64,
    pub very_common: i64,
}

impl Default for FrequencyThresholds {
    fn default() -> Self {
        Self {
            rare: 5,
            common: 30,
            very_common: 100,
        }
    }
}

/// Novelty multiplier bounds and thresholds (stored under the
/// `novelty_config` settings key)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub frequency_thresholds: FrequencyThresholds,
    pub window_days: u32,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            min_multiplier: 0.2,
            max_multiplier: 1.5,
            frequency_thresholds: FrequencyThresholds::default(),
            window_days: 30,
        }
    }
}

impl NoveltyConfig {
    /// Parse a stored settings value, falling back to defaults for anything
    /// missing or unreadable. A config whose bounds or thresholds are out of
    /// order is replaced by the defaults as a whole.
    pub fn from_value(value: &Value) -> Self {
        let config = match serde_json::from_value::<NoveltyConfig>(value.clone()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Invalid novelty_config setting ({}), using defaults", e);
                return NoveltyConfig::default();
            }
        };

        if !config.is_well_formed() {
            log::warn!("novelty_config {:?} is not well formed, using defaults", config);
            return NoveltyConfig::default();
        }
        config
    }

    /// True when min <= 1.0 <= max and thresholds strictly increase
    pub fn is_well_formed(&self) -> bool {
        let t = &self.frequency_thresholds;
        self.min_multiplier <= 1.0
            && 1.0 <= self.max_multiplier
            && t.rare < t.common
            && t.common < t.very_common
    }
}
