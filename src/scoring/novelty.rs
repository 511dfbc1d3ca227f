//! Novelty multiplier
//!
//! Boosts posts about rarely seen topics and damps over-represented ones,
//! based on rolling topic counts. Pure and deterministic.

use crate::domain::{NoveltyConfig, TopicFrequencies};

/// Below this many scored posts frequencies are not meaningful yet
pub const COLD_START_THRESHOLD: i64 = 30;

/// Multiplier for a post's categories given current topic frequencies.
///
/// Piecewise linear in the average category frequency:
/// `max_multiplier` up to `rare`, down to 1.0 at `common`, down to
/// `min_multiplier` at `very_common`, flat beyond.
pub fn novelty<C: AsRef<str>>(
    categories: &[C],
    frequencies: &TopicFrequencies,
    config: &NoveltyConfig,
    total_scored_count: Option<i64>,
) -> f64 {
    if categories.is_empty() || frequencies.is_empty() {
        return 1.0;
    }
    if total_scored_count.is_some_and(|n| n < COLD_START_THRESHOLD) {
        return 1.0;
    }

    let total: i64 = categories
        .iter()
        .map(|c| frequencies.get(c.as_ref()).copied().unwrap_or(0))
        .sum();
    let avg = total as f64 / categories.len() as f64;

    let rare = config.frequency_thresholds.rare as f64;
    let common = config.frequency_thresholds.common as f64;
    let very_common = config.frequency_thresholds.very_common as f64;
    let (min, max) = (config.min_multiplier, config.max_multiplier);

    if avg <= rare {
        max
    } else if avg <= common {
        let width = common - rare;
        if width <= 0.0 {
            return 1.0;
        }
        max - (avg - rare) / width * (max - 1.0)
    } else if avg <= very_common {
        let width = very_common - common;
        if width <= 0.0 {
            return min;
        }
        1.0 - (avg - common) / width * (1.0 - min)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FrequencyThresholds, TopicCategory};

    fn freqs(pairs: &[(&str, i64)]) -> TopicFrequencies {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    const WARM: Option<i64> = Some(1000);

    #[test]
    fn test_empty_inputs_are_neutral() {
        let config = NoveltyConfig::default();
        let empty: [TopicCategory; 0] = [];
        assert_eq!(novelty(&empty, &freqs(&[("humor", 50)]), &config, WARM), 1.0);
        assert_eq!(novelty(&[TopicCategory::Humor], &freqs(&[]), &config, WARM), 1.0);
    }

    #[test]
    fn test_cold_start_is_neutral() {
        let config = NoveltyConfig::default();
        let f = freqs(&[("humor", 500)]);
        for count in [0, 1, 29] {
            assert_eq!(novelty(&[TopicCategory::Humor], &f, &config, Some(count)), 1.0);
        }
        assert_eq!(novelty(&[TopicCategory::Humor], &f, &config, Some(30)), config.min_multiplier);
        // Unknown count skips the cold-start check
        assert_eq!(novelty(&[TopicCategory::Humor], &f, &config, None), config.min_multiplier);
    }

    #[test]
    fn test_bounds_at_thresholds() {
        let config = NoveltyConfig::default();
        for f in [0, 3, 5] {
            assert_eq!(novelty(&["crime"], &freqs(&[("crime", f)]), &config, WARM), 1.5);
        }
        for f in [100, 101, 10_000] {
            assert_eq!(novelty(&["crime"], &freqs(&[("crime", f)]), &config, WARM), 0.2);
        }
        let at_common = novelty(&["crime"], &freqs(&[("crime", 30)]), &config, WARM);
        assert!((at_common - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_midpoints() {
        let config = NoveltyConfig::default();
        let v = novelty(&["noise"], &freqs(&[("noise", 0), ("x", 1)]), &config, WARM);
        assert_eq!(v, 1.5);
        // avg 17.5, halfway between rare (5) and common (30)
        let v = novelty(&["a", "b"], &freqs(&[("a", 10), ("b", 25)]), &config, WARM);
        assert!((v - 1.25).abs() < 1e-12);
        // halfway between common (30) and very_common (100)
        let v = novelty(&["a"], &freqs(&[("a", 65)]), &config, WARM);
        assert!((v - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_missing_category_counts_as_zero() {
        let config = NoveltyConfig::default();
        let v = novelty(&["a", "missing"], &freqs(&[("a", 20)]), &config, WARM);
        // avg = 10
        assert!((v - (1.5 - 5.0 / 25.0 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_monotonically_non_increasing() {
        let config = NoveltyConfig::default();
        let mut previous = f64::INFINITY;
        for f in 0..=150 {
            let v = novelty(&["a"], &freqs(&[("a", f)]), &config, WARM);
            assert!(v <= previous, "novelty rose at frequency {}", f);
            assert!((config.min_multiplier..=config.max_multiplier).contains(&v));
            previous = v;
        }
    }

    #[test]
    fn test_zero_width_intervals_do_not_divide_by_zero() {
        let config = NoveltyConfig {
            frequency_thresholds: FrequencyThresholds {
                rare: 10,
                common: 10,
                very_common: 10,
            },
            ..NoveltyConfig::default()
        };
        assert_eq!(novelty(&["a"], &freqs(&[("a", 10)]), &config, WARM), 1.5);
        assert_eq!(novelty(&["a"], &freqs(&[("a", 11)]), &config, WARM), 0.2);

        let config = NoveltyConfig {
            frequency_thresholds: FrequencyThresholds {
                rare: 20,
                common: 10,
                very_common: 50,
            },
            ..NoveltyConfig::default()
        };
        let v = novelty(&["a"], &freqs(&[("a", 30)]), &config, WARM);
        assert!(v.is_finite());

        let config = NoveltyConfig {
            frequency_thresholds: FrequencyThresholds {
                rare: 5,
                common: 30,
                very_common: 20,
            },
            ..NoveltyConfig::default()
        };
        let v = novelty(&["a"], &freqs(&[("a", 25)]), &config, WARM);
        assert!(v.is_finite());
    }
}
