//! LLM post scorer
//!
//! Scores posts in fixed-size batches, optionally as an ensemble of runs,
//! computes weighted final scores and persists results through the store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::Value;

use crate::domain::{Dimension, NoveltyConfig, Post, PostScoreResult, SaveStats, WeightConfig};
use crate::error::{PostrankError, Result};
use crate::llm::{CompletionRequest, LlmClient};
use crate::scoring::backoff::BackoffPolicy;
use crate::scoring::ensemble::aggregate;
use crate::scoring::final_score::RankingInputs;
use crate::scoring::prompts::{SYSTEM_PROMPT, batch_prompt, dimension_prompt};
use crate::scoring::repair::{JsonCompletion, expect_array};
use crate::scoring::validator::{checked_score, validate_post};
use crate::store::{JobStore, RankedScore, ScoreRecord};

pub const EMPTY_POST_TEXT: &str = "Empty post text";
pub const MISSING_BATCH_RESULT: &str = "Missing result in batch response";

/// Tunables for [`LlmScorer`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerSettings {
    /// Posts per model call
    pub batch_size: usize,
    /// Runs per batch; 1 disables ensemble mode
    pub ensemble_runs: usize,
    pub ensemble_temperature: f32,
    pub temperature: f32,
    pub max_tokens_per_post: u32,
    /// Completion attempts including JSON correction turns
    pub parse_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Overrides the client's default model
    pub model: Option<String>,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            ensemble_runs: 3,
            ensemble_temperature: 0.7,
            temperature: 0.3,
            max_tokens_per_post: 500,
            parse_attempts: 3,
            backoff: BackoffPolicy::default(),
            model: None,
        }
    }
}

/// Ranking configuration loaded once per scorer
#[derive(Debug, Clone)]
struct RankingConfig {
    weight_config_id: Option<String>,
    weights: BTreeMap<Dimension, f64>,
    novelty: NoveltyConfig,
}

pub struct LlmScorer {
    client: Arc<dyn LlmClient>,
    store: Arc<dyn JobStore>,
    settings: ScorerSettings,
    ranking: Mutex<Option<RankingConfig>>,
}

impl LlmScorer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Arc<dyn JobStore>,
        settings: ScorerSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            ranking: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    /// Model name recorded on score rows
    pub fn model_version(&self) -> String {
        self.settings
            .model
            .clone()
            .unwrap_or_else(|| self.client.model().to_string())
    }

    fn json(&self) -> JsonCompletion<'_> {
        JsonCompletion {
            client: self.client.as_ref(),
            backoff: &self.settings.backoff,
            max_attempts: self.settings.parse_attempts,
        }
    }

    fn request(&self, prompt: String, post_count: usize, temperature: f32) -> CompletionRequest {
        let max_tokens = self
            .settings
            .max_tokens_per_post
            .saturating_mul(post_count.max(1) as u32);
        let mut request = CompletionRequest::new(SYSTEM_PROMPT)
            .with_user_message(prompt)
            .with_max_tokens(max_tokens)
            .with_temperature(temperature);
        request.model = self.settings.model.clone();
        request
    }

    /// Score posts batch by batch, preserving input order.
    ///
    /// A failed batch turns into error results for its own posts only.
    pub async fn score_posts(&self, posts: &[Post]) -> Vec<PostScoreResult> {
        let batch_size = self.settings.batch_size.max(1);
        let mut results = Vec::with_capacity(posts.len());

        for (batch_index, chunk) in posts.chunks(batch_size).enumerate() {
            let mut slots: Vec<Option<PostScoreResult>> = vec![None; chunk.len()];
            let mut scorable = Vec::new();
            let mut positions = Vec::new();

            for (i, post) in chunk.iter().enumerate() {
                if post.text.trim().is_empty() {
                    slots[i] = Some(PostScoreResult::failed(&post.id, EMPTY_POST_TEXT));
                } else {
                    scorable.push(post.clone());
                    positions.push(i);
                }
            }

            if !scorable.is_empty() {
                match self.score_batch(&scorable).await {
                    Ok(batch) => {
                        for (position, result) in positions.iter().zip(batch) {
                            slots[*position] = Some(result);
                        }
                    }
                    Err(e) => {
                        let ids: Vec<&str> = scorable.iter().map(|p| p.id.as_str()).collect();
                        log::error!("Batch {} failed for posts {:?}: {}", batch_index, ids, e);
                        for (position, post) in positions.iter().zip(&scorable) {
                            slots[*position] =
                                Some(PostScoreResult::failed(&post.id, e.to_string()));
                        }
                    }
                }
            }

            results.extend(slots.into_iter().zip(chunk).map(|(slot, post)| {
                slot.unwrap_or_else(|| PostScoreResult::failed(&post.id, MISSING_BATCH_RESULT))
            }));
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        log::info!("Scored {} posts ({} failed)", results.len(), failed);
        results
    }

    /// Score one batch, as an ensemble when more than one run is configured
    pub async fn score_batch(&self, posts: &[Post]) -> Result<Vec<PostScoreResult>> {
        let runs = self.settings.ensemble_runs.max(1);
        if runs == 1 {
            return self.score_batch_once(posts, self.settings.temperature).await;
        }

        let temperature = self.settings.ensemble_temperature;
        let outcomes =
            join_all((0..runs).map(|_| self.score_batch_once(posts, temperature))).await;

        for (run, outcome) in outcomes.iter().enumerate() {
            if let Err(e) = outcome {
                log::warn!("Ensemble run {}/{} failed: {}", run + 1, runs, e);
            }
        }

        let aggregated = posts
            .iter()
            .enumerate()
            .map(|(i, post)| {
                let per_run: Vec<PostScoreResult> = outcomes
                    .iter()
                    .map(|outcome| match outcome {
                        Ok(results) => results.get(i).cloned().unwrap_or_else(|| {
                            PostScoreResult::failed(&post.id, MISSING_BATCH_RESULT)
                        }),
                        Err(e) => PostScoreResult::failed(&post.id, e.to_string()),
                    })
                    .collect();
                aggregate(&post.id, &per_run)
            })
            .collect();

        Ok(aggregated)
    }

    /// One model call for a batch, results aligned with `posts`
    async fn score_batch_once(
        &self,
        posts: &[Post],
        temperature: f32,
    ) -> Result<Vec<PostScoreResult>> {
        let request = self.request(batch_prompt(posts), posts.len(), temperature);
        let items = self.json().run(request, expect_array).await?;

        Ok(posts
            .iter()
            .enumerate()
            .map(|(position, post)| match find_item(&items, position, &post.id) {
                Some(item) => validate_post(&post.id, item),
                None => PostScoreResult::failed(&post.id, MISSING_BATCH_RESULT),
            })
            .collect())
    }

    /// Score a single dimension for each post.
    ///
    /// Posts with empty text, absent from the model reply, or given no usable
    /// value are left out of the returned pairs. Exhausted API or parse
    /// retries are returned as errors.
    pub async fn score_single_dimension(
        &self,
        posts: &[Post],
        dimension: Dimension,
    ) -> Result<Vec<(String, f64)>> {
        let mut values = Vec::new();

        for chunk in posts.chunks(self.settings.batch_size.max(1)) {
            let scorable: Vec<Post> =
                chunk.iter().filter(|p| !p.text.trim().is_empty()).cloned().collect();
            if scorable.is_empty() {
                continue;
            }

            let request = self.request(
                dimension_prompt(&scorable, dimension),
                scorable.len(),
                self.settings.temperature,
            );
            let items = self.json().run(request, expect_array).await?;

            for (position, post) in scorable.iter().enumerate() {
                let Some(item) = find_item(&items, position, &post.id) else {
                    log::warn!("No {} value returned for post {}", dimension, post.id);
                    continue;
                };
                match checked_score(item.get(dimension.as_str())) {
                    Some(value) => values.push((post.id.clone(), value)),
                    None => log::warn!(
                        "Unusable {} value {:?} for post {}, skipping",
                        dimension,
                        item.get(dimension.as_str()),
                        post.id
                    ),
                }
            }
        }

        Ok(values)
    }

    fn ranking_config(&self) -> Result<RankingConfig> {
        let mut cached = self
            .ranking
            .lock()
            .map_err(|e| PostrankError::Storage(format!("ranking cache poisoned: {}", e)))?;
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }

        let weight_config_id = self.store.active_weight_config_id()?;
        let weights = match weight_config_id.as_deref() {
            Some(id) => match self.store.weight_config(id) {
                Ok(Some(config)) => config.weights,
                Ok(None) => {
                    log::warn!("Active weight config {} not found, using default weights", id);
                    WeightConfig::default_weights()
                }
                Err(e) => {
                    log::warn!(
                        "Active weight config {} unusable ({}), using default weights",
                        id,
                        e
                    );
                    WeightConfig::default_weights()
                }
            },
            None => WeightConfig::default_weights(),
        };

        let config = RankingConfig {
            weight_config_id,
            weights,
            novelty: self.store.novelty_config()?,
        };
        *cached = Some(config.clone());
        Ok(config)
    }

    /// Fill `final_score` on every successful result
    pub fn calculate_final_scores(&self, results: &mut [PostScoreResult]) -> Result<()> {
        let config = self.ranking_config()?;
        let frequencies = self.store.topic_frequencies()?;
        let total_scored_count = self.store.count_scores()?;

        RankingInputs {
            weights: &config.weights,
            novelty: &config.novelty,
            frequencies: &frequencies,
            total_scored_count: Some(total_scored_count),
        }
        .apply(results);
        Ok(())
    }

    /// Persist successful results, bump topic counters and write live
    /// ranking rows for the active weight config
    pub fn save_scores(&self, results: &[PostScoreResult]) -> SaveStats {
        let mut stats = SaveStats::default();
        let model_version = self.model_version();

        let (ok, failed): (Vec<&PostScoreResult>, Vec<&PostScoreResult>) =
            results.iter().partition(|r| r.is_ok());
        stats.skipped = failed.len();

        let records: Vec<ScoreRecord> = ok
            .iter()
            .map(|r| ScoreRecord::from_result(r, &model_version))
            .collect();
        let saved: Vec<&PostScoreResult> = match self.store.upsert_scores(&records) {
            Ok(()) => ok,
            Err(e) => {
                log::warn!("Batched score upsert failed ({}), saving rows individually", e);
                ok.into_iter()
                    .zip(&records)
                    .filter_map(|(result, record)| match self.store.upsert_score(record) {
                        Ok(()) => Some(result),
                        Err(e) => {
                            log::error!("Error saving score for post {}: {}", record.post_id, e);
                            stats.errors += 1;
                            None
                        }
                    })
                    .collect()
            }
        };
        stats.saved = saved.len();

        self.update_topic_frequencies(&saved);
        if let Err(e) = self.write_rankings(&saved) {
            log::error!("Failed to write ranking rows: {}", e);
        }

        log::info!(
            "Saved {} scores, skipped {}, errors {}",
            stats.saved,
            stats.skipped,
            stats.errors
        );
        stats
    }

    fn update_topic_frequencies(&self, saved: &[&PostScoreResult]) {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for result in saved {
            for category in &result.categories {
                *counts.entry(category.as_str().to_string()).or_default() += 1;
            }
        }
        if counts.is_empty() {
            return;
        }

        let Err(e) = self.store.increment_topic_frequencies(&counts) else {
            return;
        };
        log::debug!("Batched topic frequency increment failed: {}", e);

        for (category, count) in &counts {
            if let Err(e) = self.store.increment_topic_frequency(category, *count) {
                log::debug!("Increment failed for category {}: {}", category, e);
                let updated = self.store.topic_frequency(category).and_then(|current| {
                    self.store
                        .set_topic_frequency(category, current.unwrap_or(0) + count)
                });
                if let Err(e) = updated {
                    log::warn!("Failed to update topic frequency for {}: {}", category, e);
                }
            }
        }
    }

    fn write_rankings(&self, saved: &[&PostScoreResult]) -> Result<()> {
        let config = self.ranking_config()?;
        let Some(weight_config_id) = config.weight_config_id else {
            log::debug!("No active weight config, skipping ranking rows");
            return Ok(());
        };

        let rows: Vec<RankedScore> = saved
            .iter()
            .filter_map(|r| r.final_score.map(|score| RankedScore::new(&r.post_id, score)))
            .collect();
        if rows.is_empty() {
            return Ok(());
        }

        self.store.upsert_post_scores(&weight_config_id, &rows)
    }

    /// Real-time entry point: score unscored posts, rank and persist them
    pub async fn score_unscored(&self, limit: usize) -> Result<SaveStats> {
        let posts = self.store.unscored_posts(limit)?;
        if posts.is_empty() {
            log::info!("No unscored posts");
            return Ok(SaveStats::default());
        }

        log::info!("Scoring {} unscored posts", posts.len());
        let mut results = self.score_posts(&posts).await;
        self.calculate_final_scores(&mut results)?;
        Ok(self.save_scores(&results))
    }
}

/// Locate the reply item for a post: by `post_index`, then `post_id`, then
/// by position when the item carries neither key
fn find_item<'a>(items: &'a [Value], position: usize, post_id: &str) -> Option<&'a Value> {
    items
        .iter()
        .find(|item| item.get("post_index").and_then(Value::as_u64) == Some(position as u64))
        .or_else(|| {
            items
                .iter()
                .find(|item| item.get("post_id").and_then(Value::as_str) == Some(post_id))
        })
        .or_else(|| {
            items
                .get(position)
                .filter(|item| item.get("post_index").is_none() && item.get("post_id").is_none())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TopicCategory;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::store::SqliteStore;
    use serde_json::json;

    fn settings(ensemble_runs: usize) -> ScorerSettings {
        ScorerSettings {
            ensemble_runs,
            backoff: BackoffPolicy::immediate(1),
            ..Default::default()
        }
    }

    fn item(index: usize, drama: f64, categories: &[&str]) -> Value {
        json!({
            "post_index": index,
            "scores": {"drama": drama, "podcast_worthy": drama},
            "categories": categories,
            "summary": format!("summary {}", index),
            "why_podcast_worthy": "funny",
        })
    }

    fn reply(items: &[Value]) -> String {
        Value::Array(items.to_vec()).to_string()
    }

    fn scorer(
        mock: MockLlmClient,
        runs: usize,
    ) -> (Arc<MockLlmClient>, Arc<SqliteStore>, LlmScorer) {
        let mock = Arc::new(mock);
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scorer = LlmScorer::new(mock.clone(), store.clone(), settings(runs));
        (mock, store, scorer)
    }

    #[tokio::test]
    async fn test_score_posts_single_run() {
        let posts = vec![Post::new("a", "gnome stolen"), Post::new("b", "owl hooting")];
        let mock = MockLlmClient::with_texts([reply(&[
            item(1, 8.0, &["wildlife"]),
            item(0, 3.0, &["crime"]),
        ])]);
        let (mock, _, scorer) = scorer(mock, 1);

        let results = scorer.score_posts(&posts).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].post_id, "a");
        assert_eq!(results[0].scores[&Dimension::Drama], 3.0);
        assert_eq!(results[0].categories, vec![TopicCategory::Crime]);
        assert_eq!(results[1].scores[&Dimension::Drama], 8.0);
        assert_eq!(results[1].scores[&Dimension::Readability], 5.0);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_not_sent() {
        let posts = vec![Post::new("blank", "   "), Post::new("b", "owl")];
        let mock = MockLlmClient::with_texts([reply(&[item(0, 6.0, &[])])]);
        let (mock, _, scorer) = scorer(mock, 1);

        let results = scorer.score_posts(&posts).await;

        assert_eq!(results[0].error.as_deref(), Some(EMPTY_POST_TEXT));
        assert!(results[1].is_ok());
        assert!(!mock.requests()[0].messages[0].content.contains("blank"));
    }

    #[tokio::test]
    async fn test_batch_failure_is_isolated() {
        let posts: Vec<Post> = (0..6).map(|i| Post::new(format!("p{}", i), "text")).collect();
        let first_batch: Vec<Value> = (0..5).map(|i| item(i, 5.0, &[])).collect();
        let mock = MockLlmClient::new(vec![
            Ok(reply(&first_batch)),
            Err(LlmError::ApiError {
                status: 400,
                message: "bad request".to_string(),
            }),
        ]);
        let (_, _, scorer) = scorer(mock, 1);

        let results = scorer.score_posts(&posts).await;

        assert_eq!(results.len(), 6);
        assert!(results[..5].iter().all(|r| r.is_ok()));
        assert!(results[5].error.as_deref().unwrap().contains("bad request"));
    }

    #[tokio::test]
    async fn test_missing_item_marks_post_failed() {
        let posts = vec![Post::new("a", "one"), Post::new("b", "two")];
        let mock = MockLlmClient::with_texts([reply(&[item(0, 4.0, &[])])]);
        let (_, _, scorer) = scorer(mock, 1);

        let results = scorer.score_posts(&posts).await;
        assert!(results[0].is_ok());
        assert_eq!(results[1].error.as_deref(), Some(MISSING_BATCH_RESULT));
    }

    #[tokio::test]
    async fn test_ensemble_takes_median() {
        let posts = vec![Post::new("a", "drama at the HOA")];
        let mock = MockLlmClient::with_texts([
            reply(&[item(0, 3.0, &["drama"])]),
            reply(&[item(0, 7.0, &["drama", "humor"])]),
            reply(&[item(0, 5.0, &["humor", "drama"])]),
        ]);
        let (mock, _, scorer) = scorer(mock, 3);

        let results = scorer.score_posts(&posts).await;

        assert_eq!(mock.call_count(), 3);
        assert_eq!(results[0].scores[&Dimension::Drama], 5.0);
        assert_eq!(results[0].categories[0], TopicCategory::Drama);
        assert!(mock.requests().iter().all(|r| r.temperature == Some(0.7)));
    }

    #[tokio::test]
    async fn test_ensemble_survives_one_failed_run() {
        let posts = vec![Post::new("a", "text")];
        let mock = MockLlmClient::new(vec![
            Ok(reply(&[item(0, 4.0, &[])])),
            Err(LlmError::ApiError {
                status: 400,
                message: "nope".to_string(),
            }),
            Ok(reply(&[item(0, 8.0, &[])])),
        ]);
        let (_, _, scorer) = scorer(mock, 3);

        let results = scorer.score_posts(&posts).await;
        assert!(results[0].is_ok());
        assert_eq!(results[0].scores[&Dimension::Drama], 6.0);
    }

    #[tokio::test]
    async fn test_score_single_dimension() {
        let posts = vec![Post::new("a", "one"), Post::new("b", ""), Post::new("c", "three")];
        let mock = MockLlmClient::with_texts([json!([
            {"post_index": 0, "readability": 9},
            {"post_index": 1, "readability": 42},
        ])
        .to_string()]);
        let (_, _, scorer) = scorer(mock, 1);

        let values = scorer.score_single_dimension(&posts, Dimension::Readability).await.unwrap();
        assert_eq!(values, vec![("a".to_string(), 9.0)]);
    }

    #[tokio::test]
    async fn test_score_single_dimension_skips_missing_values() {
        let posts = vec![Post::new("a", "one"), Post::new("b", "two"), Post::new("c", "three")];
        let mock = MockLlmClient::with_texts([json!([
            {"post_index": 0, "drama": "high"},
            {"post_index": 1, "summary": "no drama key"},
            {"post_index": 2, "drama": 3.5},
        ])
        .to_string()]);
        let (_, _, scorer) = scorer(mock, 1);

        let values = scorer.score_single_dimension(&posts, Dimension::Drama).await.unwrap();
        assert_eq!(values, vec![("c".to_string(), 3.5)]);
    }

    #[tokio::test]
    async fn test_score_single_dimension_raises_after_parse_attempts() {
        let posts = vec![Post::new("a", "one")];
        let mock = MockLlmClient::with_texts(["nope", "still nope", "never"]);
        let (mock, _, scorer) = scorer(mock, 1);

        let err = scorer
            .score_single_dimension(&posts, Dimension::Drama)
            .await
            .unwrap_err();
        assert!(matches!(err, PostrankError::Parse { attempts: 3, .. }));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_final_scores_use_active_weights() {
        let mock = MockLlmClient::with_texts(Vec::<String>::new());
        let (_, store, scorer) = scorer(mock, 1);
        store
            .insert_weight_config("two dims", &json!({"absurdity": 2.0, "drama": 1.0}), true)
            .unwrap();

        let mut results = vec![
            PostScoreResult {
                post_id: "hi".to_string(),
                scores: [(Dimension::Absurdity, 10.0), (Dimension::Drama, 10.0)]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
            PostScoreResult {
                post_id: "lo".to_string(),
                scores: [(Dimension::Absurdity, 1.0), (Dimension::Drama, 1.0)]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
            PostScoreResult::failed("bad", "boom"),
        ];
        scorer.calculate_final_scores(&mut results).unwrap();

        assert!((results[0].final_score.unwrap() - 10.0).abs() < 1e-9);
        assert!((results[1].final_score.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(results[2].final_score, None);
    }

    #[tokio::test]
    async fn test_save_scores_persists_counts_and_rankings() {
        let mock = MockLlmClient::with_texts(Vec::<String>::new());
        let (_, store, scorer) = scorer(mock, 1);
        let wc = store.insert_weight_config("active", &json!({"drama": 1.0}), true).unwrap();

        let mut ok = PostScoreResult {
            post_id: "a".to_string(),
            scores: [(Dimension::Drama, 8.0)].into_iter().collect(),
            categories: vec![TopicCategory::Humor, TopicCategory::Noise],
            ..Default::default()
        };
        ok.final_score = Some(8.0);
        let results = vec![ok, PostScoreResult::failed("b", "parse failed")];

        let stats = scorer.save_scores(&results);

        assert_eq!(stats, SaveStats { saved: 1, skipped: 1, errors: 0 });
        assert_eq!(store.count_scores().unwrap(), 1);
        assert_eq!(store.score_record("a").unwrap().unwrap().model_version, "mock-model");
        assert_eq!(store.topic_frequency("humor").unwrap(), Some(1));
        assert_eq!(store.post_score("a", &wc).unwrap(), Some(8.0));
        assert!(store.score_record("b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_score_unscored_end_to_end() {
        let mock = MockLlmClient::with_texts([reply(&[item(0, 7.0, &["noise"])])]);
        let (_, store, scorer) = scorer(mock, 1);
        store.insert_post(&Post::new("p1", "leaf blower at 6am")).unwrap();

        let stats = scorer.score_unscored(10).await.unwrap();

        assert_eq!(stats.saved, 1);
        assert!(store.unscored_posts(10).unwrap().is_empty());
        let record = store.score_record("p1").unwrap().unwrap();
        assert!(record.final_score.is_some());
        assert_eq!(record.summary.as_deref(), Some("summary 0"));
    }

    #[test]
    fn test_find_item_fallbacks() {
        let items = vec![json!({"post_id": "b"}), json!({"x": 1})];
        assert_eq!(find_item(&items, 0, "b"), Some(&items[0]));
        assert_eq!(find_item(&items, 1, "zzz"), Some(&items[1]));
        assert_eq!(find_item(&items, 0, "zzz"), None);
    }
}
