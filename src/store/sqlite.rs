//! SQLite-backed JobStore.
//!
//! One connection behind a mutex. Multi-statement operations (job claim,
//! staged promotion, batched upserts) run in a single transaction; the claim
//! uses `BEGIN IMMEDIATE` so concurrent workers serialize on the write lock.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use serde_json::Value;

use crate::domain::{
    BackgroundJob, Dimension, JobStatus, JobType, NoveltyConfig, Post, TopicCategory,
    TopicFrequencies, WeightConfig, scores_from_json, scores_to_json,
};
use crate::error::{PostrankError, Result};
use crate::id::{generate_job_id, generate_weight_config_id, now_rfc3339};
use crate::store::records::{RankedScore, ScoreRecord, StoredScore};
use crate::store::{JobStore, NOVELTY_CONFIG_KEY};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_scores (
    post_id TEXT PRIMARY KEY,
    scores TEXT NOT NULL,
    categories TEXT NOT NULL,
    summary TEXT,
    why_podcast_worthy TEXT,
    final_score REAL,
    model_version TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS weight_configs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    weights TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_frequencies (
    category TEXT PRIMARY KEY,
    count_30d INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT
);

CREATE TABLE IF NOT EXISTS background_jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    params TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    total INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    last_retry_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON background_jobs(status, created_at);

CREATE TABLE IF NOT EXISTS post_scores_staging (
    job_id TEXT NOT NULL,
    post_id TEXT NOT NULL,
    weight_config_id TEXT NOT NULL,
    final_score REAL NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (job_id, post_id)
);

CREATE TABLE IF NOT EXISTS post_scores (
    post_id TEXT NOT NULL,
    weight_config_id TEXT NOT NULL,
    final_score REAL NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (post_id, weight_config_id)
);
"#;

/// Score row (`s`) is a JSON object without the dimension named by ?1.
/// Rows that are not objects can never gain the key, so they are excluded.
const MISSING_DIMENSION: &str = "CASE WHEN NOT json_valid(s.scores) THEN 0 \
     WHEN json_type(s.scores) <> 'object' THEN 0 \
     ELSE json_extract(s.scores, '$.' || ?1) IS NULL END";

const JOB_COLUMNS: &str = "id, job_type, status, params, progress, total, retry_count, \
     max_retries, error_message, created_at, started_at, completed_at, last_retry_at";

/// Clamp an incoming progress value (?1) to the row's total
const CLAMPED_PROGRESS: &str = "CASE WHEN total IS NOT NULL AND ?1 > total THEN total ELSE ?1 END";

impl ToSql for JobType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<BackgroundJob> {
    let raw_params: String = row.get(3)?;
    // Unparseable params are kept as a string so validation reports them
    let params = serde_json::from_str(&raw_params).unwrap_or(Value::String(raw_params));

    Ok(BackgroundJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        status: row.get(2)?,
        params,
        progress: row.get(4)?,
        total: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
        last_retry_at: row.get(12)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        text: row.get(1)?,
    })
}

fn parse_json_column(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

fn categories_json(categories: &[TopicCategory]) -> String {
    let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
}

fn upsert_score_row(
    conn: &Connection,
    record: &ScoreRecord,
    now: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO llm_scores (post_id, scores, categories, summary, why_podcast_worthy,
             final_score, model_version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(post_id) DO UPDATE SET
             scores = excluded.scores,
             categories = excluded.categories,
             summary = excluded.summary,
             why_podcast_worthy = excluded.why_podcast_worthy,
             final_score = excluded.final_score,
             model_version = excluded.model_version,
             updated_at = excluded.updated_at",
        params![
            record.post_id,
            scores_to_json(&record.scores).to_string(),
            categories_json(&record.categories),
            record.summary,
            record.why,
            record.final_score,
            record.model_version,
            now,
        ],
    )
}

/// SQLite implementation of [`JobStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file, creating parent directories
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::init(conn)
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        log::debug!("SQLite schema initialized");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PostrankError::Storage(format!("connection lock poisoned: {}", e)))
    }

    fn job_exists(conn: &Connection, id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM background_jobs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a post with an explicit creation time (ordering in tests)
    pub fn insert_post_at(&self, post: &Post, created_at: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO posts (id, text, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET text = excluded.text",
            params![post.id, post.text, created_at],
        )?;
        Ok(())
    }

    /// Rewrite a score row's creation time (recount window tests)
    pub fn set_score_created_at(&self, post_id: &str, created_at: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE llm_scores SET created_at = ?1 WHERE post_id = ?2",
            params![created_at, post_id],
        )?;
        Ok(())
    }

    /// Overwrite a score row's raw `scores` text (malformed row tests)
    pub fn set_raw_scores(&self, post_id: &str, scores: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE llm_scores SET scores = ?1 WHERE post_id = ?2",
            params![scores, post_id],
        )?;
        Ok(())
    }
}

impl JobStore for SqliteStore {
    fn create_job(
        &self,
        job_type: JobType,
        params: &Value,
        max_retries: u32,
    ) -> Result<BackgroundJob> {
        let id = generate_job_id();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO background_jobs (id, job_type, status, params, max_retries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    job_type,
                    JobStatus::Pending,
                    params.to_string(),
                    max_retries,
                    now_rfc3339()
                ],
            )?;
        }
        log::debug!("Created {} job {}", job_type, id);
        self.get_job(&id)
    }

    fn get_job(&self, id: &str) -> Result<BackgroundJob> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM background_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            job_from_row,
        )
        .optional()?
        .ok_or_else(|| PostrankError::JobNotFound(id.to_string()))
    }

    fn job_status(&self, id: &str) -> Result<JobStatus> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT status FROM background_jobs WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
            .ok_or_else(|| PostrankError::JobNotFound(id.to_string()))
    }

    fn claim_next_job(&self, types: &[JobType]) -> Result<Option<BackgroundJob>> {
        if types.is_empty() {
            return Ok(None);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT id FROM background_jobs WHERE status = 'pending' AND job_type IN ({})
             ORDER BY created_at, rowid LIMIT 1",
            placeholders
        );
        let candidate: Option<String> = tx
            .query_row(&sql, params_from_iter(types.iter()), |row| row.get(0))
            .optional()?;

        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE background_jobs SET status = 'running', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_rfc3339(), id],
        )?;
        if claimed == 0 {
            tx.commit()?;
            return Ok(None);
        }

        let job = tx.query_row(
            &format!("SELECT {} FROM background_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            job_from_row,
        )?;
        tx.commit()?;
        Ok(Some(job))
    }

    fn set_job_total(&self, id: &str, total: i64) -> Result<()> {
        self.conn()?
            .execute("UPDATE background_jobs SET total = ?1 WHERE id = ?2", params![total, id])?;
        Ok(())
    }

    fn set_job_progress(&self, id: &str, progress: i64) -> Result<()> {
        self.conn()?.execute(
            &format!("UPDATE background_jobs SET progress = {} WHERE id = ?2", CLAMPED_PROGRESS),
            params![progress, id],
        )?;
        Ok(())
    }

    fn complete_job(&self, id: &str, progress: Option<i64>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = match progress {
            Some(progress) => conn.execute(
                &format!(
                    "UPDATE background_jobs
                     SET status = 'completed', progress = {}, completed_at = ?3
                     WHERE id = ?2 AND status = 'running'",
                    CLAMPED_PROGRESS
                ),
                params![progress, id, now_rfc3339()],
            )?,
            None => conn.execute(
                "UPDATE background_jobs SET status = 'completed', completed_at = ?1
                 WHERE id = ?2 AND status = 'running'",
                params![now_rfc3339(), id],
            )?,
        };
        Ok(changed > 0)
    }

    fn fail_job(&self, id: &str, message: &str) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE background_jobs SET status = 'error', error_message = ?1, completed_at = ?2
             WHERE id = ?3 AND status = 'running'",
            params![message, now_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    fn requeue_job(&self, id: &str, retry_count: u32, message: &str) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE background_jobs
             SET status = 'pending', retry_count = ?1, error_message = ?2, last_retry_at = ?3
             WHERE id = ?4 AND status = 'running'",
            params![retry_count, message, now_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    fn finish_cancelled(&self, id: &str, progress: i64) -> Result<()> {
        self.conn()?.execute(
            &format!(
                "UPDATE background_jobs SET progress = {}, completed_at = COALESCE(completed_at, ?3)
                 WHERE id = ?2 AND status = 'cancelled'",
                CLAMPED_PROGRESS
            ),
            params![progress, id, now_rfc3339()],
        )?;
        Ok(())
    }

    fn cancel_job(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let cancellable = JobStatus::ALL
            .iter()
            .filter(|status| status.is_cancellable())
            .map(|status| format!("'{}'", status.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = conn.execute(
            &format!(
                "UPDATE background_jobs
                 SET status = 'cancelled',
                     completed_at = CASE WHEN status = 'pending' THEN ?1 ELSE completed_at END
                 WHERE id = ?2 AND status IN ({})",
                cancellable
            ),
            params![now_rfc3339(), id],
        )?;

        if changed == 0 && !Self::job_exists(&conn, id)? {
            return Err(PostrankError::JobNotFound(id.to_string()));
        }
        Ok(changed > 0)
    }

    fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<BackgroundJob>> {
        let conn = self.conn()?;
        let limit = limit as i64;
        let jobs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM background_jobs WHERE status = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                    JOB_COLUMNS
                ))?;
                stmt.query_map(params![status, limit], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM background_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                    JOB_COLUMNS
                ))?;
                stmt.query_map(params![limit], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(jobs)
    }

    fn insert_post(&self, post: &Post) -> Result<()> {
        self.insert_post_at(post, &now_rfc3339())
    }

    fn unscored_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.text FROM posts p
             LEFT JOIN llm_scores s ON s.post_id = p.id
             WHERE s.post_id IS NULL
             ORDER BY p.created_at, p.id
             LIMIT ?1",
        )?;
        let posts = stmt
            .query_map(params![limit as i64], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    fn count_scores(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM llm_scores", [], |row| row.get(0))?)
    }

    fn fetch_scores_page(&self, offset: usize, limit: usize) -> Result<Vec<StoredScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT post_id, scores, categories FROM llm_scores
             ORDER BY post_id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                let scores: String = row.get(1)?;
                let categories: String = row.get(2)?;
                Ok(StoredScore {
                    post_id: row.get(0)?,
                    scores: parse_json_column(&scores),
                    categories: parse_json_column(&categories),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn upsert_scores(&self, records: &[ScoreRecord]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        for record in records {
            upsert_score_row(&tx, record, &now)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_score(&self, record: &ScoreRecord) -> Result<()> {
        let conn = self.conn()?;
        upsert_score_row(&conn, record, &now_rfc3339())?;
        Ok(())
    }

    fn score_record(&self, post_id: &str) -> Result<Option<ScoreRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT post_id, scores, categories, summary, why_podcast_worthy, final_score,
                     model_version
                 FROM llm_scores WHERE post_id = ?1",
                params![post_id],
                |row| {
                    let scores: String = row.get(1)?;
                    let categories: String = row.get(2)?;
                    let categories = parse_json_column(&categories)
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .filter_map(|c| c.parse::<TopicCategory>().ok())
                                .collect()
                        })
                        .unwrap_or_default();
                    Ok(ScoreRecord {
                        post_id: row.get(0)?,
                        scores: scores_from_json(&parse_json_column(&scores)),
                        categories,
                        summary: row.get(3)?,
                        why: row.get(4)?,
                        final_score: row.get(5)?,
                        model_version: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn posts_missing_dimension(
        &self,
        dimension: Dimension,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT p.id, p.text FROM posts p
             JOIN llm_scores s ON s.post_id = p.id
             WHERE {} AND (?2 IS NULL OR p.id > ?2)
             ORDER BY p.id
             LIMIT ?3",
            MISSING_DIMENSION
        ))?;
        let posts = stmt
            .query_map(params![dimension.as_str(), after, limit as i64], post_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    fn count_posts_missing_dimension(&self, dimension: Dimension) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM posts p
                 JOIN llm_scores s ON s.post_id = p.id
                 WHERE {}",
                MISSING_DIMENSION
            ),
            params![dimension.as_str()],
            |row| row.get(0),
        )?)
    }

    fn merge_dimension(&self, dimension: Dimension, updates: &[(String, f64)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        let mut touched = 0;
        for (post_id, value) in updates {
            touched += tx.execute(
                "UPDATE llm_scores SET scores = json_set(scores, '$.' || ?1, ?2), updated_at = ?3
                 WHERE post_id = ?4
                   AND CASE WHEN json_valid(scores) THEN json_type(scores) = 'object' ELSE 0 END",
                params![dimension.as_str(), value, now, post_id],
            )?;
        }
        tx.commit()?;
        Ok(touched)
    }

    fn stage_scores(
        &self,
        job_id: &str,
        weight_config_id: &str,
        scores: &[RankedScore],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO post_scores_staging
                     (job_id, post_id, weight_config_id, final_score, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(job_id, post_id) DO UPDATE SET
                     weight_config_id = excluded.weight_config_id,
                     final_score = excluded.final_score,
                     computed_at = excluded.computed_at",
            )?;
            for score in scores {
                stmt.execute(params![
                    job_id,
                    score.post_id,
                    weight_config_id,
                    score.final_score,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_staging(&self, job_id: &str) -> Result<usize> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM post_scores_staging WHERE job_id = ?1", params![job_id])?;
        Ok(deleted)
    }

    fn count_staged(&self, job_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM post_scores_staging WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?)
    }

    fn apply_staged_scores(&self, job_id: &str, weight_config_id: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let applied = tx.execute(
            "INSERT INTO post_scores (post_id, weight_config_id, final_score, computed_at)
             SELECT post_id, weight_config_id, final_score, computed_at
             FROM post_scores_staging
             WHERE job_id = ?1 AND weight_config_id = ?2
             ON CONFLICT(post_id, weight_config_id) DO UPDATE SET
                 final_score = excluded.final_score,
                 computed_at = excluded.computed_at",
            params![job_id, weight_config_id],
        )?;
        tx.execute("DELETE FROM post_scores_staging WHERE job_id = ?1", params![job_id])?;

        tx.commit()?;
        Ok(applied)
    }

    fn upsert_post_scores(&self, weight_config_id: &str, scores: &[RankedScore]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO post_scores (post_id, weight_config_id, final_score, computed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(post_id, weight_config_id) DO UPDATE SET
                     final_score = excluded.final_score,
                     computed_at = excluded.computed_at",
            )?;
            for score in scores {
                stmt.execute(params![score.post_id, weight_config_id, score.final_score, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn post_score(&self, post_id: &str, weight_config_id: &str) -> Result<Option<f64>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT final_score FROM post_scores WHERE post_id = ?1 AND weight_config_id = ?2",
                params![post_id, weight_config_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn active_weight_config_id(&self) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id FROM weight_configs WHERE is_active = 1
                 ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn weight_config(&self, id: &str) -> Result<Option<WeightConfig>> {
        let row: Option<(String, String)> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT name, weights FROM weight_configs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        match row {
            Some((name, raw)) => {
                let weights: Value = serde_json::from_str(&raw).map_err(|e| {
                    PostrankError::Config(format!("Invalid weights JSON in config {}: {}", id, e))
                })?;
                WeightConfig::from_raw(id, name, &weights).map(Some)
            }
            None => Ok(None),
        }
    }

    fn insert_weight_config(&self, name: &str, weights: &Value, activate: bool) -> Result<String> {
        let id = generate_weight_config_id();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if activate {
            tx.execute("UPDATE weight_configs SET is_active = 0 WHERE is_active = 1", [])?;
        }
        tx.execute(
            "INSERT INTO weight_configs (id, name, weights, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, weights.to_string(), activate, now_rfc3339()],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn novelty_config(&self) -> Result<NoveltyConfig> {
        let raw: Option<String> = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![NOVELTY_CONFIG_KEY],
                |row| row.get(0),
            )
            .optional()?
        };

        Ok(match raw {
            Some(raw) => NoveltyConfig::from_value(&parse_json_column(&raw)),
            None => NoveltyConfig::default(),
        })
    }

    fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    fn topic_frequencies(&self) -> Result<TopicFrequencies> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT category, count_30d FROM topic_frequencies")?;
        let frequencies = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<TopicFrequencies>>()?;
        Ok(frequencies)
    }

    fn topic_frequency(&self, category: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT count_30d FROM topic_frequencies WHERE category = ?1",
                params![category],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn increment_topic_frequencies(&self, counts: &BTreeMap<String, i64>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO topic_frequencies (category, count_30d, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(category) DO UPDATE SET
                     count_30d = count_30d + excluded.count_30d,
                     last_updated = excluded.last_updated",
            )?;
            for (category, count) in counts {
                stmt.execute(params![category, count, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn increment_topic_frequency(&self, category: &str, by: i64) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO topic_frequencies (category, count_30d, last_updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(category) DO UPDATE SET
                 count_30d = count_30d + excluded.count_30d,
                 last_updated = excluded.last_updated",
            params![category, by, now_rfc3339()],
        )?;
        Ok(())
    }

    fn set_topic_frequency(&self, category: &str, count: i64) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO topic_frequencies (category, count_30d, last_updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(category) DO UPDATE SET
                 count_30d = excluded.count_30d,
                 last_updated = excluded.last_updated",
            params![category, count, now_rfc3339()],
        )?;
        Ok(())
    }

    fn recount_topic_frequencies(&self, window_days: u32) -> Result<usize> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(window_days)))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let now = now_rfc3339();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("UPDATE topic_frequencies SET count_30d = 0, last_updated = ?1", params![now])?;
        let categories = tx.execute(
            "INSERT INTO topic_frequencies (category, count_30d, last_updated)
             SELECT c.value, COUNT(*), ?1
             FROM llm_scores s,
                  json_each(CASE WHEN json_valid(s.categories) THEN s.categories ELSE '[]' END) c
             WHERE s.created_at >= ?2
             GROUP BY c.value
             ON CONFLICT(category) DO UPDATE SET
                 count_30d = excluded.count_30d,
                 last_updated = excluded.last_updated",
            params![now, cutoff],
        )?;
        tx.commit()?;

        log::info!(
            "Recounted topic frequencies over {} days: {} categories",
            window_days,
            categories
        );
        Ok(categories)
    }
}
