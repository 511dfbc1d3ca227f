//! ID and timestamp utilities
//!
//! Provides functions for generating job identifiers and the RFC 3339
//! timestamps stored on job, score, and staging rows.

use chrono::{SecondsFormat, Utc};
use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// The fixed width keeps lexicographic order equal to chronological order,
/// which the job queue relies on for "oldest pending first".
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a unique background job ID
///
/// Format: `job-{timestamp_ms}-{random_hex}`
/// Example: `job-1738300800123-a1b2`
pub fn generate_job_id() -> String {
    let random: u16 = rand::rng().random();
    format!("job-{}-{:04x}", now_ms(), random)
}

/// Generate a weight config ID
///
/// Format: `wc-{timestamp_ms}-{random_hex}`
pub fn generate_weight_config_id() -> String {
    let random: u16 = rand::rng().random();
    format!("wc-{}-{:04x}", now_ms(), random)
}
