//! Configuration system for Postrank.
//!
//! One YAML file with a section per concern (database, llm, scoring, worker,
//! scraper). Every field has a default, so a partial file is valid.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::Config;

mod global;

/// Load and validate configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. postrank.yml in current directory (project config)
/// 3. ~/.config/postrank/postrank.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<Config> {
    let config = Config::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
