use std::env;
use std::path::PathBuf;

use crate::quiz::opentdb::DEFAULT_API_URL;

/// Settings read from the environment (and `.env`, if there is one).
/// The bot token itself is picked up by `Bot::from_env`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub dialogue_db: String,
    pub scores_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            api_url: var("TRIVIA_API_URL", DEFAULT_API_URL),
            dialogue_db: var("TRIVIA_DIALOGUE_DB", "db.sqlite"),
            scores_path: var("TRIVIA_SCORES_PATH", "scores.json").into(),
        }
    }
}
