use crate::storage::{KeyValueStore, StoreError};

const SCORES_KEY: &str = "scores";

/// One finished round of one player.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreRecord {
    pub player: String,
    pub score: u32,
}

impl ScoreRecord {
    pub fn new(player: impl Into<String>, score: u32) -> Self {
        Self {
            player: player.into(),
            score,
        }
    }
}

/// Every recorded score, oldest first.
///
/// Data that can't be read back is logged and treated as an empty leaderboard.
pub fn load(durable: &dyn KeyValueStore) -> Vec<ScoreRecord> {
    let stored = match durable.get(SCORES_KEY) {
        Ok(Some(stored)) => stored,
        Ok(None) => return Vec::new(),
        Err(err) => {
            log::warn!("Unable to read the leaderboard: {}", err);
            return Vec::new();
        }
    };

    serde_json::from_str(&stored).unwrap_or_else(|err| {
        log::warn!("Ignoring unreadable leaderboard data: {}", err);
        Vec::new()
    })
}

/// Adds a score after every existing one. Nothing is ever updated or removed.
pub fn append(durable: &dyn KeyValueStore, record: ScoreRecord) -> Result<(), StoreError> {
    let mut scores = load(durable);
    scores.push(record);
    durable.set(SCORES_KEY, &serde_json::to_string(&scores)?)
}
