use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{DEFAULT_LEADERBOARD_SIZE, MAX_LEADERBOARD_SIZE};
use crate::storage::{KeyValueStore, StoreError};
use crate::types::{LeaderboardEntry, LeaderboardResponse};

pub const HIGH_SCORES_KEY: &str = "pacman_high_scores";

const PLACEHOLDER_SCORES: [(&str, u32); 5] = [
    ("player1", 10_000),
    ("player2", 8_000),
    ("player3", 6_000),
    ("player4", 5_000),
    ("player5", 4_000),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredScoreEntry {
    #[serde(rename = "displayName", alias = "display_name")]
    display_name: String,
    #[serde(rename = "bestScore", alias = "best_score")]
    best_score: u32,
    #[serde(rename = "gamesPaid", alias = "games_paid", default)]
    games_paid: u64,
    #[serde(rename = "scoresSubmitted", alias = "scores_submitted", default)]
    scores_submitted: u64,
    #[serde(rename = "updatedAtIso", alias = "updated_at_iso", default)]
    updated_at_iso: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScoresFile<'a> {
    version: u8,
    players: &'a HashMap<u64, StoredScoreEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct ScoresFileRaw {
    version: u8,
    players: HashMap<String, serde_json::Value>,
}

/// Best score per user, persisted as one JSON document under
/// [`HIGH_SCORES_KEY`].
pub struct LeaderboardStore {
    store: Box<dyn KeyValueStore>,
    players: HashMap<u64, StoredScoreEntry>,
    placeholders: bool,
}

impl LeaderboardStore {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        let players = store
            .get(HIGH_SCORES_KEY)
            .map(|text| parse_players(&text))
            .unwrap_or_default();
        Self {
            store,
            players,
            placeholders: false,
        }
    }

    /// Shows the sample board while nobody has submitted a score yet.
    pub fn with_placeholders(mut self, enabled: bool) -> Self {
        self.placeholders = enabled;
        self
    }

    pub fn record_payment(&mut self, user_id: u64, display_name: &str) -> Result<(), StoreError> {
        let previous = self.players.get(&user_id).cloned();
        let now = now_iso();
        let entry = self.entry(user_id, display_name);
        let name = display_name.trim();
        if !name.is_empty() {
            entry.display_name = name.to_string();
        }
        entry.games_paid += 1;
        entry.updated_at_iso = now;
        self.save_or_restore(user_id, previous)
    }

    /// Returns true when `score` beat the stored best.
    pub fn record_score(&mut self, user_id: u64, score: u32) -> Result<bool, StoreError> {
        let previous = self.players.get(&user_id).cloned();
        let now = now_iso();
        let entry = self.entry(user_id, "");
        let improved = entry.scores_submitted == 0 || score > entry.best_score;
        entry.best_score = entry.best_score.max(score);
        entry.scores_submitted += 1;
        entry.updated_at_iso = now;
        self.save_or_restore(user_id, previous)?;
        Ok(improved)
    }

    pub fn top(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(String, u32)> = self
            .players
            .values()
            .filter(|entry| entry.scores_submitted > 0)
            .map(|entry| (entry.display_name.clone(), entry.best_score))
            .collect();
        if rows.is_empty() && self.placeholders {
            rows = PLACEHOLDER_SCORES
                .iter()
                .map(|(name, score)| (name.to_string(), *score))
                .collect();
        }

        rows.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
        });
        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(idx, (display_name, score))| LeaderboardEntry {
                rank: idx + 1,
                display_name,
                score,
            })
            .collect()
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> LeaderboardResponse {
        let limit = requested_limit
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
            .clamp(1, MAX_LEADERBOARD_SIZE);
        LeaderboardResponse {
            generated_at_iso: now_iso(),
            entries: self.top(limit),
        }
    }

    fn entry(&mut self, user_id: u64, display_name: &str) -> &mut StoredScoreEntry {
        self.players
            .entry(user_id)
            .or_insert_with(|| StoredScoreEntry {
                display_name: fallback_name(user_id, display_name),
                best_score: 0,
                games_paid: 0,
                scores_submitted: 0,
                updated_at_iso: String::new(),
            })
    }

    /// Persists the board; on failure puts `user_id` back to `previous` so
    /// memory never runs ahead of the store.
    fn save_or_restore(
        &mut self,
        user_id: u64,
        previous: Option<StoredScoreEntry>,
    ) -> Result<(), StoreError> {
        let Err(error) = self.save() else {
            return Ok(());
        };
        match previous {
            Some(entry) => self.players.insert(user_id, entry),
            None => self.players.remove(&user_id),
        };
        warn!(user_id, %error, "high score write failed, change discarded");
        Err(error)
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let payload = ScoresFile {
            version: 1,
            players: &self.players,
        };
        let text = serde_json::to_string(&payload)
            .map_err(|error| StoreError::Serialize(error.to_string()))?;
        self.store.set(HIGH_SCORES_KEY, text)
    }
}

fn fallback_name(user_id: u64, display_name: &str) -> String {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        format!("user{user_id}")
    } else {
        trimmed.to_string()
    }
}

fn parse_players(text: &str) -> HashMap<u64, StoredScoreEntry> {
    let parsed = match serde_json::from_str::<ScoresFileRaw>(text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            warn!(version = value.version, "unsupported high score version");
            return HashMap::new();
        }
        Err(error) => {
            warn!(%error, "failed to parse stored high scores");
            return HashMap::new();
        }
    };

    let mut players = HashMap::new();
    for (key, raw_value) in parsed.players {
        let Ok(user_id) = key.parse::<u64>() else {
            warn!(key = %key, "skipping high score with a non-numeric user id");
            continue;
        };
        let mut entry: StoredScoreEntry = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(user_id, %error, "skipping malformed high score entry");
                continue;
            }
        };
        entry.display_name = fallback_name(user_id, &entry.display_name);
        players.insert(user_id, entry);
    }
    players
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
