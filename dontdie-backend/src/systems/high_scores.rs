//! The shared high score table, stored as one JSON object in the main bucket.
//!
//! The table is read on first use in a session, merged in memory and written
//! back whole when the session finishes. Nothing coordinates two sessions
//! doing this at once: if both read the same table before either writes,
//! the second write replaces the first and its new score is lost.

use arrayvec::ArrayVec;
use async_trait::async_trait;
use dontdie_db::DbError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GameError;
use crate::session::Session;

use super::Subsystem;

pub const MAX_HIGH_SCORES: usize = 10;
pub const HIGH_SCORES_KEY: &str = "highscores";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScoreEntry {
    pub score: i64,
    pub username: String,
    pub color: String,
}

/// Scores sorted from best to worst, at most `N` of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighScoreTable<const N: usize = MAX_HIGH_SCORES> {
    scores: ArrayVec<ScoreEntry, N>,
}

#[derive(Deserialize)]
struct StoredTable {
    #[serde(default)]
    scores: Vec<ScoreEntry>,
}

impl<const N: usize> HighScoreTable<N> {
    pub fn new() -> Self {
        Self {
            scores: ArrayVec::new(),
        }
    }

    /// Decode a stored table, restoring order and capacity.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let stored: StoredTable = serde_json::from_slice(body)?;
        Ok(stored.scores.into_iter().collect())
    }

    pub fn scores(&self) -> &[ScoreEntry] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn lowest(&self) -> Option<i64> {
        self.scores.last().map(|entry| entry.score)
    }

    /// Merge a score into the table.
    ///
    /// A full table only takes a score strictly better than its lowest,
    /// which is dropped. Returns whether the score was added.
    pub fn try_insert(&mut self, entry: ScoreEntry) -> bool {
        if self.scores.is_full() {
            match self.lowest() {
                Some(lowest) if entry.score > lowest => {
                    self.scores.pop();
                }
                _ => return false,
            }
        }

        self.scores.push(entry);
        // Stable, so earlier entries stay ahead of equal scores
        self.scores.sort_by(|a, b| b.score.cmp(&a.score));
        true
    }
}

impl<const N: usize> Default for HighScoreTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FromIterator<ScoreEntry> for HighScoreTable<N> {
    fn from_iter<I: IntoIterator<Item = ScoreEntry>>(iter: I) -> Self {
        let mut scores: Vec<ScoreEntry> = iter.into_iter().collect();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(N);
        Self {
            scores: scores.into_iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
struct HighScoreState {
    table: Option<HighScoreTable>,
    dirty: bool,
}

pub struct HighScoreSystem {
    state: Mutex<HighScoreState>,
}

impl HighScoreSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HighScoreState::default()),
        }
    }

    /// The table, fetched from the bucket on first use. A missing object is
    /// an empty table.
    pub async fn get_high_scores(&self, session: &Session) -> Result<HighScoreTable, GameError> {
        let cached = self.state.lock().table.clone();
        if let Some(table) = cached {
            return Ok(table);
        }

        let context = session.context();
        let bucket = &context.settings.main_bucket;
        let table: HighScoreTable = match context.blobs.get_object(bucket, HIGH_SCORES_KEY).await {
            Ok(body) => HighScoreTable::from_json(&body).map_err(|err| GameError::Corrupt {
                what: "high score table",
                reason: err.to_string(),
            })?,
            Err(DbError::NoSuchKey { .. }) => {
                info!(%bucket, "no high score table yet, starting empty");
                HighScoreTable::new()
            }
            Err(err) => return Err(err.into()),
        };

        let mut state = self.state.lock();
        Ok(state.table.get_or_insert(table).clone())
    }

    /// Offer a finished game's score. Returns whether it made the table.
    pub async fn try_add_score(
        &self,
        session: &Session,
        username: Option<&str>,
        score: i64,
        color: Option<&str>,
    ) -> Result<bool, GameError> {
        let (Some(username), Some(color)) = (username, color) else {
            return Err(GameError::InvalidScoreSubmission);
        };
        if username.is_empty() || color.is_empty() {
            return Err(GameError::InvalidScoreSubmission);
        }

        self.get_high_scores(session).await?;

        let mut state = self.state.lock();
        let added = state.table.get_or_insert_with(HighScoreTable::new).try_insert(ScoreEntry {
            score,
            username: username.to_string(),
            color: color.to_string(),
        });
        if added {
            state.dirty = true;
            info!(username, score, "score added to high score table");
        } else {
            debug!(username, score, "score did not make the high score table");
        }
        Ok(added)
    }
}

impl Default for HighScoreSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for HighScoreSystem {
    fn name(&self) -> &'static str {
        "highScoreTable"
    }

    async fn init(&self, _session: &Session) -> Result<(), GameError> {
        Ok(())
    }

    async fn finish(&self, session: &Session) -> Result<(), GameError> {
        let body = {
            let state = self.state.lock();
            match (&state.table, state.dirty) {
                (Some(table), true) => serde_json::to_vec_pretty(table).map_err(|err| GameError::Corrupt {
                    what: "high score table",
                    reason: err.to_string(),
                })?,
                _ => return Ok(()),
            }
        };

        let context = session.context();
        context
            .blobs
            .put_object(&context.settings.main_bucket, HIGH_SCORES_KEY, body)
            .await?;

        self.state.lock().dirty = false;
        info!("high score table saved");
        Ok(())
    }
}
