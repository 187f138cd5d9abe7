//! The player playing the game.
//!
//! Persisted player data lives in the player table and is cached in a
//! [`DirtyRecord`]. Every change goes through the record's write path so the
//! player's `finish` writes back exactly the fields that were touched.

use async_trait::async_trait;
use dontdie_db::Record;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::GameError;
use crate::helpers::{elapsed_seconds, format_time, parse_stored_time};
use crate::output::{EndGameInfo, PlayerUpdate};
use crate::record::DirtyRecord;
use crate::session::Session;

use super::{FinishTier, ItemManager, Subsystem};

pub const PLAYER_KEY_NAME: &str = "PlayerID";

/// Columns read from the player table.
pub const PLAYER_FIELDS: [&str; 10] = [
    "StartGameTime",
    "EndGameTime",
    "Username",
    "LastDailyGiftTime",
    "Inventory",
    "ActiveMission",
    "TotalScore",
    "LastScore",
    "Achievements",
    "FavoriteColor",
];

/// The one mission a player may be working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActiveMission {
    pub mission_id: String,
    pub num_games_completed: u32,
}

impl ActiveMission {
    pub fn new(mission_id: &str) -> Self {
        Self {
            mission_id: mission_id.to_string(),
            num_games_completed: 0,
        }
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    record: DirtyRecord,
    /// Items that only last for this session, like the shield.
    session_inventory: Vec<String>,
    game_ended: bool,
}

pub struct PlayerSystem {
    state: Mutex<PlayerState>,
}

impl PlayerSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlayerState::default()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().record.is_loaded()
    }

    /// Treat a player that was not found as a new, writable record.
    pub fn mark_loaded(&self) {
        self.state.lock().record.mark_loaded();
    }

    fn require_loaded(&self) -> Result<(), GameError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(GameError::PlayerNotLoaded)
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.state.lock().record.get(name).cloned()
    }

    /// A field as text, with non-string values rendered as JSON.
    pub fn string_field(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(text) => Some(text),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Copy of every loaded field, for evaluating criteria.
    pub fn fields_snapshot(&self) -> Record {
        self.state.lock().record.fields().clone()
    }

    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<(), GameError> {
        self.state.lock().record.set(name, value)
    }

    pub fn active_mission(&self) -> Result<Option<ActiveMission>, GameError> {
        match self.field("ActiveMission") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| GameError::Corrupt {
                    what: "ActiveMission",
                    reason: err.to_string(),
                }),
        }
    }

    pub fn has_active_mission(&self) -> bool {
        matches!(self.field("ActiveMission"), Some(Value::Object(map)) if !map.is_empty())
    }

    /// Store the active mission, or clear it with `None`.
    pub fn set_active_mission(&self, mission: Option<&ActiveMission>) -> Result<(), GameError> {
        let value = match mission {
            Some(mission) => serde_json::to_value(mission).map_err(|err| GameError::Corrupt {
                what: "ActiveMission",
                reason: err.to_string(),
            })?,
            None => json!({}),
        };
        self.set_field("ActiveMission", value)
    }

    pub fn has_achievement(&self, name: &str) -> bool {
        let state = self.state.lock();
        matches!(state.record.get("Achievements"), Some(Value::Object(map)) if map.contains_key(name))
    }

    /// Record an achievement. Returns `false` if the player already had it.
    pub fn grant_achievement(&self, name: &str) -> Result<bool, GameError> {
        let mut state = self.state.lock();
        let mut achievements = match state.record.get("Achievements") {
            Some(Value::Object(map)) => map.clone(),
            _ => Record::new(),
        };
        if achievements.contains_key(name) {
            return Ok(false);
        }
        achievements.insert(name.to_string(), json!(1));
        state.record.set("Achievements", achievements)?;
        Ok(true)
    }

    /// Tell the player about a reward, granting `item` if there is one.
    ///
    /// The item is looked up before anything changes, so an unknown item
    /// leaves both the output and the record untouched.
    pub fn add_update(
        &self,
        session: &Session,
        title: &str,
        desc: &str,
        item: Option<&str>,
    ) -> Result<(), GameError> {
        let granted = match item {
            Some(name) => {
                self.require_loaded()?;
                let data = session.systems().items.item(name)?;
                Some((
                    name.to_string(),
                    ItemManager::icon(data).map(str::to_string),
                    ItemManager::is_persistent(data),
                ))
            }
            None => None,
        };

        if let Some((name, _, persistent)) = &granted {
            self.add_to_inventory(name, *persistent)?;
        }

        let (item, item_icon) = match granted {
            Some((name, icon, _)) => (Some(name), icon),
            None => (None, None),
        };
        info!(player_id = %session.player_id(), title, item = ?item, "player update");
        session.with_output(|output| {
            output.player.updates.push(PlayerUpdate {
                title: title.to_string(),
                desc: desc.to_string(),
                item,
                item_icon,
            })
        });
        Ok(())
    }

    fn add_to_inventory(&self, item: &str, persistent: bool) -> Result<(), GameError> {
        let mut state = self.state.lock();
        if !persistent {
            state.session_inventory.push(item.to_string());
            return Ok(());
        }

        let mut inventory = match state.record.get("Inventory") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        inventory.push(Value::String(item.to_string()));
        state.record.set("Inventory", inventory)
    }

    /// Items granted this session that are not persisted.
    pub fn session_inventory(&self) -> Vec<String> {
        self.state.lock().session_inventory.clone()
    }

    pub fn game_just_ended(&self) -> bool {
        self.state.lock().game_ended
    }

    /// The player was just dropped back into the game world.
    pub fn start_game(&self, session: &Session) -> Result<(), GameError> {
        self.require_loaded()?;
        let now = format_time(session.local_now());
        let mut state = self.state.lock();
        state.record.set("StartGameTime", now)?;
        Ok(())
    }

    /// The player just died. Scores the game and offers it to the high
    /// score table.
    pub async fn end_game(&self, session: &Session) -> Result<(), GameError> {
        self.require_loaded()?;
        let end = session.local_now();
        let end_text = format_time(end);

        let score = {
            let mut state = self.state.lock();
            state.game_ended = true;
            state.record.set("EndGameTime", end_text.clone())?;

            let start = match state.record.get("StartGameTime") {
                Some(Value::String(text)) => parse_stored_time(text),
                _ => None,
            };
            let score = match start {
                Some(start) => elapsed_seconds(start, end).max(0),
                None => {
                    warn!(player_id = %session.player_id(), "game ended without a readable start time");
                    0
                }
            };

            let total = match state.record.get("TotalScore") {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| GameError::Corrupt {
                    what: "TotalScore",
                    reason: format!("expected an integer, found {value}"),
                })?,
            };
            state.record.set("TotalScore", total + score)?;
            state.record.set("LastScore", score)?;
            score
        };

        let username = self.string_field("Username");
        let color = self.string_field("FavoriteColor");
        let made_high_score_table = session
            .systems()
            .high_scores
            .try_add_score(session, username.as_deref(), score, color.as_deref())
            .await?;

        info!(player_id = %session.player_id(), score, made_high_score_table, "game ended");
        session.with_output(|output| {
            output.player.end_game_info = Some(EndGameInfo {
                score,
                made_high_score_table,
                end_game_time: end_text,
            })
        });
        Ok(())
    }

    async fn load(&self, session: &Session) -> Result<(), GameError> {
        if self.is_loaded() {
            return Ok(());
        }

        let context = session.context();
        let fetched = session
            .entities()
            .get(
                context.store.as_ref(),
                &context.settings.player_table,
                PLAYER_KEY_NAME,
                session.player_id(),
                &PLAYER_FIELDS,
            )
            .await;

        let mut state = self.state.lock();
        match fetched {
            Ok(Some(fields)) => {
                debug!(player_id = %session.player_id(), fields = fields.len(), "player loaded");
                state.record = DirtyRecord::loaded(fields);
                Ok(())
            }
            Ok(None) => {
                debug!(player_id = %session.player_id(), "no stored player");
                state.record = DirtyRecord::new();
                Ok(())
            }
            Err(err) => {
                state.record = DirtyRecord::new();
                Err(err.into())
            }
        }
    }
}

impl Default for PlayerSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for PlayerSystem {
    fn name(&self) -> &'static str {
        "player"
    }

    fn finish_tier(&self) -> FinishTier {
        FinishTier::Last
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.load(session).await
    }

    async fn finish(&self, session: &Session) -> Result<(), GameError> {
        let write = {
            let state = self.state.lock();
            if !state.record.is_loaded() {
                return Ok(());
            }
            state.record.pending_write()
        };
        let Some(write) = write else {
            debug!(player_id = %session.player_id(), "player unchanged, nothing to write");
            return Ok(());
        };

        let context = session.context();
        context
            .store
            .update(
                &context.settings.player_table,
                PLAYER_KEY_NAME,
                session.player_id(),
                write.values.clone(),
            )
            .await?;

        info!(
            player_id = %session.player_id(),
            fields = ?write.field_names().collect::<Vec<_>>(),
            "player saved"
        );
        self.state.lock().record.acknowledge(&write);
        Ok(())
    }
}
