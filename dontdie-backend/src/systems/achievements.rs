use async_trait::async_trait;
use tracing::{info, warn};

use crate::criteria::Criteria;
use crate::error::GameError;
use crate::session::Session;

use super::{DatasetHandle, Subsystem};

pub const ACHIEVEMENTS_FILE: &str = "achievements.csv";

const ACHIEVEMENT_UNLOCKED_TITLE: &str = "Achievement Unlocked!";

/// Grants achievements whose `CompletionCriteria` hold for the player when
/// the session finishes.
pub struct Achievements {
    achievements: DatasetHandle,
}

impl Achievements {
    pub fn new() -> Self {
        Self {
            achievements: DatasetHandle::new("achievements", ACHIEVEMENTS_FILE),
        }
    }

    /// Grant every achievement the player has earned but not yet received.
    /// Returns the names granted by this call.
    pub fn grant_earned(&self, session: &Session) -> Result<Vec<String>, GameError> {
        let systems = session.systems();
        let player = &systems.player;
        let mut granted = Vec::new();

        for achievement in self.achievements.get()?.records() {
            let Some(name) = achievement.get("Name") else {
                continue;
            };
            if player.has_achievement(name) {
                continue;
            }

            let criteria = match achievement
                .get("CompletionCriteria")
                .map(Criteria::parse)
                .transpose()
            {
                Ok(Some(criteria)) => criteria,
                Ok(None) => continue,
                Err(err) => {
                    warn!(achievement = name, error = %err, "unreadable achievement criteria");
                    continue;
                }
            };
            if !criteria.evaluate(&player.fields_snapshot()) {
                continue;
            }

            let reward = achievement.get("ItemReward");
            if let Some(item) = reward {
                systems.items.item(item)?;
            }
            if !player.grant_achievement(name)? {
                continue;
            }

            info!(player_id = %session.player_id(), achievement = name, "achievement granted");
            player.add_update(
                session,
                ACHIEVEMENT_UNLOCKED_TITLE,
                achievement.get("CompletionText").unwrap_or_default(),
                reward,
            )?;
            granted.push(name.to_string());
        }

        Ok(granted)
    }
}

impl Default for Achievements {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for Achievements {
    fn name(&self) -> &'static str {
        "achievements"
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.achievements.load(session).await
    }

    async fn finish(&self, session: &Session) -> Result<(), GameError> {
        if !session.systems().player.is_loaded() {
            return Ok(());
        }
        self.grant_earned(session).map(|_| ())
    }
}
