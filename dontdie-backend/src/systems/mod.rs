//! Game subsystems and the registry a session drives.
//!
//! Every subsystem takes part in the two-phase lifecycle: all `init` calls
//! run concurrently when the session starts, and `finish` calls run
//! concurrently within a [`FinishTier`], lowest tier first, when it ends.

pub mod achievements;
pub mod daily_gift;
pub mod high_scores;
pub mod items;
pub mod message_of_the_day;
pub mod missions;
pub mod player;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::dataset::Dataset;
use crate::error::GameError;
use crate::session::Session;

pub use achievements::Achievements;
pub use daily_gift::DailyGift;
pub use high_scores::HighScoreSystem;
pub use items::ItemManager;
pub use message_of_the_day::MessageOfTheDaySystem;
pub use missions::MissionManager;
pub use player::PlayerSystem;

/// Order in which subsystems are finished.
///
/// Subsystems in an earlier tier may still write player fields while they
/// finish, so the player record persists in the last tier and observes all
/// of those writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FinishTier {
    Concurrent,
    Last,
}

#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Unique name within a session.
    fn name(&self) -> &'static str;

    fn finish_tier(&self) -> FinishTier {
        FinishTier::Concurrent
    }

    async fn init(&self, session: &Session) -> Result<(), GameError>;

    async fn finish(&self, session: &Session) -> Result<(), GameError>;
}

/// The subsystems of one session.
pub struct Systems {
    pub player: PlayerSystem,
    pub missions: MissionManager,
    pub daily_gift: DailyGift,
    pub high_scores: HighScoreSystem,
    pub items: ItemManager,
    pub message_of_the_day: MessageOfTheDaySystem,
    pub achievements: Achievements,
}

impl Systems {
    pub fn new() -> Self {
        Self {
            player: PlayerSystem::new(),
            missions: MissionManager::new(),
            daily_gift: DailyGift::new(),
            high_scores: HighScoreSystem::new(),
            items: ItemManager::new(),
            message_of_the_day: MessageOfTheDaySystem::new(),
            achievements: Achievements::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Subsystem> {
        [
            &self.player as &dyn Subsystem,
            &self.missions,
            &self.daily_gift,
            &self.high_scores,
            &self.items,
            &self.message_of_the_day,
            &self.achievements,
        ]
        .into_iter()
    }
}

impl Default for Systems {
    fn default() -> Self {
        Self::new()
    }
}

/// A reference dataset a subsystem loads during `init`.
pub(crate) struct DatasetHandle {
    owner: &'static str,
    file: &'static str,
    data: OnceLock<Arc<Dataset>>,
}

impl DatasetHandle {
    pub(crate) const fn new(owner: &'static str, file: &'static str) -> Self {
        Self {
            owner,
            file,
            data: OnceLock::new(),
        }
    }

    pub(crate) async fn load(&self, session: &Session) -> Result<(), GameError> {
        let dataset = session.context().datasets.wait_for_load(self.file).await?;
        let _ = self.data.set(dataset);
        Ok(())
    }

    pub(crate) fn get(&self) -> Result<&Dataset, GameError> {
        self.data
            .get()
            .map(Arc::as_ref)
            .ok_or(GameError::NotInitialized(self.owner))
    }
}
