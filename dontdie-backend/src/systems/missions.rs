//! Tracks the player's active mission and completes it once its criteria
//! are met. A player has at most one active mission.

use async_trait::async_trait;
use tracing::info;

use crate::dataset::DataRecord;
use crate::error::GameError;
use crate::output::{MissionProgress, MissionStatus};
use crate::session::Session;

use super::player::ActiveMission;
use super::{DatasetHandle, Subsystem};

pub const MISSIONS_FILE: &str = "missions.csv";

const MISSION_COMPLETE_TITLE: &str = "Mission Complete!";

pub struct MissionManager {
    missions: DatasetHandle,
}

impl MissionManager {
    pub fn new() -> Self {
        Self {
            missions: DatasetHandle::new("missionManager", MISSIONS_FILE),
        }
    }

    pub fn mission(&self, id: &str) -> Result<&DataRecord, GameError> {
        self.missions
            .get()?
            .get(id)
            .ok_or_else(|| GameError::MissionNotFound(id.to_string()))
    }

    /// Make `id` the player's active mission.
    pub fn start_mission(&self, session: &Session, id: &str) -> Result<(), GameError> {
        let player = &session.systems().player;
        if !player.is_loaded() {
            return Err(GameError::PlayerNotLoaded);
        }
        if player.has_active_mission() {
            return Err(GameError::AlreadyHasMission);
        }

        let data = self.mission(id)?;
        let active = ActiveMission::new(id);
        player.set_active_mission(Some(&active))?;

        info!(player_id = %session.player_id(), mission = id, "mission started");
        session.with_output(|output| {
            output.player.mission = Some(MissionProgress {
                status: MissionStatus::Start,
                mission_data: data.clone(),
                active_mission_data: Some(active),
            })
        });
        Ok(())
    }

    /// Count a just-finished game towards the active mission and complete
    /// it if that was enough. Without an active mission this does nothing.
    pub fn update_active_mission(&self, session: &Session) -> Result<(), GameError> {
        let player = &session.systems().player;
        if !player.is_loaded() {
            return Err(GameError::PlayerNotLoaded);
        }
        let Some(mut active) = player.active_mission()? else {
            return Ok(());
        };

        if player.game_just_ended() {
            active.num_games_completed += 1;
            player.set_active_mission(Some(&active))?;
        }

        let data = self.mission(&active.mission_id)?;
        if Self::criteria_met(&active, data) {
            return self.complete_mission(session, data);
        }

        session.with_output(|output| {
            output
                .player
                .mission
                .get_or_insert_with(|| MissionProgress {
                    status: MissionStatus::InProgress,
                    mission_data: data.clone(),
                    active_mission_data: None,
                })
                .active_mission_data = Some(active);
        });
        Ok(())
    }

    pub fn criteria_met(active: &ActiveMission, data: &DataRecord) -> bool {
        data.get("NumberOfGamesReq")
            .and_then(|required| required.trim().parse::<u32>().ok())
            .is_some_and(|required| active.num_games_completed >= required)
    }

    /// Clear the active mission and hand out its reward.
    pub fn complete_mission(&self, session: &Session, data: &DataRecord) -> Result<(), GameError> {
        let systems = session.systems();
        let player = &systems.player;
        if !player.is_loaded() {
            return Err(GameError::PlayerNotLoaded);
        }

        let reward = data.get("ItemReward");
        if let Some(item) = reward {
            systems.items.item(item)?;
        }

        player.set_active_mission(None)?;
        session.with_output(|output| {
            output.player.mission = Some(MissionProgress {
                status: MissionStatus::Complete,
                mission_data: data.clone(),
                active_mission_data: None,
            })
        });

        info!(player_id = %session.player_id(), mission = ?data.get("Name"), "mission complete");
        player.add_update(
            session,
            MISSION_COMPLETE_TITLE,
            data.get("CompletionText").unwrap_or_default(),
            reward,
        )
    }
}

impl Default for MissionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for MissionManager {
    fn name(&self) -> &'static str {
        "missionManager"
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.missions.load(session).await
    }

    async fn finish(&self, session: &Session) -> Result<(), GameError> {
        if !session.systems().player.is_loaded() {
            return Ok(());
        }
        self.update_active_mission(session)
    }
}
