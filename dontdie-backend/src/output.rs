//! The result object returned to the client.
//!
//! Each subsystem owns its own sub-key, so writes from different subsystems
//! never land on the same field.

use serde::Serialize;

use crate::dataset::DataRecord;
use crate::systems::high_scores::HighScoreTable;
use crate::systems::player::ActiveMission;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub player: PlayerOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_score_table: Option<HighScoreTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_of_the_day: Option<MessageOfTheDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_player_info: Option<PlayerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_gift: Option<DailyGiftResult>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutput {
    /// Rewards and notices to show the player, in grant order.
    pub updates: Vec<PlayerUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission: Option<MissionProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_game_info: Option<EndGameInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub title: String,
    pub desc: String,
    pub item: Option<String>,
    pub item_icon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissionStatus {
    Start,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionProgress {
    pub status: MissionStatus,
    pub mission_data: DataRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_mission_data: Option<ActiveMission>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameInfo {
    pub score: i64,
    pub made_high_score_table: bool,
    pub end_game_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageOfTheDay {
    pub message: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGiftResult {
    pub gift_given: bool,
}
