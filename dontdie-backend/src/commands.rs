//! Client commands and the pipeline that runs them against a session.

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::GameError;
use crate::output::PlayerInfo;
use crate::session::Session;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetupPlayer,
    StartGame,
    EndGame,
    GetDailyGift,
    GetHighScoreTable,
    GetMessageOfTheDay,
    GetPlayerInfo,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::SetupPlayer => "setupPlayer",
            Command::StartGame => "startGame",
            Command::EndGame => "endGame",
            Command::GetDailyGift => "getDailyGift",
            Command::GetHighScoreTable => "getHighScoreTable",
            Command::GetMessageOfTheDay => "getMessageOfTheDay",
            Command::GetPlayerInfo => "getPlayerInfo",
        }
    }
}

impl FromStr for Command {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setupPlayer" => Ok(Command::SetupPlayer),
            "startGame" => Ok(Command::StartGame),
            "endGame" => Ok(Command::EndGame),
            "getDailyGift" => Ok(Command::GetDailyGift),
            "getHighScoreTable" => Ok(Command::GetHighScoreTable),
            "getMessageOfTheDay" => Ok(Command::GetMessageOfTheDay),
            "getPlayerInfo" => Ok(Command::GetPlayerInfo),
            other => Err(GameError::UnknownCommand(other.to_string())),
        }
    }
}

/// Body of a play request.
#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub commands: Option<Vec<String>>,
    #[serde(flatten)]
    pub input: CommandInput,
}

/// Command-specific fields sent alongside the command list.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInput {
    pub username: Option<String>,
    pub favorite_color: Option<Value>,
}

/// Resolve every command name before anything runs.
pub fn parse_commands(names: Option<&[String]>) -> Result<Vec<Command>, GameError> {
    let names = match names {
        Some(names) if !names.is_empty() => names,
        _ => return Err(GameError::NoCommands),
    };
    validation::validate_command_count(names.len())?;
    names.iter().map(|name| name.parse()).collect()
}

/// Run commands in order, stopping at the first failure.
pub async fn run_commands(
    session: &Session,
    commands: &[Command],
    input: &CommandInput,
) -> Result<(), GameError> {
    for &command in commands {
        info!(player_id = %session.player_id(), command = command.name(), "command");
        execute(session, command, input).await?;
    }
    Ok(())
}

pub async fn execute(session: &Session, command: Command, input: &CommandInput) -> Result<(), GameError> {
    let systems = session.systems();
    match command {
        Command::SetupPlayer => setup_player(session, input),
        Command::StartGame => systems.player.start_game(session),
        Command::EndGame => systems.player.end_game(session).await,
        Command::GetDailyGift => systems.daily_gift.try_give_gift(session).map(|_| ()),
        Command::GetHighScoreTable => {
            let table = systems.high_scores.get_high_scores(session).await?;
            session.with_output(|output| output.high_score_table = Some(table));
            Ok(())
        }
        Command::GetMessageOfTheDay => systems.message_of_the_day.try_get_message(session),
        Command::GetPlayerInfo => {
            let info = player_info(session);
            session.with_output(|output| output.get_player_info = Some(info));
            Ok(())
        }
    }
}

fn setup_player(session: &Session, input: &CommandInput) -> Result<(), GameError> {
    let (Some(username), Some(color)) = (input.username.as_deref(), input.favorite_color.as_ref()) else {
        return Err(GameError::MissingCommandData(Command::SetupPlayer.name()));
    };
    validation::validate_username(username)?;
    let color = validation::normalize_color(color)?;

    let player = &session.systems().player;
    player.mark_loaded();
    player.set_field("Username", username)?;
    player.set_field("FavoriteColor", color)?;
    Ok(())
}

fn player_info(session: &Session) -> PlayerInfo {
    let player = &session.systems().player;
    if !player.is_loaded() {
        return PlayerInfo {
            player_found: false,
            favorite_color: None,
            inventory: None,
        };
    }

    let inventory = match player.field("Inventory") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    };

    PlayerInfo {
        player_found: true,
        favorite_color: player.string_field("FavoriteColor"),
        inventory,
    }
}
