use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::dataset::DatasetError;
use crate::validation::ValidationError;

/// Everything that can end a play invocation.
///
/// None of these are fatal to the process; only the current invocation fails.
#[derive(Debug, Error)]
pub enum GameError {
  #[error("identity is not valid")]
  IdentityInvalid,

  #[error("no valid commands given")]
  NoCommands,

  #[error("'{0}' is not a command")]
  UnknownCommand(String),

  #[error("missing required data for {0} command")]
  MissingCommandData(&'static str),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("player not loaded")]
  PlayerNotLoaded,

  #[error("player already has an active mission")]
  AlreadyHasMission,

  #[error("mission not found: {0}")]
  MissionNotFound(String),

  #[error("item not found: {0}")]
  ItemNotFound(String),

  #[error("invalid inputs for high score submission")]
  InvalidScoreSubmission,

  #[error("daily gift type '{0}' is not supported")]
  InvalidGiftType(String),

  #[error("{0} used before it was initialized")]
  NotInitialized(&'static str),

  #[error(transparent)]
  Dataset(#[from] DatasetError),

  #[error("store error: {0}")]
  Store(#[from] dontdie_db::DbError),

  #[error("corrupt {what}: {reason}")]
  Corrupt { what: &'static str, reason: String },
}

impl GameError {
  /// Stable tag reported to clients.
  pub fn kind(&self) -> &'static str {
    match self {
      GameError::IdentityInvalid => "IdentityInvalid",
      GameError::NoCommands => "NoCommands",
      GameError::UnknownCommand(_) => "UnknownCommand",
      GameError::MissingCommandData(_) => "MissingCommandData",
      GameError::Validation(_) => "ValidationFailed",
      GameError::PlayerNotLoaded => "PlayerNotLoaded",
      GameError::AlreadyHasMission => "AlreadyHasMission",
      GameError::MissionNotFound(_) => "MissionNotFound",
      GameError::ItemNotFound(_) => "ItemNotFound",
      GameError::InvalidScoreSubmission => "InvalidScoreSubmission",
      GameError::InvalidGiftType(_) => "InvalidGiftType",
      GameError::NotInitialized(_) | GameError::Corrupt { .. } => "InternalError",
      GameError::Dataset(_) => "DatasetUnavailable",
      GameError::Store(_) => "StoreError",
    }
  }
}

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  Game(GameError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let AppError::Game(err) = self;

    let status = match &err {
      GameError::IdentityInvalid => StatusCode::UNAUTHORIZED,
      GameError::NoCommands
      | GameError::UnknownCommand(_)
      | GameError::MissingCommandData(_)
      | GameError::Validation(_)
      | GameError::InvalidScoreSubmission => StatusCode::BAD_REQUEST,
      GameError::PlayerNotLoaded | GameError::AlreadyHasMission => StatusCode::CONFLICT,
      GameError::MissionNotFound(_) | GameError::ItemNotFound(_) => StatusCode::NOT_FOUND,
      GameError::InvalidGiftType(_)
      | GameError::NotInitialized(_)
      | GameError::Dataset(_)
      | GameError::Store(_)
      | GameError::Corrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let error_response = if status == StatusCode::INTERNAL_SERVER_ERROR {
      // Don't expose internal storage or data errors
      tracing::error!(?err, "Internal error occurred");
      ErrorResponse::with_details(
        err.kind(),
        "An internal error occurred. Please try again later.",
      )
    } else {
      tracing::warn!(error = %err, kind = err.kind(), "Play request rejected");
      ErrorResponse::with_details(err.kind(), err.to_string())
    };

    (status, Json(error_response)).into_response()
  }
}

impl From<GameError> for AppError {
  fn from(err: GameError) -> Self {
    AppError::Game(err)
  }
}

impl From<ValidationError> for AppError {
  fn from(err: ValidationError) -> Self {
    AppError::Game(GameError::Validation(err))
  }
}
