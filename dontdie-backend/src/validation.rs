/// Input validation for play requests
use serde_json::Value;
use thiserror::Error;

/// Max commands accepted in a single play request.
pub const MAX_COMMANDS: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Username cannot be empty")]
    UsernameEmpty,

    #[error("Username too long (max 16 characters, got {0})")]
    UsernameTooLong(usize),

    #[error("Username contains invalid characters (only alphanumeric and underscore allowed)")]
    UsernameInvalidChars,

    #[error("Favorite color cannot be empty")]
    ColorEmpty,

    #[error("Favorite color too long (max 32 characters, got {0})")]
    ColorTooLong(usize),

    #[error("Favorite color must be a string or a number")]
    ColorInvalidType,

    #[error("Too many commands (max {max} commands, got {actual})")]
    TooManyCommands { max: usize, actual: usize },
}

/// Validates a player username
///
/// Rules:
/// - Cannot be empty
/// - Max 16 characters
/// - Only alphanumeric characters and underscores
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::UsernameEmpty);
    }

    let len = name.chars().count();
    if len > 16 {
        return Err(ValidationError::UsernameTooLong(len));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ValidationError::UsernameInvalidChars);
    }

    Ok(())
}

/// Validates a favorite color and returns its stored form.
///
/// Clients send either a palette index or a color name, both are kept as text.
pub fn normalize_color(color: &Value) -> Result<String, ValidationError> {
    let text = match color {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(ValidationError::ColorInvalidType),
    };

    if text.is_empty() {
        return Err(ValidationError::ColorEmpty);
    }

    let len = text.chars().count();
    if len > 32 {
        return Err(ValidationError::ColorTooLong(len));
    }

    Ok(text)
}

/// Validates the size of a command list
pub fn validate_command_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_COMMANDS {
        return Err(ValidationError::TooManyCommands {
            max: MAX_COMMANDS,
            actual: count,
        });
    }

    Ok(())
}
