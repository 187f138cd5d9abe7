use async_trait::async_trait;
use tracing::debug;

use crate::error::GameError;
use crate::output::MessageOfTheDay;
use crate::session::Session;

use super::{DatasetHandle, Subsystem};

pub const MESSAGES_FILE: &str = "messageoftheday.csv";

/// Today's message, if the designers scheduled one.
pub struct MessageOfTheDaySystem {
    messages: DatasetHandle,
}

impl MessageOfTheDaySystem {
    pub fn new() -> Self {
        Self {
            messages: DatasetHandle::new("messageOfTheDay", MESSAGES_FILE),
        }
    }

    pub fn todays_message(&self, session: &Session) -> Result<Option<MessageOfTheDay>, GameError> {
        let today = session.local_now();
        Ok(self
            .messages
            .get()?
            .find_by_date(today)
            .map(|hit| MessageOfTheDay {
                message: hit.record.get("Message").unwrap_or_default().to_string(),
                color: hit.record.get("Color").unwrap_or_default().to_string(),
            }))
    }

    /// Put today's message in the output. No message today is not an error.
    pub fn try_get_message(&self, session: &Session) -> Result<(), GameError> {
        match self.todays_message(session)? {
            Some(message) => session.with_output(|output| output.message_of_the_day = Some(message)),
            None => debug!("no message of the day scheduled"),
        }
        Ok(())
    }
}

impl Default for MessageOfTheDaySystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for MessageOfTheDaySystem {
    fn name(&self) -> &'static str {
        "messageOfTheDay"
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.messages.load(session).await
    }

    async fn finish(&self, _session: &Session) -> Result<(), GameError> {
        Ok(())
    }
}
