//! Daily gifts scheduled by date in `dailygift.csv`.
//!
//! A gift row covers a time range and lists its gifts in numbered column
//! pairs `GiftName1`/`GiftType1`, `GiftName2`/`GiftType2` and so on. A gift
//! is either an item or a mission. Ranges may not overlap, and a player
//! receives each range's gifts once.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::DataRecord;
use crate::error::GameError;
use crate::helpers::{format_time, parse_stored_time};
use crate::output::DailyGiftResult;
use crate::session::Session;

use super::{DatasetHandle, Subsystem};

pub const DAILY_GIFT_FILE: &str = "dailygift.csv";

const DAILY_GIFT_TITLE: &str = "Daily Gift!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gift {
    Item(String),
    Mission(String),
}

impl Gift {
    fn parse(kind: Option<&str>, name: &str) -> Result<Self, GameError> {
        match kind.map(str::trim) {
            Some("item") => Ok(Gift::Item(name.to_string())),
            Some("mission") => Ok(Gift::Mission(name.to_string())),
            other => Err(GameError::InvalidGiftType(other.unwrap_or_default().to_string())),
        }
    }
}

/// The numbered gifts on one gift row, stopping at the first gap.
pub fn gifts(row: &DataRecord) -> Result<Vec<Gift>, GameError> {
    (1..)
        .map_while(|i| {
            row.get(&format!("GiftName{i}"))
                .map(|name| Gift::parse(row.get(&format!("GiftType{i}")), name))
        })
        .collect()
}

pub struct DailyGift {
    gifts: DatasetHandle,
}

impl DailyGift {
    pub fn new() -> Self {
        Self {
            gifts: DatasetHandle::new("dailyGift", DAILY_GIFT_FILE),
        }
    }

    /// Give the player today's gifts unless they already got them.
    /// Returns whether anything was given.
    pub fn try_give_gift(&self, session: &Session) -> Result<bool, GameError> {
        let given = self.give_todays_gift(session)?;
        session.with_output(|output| output.daily_gift = Some(DailyGiftResult { gift_given: given }));
        Ok(given)
    }

    fn give_todays_gift(&self, session: &Session) -> Result<bool, GameError> {
        let systems = session.systems();
        let player = &systems.player;
        if !player.is_loaded() {
            return Err(GameError::PlayerNotLoaded);
        }

        let now = session.local_now();
        let Some(today) = self.gifts.get()?.find_by_date(now) else {
            debug!("no daily gift scheduled");
            return Ok(false);
        };

        let last_given = match player.field("LastDailyGiftTime") {
            Some(Value::String(text)) => parse_stored_time(&text),
            _ => None,
        };
        if last_given.is_some_and(|time| today.contains(time)) {
            debug!(player_id = %session.player_id(), "daily gift already given");
            return Ok(false);
        }

        let gifts = gifts(today.record)?;
        for gift in &gifts {
            if let Gift::Item(item) = gift {
                systems.items.item(item)?;
            }
        }

        for gift in gifts {
            match gift {
                Gift::Item(item) => player.add_update(session, DAILY_GIFT_TITLE, &item, Some(&item))?,
                Gift::Mission(mission) => {
                    // A player already on a mission just misses this one
                    if let Err(err) = systems.missions.start_mission(session, &mission) {
                        debug!(%mission, error = %err, "daily gift mission not started");
                    }
                }
            }
        }

        player.set_field("LastDailyGiftTime", format_time(now))?;
        info!(player_id = %session.player_id(), "daily gift given");
        Ok(true)
    }
}

impl Default for DailyGift {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for DailyGift {
    fn name(&self) -> &'static str {
        "dailyGift"
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.gifts.load(session).await
    }

    async fn finish(&self, _session: &Session) -> Result<(), GameError> {
        Ok(())
    }
}
