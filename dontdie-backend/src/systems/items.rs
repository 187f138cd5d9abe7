use async_trait::async_trait;

use crate::dataset::DataRecord;
use crate::error::GameError;
use crate::session::Session;

use super::{DatasetHandle, Subsystem};

pub const ITEMS_FILE: &str = "items.csv";

/// Holds item data loaded from `items.csv`.
pub struct ItemManager {
    items: DatasetHandle,
}

impl ItemManager {
    pub fn new() -> Self {
        Self {
            items: DatasetHandle::new("itemManager", ITEMS_FILE),
        }
    }

    pub fn item(&self, name: &str) -> Result<&DataRecord, GameError> {
        self.items
            .get()?
            .get(name)
            .ok_or_else(|| GameError::ItemNotFound(name.to_string()))
    }

    /// Whether an item survives the session it was granted in.
    pub fn is_persistent(item: &DataRecord) -> bool {
        item.get("Persist") == Some("true")
    }

    pub fn icon(item: &DataRecord) -> Option<&str> {
        item.get("Icon")
    }
}

impl Default for ItemManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subsystem for ItemManager {
    fn name(&self) -> &'static str {
        "itemManager"
    }

    async fn init(&self, session: &Session) -> Result<(), GameError> {
        self.items.load(session).await
    }

    async fn finish(&self, _session: &Session) -> Result<(), GameError> {
        Ok(())
    }
}
