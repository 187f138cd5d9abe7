use dontdie_db::{DbError, KeyValueStore, Record};
use scc::HashMap;
use tracing::debug;

/// Per-session memo of key-value store reads.
///
/// Found entities are cached by (table, key) for the life of one session;
/// entities that do not exist are fetched again on the next lookup.
pub struct EntityCache {
    entries: HashMap<(String, String), Record>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up an entity, consulting the cache before the store.
    pub async fn get(
        &self,
        store: &dyn KeyValueStore,
        table: &str,
        key_name: &str,
        key_value: &str,
        fields: &[&str],
    ) -> Result<Option<Record>, DbError> {
        let cache_key = (table.to_string(), key_value.to_string());

        if let Some(record) = self
            .entries
            .read_async(&cache_key, |_, record| record.clone())
            .await
        {
            debug!(table, "entity cache hit");
            return Ok(Some(record));
        }

        let fetched = store.get(table, key_name, key_value, fields).await?;

        if let Some(record) = &fetched {
            // A concurrent lookup may have cached it first, either copy is fine
            let _ = self.entries.insert_async(cache_key, record.clone()).await;
        }

        Ok(fetched)
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}
