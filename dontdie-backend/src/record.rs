//! Field-level change tracking for persisted entities.
//!
//! Every write through [`DirtyRecord::set`] marks the field dirty, whether or
//! not the value changed. A write-back covers exactly the dirty fields, and
//! the dirty set is only cleared once the store accepted the write.

use std::collections::BTreeSet;

use dontdie_db::Record;
use serde_json::Value;

use crate::error::GameError;

#[derive(Debug, Default)]
pub struct DirtyRecord {
    fields: Record,
    dirty: BTreeSet<String>,
    loaded: bool,
}

/// Snapshot of the dirty fields, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub values: Record,
}

impl PendingWrite {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl DirtyRecord {
    /// An unloaded, empty record (new or unknown entity).
    pub fn new() -> Self {
        Self::default()
    }

    /// A record loaded from the store.
    pub fn loaded(fields: Record) -> Self {
        Self {
            fields,
            dirty: BTreeSet::new(),
            loaded: true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Accept writes on a record that was not found in the store.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Record {
        &self.fields
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), GameError> {
        if !self.loaded {
            return Err(GameError::PlayerNotLoaded);
        }
        self.fields.insert(name.to_string(), value.into());
        self.mark_dirty(name);
        Ok(())
    }

    pub fn mark_dirty(&mut self, name: &str) {
        if !self.dirty.contains(name) {
            self.dirty.insert(name.to_string());
        }
    }

    pub fn has_dirty_fields(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// The write-back for the current dirty set, or `None` when clean.
    ///
    /// A field marked dirty but since unset is written as `null`.
    pub fn pending_write(&self) -> Option<PendingWrite> {
        if !self.has_dirty_fields() {
            return None;
        }

        let values = self
            .dirty_fields()
            .map(|name| {
                let value = self.fields.get(name).cloned().unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect();

        Some(PendingWrite { values })
    }

    /// Clear the fields covered by a write the store accepted.
    pub fn acknowledge(&mut self, write: &PendingWrite) {
        for name in write.field_names() {
            self.dirty.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded() -> DirtyRecord {
        let mut fields = Record::new();
        fields.insert("Username".to_string(), json!("Steve"));
        fields.insert("TotalScore".to_string(), json!(10));
        DirtyRecord::loaded(fields)
    }

    #[test]
    fn test_unloaded_record_rejects_writes() {
        let mut record = DirtyRecord::new();
        assert!(matches!(
            record.set("Username", "Steve"),
            Err(GameError::PlayerNotLoaded)
        ));
        assert!(!record.has_dirty_fields());
        assert!(record.get("Username").is_none());
    }

    #[test]
    fn test_clean_record_has_no_pending_write() {
        let record = loaded();
        assert!(record.pending_write().is_none());
    }

    #[test]
    fn test_pending_write_covers_distinct_written_fields() {
        let mut record = loaded();

        record.set("TotalScore", 20).unwrap();
        record.set("TotalScore", 30).unwrap();
        record.set("LastScore", 10).unwrap();
        // Same value as stored still counts as a write
        record.set("Username", "Steve").unwrap();

        let write = record.pending_write().unwrap();
        let names: Vec<&str> = write.field_names().collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"TotalScore"));
        assert!(names.contains(&"LastScore"));
        assert!(names.contains(&"Username"));
        assert_eq!(write.values["TotalScore"], json!(30));
    }

    #[test]
    fn test_acknowledge_clears_written_fields() {
        let mut record = loaded();
        record.set("LastScore", 5).unwrap();

        let write = record.pending_write().unwrap();
        record.set("TotalScore", 15).unwrap();
        record.acknowledge(&write);

        // Only the field written after the snapshot stays dirty
        assert_eq!(record.dirty_fields().collect::<Vec<_>>(), vec!["TotalScore"]);
    }

    #[test]
    fn test_mark_loaded_enables_writes() {
        let mut record = DirtyRecord::new();
        record.mark_loaded();
        record.set("Username", "Alex").unwrap();
        assert_eq!(record.get("Username"), Some(&json!("Alex")));
        assert!(record.has_dirty_fields());
    }
}
