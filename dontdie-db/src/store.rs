//! Store interfaces consumed by the game engine.
//!
//! Neither interface offers transactions or conditional writes. Callers that
//! read, modify and write back a value race with every other writer of the
//! same key.

use async_trait::async_trait;

use crate::Result;

/// A persisted entity: attribute name mapped to its JSON value.
/// Absent keys are unset attributes.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Attribute-addressable key-value table store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the requested attributes of one entity.
    ///
    /// Only attributes that are both requested and stored are returned. An
    /// empty `fields` slice returns every stored attribute. `None` means
    /// nothing at all is stored under the key.
    async fn get(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
        fields: &[&str],
    ) -> Result<Option<Record>>;

    /// Unconditionally overwrite exactly the given attributes of one entity,
    /// creating it if needed. Attributes not named are left untouched.
    async fn update(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
        values: Record,
    ) -> Result<()>;
}

/// Whole-object blob storage addressed by bucket and key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object. A missing object is `DbError::NoSuchKey`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
}
