mod error;
mod store;

pub use error::{DbError, Result};
pub use store::{BlobStore, KeyValueStore, Record};

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, params};
use tracing::{debug, info};

/// SQLite-backed implementation of both store interfaces.
///
/// Entities are stored one row per attribute so an update touches only the
/// attributes it names, giving per-attribute last-write-wins between
/// concurrent writers. Blobs are stored whole.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        conn.execute_batch(
          r#"
                    -- Entity attributes, one row per attribute
                    CREATE TABLE IF NOT EXISTS items (
                        table_name TEXT NOT NULL,
                        key_value TEXT NOT NULL,
                        key_name TEXT NOT NULL,
                        field TEXT NOT NULL,
                        value TEXT NOT NULL,
                        PRIMARY KEY (table_name, key_value, field)
                    );

                    -- Whole objects addressed by bucket and key
                    CREATE TABLE IF NOT EXISTS objects (
                        bucket TEXT NOT NULL,
                        key TEXT NOT NULL,
                        body BLOB NOT NULL,
                        PRIMARY KEY (bucket, key)
                    );
                    "#,
        )?;
        Ok::<_, rusqlite::Error>(())
      })
      .await?;

    info!("database initialized");
    Ok(())
  }
}

// ========================================================================
// Entities
// ========================================================================

#[async_trait]
impl KeyValueStore for Database {
  async fn get(
    &self,
    table: &str,
    key_name: &str,
    key_value: &str,
    fields: &[&str],
  ) -> Result<Option<Record>> {
    let table_name = table.to_string();
    let key = key_value.to_string();

    let rows = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached("SELECT field, value FROM items WHERE table_name = ?1 AND key_value = ?2")?
          .query_map(params![&table_name, &key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
          })?
          .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
      })
      .await?;

    if rows.is_empty() {
      debug!(table, key_name, "entity not found");
      return Ok(None);
    }

    let mut record = Record::new();
    for (field, raw) in rows {
      if !fields.is_empty() && !fields.contains(&field.as_str()) {
        continue;
      }
      let value: Value =
        serde_json::from_str(&raw).map_err(|source| DbError::Decode {
          field: field.clone(),
          source,
        })?;
      record.insert(field, value);
    }

    Ok(Some(record))
  }

  async fn update(
    &self,
    table: &str,
    key_name: &str,
    key_value: &str,
    values: Record,
  ) -> Result<()> {
    if values.is_empty() {
      return Ok(());
    }

    let table_name = table.to_string();
    let key_field = key_name.to_string();
    let key = key_value.to_string();
    let encoded: Vec<(String, String)> = values
      .into_iter()
      .map(|(field, value)| (field, value.to_string()))
      .collect();
    let written = encoded.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare_cached(
            r#"
                    INSERT INTO items (table_name, key_value, key_name, field, value)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT (table_name, key_value, field)
                    DO UPDATE SET value = excluded.value, key_name = excluded.key_name
                    "#,
          )?;
          for (field, value) in &encoded {
            stmt.execute(params![&table_name, &key, &key_field, field, value])?;
          }
        }
        tx.commit()?;
        Ok::<_, rusqlite::Error>(())
      })
      .await?;

    debug!(table, key_name, fields = written, "updated entity");
    Ok(())
  }
}

// ========================================================================
// Objects
// ========================================================================

#[async_trait]
impl BlobStore for Database {
  async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
    let bucket_name = bucket.to_string();
    let object_key = key.to_string();

    let body = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached("SELECT body FROM objects WHERE bucket = ?1 AND key = ?2")?
          .query_row(params![&bucket_name, &object_key], |row| row.get::<_, Vec<u8>>(0))
          .optional()
      })
      .await?;

    body.ok_or_else(|| DbError::NoSuchKey {
      bucket: bucket.to_string(),
      key: key.to_string(),
    })
  }

  async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
    let bucket_name = bucket.to_string();
    let object_key = key.to_string();
    let size = body.len();

    self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached("INSERT OR REPLACE INTO objects (bucket, key, body) VALUES (?1, ?2, ?3)")?
          .execute(params![&bucket_name, &object_key, &body])?;
        Ok::<_, rusqlite::Error>(())
      })
      .await?;

    debug!(bucket, key, size, "stored object");
    Ok(())
  }
}
