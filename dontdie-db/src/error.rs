use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] tokio_rusqlite::rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("stored value for field '{field}' is not valid json: {source}")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no such key '{key}' in bucket '{bucket}'")]
    NoSuchKey { bucket: String, key: String },
}

pub type Result<T> = std::result::Result<T, DbError>;
