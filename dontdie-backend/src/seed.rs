//! Default game data written into an empty main bucket.

use dontdie_db::{BlobStore, DbError};
use tracing::{debug, info};

use crate::systems::high_scores::HIGH_SCORES_KEY;

/// Reference datasets shipped with the server, by file name.
pub const STATIC_DATA: [(&str, &str); 6] = [
    ("achievements.csv", include_str!("../static-data/achievements.csv")),
    ("dailygift.csv", include_str!("../static-data/dailygift.csv")),
    ("items.csv", include_str!("../static-data/items.csv")),
    ("messageoftheday.csv", include_str!("../static-data/messageoftheday.csv")),
    ("missions.csv", include_str!("../static-data/missions.csv")),
    ("gameproperties.csv", include_str!("../static-data/gameproperties.csv")),
];

const EMPTY_HIGH_SCORES: &str = r#"{ "scores": [ ] }"#;

/// Write every default object that the bucket does not have yet.
/// Existing objects are left alone. Returns how many objects were written.
pub async fn populate_main_bucket(
    blobs: &dyn BlobStore,
    bucket: &str,
    static_data_prefix: &str,
) -> Result<usize, DbError> {
    let objects = STATIC_DATA
        .iter()
        .map(|(file, body)| (format!("{static_data_prefix}{file}"), *body))
        .chain(std::iter::once((HIGH_SCORES_KEY.to_string(), EMPTY_HIGH_SCORES)));

    let mut written = 0;
    for (key, body) in objects {
        match blobs.get_object(bucket, &key).await {
            Ok(_) => debug!(%bucket, %key, "object already present"),
            Err(DbError::NoSuchKey { .. }) => {
                blobs.put_object(bucket, &key, body.as_bytes().to_vec()).await?;
                written += 1;
            }
            Err(err) => return Err(err),
        }
    }

    info!(%bucket, written, "main bucket populated");
    Ok(written)
}
