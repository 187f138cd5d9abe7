//! Process-wide cache of read-only reference datasets.
//!
//! Each dataset is a CSV object in the main bucket. The first session that
//! needs a dataset triggers its load; sessions arriving while that load is in
//! flight await the same load instead of starting their own. Once loaded a
//! dataset never changes for the life of the process.
//!
//! A failed load is remembered. The next caller to wait on the dataset is
//! handed that stored error and resets the dataset to pending, so the caller
//! after it starts a fresh load.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDateTime;
use dontdie_db::{BlobStore, DbError};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::helpers::parse_dataset_time;

/// Column holding the start of a dated row.
pub const START_DATE_COLUMN: &str = "Date";
/// Column holding the optional end of a dated row.
pub const END_DATE_COLUMN: &str = "EndDate";

#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    #[error("failed to fetch dataset {file}: {source}")]
    Fetch {
        file: String,
        #[source]
        source: Arc<DbError>,
    },

    #[error("dataset {file} is not valid utf-8")]
    Encoding { file: String },

    #[error("dataset {file} has no header row")]
    Empty { file: String },
}

/// One data row: column name mapped to cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct DataRecord(BTreeMap<String, String>);

impl DataRecord {
    /// Cell text, with empty cells treated as absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .get(column)
            .map(String::as_str)
            .filter(|cell| !cell.is_empty())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for DataRecord {
    fn from(cells: [(&str, &str); N]) -> Self {
        Self(
            cells
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// A row located by date, with the interval it covers.
#[derive(Debug, Clone, Copy)]
pub struct DatedRecord<'a> {
    pub record: &'a DataRecord,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DatedRecord<'_> {
    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.start <= time && time <= self.end
    }
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    start: NaiveDateTime,
    end: NaiveDateTime,
    row: usize,
}

/// A loaded, immutable dataset.
#[derive(Debug)]
pub struct Dataset {
    rows: Vec<DataRecord>,
    by_key: HashMap<String, usize>,
    schedule: Vec<ScheduleEntry>,
}

impl Dataset {
    /// Parse a CSV object. Row 0 names the columns.
    pub fn parse(file: &str, body: &[u8]) -> Result<Self, DatasetError> {
        let text = std::str::from_utf8(body).map_err(|_| DatasetError::Encoding {
            file: file.to_string(),
        })?;
        Self::from_rows(file, parse_rows(text))
    }

    /// Build a dataset from raw rows. The first column is the primary key;
    /// on duplicate keys the last row wins.
    pub fn from_rows(file: &str, raw: Vec<Vec<String>>) -> Result<Self, DatasetError> {
        let mut raw = raw.into_iter();
        let header = raw.next().ok_or_else(|| DatasetError::Empty {
            file: file.to_string(),
        })?;

        let mut rows = Vec::new();
        let mut by_key = HashMap::new();
        let mut schedule = Vec::new();

        for cells in raw {
            let mut record = BTreeMap::new();
            for (index, column) in header.iter().enumerate() {
                let cell = cells.get(index).cloned().unwrap_or_default();
                record.insert(column.clone(), cell);
            }
            let record = DataRecord(record);
            let row = rows.len();

            if let Some(key) = cells.first() {
                by_key.insert(key.clone(), row);
            }

            if let Some(start_text) = record.get(START_DATE_COLUMN) {
                match parse_dataset_time(start_text) {
                    Some(start) => {
                        let end = match record.get(END_DATE_COLUMN).map(parse_dataset_time) {
                            None => start.end_of_day(),
                            Some(Some(end)) => end.end(),
                            Some(None) => {
                                warn!(file, row, "unparsable end date, row covers its start day");
                                start.end_of_day()
                            }
                        };
                        schedule.push(ScheduleEntry {
                            start: start.start(),
                            end,
                            row,
                        });
                    }
                    None => warn!(file, row, start_text, "unparsable start date, row is not dated"),
                }
            }

            rows.push(record);
        }

        schedule.sort_by_key(|entry| entry.start);

        Ok(Self {
            rows,
            by_key,
            schedule,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in file order.
    pub fn records(&self) -> impl Iterator<Item = &DataRecord> {
        self.rows.iter()
    }

    pub fn get(&self, key: &str) -> Option<&DataRecord> {
        self.by_key.get(key).map(|&row| &self.rows[row])
    }

    /// Binary search for the dated row whose interval contains `time`.
    ///
    /// Intervals must not overlap. Gaps between intervals are fine and
    /// yield `None`.
    pub fn find_by_date(&self, time: NaiveDateTime) -> Option<DatedRecord<'_>> {
        let mut low = 0usize;
        let mut high = self.schedule.len();

        while low < high {
            let mid = low + (high - low) / 2;
            let entry = &self.schedule[mid];

            if time < entry.start {
                high = mid;
            } else if time > entry.end {
                low = mid + 1;
            } else {
                return Some(DatedRecord {
                    record: &self.rows[entry.row],
                    start: entry.start,
                    end: entry.end,
                });
            }
        }

        None
    }
}

/// Split CSV text into rows of cells.
///
/// Cells may be double-quoted; inside quotes commas and newlines are literal
/// and `""` is an escaped quote. Carriage returns are dropped and blank lines
/// are skipped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => row.push(std::mem::take(&mut cell)),
            '\n' if !quoted => {
                row.push(std::mem::take(&mut cell));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            '\r' => {}
            _ => cell.push(c),
        }
    }

    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        push_row(&mut rows, row);
    }

    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|cell| !cell.is_empty()) {
        rows.push(row);
    }
}

/// Observable load state of a cached dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<Dataset>, DatasetError>>>;

enum Slot {
    Pending,
    Loading { generation: u64, load: LoadFuture },
    Ready(Arc<Dataset>),
    Failed(DatasetError),
}

/// A single cached dataset and its load state.
pub struct ReferenceDataset {
    file: String,
    bucket: String,
    key: String,
    blobs: Arc<dyn BlobStore>,
    slot: Mutex<Slot>,
    generation: Mutex<u64>,
}

impl ReferenceDataset {
    pub fn new(file: &str, bucket: &str, key: &str, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            file: file.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            blobs,
            slot: Mutex::new(Slot::Pending),
            generation: Mutex::new(0),
        }
    }

    pub fn state(&self) -> LoadState {
        match &*self.slot.lock() {
            Slot::Pending | Slot::Loading { .. } => LoadState::Pending,
            Slot::Ready(_) => LoadState::Ready,
            Slot::Failed(_) => LoadState::Failed,
        }
    }

    /// Wait until the dataset is loaded, starting the load if nobody has.
    pub async fn wait_for_load(&self) -> Result<Arc<Dataset>, DatasetError> {
        let (generation, load) = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Ready(dataset) => return Ok(Arc::clone(dataset)),
                Slot::Loading { generation, load } => (*generation, load.clone()),
                Slot::Failed(err) => {
                    let err = err.clone();
                    *slot = Slot::Pending;
                    debug!(file = %self.file, "reset dataset after failed load");
                    return Err(err);
                }
                Slot::Pending => {
                    let generation = self.next_generation();
                    let load = self.start_load();
                    *slot = Slot::Loading {
                        generation,
                        load: load.clone(),
                    };
                    (generation, load)
                }
            }
        };

        let result = load.await;

        let mut slot = self.slot.lock();
        if matches!(&*slot, Slot::Loading { generation: current, .. } if *current == generation) {
            *slot = match &result {
                Ok(dataset) => Slot::Ready(Arc::clone(dataset)),
                Err(err) => Slot::Failed(err.clone()),
            };
        }

        result
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        *generation
    }

    fn start_load(&self) -> LoadFuture {
        let blobs = Arc::clone(&self.blobs);
        let file = self.file.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();

        async move {
            info!(%file, %bucket, %key, "loading reference dataset");

            let body = blobs
                .get_object(&bucket, &key)
                .await
                .map_err(|err| {
                    warn!(%file, error = %err, "reference dataset fetch failed");
                    DatasetError::Fetch {
                        file: file.clone(),
                        source: Arc::new(err),
                    }
                })?;

            let dataset = Dataset::parse(&file, &body)?;
            info!(%file, rows = dataset.len(), "reference dataset loaded");
            Ok(Arc::new(dataset))
        }
        .boxed()
        .shared()
    }
}

/// Registry of every reference dataset used by this process, keyed by file.
pub struct DatasetCache {
    blobs: Arc<dyn BlobStore>,
    bucket: String,
    prefix: String,
    datasets: scc::HashMap<String, Arc<ReferenceDataset>>,
}

impl DatasetCache {
    pub fn new(blobs: Arc<dyn BlobStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            blobs,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            datasets: scc::HashMap::new(),
        }
    }

    /// The cache entry for a file, created on first reference.
    pub async fn dataset(&self, file: &str) -> Arc<ReferenceDataset> {
        loop {
            if let Some(dataset) = self
                .datasets
                .read_async(file, |_, dataset| Arc::clone(dataset))
                .await
            {
                return dataset;
            }

            let key = format!("{}{}", self.prefix, file);
            let dataset = Arc::new(ReferenceDataset::new(
                file,
                &self.bucket,
                &key,
                Arc::clone(&self.blobs),
            ));

            if self
                .datasets
                .insert_async(file.to_string(), Arc::clone(&dataset))
                .await
                .is_ok()
            {
                return dataset;
            }
            // Lost the race to another first reference, use theirs
        }
    }

    pub async fn wait_for_load(&self, file: &str) -> Result<Arc<Dataset>, DatasetError> {
        self.dataset(file).await.wait_for_load().await
    }
}
