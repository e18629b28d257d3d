use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can arise while reading or writing the persisted record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An I/O error occurred during interaction with the backing file.
    /// Contains a string describing the underlying I/O error.
    #[error("Record store I/O error: {0}")]
    Io(String),

    /// The store contents could not be serialized to JSON.
    #[error("Record store serialization error: {0}")]
    Serialization(String),

    /// The backing file could not be parsed as a record store.
    #[error("Record store deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Deserialization(format!("JSON operation error: {}", err))
    }
}

/// Durable "already processed" markers for incremental triage runs.
///
/// The pipeline only consumes membership semantics: `has` to skip samples a
/// previous run handled, `put` to record the ones this run handled. Whatever
/// technology backs the association is the implementer's business.
pub trait RecordStore {
    /// Returns `true` if `key` was recorded as processed.
    fn has(&self, key: &str) -> bool;

    /// Records `key` as processed. Re-marking an existing key is a no-op,
    /// so idempotent re-runs are safe.
    fn put(&mut self, key: &str);
}

/// How a sample file is turned into a record-store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyScheme {
    /// Key by the sample's absolute source path. Cheap, but a moved sync
    /// directory makes every sample look new again.
    #[default]
    SourcePath,
    /// Key by an MD5 digest of the sample bytes. Stable across relocated
    /// sync directories at the cost of reading each file once.
    ContentDigest,
}

impl KeyScheme {
    /// Derives the store key for `input` under this scheme.
    pub fn key_for(&self, input: &Path) -> Result<String, StoreError> {
        match self {
            KeyScheme::SourcePath => Ok(input.to_string_lossy().into_owned()),
            KeyScheme::ContentDigest => {
                let bytes = fs::read(input).map_err(|e| {
                    StoreError::Io(format!("Failed to read sample {:?}: {}", input, e))
                })?;
                Ok(format!("{:x}", md5::compute(&bytes)))
            }
        }
    }
}

/// A `RecordStore` persisted as a JSON array of keys.
///
/// Keys live in memory as a sorted set; `persist` rewrites the backing file
/// in one pass. Opening a path with no file yields an empty store, so the
/// first incremental run needs no special casing.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl JsonRecordStore {
    /// Opens the store at `path`, loading any existing keys.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let keys = if path.is_file() {
            let file = File::open(&path).map_err(|e| {
                StoreError::Io(format!("Failed to open record store {:?}: {}", path, e))
            })?;
            if file.metadata()?.len() == 0 {
                BTreeSet::new()
            } else {
                let reader = BufReader::new(file);
                serde_json::from_reader(reader).map_err(|e| {
                    StoreError::Deserialization(format!(
                        "Failed to parse record store {:?}: {}. The file might be corrupted.",
                        path, e
                    ))
                })?
            }
        } else {
            BTreeSet::new()
        };
        Ok(Self { path, keys })
    }

    /// Writes the current key set back to the backing file.
    pub fn persist(&self) -> Result<(), StoreError> {
        let file = File::create(&self.path).map_err(|e| {
            StoreError::Io(format!(
                "Failed to create or truncate record store {:?}: {}",
                self.path, e
            ))
        })?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.keys).map_err(|e| {
            StoreError::Serialization(format!(
                "Failed to serialize record store to {:?}: {}",
                self.path, e
            ))
        })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl RecordStore for JsonRecordStore {
    fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn put(&mut self, key: &str) {
        self.keys.insert(key.to_string());
    }
}
