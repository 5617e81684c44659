//! Record stores for the backup manifest and the operation log.
//!
//! Callers only see the [`RecordStore`] / [`CompactingStore`] traits, so the
//! file-backed implementations here can be swapped for a locked or
//! single-writer store without touching the tools.
//!
//! Concurrency: [`JsonArrayStore`] serializes its read-modify-write cycles
//! within one process. Separate processes writing the same manifest can still
//! lose entries.

use crate::core::error::SmartOpsError;
use crate::core::time;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Most recent backup manifest entries that are retained.
pub const MANIFEST_CAP: usize = 1000;

pub trait RecordStore<T> {
    /// Append one record after every record already stored.
    fn append(&self, record: T) -> Result<(), SmartOpsError>;
    /// All records in insertion order.
    fn read_all(&self) -> Result<Vec<T>, SmartOpsError>;
}

pub trait CompactingStore<T>: RecordStore<T> {
    /// Drop the oldest records until at most `keep` remain.
    fn compact_to(&self, keep: usize) -> Result<(), SmartOpsError>;

    /// Append and then truncate to the newest `keep` records. Stores that can
    /// do both in one write should override this.
    fn append_capped(&self, record: T, keep: usize) -> Result<(), SmartOpsError> {
        self.append(record)?;
        self.compact_to(keep)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackupManifestEntry {
    pub timestamp: String,
    pub original: String,
    pub backup: String,
    pub reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogEntry {
    pub timestamp: String,
    #[serde(default)]
    pub event_id: String,
    pub operation: String,
    pub details: serde_json::Value,
}

/// A whole-file pretty JSON array. Missing file reads as empty.
pub struct JsonArrayStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonArrayStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<T>, SmartOpsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "unreadable record file, starting from an empty list"
                );
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[T]) -> Result<(), SmartOpsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> RecordStore<T> for JsonArrayStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn append(&self, record: T) -> Result<(), SmartOpsError> {
        let _guard = self.guard();
        let mut records = self.load()?;
        records.push(record);
        self.save(&records)
    }

    fn read_all(&self) -> Result<Vec<T>, SmartOpsError> {
        let _guard = self.guard();
        self.load()
    }
}

impl<T> CompactingStore<T> for JsonArrayStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn compact_to(&self, keep: usize) -> Result<(), SmartOpsError> {
        let _guard = self.guard();
        let mut records = self.load()?;
        if records.len() <= keep {
            return Ok(());
        }
        truncate_oldest(&mut records, keep);
        self.save(&records)
    }

    /// One read, append, truncate and write under a single lock.
    fn append_capped(&self, record: T, keep: usize) -> Result<(), SmartOpsError> {
        let _guard = self.guard();
        let mut records = self.load()?;
        records.push(record);
        truncate_oldest(&mut records, keep);
        self.save(&records)
    }
}

fn truncate_oldest<T>(records: &mut Vec<T>, keep: usize) {
    let excess = records.len().saturating_sub(keep);
    records.drain(..excess);
}

/// Append-only JSON lines, never compacted.
pub struct JsonlLog<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonlLog<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> RecordStore<T> for JsonlLog<T>
where
    T: Serialize + DeserializeOwned,
{
    fn append(&self, record: T) -> Result<(), SmartOpsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<T>, SmartOpsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

/// Size-bounded record of every versioned backup.
pub struct BackupManifest {
    store: Box<dyn CompactingStore<BackupManifestEntry>>,
    cap: usize,
}

impl BackupManifest {
    pub fn new(store: Box<dyn CompactingStore<BackupManifestEntry>>) -> Self {
        Self::with_cap(store, MANIFEST_CAP)
    }

    pub fn with_cap(store: Box<dyn CompactingStore<BackupManifestEntry>>, cap: usize) -> Self {
        Self { store, cap }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonArrayStore::new(path)))
    }

    pub fn record(&self, entry: BackupManifestEntry) -> Result<(), SmartOpsError> {
        self.store.append_capped(entry, self.cap)
    }

    pub fn entries(&self) -> Result<Vec<BackupManifestEntry>, SmartOpsError> {
        self.store.read_all()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Best-effort operation log. Writing never fails the caller.
pub struct OperationLog {
    store: Box<dyn RecordStore<OperationLogEntry>>,
}

impl OperationLog {
    pub fn new(store: Box<dyn RecordStore<OperationLogEntry>>) -> Self {
        Self { store }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonlLog::new(path)))
    }

    pub fn record(&self, operation: &str, details: serde_json::Value) {
        let entry = OperationLogEntry {
            timestamp: time::now_iso(),
            event_id: time::new_event_id(),
            operation: operation.to_string(),
            details,
        };
        if let Err(e) = self.store.append(entry) {
            tracing::warn!(operation, error = %e, "operation log write failed");
        }
    }

    pub fn entries(&self) -> Result<Vec<OperationLogEntry>, SmartOpsError> {
        self.store.read_all()
    }
}
