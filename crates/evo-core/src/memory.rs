//! Local memory: versioned records in Sled with a DashMap hot cache of the latest version per key.
//!
//! ## Layout
//!
//! | Tree       | Key                         | Value                          |
//! |------------|-----------------------------|--------------------------------|
//! | `records`  | record id (u64, big-endian) | JSON [`MemoryRecord`]          |
//! | `versions` | `key \0 version` (BE u64)   | record id (u64, big-endian)    |
//!
//! Every mutation is a single multi-tree transaction followed by a flush, so a write
//! either lands completely or not at all and survives a restart. `records` is ordered by
//! id, which makes [`MemoryStore::query`] a plain sequential scan.
//!
//! Writers are serialized by one store-wide lock (version numbers are read-modify-write);
//! readers never take it.
//!
//! The versions of one key always form a contiguous range: `put` leaves a single version,
//! `append` adds `last + 1`, a bounded append drops the oldest ones and `remove` drops all.
//! Appends only look at the two ends of that range, so their cost does not grow with history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

const RECORDS_TREE: &str = "records";
const VERSIONS_TREE: &str = "versions";
const KEY_SEPARATOR: u8 = 0;

/// Errors from the memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The storage medium could not be reached (I/O failure, lock held by another process).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("no memory stored under key '{0}'")]
    NotFound(String),
    /// Keys must be non-empty after trimming and must not contain NUL.
    #[error("invalid memory key: {0:?}")]
    InvalidKey(String),
    #[error("corrupt memory record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for MemoryError {
    fn from(e: sled::Error) -> Self {
        match e {
            sled::Error::Io(io) => MemoryError::StorageUnavailable(io.to_string()),
            other => MemoryError::Storage(other.to_string()),
        }
    }
}

impl From<TransactionError<()>> for MemoryError {
    fn from(e: TransactionError<()>) -> Self {
        match e {
            TransactionError::Storage(e) => e.into(),
            TransactionError::Abort(()) => MemoryError::Storage("memory transaction aborted".to_string()),
        }
    }
}

/// Monotonically increasing record identifier (stable across restarts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    fn from_key(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One persisted version of a keyed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub key: String,
    pub content: serde_json::Value,
    /// Per-key version, starting at 1 and strictly increasing (also across replacements).
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Drop every previous version of the key in the same transaction.
    Replace,
    /// Keep previous versions (at most `keep` in total when set); the new record becomes the latest.
    Append { keep: Option<usize> },
}

/// One entry of the `versions` index.
#[derive(Clone)]
struct VersionEntry {
    version: u64,
    index_key: Vec<u8>,
    id: RecordId,
}

impl VersionEntry {
    fn parse(prefix_len: usize, index_key: &[u8], value: &[u8]) -> Option<Self> {
        let version = index_key
            .get(prefix_len..)
            .and_then(|tail| <[u8; 8]>::try_from(tail).ok())
            .map(u64::from_be_bytes)?;
        Some(Self {
            version,
            index_key: index_key.to_vec(),
            id: RecordId::from_key(value)?,
        })
    }
}

/// Durable key/document store owned exclusively by the engine side of the process.
pub struct MemoryStore {
    db: Db,
    records: Tree,
    versions: Tree,
    /// Hot cache: normalized key -> latest record. Written only after a commit.
    latest: DashMap<String, MemoryRecord>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    /// Opens or creates a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MemoryError> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// Opens a throwaway store that is deleted on drop (tests, dry runs).
    pub fn open_temporary() -> Result<Self, MemoryError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, MemoryError> {
        let records = db.open_tree(RECORDS_TREE)?;
        let versions = db.open_tree(VERSIONS_TREE)?;
        Ok(Self {
            db,
            records,
            versions,
            latest: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Replaces whatever is stored under `key` with a single new version.
    pub fn put(&self, key: &str, content: impl Into<serde_json::Value>) -> Result<RecordId, MemoryError> {
        self.write(key, content.into(), WriteMode::Replace)
    }

    /// Adds a new version under `key`, keeping the older ones for [`history`](Self::history).
    pub fn append(&self, key: &str, content: impl Into<serde_json::Value>) -> Result<RecordId, MemoryError> {
        self.write(key, content.into(), WriteMode::Append { keep: None })
    }

    /// Like [`append`](Self::append), but drops the oldest versions so at most `keep` remain
    /// (never fewer than the new one). The trim happens in the same transaction as the write.
    pub fn append_bounded(
        &self,
        key: &str,
        content: impl Into<serde_json::Value>,
        keep: usize,
    ) -> Result<RecordId, MemoryError> {
        self.write(key, content.into(), WriteMode::Append { keep: Some(keep.max(1)) })
    }

    /// Returns the content of the latest version of `key`.
    pub fn get(&self, key: &str) -> Result<serde_json::Value, MemoryError> {
        self.latest_record(key).map(|r| r.content)
    }

    /// Returns the latest record of `key` (content plus id, version, timestamp).
    pub fn latest_record(&self, key: &str) -> Result<MemoryRecord, MemoryError> {
        let key = normalize_key(key)?;
        if let Some(hit) = self.latest.get(&key) {
            return Ok(hit.clone());
        }
        // Fill the cache under the write lock so a concurrent remove cannot be undone by a stale read.
        let _guard = self.lock_writes()?;
        let entries = self.version_entries(&key)?;
        let last = entries.last().ok_or_else(|| MemoryError::NotFound(key.clone()))?;
        let record = self.load_record(last.id)?.ok_or_else(|| MemoryError::NotFound(key.clone()))?;
        self.latest.insert(key, record.clone());
        Ok(record)
    }

    /// All versions of `key`, oldest first. Empty when the key was never written.
    pub fn history(&self, key: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let key = normalize_key(key)?;
        let mut out = Vec::new();
        for entry in self.version_entries(&key)? {
            if let Some(record) = self.load_record(entry.id)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Lazily scans every stored record in id order and yields those accepted by `predicate`.
    ///
    /// Each call starts a fresh scan over the current state; the iterator is not a live cursor.
    pub fn query<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = Result<MemoryRecord, MemoryError>> + 'a
    where
        P: Fn(&MemoryRecord) -> bool + 'a,
    {
        self.records.iter().filter_map(move |item| {
            let decoded = item
                .map_err(MemoryError::from)
                .and_then(|(_, bytes)| serde_json::from_slice::<MemoryRecord>(&bytes).map_err(MemoryError::from));
            match decoded {
                Ok(record) if predicate(&record) => Some(Ok(record)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        })
    }

    /// Removes every version of `key`. Returns how many records were deleted (0 if absent).
    pub fn remove(&self, key: &str) -> Result<usize, MemoryError> {
        let key = normalize_key(key)?;
        let _guard = self.lock_writes()?;
        let entries = self.version_entries(&key)?;
        if entries.is_empty() {
            return Ok(0);
        }
        (&self.records, &self.versions).transaction(|(records, versions)| {
            for entry in &entries {
                versions.remove(entry.index_key.as_slice())?;
                records.remove(&entry.id.to_key()[..])?;
            }
            Ok::<(), ConflictableTransactionError<()>>(())
        })?;
        self.db.flush()?;
        self.latest.remove(&key);
        tracing::info!(
            target: "evo::memory",
            key = %key,
            removed = entries.len(),
            action = "REMOVE",
            "memory removed key '{}' ({} version(s))",
            key,
            entries.len()
        );
        Ok(entries.len())
    }

    /// Distinct stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, MemoryError> {
        let mut keys: Vec<String> = Vec::new();
        for item in self.versions.iter().keys() {
            let raw = item?;
            let Some(split) = raw.iter().position(|b| *b == KEY_SEPARATOR) else {
                continue;
            };
            let Ok(key) = std::str::from_utf8(&raw[..split]) else {
                continue;
            };
            if keys.last().map(String::as_str) != Some(key) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    /// Number of stored records across all keys and versions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read-only accessor handed to skills.
    pub fn reader(&self) -> MemoryReader<'_> {
        MemoryReader { store: self }
    }

    fn write(&self, key: &str, content: serde_json::Value, mode: WriteMode) -> Result<RecordId, MemoryError> {
        let key = normalize_key(key)?;
        let _guard = self.lock_writes()?;

        let (version, stale) = match mode {
            WriteMode::Replace => {
                let existing = self.version_entries(&key)?;
                let version = existing.last().map(|e| e.version + 1).unwrap_or(1);
                (version, existing)
            }
            WriteMode::Append { keep } => match self.version_bounds(&key)? {
                None => (1, Vec::new()),
                Some((first, last)) => {
                    let stored = (last.version - first.version + 1) as usize;
                    let excess = keep.map(|k| (stored + 1).saturating_sub(k)).unwrap_or(0);
                    let stale = if excess > 0 { self.oldest_entries(&key, excess)? } else { Vec::new() };
                    (last.version + 1, stale)
                }
            },
        };
        let id = RecordId(self.db.generate_id()?);
        let record = MemoryRecord {
            id,
            key: key.clone(),
            content,
            version,
            timestamp: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let index_key = version_key(&key, version);

        (&self.records, &self.versions).transaction(|(records, versions)| {
            for entry in &stale {
                versions.remove(entry.index_key.as_slice())?;
                records.remove(&entry.id.to_key()[..])?;
            }
            records.insert(&id.to_key()[..], bytes.as_slice())?;
            versions.insert(index_key.as_slice(), &id.to_key()[..])?;
            Ok::<(), ConflictableTransactionError<()>>(())
        })?;
        self.db.flush()?;

        self.latest.insert(key.clone(), record);
        tracing::info!(
            target: "evo::memory",
            key = %key,
            record_id = id.0,
            version,
            bytes = bytes.len(),
            dropped = stale.len(),
            action = if mode == WriteMode::Replace { "PUT" } else { "APPEND" },
            "memory wrote key '{}' v{} ({} bytes)",
            key,
            version,
            bytes.len()
        );
        Ok(id)
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>, MemoryError> {
        self.write_lock
            .lock()
            .map_err(|_| MemoryError::Storage("memory write lock poisoned".to_string()))
    }

    fn version_entries(&self, key: &str) -> Result<Vec<VersionEntry>, MemoryError> {
        let prefix = key_prefix(key);
        let mut out = Vec::new();
        for item in self.versions.scan_prefix(&prefix) {
            let (k, v) = item?;
            out.extend(VersionEntry::parse(prefix.len(), &k, &v));
        }
        Ok(out)
    }

    /// The `n` oldest versions of `key`.
    fn oldest_entries(&self, key: &str, n: usize) -> Result<Vec<VersionEntry>, MemoryError> {
        let prefix = key_prefix(key);
        let mut out = Vec::with_capacity(n);
        for item in self.versions.scan_prefix(&prefix).take(n) {
            let (k, v) = item?;
            out.extend(VersionEntry::parse(prefix.len(), &k, &v));
        }
        Ok(out)
    }

    /// Oldest and newest version of `key`, read from the two ends of the index.
    fn version_bounds(&self, key: &str) -> Result<Option<(VersionEntry, VersionEntry)>, MemoryError> {
        let prefix = key_prefix(key);
        let mut scan = self.versions.scan_prefix(&prefix);
        let first = match scan.next() {
            Some(item) => {
                let (k, v) = item?;
                VersionEntry::parse(prefix.len(), &k, &v)
            }
            None => return Ok(None),
        };
        let last = match scan.next_back() {
            Some(item) => {
                let (k, v) = item?;
                VersionEntry::parse(prefix.len(), &k, &v)
            }
            None => None,
        };
        Ok(match (first, last) {
            (Some(first), Some(last)) => Some((first, last)),
            (Some(only), None) => Some((only.clone(), only)),
            _ => None,
        })
    }

    fn load_record(&self, id: RecordId) -> Result<Option<MemoryRecord>, MemoryError> {
        match self.records.get(&id.to_key()[..])? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Read-only view of the store. Skills receive this instead of the store itself.
#[derive(Clone, Copy)]
pub struct MemoryReader<'a> {
    store: &'a MemoryStore,
}

impl<'a> MemoryReader<'a> {
    pub fn get(&self, key: &str) -> Result<serde_json::Value, MemoryError> {
        self.store.get(key)
    }

    pub fn latest_record(&self, key: &str) -> Result<MemoryRecord, MemoryError> {
        self.store.latest_record(key)
    }

    pub fn history(&self, key: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.store.history(key)
    }

    pub fn query<P>(&self, predicate: P) -> impl Iterator<Item = Result<MemoryRecord, MemoryError>> + 'a
    where
        P: Fn(&MemoryRecord) -> bool + 'a,
    {
        self.store.query(predicate)
    }

    pub fn keys(&self) -> Result<Vec<String>, MemoryError> {
        self.store.keys()
    }
}

/// Keys are trimmed and lower-cased so facts are looked up case-insensitively.
pub fn normalize_key(key: &str) -> Result<String, MemoryError> {
    let k = key.trim().to_lowercase();
    if k.is_empty() || k.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(MemoryError::InvalidKey(key.to_string()));
    }
    Ok(k)
}

fn key_prefix(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 9);
    out.extend_from_slice(key.as_bytes());
    out.push(KEY_SEPARATOR);
    out
}

fn version_key(key: &str, version: u64) -> Vec<u8> {
    let mut out = key_prefix(key);
    out.extend_from_slice(&version.to_be_bytes());
    out
}
