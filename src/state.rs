//! Durable state persistence
//!
//! Provides pluggable key-value persistence for engine records so history,
//! quota, and the last-active pointer survive process restarts.
//!
//! Writes go through a single writer task ([`Persistence`]), which keeps
//! them strictly ordered: a later write of a key can never be overwritten
//! by an earlier one completing after it. Store failures are absorbed into
//! an in-memory fallback for the rest of the process lifetime.

use crate::error::{Result, SessionError};
use crate::events::{emit, EngineEvent, EventSender};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Record keys used by the engine
pub mod keys {
    pub const HISTORY: &str = "history";
    pub const DAILY_USAGE: &str = "daily_usage";
    pub const BONUS_LEDGER: &str = "bonus_ledger";
    pub const LAST_ACTIVE_SESSION: &str = "last_active_session";
}

/// Trait for durable key-value record storage
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save a record, replacing any previous value
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Load a record, `None` if it was never saved
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Delete a record; deleting a missing record is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Backend name for diagnostics
    fn backend_name(&self) -> &str {
        "unknown"
    }
}

/// JSON file-based state store
///
/// Persists each record as `<dir>/<key>.json`.
/// Atomic writes via temp file + rename to prevent corruption.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a new file state store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the file path for a record
    pub fn record_path(&self, key: &str) -> PathBuf {
        // Sanitize key to prevent path traversal
        let safe_key = key.replace(['/', '\\'], "_").replace("..", "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.record_path(key);
        let json = serde_json::to_string_pretty(value)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to create state directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to write state file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            SessionError::Persistence(format!(
                "Failed to rename state file {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(key, path = %path.display(), "State saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path).await.map_err(|e| {
            SessionError::Persistence(format!("Failed to read state file {}: {}", path.display(), e))
        })?;

        let value: Value = serde_json::from_str(&json).map_err(|e| {
            SessionError::Persistence(format!("Failed to parse state file {}: {}", path.display(), e))
        })?;

        tracing::debug!(key, path = %path.display(), "State loaded");
        Ok(Some(value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.record_path(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await.map_err(|e| {
                SessionError::Persistence(format!(
                    "Failed to delete state file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// In-memory state store for testing
///
/// Records are lost on drop.
#[derive(Default)]
pub struct MemoryStateStore {
    records: std::sync::RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let mut records = self.records.write().map_err(|e| {
            SessionError::Persistence(format!("Failed to acquire state lock: {}", e))
        })?;
        records.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let records = self.records.read().map_err(|e| {
            SessionError::Persistence(format!("Failed to acquire state lock: {}", e))
        })?;
        Ok(records.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|e| {
            SessionError::Persistence(format!("Failed to acquire state lock: {}", e))
        })?;
        records.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Add fields present in `defaults` but missing from `stored`
///
/// Unknown fields in `stored` are kept. Nested objects merge recursively;
/// anything that is not an object on both sides is taken from `stored`.
pub fn merge_defaults(stored: Value, defaults: &Value) -> Value {
    match (stored, defaults) {
        (Value::Object(mut stored), Value::Object(defaults)) => {
            for (key, default) in defaults {
                match stored.remove(key) {
                    Some(existing) => {
                        stored.insert(key.clone(), merge_defaults(existing, default));
                    }
                    None => {
                        stored.insert(key.clone(), default.clone());
                    }
                }
            }
            Value::Object(stored)
        }
        (stored, _) => stored,
    }
}

/// Write `update` over `base`, keeping fields only `base` knows about
pub fn overlay(base: Value, update: Value) -> Value {
    match (base, update) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                let existing = base.remove(&key).unwrap_or(Value::Null);
                base.insert(key, overlay(existing, value));
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}

enum WriteOp {
    Put { key: String, value: Value },
    Delete { key: String },
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Records {
    /// Last known raw value per key, including fields this build doesn't know
    raw: RwLock<HashMap<String, Value>>,
    /// Values the store failed to accept (or serve)
    fallback: RwLock<HashMap<String, Value>>,
}

/// Single-writer persistence boundary shared by all engine components
pub struct Persistence {
    store: Arc<dyn StateStore>,
    records: Arc<Records>,
    tx: mpsc::UnboundedSender<WriteOp>,
    event_tx: EventSender,
}

impl Persistence {
    /// Create the persistence layer and spawn its writer task
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(store: Arc<dyn StateStore>, event_tx: EventSender) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let records = Arc::new(Records::default());

        tokio::spawn(run_writer(
            store.clone(),
            records.clone(),
            event_tx.clone(),
            rx,
        ));

        Self {
            store,
            records,
            tx,
            event_tx,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Load a record, merging in defaults for fields it lacks
    ///
    /// Never fails: read or parse errors fall back to `T::default()` and
    /// emit [`EngineEvent::PersistenceFailed`].
    pub async fn load<T>(&self, key: &str) -> T
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let fallback = self.records.fallback.read().await.get(key).cloned();
        let stored = match fallback {
            Some(value) => Some(value),
            None => match self.store.load(key).await {
                Ok(value) => value,
                Err(e) => {
                    self.report_failure(key, &e);
                    None
                }
            },
        };

        let Some(stored) = stored else {
            return T::default();
        };

        let merged = match serde_json::to_value(T::default()) {
            Ok(defaults) => merge_defaults(stored, &defaults),
            Err(_) => stored,
        };
        self.records
            .raw
            .write()
            .await
            .insert(key.to_string(), merged.clone());

        match serde_json::from_value(merged) {
            Ok(value) => value,
            Err(e) => {
                self.report_failure(key, &SessionError::Serialization(e));
                T::default()
            }
        }
    }

    /// Queue a record write; returns once the write is ordered, not applied
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.send(WriteOp::Put {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Queue a record deletion
    pub fn delete(&self, key: &str) {
        self.send(WriteOp::Delete {
            key: key.to_string(),
        });
    }

    /// Wait until every previously queued write has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Keys currently served from the in-memory fallback
    pub async fn fallback_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.fallback.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!("Persistence writer stopped; write dropped");
            emit(
                &self.event_tx,
                EngineEvent::PersistenceFailed {
                    key: String::new(),
                    error: "persistence writer stopped".to_string(),
                },
            );
        }
    }

    fn report_failure(&self, key: &str, error: &SessionError) {
        tracing::warn!(key, error = %error, "State load failed, using defaults");
        emit(
            &self.event_tx,
            EngineEvent::PersistenceFailed {
                key: key.to_string(),
                error: error.to_string(),
            },
        );
    }
}

async fn run_writer(
    store: Arc<dyn StateStore>,
    records: Arc<Records>,
    event_tx: EventSender,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Put { key, value } => {
                let merged = {
                    let mut raw = records.raw.write().await;
                    let base = raw.remove(&key).unwrap_or(Value::Null);
                    let merged = overlay(base, value);
                    raw.insert(key.clone(), merged.clone());
                    merged
                };

                match store.save(&key, &merged).await {
                    Ok(()) => {
                        records.fallback.write().await.remove(&key);
                    }
                    Err(e) => {
                        tracing::warn!(
                            key = %key,
                            backend = store.backend_name(),
                            error = %e,
                            "State write failed, keeping in-memory copy"
                        );
                        records.fallback.write().await.insert(key.clone(), merged);
                        emit(
                            &event_tx,
                            EngineEvent::PersistenceFailed {
                                key,
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
            WriteOp::Delete { key } => {
                records.raw.write().await.remove(&key);
                records.fallback.write().await.remove(&key);
                if let Err(e) = store.delete(&key).await {
                    tracing::warn!(key = %key, error = %e, "State delete failed");
                    emit(
                        &event_tx,
                        EngineEvent::PersistenceFailed {
                            key,
                            error: e.to_string(),
                        },
                    );
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
