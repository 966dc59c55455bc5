use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use fd_lock::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::analysis::{AnalysisError, AnalysisOutcome};

pub const HISTORY_CAPACITY: usize = 50;

/// One recorded analysis. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub image_path: String,
    pub timestamp: String,
    #[serde(rename = "response", default)]
    pub raw_response: String,
    pub success: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_token_count"
    )]
    pub tokens_used: Option<u64>,
}

impl HistoryEntry {
    pub fn from_outcome(image_path: &Path, outcome: &AnalysisOutcome) -> Self {
        let at = outcome.timestamp();
        Self {
            id: at.format("%Y%m%d_%H%M%S").to_string(),
            image_path: image_path.display().to_string(),
            timestamp: outcome.timestamp_iso(),
            raw_response: outcome.response_text(),
            success: outcome.is_success(),
            tokens_used: outcome.tokens_used(),
        }
    }
}

/// Bounded newest-first log of analyses backed by one JSON array file.
///
/// Writers hold an exclusive lock on a sibling `<log>.lock` file for the whole
/// read-modify-write, so separate handles and separate processes sharing one
/// log never drop each other's appends. Readers never observe a partial file:
/// writes go to a sibling temp file that is renamed over the log.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    inner: Arc<HistoryStoreInner>,
}

#[derive(Debug)]
struct HistoryStoreInner {
    path: PathBuf,
    capacity: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, HISTORY_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(HistoryStoreInner {
                path: path.into(),
                capacity: capacity.max(1),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn append(&self, entry: HistoryEntry) -> Result<(), AnalysisError> {
        self.exclusive(|path| {
            let mut entries = read_entries(path);
            entries.push_front(entry);
            entries.truncate(self.inner.capacity);
            write_entries(path, &entries).map_err(|err| persistence(format!("{err:#}")))?;
            debug!(path = %path.display(), len = entries.len(), "history entry appended");
            Ok(())
        })
    }

    /// Stored entries, newest first. Missing or unreadable logs read as empty.
    pub fn list(&self) -> Vec<HistoryEntry> {
        let mut entries = read_entries(&self.inner.path);
        entries.truncate(self.inner.capacity);
        entries.into()
    }

    pub fn clear(&self) -> Result<(), AnalysisError> {
        self.exclusive(|path| match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(persistence(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        })
    }

    /// Runs `op` while holding the in-process mutex and the lock file.
    fn exclusive<T>(
        &self,
        op: impl FnOnce(&Path) -> Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| persistence("history lock poisoned"))?;
        let lock_path = lock_path(&self.inner.path);
        ensure_parent(&self.inner.path).map_err(|err| persistence(format!("{err:#}")))?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| persistence(format!("failed to open {}: {err}", lock_path.display())))?;
        let mut file_lock = RwLock::new(file);
        let _held = file_lock
            .write()
            .map_err(|err| persistence(format!("failed to lock {}: {err}", lock_path.display())))?;
        op(&self.inner.path)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> anyhow::Result<&Path> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    Ok(parent)
}

fn persistence(reason: impl Into<String>) -> AnalysisError {
    AnalysisError::Persistence {
        reason: reason.into(),
    }
}

fn read_entries(path: &Path) -> VecDeque<HistoryEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "history unreadable; treating as empty");
            }
            return VecDeque::new();
        }
    };
    let rows = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(rows)) => rows,
        Ok(_) | Err(_) => {
            warn!(path = %path.display(), "history is not a JSON array; treating as empty");
            return VecDeque::new();
        }
    };
    rows.into_iter()
        .filter_map(|row| serde_json::from_value::<HistoryEntry>(row).ok())
        .collect()
}

fn write_entries(path: &Path, entries: &VecDeque<HistoryEntry>) -> anyhow::Result<()> {
    let parent = ensure_parent(path)?;
    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage history in {}", parent.display()))?;
    serde_json::to_writer_pretty(&mut staged, entries)?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn lenient_token_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}
