//! Append-only purchase ledger persisted as a JSON array.
//!
//! Every append is a full read-modify-write of the file performed while
//! holding the store's write lock, so concurrent webhook deliveries can never
//! clobber each other's records. The rewritten array lands in a temporary
//! sibling first and is renamed over the ledger, so readers only ever see a
//! complete file.
//!
//! A missing or corrupt ledger reads as empty. A corrupt file is moved aside
//! to `<name>.corrupt-<timestamp>` once the replacement array has been
//! written, instead of being overwritten.

use std::{
    ffi::OsString,
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{CoreError, Result},
    models::PurchaseRecord,
};

/// What to do when a record's assignment id is already in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Append the record again, keeping every delivery.
    Append,
    /// Leave the ledger untouched and report the existing position.
    #[default]
    Skip,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown duplicate policy '{other}', expected 'append' or 'skip'")),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Result of appending a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was written at `position`.
    Appended {
        /// Zero-based index in the ledger array
        position: usize,
    },
    /// A record with the same assignment id already sits at `position`.
    Duplicate {
        /// Zero-based index of the existing record
        position: usize,
    },
}

/// File-backed purchase ledger with a single-writer discipline.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    policy: DuplicatePolicy,
    write_lock: Mutex<()>,
}

/// Raw ledger contents as read from disk.
struct Snapshot {
    entries: Vec<Value>,
    corrupt: bool,
}

impl LedgerStore {
    /// Creates a store for the ledger at `path`. Nothing is touched on disk
    /// until the first append.
    pub fn new(path: impl Into<PathBuf>, policy: DuplicatePolicy) -> Self {
        Self { path: path.into(), policy, write_lock: Mutex::new(()) }
    }

    /// Returns the ledger file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configured duplicate policy.
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Loads every well-formed purchase record.
    ///
    /// Entries that do not match the record shape are skipped with a warning
    /// but are kept on disk by later appends.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LedgerIo` for I/O failures other than a missing file.
    pub async fn load(&self) -> Result<Vec<PurchaseRecord>> {
        let snapshot = read_snapshot(&self.path).await?;
        let records = snapshot
            .entries
            .into_iter()
            .enumerate()
            .filter_map(|(position, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(position, error = %e, "Skipping ledger entry with unexpected shape");
                    None
                },
            })
            .collect();
        Ok(records)
    }

    /// Returns the number of entries in the ledger.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LedgerIo` for I/O failures other than a missing file.
    pub async fn len(&self) -> Result<usize> {
        Ok(read_snapshot(&self.path).await?.entries.len())
    }

    /// Returns whether the ledger holds no entries.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LedgerIo` for I/O failures other than a missing file.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Appends a purchase record according to the duplicate policy.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::LedgerIo` if the ledger cannot be read or replaced
    /// and `CoreError::LedgerSerialization` if the record cannot be encoded.
    /// The ledger on disk is unchanged when an error is returned.
    pub async fn append(&self, record: PurchaseRecord) -> Result<AppendOutcome> {
        let _guard = self.write_lock.lock().await;

        let Snapshot { mut entries, corrupt } = read_snapshot(&self.path).await?;

        if self.policy == DuplicatePolicy::Skip {
            let existing = entries.iter().position(|entry| {
                entry.get("assignment_id").and_then(Value::as_str)
                    == Some(record.assignment_id.as_str())
            });
            if let Some(position) = existing {
                debug!(assignment_id = %record.assignment_id, position, "Record already in ledger");
                return Ok(AppendOutcome::Duplicate { position });
            }
        }

        let entry = serde_json::to_value(&record).map_err(CoreError::LedgerSerialization)?;
        entries.push(entry);

        let tmp = write_temp(&self.path, &entries).await?;

        let aside = if corrupt {
            let aside = corrupt_sibling(&self.path);
            if let Err(source) = tokio::fs::rename(&self.path, &aside).await {
                discard(&tmp).await;
                return Err(CoreError::LedgerIo { path: aside, source });
            }
            Some(aside)
        } else {
            None
        };

        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            discard(&tmp).await;
            if let Some(aside) = &aside {
                if let Err(e) = tokio::fs::rename(aside, &self.path).await {
                    warn!(path = %aside.display(), error = %e, "Could not restore corrupt ledger");
                }
            }
            return Err(CoreError::LedgerIo { path: self.path.clone(), source });
        }
        if let Some(aside) = &aside {
            warn!(path = %aside.display(), "Moved corrupt ledger aside");
        }

        let position = entries.len() - 1;
        info!(
            assignment_id = %record.assignment_id,
            position,
            path = %self.path.display(),
            "Purchase appended to ledger"
        );
        Ok(AppendOutcome::Appended { position })
    }
}

async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Snapshot { entries: Vec::new(), corrupt: false });
        },
        Err(source) => return Err(CoreError::LedgerIo { path: path.to_path_buf(), source }),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot { entries: Vec::new(), corrupt: false });
    }

    match serde_json::from_slice::<Vec<Value>>(&bytes) {
        Ok(entries) => Ok(Snapshot { entries, corrupt: false }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ledger is not a JSON array, treating as empty");
            Ok(Snapshot { entries: Vec::new(), corrupt: true })
        },
    }
}

/// Writes `entries` to a temporary sibling of `path` and returns its path.
async fn write_temp(path: &Path, entries: &[Value]) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| CoreError::LedgerIo { path: parent.to_path_buf(), source })?;
    }

    let bytes = serde_json::to_vec_pretty(entries).map_err(CoreError::LedgerSerialization)?;
    let tmp = sibling(path, ".tmp");

    if let Err(source) = tokio::fs::write(&tmp, &bytes).await {
        discard(&tmp).await;
        return Err(CoreError::LedgerIo { path: tmp, source });
    }
    Ok(tmp)
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        debug!(path = %tmp.display(), error = %e, "Could not remove temporary ledger");
    }
}

/// Picks an unused `<name>.corrupt-<timestamp>` path next to `path`.
fn corrupt_sibling(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
    let mut aside = sibling(path, &format!(".corrupt-{stamp}"));
    let mut n = 1;
    while aside.exists() {
        aside = sibling(path, &format!(".corrupt-{stamp}-{n}"));
        n += 1;
    }
    aside
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
