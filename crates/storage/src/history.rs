//! Ordered, de-duplicated, bounded history of game results.
//!
//! Invariants held after [`HistoryStore::open`] and every [`HistoryStore::merge`]:
//! - no two records share an [`IssueKey`]
//! - records are sorted by key, highest (most recent) first
//! - `len() <= cap()`, lowest keys evicted first
//!
//! On disk the history is a single pretty-printed document:
//! ```text
//! { "history": [ {"issueNumber": "...", ...}, ... ] }
//! ```
//! rewritten wholesale through a temp file + rename, so a reader of the file
//! always sees either the previous or the new document.
//!
//! The store tracks whether memory is ahead of the file. A failed `persist`
//! leaves it dirty, and the next `persist` catches the file up even when no
//! new record arrived in between.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use collector_core::{IssueKey, Record};

use crate::error::StoreError;

/// What to do with a history file that exists but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptPolicy {
    /// Refuse to open. The file is left untouched for an operator to inspect.
    #[default]
    Fail,
    /// Rename the file to `<name>.corrupt-<timestamp>` and start empty.
    Quarantine,
}

impl CorruptPolicy {
    pub fn from_discard_flag(discard: bool) -> Self {
        if discard { Self::Quarantine } else { Self::Fail }
    }
}

/// Serialized form of the history, shared by the file and the HTTP API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub history: Vec<Record>,
}

#[derive(Serialize)]
struct HistoryDocumentRef<'a> {
    history: &'a [Record],
}

/// Result of a single [`HistoryStore::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    /// Previously unseen records now present in the history.
    pub added: usize,
    /// Previously stored records dropped to respect the cap.
    pub evicted: usize,
}

pub struct HistoryStore {
    /// `None` for the in-memory variant.
    path: Option<PathBuf>,
    cap: usize,
    records: Vec<Record>,
    /// In-memory history differs from what was last written.
    dirty: bool,
}

impl HistoryStore {
    /// Load the history persisted at `path`, or start empty if there is none.
    ///
    /// The parent directory is created if missing.
    pub fn open(
        path: impl Into<PathBuf>,
        cap: usize,
        policy: CorruptPolicy,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
        }

        let records = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HistoryDocument>(&bytes) {
                Ok(doc) => {
                    info!(path = %path.display(), records = doc.history.len(), "history loaded");
                    doc.history
                }
                Err(source) => match policy {
                    CorruptPolicy::Fail => return Err(StoreError::Corrupt { path, source }),
                    CorruptPolicy::Quarantine => {
                        let moved = quarantine(&path)?;
                        warn!(
                            path = %path.display(),
                            moved_to = %moved.display(),
                            error = %source,
                            "history file unreadable, quarantined, starting empty"
                        );
                        Vec::new()
                    }
                },
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no history file yet, starting empty");
                Vec::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let mut store = Self {
            path: Some(path),
            cap: cap.max(1),
            records: Vec::new(),
            dirty: false,
        };
        store.restore(records);
        Ok(store)
    }

    /// A store that lives only as long as the process. `persist` is a no-op.
    pub fn in_memory(cap: usize) -> Self {
        Self {
            path: None,
            cap: cap.max(1),
            records: Vec::new(),
            dirty: false,
        }
    }

    /// Re-establish the invariants over records read from disk.
    fn restore(&mut self, loaded: Vec<Record>) {
        let loaded_len = loaded.len();
        let mut seen = HashSet::with_capacity(loaded_len);
        let mut records: Vec<Record> = loaded
            .into_iter()
            .filter(|r| seen.insert(r.key().clone()))
            .collect();
        let duplicates = loaded_len - records.len();

        let sorted = records.windows(2).all(|w| w[0].key() > w[1].key());
        if !sorted {
            sort_descending(&mut records);
        }
        let over_cap = records.len().saturating_sub(self.cap);
        records.truncate(self.cap);

        if duplicates > 0 || !sorted || over_cap > 0 {
            warn!(
                duplicates,
                resorted = !sorted,
                trimmed = over_cap,
                "persisted history did not satisfy invariants, normalized in memory"
            );
            self.dirty = true;
        }
        self.records = records;
    }

    /// Add every candidate whose key is not already present, then re-sort and
    /// trim to the cap.
    ///
    /// Duplicates within `candidates` count once. A new record that would be
    /// evicted immediately (older than everything in a full history) is not
    /// counted as added, so merging the same batch twice always reports
    /// `added == 0` the second time.
    pub fn merge(&mut self, candidates: impl IntoIterator<Item = Record>) -> MergeResult {
        let before = self.records.len();
        let mut seen: HashSet<IssueKey> = self.records.iter().map(|r| r.key().clone()).collect();
        let mut fresh: HashSet<IssueKey> = HashSet::new();

        for candidate in candidates {
            if seen.insert(candidate.key().clone()) {
                fresh.insert(candidate.key().clone());
                self.records.push(candidate);
            }
        }

        if fresh.is_empty() {
            return MergeResult::default();
        }

        sort_descending(&mut self.records);
        self.records.truncate(self.cap);

        let added = self
            .records
            .iter()
            .filter(|r| fresh.contains(r.key()))
            .count();
        let evicted = before + added - self.records.len();
        if added > 0 {
            self.dirty = true;
        }

        debug!(candidates = fresh.len(), added, evicted, total = self.records.len(), "history merged");
        MergeResult { added, evicted }
    }

    /// Write the whole history to disk atomically.
    ///
    /// Clears the dirty flag only once the new document is in place.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(&HistoryDocumentRef {
            history: &self.records,
        })?;
        atomic_write(path, &json)?;
        debug!(path = %path.display(), records = self.records.len(), "history persisted");
        self.dirty = false;
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Owned copy for readers that must not hold the store lock.
    pub fn snapshot(&self) -> HistoryDocument {
        HistoryDocument {
            history: self.records.clone(),
        }
    }

    pub fn latest(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn oldest(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// `true` when memory holds changes the file does not.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn sort_descending(records: &mut [Record]) {
    records.sort_by(|a, b| b.key().cmp(a.key()));
}

/// Write to a sibling temp file, fsync, rename over `path`, then fsync the
/// directory so the rename itself is durable.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history".to_string());
    let temp_path = path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()));

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    if let Err(source) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::Io {
            path: temp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StoreError> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(StoreError::io(dir))
}

// Directories cannot be opened as files here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "history".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let target = path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));
    fs::rename(path, &target).map_err(StoreError::io(path))?;
    Ok(target)
}
