//! Directory-backed durable queue. Each pending payload is one file named
//! `<timestamp-micros>_<origin>`; the timestamp is zero-padded so a
//! lexicographic listing is FIFO order, and the origin is recoverable
//! without opening the file.

use crate::config::CompletionPolicy;
use crate::errors::StoreError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const QUEUE_DIR: &str = "queue";
const ARCHIVE_DIR: &str = "archive";

// Enqueue writes under this suffix, then links into place; listings
// never surface staging files.
const STAGING_SUFFIX: &str = ".tmp";

/// Reference to one entry in the pending queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryRef {
    name: String,
    timestamp_micros: u64,
    origin: String,
}

impl EntryRef {
    fn from_name(name: &str) -> Result<Self, StoreError> {
        let (timestamp, origin) = name
            .split_once('_')
            .ok_or_else(|| StoreError::InvalidName(name.into()))?;
        if origin.is_empty() {
            return Err(StoreError::InvalidName(name.into()));
        }
        let timestamp_micros = timestamp
            .parse()
            .map_err(|_| StoreError::InvalidName(name.into()))?;

        Ok(EntryRef {
            name: name.to_string(),
            timestamp_micros,
            origin: origin.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn timestamp_micros(&self) -> u64 {
        self.timestamp_micros
    }
}

/// Crash-durable, append-only storage for pending payloads. Entries are
/// never mutated in place; delivered entries move to `archive/` or are
/// removed, per the configured policy. The queue directory is the single
/// source of truth for undelivered work, so a restart recovers simply by
/// re-scanning it.
pub struct QueueStore {
    queue_dir: PathBuf,
    archive_dir: PathBuf,
    policy: CompletionPolicy,
}

impl QueueStore {
    /// Opens a store rooted at `base_dir`, creating the queue and archive
    /// directories if absent. Idempotent over existing directories.
    pub fn open(base_dir: &Path, policy: CompletionPolicy) -> Result<Self, StoreError> {
        let queue_dir = base_dir.join(QUEUE_DIR);
        let archive_dir = base_dir.join(ARCHIVE_DIR);

        for dir in [&queue_dir, &archive_dir] {
            if dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "directory exists");
            } else {
                fs::create_dir_all(dir)?;
                tracing::info!(dir = %dir.display(), "directory created");
            }
        }

        Ok(QueueStore {
            queue_dir,
            archive_dir,
            policy,
        })
    }

    /// Durably writes `payload` as a new pending entry. The payload goes
    /// to a staging file first and is linked into the queue, so no
    /// reader ever observes a partially written entry and no entry is
    /// ever overwritten.
    pub fn enqueue(&self, origin: &str, payload: &[u8]) -> Result<EntryRef, StoreError> {
        let mut micros = now_micros()?;
        loop {
            let name = format!("{micros:020}_{origin}");
            let path = self.queue_dir.join(&name);
            if path.exists() {
                // Same origin twice in one microsecond: step forward
                // rather than overwrite the existing entry.
                micros += 1;
                continue;
            }

            // The staging file doubles as a name reservation: create_new
            // loses against a concurrent enqueue that picked the same
            // name in the same microsecond.
            let staged = self.queue_dir.join(format!("{name}{STAGING_SUFFIX}"));
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staged)
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    micros += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = file.write_all(payload).and_then(|_| file.sync_all()) {
                let _ = fs::remove_file(&staged);
                return Err(e.into());
            }
            drop(file);

            // Publish via hard link: unlike rename it fails if the final
            // name already exists, so a racing enqueue that slipped past
            // the reservation still cannot clobber an entry.
            match fs::hard_link(&staged, &path) {
                Ok(()) => {
                    let _ = fs::remove_file(&staged);
                    return EntryRef::from_name(&name);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let _ = fs::remove_file(&staged);
                    micros += 1;
                }
                Err(e) => {
                    let _ = fs::remove_file(&staged);
                    return Err(e.into());
                }
            }
        }
    }

    /// Snapshot of the pending queue, oldest first. Files that do not
    /// parse as entry names are skipped with a warning.
    pub fn list_pending(&self) -> Result<Vec<EntryRef>, StoreError> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.queue_dir)? {
            let dirent = dirent?;
            let file_name = dirent.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::warn!(name = ?file_name, "skipping non-UTF-8 file in queue");
                continue;
            };
            if name.ends_with(STAGING_SUFFIX) {
                continue;
            }
            match EntryRef::from_name(name) {
                Ok(entry) => entries.push(entry),
                Err(_) => tracing::warn!(name, "skipping unrecognized file in queue"),
            }
        }
        // Zero-padded timestamps make name order FIFO order; the origin
        // suffix is the deterministic tie-break within a microsecond.
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }

    /// Full payload bytes of a pending entry.
    pub fn read_payload(&self, entry: &EntryRef) -> Result<Vec<u8>, StoreError> {
        fs::read(self.queue_dir.join(&entry.name)).map_err(|e| self.map_not_found(entry, e))
    }

    /// Relocates or removes a delivered entry per the configured policy.
    pub fn complete(&self, entry: &EntryRef) -> Result<(), StoreError> {
        match self.policy {
            CompletionPolicy::Archive => self.archive(entry),
            CompletionPolicy::Delete => self.delete(entry),
        }
    }

    /// Moves a delivered entry into the archive directory. The rename is
    /// atomic: the entry is either still pending or fully archived, never
    /// both.
    pub fn archive(&self, entry: &EntryRef) -> Result<(), StoreError> {
        let from = self.queue_dir.join(&entry.name);
        let to = self.archive_dir.join(&entry.name);
        tracing::debug!(from = %from.display(), to = %to.display(), "archiving entry");
        fs::rename(&from, &to).map_err(|e| self.map_not_found(entry, e))
    }

    /// Removes a delivered entry outright.
    pub fn delete(&self, entry: &EntryRef) -> Result<(), StoreError> {
        tracing::debug!(entry = entry.name(), "deleting entry");
        fs::remove_file(self.queue_dir.join(&entry.name))
            .map_err(|e| self.map_not_found(entry, e))
    }

    pub fn archive_path(&self, entry: &EntryRef) -> PathBuf {
        self.archive_dir.join(&entry.name)
    }

    fn map_not_found(&self, entry: &EntryRef, e: io::Error) -> StoreError {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::EntryNotFound(entry.name.clone())
        } else {
            e.into()
        }
    }
}

fn now_micros() -> Result<u64, StoreError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(io::Error::other)?;
    Ok(now.as_micros() as u64)
}
