//! Persistent container records.
//!
//! Each container owns a directory `<state_dir>/<id>/` holding a
//! human-readable `config.json`. The record's existence is the only source
//! of truth for whether a container exists, so every write replaces the
//! file atomically and every read-modify-write holds an advisory lock on
//! the record's directory.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use hutch_common::constants::{LOCK_FILE, RECORD_FILE};
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, ContainerStatus, ResourceLimits};
use serde::{Deserialize, Serialize};

/// Persistent record of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container identifier; also the name of the record's directory.
    pub id: ContainerId,
    /// Hostname the executor assigns; names the overlay paths.
    #[serde(default)]
    pub hostname: String,
    /// Absolute path of the root filesystem source.
    pub rootfs: PathBuf,
    /// Limits forwarded to the executor on every launch.
    #[serde(flatten)]
    pub limits: ResourceLimits,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// PID of the init process from the last successful launch.
    pub pid: Option<u32>,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
}

impl ContainerRecord {
    /// Creates a record in the `Creating` status for a fresh container.
    #[must_use]
    pub fn new(id: ContainerId, rootfs: PathBuf, limits: ResourceLimits) -> Self {
        Self {
            hostname: id.hostname(),
            id,
            rootfs,
            limits,
            status: ContainerStatus::Creating,
            pid: None,
            created_at: Utc::now(),
        }
    }
}

/// Directory-per-container record store.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

/// Exclusive advisory lock on one record, released on drop.
struct RecordLock {
    file: File,
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl RecordStore {
    /// Creates a store rooted at `root`. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the base directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the base directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::PermissionDenied`] when the directory cannot be
    /// created for lack of privilege, or an I/O error otherwise.
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                HutchError::PermissionDenied {
                    message: format!(
                        "cannot create {}; run with sudo or create it manually",
                        self.root.display()
                    ),
                }
            } else {
                HutchError::io(&self.root, e)
            }
        })
    }

    /// Returns the directory owned by the record `id`.
    #[must_use]
    pub fn record_dir(&self, id: &ContainerId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn record_path(&self, id: &ContainerId) -> PathBuf {
        self.record_dir(id).join(RECORD_FILE)
    }

    /// Writes a new record.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::AlreadyExists`] if a record with the same ID is
    /// stored, or an I/O error if it cannot be written.
    pub fn create(&self, record: &ContainerRecord) -> Result<()> {
        self.ensure_root()?;
        let dir = self.record_dir(&record.id);
        std::fs::create_dir(&dir).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                HutchError::AlreadyExists {
                    id: record.id.to_string(),
                }
            } else {
                HutchError::io(&dir, e)
            }
        })?;
        let _lock = self.lock(&record.id)?;
        write_atomic(&dir, record)?;
        tracing::debug!(id = %record.id, "record created");
        Ok(())
    }

    /// Reads the record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::NotFound`] if no such record exists, or an error
    /// if it cannot be read or parsed.
    pub fn read(&self, id: &ContainerId) -> Result<ContainerRecord> {
        let path = self.record_path(id);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                HutchError::NotFound { id: id.to_string() }
            } else {
                HutchError::io(&path, e)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Applies `mutate` to the record `id` and atomically replaces it.
    ///
    /// The record is read, mutated, and written back under the record's
    /// advisory lock. A crash leaves either the old or the new file.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::NotFound`] if no such record exists, or an error
    /// if it cannot be read or written.
    pub fn update<F>(&self, id: &ContainerId, mutate: F) -> Result<ContainerRecord>
    where
        F: FnOnce(&mut ContainerRecord),
    {
        let _lock = self.lock(id)?;
        let mut record = self.read(id)?;
        mutate(&mut record);
        record.id = id.clone();
        write_atomic(&self.record_dir(id), &record)?;
        tracing::debug!(id = %id, status = %record.status, pid = ?record.pid, "record updated");
        Ok(record)
    }

    /// Returns the IDs of all stored records, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be listed.
    pub fn ids(&self) -> Result<Vec<ContainerId>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HutchError::io(&self.root, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HutchError::io(&self.root, e))?;
            let path = entry.path();
            if path.join(RECORD_FILE).is_file() {
                ids.push(ContainerId::new(entry.file_name().to_string_lossy()));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Returns every readable record, ordered by ID ascending.
    ///
    /// Records that fail to parse are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let mut records = Vec::new();
        for id in self.ids()? {
            match self.read(&id) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(id = %id, error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Deletes the record `id` together with its whole directory.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::NotFound`] if the directory is already gone, or
    /// an I/O error if it cannot be removed.
    pub fn remove(&self, id: &ContainerId) -> Result<()> {
        let dir = self.record_dir(id);
        std::fs::remove_dir_all(&dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => HutchError::NotFound { id: id.to_string() },
            ErrorKind::PermissionDenied => HutchError::PermissionDenied {
                message: format!("removing {}: {e}", dir.display()),
            },
            _ => HutchError::io(&dir, e),
        })?;
        tracing::info!(id = %id, "record removed");
        Ok(())
    }

    fn lock(&self, id: &ContainerId) -> Result<RecordLock> {
        let dir = self.record_dir(id);
        if !dir.is_dir() {
            return Err(HutchError::NotFound { id: id.to_string() });
        }
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| HutchError::io(&path, e))?;
        file.lock_exclusive().map_err(|e| HutchError::io(&path, e))?;
        Ok(RecordLock { file })
    }
}

/// Writes `record` to a temp file in `dir`, fsyncs, and renames it over
/// the record file.
fn write_atomic(dir: &Path, record: &ContainerRecord) -> Result<()> {
    let path = dir.join(RECORD_FILE);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| HutchError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, record)?;
    writeln!(tmp).map_err(|e| HutchError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| HutchError::io(tmp.path(), e))?;
    let _ = tmp.persist(&path).map_err(|e| HutchError::io(&path, e.error))?;
    Ok(())
}
