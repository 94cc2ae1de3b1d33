// Snapshot store - crash-safe writes of the server list plus backup rotation
//
// persist() never writes the primary file in place: it writes a sibling temp
// file, reads it back, keeps a copy of the previous primary and only then
// renames the temp file over the primary.

use crate::registry::error::PersistError;
use crate::registry::record::ServerRecord;
use crate::registry::validator::{filter_valid, is_well_formed_snapshot};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const PRIMARY_FILE: &str = "servers.json";
const TEMP_FILE: &str = "servers.json.tmp";
const LEGACY_BACKUP_FILE: &str = "servers.backup.json";

/// Outcome of reading one snapshot file.
#[derive(Debug)]
pub enum SnapshotRead {
    Missing,
    Malformed(String),
    Parsed {
        records: Vec<ServerRecord>,
        rejected: usize,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    backup_slots: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, backup_slots: usize) -> Self {
        Self {
            dir: dir.into(),
            backup_slots,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backup_slots(&self) -> usize {
        self.backup_slots
    }

    pub fn primary_path(&self) -> PathBuf {
        self.dir.join(PRIMARY_FILE)
    }

    pub fn temp_path(&self) -> PathBuf {
        self.dir.join(TEMP_FILE)
    }

    pub fn legacy_backup_path(&self) -> PathBuf {
        self.dir.join(LEGACY_BACKUP_FILE)
    }

    pub fn backup_slot_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("servers.backup.{}.json", slot))
    }

    /// Durably replace the primary snapshot with `records`.
    pub fn persist(&self, records: &[ServerRecord]) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| PersistError::Serialization(e.to_string()))?;
        self.persist_encoded(&bytes, write_synced)?;
        tracing::debug!("Saved {} server(s) to {:?}", records.len(), self.primary_path());
        Ok(())
    }

    fn persist_encoded<W>(&self, bytes: &[u8], write: W) -> Result<(), PersistError>
    where
        W: FnOnce(&Path, &[u8]) -> std::io::Result<()>,
    {
        if !is_well_formed_snapshot(bytes) {
            return Err(PersistError::Serialization(
                "encoded server list is not valid JSON".to_string(),
            ));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            PersistError::WriteVerification(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let temp = self.temp_path();
        if let Err(e) = write(&temp, bytes) {
            fs::remove_file(&temp).ok();
            return Err(PersistError::WriteVerification(format!(
                "failed to write {}: {}",
                temp.display(),
                e
            )));
        }

        match fs::read(&temp) {
            Ok(written) if written == bytes && is_well_formed_snapshot(&written) => {}
            Ok(_) => {
                fs::remove_file(&temp).ok();
                return Err(PersistError::WriteVerification(format!(
                    "{} does not match the data written",
                    temp.display()
                )));
            }
            Err(e) => {
                fs::remove_file(&temp).ok();
                return Err(PersistError::WriteVerification(format!(
                    "failed to read back {}: {}",
                    temp.display(),
                    e
                )));
            }
        }

        let primary = self.primary_path();
        let previous = self.save_previous_primary(&primary);

        if let Err(e) = fs::rename(&temp, &primary) {
            tracing::error!("Failed to swap in new server list: {}", e);
            if let Some(previous) = &previous {
                let intact = fs::read(&primary).map_or(false, |current| current == *previous);
                if !intact {
                    if let Err(restore) = fs::write(&primary, previous) {
                        tracing::error!("Failed to restore server list from backup: {}", restore);
                    }
                }
            }
            fs::remove_file(&temp).ok();
            return Err(PersistError::AtomicSwapFailed(e));
        }

        sync_dir(&self.dir);

        if let Some(previous) = previous {
            self.rotate_backups(&previous);
        }

        Ok(())
    }

    /// Read the current primary and mirror it into the legacy slot.
    ///
    /// Returns the previous contents when they are worth keeping, even if the
    /// legacy copy could not be written; rotation works from these bytes.
    fn save_previous_primary(&self, primary: &Path) -> Option<Vec<u8>> {
        if !primary.is_file() {
            return None;
        }

        match fs::read(primary) {
            Ok(current) if is_well_formed_snapshot(&current) => {
                let legacy = self.legacy_backup_path();
                if let Err(e) = fs::write(&legacy, &current) {
                    tracing::warn!("Could not back up {:?} to {:?}: {}", primary, legacy, e);
                }
                Some(current)
            }
            Ok(_) => {
                tracing::warn!("Not backing up malformed {:?}", primary);
                None
            }
            Err(e) => {
                tracing::warn!("Could not read {:?} for backup: {}", primary, e);
                None
            }
        }
    }

    /// Shift numbered backups up by one and write `previous` into slot 0.
    ///
    /// Every step is best-effort; failures are logged and skipped.
    pub fn rotate_backups(&self, previous: &[u8]) {
        if self.backup_slots == 0 {
            return;
        }

        let oldest = self.backup_slot_path(self.backup_slots - 1);
        if oldest.exists() {
            if let Err(e) = fs::remove_file(&oldest) {
                tracing::warn!("Failed to drop oldest backup {:?}: {}", oldest, e);
            }
        }

        for slot in (0..self.backup_slots - 1).rev() {
            let from = self.backup_slot_path(slot);
            if !from.exists() {
                continue;
            }
            let to = self.backup_slot_path(slot + 1);
            if let Err(e) = fs::rename(&from, &to) {
                tracing::warn!("Failed to shift backup {} -> {}: {}", slot, slot + 1, e);
            }
        }

        let newest = self.backup_slot_path(0);
        if let Err(e) = fs::write(&newest, previous) {
            tracing::warn!("Failed to write backup slot 0: {}", e);
        }
    }

    /// Remove a temp file left behind by a crash mid-persist.
    pub fn cleanup_stale(&self) -> bool {
        let temp = self.temp_path();
        if !temp.exists() {
            return false;
        }
        match fs::remove_file(&temp) {
            Ok(()) => {
                tracing::info!("Removed stale snapshot temp file {:?}", temp);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to remove stale temp file {:?}: {}", temp, e);
                false
            }
        }
    }

    /// Syntax check, parse and shape-filter one snapshot file.
    pub fn read_snapshot(path: &Path) -> SnapshotRead {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SnapshotRead::Missing,
            Err(e) => return SnapshotRead::Malformed(e.to_string()),
        };

        if !is_well_formed_snapshot(&raw) {
            return SnapshotRead::Malformed("invalid JSON".to_string());
        }

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Array(values)) => {
                let (records, rejected) = filter_valid(values);
                SnapshotRead::Parsed { records, rejected }
            }
            Ok(_) => SnapshotRead::Malformed("expected a list of servers".to_string()),
            Err(e) => SnapshotRead::Malformed(e.to_string()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// fsync the directory so the rename itself survives power loss
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
