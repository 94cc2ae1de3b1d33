// Server registry - the owned, persisted index of managed server instances

use crate::config::RegistryConfig;
use crate::path_guard::{is_contained, normalize};
use crate::registry::error::RegistryError;
use crate::registry::record::ServerRecord;
use crate::registry::recovery::{scan_orphans, LoadReport, RecoveryChain};
use crate::registry::store::SnapshotStore;
use crate::registry::validator::is_valid_record;
use std::path::{Path, PathBuf};

/// Reclaims a server's directory after its record has been removed.
pub trait DirectoryReclaimer: Send + Sync {
    fn reclaim(&self, record: &ServerRecord) -> Result<(), RegistryError>;
}

/// Deletes the directory, but only when it lives under the servers root.
pub struct RemoveDirReclaimer {
    servers_dir: PathBuf,
}

impl RemoveDirReclaimer {
    pub fn new(servers_dir: impl Into<PathBuf>) -> Self {
        Self {
            servers_dir: servers_dir.into(),
        }
    }
}

impl DirectoryReclaimer for RemoveDirReclaimer {
    fn reclaim(&self, record: &ServerRecord) -> Result<(), RegistryError> {
        let dir = normalize(&record.server_path);
        if dir == normalize(&self.servers_dir) || !is_contained(&dir, &self.servers_dir) {
            return Err(RegistryError::AccessDenied(format!(
                "{} is not inside {}",
                dir.display(),
                self.servers_dir.display()
            )));
        }
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

pub struct ServerRegistry {
    config: RegistryConfig,
    store: SnapshotStore,
    records: Vec<ServerRecord>,
    last_load: LoadReport,
    reclaimer: Box<dyn DirectoryReclaimer>,
}

impl ServerRegistry {
    /// Prepare directories, drop crash leftovers and load the server list.
    pub fn open(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.ensure_dirs()?;
        let store = SnapshotStore::new(&config.data_dir, config.backup_slots);
        store.cleanup_stale();

        let (records, last_load) = RecoveryChain::standard(&config, &store).load();
        let reclaimer = Box::new(RemoveDirReclaimer::new(&config.servers_dir));

        tracing::info!("Server registry opened at {:?}", config.data_dir);
        Ok(Self {
            config,
            store,
            records,
            last_load,
            reclaimer,
        })
    }

    pub fn with_reclaimer(mut self, reclaimer: impl DirectoryReclaimer + 'static) -> Self {
        self.reclaimer = Box::new(reclaimer);
        self
    }

    pub fn close(self) {
        tracing::info!("Server registry closed ({} servers)", self.records.len());
    }

    /// Discard the resident list and run the recovery chain again.
    pub fn reload(&mut self) -> &LoadReport {
        let (records, report) = RecoveryChain::standard(&self.config, &self.store).load();
        self.records = records;
        self.last_load = report;
        &self.last_load
    }

    pub fn last_load(&self) -> &LoadReport {
        &self.last_load
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn list(&self) -> &[ServerRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&ServerRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn insert(&mut self, record: ServerRecord) -> Result<ServerRecord, RegistryError> {
        check_shape(&record)?;
        if self.get(&record.id).is_some() {
            return Err(RegistryError::Validation(format!(
                "a server with id {} already exists",
                record.id
            )));
        }
        self.check_path_free(&record.server_path, None)?;

        let mut next = self.records.clone();
        next.push(record.clone());
        self.commit(next)?;

        tracing::info!("Registered server {} ({})", record.id, record.name);
        Ok(record)
    }

    /// Apply `mutator` to a copy of the record and persist it.
    ///
    /// `id` and `createdAt` cannot change.
    pub fn update<F>(&mut self, id: &str, mutator: F) -> Result<ServerRecord, RegistryError>
    where
        F: FnOnce(&mut ServerRecord),
    {
        let index = self.index_of(id)?;
        let original = &self.records[index];
        let mut updated = original.clone();
        mutator(&mut updated);

        if updated.id != original.id {
            return Err(RegistryError::Validation("server id cannot be changed".to_string()));
        }
        if updated.created_at != original.created_at {
            return Err(RegistryError::Validation(
                "server creation time cannot be changed".to_string(),
            ));
        }
        check_shape(&updated)?;
        if normalize(&updated.server_path) != normalize(&original.server_path) {
            self.check_path_free(&updated.server_path, Some(id))?;
        }

        let mut next = self.records.clone();
        next[index] = updated.clone();
        self.commit(next)?;
        Ok(updated)
    }

    /// Remove the record and ask the reclaimer to delete its directory.
    pub fn remove(&mut self, id: &str) -> Result<ServerRecord, RegistryError> {
        let removed = self.remove_record(id)?;
        if let Err(e) = self.reclaimer.reclaim(&removed) {
            tracing::warn!(
                "Removed server {} but could not delete {:?}: {}",
                id,
                removed.server_path,
                e
            );
        }
        Ok(removed)
    }

    /// Remove the record but leave its directory on disk.
    pub fn detach(&mut self, id: &str) -> Result<ServerRecord, RegistryError> {
        self.remove_record(id)
    }

    /// Register instance directories that have no record yet.
    pub fn adopt_orphans(&mut self) -> Result<Vec<ServerRecord>, RegistryError> {
        let adopted: Vec<ServerRecord> = scan_orphans(&self.config, &self.records)
            .into_iter()
            .filter(|found| self.get(&found.id).is_none())
            .collect();
        if adopted.is_empty() {
            return Ok(adopted);
        }

        let mut next = self.records.clone();
        next.extend(adopted.iter().cloned());
        self.commit(next)?;

        tracing::info!("Adopted {} orphaned server(s)", adopted.len());
        Ok(adopted)
    }

    fn remove_record(&mut self, id: &str) -> Result<ServerRecord, RegistryError> {
        let index = self.index_of(id)?;
        let mut next = self.records.clone();
        let removed = next.remove(index);
        self.commit(next)?;

        tracing::info!("Removed server {} ({})", removed.id, removed.name);
        Ok(removed)
    }

    // The resident list only changes once the new one is on disk
    fn commit(&mut self, next: Vec<ServerRecord>) -> Result<(), RegistryError> {
        self.store.persist(&next)?;
        self.records = next;
        Ok(())
    }

    fn index_of(&self, id: &str) -> Result<usize, RegistryError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn check_path_free(&self, path: &Path, except_id: Option<&str>) -> Result<(), RegistryError> {
        if !path.is_absolute() {
            return Err(RegistryError::Validation(format!(
                "server path must be absolute: {}",
                path.display()
            )));
        }
        let wanted = normalize(path);
        let taken = self
            .records
            .iter()
            .filter(|r| Some(r.id.as_str()) != except_id)
            .any(|r| normalize(&r.server_path) == wanted);
        if taken {
            return Err(RegistryError::Validation(format!(
                "another server already uses {}",
                path.display()
            )));
        }
        Ok(())
    }
}

fn check_shape(record: &ServerRecord) -> Result<(), RegistryError> {
    let shadowed = record.shadowed_fields();
    if !shadowed.is_empty() {
        return Err(RegistryError::Validation(format!(
            "server {:?} carries extra settings named like its own fields: {}",
            record.id,
            shadowed.join(", ")
        )));
    }
    let value =
        serde_json::to_value(record).map_err(|e| RegistryError::Validation(e.to_string()))?;
    if !is_valid_record(&value) {
        return Err(RegistryError::Validation(format!(
            "server {:?} is missing a required field",
            record.id
        )));
    }
    Ok(())
}
