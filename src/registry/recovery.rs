// Recovery chain - rebuilds the server list when the primary file is unusable
//
// Strategies run in order: primary file, numbered backups (newest first),
// legacy backup, orphan directory scan, and finally an empty list. The first
// one that yields something wins.

use crate::config::RegistryConfig;
use crate::path_guard::normalize;
use crate::registry::record::{ServerRecord, ServerStatus};
use crate::registry::store::{SnapshotRead, SnapshotStore};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoverySource {
    Primary,
    NumberedBackup(usize),
    LegacyBackup,
    OrphanScan,
    Empty,
}

/// Result of one successful strategy.
#[derive(Debug)]
pub struct Recovered {
    pub records: Vec<ServerRecord>,
    pub rejected: usize,
    pub source: RecoverySource,
    /// Write the result back so the next cold start takes the primary path.
    pub persist: bool,
}

pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_load(&self) -> Option<Recovered>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub source: RecoverySource,
    pub loaded: usize,
    pub rejected: usize,
}

/// Reads the primary snapshot. Any parseable list counts, even an empty one.
pub struct PrimaryStrategy {
    path: PathBuf,
}

impl PrimaryStrategy {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RecoveryStrategy for PrimaryStrategy {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn try_load(&self) -> Option<Recovered> {
        match SnapshotStore::read_snapshot(&self.path) {
            SnapshotRead::Parsed { records, rejected } => Some(Recovered {
                records,
                rejected,
                source: RecoverySource::Primary,
                persist: false,
            }),
            SnapshotRead::Missing => {
                tracing::info!("No server list at {:?}", self.path);
                None
            }
            SnapshotRead::Malformed(reason) => {
                tracing::warn!("Server list {:?} is unreadable: {}", self.path, reason);
                None
            }
        }
    }
}

/// Reads one backup file; only a backup with at least one valid record counts.
pub struct BackupStrategy {
    path: PathBuf,
    source: RecoverySource,
}

impl BackupStrategy {
    pub fn numbered(store: &SnapshotStore, slot: usize) -> Self {
        Self {
            path: store.backup_slot_path(slot),
            source: RecoverySource::NumberedBackup(slot),
        }
    }

    pub fn legacy(store: &SnapshotStore) -> Self {
        Self {
            path: store.legacy_backup_path(),
            source: RecoverySource::LegacyBackup,
        }
    }
}

impl RecoveryStrategy for BackupStrategy {
    fn name(&self) -> &'static str {
        match self.source {
            RecoverySource::LegacyBackup => "legacy backup",
            _ => "numbered backup",
        }
    }

    fn try_load(&self) -> Option<Recovered> {
        match SnapshotStore::read_snapshot(&self.path) {
            SnapshotRead::Parsed { records, rejected } if !records.is_empty() => Some(Recovered {
                records,
                rejected,
                source: self.source,
                persist: false,
            }),
            SnapshotRead::Parsed { .. } => {
                tracing::debug!("Backup {:?} holds no valid servers", self.path);
                None
            }
            SnapshotRead::Missing => None,
            SnapshotRead::Malformed(reason) => {
                tracing::debug!("Backup {:?} is unreadable: {}", self.path, reason);
                None
            }
        }
    }
}

/// Rebuilds records from instance directories that contain a launch artifact.
///
/// This only runs once every snapshot has failed, so there is no known set to
/// match against and every directory gets a synthesized record. Matching
/// directories to existing records happens in `ServerRegistry::adopt_orphans`.
pub struct OrphanScanStrategy {
    config: RegistryConfig,
}

impl OrphanScanStrategy {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl RecoveryStrategy for OrphanScanStrategy {
    fn name(&self) -> &'static str {
        "orphan scan"
    }

    fn try_load(&self) -> Option<Recovered> {
        let records = scan_orphans(&self.config, &[]);
        if records.is_empty() {
            return None;
        }
        Some(Recovered {
            records,
            rejected: 0,
            source: RecoverySource::OrphanScan,
            persist: true,
        })
    }
}

/// Terminal fallback: accept the loss and start from an empty list.
pub struct EmptyStrategy;

impl RecoveryStrategy for EmptyStrategy {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn try_load(&self) -> Option<Recovered> {
        Some(Recovered {
            records: Vec::new(),
            rejected: 0,
            source: RecoverySource::Empty,
            persist: true,
        })
    }
}

/// One record per instance directory under `servers_dir` holding a launch artifact.
///
/// Directories already referenced by `known` reuse that record; others get a
/// freshly synthesized one. Output is sorted by directory name.
pub fn scan_orphans(config: &RegistryConfig, known: &[ServerRecord]) -> Vec<ServerRecord> {
    let entries = match fs::read_dir(&config.servers_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot scan {:?}: {}", config.servers_dir, e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut found = Vec::new();
    for dir in dirs {
        let Some(artifact) = first_launch_artifact(config, &dir) else {
            continue;
        };

        let normalized = normalize(&dir);
        match known
            .iter()
            .find(|record| normalize(&record.server_path) == normalized)
        {
            Some(record) => found.push(record.clone()),
            None => {
                tracing::info!("Recovered orphaned server directory {:?}", dir);
                found.push(ServerRecord::orphan(&dir, Some(artifact), config.default_ram_mb));
            }
        }
    }
    found
}

fn first_launch_artifact(config: &RegistryConfig, dir: &Path) -> Option<String> {
    let mut artifacts: Vec<String> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| config.is_launch_artifact(Path::new(name)))
        .collect();
    artifacts.sort();
    artifacts.into_iter().next()
}

pub struct RecoveryChain {
    store: SnapshotStore,
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl RecoveryChain {
    /// Primary, numbered backups, legacy backup, orphan scan, empty.
    pub fn standard(config: &RegistryConfig, store: &SnapshotStore) -> Self {
        let mut strategies: Vec<Box<dyn RecoveryStrategy>> =
            vec![Box::new(PrimaryStrategy::new(store.primary_path()))];
        for slot in 0..store.backup_slots() {
            strategies.push(Box::new(BackupStrategy::numbered(store, slot)));
        }
        strategies.push(Box::new(BackupStrategy::legacy(store)));
        strategies.push(Box::new(OrphanScanStrategy::new(config.clone())));
        strategies.push(Box::new(EmptyStrategy));

        Self::with_strategies(store.clone(), strategies)
    }

    pub fn with_strategies(store: SnapshotStore, strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self { store, strategies }
    }

    /// Always returns a usable list, possibly empty.
    pub fn load(&self) -> (Vec<ServerRecord>, LoadReport) {
        for strategy in &self.strategies {
            let Some(recovered) = strategy.try_load() else {
                continue;
            };

            let (records, duplicates) = settle(recovered.records);
            let rejected = recovered.rejected + duplicates;
            tracing::info!(
                "Loaded {} server(s) via {} ({} rejected)",
                records.len(),
                strategy.name(),
                rejected
            );

            if recovered.persist {
                if let Err(e) = self.store.persist(&records) {
                    tracing::error!("Failed to save recovered server list: {}", e);
                }
            }

            let report = LoadReport {
                source: recovered.source,
                loaded: records.len(),
                rejected,
            };
            return (records, report);
        }

        tracing::warn!("No recovery strategy produced a server list");
        (
            Vec::new(),
            LoadReport {
                source: RecoverySource::Empty,
                loaded: 0,
                rejected: 0,
            },
        )
    }
}

// Drops duplicate ids / directories (first wins) and resets every status to
// offline: no server process survives a restart of the manager.
fn settle(records: Vec<ServerRecord>) -> (Vec<ServerRecord>, usize) {
    let mut ids = HashSet::new();
    let mut paths = HashSet::new();
    let mut duplicates = 0;
    let mut settled = Vec::with_capacity(records.len());

    for mut record in records {
        if !ids.insert(record.id.clone()) || !paths.insert(normalize(&record.server_path)) {
            tracing::warn!("Dropping duplicate server entry {}", record.id);
            duplicates += 1;
            continue;
        }
        if !record.server_path.is_dir() {
            tracing::warn!(
                "Directory for server {} is missing: {:?}",
                record.id,
                record.server_path
            );
        }
        record.status = ServerStatus::Offline;
        settled.push(record);
    }

    (settled, duplicates)
}
