// Registry configuration - where snapshots and server directories live

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_SLOTS: usize = 5;

const HOME_ENV: &str = "SERVERWAVE_HOME";
const BACKUP_SLOTS_ENV: &str = "SERVERWAVE_BACKUP_SLOTS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Holds the primary snapshot and every backup.
    pub data_dir: PathBuf,
    /// Root of the per-server instance directories.
    pub servers_dir: PathBuf,
    #[serde(default = "default_backup_slots")]
    pub backup_slots: usize,
    #[serde(default = "default_artifact_extensions")]
    pub artifact_extensions: Vec<String>,
    #[serde(default = "crate::registry::record::default_ram_mb")]
    pub default_ram_mb: u32,
}

fn default_backup_slots() -> usize {
    DEFAULT_BACKUP_SLOTS
}

fn default_artifact_extensions() -> Vec<String> {
    vec!["jar".to_string()]
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::with_root(app_root())
    }
}

impl RegistryConfig {
    /// Config with `config/` and `servers/` under a single root directory.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("config"),
            servers_dir: root.join("servers"),
            backup_slots: DEFAULT_BACKUP_SLOTS,
            artifact_extensions: default_artifact_extensions(),
            default_ram_mb: crate::registry::record::default_ram_mb(),
        }
    }

    /// Default config with `SERVERWAVE_HOME` / `SERVERWAVE_BACKUP_SLOTS` applied.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os(HOME_ENV) {
            Some(home) if !home.is_empty() => Self::with_root(PathBuf::from(home)),
            _ => Self::default(),
        };

        if let Ok(raw) = std::env::var(BACKUP_SLOTS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(slots) => config.backup_slots = slots,
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", BACKUP_SLOTS_ENV, raw),
            }
        }

        config
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.servers_dir)
    }

    /// True if `file_name` looks like a server launch artifact.
    pub fn is_launch_artifact(&self, file_name: &Path) -> bool {
        file_name
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                self.artifact_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

fn app_root() -> PathBuf {
    directories::UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ServerWaveAnywhere")
}
