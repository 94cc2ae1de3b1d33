// Server commands - the async surface the UI and process manager call into

use crate::config::RegistryConfig;
use crate::launch::{system_total_memory_mb, LaunchPlan};
use crate::registry::{
    BackupConfig, Framework, LoadReport, RegistryError, ServerRecord, ServerRegistry,
    ServerStatus, TunnelConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle; the mutex serializes every registry operation.
#[derive(Clone)]
pub struct RegistryState {
    pub registry: Arc<Mutex<ServerRegistry>>,
}

impl RegistryState {
    pub fn new(registry: ServerRegistry) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn open(config: RegistryConfig) -> Result<Self, RegistryError> {
        Ok(Self::new(ServerRegistry::open(config)?))
    }

    /// Directory of a server, for path-guarded file operations.
    pub async fn server_path(&self, server_id: &str) -> Result<PathBuf, RegistryError> {
        let registry = self.registry.lock().await;
        registry
            .get(server_id)
            .map(|s| s.server_path.clone())
            .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerRequest {
    pub name: String,
    pub framework: Framework,
    pub version: String,
    pub server_path: PathBuf,
    pub ram_mb: Option<u32>,
    pub jar_file: Option<String>,
    #[serde(default)]
    pub eula_accepted: bool,
}

/// Partial settings update; `None` leaves a field untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettingsUpdate {
    pub name: Option<String>,
    pub version: Option<String>,
    pub ram_mb: Option<u32>,
    pub eula_accepted: Option<bool>,
    pub jar_file: Option<String>,
    pub java_path: Option<String>,
    pub backup_config: Option<BackupConfig>,
    pub tunnel: Option<TunnelConfig>,
    pub analytics_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteServerResponse {
    pub server: ServerRecord,
    pub data_deleted: bool,
}

pub async fn list_servers(state: &RegistryState) -> Vec<ServerRecord> {
    let registry = state.registry.lock().await;
    registry.list().to_vec()
}

pub async fn get_server(state: &RegistryState, server_id: &str) -> Result<ServerRecord, RegistryError> {
    let registry = state.registry.lock().await;
    registry
        .get(server_id)
        .cloned()
        .ok_or_else(|| RegistryError::NotFound(server_id.to_string()))
}

/// Register a freshly provisioned server. Its directory must already exist.
pub async fn register_server(
    state: &RegistryState,
    request: RegisterServerRequest,
) -> Result<ServerRecord, RegistryError> {
    tracing::info!("Registering server: {:?}", request.name);

    if !request.server_path.is_dir() {
        return Err(RegistryError::Validation(format!(
            "server directory does not exist: {}",
            request.server_path.display()
        )));
    }

    let mut record = ServerRecord::new(
        &request.name,
        request.framework,
        &request.version,
        request.server_path,
    );
    if let Some(ram_mb) = request.ram_mb {
        record.ram_mb = ram_mb;
    }
    record.jar_file = request.jar_file;
    record.eula_accepted = request.eula_accepted;

    let mut registry = state.registry.lock().await;
    registry.insert(record)
}

pub async fn update_server_settings(
    state: &RegistryState,
    server_id: &str,
    settings: ServerSettingsUpdate,
) -> Result<ServerRecord, RegistryError> {
    let mut registry = state.registry.lock().await;
    registry.update(server_id, move |server| {
        if let Some(name) = settings.name {
            server.name = name;
        }
        if let Some(version) = settings.version {
            server.version = version;
        }
        if let Some(ram_mb) = settings.ram_mb {
            server.ram_mb = ram_mb;
        }
        if let Some(eula) = settings.eula_accepted {
            server.eula_accepted = eula;
        }
        if let Some(jar_file) = settings.jar_file {
            server.jar_file = Some(jar_file).filter(|j| !j.is_empty());
        }
        if let Some(java_path) = settings.java_path {
            server.java_path = Some(java_path).filter(|j| !j.is_empty());
        }
        if settings.backup_config.is_some() {
            server.backup_config = settings.backup_config;
        }
        if settings.tunnel.is_some() {
            server.tunnel = settings.tunnel;
        }
        if settings.analytics_enabled.is_some() {
            server.analytics_enabled = settings.analytics_enabled;
        }
    })
}

/// Called by the process manager on process lifecycle events.
pub async fn set_server_status(
    state: &RegistryState,
    server_id: &str,
    status: ServerStatus,
    players: Option<String>,
) -> Result<ServerRecord, RegistryError> {
    tracing::debug!("Server {} is now {:?}", server_id, status);
    let mut registry = state.registry.lock().await;
    registry.update(server_id, |server| {
        server.status = status;
        if let Some(players) = players {
            server.players = players;
        }
    })
}

pub async fn delete_server(
    state: &RegistryState,
    server_id: &str,
    delete_data: Option<bool>,
) -> Result<DeleteServerResponse, RegistryError> {
    tracing::info!("Deleting server: {}", server_id);

    let mut registry = state.registry.lock().await;
    let data_deleted = delete_data.unwrap_or(true);
    let server = if data_deleted {
        registry.remove(server_id)?
    } else {
        registry.detach(server_id)?
    };

    Ok(DeleteServerResponse {
        data_deleted: data_deleted && !server.server_path.exists(),
        server,
    })
}

pub async fn adopt_orphaned_servers(state: &RegistryState) -> Result<Vec<ServerRecord>, RegistryError> {
    let mut registry = state.registry.lock().await;
    registry.adopt_orphans()
}

pub async fn reload_servers(state: &RegistryState) -> LoadReport {
    let mut registry = state.registry.lock().await;
    registry.reload().clone()
}

/// Export a server definition as JSON
pub async fn export_server(state: &RegistryState, server_id: &str) -> Result<String, RegistryError> {
    let server = get_server(state, server_id).await?;
    serde_json::to_string_pretty(&server).map_err(|e| RegistryError::Validation(e.to_string()))
}

/// Import a server definition after its directory has been materialized.
pub async fn import_server(state: &RegistryState, json: &str) -> Result<ServerRecord, RegistryError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| RegistryError::Validation(format!("Invalid JSON: {}", e)))?;
    if !crate::registry::validator::is_valid_record(&value) {
        return Err(RegistryError::Validation(
            "server definition is missing a required field".to_string(),
        ));
    }
    let mut server: ServerRecord =
        serde_json::from_value(value).map_err(|e| RegistryError::Validation(e.to_string()))?;

    if !server.server_path.is_dir() {
        return Err(RegistryError::Validation(format!(
            "server directory does not exist: {}",
            server.server_path.display()
        )));
    }
    server.status = ServerStatus::Offline;

    let mut registry = state.registry.lock().await;
    registry.insert(server)
}

pub async fn get_launch_plan(state: &RegistryState, server_id: &str) -> Result<LaunchPlan, RegistryError> {
    let server = get_server(state, server_id).await?;
    Ok(LaunchPlan::for_record(&server, system_total_memory_mb()))
}

pub async fn get_server_disk_usage(state: &RegistryState, server_id: &str) -> Result<u64, RegistryError> {
    let path = state.server_path(server_id).await?;

    if !path.exists() {
        return Ok(0);
    }

    Ok(calculate_dir_size(&path).unwrap_or(0))
}

fn calculate_dir_size(path: &Path) -> Result<u64, std::io::Error> {
    let mut total = 0;

    if path.is_file() {
        return Ok(std::fs::metadata(path)?.len());
    }

    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        if path.is_file() {
            total += std::fs::metadata(&path)?.len();
        } else if path.is_dir() {
            total += calculate_dir_size(&path).unwrap_or(0);
        }
    }

    Ok(total)
}
