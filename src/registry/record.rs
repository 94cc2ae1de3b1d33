// Server record - one managed server instance as stored in the registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_PLAYERS: &str = "0/20";

/// Server software family ("Paper", "Purpur", "Vanilla", "Fabric", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct Framework(pub String);

impl Framework {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Framework {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Offline,
    Online,
}

// Older files carry transient states ("starting", "Stopping", ...); anything
// that is not online reads as offline instead of rejecting the record.
fn lenient_status<'de, D>(deserializer: D) -> Result<ServerStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value.as_str() {
        Some(status) if status.eq_ignore_ascii_case("online") => ServerStatus::Online,
        _ => ServerStatus::Offline,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_backup_interval")]
    pub interval_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<DateTime<Utc>>,
}

fn default_backup_interval() -> u32 {
    24
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    pub version: String,
    #[serde(rename = "ramMB", default = "default_ram_mb")]
    pub ram_mb: u32,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ServerStatus,
    #[serde(default = "default_players")]
    pub players: String,
    pub server_path: PathBuf,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub eula_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_config: Option<BackupConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_enabled: Option<bool>,
    /// Feature settings this build does not model, kept verbatim across saves.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire names of the fields `ServerRecord` models itself.
pub const MODELED_FIELDS: &[&str] = &[
    "id",
    "name",
    "framework",
    "version",
    "ramMB",
    "status",
    "players",
    "serverPath",
    "createdAt",
    "eulaAccepted",
    "jarFile",
    "javaPath",
    "backupConfig",
    "tunnel",
    "analyticsEnabled",
];

pub fn default_ram_mb() -> u32 {
    2048
}

fn default_players() -> String {
    DEFAULT_PLAYERS.to_string()
}

/// Short identifier used for new servers.
pub fn new_server_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

impl ServerRecord {
    pub fn new(
        name: &str,
        framework: Framework,
        version: &str,
        server_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: new_server_id(),
            name: name.to_string(),
            framework,
            version: version.to_string(),
            ram_mb: default_ram_mb(),
            status: ServerStatus::Offline,
            players: default_players(),
            server_path: server_path.into(),
            created_at: Utc::now(),
            eula_accepted: false,
            jar_file: None,
            java_path: None,
            backup_config: None,
            tunnel: None,
            analytics_enabled: None,
            extra: Map::new(),
        }
    }

    /// Minimal record for an instance directory found on disk with no entry.
    pub fn orphan(dir: &Path, jar_file: Option<String>, ram_mb: u32) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Recovered server".to_string());

        let mut record = Self::new(&name, Framework::unknown(), Framework::UNKNOWN, dir);
        record.ram_mb = ram_mb;
        record.jar_file = jar_file;
        record
    }

    /// Keys in `extra` that would collide with a modeled field once saved.
    pub fn shadowed_fields(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|key| MODELED_FIELDS.contains(key))
            .collect()
    }

    pub fn is_online(&self) -> bool {
        self.status == ServerStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_record_with_defaults() {
        let value = json!({
            "id": "a1b2c3d4",
            "name": "Survival",
            "framework": "Paper",
            "version": "1.20.4",
            "serverPath": "/srv/mc/survival"
        });
        let record: ServerRecord = serde_json::from_value(value).unwrap();

        assert_eq!(record.ram_mb, 2048);
        assert_eq!(record.status, ServerStatus::Offline);
        assert_eq!(record.players, "0/20");
        assert!(!record.eula_accepted);
        assert!(record.extra.is_empty());
    }

    #[test]
    fn transient_status_reads_as_offline() {
        let value = json!({
            "id": "a1b2c3d4",
            "name": "Survival",
            "framework": "Paper",
            "version": "1.20.4",
            "status": "Starting",
            "serverPath": "/srv/mc/survival"
        });
        let record: ServerRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.status, ServerStatus::Offline);
    }

    #[test]
    fn keeps_unknown_fields_across_round_trip() {
        let value = json!({
            "id": "a1b2c3d4",
            "name": "Survival",
            "framework": "Fabric",
            "version": "1.21",
            "ramMB": 4096,
            "status": "Online",
            "serverPath": "/srv/mc/survival",
            "discordWebhook": { "url": "https://example.invalid/hook" }
        });
        let record: ServerRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.status, ServerStatus::Online);
        assert!(record.extra.contains_key("discordWebhook"));

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["ramMB"], 4096);
        assert_eq!(encoded["discordWebhook"]["url"], "https://example.invalid/hook");
    }

    #[test]
    fn orphan_record_is_unknown_and_offline() {
        let record = ServerRecord::orphan(Path::new("/srv/mc/lobby"), Some("paper.jar".into()), 1024);
        assert_eq!(record.name, "lobby");
        assert!(record.framework.is_unknown());
        assert_eq!(record.version, "Unknown");
        assert_eq!(record.status, ServerStatus::Offline);
        assert_eq!(record.ram_mb, 1024);
        assert_eq!(record.id.len(), 8);
    }

    #[test]
    fn decoded_extra_never_shadows_modeled_fields() {
        let value = json!({
            "id": "a1b2c3d4",
            "name": "Survival",
            "framework": "Paper",
            "version": "1.20.4",
            "ramMB": 1024,
            "serverPath": "/srv/mc/survival",
            "motd": "hello"
        });
        let record: ServerRecord = serde_json::from_value(value).unwrap();
        assert!(record.shadowed_fields().is_empty());

        let mut record = record;
        record.extra.insert("serverPath".into(), json!("/srv/mc/other"));
        assert_eq!(record.shadowed_fields(), vec!["serverPath"]);
    }
}
