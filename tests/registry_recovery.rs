use serde_json::json;
use serverwave_registry::registry::{Framework, RecoverySource};
use serverwave_registry::{
    is_contained, RegistryConfig, RegistryError, ServerRecord, ServerRegistry, ServerStatus,
    SnapshotStore,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config(tmp: &TempDir) -> RegistryConfig {
    RegistryConfig::with_root(tmp.path())
}

fn store(tmp: &TempDir) -> SnapshotStore {
    let config = config(tmp);
    SnapshotStore::new(config.data_dir, config.backup_slots)
}

fn record(id: &str, dir: &Path) -> ServerRecord {
    let mut record = ServerRecord::new(id, Framework::new("Paper"), "1.20.4", dir);
    record.id = id.to_string();
    record
}

fn ids(registry: &ServerRegistry) -> Vec<String> {
    registry.list().iter().map(|r| r.id.clone()).collect()
}

#[test]
fn persisted_list_round_trips_in_order() {
    let tmp = TempDir::new().unwrap();
    let mut registry = ServerRegistry::open(config(&tmp)).unwrap();
    let servers = config(&tmp).servers_dir;

    let mut expected = Vec::new();
    for id in ["zeta", "alpha", "mid"] {
        let mut rec = record(id, &servers.join(id));
        rec.eula_accepted = true;
        rec.extra.insert("tunnelRegion".into(), json!("eu"));
        expected.push(registry.insert(rec).unwrap());
    }
    registry.close();

    let reopened = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(reopened.list(), expected.as_slice());
    assert_eq!(reopened.last_load().source, RecoverySource::Primary);
}

#[test]
fn crash_before_swap_keeps_previous_list() {
    let tmp = TempDir::new().unwrap();
    let servers = config(&tmp).servers_dir;
    let mut registry = ServerRegistry::open(config(&tmp)).unwrap();
    registry.insert(record("before", &servers.join("before"))).unwrap();
    registry.close();

    // simulate a process killed after writing the temp file but before rename
    let store = store(&tmp);
    fs::write(store.temp_path(), br#"[{"id": "after", "name": "after", "fram"#).unwrap();

    let reopened = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(ids(&reopened), vec!["before"]);
    assert!(!store.temp_path().exists());
}

#[test]
fn malformed_entry_is_dropped_and_counted() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    fs::create_dir_all(store.dir()).unwrap();
    let snapshot = json!([
        {
            "id": "good",
            "name": "Good",
            "framework": "Fabric",
            "version": "1.21",
            "serverPath": tmp.path().join("servers/good")
        },
        {
            "id": "bad",
            "name": "Bad",
            "framework": "Fabric",
            "version": "1.21"
        }
    ]);
    fs::write(store.primary_path(), serde_json::to_vec(&snapshot).unwrap()).unwrap();

    let registry = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(ids(&registry), vec!["good"]);
    assert_eq!(registry.last_load().rejected, 1);
    assert_eq!(registry.last_load().source, RecoverySource::Primary);
}

#[test]
fn status_is_offline_after_restart() {
    let tmp = TempDir::new().unwrap();
    let servers = config(&tmp).servers_dir;
    let mut registry = ServerRegistry::open(config(&tmp)).unwrap();
    registry.insert(record("running", &servers.join("running"))).unwrap();
    registry
        .update("running", |r| r.status = ServerStatus::Online)
        .unwrap();
    registry.close();

    let reopened = ServerRegistry::open(config(&tmp)).unwrap();
    let server = reopened.get("running").unwrap();
    assert_eq!(server.status, ServerStatus::Offline);
}

#[test]
fn rotation_is_bounded_and_slot_zero_is_previous_state() {
    let tmp = TempDir::new().unwrap();
    let servers = config(&tmp).servers_dir;
    let mut registry = ServerRegistry::open(config(&tmp)).unwrap();
    let store = store(&tmp);

    // open() already wrote the empty list, so every insert rotates
    let mut inserted = Vec::new();
    for n in 0..8 {
        let id = format!("s{}", n);
        registry.insert(record(&id, &servers.join(&id))).unwrap();
        inserted.push(id);
    }

    for slot in 0..store.backup_slots() {
        assert!(store.backup_slot_path(slot).exists(), "slot {}", slot);
    }
    assert!(!store.backup_slot_path(store.backup_slots()).exists());

    let slot0: Vec<serde_json::Value> =
        serde_json::from_slice(&fs::read(store.backup_slot_path(0)).unwrap()).unwrap();
    let slot0_ids: Vec<&str> = slot0.iter().map(|v| v["id"].as_str().unwrap()).collect();
    assert_eq!(slot0_ids, &inserted[..7]);
    assert_eq!(
        fs::read(store.backup_slot_path(0)).unwrap(),
        fs::read(store.legacy_backup_path()).unwrap()
    );
}

#[test]
fn corrupt_primary_falls_back_to_backup_slot_two() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    fs::create_dir_all(store.dir()).unwrap();
    let servers = config(&tmp).servers_dir;

    fs::write(store.primary_path(), b"[{\"id\": \"torn").unwrap();
    fs::write(store.backup_slot_path(0), b"garbage").unwrap();
    let slot2 = vec![record("kept", &servers.join("kept"))];
    fs::write(store.backup_slot_path(2), serde_json::to_vec(&slot2).unwrap()).unwrap();
    let legacy = vec![record("older", &servers.join("older"))];
    fs::write(store.legacy_backup_path(), serde_json::to_vec(&legacy).unwrap()).unwrap();

    let registry = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(ids(&registry), vec!["kept"]);
    assert_eq!(registry.last_load().source, RecoverySource::NumberedBackup(2));
}

#[test]
fn legacy_backup_is_used_when_numbered_slots_are_empty() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    fs::create_dir_all(store.dir()).unwrap();
    let servers = config(&tmp).servers_dir;

    let legacy = vec![record("legacy", &servers.join("legacy"))];
    fs::write(store.legacy_backup_path(), serde_json::to_vec(&legacy).unwrap()).unwrap();

    let registry = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(ids(&registry), vec!["legacy"]);
    assert_eq!(registry.last_load().source, RecoverySource::LegacyBackup);
}

#[test]
fn orphan_directory_is_recovered_once() {
    let tmp = TempDir::new().unwrap();
    let servers = config(&tmp).servers_dir;
    let orphan = servers.join("forgotten");
    fs::create_dir_all(&orphan).unwrap();
    fs::write(orphan.join("paper-1.20.4.jar"), b"PK\x03\x04").unwrap();

    let first = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(first.last_load().source, RecoverySource::OrphanScan);
    assert_eq!(first.list().len(), 1);
    let recovered = first.list()[0].clone();
    assert!(recovered.framework.is_unknown());
    assert_eq!(recovered.status, ServerStatus::Offline);
    assert_eq!(recovered.server_path, orphan);
    first.close();

    let second = ServerRegistry::open(config(&tmp)).unwrap();
    assert_eq!(second.last_load().source, RecoverySource::Primary);
    assert_eq!(second.list(), &[recovered]);
}

#[test]
fn total_loss_yields_empty_registry() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    fs::create_dir_all(store.dir()).unwrap();
    fs::write(store.primary_path(), b"\x00\x01\x02").unwrap();
    fs::write(store.legacy_backup_path(), b"[]").unwrap();

    let registry = ServerRegistry::open(config(&tmp)).unwrap();
    assert!(registry.list().is_empty());
    assert_eq!(registry.last_load().source, RecoverySource::Empty);
    assert_eq!(fs::read(store.primary_path()).unwrap(), b"[]");
}

#[cfg(unix)]
#[test]
fn path_containment_examples() {
    assert!(!is_contained("/data/servers/abc/../../etc/passwd", "/data/servers/abc"));
    assert!(is_contained("/data/servers/abc/world/level.dat", "/data/servers/abc"));
    assert!(is_contained("/data/servers/abc", "/data/servers/abc"));
}

#[test]
fn duplicate_server_path_is_rejected_regardless_of_id() {
    let tmp = TempDir::new().unwrap();
    let servers = config(&tmp).servers_dir;
    let mut registry = ServerRegistry::open(config(&tmp)).unwrap();
    registry.insert(record("first", &servers.join("shared"))).unwrap();

    let err = registry
        .insert(record("second", &servers.join("shared")))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(ids(&registry), vec!["first"]);
}
