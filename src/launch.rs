// Launch configuration - turns a server record into the command that starts it

use crate::registry::ServerRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use sysinfo::System;

pub const MIN_RAM_MB: u32 = 512;

const DEFAULT_JARFILE: &str = "server.jar";
const STARTUP: &str = "-Xms128M -Xmx{{SERVER_MEMORY}}M -jar {{SERVER_JARFILE}} nogui";

/// Clamp a memory request into `[512, min(80% of total, total - 1024)]` MB.
///
/// On machines too small for that window the upper bound collapses to 512.
pub fn clamp_ram_mb(requested: u32, total_mb: u64) -> u32 {
    let eighty_percent = total_mb.saturating_mul(80) / 100;
    let headroom = total_mb.saturating_sub(1024);
    let upper = eighty_percent
        .min(headroom)
        .max(MIN_RAM_MB as u64)
        .min(u32::MAX as u64) as u32;
    requested.clamp(MIN_RAM_MB, upper)
}

/// Total physical memory of this machine in MB.
pub fn system_total_memory_mb() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory() / (1024 * 1024)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub ram_mb: u32,
}

impl LaunchPlan {
    pub fn for_record(record: &ServerRecord, total_mb: u64) -> Self {
        let ram_mb = clamp_ram_mb(record.ram_mb, total_mb);
        if ram_mb != record.ram_mb {
            tracing::info!(
                "Clamped memory for server {} from {} MB to {} MB",
                record.id,
                record.ram_mb,
                ram_mb
            );
        }

        let env = build_env_vars(record, ram_mb);

        // Split first so a substituted value always stays one argument
        let mut args: Vec<String> = STARTUP
            .split_whitespace()
            .map(|token| {
                env.iter().fold(token.to_string(), |arg, (key, value)| {
                    arg.replace(&format!("{{{{{}}}}}", key), value)
                })
            })
            .collect();
        if record.eula_accepted {
            args.insert(2, "-Dcom.mojang.eula.agree=true".to_string());
        }

        Self {
            program: record
                .java_path
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "java".to_string()),
            args,
            working_dir: record.server_path.clone(),
            env,
            ram_mb,
        }
    }
}

fn build_env_vars(record: &ServerRecord, ram_mb: u32) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("SERVER_MEMORY".to_string(), ram_mb.to_string());
    env.insert(
        "SERVER_JARFILE".to_string(),
        record
            .jar_file
            .clone()
            .unwrap_or_else(|| DEFAULT_JARFILE.to_string()),
    );
    env
}
