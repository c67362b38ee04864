//! File/env-layered configuration for the `relayctl` binary, translated
//! into `relay_core::Config` once resolved. Layering: struct defaults →
//! TOML file → environment variables, with `RELAY_` as the prefix and
//! `__` as the nesting separator (e.g. `RELAY_REMOTE_RPC_ADDRS`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use relay_core::{Address, Config, LogMode};

fn default_retry_times() -> u32 {
    3
}

fn default_keepalive_count() -> u32 {
    4
}

fn default_remote_rpc_addrs() -> Vec<String> {
    vec![
        "asia.testnet.example.io:41046".into(),
        "europe.testnet.example.io:41046".into(),
        "usa.testnet.example.io:41046".into(),
    ]
}

/// On-disk/env shape. `fleet_addr`/`registry_addr` are plain hex strings
/// here (figment's `Env`/`Toml` providers work on serde-representable
/// types); they're parsed into `Address` when building `relay_core::Config`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub retry_times: u32,
    pub enable_keepalive: bool,
    pub keepalive_count: u32,
    pub remote_rpc_addrs: Vec<String>,
    pub fleet_addr: Option<String>,
    pub registry_addr: Option<String>,
    pub enable_edge_e2e: bool,
    pub enable_metrics: bool,
    pub debug: bool,
    pub log_to_file: bool,
    pub log_file_path: Option<String>,
    pub log_date_time: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            retry_times: default_retry_times(),
            enable_keepalive: cfg!(not(target_os = "windows")),
            keepalive_count: default_keepalive_count(),
            remote_rpc_addrs: default_remote_rpc_addrs(),
            fleet_addr: None,
            registry_addr: None,
            enable_edge_e2e: false,
            enable_metrics: false,
            debug: false,
            log_to_file: false,
            log_file_path: None,
            log_date_time: false,
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("relayctl")
        .join("client.db")
}

/// Layer defaults → `<data_dir>/config.toml` → `RELAY_*` env vars.
pub fn load(data_dir: &Path) -> figment::Figment {
    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("RELAY_").split("__"))
}

/// Resolve a layered `FileConfig` into the `relay_core::Config` the core
/// subsystem consumes, substituting `Address::NULL` for any address
/// string that fails to parse so `Config::resolved_fleet_addr`/
/// `resolved_registry_addr` fall back to the well-known defaults.
pub fn resolve(figment: &figment::Figment, db_path: PathBuf) -> anyhow::Result<Config> {
    let file: FileConfig = figment.extract()?;

    let fleet_addr = file.fleet_addr.as_deref().and_then(|s| Address::from_hex(s).ok());
    let registry_addr = file
        .registry_addr
        .as_deref()
        .and_then(|s| Address::from_hex(s).ok());

    Ok(Config {
        db_path,
        retry_times: file.retry_times,
        enable_keepalive: file.enable_keepalive,
        keepalive_count: file.keepalive_count,
        remote_rpc_addrs: file.remote_rpc_addrs,
        fleet_addr,
        registry_addr,
        client_addr: Address::NULL,
        enable_edge_e2e: file.enable_edge_e2e,
        enable_metrics: file.enable_metrics,
        debug: file.debug,
        log_mode: if file.log_to_file {
            LogMode::File
        } else {
            LogMode::Console
        },
        log_file_path: file.log_file_path.map(PathBuf::from),
        log_date_time: file.log_date_time,
    })
}
