//! Configuration consumed by `relay-core`. Parsing/layering (figment,
//! CLI flags, env vars) lives in the `relayctl` binary crate; this module
//! only defines the shape the core components read from.

use std::path::PathBuf;

use crate::address::Address;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LogMode {
    Console,
    File,
}

impl Default for LogMode {
    fn default() -> Self {
        LogMode::Console
    }
}

/// Options consumed by the connection/tunnel subsystem.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub retry_times: u32,
    pub enable_keepalive: bool,
    pub keepalive_count: u32,
    pub remote_rpc_addrs: Vec<String>,
    pub fleet_addr: Option<Address>,
    pub registry_addr: Option<Address>,
    pub client_addr: Address,
    pub enable_edge_e2e: bool,
    pub enable_metrics: bool,
    pub debug: bool,
    pub log_mode: LogMode,
    pub log_file_path: Option<PathBuf>,
    pub log_date_time: bool,
}

impl Config {
    /// Resolve `fleet_addr`, substituting the well-known default when unset
    /// or null.
    pub fn resolved_fleet_addr(&self) -> Address {
        match self.fleet_addr {
            Some(addr) if addr != Address::NULL => addr,
            _ => Address::FLEET_DEFAULT,
        }
    }

    /// Resolve `registry_addr`, substituting the well-known default when
    /// unset or null.
    pub fn resolved_registry_addr(&self) -> Address {
        match self.registry_addr {
            Some(addr) if addr != Address::NULL => addr,
            _ => Address::REGISTRY_DEFAULT,
        }
    }
}
