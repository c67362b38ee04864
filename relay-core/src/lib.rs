//! Connection and tunnel subsystem for a decentralized overlay relay
//! client: parallel relay session bring-up, validation, primary election,
//! and the byte-level bidirectional tunnel carrying application traffic.

pub mod address;
pub mod config;
pub mod connector;
pub mod crypto;
pub mod data_pool;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod rpc;
pub mod session;
pub mod store;
pub mod tunnel;
pub mod watcher;

pub use address::Address;
pub use config::{Config, LogMode};
pub use connector::{connect, ConnectResult};
pub use data_pool::DataPool;
pub use error::{Error, Result};
pub use lifecycle::{BuildInfo, Lifecycle};
pub use pool::SessionPool;
pub use rpc::{Account, JsonLineRpc, RelayRpc, ValidationOutcome};
pub use session::{RelaySession, SessionState};
pub use store::Store;
pub use tunnel::Tunnel;
pub use watcher::watch_account;
