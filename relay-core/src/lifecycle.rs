//! Owns the client's overall init/start/close sequence as an owned
//! value rather than global state, so more than one instance can exist
//! in a process (tests included) without sharing mutable statics.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::address::Address;
use crate::config::Config;
use crate::connector::{self, ConnectResult};
use crate::data_pool::DataPool;
use crate::error::{Error, Result};
use crate::pool::SessionPool;
use crate::session::RelaySession;
use crate::store::Store;

/// Build metadata logged once at init.
#[derive(Clone, Debug, Default)]
pub struct BuildInfo {
    pub version: String,
    pub build_time: String,
}

/// The connection/tunnel subsystem's top-level lifecycle: opens storage,
/// resolves identity, brings up the session pool, and tears everything
/// down in a fixed order on close.
pub struct Lifecycle {
    config: Config,
    build_info: BuildInfo,
    store: Store,
    resolved_fleet_addr: Address,
    resolved_registry_addr: Address,
    client_addr: Address,
    pool: SessionPool,
    primary: Mutex<Option<Arc<RelaySession>>>,
    data_pool: DataPool,
    started: Mutex<bool>,
    log_sink: Mutex<Option<std::fs::File>>,
}

impl Lifecycle {
    /// Open the store at `cfg.db_path`, load/migrate the fleet address,
    /// derive the client address from `client_pubkey`, create the
    /// `DataPool`, and log build metadata. Does not dial any relay —
    /// call [`Lifecycle::start`] for that.
    ///
    /// `log_sink` is an owned handle to whatever OS resource the caller's
    /// logging layer holds open (e.g. the file a file-backed tracing
    /// writer appends to); passing one here means `close()` will flush and
    /// drop it as its final step, mirroring the source's "closing logs"
    /// shutdown phase. Pass `None` when logging is console-only.
    pub fn init(cfg: Config, build_info: BuildInfo, client_pubkey: &[u8]) -> Result<Self> {
        Self::init_with_log_sink(cfg, build_info, client_pubkey, None)
    }

    /// As [`Lifecycle::init`], additionally taking ownership of a log
    /// sink file handle to close during [`Lifecycle::close`].
    pub fn init_with_log_sink(
        cfg: Config,
        build_info: BuildInfo,
        client_pubkey: &[u8],
        log_sink: Option<std::fs::File>,
    ) -> Result<Self> {
        info!(
            version = %build_info.version,
            build_time = %build_info.build_time,
            "relay client starting"
        );

        let store = Store::open(&cfg.db_path)?;

        let resolved_fleet_addr = match store.load_fleet_addr()? {
            Some(addr) => addr,
            None => {
                let fallback = cfg.resolved_fleet_addr();
                store.save_fleet_addr(fallback)?;
                fallback
            }
        };
        let resolved_registry_addr = cfg.resolved_registry_addr();
        let client_addr = crate::crypto::pubkey_to_address(client_pubkey);

        info!(client_addr = %client_addr, "client address resolved");
        info!(fleet_addr = %resolved_fleet_addr, "fleet address resolved");

        Ok(Self {
            config: cfg,
            build_info,
            store,
            resolved_fleet_addr,
            resolved_registry_addr,
            client_addr,
            pool: SessionPool::new(),
            primary: Mutex::new(None),
            data_pool: DataPool::new(),
            started: Mutex::new(false),
            log_sink: Mutex::new(log_sink),
        })
    }

    pub fn resolved_fleet_addr(&self) -> Address {
        self.resolved_fleet_addr
    }

    pub fn resolved_registry_addr(&self) -> Address {
        self.resolved_registry_addr
    }

    pub fn client_addr(&self) -> Address {
        self.client_addr
    }

    pub fn build_info(&self) -> &BuildInfo {
        &self.build_info
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    pub fn data_pool(&self) -> &DataPool {
        &self.data_pool
    }

    /// Connect to every configured candidate, elect a primary, and mark
    /// the client started. Errors if no candidate validates
    /// (`Error::NoServerValidated`) or none are configured
    /// (`Error::NoCandidates`); in both cases `started()` remains false.
    pub async fn start(&self) -> Result<Address> {
        let ConnectResult {
            primary,
            pool: connected,
        } = connector::connect(&self.config.remote_rpc_addrs, &self.config).await?;

        for (identity, session) in connected.iter().await {
            self.pool.insert(identity, session).await;
        }

        let (last_valid_bn, last_valid_bh) = primary.last_valid().await;
        info!(
            block_number = last_valid_bn,
            block_hash = %data_encoding::HEXLOWER.encode(&last_valid_bh),
            "network is validated"
        );

        let primary_identity = primary.get_server_id().await?;
        *self.primary.lock().await = Some(primary);
        *self.started.lock().await = true;
        Ok(primary_identity)
    }

    pub async fn started(&self) -> bool {
        *self.started.lock().await
    }

    pub async fn primary(&self) -> Option<Arc<RelaySession>> {
        self.primary.lock().await.clone()
    }

    /// Idempotent shutdown: closes every pooled session, closes the
    /// `DataPool`, flushes the store, then closes any logging sink
    /// holding an OS handle. Safe to call even if [`Lifecycle::start`]
    /// never succeeded.
    pub async fn close(&self) -> Result<()> {
        let mut started = self.started.lock().await;
        if !*started {
            return Ok(());
        }
        *started = false;
        drop(started);

        self.pool.close_all().await;
        if let Some(primary) = self.primary.lock().await.take() {
            primary.close().await;
        }
        self.data_pool.close().await;
        self.store.flush()?;
        info!("relay client stopped");

        if let Some(mut sink) = self.log_sink.lock().await.take() {
            use std::io::Write;
            let _ = sink.flush();
            drop(sink);
        }
        Ok(())
    }
}
