//! A single authenticated session to one relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::Address;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::rpc::{Account, JsonLineRpc, RelayRpc};

/// Lifecycle state of a `RelaySession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    Validating,
    Valid,
    Closed,
}

/// A single authenticated session to one relay.
///
/// `identity` is only readable once `state` has reached `Valid` or
/// `Closed` — callers see `Err(Error::Protocol(_))` from
/// [`RelaySession::get_server_id`] beforehand.
pub struct RelaySession {
    host: String,
    state: Mutex<SessionState>,
    identity: Mutex<Option<Address>>,
    last_valid: Mutex<(u64, [u8; 32])>,
    rpc: Mutex<Box<dyn RelayRpc>>,
    closed: AtomicBool,
}

impl RelaySession {
    /// Open a transport to `host`, honoring `cfg.enable_keepalive` /
    /// `cfg.keepalive_count`. Returns a session in `Dialing` state; callers
    /// must still call [`RelaySession::validate_network`].
    pub async fn dial(host: &str, cfg: &Config) -> Result<Self> {
        let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(host))
            .await
            .map_err(|_| Error::Transport(std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timed out")))?
            .map_err(Error::Transport)?;
        stream.set_nodelay(true).map_err(Error::Transport)?;

        if cfg.enable_keepalive {
            let sref = SockRef::from(&stream);
            sref.set_keepalive(true).map_err(Error::Transport)?;
            // socket2 exposes platform keepalive knobs; this maps the
            // configured probe count onto the OS-level retry setting.
            #[cfg(any(target_os = "linux", target_os = "android"))]
            {
                let _ = sref.set_tcp_keepalive(
                    &socket2::TcpKeepalive::new().with_retries(cfg.keepalive_count),
                );
            }
        }

        Ok(Self {
            host: host.to_string(),
            state: Mutex::new(SessionState::Dialing),
            identity: Mutex::new(None),
            last_valid: Mutex::new((0, [0u8; 32])),
            rpc: Mutex::new(Box::new(JsonLineRpc::new(stream))),
            closed: AtomicBool::new(false),
        })
    }

    /// Build a session around an already-supplied RPC implementation — used
    /// by tests to inject fakes without opening a real socket.
    pub fn from_rpc(host: &str, rpc: Box<dyn RelayRpc>) -> Self {
        Self {
            host: host.to_string(),
            state: Mutex::new(SessionState::Dialing),
            identity: Mutex::new(None),
            last_valid: Mutex::new((0, [0u8; 32])),
            rpc: Mutex::new(rpc),
            closed: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Perform the network-validation handshake. Transport errors during
    /// validation close the session; it is never returned to the pool.
    pub async fn validate_network(&self) -> (bool, Option<Error>) {
        {
            let mut state = self.state.lock().await;
            *state = SessionState::Validating;
        }

        let outcome = self.rpc.lock().await.validate_network().await;

        if outcome.valid {
            if let Ok((bn, bh)) = self.rpc.lock().await.fetch_last_valid().await {
                *self.last_valid.lock().await = (bn, bh);
            }
            *self.state.lock().await = SessionState::Valid;
            (true, None)
        } else {
            let err = outcome
                .error
                .map(Error::Protocol)
                .unwrap_or_else(|| Error::Protocol("network not valid".into()));
            warn!(host = %self.host, error = %err, "validation failed, closing session");
            self.close().await;
            (false, Some(err))
        }
    }

    /// Returns the peer's 20-byte identity, caching it on first success.
    /// Fails with `Error::Protocol` if called before `Valid`.
    pub async fn get_server_id(&self) -> Result<Address> {
        {
            let state = *self.state.lock().await;
            if !matches!(state, SessionState::Valid | SessionState::Closed) {
                return Err(Error::Protocol(
                    "get_server_id called before session is valid".into(),
                ));
            }
        }

        if let Some(addr) = *self.identity.lock().await {
            return Ok(addr);
        }

        let addr = self.rpc.lock().await.get_server_id().await?;
        *self.identity.lock().await = Some(addr);
        Ok(addr)
    }

    /// Cached last-valid block coordinates. Never blocks on the network;
    /// returns `(0, [0; 32])` before first observation.
    pub async fn last_valid(&self) -> (u64, [u8; 32]) {
        *self.last_valid.lock().await
    }

    /// Query account state anchored at `block_number`, refreshing the
    /// cached last-valid coordinates along the way.
    pub async fn get_valid_account(
        &self,
        block_number: u64,
        address: Address,
    ) -> Result<Option<Account>> {
        let account = self
            .rpc
            .lock()
            .await
            .get_valid_account(block_number, address)
            .await?;
        if let Ok((bn, bh)) = self.rpc.lock().await.fetch_last_valid().await {
            *self.last_valid.lock().await = (bn, bh);
        }
        Ok(account)
    }

    /// Idempotent close: transitions to `Closed` and releases the
    /// transport. Concurrent callers observe one close.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock().await = SessionState::Closed;
        self.rpc.lock().await.close().await;
        debug!(host = %self.host, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Dial timeout applied at the transport layer. Not otherwise enforced
/// further up the stack, but a sane upper bound keeps a single
/// unreachable candidate from stalling Connector's fan-out forever.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
