//! Parallel dial + validate across a candidate set; elects the primary.

use std::sync::Arc;

use tokio::sync::{mpsc, OnceCell};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pool::SessionPool;
use crate::session::RelaySession;

/// Outcome of one candidate's dial+validate attempt, published onto the
/// single completion stream the drain task consumes.
enum Outcome {
    Valid(Arc<RelaySession>),
    Invalid,
    DialFailed(Error),
}

/// Result of a successful `connect`: the elected primary plus a pool
/// containing every candidate that validated, primary included.
pub struct ConnectResult {
    pub primary: Arc<RelaySession>,
    pub pool: SessionPool,
}

/// Spawn one dialer task per candidate, drain their outcomes on a single
/// completion stream, and elect the first validator as primary.
///
/// At least one endpoint is required (`Error::NoCandidates`). If every
/// candidate fails to validate, returns `Error::NoServerValidated` and no
/// session remains open.
pub async fn connect(candidates: &[String], cfg: &Config) -> Result<ConnectResult> {
    if candidates.is_empty() {
        return Err(Error::NoCandidates);
    }

    let pool = SessionPool::new();
    let primary_cell: Arc<OnceCell<Arc<RelaySession>>> = Arc::new(OnceCell::new());
    let (tx, mut rx) = mpsc::channel::<Outcome>(candidates.len());

    for host in candidates {
        let host = host.clone();
        let cfg = cfg.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = dial_and_validate(&host, &cfg).await;
            // The receiver may already be gone if Connector declared
            // completion; a failed send just means this candidate's
            // outcome arrived too late to matter.
            let _ = tx.send(outcome).await;
        });
    }
    // Drop our own sender so the channel closes once every spawned task
    // has sent its outcome (or been dropped without sending).
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        match outcome {
            Outcome::Valid(session) => match session.get_server_id().await {
                Ok(identity) => {
                    let elected = primary_cell.set(session.clone()).is_ok();
                    pool.insert(identity, session.clone()).await;
                    if elected {
                        info!(host = session.host(), "elected primary relay session");
                    }
                }
                Err(e) => {
                    warn!(
                        host = session.host(),
                        error = %e,
                        "failed to read server id after validation, dropping session"
                    );
                    session.close().await;
                }
            },
            Outcome::Invalid => {}
            Outcome::DialFailed(e) => {
                error!(error = %e, "candidate dial failed");
            }
        }
    }

    match primary_cell.get() {
        Some(primary) => Ok(ConnectResult {
            primary: primary.clone(),
            pool,
        }),
        None => Err(Error::NoServerValidated),
    }
}

/// Dial `host`, retrying transport failures up to `cfg.retry_times` times
/// before surfacing the last error. A session that dials but fails
/// validation is not retried — validation failure is a property of the
/// candidate, not a transient transport hiccup.
async fn dial_and_validate(host: &str, cfg: &Config) -> Outcome {
    let mut attempts = 0;
    let session = loop {
        match RelaySession::dial(host, cfg).await {
            Ok(s) => break Arc::new(s),
            Err(e) => {
                attempts += 1;
                if attempts > cfg.retry_times {
                    return Outcome::DialFailed(e);
                }
            }
        }
    };

    let (valid, _err) = session.validate_network().await;
    if valid {
        Outcome::Valid(session)
    } else {
        // validate_network already closed the session on failure.
        Outcome::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CoreResult;
    use crate::rpc::{Account, RelayRpc, ValidationOutcome};
    use crate::address::Address;
    use async_trait::async_trait;
    use std::time::Duration;

    struct ScriptedRpc {
        valid: bool,
        identity: Address,
        delay: Duration,
        server_id_fails: bool,
    }

    #[async_trait]
    impl RelayRpc for ScriptedRpc {
        async fn validate_network(&mut self) -> ValidationOutcome {
            tokio::time::sleep(self.delay).await;
            ValidationOutcome {
                valid: self.valid,
                error: if self.valid {
                    None
                } else {
                    Some("rejected".into())
                },
            }
        }

        async fn get_server_id(&mut self) -> CoreResult<Address> {
            if self.server_id_fails {
                Err(crate::error::Error::Protocol("no id".into()))
            } else {
                Ok(self.identity)
            }
        }

        async fn fetch_last_valid(&mut self) -> CoreResult<(u64, [u8; 32])> {
            Ok((1, [0u8; 32]))
        }

        async fn get_valid_account(
            &mut self,
            _block_number: u64,
            _address: Address,
        ) -> CoreResult<Option<Account>> {
            Ok(None)
        }

        async fn close(&mut self) {}
    }

    fn test_cfg() -> Config {
        Config {
            db_path: "/tmp/relay-core-test".into(),
            retry_times: 1,
            enable_keepalive: false,
            keepalive_count: 0,
            remote_rpc_addrs: vec![],
            fleet_addr: None,
            registry_addr: None,
            client_addr: Address::from_bytes([0u8; 20]),
            enable_edge_e2e: false,
            enable_metrics: false,
            debug: false,
            log_mode: crate::config::LogMode::Console,
            log_file_path: None,
            log_date_time: false,
        }
    }

    // Exercises election directly against pre-built sessions, bypassing
    // RelaySession::dial (which needs a real socket) — mirrors the
    // Connector's drain loop without the network fan-out.
    async fn elect(sessions: Vec<(&str, ScriptedRpc)>) -> Result<ConnectResult> {
        let pool = SessionPool::new();
        let primary_cell: Arc<OnceCell<Arc<RelaySession>>> = Arc::new(OnceCell::new());
        let (tx, mut rx) = mpsc::channel::<Outcome>(sessions.len().max(1));

        for (host, rpc) in sessions {
            let host = host.to_string();
            let tx = tx.clone();
            let session = Arc::new(RelaySession::from_rpc(&host, Box::new(rpc)));
            tokio::spawn(async move {
                let (valid, _) = session.validate_network().await;
                let outcome = if valid {
                    Outcome::Valid(session)
                } else {
                    Outcome::Invalid
                };
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            match outcome {
                Outcome::Valid(session) => match session.get_server_id().await {
                    Ok(identity) => {
                        primary_cell.set(session.clone()).ok();
                        pool.insert(identity, session.clone()).await;
                    }
                    Err(_) => session.close().await,
                },
                Outcome::Invalid | Outcome::DialFailed(_) => {}
            }
        }

        match primary_cell.get() {
            Some(p) => Ok(ConnectResult {
                primary: p.clone(),
                pool,
            }),
            None => Err(Error::NoServerValidated),
        }
    }

    #[tokio::test]
    async fn first_to_validate_wins_by_arrival_order() {
        let result = elect(vec![
            (
                "s2",
                ScriptedRpc {
                    valid: true,
                    identity: Address::from_bytes([2u8; 20]),
                    delay: Duration::from_millis(5),
                    server_id_fails: false,
                },
            ),
            (
                "s1",
                ScriptedRpc {
                    valid: true,
                    identity: Address::from_bytes([1u8; 20]),
                    delay: Duration::from_millis(20),
                    server_id_fails: false,
                },
            ),
            (
                "s3",
                ScriptedRpc {
                    valid: true,
                    identity: Address::from_bytes([3u8; 20]),
                    delay: Duration::from_millis(40),
                    server_id_fails: false,
                },
            ),
        ])
        .await
        .unwrap();

        assert_eq!(result.primary.host(), "s2");
        assert_eq!(result.pool.len().await, 3);
    }

    #[tokio::test]
    async fn only_one_valid_candidate_is_both_primary_and_sole_pool_member() {
        let result = elect(vec![
            (
                "refuses",
                ScriptedRpc {
                    valid: false,
                    identity: Address::from_bytes([9u8; 20]),
                    delay: Duration::from_millis(1),
                    server_id_fails: false,
                },
            ),
            (
                "only",
                ScriptedRpc {
                    valid: true,
                    identity: Address::from_bytes([5u8; 20]),
                    delay: Duration::from_millis(10),
                    server_id_fails: false,
                },
            ),
        ])
        .await
        .unwrap();

        assert_eq!(result.primary.host(), "only");
        assert_eq!(result.pool.len().await, 1);
    }

    #[tokio::test]
    async fn all_invalid_fails_with_no_server_validated() {
        let err = elect(vec![
            (
                "a",
                ScriptedRpc {
                    valid: false,
                    identity: Address::NULL,
                    delay: Duration::from_millis(1),
                    server_id_fails: false,
                },
            ),
            (
                "b",
                ScriptedRpc {
                    valid: false,
                    identity: Address::NULL,
                    delay: Duration::from_millis(1),
                    server_id_fails: false,
                },
            ),
        ])
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NoServerValidated));
    }

    #[tokio::test]
    async fn empty_candidate_list_fails_fast() {
        let cfg = test_cfg();
        let err = connect(&[], &cfg).await.unwrap_err();
        assert!(matches!(err, Error::NoCandidates));
    }

    #[tokio::test]
    async fn failed_get_server_id_drops_session_without_electing() {
        let result = elect(vec![(
            "bad-id",
            ScriptedRpc {
                valid: true,
                identity: Address::from_bytes([1u8; 20]),
                delay: Duration::from_millis(1),
                server_id_fails: true,
            },
        )])
        .await
        .unwrap_err();

        assert!(matches!(result, Error::NoServerValidated));
    }
}
