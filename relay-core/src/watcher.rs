//! Confirms an account state transition against a relay session, polling
//! until the state root changes or a bounded number of attempts elapse.
//!
//! The iteration cap is incremented unconditionally on every pass through
//! the loop, not only when a new block is observed, so a stalled chain
//! still terminates the watch instead of polling forever.

use std::time::Duration;

use tracing::info;

use crate::address::Address;
use crate::rpc::Account;
use crate::session::RelaySession;

/// Polling interval between `last_valid`/`get_valid_account` checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Maximum number of polls before giving up and reporting unconfirmed.
pub const MAX_ITERATIONS: u32 = 15;

/// Wait for `target`'s account state to change from its value as of the
/// session's current last-valid block, polling at [`POLL_INTERVAL`] for
/// up to [`MAX_ITERATIONS`] attempts. Returns `true` once a state-root
/// change (or a transition from absent to present) is observed, `false`
/// if the cap is reached first.
pub async fn watch_account(session: &RelaySession, target: Address) -> bool {
    watch_account_with(session, target, POLL_INTERVAL, MAX_ITERATIONS).await
}

/// Same procedure as [`watch_account`] with an overridable interval/cap,
/// so tests can drive the loop without waiting 15 seconds per iteration.
pub async fn watch_account_with(
    session: &RelaySession,
    target: Address,
    poll_interval: Duration,
    max_iterations: u32,
) -> bool {
    let (start_bn, _) = session.last_valid().await;
    let mut bn = start_bn;
    let old_account = session
        .get_valid_account(bn, target)
        .await
        .ok()
        .flatten();

    let mut iterations: u32 = 0;
    loop {
        tokio::time::sleep(poll_interval).await;

        let (next_bn, _) = session.last_valid().await;
        if next_bn == bn {
            info!("waiting for next valid block...");
        } else {
            bn = next_bn;
            match session.get_valid_account(bn, target).await {
                Ok(Some(new_account)) => {
                    if account_changed(old_account.as_ref(), &new_account) {
                        return true;
                    }
                    // State root unchanged: no transaction landed in this
                    // block, or it didn't touch this account.
                }
                Ok(None) => {}
                Err(_) => info!("waiting for next valid block..."),
            }
        }

        iterations += 1;
        if iterations >= max_iterations {
            return false;
        }
    }
}

fn account_changed(old: Option<&Account>, new: &Account) -> bool {
    match old {
        None => true,
        Some(old) => old.state_root != new.state_root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::rpc::{RelayRpc, ValidationOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex as TokioMutex;

    /// Scripted RPC whose `last_valid`/`get_valid_account` responses are
    /// driven by a shared counter, advanced once per call to simulate a
    /// chain producing one new block per watcher poll.
    struct ChainRpc {
        block: Arc<AtomicU64>,
        accounts_by_block: Arc<TokioMutex<Vec<(u64, Option<Account>)>>>,
    }

    #[async_trait]
    impl RelayRpc for ChainRpc {
        async fn validate_network(&mut self) -> ValidationOutcome {
            ValidationOutcome {
                valid: true,
                error: None,
            }
        }
        async fn get_server_id(&mut self) -> Result<Address> {
            Ok(Address::from_bytes([1u8; 20]))
        }
        async fn fetch_last_valid(&mut self) -> Result<(u64, [u8; 32])> {
            Ok((self.block.load(Ordering::SeqCst), [0u8; 32]))
        }
        async fn get_valid_account(
            &mut self,
            block_number: u64,
            _address: Address,
        ) -> Result<Option<Account>> {
            let table = self.accounts_by_block.lock().await;
            Ok(table
                .iter()
                .rev()
                .find(|(bn, _)| *bn <= block_number)
                .and_then(|(_, acct)| acct.clone()))
        }
        async fn close(&mut self) {}
    }

    fn chain_account(state_root: u8) -> Account {
        Account {
            address: Address::from_bytes([7u8; 20]),
            state_root: [state_root; 32],
        }
    }

    #[tokio::test]
    async fn confirms_when_state_root_changes() {
        let block = Arc::new(AtomicU64::new(1));
        let accounts = Arc::new(TokioMutex::new(vec![
            (1, Some(chain_account(1))),
            (2, Some(chain_account(2))),
        ]));
        let rpc = ChainRpc {
            block: block.clone(),
            accounts_by_block: accounts,
        };
        let session = RelaySession::from_rpc("chain:1", Box::new(rpc));
        session.validate_network().await;

        // First poll observes a new block with a different state root.
        let watch = tokio::spawn({
            let target = Address::from_bytes([7u8; 20]);
            async move {
                watch_account_with(
                    &session,
                    target,
                    Duration::from_millis(5),
                    MAX_ITERATIONS,
                )
                .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        block.store(2, Ordering::SeqCst);

        assert!(watch.await.unwrap());
    }

    #[tokio::test]
    async fn confirms_when_account_goes_from_absent_to_present() {
        let block = Arc::new(AtomicU64::new(1));
        let accounts = Arc::new(TokioMutex::new(vec![(1, None), (2, Some(chain_account(9)))]));
        let rpc = ChainRpc {
            block: block.clone(),
            accounts_by_block: accounts,
        };
        let session = RelaySession::from_rpc("chain:1", Box::new(rpc));
        session.validate_network().await;

        let watch = tokio::spawn({
            let target = Address::from_bytes([7u8; 20]);
            async move {
                watch_account_with(
                    &session,
                    target,
                    Duration::from_millis(5),
                    MAX_ITERATIONS,
                )
                .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        block.store(2, Ordering::SeqCst);

        assert!(watch.await.unwrap());
    }

    #[tokio::test]
    async fn gives_up_after_max_iterations_on_a_stalled_chain() {
        let block = Arc::new(AtomicU64::new(1));
        let accounts = Arc::new(TokioMutex::new(vec![(1, Some(chain_account(1)))]));
        let rpc = ChainRpc {
            block: block.clone(),
            accounts_by_block: accounts,
        };
        let session = RelaySession::from_rpc("chain:1", Box::new(rpc));
        session.validate_network().await;

        let target = Address::from_bytes([7u8; 20]);
        // Chain never advances past block 1: last_valid always reports
        // the same number, so the cap must terminate the loop on its own.
        let confirmed =
            watch_account_with(&session, target, Duration::from_millis(2), 5).await;
        assert!(!confirmed);
    }
}
