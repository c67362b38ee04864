//! Thread-safe map from relay identity to `RelaySession`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::address::Address;
use crate::session::RelaySession;

/// Concurrency-safe associative container of validated relay sessions,
/// keyed by the 20-byte identity each session reported during validation.
///
/// The lock is held only around map mutation, never across an awaited
/// RPC call.
#[derive(Clone)]
pub struct SessionPool {
    sessions: Arc<Mutex<HashMap<Address, Arc<RelaySession>>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert a session, overwriting (and closing) any prior entry with
    /// the same identity.
    pub async fn insert(&self, identity: Address, session: Arc<RelaySession>) {
        let previous = self.sessions.lock().await.insert(identity, session);
        if let Some(prev) = previous {
            prev.close().await;
        }
    }

    pub async fn get(&self, identity: &Address) -> Option<Arc<RelaySession>> {
        self.sessions.lock().await.get(identity).cloned()
    }

    /// Snapshot iteration, safe against concurrent mutation (the snapshot
    /// is a clone of the current map's values; it does not hold the lock).
    pub async fn iter(&self) -> Vec<(Address, Arc<RelaySession>)> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drain and close every member. Idempotent: closing an already-closed
    /// session is a no-op.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (_, session) in drained {
            session.close().await;
        }
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Account, RelayRpc, ValidationOutcome};
    use async_trait::async_trait;
    use crate::error::Result;

    struct FakeRpc;

    #[async_trait]
    impl RelayRpc for FakeRpc {
        async fn validate_network(&mut self) -> ValidationOutcome {
            ValidationOutcome {
                valid: true,
                error: None,
            }
        }
        async fn get_server_id(&mut self) -> Result<Address> {
            Ok(Address::from_bytes([0u8; 20]))
        }
        async fn fetch_last_valid(&mut self) -> Result<(u64, [u8; 32])> {
            Ok((0, [0u8; 32]))
        }
        async fn get_valid_account(
            &mut self,
            _block_number: u64,
            _address: Address,
        ) -> Result<Option<Account>> {
            Ok(None)
        }
        async fn close(&mut self) {}
    }

    fn fake_session(host: &str) -> Arc<RelaySession> {
        Arc::new(RelaySession::from_rpc(host, Box::new(FakeRpc)))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let pool = SessionPool::new();
        let id = Address::from_bytes([1u8; 20]);
        pool.insert(id, fake_session("a")).await;
        assert!(pool.get(&id).await.is_some());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn insert_overwrites_and_closes_previous() {
        let pool = SessionPool::new();
        let id = Address::from_bytes([1u8; 20]);
        let first = fake_session("a");
        pool.insert(id, first.clone()).await;
        let second = fake_session("b");
        pool.insert(id, second).await;
        assert!(first.is_closed());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn close_all_drains_and_closes() {
        let pool = SessionPool::new();
        let s1 = fake_session("a");
        let s2 = fake_session("b");
        pool.insert(Address::from_bytes([1u8; 20]), s1.clone())
            .await;
        pool.insert(Address::from_bytes([2u8; 20]), s2.clone())
            .await;
        pool.close_all().await;
        assert!(pool.is_empty().await);
        assert!(s1.is_closed());
        assert!(s2.is_closed());
    }
}
