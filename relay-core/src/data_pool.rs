//! Opaque shared state for application-level multiplexing, held across
//! sessions. This crate does not define what lives inside it — only the
//! `close()` contract Lifecycle depends on during shutdown.

use std::sync::atomic::{AtomicBool, Ordering};

/// Handle to the application-level multiplexing state shared by sessions.
/// Created once in `Lifecycle::init` and closed once in `Lifecycle::close`.
pub struct DataPool {
    closed: AtomicBool,
}

impl DataPool {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }

    /// Idempotent; concurrent callers see one effect.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for DataPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let pool = DataPool::new();
        assert!(!pool.is_closed());
        pool.close().await;
        pool.close().await;
        assert!(pool.is_closed());
    }
}
