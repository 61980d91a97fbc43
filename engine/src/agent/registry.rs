//! Session Registry
//!
//! Hands out one serialization guard per session key. Every mutating path
//! (turn processing, reset, the pipeline's final write) locks the key's
//! guard first, so all writes to one session happen in some serial order
//! while sessions with different keys proceed fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-key guard registry. Cheap to clone; clones share the same guards.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    guards: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the guard for a session key, creating it on first use.
    ///
    /// The registry lock is held only long enough to look up the guard;
    /// long-latency work (backend calls, storage) happens under the
    /// returned per-key guard instead.
    pub async fn guard(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards
            .entry(session_key.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_same_guard() {
        let registry = SessionRegistry::new();
        let a = registry.guard("s1").await;
        let b = registry.guard("s1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_different_keys_independent() {
        let registry = SessionRegistry::new();
        let a = registry.guard("s1").await;
        let b = registry.guard("s2").await;
        assert!(!Arc::ptr_eq(&a, &b));

        // Holding one key's guard must not block the other key.
        let _held = a.lock().await;
        let second = b.try_lock();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_guards() {
        let registry = SessionRegistry::new();
        let clone = registry.clone();
        let a = registry.guard("s1").await;
        let b = clone.guard("s1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
