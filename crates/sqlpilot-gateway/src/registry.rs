//! In-flight request registry for best-effort cancellation.
//!
//! Every `generate_sql` request is registered on arrival and removed
//! exactly once when its turn resolves. `cancel_request` (or a
//! disconnect) flips the cancelled flag and fires the per-request watch
//! channel so the backend stream can be dropped early; the resolver
//! consults the flag via `finish` and suppresses the outbound send when
//! it was set. Audit rows already committed for a cancelled turn are
//! never rolled back.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

struct Entry {
    cancelled: bool,
    signal: watch::Sender<bool>,
}

/// Tracks requests between arrival and resolution.
#[derive(Default)]
pub struct InFlightRegistry {
    requests: Mutex<HashMap<String, Entry>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request as in flight and hand back its cancel signal
    /// (flips to true when the request is cancelled). A duplicate
    /// requestId overwrites the existing entry; callers are expected to
    /// mint fresh ids.
    pub fn insert(&self, request_id: &str) -> watch::Receiver<bool> {
        let (signal, receiver) = watch::channel(false);
        self.guard().insert(
            request_id.to_string(),
            Entry {
                cancelled: false,
                signal,
            },
        );
        receiver
    }

    /// Mark an in-flight request as cancelled. Unknown ids are ignored
    /// (the request already resolved, or never existed).
    ///
    /// Returns whether the id was in flight.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.guard().get_mut(request_id) {
            Some(entry) => {
                entry.cancelled = true;
                let _ = entry.signal.send(true);
                true
            }
            None => false,
        }
    }

    /// Resolve a request: remove it and report whether its response may
    /// be sent (true) or was cancelled (false). A request that was never
    /// registered resolves as cancelled.
    pub fn finish(&self, request_id: &str) -> bool {
        match self.guard().remove(request_id) {
            Some(entry) => !entry.cancelled,
            None => false,
        }
    }

    /// Number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_uncancelled_allows_send() {
        let registry = InFlightRegistry::new();
        let _signal = registry.insert("req_1");
        assert!(registry.finish("req_1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_then_finish_suppresses_send() {
        let registry = InFlightRegistry::new();
        let _signal = registry.insert("req_9");
        assert!(registry.cancel("req_9"));
        assert!(!registry.finish("req_9"));
    }

    #[test]
    fn test_cancel_fires_the_watch_signal() {
        let registry = InFlightRegistry::new();
        let signal = registry.insert("req_9");
        assert!(!*signal.borrow());
        registry.cancel("req_9");
        assert!(*signal.borrow());
    }

    #[test]
    fn test_cancel_unknown_id_is_noop() {
        let registry = InFlightRegistry::new();
        assert!(!registry.cancel("req_missing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_finish_is_single_shot() {
        let registry = InFlightRegistry::new();
        let _signal = registry.insert("req_1");
        assert!(registry.finish("req_1"));
        // Second resolution of the same id reports cancelled.
        assert!(!registry.finish("req_1"));
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let registry = InFlightRegistry::new();
        let _signal = registry.insert("req_1");
        assert!(registry.finish("req_1"));
        assert!(!registry.cancel("req_1"));
    }

    #[test]
    fn test_independent_requests() {
        let registry = InFlightRegistry::new();
        let _a = registry.insert("req_a");
        let _b = registry.insert("req_b");
        registry.cancel("req_a");
        assert!(!registry.finish("req_a"));
        assert!(registry.finish("req_b"));
    }
}
