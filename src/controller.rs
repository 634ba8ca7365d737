//! Cancellation registry for in-flight turns.
//!
//! Every streaming turn registers a cancellation token keyed by
//! (session id, message id), so exactly one cancellation source exists per
//! live turn and external callers (a stop button, Ctrl-C) can abort it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Registry mapping (session id, message id) to a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct ControllerPool {
    inner: Arc<Mutex<HashMap<(String, String), CancellationToken>>>,
}

impl ControllerPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh token for a turn, replacing any stale one.
    pub fn register(&self, session_id: &str, message_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert(
            (session_id.to_string(), message_id.to_string()),
            token.clone(),
        );
        token
    }

    /// Cancels one turn. Returns false if nothing was registered for it.
    pub fn cancel(&self, session_id: &str, message_id: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get(&(session_id.to_string(), message_id.to_string())) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every registered turn of a session.
    pub fn cancel_session(&self, session_id: &str) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for ((sid, _), token) in inner.iter() {
            if sid == session_id {
                token.cancel();
            }
        }
    }

    /// Cancels everything.
    pub fn cancel_all(&self) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for token in inner.values() {
            token.cancel();
        }
    }

    /// Drops the registration for a finished turn.
    pub fn remove(&self, session_id: &str, message_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(&(session_id.to_string(), message_id.to_string()));
    }

    /// True if any turn is currently registered.
    pub fn has_pending(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        !inner.is_empty()
    }
}
