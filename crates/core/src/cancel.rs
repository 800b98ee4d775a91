//! Per-session cancellation registry.
//!
//! Each session has at most one active [`CancelToken`]. Raising it makes
//! the next dispatch inject an interruption observation and tells any
//! in-flight cooperative tool to abort; the token is cleared when the
//! session accepts a new user message.

use std::collections::HashMap;

use parking_lot::Mutex;

use axon_tools::CancelToken;

#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the token for a session.
    pub fn token(&self, session_id: &str) -> CancelToken {
        self.tokens
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .clone()
    }

    /// Raise the cancel signal. Returns false if the session has no token.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a session's token (session deleted).
    pub fn remove(&self, session_id: &str) {
        self.tokens.lock().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_per_session() {
        let map = CancelMap::new();
        let a = map.token("s1");
        let b = map.token("s1");
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn cancel_unknown_session_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("ghost"));
    }

    #[test]
    fn remove_forgets_the_token() {
        let map = CancelMap::new();
        map.token("s1");
        map.remove("s1");
        assert!(!map.cancel("s1"));
    }
}
