//! Session tokens and per-session state.
//!
//! A successful login mints an opaque UUIDv4 token and maps it to a
//! [`Session`] holding everything the server tracks for one client: the
//! user name, the currently selected database, and the transaction state.
//! The server keeps at most one live session per user; a new login
//! supersedes any token that user already held.

use std::collections::HashMap;

use log::{debug, info};
use uuid::Uuid;

use crate::engine::txn::TxnState;

#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub user: String,
    pub current_database: Option<String>,
    pub txn: TxnState,
}

impl Session {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: user.into(),
            current_database: None,
            txn: TxnState::default(),
        }
    }
}

/// Token → session registry.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session for `user`, superseding any earlier one, and
    /// returns the fresh token.
    pub fn create(&mut self, user: &str) -> String {
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.user == user)
            .map(|session| session.token.clone())
            .collect();
        for token in stale {
            debug!("superseding session for '{user}'");
            self.sessions.remove(&token);
        }

        let token = Uuid::new_v4().to_string();
        self.sessions
            .insert(token.clone(), Session::new(token.clone(), user));
        info!("session opened for '{user}'");
        token
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut Session> {
        self.sessions.get_mut(token)
    }

    pub fn remove(&mut self, token: &str) -> Option<Session> {
        let session = self.sessions.remove(token);
        if let Some(session) = &session {
            info!("session closed for '{}'", session.user);
        }
        session
    }

    /// Tokens of every live session.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_fresh_per_login() {
        let mut manager = SessionManager::new();
        let first = manager.create("admin");
        manager.remove(&first);
        let second = manager.create("admin");
        assert_ne!(first, second);
    }

    #[test]
    fn new_login_supersedes_the_previous_session() {
        let mut manager = SessionManager::new();
        let old = manager.create("admin");
        let new = manager.create("admin");

        assert!(manager.get(&old).is_none());
        assert!(manager.get(&new).is_some());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn sessions_for_distinct_users_coexist() {
        let mut manager = SessionManager::new();
        let admin = manager.create("admin");
        let guest = manager.create("guest");

        assert_eq!(manager.get(&admin).unwrap().user, "admin");
        assert_eq!(manager.get(&guest).unwrap().user, "guest");
    }

    #[test]
    fn fresh_sessions_have_no_database_and_no_transaction() {
        let mut manager = SessionManager::new();
        let token = manager.create("admin");
        let session = manager.get(&token).unwrap();
        assert_eq!(session.current_database, None);
        assert!(!session.txn.is_active());
    }
}
