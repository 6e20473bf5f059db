use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::db;
use crate::session::SessionStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    pub sessions: SessionStore,
    /// Guest token -> that guest's in-memory store. Dropped with the session.
    pub guest_dbs: HashMap<String, Connection>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new(config.session_ttl_minutes);
        Self {
            workspace: None,
            db: None,
            config,
            sessions,
            guest_dbs: HashMap::new(),
        }
    }

    pub fn open_guest_store(&mut self, token: &str) -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        self.guest_dbs.insert(token.to_string(), conn);
        Ok(())
    }

    /// Logs the token out and discards its guest store, if any.
    pub fn end_session(&mut self, token: &str) -> bool {
        let had_store = self.guest_dbs.remove(token).is_some();
        self.sessions.logout(token) || had_store
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        for token in self.sessions.purge_expired(now) {
            self.guest_dbs.remove(&token);
        }
    }

    /// The guest's own store for guest tokens, the workspace otherwise.
    pub fn conn_for(&self, token: Option<&str>) -> Option<&Connection> {
        match token.and_then(|t| self.guest_dbs.get(t.trim())) {
            Some(conn) => Some(conn),
            None => self.db.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> AppState {
        AppState::new(Config::default())
    }

    #[test]
    fn guest_store_is_separate_from_the_workspace() {
        let mut st = state();
        st.db = Some(Connection::open_in_memory().expect("open"));
        let now = Utc::now();
        let guest = st.sessions.login_guest(&st.config, now).expect("guest");
        st.open_guest_store(&guest.token).expect("store");

        let mine = st.conn_for(Some(&guest.token)).expect("guest conn");
        let shared = st.db.as_ref().expect("workspace");
        assert!(!std::ptr::eq(mine, shared));
        assert!(std::ptr::eq(st.conn_for(Some("teacher-token")).expect("conn"), shared));
    }

    #[test]
    fn guest_store_goes_with_logout_and_expiry() {
        let mut st = state();
        let now = Utc::now();
        let a = st.sessions.login_guest(&st.config, now).expect("guest");
        st.open_guest_store(&a.token).expect("store");
        assert!(st.end_session(&a.token));
        assert!(st.guest_dbs.is_empty());
        assert!(!st.end_session(&a.token));

        let b = st
            .sessions
            .login_guest(&st.config, now - Duration::hours(13))
            .expect("guest");
        st.open_guest_store(&b.token).expect("store");
        st.purge_expired(now);
        assert!(st.guest_dbs.is_empty());
        assert!(st.conn_for(Some(&b.token)).is_none());
    }
}
