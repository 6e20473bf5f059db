//! Bearer sessions. Created on login, dropped on logout or expiry.

use crate::config::{sha256_hex, Config};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Teacher,
    Guest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Guests work in a private scratch store, never the shared workspace.
    pub fn is_guest(&self) -> bool {
        self.role == Role::Guest
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("please enter the master key")]
    MissingKey,
    #[error("invalid master key")]
    InvalidKey,
    #[error("teacher login is not configured")]
    NotConfigured,
    #[error("guest login is disabled")]
    GuestDisabled,
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("session expired")]
    Expired,
    #[error("not available to guest sessions")]
    GuestForbidden,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingKey => "bad_params",
            AuthError::InvalidKey => "invalid_key",
            AuthError::NotConfigured => "not_configured",
            AuthError::GuestDisabled => "guest_disabled",
            AuthError::MissingToken | AuthError::InvalidToken => "unauthorized",
            AuthError::Expired => "session_expired",
            AuthError::GuestForbidden => "forbidden",
        }
    }
}

pub struct SessionStore {
    sessions: HashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    fn issue(&mut self, role: Role, now: DateTime<Utc>) -> Session {
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            role,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    pub fn login(
        &mut self,
        config: &Config,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AuthError::MissingKey);
        }
        let Some(expected) = config.master_key_sha256.as_deref() else {
            return Err(AuthError::NotConfigured);
        };
        if sha256_hex(key) != expected {
            return Err(AuthError::InvalidKey);
        }
        Ok(self.issue(Role::Teacher, now))
    }

    pub fn login_guest(&mut self, config: &Config, now: DateTime<Utc>) -> Result<Session, AuthError> {
        if !config.guest_login {
            return Err(AuthError::GuestDisabled);
        }
        Ok(self.issue(Role::Guest, now))
    }

    /// Looks up a live session. Expired sessions are removed on sight.
    pub fn validate(&mut self, token: Option<&str>, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let session = self
            .sessions
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)?;
        if session.expires_at <= now {
            self.sessions.remove(token);
            return Err(AuthError::Expired);
        }
        Ok(session)
    }

    pub fn logout(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drops expired sessions and returns their tokens.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.token.clone())
            .collect();
        for token in &expired {
            self.sessions.remove(token);
        }
        expired
    }
}
