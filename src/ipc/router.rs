use super::handlers;
use super::helpers::auth_err;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use crate::session::AuthError;
use chrono::Utc;

/// Methods callable without a live session. Logging out of a dead session
/// is a no-op rather than an error.
const PUBLIC_METHODS: &[&str] = &["health", "auth.login", "auth.guest", "auth.logout"];

/// Methods that touch the shared workspace itself. Guests keep to their own
/// store and may not call them.
const GUEST_FORBIDDEN: &[&str] = &["workspace.select"];

fn authorize(state: &mut AppState, req: &Request) -> Result<(), serde_json::Value> {
    if PUBLIC_METHODS.contains(&req.method.as_str()) {
        return Ok(());
    }
    let token = req.params.get("token").and_then(|v| v.as_str());
    let session = match state.sessions.validate(token, Utc::now()) {
        Ok(s) => s,
        Err(e) => {
            if e == AuthError::Expired {
                if let Some(t) = token {
                    state.guest_dbs.remove(t.trim());
                }
            }
            return Err(auth_err(req, e));
        }
    };
    if session.is_guest() {
        if GUEST_FORBIDDEN.contains(&req.method.as_str()) {
            return Err(auth_err(req, AuthError::GuestForbidden));
        }
        if !state.guest_dbs.contains_key(&session.token) {
            return Err(auth_err(req, AuthError::InvalidToken));
        }
    }
    Ok(())
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Err(resp) = authorize(state, &req) {
        return resp;
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::tests::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::marks::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
