use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{auth_err, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use chrono::Utc;
use serde_json::json;

fn session_json(s: &Session) -> serde_json::Value {
    json!({
        "token": s.token,
        "role": s.role,
        "expiresAt": s.expires_at.to_rfc3339(),
    })
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = req
        .params
        .get("key")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let now = Utc::now();
    state.purge_expired(now);
    match state.sessions.login(&state.config, key, now) {
        Ok(s) => ok(&req.id, session_json(&s)),
        Err(e) => auth_err(req, e),
    }
}

fn handle_guest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = Utc::now();
    state.purge_expired(now);
    let session = match state.sessions.login_guest(&state.config, now) {
        Ok(s) => s,
        Err(e) => return auth_err(req, e),
    };
    // Each guest gets an empty scratch store that lives as long as the session.
    if let Err(e) = state.open_guest_store(&session.token) {
        state.end_session(&session.token);
        return err(&req.id, "db_open_failed", format!("{e:?}"), None);
    }
    ok(&req.id, session_json(&session))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let token = match required_str(req, "token") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let logged_out = state.end_session(&token);
    ok(&req.id, json!({ "loggedOut": logged_out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.guest" => Some(handle_guest(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        _ => None,
    }
}
