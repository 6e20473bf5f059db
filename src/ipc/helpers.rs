//! Param parsing and error mapping shared by the handlers. Every helper
//! returns the ready-made error response on failure.

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{self, is_known_standard, is_known_subject};
use crate::reconcile::ValidationError;
use crate::session::AuthError;
use crate::store::StoreError;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

/// The store this request's session works in: a guest's private store, or
/// the selected workspace.
pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    let token = req.params.get("token").and_then(|v| v.as_str());
    state
        .conn_for(token)
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Blank strings and the `"all"` filter value read as absent.
pub fn optional_filter(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        .map(str::to_string)
}

/// `null`/missing is `None`; anything else must be a number.
pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", key),
                Some(json!({ key: v })),
            )
        }),
    }
}

pub fn optional_date(req: &Request, key: &str) -> Result<Option<NaiveDate>, serde_json::Value> {
    let raw = match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v,
        _ => return Ok(None),
    };
    model::parse_date(raw).map(Some).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
            Some(json!({ key: raw })),
        )
    })
}

pub fn required_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    optional_date(req, key)?
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn bool_flag(req: &Request, key: &str) -> bool {
    req.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Rejects a standard or subject outside the school's fixed sets.
pub fn check_class_subject(
    req: &Request,
    standard: &str,
    subject: Option<&str>,
) -> Result<(), serde_json::Value> {
    if !is_known_standard(standard) {
        return Err(err(
            &req.id,
            "validation_failed",
            format!("unknown standard: {}", standard),
            Some(json!({ "standard": standard, "allowed": model::STANDARDS })),
        ));
    }
    if let Some(subject) = subject {
        if !is_known_subject(subject) {
            return Err(err(
                &req.id,
                "validation_failed",
                format!("unknown subject: {}", subject),
                Some(json!({ "subject": subject, "allowed": model::SUBJECTS })),
            ));
        }
    }
    Ok(())
}

pub fn store_err(req: &Request, e: StoreError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn validation_err(req: &Request, e: ValidationError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), e.details())
}

pub fn auth_err(req: &Request, e: AuthError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}
