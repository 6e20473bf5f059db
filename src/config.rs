use anyhow::{anyhow, Context};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const ENV_MASTER_KEY: &str = "MARKSD_MASTER_KEY";
pub const ENV_GUEST_LOGIN: &str = "MARKSD_GUEST_LOGIN";
pub const ENV_SESSION_TTL_MINUTES: &str = "MARKSD_SESSION_TTL_MINUTES";
pub const ENV_WORKSPACE: &str = "MARKSD_WORKSPACE";

const DEFAULT_SESSION_TTL_MINUTES: i64 = 12 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// SHA-256 of the teacher master key; `None` disables teacher login.
    pub master_key_sha256: Option<String>,
    pub guest_login: bool,
    pub session_ttl_minutes: i64,
    pub workspace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_key_sha256: None,
            guest_login: true,
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            workspace: None,
        }
    }
}

pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(key) = lookup(ENV_MASTER_KEY).filter(|v| !v.trim().is_empty()) {
            cfg.master_key_sha256 = Some(sha256_hex(key.trim()));
        }

        if let Some(raw) = lookup(ENV_GUEST_LOGIN) {
            cfg.guest_login = parse_bool(&raw)
                .ok_or_else(|| anyhow!("{} must be true/false, got {:?}", ENV_GUEST_LOGIN, raw))?;
        }

        if let Some(raw) = lookup(ENV_SESSION_TTL_MINUTES) {
            let minutes: i64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer", ENV_SESSION_TTL_MINUTES))?;
            if minutes <= 0 {
                return Err(anyhow!("{} must be > 0", ENV_SESSION_TTL_MINUTES));
            }
            cfg.session_ttl_minutes = minutes;
        }

        cfg.workspace = lookup(ENV_WORKSPACE)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(cfg)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = cfg(&[]).expect("config");
        assert!(c.master_key_sha256.is_none());
        assert!(c.guest_login);
        assert_eq!(c.session_ttl_minutes, 720);
        assert!(c.workspace.is_none());
    }

    #[test]
    fn master_key_is_held_as_digest() {
        let c = cfg(&[(ENV_MASTER_KEY, " s3cret ")]).expect("config");
        let digest = c.master_key_sha256.expect("digest");
        assert_eq!(digest, sha256_hex("s3cret"));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, "s3cret");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(cfg(&[(ENV_GUEST_LOGIN, "maybe")]).is_err());
        assert!(cfg(&[(ENV_SESSION_TTL_MINUTES, "0")]).is_err());
        assert!(cfg(&[(ENV_SESSION_TTL_MINUTES, "ten")]).is_err());
        assert!(!cfg(&[(ENV_GUEST_LOGIN, "off")]).expect("config").guest_login);
    }
}
