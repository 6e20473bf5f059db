#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MASTER_KEY: &str = "staffroom-key";
pub const TEST_DATE: &str = "2026-03-14";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub token: Option<String>,
}

impl Sidecar {
    pub fn spawn() -> Self {
        Self::spawn_with(&[])
    }

    /// Extra env vars override the defaults (master key set, guests allowed).
    pub fn spawn_with(envs: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_marksd");
        let mut cmd = Command::new(exe);
        cmd.env_remove("MARKSD_WORKSPACE")
            .env_remove("MARKSD_GUEST_LOGIN")
            .env_remove("MARKSD_SESSION_TTL_MINUTES")
            .env("MARKSD_MASTER_KEY", MASTER_KEY);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn marksd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            token: None,
        }
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Sends the request as-is, without adding the session token.
    pub fn raw(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn call(&mut self, method: &str, mut params: serde_json::Value) -> serde_json::Value {
        if let (Some(token), Some(obj)) = (self.token.clone(), params.as_object_mut()) {
            obj.entry("token").or_insert(json!(token));
        }
        self.raw(method, params)
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.call(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let resp = self.call(method, params);
        assert_eq!(resp["ok"], false, "{} unexpectedly succeeded: {}", method, resp);
        resp["error"]["code"].as_str().unwrap_or("").to_string()
    }

    pub fn login_teacher(&mut self) {
        let result = self.ok("auth.login", json!({ "key": MASTER_KEY }));
        self.token = result["token"].as_str().map(str::to_string);
        assert!(self.token.is_some());
    }

    pub fn open_workspace(&mut self, prefix: &str) -> PathBuf {
        let workspace = temp_dir(prefix);
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        workspace
    }

    pub fn add_student(&mut self, name: &str, standard: &str, subjects: &[&str]) -> String {
        let result = self.ok(
            "students.create",
            json!({ "name": name, "standard": standard, "subjects": subjects }),
        );
        result["student"]["id"]
            .as_str()
            .expect("student id")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Teacher session on a fresh workspace.
pub fn ready(prefix: &str) -> Sidecar {
    let mut s = Sidecar::spawn();
    s.login_teacher();
    s.open_workspace(prefix);
    s
}
