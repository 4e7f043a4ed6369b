#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn admin() -> serde_json::Value {
    json!({ "userId": "admin-1", "role": "admin" })
}

pub fn teacher(user_id: &str) -> serde_json::Value {
    json!({ "userId": user_id, "role": "teacher" })
}

pub fn student(user_id: &str) -> serde_json::Value {
    json!({ "userId": user_id, "role": "student" })
}

/// Spawns the daemon without selecting a workspace.
pub fn spawn_bare() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    let workspace = tempfile::tempdir().expect("tempdir");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
        workspace,
    }
}

/// Spawns the daemon and selects a fresh workspace.
pub fn spawn_sidecar() -> Sidecar {
    let mut sidecar = spawn_bare();
    let path = sidecar.workspace.path().to_string_lossy().to_string();
    sidecar.request_ok("workspace.select", json!({ "path": path }), Some(admin()));
    sidecar
}

impl Sidecar {
    pub fn request(
        &mut self,
        method: &str,
        params: serde_json::Value,
        actor: Option<serde_json::Value>,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(a) = actor {
            payload["actor"] = a;
        }
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Writes one raw line and returns the parsed reply.
    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write raw line");
        self.stdin.flush().expect("flush raw line");
        let mut reply = String::new();
        self.reader.read_line(&mut reply).expect("read response line");
        serde_json::from_str(reply.trim()).expect("parse response json")
    }

    pub fn request_ok(
        &mut self,
        method: &str,
        params: serde_json::Value,
        actor: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let value = self.request(method, params, actor);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Error object of a request that must fail.
    pub fn request_err(
        &mut self,
        method: &str,
        params: serde_json::Value,
        actor: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let value = self.request(method, params, actor);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or_else(|| json!({}))
    }

    /// Creates a classroom and returns its id.
    pub fn classroom(&mut self, name: &str) -> String {
        let created = self.request_ok("classrooms.create", json!({ "name": name }), Some(admin()));
        created["classroomId"]
            .as_str()
            .expect("classroomId")
            .to_string()
    }

    /// Creates a user and returns its id.
    pub fn user(
        &mut self,
        username: &str,
        first_name: &str,
        last_name: &str,
        role: &str,
        classroom_id: Option<&str>,
    ) -> String {
        let mut params = json!({
            "username": username,
            "firstName": first_name,
            "lastName": last_name,
            "role": role,
        });
        if let Some(c) = classroom_id {
            params["classroomId"] = json!(c);
        }
        let created = self.request_ok("users.create", params, Some(admin()));
        created["user"]["id"].as_str().expect("user id").to_string()
    }
}
