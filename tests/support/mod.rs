#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub const TENANT: &str = "uni.edu";

/// A running `recordsd` with a fresh workspace selected.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    pub fn start() -> Self {
        let workspace = tempfile::tempdir().expect("temp workspace");
        let exe = env!("CARGO_BIN_EXE_recordsd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("RECORDSD_WORKSPACE")
            .env_remove("RECORDSD_LOG_DIR")
            .env("RECORDSD_LOG_LEVEL", "warn")
            .spawn()
            .expect("spawn recordsd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        let mut sidecar = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace,
        };
        let path = sidecar.workspace.path().to_string_lossy().to_string();
        sidecar.ok("workspace.select", json!({ "path": path }));
        sidecar
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call_as(&mut self, tenant: Option<&str>, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
            "caller": "fac-1@uni.edu",
        });
        if let Some(t) = tenant {
            payload["tenant"] = json!(t);
        }
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        self.call_as(Some(TENANT), method, params)
    }

    /// Calls and asserts success, returning `data`.
    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("data").cloned().unwrap_or(Value::Null)
    }

    /// Calls and asserts failure, returning `(code, error.code)`.
    pub fn fails(&mut self, method: &str, params: Value) -> (u64, String) {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        let status = value.get("code").and_then(|v| v.as_u64()).unwrap_or(0);
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        (status, code)
    }

    pub fn seed(&mut self) {
        self.ok("directory.import", seed_payload());
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn seed_payload() -> Value {
    json!({
        "semesters": [
            { "id": "sem-1", "name": "Spring 2024", "startDate": "2024-01-08", "endDate": "2024-05-31" }
        ],
        "sections": [
            { "id": "sec-a", "name": "CSE-A", "semesterId": "sem-1" }
        ],
        "courses": [
            { "id": "crs-math", "name": "Mathematics", "code": "MA101", "credits": 4 },
            { "id": "crs-phys", "name": "Physics", "code": "PH101", "credits": 3 }
        ],
        "faculty": [
            { "id": "fac-1", "name": "Dr. Iyer" },
            { "id": "fac-2", "name": "Dr. Osei" }
        ],
        "students": [
            { "id": "stu-1", "name": "Bilal Khan", "sectionId": "sec-a", "rollNo": "01" },
            { "id": "stu-2", "name": "Chen Wei", "sectionId": "sec-a", "rollNo": "02" },
            { "id": "stu-3", "name": "Asha Rao", "sectionId": "sec-a", "rollNo": "03" }
        ],
        "mappings": [
            { "sectionId": "sec-a", "courseId": "crs-math", "facultyId": "fac-1" },
            { "sectionId": "sec-a", "courseId": "crs-phys", "facultyId": "fac-2" }
        ]
    })
}

pub fn math() -> Value {
    json!({ "sectionId": "sec-a", "courseId": "crs-math", "facultyId": "fac-1" })
}

/// `base` with `extra`'s keys laid over it.
pub fn with(base: Value, extra: Value) -> Value {
    let mut out = base;
    if let (Some(o), Some(e)) = (out.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            o.insert(k.clone(), v.clone());
        }
    }
    out
}
