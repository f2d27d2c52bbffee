use crate::directory::{self, DirectoryImport};
use crate::error::RecordsResult;
use crate::ipc::helpers::{run, Reply};
use crate::ipc::types::{AppState, Request};
use crate::tenant::Tenant;
use rusqlite::Connection;
use serde_json::{json, Value};

fn import(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let payload: DirectoryImport = serde_json::from_value(params.clone())?;
    let summary = directory::import(conn, tenant, &payload)?;
    Ok(("Directory imported", json!(summary)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "directory.import" => Some(run(state, req, "directory", import)),
        _ => None,
    }
}
