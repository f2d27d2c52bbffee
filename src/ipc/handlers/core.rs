use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use log::{error, info};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        "ok",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, 400, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, path) {
        Ok(path) => ok(
            &req.id,
            "Workspace selected",
            json!({ "workspacePath": path.to_string_lossy() }),
        ),
        Err(e) => err(&req.id, 500, "db_open_failed", format!("{e:#}"), None),
    }
}

/// Opens (creating if needed) the workspace database and makes it current.
pub fn select_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<PathBuf> {
    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            info!(
                "event=workspace_select module=core status=ok path={}",
                path.display()
            );
            Ok(path)
        }
        Err(e) => {
            error!(
                "event=workspace_select module=core status=failed path={} error={:#}",
                path.display(),
                e
            );
            Err(e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
