use crate::error::{RecordsError, RecordsResult};
use crate::ipc::helpers::{get_required_str, run, Reply};
use crate::ipc::types::{AppState, Request};
use crate::settings::{load_section, update_section, SetupSection};
use crate::tenant::Tenant;
use log::{info, warn};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn setup_get(conn: &Connection, tenant: &Tenant, _params: &Value) -> RecordsResult<Reply> {
    let mut out = Map::new();
    for section in SetupSection::ALL {
        let v = load_section(conn, tenant, section)
            .map_err(|e| RecordsError::internal("db_query_failed", e.to_string()))?;
        out.insert(section.name().to_string(), v);
    }
    Ok(("Setup fetched", Value::Object(out)))
}

fn setup_update(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let section_raw = get_required_str(params, "section")?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| RecordsError::validation(format!("unknown section: {section_raw}")))?;
    let patch_obj = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| RecordsError::validation("patch must be an object"))?;

    match update_section(conn, tenant, section, patch_obj)
        .map_err(|e| RecordsError::internal("db_update_failed", e.to_string()))?
    {
        Ok(saved) => {
            info!(
                "event=setup_update module=setup status=ok tenant={} caller={} section={} fields={}",
                tenant.domain(),
                tenant.caller(),
                section.name(),
                patch_obj.len()
            );
            Ok(("Setup updated", json!({ section.name(): saved })))
        }
        Err(msg) => {
            warn!(
                "event=setup_update module=setup status=rejected tenant={} section={} message={}",
                tenant.domain(),
                section.name(),
                msg
            );
            Err(RecordsError::validation(msg))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: fn(&Connection, &Tenant, &Value) -> RecordsResult<Reply> = match req.method.as_str() {
        "setup.get" => setup_get,
        "setup.update" => setup_update,
        _ => return None,
    };
    Some(run(state, req, "setup", op))
}
