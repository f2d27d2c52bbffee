use crate::error::{RecordsError, RecordsResult};
use crate::ipc::error::{err, fail, ok};
use crate::ipc::types::{AppState, Request};
use crate::marks::ExamType;
use crate::settings::{AttendancePolicy, ReportPolicy};
use crate::tenant::{Coordinate, Tenant};
use log::{error, warn};
use rusqlite::Connection;
use serde_json::Value;

/// Success message plus payload for the `data` field.
pub type Reply = (&'static str, Value);

pub fn get_required_str<'a>(params: &'a Value, key: &str) -> RecordsResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RecordsError::validation(format!("missing {key}")))
}

pub fn get_optional_str<'a>(params: &'a Value, key: &str) -> RecordsResult<Option<&'a str>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim()).filter(|s| !s.is_empty())),
        Some(_) => Err(RecordsError::validation(format!("{key} must be a string"))),
    }
}

pub fn get_required_number(params: &Value, key: &str) -> RecordsResult<f64> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| RecordsError::validation(format!("{key} must be a number")))
}

pub fn get_entries<'a>(params: &'a Value) -> RecordsResult<&'a Vec<Value>> {
    params
        .get("entries")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| RecordsError::validation("entries must be a non-empty list"))
}

pub fn coordinate(params: &Value) -> RecordsResult<Coordinate> {
    Coordinate::new(
        get_required_str(params, "sectionId")?,
        get_required_str(params, "courseId")?,
        get_required_str(params, "facultyId")?,
    )
}

pub fn exam_type(params: &Value) -> RecordsResult<ExamType> {
    let raw = get_required_str(params, "examType")?;
    ExamType::parse(raw).ok_or_else(|| {
        RecordsError::validation_code("unknown_exam_type", format!("unknown examType: {raw}"))
    })
}

pub fn attendance_policy(conn: &Connection, tenant: &Tenant) -> RecordsResult<AttendancePolicy> {
    AttendancePolicy::load(conn, tenant)
        .map_err(|e| RecordsError::internal("db_query_failed", e.to_string()))
}

pub fn report_policy(conn: &Connection, tenant: &Tenant) -> RecordsResult<ReportPolicy> {
    ReportPolicy::load(conn, tenant)
        .map_err(|e| RecordsError::internal("db_query_failed", e.to_string()))
}

fn tenant_of(req: &Request) -> RecordsResult<Tenant> {
    Tenant::new(req.tenant.as_deref().unwrap_or(""), req.caller.as_deref())
}

/// Runs a tenant-scoped operation against the open workspace and wraps the
/// outcome in the response envelope. Failures are logged here, once.
pub fn run<F>(state: &AppState, req: &Request, module: &str, op: F) -> Value
where
    F: FnOnce(&Connection, &Tenant, &Value) -> RecordsResult<Reply>,
{
    let Some(conn) = state.db.as_ref() else {
        warn!(
            "event=request_failed module={} method={} status=400 code=no_workspace",
            module, req.method
        );
        return err(&req.id, 400, "no_workspace", "select a workspace first", None);
    };
    let tenant = match tenant_of(req) {
        Ok(t) => t,
        Err(e) => {
            log_failure(module, req, None, &e);
            return fail(&req.id, &e);
        }
    };
    match op(conn, &tenant, &req.params) {
        Ok((message, data)) => ok(&req.id, message, data),
        Err(e) => {
            log_failure(module, req, Some(&tenant), &e);
            fail(&req.id, &e)
        }
    }
}

fn log_failure(module: &str, req: &Request, tenant: Option<&Tenant>, e: &RecordsError) {
    let (domain, caller) = tenant.map_or(("-", "-"), |t| (t.domain(), t.caller()));
    if e.is_internal() {
        error!(
            "event=request_failed module={} method={} status={} code={} tenant={} caller={} error={}",
            module,
            req.method,
            e.status(),
            e.code(),
            domain,
            caller,
            e
        );
    } else {
        warn!(
            "event=request_failed module={} method={} status={} code={} tenant={} caller={} message={}",
            module,
            req.method,
            e.status(),
            e.code(),
            domain,
            caller,
            e
        );
    }
}
