use crate::attendance::{self, AttendanceBatch, AttendanceEntry, AttendanceStatus};
use crate::datekey::DayKey;
use crate::error::{RecordsError, RecordsResult};
use crate::ipc::helpers::{
    attendance_policy, coordinate, get_entries, get_optional_str, get_required_str, run, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::tenant::Tenant;
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_batch(params: &Value) -> RecordsResult<AttendanceBatch> {
    let coord = coordinate(params)?;
    let date = DayKey::from_json(params.get("date"), "date")?;
    let mut entries = Vec::new();
    for (idx, raw) in get_entries(params)?.iter().enumerate() {
        let student_id = get_required_str(raw, "studentId")
            .map_err(|e| e.with_details(json!({ "entryIndex": idx })))?;
        let status_raw = get_required_str(raw, "status")
            .map_err(|e| e.with_details(json!({ "entryIndex": idx })))?;
        let status = AttendanceStatus::parse(status_raw).ok_or_else(|| {
            RecordsError::validation("status must be Present or Absent")
                .with_details(json!({ "entryIndex": idx, "status": status_raw }))
        })?;
        entries.push(AttendanceEntry {
            student_id: student_id.to_string(),
            status,
            date: DayKey::from_json_opt(raw.get("date"), "entries[].date")?,
        });
    }
    Ok(AttendanceBatch {
        coord,
        date,
        entries,
    })
}

fn bulk_mark(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let batch = parse_batch(params)?;
    let summary = attendance::mark_batch(conn, tenant, &batch, &attendance_policy(conn, tenant)?)?;
    Ok(("Attendance marked successfully", json!(summary)))
}

fn bulk_update(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let batch = parse_batch(params)?;
    let summary = attendance::update_batch(conn, tenant, &batch, &attendance_policy(conn, tenant)?)?;
    Ok(("Attendance updated successfully", json!(summary)))
}

fn check(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let day = DayKey::from_json(params.get("date"), "date")?;
    let exists = attendance::check_exists(conn, tenant, &coord, day)?;
    Ok(("Attendance check completed", json!({ "exists": exists })))
}

fn by_date(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let section_id = get_required_str(params, "sectionId")?;
    let day = DayKey::from_json(params.get("date"), "date")?;
    let rows = attendance::get_by_date(
        conn,
        tenant,
        section_id,
        day,
        get_optional_str(params, "courseId")?,
        get_optional_str(params, "facultyId")?,
    )?;
    Ok(("Attendance fetched successfully", json!({ "attendance": rows })))
}

fn history(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let days = attendance::history(conn, tenant, &coord)?;
    Ok((
        "Attendance history fetched successfully",
        json!({ "attendanceDates": days }),
    ))
}

fn is_marked(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let dates = attendance::is_marked(conn, tenant, &coord, &attendance_policy(conn, tenant)?)?;
    Ok(("Marked dates fetched successfully", json!({ "dates": dates })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: fn(&Connection, &Tenant, &Value) -> RecordsResult<Reply> = match req.method.as_str() {
        "attendance.bulkMark" => bulk_mark,
        "attendance.bulkUpdate" => bulk_update,
        "attendance.check" => check,
        "attendance.byDate" => by_date,
        "attendance.history" => history,
        "attendance.isMarked" => is_marked,
        _ => return None,
    };
    Some(run(state, req, "attendance", op))
}
