use crate::error::RecordsResult;
use crate::ipc::helpers::{
    coordinate, exam_type, get_optional_str, get_required_str, report_policy, run, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use crate::tenant::Tenant;
use rusqlite::Connection;
use serde_json::{json, Value};

fn student_attendance(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let report = reports::student_attendance(
        conn,
        tenant,
        get_required_str(params, "studentId")?,
        get_optional_str(params, "courseId")?,
    )?;
    Ok(("Student attendance computed", json!(report)))
}

fn section_attendance(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let report = reports::section_attendance(conn, tenant, &coordinate(params)?)?;
    Ok(("Section attendance computed", json!(report)))
}

fn attendance_trend(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let months = reports::attendance_trend(
        conn,
        tenant,
        get_optional_str(params, "studentId")?,
        get_optional_str(params, "sectionId")?,
    )?;
    Ok(("Attendance trend computed", json!({ "months": months })))
}

fn grade_distribution(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let dist = reports::grade_distribution(conn, tenant, &coordinate(params)?, exam_type(params)?)?;
    Ok(("Grade distribution computed", json!(dist)))
}

fn student_gpa(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let gpa = reports::student_gpa(
        conn,
        tenant,
        get_required_str(params, "studentId")?,
        &report_policy(conn, tenant)?,
    )?;
    Ok(("GPA computed", json!(gpa)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: fn(&Connection, &Tenant, &Value) -> RecordsResult<Reply> = match req.method.as_str() {
        "reports.studentAttendance" => student_attendance,
        "reports.sectionAttendance" => section_attendance,
        "reports.attendanceTrend" => attendance_trend,
        "reports.gradeDistribution" => grade_distribution,
        "reports.studentGpa" => student_gpa,
        _ => return None,
    };
    Some(run(state, req, "reports", op))
}
