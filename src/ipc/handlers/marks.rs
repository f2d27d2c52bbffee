use crate::error::{RecordsError, RecordsResult};
use crate::ipc::helpers::{
    attendance_policy, coordinate, exam_type, get_entries, get_optional_str, get_required_number,
    get_required_str, run, Reply,
};
use crate::ipc::types::{AppState, Request};
use crate::marks::{self, MarksBatch, MarksEntry};
use crate::tenant::Tenant;
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_batch(params: &Value) -> RecordsResult<MarksBatch> {
    let coord = coordinate(params)?;
    let exam_type = exam_type(params)?;
    let total_marks = get_required_number(params, "totalMarks")?;
    let passing_marks = get_required_number(params, "passingMarks")?;
    let remarks = get_optional_str(params, "remarks")?.map(str::to_string);

    let mut entries = Vec::new();
    for (idx, raw) in get_entries(params)?.iter().enumerate() {
        let at = |e: RecordsError| e.with_details(json!({ "entryIndex": idx }));
        entries.push(MarksEntry {
            student_id: get_required_str(raw, "studentId").map_err(at)?.to_string(),
            marks_scored: get_required_number(raw, "marksScored").map_err(at)?,
            // An explicit empty string clears the batch remark for this student.
            remarks: match raw.get("remarks") {
                Some(Value::String(s)) => Some(s.clone()),
                None | Some(Value::Null) => None,
                Some(_) => {
                    return Err(at(RecordsError::validation("remarks must be a string")));
                }
            },
        });
    }
    Ok(MarksBatch {
        coord,
        exam_type,
        total_marks,
        passing_marks,
        remarks,
        entries,
    })
}

fn bulk_add(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let batch = parse_batch(params)?;
    let enforce_mappings = attendance_policy(conn, tenant)?.enforce_mappings;
    let summary = marks::add_batch(conn, tenant, &batch, enforce_mappings)?;
    Ok(("Marks added successfully", json!(summary)))
}

fn bulk_update(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let batch = parse_batch(params)?;
    let enforce_mappings = attendance_policy(conn, tenant)?.enforce_mappings;
    let summary = marks::update_batch(conn, tenant, &batch, enforce_mappings)?;
    Ok(("Marks updated successfully", json!(summary)))
}

fn by_exam_type(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let rows = marks::get_by_exam_type(conn, tenant, &coord, exam_type(params)?)?;
    Ok(("Marks fetched successfully", json!({ "marks": rows })))
}

fn exam_types(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let types = marks::list_exam_types(conn, tenant, &coord)?;
    Ok(("Exam types fetched successfully", json!({ "examTypes": types })))
}

fn delete_by_exam_type(conn: &Connection, tenant: &Tenant, params: &Value) -> RecordsResult<Reply> {
    let coord = coordinate(params)?;
    let deleted = marks::delete_by_exam_type(conn, tenant, &coord, exam_type(params)?)?;
    Ok(("Marks deleted successfully", json!({ "deletedCount": deleted })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op: fn(&Connection, &Tenant, &Value) -> RecordsResult<Reply> = match req.method.as_str() {
        "marks.bulkAdd" => bulk_add,
        "marks.bulkUpdate" => bulk_update,
        "marks.byExamType" => by_exam_type,
        "marks.examTypes" => exam_types,
        "marks.deleteByExamType" => delete_by_exam_type,
        _ => return None,
    };
    Some(run(state, req, "marks", op))
}
