//! Attendance recorder.
//!
//! One row per (tenant, section, course, faculty, student, day). `mark_batch`
//! refuses a day that already has rows for the coordinate; `update_batch`
//! upserts unconditionally. Each batch runs in a single transaction.

use crate::datekey::{now_timestamp, DayKey};
use crate::error::{RecordsError, RecordsResult};
use crate::settings::AttendancePolicy;
use crate::tenant::{
    require_id, verify_batch_references, Coordinate, ReferenceResolver, SqliteReferences, Tenant,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "p" => Some(Self::Present),
            "absent" | "a" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
        }
    }

    fn from_stored(raw: &str) -> RecordsResult<Self> {
        Self::parse(raw).ok_or_else(|| {
            RecordsError::internal(
                "invalid_persisted_data",
                format!("unknown attendance status `{raw}`"),
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
    /// Overrides the batch day for this entry.
    pub date: Option<DayKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceBatch {
    pub coord: Coordinate,
    pub date: DayKey,
    pub entries: Vec<AttendanceEntry>,
}

impl AttendanceBatch {
    fn validate(&self) -> RecordsResult<()> {
        if self.entries.is_empty() {
            return Err(RecordsError::validation(
                "attendance entries must be a non-empty list",
            ));
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.student_id.trim().is_empty() {
                return Err(RecordsError::validation("missing studentId")
                    .with_details(json!({ "entryIndex": idx })));
            }
        }
        Ok(())
    }

    fn student_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.student_id.as_str()).collect()
    }
}

/// Aggregate outcome of a batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    /// Rows that already existed for the entry's key.
    pub matched: u64,
    /// Matched rows whose stored value changed.
    pub modified: u64,
    /// Rows inserted.
    pub upserted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: String,
    pub section_id: String,
    pub course_id: String,
    pub faculty_id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub roll_no: Option<String>,
    pub date: DayKey,
    pub status: AttendanceStatus,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAggregate {
    pub day: DayKey,
    pub count: u64,
    pub present_count: u64,
    pub absent_count: u64,
}

pub fn mark_batch(
    conn: &Connection,
    tenant: &Tenant,
    batch: &AttendanceBatch,
    policy: &AttendancePolicy,
) -> RecordsResult<WriteSummary> {
    write_batch(conn, tenant, batch, policy, true)
}

pub fn update_batch(
    conn: &Connection,
    tenant: &Tenant,
    batch: &AttendanceBatch,
    policy: &AttendancePolicy,
) -> RecordsResult<WriteSummary> {
    write_batch(conn, tenant, batch, policy, false)
}

fn write_batch(
    conn: &Connection,
    tenant: &Tenant,
    batch: &AttendanceBatch,
    policy: &AttendancePolicy,
    guard_day: bool,
) -> RecordsResult<WriteSummary> {
    let started_at = Instant::now();
    let op = if guard_day { "mark" } else { "update" };
    batch.validate()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(RecordsError::db("db_tx_failed"))?;
    verify_batch_references(
        &SqliteReferences::new(&tx),
        tenant,
        &batch.coord,
        &batch.student_ids(),
        policy.enforce_mappings,
    )?;

    if guard_day && day_has_records(&tx, tenant, &batch.coord, batch.date)? {
        return Err(
            RecordsError::conflict("attendance already marked for this day").with_details(json!({
                "sectionId": batch.coord.section_id,
                "courseId": batch.coord.course_id,
                "facultyId": batch.coord.faculty_id,
                "date": batch.date
            })),
        );
    }

    let mut summary = WriteSummary::default();
    let now = now_timestamp();
    for entry in &batch.entries {
        let day = entry.date.unwrap_or(batch.date);
        let existing: Option<String> = tx
            .query_row(
                "SELECT status FROM attendance
                 WHERE institution_domain = ? AND section_id = ? AND course_id = ?
                   AND faculty_id = ? AND student_id = ? AND date = ?",
                (
                    tenant.domain(),
                    &batch.coord.section_id,
                    &batch.coord.course_id,
                    &batch.coord.faculty_id,
                    &entry.student_id,
                    day.to_storage(),
                ),
                |r| r.get(0),
            )
            .optional()
            .map_err(RecordsError::db("db_query_failed"))?;

        match existing {
            None => {
                insert_row(&tx, tenant, &batch.coord, &entry.student_id, day, entry.status, &now)?;
                summary.upserted += 1;
            }
            Some(stored) => {
                summary.matched += 1;
                if AttendanceStatus::from_stored(&stored)? != entry.status {
                    tx.execute(
                        "UPDATE attendance SET status = ?, updated_at = ?
                         WHERE institution_domain = ? AND section_id = ? AND course_id = ?
                           AND faculty_id = ? AND student_id = ? AND date = ?",
                        (
                            entry.status.as_str(),
                            &now,
                            tenant.domain(),
                            &batch.coord.section_id,
                            &batch.coord.course_id,
                            &batch.coord.faculty_id,
                            &entry.student_id,
                            day.to_storage(),
                        ),
                    )
                    .map_err(RecordsError::db("db_update_failed"))?;
                    summary.modified += 1;
                }
            }
        }
    }

    tx.commit().map_err(RecordsError::db("db_commit_failed"))?;
    info!(
        "event=attendance_{} module=attendance status=ok tenant={} caller={} section={} course={} faculty={} date={} entries={} matched={} modified={} upserted={} duration_ms={}",
        op,
        tenant.domain(),
        tenant.caller(),
        batch.coord.section_id,
        batch.coord.course_id,
        batch.coord.faculty_id,
        batch.date,
        batch.entries.len(),
        summary.matched,
        summary.modified,
        summary.upserted,
        started_at.elapsed().as_millis()
    );
    Ok(summary)
}

/// A UNIQUE hit here means a concurrent batch wrote the same student and day
/// first; it surfaces as `Conflict` naming the record.
fn insert_row(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    student_id: &str,
    day: DayKey,
    status: AttendanceStatus,
    now: &str,
) -> RecordsResult<()> {
    conn.execute(
        "INSERT INTO attendance(
            id, institution_domain, section_id, course_id, faculty_id,
            student_id, date, status, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            tenant.domain(),
            &coord.section_id,
            &coord.course_id,
            &coord.faculty_id,
            student_id,
            day.to_storage(),
            status.as_str(),
            now,
        ),
    )
    .map_err(RecordsError::db("db_insert_failed"))
    .map_err(|e| {
        e.with_details(json!({
            "sectionId": coord.section_id,
            "courseId": coord.course_id,
            "facultyId": coord.faculty_id,
            "studentId": student_id,
            "date": day
        }))
    })?;
    Ok(())
}

fn day_has_records(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    day: DayKey,
) -> RecordsResult<bool> {
    let (start, end) = day.range()?;
    conn.query_row(
        "SELECT 1 FROM attendance
         WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
           AND date >= ? AND date < ?
         LIMIT 1",
        (
            tenant.domain(),
            &coord.section_id,
            &coord.course_id,
            &coord.faculty_id,
            start,
            end,
        ),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(RecordsError::db("db_query_failed"))
}

pub fn check_exists(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    day: DayKey,
) -> RecordsResult<bool> {
    day_has_records(conn, tenant, coord, day)
}

/// Every day with at least one record for the coordinate, bounded by the
/// section's semester window. Unset window edges fall back to the policy
/// defaults.
pub fn is_marked(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    policy: &AttendancePolicy,
) -> RecordsResult<Vec<DayKey>> {
    let refs = SqliteReferences::new(conn);
    let section = refs
        .section(tenant, &coord.section_id)?
        .ok_or_else(|| RecordsError::not_found("section not found"))?;
    let semester_id = section
        .semester_id
        .ok_or_else(|| RecordsError::not_found("semester not found for section"))?;
    let window = refs
        .semester_window(tenant, &semester_id)?
        .ok_or_else(|| RecordsError::not_found("semester not found for section"))?;

    let start = DayKey::from_date(window.start.unwrap_or(policy.default_window_start));
    let end = DayKey::from_date(window.end.unwrap_or(policy.default_window_end));

    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT date FROM attendance
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
               AND date >= ? AND date < ?
             ORDER BY date",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let raw = stmt
        .query_map(
            (
                tenant.domain(),
                &coord.section_id,
                &coord.course_id,
                &coord.faculty_id,
                start.to_storage(),
                end.range()?.1,
            ),
            |r| r.get::<_, i64>(0),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;
    raw.into_iter().map(stored_day).collect()
}

/// Rows for one section and day; course and faculty narrow the result when given.
pub fn get_by_date(
    conn: &Connection,
    tenant: &Tenant,
    section_id: &str,
    day: DayKey,
    course_id: Option<&str>,
    faculty_id: Option<&str>,
) -> RecordsResult<Vec<AttendanceRow>> {
    let section_id = require_id(section_id, "sectionId")?;
    let (start, end) = day.range()?;
    let mut sql = String::from(
        "SELECT a.id, a.section_id, a.course_id, a.faculty_id, a.student_id,
                s.name, s.roll_no, a.date, a.status, a.created_at, a.updated_at
         FROM attendance a
         LEFT JOIN students s
           ON s.institution_domain = a.institution_domain AND s.id = a.student_id
         WHERE a.institution_domain = ? AND a.section_id = ? AND a.date >= ? AND a.date < ?",
    );
    let mut bind: Vec<Value> = vec![
        Value::Text(tenant.domain().to_string()),
        Value::Text(section_id),
        Value::Integer(start),
        Value::Integer(end),
    ];
    if let Some(c) = course_id.map(str::trim).filter(|c| !c.is_empty()) {
        sql.push_str(" AND a.course_id = ?");
        bind.push(Value::Text(c.to_string()));
    }
    if let Some(f) = faculty_id.map(str::trim).filter(|f| !f.is_empty()) {
        sql.push_str(" AND a.faculty_id = ?");
        bind.push(Value::Text(f.to_string()));
    }
    sql.push_str(" ORDER BY s.name COLLATE NOCASE, a.student_id, a.course_id");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(RecordsError::db("db_query_failed"))?;
    let raw = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, i64>(7)?,
                r.get::<_, String>(8)?,
                r.get::<_, String>(9)?,
                r.get::<_, Option<String>>(10)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    raw.into_iter()
        .map(
            |(id, section_id, course_id, faculty_id, student_id, name, roll, date, status, created, updated)| {
                Ok(AttendanceRow {
                    id,
                    section_id,
                    course_id,
                    faculty_id,
                    student_id,
                    student_name: name,
                    roll_no: roll,
                    date: stored_day(date)?,
                    status: AttendanceStatus::from_stored(&status)?,
                    created_at: created,
                    updated_at: updated,
                })
            },
        )
        .collect()
}

/// Per-day totals for a coordinate, newest day first.
pub fn history(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
) -> RecordsResult<Vec<DayAggregate>> {
    let mut stmt = conn
        .prepare(
            "SELECT date,
                    COUNT(*),
                    SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'Absent' THEN 1 ELSE 0 END)
             FROM attendance
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
             GROUP BY date
             ORDER BY date DESC",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let raw = stmt
        .query_map(
            (
                tenant.domain(),
                &coord.section_id,
                &coord.course_id,
                &coord.faculty_id,
            ),
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    raw.into_iter()
        .map(|(date, count, present, absent)| {
            Ok(DayAggregate {
                day: stored_day(date)?,
                count: count.max(0) as u64,
                present_count: present.max(0) as u64,
                absent_count: absent.max(0) as u64,
            })
        })
        .collect()
}

pub(crate) fn stored_day(secs: i64) -> RecordsResult<DayKey> {
    DayKey::from_storage(secs).ok_or_else(|| {
        RecordsError::internal(
            "invalid_persisted_data",
            format!("attendance date out of range: {secs}"),
        )
    })
}
