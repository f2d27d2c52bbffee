//! Marks recorder.
//!
//! A batch is every row for one (tenant, section, course, faculty, exam type).
//! Score bounds are checked for the whole batch before anything is written.

use crate::datekey::now_timestamp;
use crate::error::{RecordsError, RecordsResult};
use crate::tenant::{verify_batch_references, Coordinate, SqliteReferences, Tenant};
use log::info;
use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, Serializer};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

const REATTEMPT_PREFIX: &str = "Reattempt-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExamKind {
    Midterm1,
    Midterm2,
    Midterm3,
    Final,
    Quiz,
    Assignment,
    Lab,
    FinalLab,
    Observation,
    Attendance,
}

impl ExamKind {
    pub const ALL: [ExamKind; 10] = [
        ExamKind::Midterm1,
        ExamKind::Midterm2,
        ExamKind::Midterm3,
        ExamKind::Final,
        ExamKind::Quiz,
        ExamKind::Assignment,
        ExamKind::Lab,
        ExamKind::FinalLab,
        ExamKind::Observation,
        ExamKind::Attendance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Midterm1 => "Midterm-1",
            Self::Midterm2 => "Midterm-2",
            Self::Midterm3 => "Midterm-3",
            Self::Final => "Final",
            Self::Quiz => "Quiz",
            Self::Assignment => "Assignment",
            Self::Lab => "Lab",
            Self::FinalLab => "Final-Lab",
            Self::Observation => "Observation",
            Self::Attendance => "Attendance",
        }
    }
}

/// An exam kind, optionally as a reattempt. Ordering puts every first
/// attempt before any reattempt, each group in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExamType {
    pub reattempt: bool,
    pub kind: ExamKind,
}

impl ExamType {
    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        let n = REATTEMPT_PREFIX.len();
        let (reattempt, base) = match t.get(..n) {
            Some(head) if head.eq_ignore_ascii_case(REATTEMPT_PREFIX) => (true, &t[n..]),
            _ => (false, t),
        };
        ExamKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(base))
            .map(|kind| Self { reattempt, kind })
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reattempt {
            f.write_str(REATTEMPT_PREFIX)?;
        }
        f.write_str(self.kind.as_str())
    }
}

impl Serialize for ExamType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarksEntry {
    pub student_id: String,
    pub marks_scored: f64,
    /// Overrides the batch remarks for this student.
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarksBatch {
    pub coord: Coordinate,
    pub exam_type: ExamType,
    pub total_marks: f64,
    pub passing_marks: f64,
    pub remarks: Option<String>,
    pub entries: Vec<MarksEntry>,
}

impl MarksBatch {
    /// Checks every bound up front; the first violation rejects the batch.
    fn validate(&self) -> RecordsResult<()> {
        if !(self.total_marks.is_finite() && self.total_marks > 0.0) {
            return Err(RecordsError::validation("totalMarks must be greater than 0")
                .with_details(json!({ "totalMarks": self.total_marks })));
        }
        if !(self.passing_marks.is_finite()
            && self.passing_marks >= 0.0
            && self.passing_marks <= self.total_marks)
        {
            return Err(RecordsError::validation(
                "passingMarks must be between 0 and totalMarks",
            )
            .with_details(json!({
                "passingMarks": self.passing_marks,
                "totalMarks": self.total_marks
            })));
        }
        if self.entries.is_empty() {
            return Err(RecordsError::validation(
                "marks entries must be a non-empty list",
            ));
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for (idx, e) in self.entries.iter().enumerate() {
            if e.student_id.trim().is_empty() {
                return Err(RecordsError::validation("missing studentId")
                    .with_details(json!({ "entryIndex": idx })));
            }
            if !(e.marks_scored.is_finite()
                && e.marks_scored >= 0.0
                && e.marks_scored <= self.total_marks)
            {
                return Err(RecordsError::validation(
                    "marksScored must be between 0 and totalMarks",
                )
                .with_details(json!({
                    "studentId": e.student_id,
                    "marksScored": e.marks_scored,
                    "totalMarks": self.total_marks
                })));
            }
            if !seen.insert(e.student_id.as_str()) {
                return Err(RecordsError::validation_code(
                    "duplicate_student",
                    "student appears more than once in the batch",
                )
                .with_details(json!({ "studentId": e.student_id })));
            }
        }
        Ok(())
    }

    fn student_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.student_id.as_str()).collect()
    }

    fn remarks_for<'a>(&'a self, entry: &'a MarksEntry) -> Option<&'a str> {
        entry
            .remarks
            .as_deref()
            .or(self.remarks.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSummary {
    pub inserted_count: u64,
}

pub use crate::attendance::WriteSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRow {
    pub id: String,
    pub section_id: String,
    pub course_id: String,
    pub faculty_id: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub roll_no: Option<String>,
    pub exam_type: ExamType,
    pub total_marks: f64,
    pub passing_marks: f64,
    pub marks_scored: f64,
    pub remarks: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn batch_exists(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    exam_type: ExamType,
) -> RecordsResult<bool> {
    conn.query_row(
        "SELECT 1 FROM marks
         WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
           AND exam_type = ?
         LIMIT 1",
        (
            tenant.domain(),
            &coord.section_id,
            &coord.course_id,
            &coord.faculty_id,
            exam_type.to_string(),
        ),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(RecordsError::db("db_query_failed"))
}

/// Writes one student's row. Losing a race on `ux_marks_identity` surfaces as
/// `Conflict` naming the record.
fn insert_row(
    conn: &Connection,
    tenant: &Tenant,
    batch: &MarksBatch,
    entry: &MarksEntry,
    now: &str,
) -> RecordsResult<()> {
    conn.execute(
        "INSERT INTO marks(
            id, institution_domain, section_id, course_id, faculty_id, student_id,
            exam_type, total_marks, passing_marks, marks_scored, remarks, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            tenant.domain(),
            &batch.coord.section_id,
            &batch.coord.course_id,
            &batch.coord.faculty_id,
            &entry.student_id,
            batch.exam_type.to_string(),
            batch.total_marks,
            batch.passing_marks,
            entry.marks_scored,
            batch.remarks_for(entry),
            now,
            now,
        ),
    )
    .map_err(RecordsError::db("db_insert_failed"))
    .map_err(|e| {
        e.with_details(json!({
            "sectionId": batch.coord.section_id,
            "courseId": batch.coord.course_id,
            "facultyId": batch.coord.faculty_id,
            "studentId": entry.student_id,
            "examType": batch.exam_type
        }))
    })?;
    Ok(())
}

pub fn add_batch(
    conn: &Connection,
    tenant: &Tenant,
    batch: &MarksBatch,
    enforce_mappings: bool,
) -> RecordsResult<InsertSummary> {
    let started_at = Instant::now();
    batch.validate()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(RecordsError::db("db_tx_failed"))?;
    verify_batch_references(
        &SqliteReferences::new(&tx),
        tenant,
        &batch.coord,
        &batch.student_ids(),
        enforce_mappings,
    )?;
    if batch_exists(&tx, tenant, &batch.coord, batch.exam_type)? {
        return Err(RecordsError::conflict(format!(
            "marks already recorded for {}",
            batch.exam_type
        ))
        .with_details(json!({ "examType": batch.exam_type })));
    }

    let now = now_timestamp();
    let mut inserted: u64 = 0;
    for e in &batch.entries {
        insert_row(&tx, tenant, batch, e, &now)?;
        inserted += 1;
    }
    tx.commit().map_err(RecordsError::db("db_commit_failed"))?;

    info!(
        "event=marks_add module=marks status=ok tenant={} caller={} section={} course={} faculty={} exam_type={} inserted={} duration_ms={}",
        tenant.domain(),
        tenant.caller(),
        batch.coord.section_id,
        batch.coord.course_id,
        batch.coord.faculty_id,
        batch.exam_type,
        inserted,
        started_at.elapsed().as_millis()
    );
    Ok(InsertSummary {
        inserted_count: inserted,
    })
}

/// Rewrites an existing batch. Students missing from the stored batch are
/// added to it; a batch that does not exist at all is `NotFound`.
pub fn update_batch(
    conn: &Connection,
    tenant: &Tenant,
    batch: &MarksBatch,
    enforce_mappings: bool,
) -> RecordsResult<WriteSummary> {
    let started_at = Instant::now();
    batch.validate()?;

    let tx = conn
        .unchecked_transaction()
        .map_err(RecordsError::db("db_tx_failed"))?;
    if !batch_exists(&tx, tenant, &batch.coord, batch.exam_type)? {
        return Err(RecordsError::not_found(format!(
            "no marks recorded for {}",
            batch.exam_type
        ))
        .with_details(json!({ "examType": batch.exam_type })));
    }
    verify_batch_references(
        &SqliteReferences::new(&tx),
        tenant,
        &batch.coord,
        &batch.student_ids(),
        enforce_mappings,
    )?;

    let now = now_timestamp();
    let exam_type = batch.exam_type.to_string();
    let mut summary = WriteSummary::default();
    for e in &batch.entries {
        let remarks = batch.remarks_for(e).map(str::to_string);
        let existing: Option<(f64, f64, f64, Option<String>)> = tx
            .query_row(
                "SELECT total_marks, passing_marks, marks_scored, remarks FROM marks
                 WHERE institution_domain = ? AND section_id = ? AND course_id = ?
                   AND faculty_id = ? AND student_id = ? AND exam_type = ?",
                (
                    tenant.domain(),
                    &batch.coord.section_id,
                    &batch.coord.course_id,
                    &batch.coord.faculty_id,
                    &e.student_id,
                    &exam_type,
                ),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()
            .map_err(RecordsError::db("db_query_failed"))?;

        match existing {
            None => {
                insert_row(&tx, tenant, batch, e, &now)?;
                summary.upserted += 1;
            }
            Some(stored) => {
                summary.matched += 1;
                let incoming = (
                    batch.total_marks,
                    batch.passing_marks,
                    e.marks_scored,
                    remarks.clone(),
                );
                if stored == incoming {
                    continue;
                }
                tx.execute(
                    "UPDATE marks SET
                        total_marks = ?, passing_marks = ?, marks_scored = ?, remarks = ?,
                        updated_at = ?
                     WHERE institution_domain = ? AND section_id = ? AND course_id = ?
                       AND faculty_id = ? AND student_id = ? AND exam_type = ?",
                    (
                        batch.total_marks,
                        batch.passing_marks,
                        e.marks_scored,
                        &remarks,
                        &now,
                        tenant.domain(),
                        &batch.coord.section_id,
                        &batch.coord.course_id,
                        &batch.coord.faculty_id,
                        &e.student_id,
                        &exam_type,
                    ),
                )
                .map_err(RecordsError::db("db_update_failed"))?;
                summary.modified += 1;
            }
        }
    }
    tx.commit().map_err(RecordsError::db("db_commit_failed"))?;

    info!(
        "event=marks_update module=marks status=ok tenant={} caller={} section={} course={} faculty={} exam_type={} matched={} modified={} upserted={} duration_ms={}",
        tenant.domain(),
        tenant.caller(),
        batch.coord.section_id,
        batch.coord.course_id,
        batch.coord.faculty_id,
        batch.exam_type,
        summary.matched,
        summary.modified,
        summary.upserted,
        started_at.elapsed().as_millis()
    );
    Ok(summary)
}

pub fn get_by_exam_type(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    exam_type: ExamType,
) -> RecordsResult<Vec<MarksRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT m.id, m.section_id, m.course_id, m.faculty_id, m.student_id, s.name, s.roll_no,
                    m.exam_type, m.total_marks, m.passing_marks, m.marks_scored, m.remarks,
                    m.created_at, m.updated_at
             FROM marks m
             LEFT JOIN students s
               ON s.institution_domain = m.institution_domain AND s.id = m.student_id
             WHERE m.institution_domain = ? AND m.section_id = ? AND m.course_id = ?
               AND m.faculty_id = ? AND m.exam_type = ?
             ORDER BY s.name COLLATE NOCASE, m.student_id",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let raw = stmt
        .query_map(
            (
                tenant.domain(),
                &coord.section_id,
                &coord.course_id,
                &coord.faculty_id,
                exam_type.to_string(),
            ),
            |r| {
                Ok((
                    MarksRow {
                        id: r.get(0)?,
                        section_id: r.get(1)?,
                        course_id: r.get(2)?,
                        faculty_id: r.get(3)?,
                        student_id: r.get(4)?,
                        student_name: r.get(5)?,
                        roll_no: r.get(6)?,
                        exam_type,
                        total_marks: r.get(8)?,
                        passing_marks: r.get(9)?,
                        marks_scored: r.get(10)?,
                        remarks: r.get(11)?,
                        created_at: r.get(12)?,
                        updated_at: r.get(13)?,
                    },
                    r.get::<_, String>(7)?,
                ))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;
    raw.into_iter()
        .map(|(row, stored)| {
            stored_exam_type(&stored)?;
            Ok(row)
        })
        .collect()
}

/// Distinct exam types recorded for the coordinate, in canonical order.
pub fn list_exam_types(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
) -> RecordsResult<Vec<ExamType>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT exam_type FROM marks
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?",
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
            |r| r.get::<_, String>(0),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;
    let mut types = raw
        .iter()
        .map(|s| stored_exam_type(s))
        .collect::<RecordsResult<Vec<_>>>()?;
    types.sort();
    types.dedup();
    Ok(types)
}

pub fn delete_by_exam_type(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    exam_type: ExamType,
) -> RecordsResult<u64> {
    let deleted = conn
        .execute(
            "DELETE FROM marks
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
               AND exam_type = ?",
            (
                tenant.domain(),
                &coord.section_id,
                &coord.course_id,
                &coord.faculty_id,
                exam_type.to_string(),
            ),
        )
        .map_err(RecordsError::db("db_delete_failed"))?;
    if deleted == 0 {
        return Err(RecordsError::not_found(format!(
            "no marks recorded for {exam_type}"
        )));
    }
    info!(
        "event=marks_delete module=marks status=ok tenant={} caller={} section={} course={} faculty={} exam_type={} deleted={}",
        tenant.domain(),
        tenant.caller(),
        coord.section_id,
        coord.course_id,
        coord.faculty_id,
        exam_type,
        deleted
    );
    Ok(deleted as u64)
}

pub(crate) fn stored_exam_type(raw: &str) -> RecordsResult<ExamType> {
    ExamType::parse(raw).ok_or_else(|| {
        RecordsError::internal(
            "invalid_persisted_data",
            format!("unknown exam type `{raw}`"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seeded_workspace, tenant};

    fn exam(s: &str) -> ExamType {
        ExamType::parse(s).unwrap_or_else(|| panic!("exam type {s}"))
    }

    fn entry(student: &str, scored: f64) -> MarksEntry {
        MarksEntry {
            student_id: student.to_string(),
            marks_scored: scored,
            remarks: None,
        }
    }

    fn batch(exam_type: &str, total: f64, entries: Vec<MarksEntry>) -> MarksBatch {
        MarksBatch {
            coord: Coordinate::new("sec-a", "crs-math", "fac-1").expect("coord"),
            exam_type: exam(exam_type),
            total_marks: total,
            passing_marks: total * 0.4,
            remarks: None,
            entries,
        }
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM marks", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn exam_types_parse_and_render() {
        assert_eq!(exam("Midterm-2").to_string(), "Midterm-2");
        assert_eq!(exam("final-lab").to_string(), "Final-Lab");
        let re = exam("Reattempt-Quiz");
        assert!(re.reattempt);
        assert_eq!(re.to_string(), "Reattempt-Quiz");
        assert!(ExamType::parse("Viva").is_none());
        assert!(ExamType::parse("Reattempt-").is_none());
        assert_eq!(exam("reattempt-quiz"), re);
        assert_eq!(exam("REATTEMPT-final-lab").to_string(), "Reattempt-Final-Lab");
        assert!(!exam("Quiz").reattempt);
        assert!(exam("Attendance") < exam("Reattempt-Midterm-1"));
        assert!(exam("Midterm-1") < exam("Final"));
    }

    #[test]
    fn score_above_total_rejects_whole_batch() {
        let conn = seeded_workspace();
        let b = batch("Quiz", 50.0, vec![entry("stu-1", 40.0), entry("stu-2", 51.0)]);
        let e = add_batch(&conn, &tenant(), &b, true)
            .expect_err("out of range");
        assert_eq!(e.status(), 400);
        assert_eq!(e.details().and_then(|d| d.get("studentId")), Some(&json!("stu-2")));
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn batch_level_bounds() {
        let conn = seeded_workspace();
        let mut b = batch("Quiz", 0.0, vec![entry("stu-1", 0.0)]);
        assert!(add_batch(&conn, &tenant(), &b, true).is_err());
        b.total_marks = 10.0;
        b.passing_marks = 11.0;
        assert!(add_batch(&conn, &tenant(), &b, true).is_err());
        b.passing_marks = -1.0;
        assert!(add_batch(&conn, &tenant(), &b, true).is_err());
        b.passing_marks = 10.0;
        b.entries.push(entry("stu-1", 3.0));
        let e = add_batch(&conn, &tenant(), &b, true).expect_err("duplicate");
        assert_eq!(e.code(), "duplicate_student");
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn second_add_for_same_exam_type_conflicts() {
        let conn = seeded_workspace();
        let b = batch("Midterm-1", 50.0, vec![entry("stu-1", 40.0), entry("stu-2", 20.5)]);
        assert_eq!(
            add_batch(&conn, &tenant(), &b, true).expect("add"),
            InsertSummary { inserted_count: 2 }
        );
        let again = batch("Midterm-1", 50.0, vec![entry("stu-3", 10.0)]);
        let e = add_batch(&conn, &tenant(), &again, true).expect_err("conflict");
        assert_eq!(e.code(), "conflict");
        assert_eq!(row_count(&conn), 2);

        // A reattempt is its own batch.
        let re = batch("Reattempt-Midterm-1", 50.0, vec![entry("stu-2", 30.0)]);
        add_batch(&conn, &tenant(), &re, true).expect("reattempt");
        assert_eq!(row_count(&conn), 3);
    }

    #[test]
    fn identity_index_turns_a_lost_race_into_conflict() {
        let conn = seeded_workspace();
        let t = tenant();
        let b = batch("Final", 100.0, vec![entry("stu-1", 70.0)]);
        add_batch(&conn, &t, &b, true).expect("add");

        // A second writer that passed the existence check before the first committed.
        let e = insert_row(&conn, &t, &b, &entry("stu-1", 55.0), "2024-03-05T10:00:00.000Z")
            .expect_err("duplicate identity");
        assert_eq!((e.status(), e.code()), (400, "conflict"));
        let details = e.details().expect("details");
        assert_eq!(details["studentId"], json!("stu-1"));
        assert_eq!(details["examType"], json!("Final"));
        assert!(details.get("storage").is_none());
        assert_eq!(row_count(&conn), 1);
    }

    #[test]
    fn update_without_batch_is_not_found() {
        let conn = seeded_workspace();
        let b = batch("Final", 100.0, vec![entry("stu-1", 70.0)]);
        let e = update_batch(&conn, &tenant(), &b, true)
            .expect_err("missing batch");
        assert_eq!(e.status(), 404);
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn update_rewrites_rows_and_adds_missing_students() {
        let conn = seeded_workspace();
        let t = tenant();
        add_batch(
            &conn,
            &t,
            &batch("Lab", 25.0, vec![entry("stu-1", 20.0), entry("stu-2", 15.0)]),
            true,
        )
        .expect("add");

        let mut fix = batch(
            "Lab",
            25.0,
            vec![entry("stu-1", 20.0), entry("stu-2", 18.0), entry("stu-3", 12.0)],
        );
        fix.entries[1].remarks = Some("re-evaluated".to_string());
        let s = update_batch(&conn, &t, &fix, true).expect("update");
        assert_eq!(
            s,
            WriteSummary {
                matched: 2,
                modified: 1,
                upserted: 1
            }
        );

        let rows = get_by_exam_type(&conn, &t, &fix.coord, exam("Lab")).expect("rows");
        let names: Vec<_> = rows.iter().filter_map(|r| r.student_name.as_deref()).collect();
        assert_eq!(names, vec!["Asha Rao", "Bilal Khan", "Chen Wei"]);
        let chen = rows.iter().find(|r| r.student_id == "stu-2").expect("stu-2");
        assert_eq!(chen.marks_scored, 18.0);
        assert_eq!(chen.remarks.as_deref(), Some("re-evaluated"));
    }

    #[test]
    fn batch_remarks_apply_unless_entry_overrides() {
        let conn = seeded_workspace();
        let t = tenant();
        let mut b = batch("Assignment", 10.0, vec![entry("stu-1", 9.0), entry("stu-2", 4.0)]);
        b.remarks = Some("late submissions penalised".to_string());
        b.entries[1].remarks = Some("  ".to_string());
        add_batch(&conn, &t, &b, true).expect("add");
        let rows = get_by_exam_type(&conn, &t, &b.coord, b.exam_type).expect("rows");
        assert!(rows
            .iter()
            .find(|r| r.student_id == "stu-1")
            .and_then(|r| r.remarks.as_deref())
            .is_some());
        // A blank override suppresses the batch remark.
        assert!(rows
            .iter()
            .find(|r| r.student_id == "stu-2")
            .and_then(|r| r.remarks.as_deref())
            .is_none());
    }

    #[test]
    fn list_and_delete_exam_types() {
        let conn = seeded_workspace();
        let t = tenant();
        for et in ["Reattempt-Quiz", "Final", "Midterm-1"] {
            add_batch(&conn, &t, &batch(et, 10.0, vec![entry("stu-1", 5.0)]), true)
                .expect("add");
        }
        let coord = Coordinate::new("sec-a", "crs-math", "fac-1").expect("coord");
        let listed = list_exam_types(&conn, &t, &coord).expect("list");
        assert_eq!(
            listed.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            vec!["Midterm-1", "Final", "Reattempt-Quiz"]
        );

        assert_eq!(delete_by_exam_type(&conn, &t, &coord, exam("Final")).expect("delete"), 1);
        let e = delete_by_exam_type(&conn, &t, &coord, exam("Final")).expect_err("gone");
        assert_eq!(e.status(), 404);

        let other = Tenant::new("other.edu", None).expect("tenant");
        assert!(list_exam_types(&conn, &other, &coord).expect("list").is_empty());
        assert_eq!(
            delete_by_exam_type(&conn, &other, &coord, exam("Midterm-1"))
                .expect_err("foreign")
                .status(),
            404
        );
    }
}
