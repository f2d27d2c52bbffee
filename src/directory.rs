//! Seeding interface for the reference graph.
//!
//! The CRUD layer owns sections, courses, faculty and students; it pushes
//! them here so the recorders can validate batches. Rows are upserted by
//! (tenant, id) inside one transaction. Nothing is ever deleted.

use crate::error::{RecordsError, RecordsResult};
use crate::tenant::{require_id, Tenant};
use log::info;
use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DirectoryImport {
    #[serde(default)]
    pub semesters: Vec<SemesterIn>,
    #[serde(default)]
    pub sections: Vec<SectionIn>,
    #[serde(default)]
    pub courses: Vec<CourseIn>,
    #[serde(default)]
    pub faculty: Vec<FacultyIn>,
    #[serde(default)]
    pub students: Vec<StudentIn>,
    #[serde(default)]
    pub mappings: Vec<MappingIn>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterIn {
    pub id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionIn {
    pub id: String,
    pub name: String,
    pub semester_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseIn {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub credits: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyIn {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIn {
    pub id: String,
    pub name: String,
    pub section_id: Option<String>,
    pub roll_no: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingIn {
    pub id: Option<String>,
    pub section_id: String,
    pub course_id: String,
    pub faculty_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub semesters: usize,
    pub sections: usize,
    pub courses: usize,
    pub faculty: usize,
    pub students: usize,
    pub mappings: usize,
}

fn normalize_date(raw: Option<&str>, field: &str) -> RecordsResult<Option<String>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    crate::datekey::DayKey::parse(raw)
        .map(|k| Some(k.date().format("%Y-%m-%d").to_string()))
        .ok_or_else(|| RecordsError::validation(format!("{field} is not a valid date")))
}

pub fn import(
    conn: &rusqlite::Connection,
    tenant: &Tenant,
    input: &DirectoryImport,
) -> RecordsResult<ImportSummary> {
    let tx = conn
        .unchecked_transaction()
        .map_err(RecordsError::db("db_tx_failed"))?;
    let summary = import_in(&tx, tenant, input)?;
    tx.commit().map_err(RecordsError::db("db_commit_failed"))?;
    info!(
        "event=directory_import module=directory status=ok tenant={} caller={} semesters={} sections={} courses={} faculty={} students={} mappings={}",
        tenant.domain(),
        tenant.caller(),
        summary.semesters,
        summary.sections,
        summary.courses,
        summary.faculty,
        summary.students,
        summary.mappings
    );
    Ok(summary)
}

fn import_in(
    tx: &Transaction<'_>,
    tenant: &Tenant,
    input: &DirectoryImport,
) -> RecordsResult<ImportSummary> {
    let d = tenant.domain();

    for s in &input.semesters {
        let start = normalize_date(s.start_date.as_deref(), "startDate")?;
        let end = normalize_date(s.end_date.as_deref(), "endDate")?;
        if let (Some(a), Some(b)) = (&start, &end) {
            if a > b {
                return Err(RecordsError::validation("semester startDate is after endDate")
                    .with_details(json!({ "semesterId": s.id })));
            }
        }
        tx.execute(
            "INSERT INTO semesters(institution_domain, id, name, start_date, end_date)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(institution_domain, id) DO UPDATE SET
               name = excluded.name,
               start_date = excluded.start_date,
               end_date = excluded.end_date",
            (d, require_id(&s.id, "semester id")?, &s.name, start, end),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    for s in &input.sections {
        tx.execute(
            "INSERT INTO sections(institution_domain, id, semester_id, name)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(institution_domain, id) DO UPDATE SET
               semester_id = excluded.semester_id,
               name = excluded.name",
            (d, require_id(&s.id, "section id")?, &s.semester_id, &s.name),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    for c in &input.courses {
        if let Some(credits) = c.credits {
            if !(credits.is_finite() && credits > 0.0) {
                return Err(RecordsError::validation("course credits must be > 0")
                    .with_details(json!({ "courseId": c.id })));
            }
        }
        tx.execute(
            "INSERT INTO courses(institution_domain, id, code, name, credits)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(institution_domain, id) DO UPDATE SET
               code = excluded.code,
               name = excluded.name,
               credits = excluded.credits",
            (d, require_id(&c.id, "course id")?, &c.code, &c.name, c.credits),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    for f in &input.faculty {
        tx.execute(
            "INSERT INTO faculty(institution_domain, id, name)
             VALUES(?, ?, ?)
             ON CONFLICT(institution_domain, id) DO UPDATE SET name = excluded.name",
            (d, require_id(&f.id, "faculty id")?, &f.name),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    for s in &input.students {
        tx.execute(
            "INSERT INTO students(institution_domain, id, section_id, name, roll_no)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(institution_domain, id) DO UPDATE SET
               section_id = excluded.section_id,
               name = excluded.name,
               roll_no = excluded.roll_no",
            (d, require_id(&s.id, "student id")?, &s.section_id, &s.name, &s.roll_no),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    for (idx, m) in input.mappings.iter().enumerate() {
        let section_id = require_id(&m.section_id, "mapping sectionId")?;
        let known: bool = tx
            .query_row(
                "SELECT COUNT(*) FROM sections WHERE institution_domain = ? AND id = ?",
                (d, &section_id),
                |r| r.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(RecordsError::db("db_query_failed"))?;
        if !known {
            return Err(RecordsError::validation_code(
                "unknown_section",
                "mapping references an unknown section",
            )
            .with_details(json!({ "sectionId": section_id })));
        }
        let id = m
            .id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tx.execute(
            "INSERT INTO section_course_faculty(
                id, institution_domain, section_id, course_id, faculty_id, sort_order
             ) VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(institution_domain, section_id, course_id, faculty_id) DO UPDATE SET
               sort_order = excluded.sort_order",
            (
                id,
                d,
                &section_id,
                require_id(&m.course_id, "mapping courseId")?,
                require_id(&m.faculty_id, "mapping facultyId")?,
                idx as i64,
            ),
        )
        .map_err(RecordsError::db("db_update_failed"))?;
    }

    Ok(ImportSummary {
        semesters: input.semesters.len(),
        sections: input.sections.len(),
        courses: input.courses.len(),
        faculty: input.faculty.len(),
        students: input.students.len(),
        mappings: input.mappings.len(),
    })
}
