//! Tenant context and read-only access to the reference graph.
//!
//! The tenant is resolved by the caller's authentication layer and handed to
//! every engine call explicitly. Sections, courses, faculty and students are
//! owned elsewhere; this module only reads them.

use crate::error::{RecordsError, RecordsResult};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    domain: String,
    caller: Option<String>,
}

impl Tenant {
    pub fn new(domain: &str, caller: Option<&str>) -> RecordsResult<Self> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(RecordsError::validation_code(
                "missing_tenant",
                "institution domain is required",
            ));
        }
        Ok(Self {
            domain: domain.to_ascii_lowercase(),
            caller: caller
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn caller(&self) -> &str {
        self.caller.as_deref().unwrap_or("-")
    }
}

/// The (section, course, faculty) triple every batch is recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub section_id: String,
    pub course_id: String,
    pub faculty_id: String,
}

impl Coordinate {
    pub fn new(section_id: &str, course_id: &str, faculty_id: &str) -> RecordsResult<Self> {
        Ok(Self {
            section_id: require_id(section_id, "sectionId")?,
            course_id: require_id(course_id, "courseId")?,
            faculty_id: require_id(faculty_id, "facultyId")?,
        })
    }
}

pub fn require_id(raw: &str, field: &str) -> RecordsResult<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(RecordsError::validation(format!("missing {field}")));
    }
    Ok(t.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionRef {
    pub id: String,
    pub name: String,
    pub semester_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemesterWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Tenant-scoped lookups the recorders rely on before writing.
pub trait ReferenceResolver {
    fn section(&self, tenant: &Tenant, section_id: &str) -> RecordsResult<Option<SectionRef>>;
    fn semester_window(
        &self,
        tenant: &Tenant,
        semester_id: &str,
    ) -> RecordsResult<Option<SemesterWindow>>;
    fn course_exists(&self, tenant: &Tenant, course_id: &str) -> RecordsResult<bool>;
    fn faculty_exists(&self, tenant: &Tenant, faculty_id: &str) -> RecordsResult<bool>;
    fn mapping_registered(&self, tenant: &Tenant, coord: &Coordinate) -> RecordsResult<bool>;
    /// Returns the subset of `student_ids` that the tenant does not know.
    fn unknown_students(&self, tenant: &Tenant, student_ids: &[&str])
        -> RecordsResult<Vec<String>>;
    fn course_credits(&self, tenant: &Tenant, course_id: &str) -> RecordsResult<Option<f64>>;
}

pub struct SqliteReferences<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferences<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn exists(&self, sql: &str, tenant: &Tenant, id: &str) -> RecordsResult<bool> {
        self.conn
            .query_row(sql, (tenant.domain(), id), |r| r.get::<_, i64>(0))
            .optional()
            .map(|v| v.is_some())
            .map_err(RecordsError::db("db_query_failed"))
    }
}

impl ReferenceResolver for SqliteReferences<'_> {
    fn section(&self, tenant: &Tenant, section_id: &str) -> RecordsResult<Option<SectionRef>> {
        self.conn
            .query_row(
                "SELECT id, name, semester_id FROM sections
                 WHERE institution_domain = ? AND id = ?",
                (tenant.domain(), section_id),
                |r| {
                    Ok(SectionRef {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        semester_id: r.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(RecordsError::db("db_query_failed"))
    }

    fn semester_window(
        &self,
        tenant: &Tenant,
        semester_id: &str,
    ) -> RecordsResult<Option<SemesterWindow>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT start_date, end_date FROM semesters
                 WHERE institution_domain = ? AND id = ?",
                (tenant.domain(), semester_id),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(RecordsError::db("db_query_failed"))?;
        Ok(row.map(|(start, end)| SemesterWindow {
            start: start.as_deref().and_then(parse_stored_date),
            end: end.as_deref().and_then(parse_stored_date),
        }))
    }

    fn course_exists(&self, tenant: &Tenant, course_id: &str) -> RecordsResult<bool> {
        self.exists(
            "SELECT 1 FROM courses WHERE institution_domain = ? AND id = ?",
            tenant,
            course_id,
        )
    }

    fn faculty_exists(&self, tenant: &Tenant, faculty_id: &str) -> RecordsResult<bool> {
        self.exists(
            "SELECT 1 FROM faculty WHERE institution_domain = ? AND id = ?",
            tenant,
            faculty_id,
        )
    }

    fn mapping_registered(&self, tenant: &Tenant, coord: &Coordinate) -> RecordsResult<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM section_course_faculty
                 WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?",
                (
                    tenant.domain(),
                    &coord.section_id,
                    &coord.course_id,
                    &coord.faculty_id,
                ),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.is_some())
            .map_err(RecordsError::db("db_query_failed"))
    }

    fn unknown_students(
        &self,
        tenant: &Tenant,
        student_ids: &[&str],
    ) -> RecordsResult<Vec<String>> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; student_ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM students WHERE institution_domain = ? AND id IN ({placeholders})"
        );
        let mut bind: Vec<Value> = Vec::with_capacity(student_ids.len() + 1);
        bind.push(Value::Text(tenant.domain().to_string()));
        bind.extend(student_ids.iter().map(|s| Value::Text((*s).to_string())));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(RecordsError::db("db_query_failed"))?;
        let known: HashSet<String> = stmt
            .query_map(params_from_iter(bind), |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
            .map_err(RecordsError::db("db_query_failed"))?;

        let mut missing: Vec<String> = Vec::new();
        for id in student_ids {
            if !known.contains(*id) && !missing.iter().any(|m| m == id) {
                missing.push((*id).to_string());
            }
        }
        Ok(missing)
    }

    fn course_credits(&self, tenant: &Tenant, course_id: &str) -> RecordsResult<Option<f64>> {
        let credits: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT credits FROM courses WHERE institution_domain = ? AND id = ?",
                (tenant.domain(), course_id),
                |r| r.get(0),
            )
            .optional()
            .map_err(RecordsError::db("db_query_failed"))?;
        Ok(credits.flatten())
    }
}

fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    crate::datekey::DayKey::parse(raw).map(|k| k.date())
}

/// Shared pre-write reference check for attendance and marks batches.
///
/// Section, course and faculty must exist for the tenant; when
/// `enforce_mappings` is set the triple must also be a registered mapping on
/// the section. Every student id must be known to the tenant.
pub fn verify_batch_references(
    refs: &dyn ReferenceResolver,
    tenant: &Tenant,
    coord: &Coordinate,
    student_ids: &[&str],
    enforce_mappings: bool,
) -> RecordsResult<()> {
    if refs.section(tenant, &coord.section_id)?.is_none() {
        return Err(RecordsError::validation_code("unknown_section", "section not found")
            .with_details(json!({ "sectionId": coord.section_id })));
    }
    if !refs.course_exists(tenant, &coord.course_id)? {
        return Err(RecordsError::validation_code("unknown_course", "course not found")
            .with_details(json!({ "courseId": coord.course_id })));
    }
    if !refs.faculty_exists(tenant, &coord.faculty_id)? {
        return Err(RecordsError::validation_code("unknown_faculty", "faculty not found")
            .with_details(json!({ "facultyId": coord.faculty_id })));
    }
    if enforce_mappings && !refs.mapping_registered(tenant, coord)? {
        return Err(RecordsError::validation_code(
            "mapping_not_registered",
            "course and faculty are not mapped to this section",
        )
        .with_details(json!({
            "sectionId": coord.section_id,
            "courseId": coord.course_id,
            "facultyId": coord.faculty_id
        })));
    }
    let unknown = refs.unknown_students(tenant, student_ids)?;
    if !unknown.is_empty() {
        return Err(
            RecordsError::validation_code("unknown_students", "students not found")
                .with_details(json!({ "studentIds": unknown })),
        );
    }
    Ok(())
}
