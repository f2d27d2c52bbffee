//! Read-only aggregation over the attendance and marks tables.

use crate::attendance::{stored_day, AttendanceStatus};
use crate::calc::{self, GradeBucket, MonthBucket};
use crate::error::{RecordsError, RecordsResult};
use crate::marks::ExamType;
use crate::settings::ReportPolicy;
use crate::tenant::{require_id, Coordinate, ReferenceResolver, SqliteReferences, Tenant};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTotals {
    pub present: u64,
    pub absent: u64,
    pub total: u64,
    pub percentage: u32,
}

impl AttendanceTotals {
    fn new(present: u64, absent: u64) -> Self {
        let total = present + absent;
        Self {
            present,
            absent,
            total,
            percentage: calc::attendance_percentage(present, total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAttendance {
    pub course_id: String,
    pub course_name: Option<String>,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceReport {
    pub student_id: String,
    pub courses: Vec<CourseAttendance>,
    pub overall: AttendanceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceLine {
    pub student_id: String,
    pub student_name: Option<String>,
    pub roll_no: Option<String>,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAttendanceReport {
    pub section_id: String,
    pub section_name: String,
    pub course_id: String,
    pub faculty_id: String,
    /// Distinct days with at least one record.
    pub days: u64,
    pub students: Vec<StudentAttendanceLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDistribution {
    pub exam_type: ExamType,
    pub count: u64,
    pub buckets: BTreeMap<GradeBucket, u64>,
    pub passed: u64,
    pub failed: u64,
    pub average_percentage: f64,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrade {
    pub course_id: String,
    pub course_name: Option<String>,
    pub credits: f64,
    pub percentage: f64,
    pub letter: &'static str,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGpa {
    pub student_id: String,
    pub courses: Vec<CourseGrade>,
    pub gpa: f64,
}

fn require_student(conn: &Connection, tenant: &Tenant, student_id: &str) -> RecordsResult<()> {
    let refs = SqliteReferences::new(conn);
    if refs.unknown_students(tenant, &[student_id])?.is_empty() {
        Ok(())
    } else {
        Err(RecordsError::not_found("student not found")
            .with_details(json!({ "studentId": student_id })))
    }
}

pub fn student_attendance(
    conn: &Connection,
    tenant: &Tenant,
    student_id: &str,
    course_id: Option<&str>,
) -> RecordsResult<StudentAttendanceReport> {
    let student_id = require_id(student_id, "studentId")?;
    require_student(conn, tenant, &student_id)?;

    let mut sql = String::from(
        "SELECT a.course_id, c.name,
                SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END),
                SUM(CASE WHEN a.status = 'Absent' THEN 1 ELSE 0 END)
         FROM attendance a
         LEFT JOIN courses c
           ON c.institution_domain = a.institution_domain AND c.id = a.course_id
         WHERE a.institution_domain = ? AND a.student_id = ?",
    );
    let mut bind: Vec<Value> = vec![
        Value::Text(tenant.domain().to_string()),
        Value::Text(student_id.clone()),
    ];
    if let Some(c) = course_id.map(str::trim).filter(|c| !c.is_empty()) {
        sql.push_str(" AND a.course_id = ?");
        bind.push(Value::Text(c.to_string()));
    }
    sql.push_str(" GROUP BY a.course_id ORDER BY a.course_id");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(RecordsError::db("db_query_failed"))?;
    let courses = stmt
        .query_map(params_from_iter(bind), |r| {
            let present: i64 = r.get(2)?;
            let absent: i64 = r.get(3)?;
            Ok(CourseAttendance {
                course_id: r.get(0)?,
                course_name: r.get(1)?,
                totals: AttendanceTotals::new(present.max(0) as u64, absent.max(0) as u64),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    let present = courses.iter().map(|c| c.totals.present).sum();
    let absent = courses.iter().map(|c| c.totals.absent).sum();
    Ok(StudentAttendanceReport {
        student_id,
        courses,
        overall: AttendanceTotals::new(present, absent),
    })
}

/// Per-student totals for a coordinate. Students on the section roster
/// without any record are listed with zero counts.
pub fn section_attendance(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
) -> RecordsResult<SectionAttendanceReport> {
    let section = SqliteReferences::new(conn)
        .section(tenant, &coord.section_id)?
        .ok_or_else(|| {
            RecordsError::not_found("section not found")
                .with_details(json!({ "sectionId": coord.section_id }))
        })?;
    let scope = (
        tenant.domain(),
        &coord.section_id,
        &coord.course_id,
        &coord.faculty_id,
    );

    let days: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT date) FROM attendance
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?",
            scope,
            |r| r.get(0),
        )
        .map_err(RecordsError::db("db_query_failed"))?;

    let mut stmt = conn
        .prepare(
            "SELECT a.student_id, s.name, s.roll_no,
                    SUM(CASE WHEN a.status = 'Present' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN a.status = 'Absent' THEN 1 ELSE 0 END)
             FROM attendance a
             LEFT JOIN students s
               ON s.institution_domain = a.institution_domain AND s.id = a.student_id
             WHERE a.institution_domain = ? AND a.section_id = ? AND a.course_id = ?
               AND a.faculty_id = ?
             GROUP BY a.student_id",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let mut students = stmt
        .query_map(scope, |r| {
            let present: i64 = r.get(3)?;
            let absent: i64 = r.get(4)?;
            Ok(StudentAttendanceLine {
                student_id: r.get(0)?,
                student_name: r.get(1)?,
                roll_no: r.get(2)?,
                totals: AttendanceTotals::new(present.max(0) as u64, absent.max(0) as u64),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    let seen: HashSet<String> = students.iter().map(|s| s.student_id.clone()).collect();
    let mut roster_stmt = conn
        .prepare(
            "SELECT id, name, roll_no FROM students
             WHERE institution_domain = ? AND section_id = ?",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let roster = roster_stmt
        .query_map((tenant.domain(), &coord.section_id), |r| {
            Ok(StudentAttendanceLine {
                student_id: r.get(0)?,
                student_name: r.get(1)?,
                roll_no: r.get(2)?,
                totals: AttendanceTotals::default(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;
    students.extend(roster.into_iter().filter(|s| !seen.contains(&s.student_id)));
    students.sort_by(|a, b| {
        let key = |s: &StudentAttendanceLine| s.student_name.clone().unwrap_or_default().to_lowercase();
        key(a)
            .cmp(&key(b))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    Ok(SectionAttendanceReport {
        section_id: section.id,
        section_name: section.name,
        course_id: coord.course_id.clone(),
        faculty_id: coord.faculty_id.clone(),
        days: days.max(0) as u64,
        students,
    })
}

/// Monthly present/absent counts for a student, a section, or both.
pub fn attendance_trend(
    conn: &Connection,
    tenant: &Tenant,
    student_id: Option<&str>,
    section_id: Option<&str>,
) -> RecordsResult<Vec<MonthBucket>> {
    let student_id = student_id.map(str::trim).filter(|s| !s.is_empty());
    let section_id = section_id.map(str::trim).filter(|s| !s.is_empty());
    if student_id.is_none() && section_id.is_none() {
        return Err(RecordsError::validation(
            "attendance trend needs studentId or sectionId",
        ));
    }

    let mut sql =
        String::from("SELECT date, status FROM attendance WHERE institution_domain = ?");
    let mut bind: Vec<Value> = vec![Value::Text(tenant.domain().to_string())];
    if let Some(s) = student_id {
        sql.push_str(" AND student_id = ?");
        bind.push(Value::Text(s.to_string()));
    }
    if let Some(s) = section_id {
        sql.push_str(" AND section_id = ?");
        bind.push(Value::Text(s.to_string()));
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(RecordsError::db("db_query_failed"))?;
    let raw = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    let mut records = Vec::with_capacity(raw.len());
    for (date, status) in raw {
        let status = AttendanceStatus::parse(&status).ok_or_else(|| {
            RecordsError::internal(
                "invalid_persisted_data",
                format!("unknown attendance status `{status}`"),
            )
        })?;
        records.push((stored_day(date)?, status));
    }
    Ok(calc::monthly_trend(records))
}

/// Bucket counts and pass/fail split for one marks batch. An unrecorded
/// batch yields an all-zero distribution.
pub fn grade_distribution(
    conn: &Connection,
    tenant: &Tenant,
    coord: &Coordinate,
    exam_type: ExamType,
) -> RecordsResult<GradeDistribution> {
    let mut stmt = conn
        .prepare(
            "SELECT marks_scored, total_marks, passing_marks FROM marks
             WHERE institution_domain = ? AND section_id = ? AND course_id = ? AND faculty_id = ?
               AND exam_type = ?",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let rows = stmt
        .query_map(
            (
                tenant.domain(),
                &coord.section_id,
                &coord.course_id,
                &coord.faculty_id,
                exam_type.to_string(),
            ),
            |r| Ok((r.get::<_, f64>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?)),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    let mut buckets: BTreeMap<GradeBucket, u64> =
        GradeBucket::ALL.iter().map(|b| (*b, 0)).collect();
    let mut passed = 0u64;
    let mut pct_sum = 0.0;
    let mut highest: Option<f64> = None;
    let mut lowest: Option<f64> = None;
    for (scored, total, passing) in &rows {
        let pct = calc::score_percentage(*scored, *total);
        *buckets.entry(GradeBucket::for_percentage(pct)).or_insert(0) += 1;
        if scored >= passing {
            passed += 1;
        }
        pct_sum += pct;
        highest = Some(highest.map_or(*scored, |h| h.max(*scored)));
        lowest = Some(lowest.map_or(*scored, |l| l.min(*scored)));
    }
    let count = rows.len() as u64;
    let average_percentage = if count > 0 {
        calc::round_2_decimals(pct_sum / count as f64)
    } else {
        0.0
    };

    Ok(GradeDistribution {
        exam_type,
        count,
        buckets,
        passed,
        failed: count - passed,
        average_percentage,
        highest,
        lowest,
    })
}

pub fn student_gpa(
    conn: &Connection,
    tenant: &Tenant,
    student_id: &str,
    policy: &ReportPolicy,
) -> RecordsResult<StudentGpa> {
    let student_id = require_id(student_id, "studentId")?;
    require_student(conn, tenant, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT m.course_id, c.name, m.marks_scored, m.total_marks
             FROM marks m
             LEFT JOIN courses c
               ON c.institution_domain = m.institution_domain AND c.id = m.course_id
             WHERE m.institution_domain = ? AND m.student_id = ?
             ORDER BY m.course_id",
        )
        .map_err(RecordsError::db("db_query_failed"))?;
    let rows = stmt
        .query_map((tenant.domain(), &student_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, f64>(2)?,
                r.get::<_, f64>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(RecordsError::db("db_query_failed"))?;

    let mut by_course: BTreeMap<String, (Option<String>, Vec<(f64, f64)>)> = BTreeMap::new();
    for (course_id, name, scored, total) in rows {
        by_course
            .entry(course_id)
            .or_insert_with(|| (name, Vec::new()))
            .1
            .push((scored, total));
    }

    let refs = SqliteReferences::new(conn);
    let mut courses = Vec::with_capacity(by_course.len());
    for (course_id, (course_name, records)) in by_course {
        let Some(pct) = calc::course_percentage(records) else {
            continue;
        };
        let credits = refs
            .course_credits(tenant, &course_id)?
            .filter(|c| *c > 0.0)
            .unwrap_or(policy.default_course_credits);
        let grade = calc::letter_grade(pct);
        courses.push(CourseGrade {
            course_id,
            course_name,
            credits,
            percentage: calc::round_2_decimals(pct),
            letter: grade.letter,
            points: grade.points,
        });
    }
    let gpa = calc::weighted_gpa(courses.iter().map(|c| (c.points, c.credits)));

    Ok(StudentGpa {
        student_id,
        courses,
        gpa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{self, AttendanceBatch, AttendanceEntry};
    use crate::datekey::DayKey;
    use crate::marks::{self, MarksBatch, MarksEntry};
    use crate::settings::AttendancePolicy;
    use crate::test_support::{seeded_workspace, tenant};

    fn coord(course: &str, faculty: &str) -> Coordinate {
        Coordinate::new("sec-a", course, faculty).expect("coord")
    }

    fn mark_day(conn: &Connection, date: &str, statuses: &[(&str, AttendanceStatus)]) {
        let batch = AttendanceBatch {
            coord: coord("crs-math", "fac-1"),
            date: DayKey::parse(date).expect("day"),
            entries: statuses
                .iter()
                .map(|(s, st)| AttendanceEntry {
                    student_id: s.to_string(),
                    status: *st,
                    date: None,
                })
                .collect(),
        };
        attendance::mark_batch(conn, &tenant(), &batch, &AttendancePolicy::default())
            .expect("mark");
    }

    fn add_marks(conn: &Connection, c: Coordinate, exam: &str, total: f64, scores: &[(&str, f64)]) {
        let batch = MarksBatch {
            coord: c,
            exam_type: ExamType::parse(exam).expect("exam type"),
            total_marks: total,
            passing_marks: total * 0.4,
            remarks: None,
            entries: scores
                .iter()
                .map(|(s, m)| MarksEntry {
                    student_id: s.to_string(),
                    marks_scored: *m,
                    remarks: None,
                })
                .collect(),
        };
        marks::add_batch(conn, &tenant(), &batch, true).expect("add");
    }

    #[test]
    fn eight_of_ten_present_is_eighty_percent() {
        let conn = seeded_workspace();
        for day in 1..=10 {
            let status = if day <= 8 {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            mark_day(&conn, &format!("2024-03-{day:02}"), &[("stu-1", status)]);
        }
        let r = student_attendance(&conn, &tenant(), "stu-1", None).expect("report");
        assert_eq!(r.overall, AttendanceTotals::new(8, 2));
        assert_eq!(r.overall.percentage, 80);
        assert_eq!(r.courses.len(), 1);
        assert_eq!(r.courses[0].course_name.as_deref(), Some("Mathematics"));

        let none = student_attendance(&conn, &tenant(), "stu-1", Some("crs-phys")).expect("report");
        assert!(none.courses.is_empty());
        assert_eq!(none.overall.percentage, 0);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let conn = seeded_workspace();
        let e = student_attendance(&conn, &tenant(), "ghost", None).expect_err("ghost");
        assert_eq!(e.status(), 404);
        let e = student_gpa(&conn, &tenant(), "ghost", &ReportPolicy::default()).expect_err("ghost");
        assert_eq!(e.status(), 404);
    }

    #[test]
    fn section_report_lists_whole_roster_by_name() {
        let conn = seeded_workspace();
        mark_day(
            &conn,
            "2024-03-04",
            &[("stu-1", AttendanceStatus::Present), ("stu-2", AttendanceStatus::Absent)],
        );
        mark_day(&conn, "2024-03-05", &[("stu-1", AttendanceStatus::Present)]);

        let r = section_attendance(&conn, &tenant(), &coord("crs-math", "fac-1")).expect("report");
        assert_eq!(r.days, 2);
        let lines: Vec<_> = r
            .students
            .iter()
            .map(|s| (s.student_id.as_str(), s.totals.present, s.totals.total))
            .collect();
        assert_eq!(lines, vec![("stu-3", 0, 0), ("stu-1", 2, 2), ("stu-2", 0, 1)]);
    }

    #[test]
    fn trend_requires_a_scope() {
        let conn = seeded_workspace();
        mark_day(&conn, "2024-02-28", &[("stu-1", AttendanceStatus::Absent)]);
        mark_day(&conn, "2024-03-01", &[("stu-1", AttendanceStatus::Present)]);
        assert_eq!(
            attendance_trend(&conn, &tenant(), None, Some(" ")).expect_err("no scope").status(),
            400
        );
        let t = attendance_trend(&conn, &tenant(), Some("stu-1"), Some("sec-a")).expect("trend");
        let months: Vec<_> = t.iter().map(|b| (b.month_name, b.present, b.absent)).collect();
        assert_eq!(months, vec![("February", 0, 1), ("March", 1, 0)]);
    }

    #[test]
    fn distribution_buckets_and_pass_counts() {
        let conn = seeded_workspace();
        add_marks(
            &conn,
            coord("crs-math", "fac-1"),
            "Midterm-1",
            50.0,
            &[("stu-1", 46.0), ("stu-2", 31.0), ("stu-3", 12.0)],
        );
        let d = grade_distribution(
            &conn,
            &tenant(),
            &coord("crs-math", "fac-1"),
            ExamType::parse("Midterm-1").expect("exam type"),
        )
        .expect("distribution");
        assert_eq!(d.count, 3);
        assert_eq!(d.buckets[&GradeBucket::A], 1);
        assert_eq!(d.buckets[&GradeBucket::D], 1);
        assert_eq!(d.buckets[&GradeBucket::F], 1);
        assert_eq!((d.passed, d.failed), (2, 1));
        assert_eq!(d.highest, Some(46.0));
        assert_eq!(d.lowest, Some(12.0));
        assert_eq!(d.average_percentage, 59.33);

        let empty = grade_distribution(
            &conn,
            &tenant(),
            &coord("crs-math", "fac-1"),
            ExamType::parse("Final").expect("exam type"),
        )
        .expect("empty");
        assert_eq!(empty.count, 0);
        assert_eq!(empty.highest, None);
    }

    #[test]
    fn gpa_weights_courses_by_credits() {
        let conn = seeded_workspace();
        add_marks(&conn, coord("crs-math", "fac-1"), "Final", 100.0, &[("stu-1", 92.0)]);
        add_marks(&conn, coord("crs-phys", "fac-2"), "Final", 100.0, &[("stu-1", 68.0)]);
        let g = student_gpa(&conn, &tenant(), "stu-1", &ReportPolicy::default()).expect("gpa");
        assert_eq!(g.gpa, 3.27);
        let letters: Vec<_> = g.courses.iter().map(|c| (c.course_id.as_str(), c.letter)).collect();
        assert_eq!(letters, vec![("crs-math", "O"), ("crs-phys", "B-")]);

        let none = student_gpa(&conn, &tenant(), "stu-2", &ReportPolicy::default()).expect("gpa");
        assert!(none.courses.is_empty());
        assert_eq!(none.gpa, 0.0);
    }

    #[test]
    fn courses_without_credits_use_the_policy_default() {
        let conn = seeded_workspace();
        add_marks(&conn, coord("crs-art", "fac-1"), "Lab", 10.0, &[("stu-2", 10.0)]);
        add_marks(&conn, coord("crs-phys", "fac-2"), "Lab", 10.0, &[("stu-2", 4.0)]);
        let policy = ReportPolicy {
            default_course_credits: 1.0,
        };
        let g = student_gpa(&conn, &tenant(), "stu-2", &policy).expect("gpa");
        let art = g.courses.iter().find(|c| c.course_id == "crs-art").expect("art");
        assert_eq!(art.credits, 1.0);
        // (4.0 * 1 + 1.0 * 3) / 4
        assert_eq!(g.gpa, 1.75);
    }
}
