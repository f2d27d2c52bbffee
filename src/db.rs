use log::{error, info};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Instant;

pub const DB_FILE_NAME: &str = "records.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    let started_at = Instant::now();
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    match bootstrap(&conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=file duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(e) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                e
            );
            Err(e)
        }
    }
}

#[cfg(test)]
pub fn open_db_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    bootstrap(&conn)?;
    Ok(conn)
}

fn bootstrap(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // WAL lets report reads proceed while a batch transaction is open.
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Reference graph. Owned by the CRUD layer; every id is scoped by tenant.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            institution_domain TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            PRIMARY KEY(institution_domain, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            institution_domain TEXT NOT NULL,
            id TEXT NOT NULL,
            semester_id TEXT,
            name TEXT NOT NULL,
            PRIMARY KEY(institution_domain, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            institution_domain TEXT NOT NULL,
            id TEXT NOT NULL,
            code TEXT,
            name TEXT NOT NULL,
            PRIMARY KEY(institution_domain, id)
        )",
        [],
    )?;
    ensure_courses_credits(conn)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            institution_domain TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY(institution_domain, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            institution_domain TEXT NOT NULL,
            id TEXT NOT NULL,
            section_id TEXT,
            name TEXT NOT NULL,
            roll_no TEXT,
            PRIMARY KEY(institution_domain, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(institution_domain, section_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_course_faculty(
            id TEXT PRIMARY KEY,
            institution_domain TEXT NOT NULL,
            section_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            faculty_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(institution_domain, section_id) REFERENCES sections(institution_domain, id),
            UNIQUE(institution_domain, section_id, course_id, faculty_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            institution_domain TEXT NOT NULL,
            section_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            faculty_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date INTEGER NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('Present', 'Absent')),
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_attendance_identity
         ON attendance(institution_domain, section_id, course_id, faculty_id, student_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_section_date
         ON attendance(institution_domain, section_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student
         ON attendance(institution_domain, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            institution_domain TEXT NOT NULL,
            section_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            faculty_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            total_marks REAL NOT NULL CHECK(total_marks > 0),
            passing_marks REAL NOT NULL CHECK(passing_marks >= 0 AND passing_marks <= total_marks),
            marks_scored REAL NOT NULL CHECK(marks_scored >= 0 AND marks_scored <= total_marks),
            remarks TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_marks_identity
         ON marks(institution_domain, section_id, course_id, faculty_id, student_id, exam_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_batch
         ON marks(institution_domain, section_id, course_id, faculty_id, exam_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student
         ON marks(institution_domain, student_id)",
        [],
    )?;

    Ok(())
}

// Workspaces created before course credits were tracked lack the column.
fn ensure_courses_credits(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "credits")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE courses ADD COLUMN credits REAL", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
