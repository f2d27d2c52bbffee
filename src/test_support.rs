//! Shared fixtures for unit tests.

use crate::db;
use crate::directory::{self, DirectoryImport};
use crate::tenant::Tenant;
use rusqlite::Connection;
use serde_json::{json, Value};

pub const TENANT: &str = "uni.edu";

pub fn tenant() -> Tenant {
    Tenant::new(TENANT, Some("fac-1@uni.edu")).expect("tenant")
}

/// One semester, two sections (sec-b without a semester), three courses with
/// maths at 4 credits, physics at 3 and art without credits.
pub fn seed_payload() -> Value {
    json!({
        "semesters": [
            { "id": "sem-1", "name": "Spring 2024", "startDate": "2024-01-08", "endDate": "2024-05-31" }
        ],
        "sections": [
            { "id": "sec-a", "name": "CSE-A", "semesterId": "sem-1" },
            { "id": "sec-b", "name": "CSE-B" }
        ],
        "courses": [
            { "id": "crs-math", "name": "Mathematics", "code": "MA101", "credits": 4 },
            { "id": "crs-phys", "name": "Physics", "code": "PH101", "credits": 3 },
            { "id": "crs-art", "name": "Art", "code": "AR101" }
        ],
        "faculty": [
            { "id": "fac-1", "name": "Dr. Iyer" },
            { "id": "fac-2", "name": "Dr. Osei" }
        ],
        "students": [
            { "id": "stu-1", "name": "Bilal Khan", "sectionId": "sec-a", "rollNo": "01" },
            { "id": "stu-2", "name": "Chen Wei", "sectionId": "sec-a", "rollNo": "02" },
            { "id": "stu-3", "name": "Asha Rao", "sectionId": "sec-a", "rollNo": "03" }
        ],
        "mappings": [
            { "sectionId": "sec-a", "courseId": "crs-math", "facultyId": "fac-1" },
            { "sectionId": "sec-a", "courseId": "crs-phys", "facultyId": "fac-2" },
            { "sectionId": "sec-a", "courseId": "crs-art", "facultyId": "fac-1" },
            { "sectionId": "sec-b", "courseId": "crs-math", "facultyId": "fac-1" }
        ]
    })
}

pub fn seeded_workspace() -> Connection {
    let conn = db::open_db_in_memory().expect("open in-memory workspace");
    let payload: DirectoryImport = serde_json::from_value(seed_payload()).expect("seed payload");
    directory::import(&conn, &tenant(), &payload).expect("seed directory");
    conn
}
