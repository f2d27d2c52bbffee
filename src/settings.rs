//! Per-tenant policy stored as JSON in the `settings` table.

use crate::db;
use crate::tenant::Tenant;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Attendance,
    Reports,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Attendance, SetupSection::Reports];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Reports => "reports",
        }
    }

    /// One settings row per institution, e.g. `setup.attendance:uni.edu`.
    fn key(self, tenant: &Tenant) -> String {
        format!("setup.{}:{}", self.name(), tenant.domain())
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Attendance => json!({
            "defaultWindowStart": "2000-01-01",
            "defaultWindowEnd": "2099-12-31",
            "enforceMappings": true
        }),
        SetupSection::Reports => json!({
            "defaultCourseCredits": 4.0
        }),
    }
}

fn parse_date_field(v: &Value, key: &str) -> Result<Value, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{key} must be a YYYY-MM-DD string"))?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{key} must be a YYYY-MM-DD string"))?;
    Ok(Value::String(s.trim().to_string()))
}

fn parse_bool_field(v: &Value, key: &str) -> Result<Value, String> {
    v.as_bool()
        .map(Value::Bool)
        .ok_or_else(|| format!("{key} must be a boolean"))
}

fn parse_positive_number(v: &Value, key: &str, max: f64) -> Result<Value, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{key} must be a number"))?;
    if !(n > 0.0 && n <= max) {
        return Err(format!("{key} must be > 0 and <= {max}"));
    }
    Ok(json!(n))
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        let parsed = match (section, k.as_str()) {
            (SetupSection::Attendance, "defaultWindowStart" | "defaultWindowEnd") => {
                parse_date_field(v, k)?
            }
            (SetupSection::Attendance, "enforceMappings") => parse_bool_field(v, k)?,
            (SetupSection::Reports, "defaultCourseCredits") => parse_positive_number(v, k, 40.0)?,
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        };
        obj.insert(k.clone(), parsed);
    }
    if section == SetupSection::Attendance {
        let start = obj.get("defaultWindowStart").and_then(|v| v.as_str());
        let end = obj.get("defaultWindowEnd").and_then(|v| v.as_str());
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err("defaultWindowStart must not be after defaultWindowEnd".to_string());
            }
        }
    }
    Ok(())
}

pub fn load_section(
    conn: &Connection,
    tenant: &Tenant,
    section: SetupSection,
) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, &section.key(tenant))? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let mut candidate = current.clone();
                if merge_section_patch(section, &mut candidate, &one).is_ok() {
                    current = candidate;
                }
            }
        }
    }
    Ok(current)
}

pub fn update_section(
    conn: &Connection,
    tenant: &Tenant,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, tenant, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, &section.key(tenant), &current)?;
    Ok(Ok(current))
}

/// Attendance recorder policy derived from `setup.attendance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendancePolicy {
    pub default_window_start: NaiveDate,
    pub default_window_end: NaiveDate,
    pub enforce_mappings: bool,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self::from_section(&default_section(SetupSection::Attendance))
    }
}

impl AttendancePolicy {
    pub fn load(conn: &Connection, tenant: &Tenant) -> anyhow::Result<Self> {
        Ok(Self::from_section(&load_section(
            conn,
            tenant,
            SetupSection::Attendance,
        )?))
    }

    fn from_section(v: &Value) -> Self {
        let date = |key: &str, fallback: (i32, u32, u32)| {
            v.get(key)
                .and_then(|d| d.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .or_else(|| NaiveDate::from_ymd_opt(fallback.0, fallback.1, fallback.2))
                .unwrap_or(NaiveDate::MIN)
        };
        Self {
            default_window_start: date("defaultWindowStart", (2000, 1, 1)),
            default_window_end: date("defaultWindowEnd", (2099, 12, 31)),
            enforce_mappings: v
                .get("enforceMappings")
                .and_then(|b| b.as_bool())
                .unwrap_or(true),
        }
    }
}

/// Reporter policy derived from `setup.reports`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportPolicy {
    pub default_course_credits: f64,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            default_course_credits: 4.0,
        }
    }
}

impl ReportPolicy {
    pub fn load(conn: &Connection, tenant: &Tenant) -> anyhow::Result<Self> {
        let v = load_section(conn, tenant, SetupSection::Reports)?;
        Ok(Self {
            default_course_credits: v
                .get("defaultCourseCredits")
                .and_then(|n| n.as_f64())
                .unwrap_or(4.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tenant;

    #[test]
    fn defaults_match_documented_window() {
        let p = AttendancePolicy::default();
        assert_eq!(p.default_window_start, NaiveDate::from_ymd_opt(2000, 1, 1).expect("date"));
        assert_eq!(p.default_window_end, NaiveDate::from_ymd_opt(2099, 12, 31).expect("date"));
        assert!(p.enforce_mappings);
        assert_eq!(ReportPolicy::default().default_course_credits, 4.0);
    }

    #[test]
    fn update_persists_and_policy_reads_it_back() {
        let conn = db::open_db_in_memory().expect("open");
        let patch = json!({ "enforceMappings": false, "defaultWindowStart": "2024-01-01" });
        let saved = update_section(
            &conn,
            &tenant(),
            SetupSection::Attendance,
            patch.as_object().expect("object"),
        )
        .expect("db")
        .expect("valid patch");
        assert_eq!(saved["enforceMappings"], json!(false));

        let policy = AttendancePolicy::load(&conn, &tenant()).expect("load");
        assert!(!policy.enforce_mappings);
        assert_eq!(
            policy.default_window_start,
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("date")
        );
    }

    #[test]
    fn invalid_patches_are_rejected_without_writing() {
        let conn = db::open_db_in_memory().expect("open");
        for patch in [
            json!({ "defaultCourseCredits": 0 }),
            json!({ "unknownField": 1 }),
            json!({ "defaultWindowStart": "2100-01-01" }),
        ] {
            let section = if patch.get("defaultWindowStart").is_some() {
                SetupSection::Attendance
            } else {
                SetupSection::Reports
            };
            let res = update_section(&conn, &tenant(), section, patch.as_object().expect("object"))
                .expect("db");
            assert!(res.is_err(), "patch accepted: {patch}");
        }
        let mut keys = conn.prepare("SELECT key FROM settings").expect("prepare");
        let saved: Vec<String> = keys
            .query_map([], |r| r.get(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .expect("keys");
        assert!(saved.iter().all(|k| !k.starts_with("setup.")), "{saved:?}");
    }

    #[test]
    fn malformed_saved_fields_fall_back_to_defaults() {
        let conn = db::open_db_in_memory().expect("open");
        db::settings_set_json(
            &conn,
            "setup.reports:uni.edu",
            &json!({ "defaultCourseCredits": "lots" }),
        )
        .expect("set");
        assert_eq!(
            ReportPolicy::load(&conn, &tenant()).expect("load").default_course_credits,
            4.0
        );
    }

    #[test]
    fn sections_are_kept_per_tenant() {
        let conn = db::open_db_in_memory().expect("open");
        let other = Tenant::new("other.edu", None).expect("tenant");
        let patch = json!({ "enforceMappings": false });
        update_section(
            &conn,
            &other,
            SetupSection::Attendance,
            patch.as_object().expect("object"),
        )
        .expect("db")
        .expect("valid patch");

        assert!(!AttendancePolicy::load(&conn, &other).expect("load").enforce_mappings);
        assert!(AttendancePolicy::load(&conn, &tenant()).expect("load").enforce_mappings);
        assert_eq!(
            load_section(&conn, &tenant(), SetupSection::Attendance).expect("load"),
            default_section(SetupSection::Attendance)
        );
    }
}
