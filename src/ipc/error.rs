use crate::error::RecordsError;
use serde_json::json;

pub fn ok(id: &str, message: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "code": 200,
        "message": message,
        "data": data
    })
}

pub fn err(
    id: &str,
    status: u16,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let message = message.into();
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "code": status,
        "message": message,
        "error": error,
    })
}

pub fn fail(id: &str, e: &RecordsError) -> serde_json::Value {
    err(
        id,
        e.status(),
        e.code(),
        e.public_message(),
        e.details().cloned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_mirror_status() {
        let v = ok("1", "done", json!({ "exists": true }));
        assert_eq!(v["code"], json!(200));
        assert_eq!(v["data"]["exists"], json!(true));

        let e = RecordsError::not_found("no marks recorded for Quiz")
            .with_details(json!({ "examType": "Quiz" }));
        let v = fail("2", &e);
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["code"], json!(404));
        assert_eq!(v["error"]["code"], json!("not_found"));
        assert_eq!(v["error"]["details"]["examType"], json!("Quiz"));
    }

    #[test]
    fn internal_failures_do_not_leak_storage_text() {
        let v = fail("3", &RecordsError::internal("db_query_failed", "disk I/O error"));
        assert_eq!(v["code"], json!(500));
        assert_eq!(v["message"], json!("internal storage error"));
        assert!(v["error"].get("details").is_none());
    }
}
