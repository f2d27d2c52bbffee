mod support;

use serde_json::{json, Value};
use support::{math, with, Sidecar};

fn batch(exam_type: &str, total: f64, scores: &[(&str, f64)]) -> Value {
    with(
        math(),
        json!({
            "examType": exam_type,
            "totalMarks": total,
            "passingMarks": total * 0.4,
            "entries": scores
                .iter()
                .map(|(s, m)| json!({ "studentId": s, "marksScored": m }))
                .collect::<Vec<_>>()
        }),
    )
}

fn marks_for(sc: &mut Sidecar, exam_type: &str) -> Vec<Value> {
    let data = sc.ok("marks.byExamType", with(math(), json!({ "examType": exam_type })));
    data["marks"].as_array().cloned().unwrap_or_default()
}

#[test]
fn score_above_total_writes_nothing() {
    let mut sc = Sidecar::start();
    sc.seed();
    let (status, code) = sc.fails(
        "marks.bulkAdd",
        batch("Quiz", 50.0, &[("stu-1", 40.0), ("stu-2", 51.0)]),
    );
    assert_eq!((status, code.as_str()), (400, "bad_params"));
    assert!(marks_for(&mut sc, "Quiz").is_empty());
}

#[test]
fn add_then_conflict_then_update() {
    let mut sc = Sidecar::start();
    sc.seed();

    let added = sc.ok(
        "marks.bulkAdd",
        batch("Midterm-1", 50.0, &[("stu-1", 45.0), ("stu-2", 30.0)]),
    );
    assert_eq!(added, json!({ "insertedCount": 2 }));

    let (status, code) = sc.fails("marks.bulkAdd", batch("Midterm-1", 50.0, &[("stu-3", 20.0)]));
    assert_eq!((status, code.as_str()), (400, "conflict"));

    let updated = sc.ok(
        "marks.bulkUpdate",
        batch("Midterm-1", 50.0, &[("stu-2", 33.0), ("stu-3", 20.0)]),
    );
    assert_eq!(updated, json!({ "matched": 1, "modified": 1, "upserted": 1 }));

    let rows = marks_for(&mut sc, "Midterm-1");
    let names: Vec<_> = rows.iter().map(|r| r["studentName"].clone()).collect();
    assert_eq!(names, vec![json!("Asha Rao"), json!("Bilal Khan"), json!("Chen Wei")]);
    assert_eq!(rows[2]["marksScored"], json!(33.0));
    assert_eq!(rows[2]["examType"], json!("Midterm-1"));
}

#[test]
fn update_without_prior_batch_is_not_found() {
    let mut sc = Sidecar::start();
    sc.seed();
    let (status, code) = sc.fails("marks.bulkUpdate", batch("Final", 100.0, &[("stu-1", 70.0)]));
    assert_eq!((status, code.as_str()), (404, "not_found"));
    assert!(marks_for(&mut sc, "Final").is_empty());
}

#[test]
fn exam_types_list_and_delete() {
    let mut sc = Sidecar::start();
    sc.seed();
    for et in ["Reattempt-Midterm-1", "Lab", "Midterm-2"] {
        sc.ok("marks.bulkAdd", batch(et, 20.0, &[("stu-1", 10.0)]));
    }
    let types = sc.ok("marks.examTypes", math());
    assert_eq!(
        types["examTypes"],
        json!(["Midterm-2", "Lab", "Reattempt-Midterm-1"])
    );

    let deleted = sc.ok("marks.deleteByExamType", with(math(), json!({ "examType": "Lab" })));
    assert_eq!(deleted, json!({ "deletedCount": 1 }));
    let (status, _) = sc.fails("marks.deleteByExamType", with(math(), json!({ "examType": "Lab" })));
    assert_eq!(status, 404);

    let (_, code) = sc.fails("marks.byExamType", with(math(), json!({ "examType": "Viva" })));
    assert_eq!(code, "unknown_exam_type");
}

#[test]
fn entry_remarks_override_batch_remarks() {
    let mut sc = Sidecar::start();
    sc.seed();
    let mut params = batch("Assignment", 10.0, &[("stu-1", 9.0), ("stu-2", 5.0)]);
    params["remarks"] = json!("graded by TA");
    params["entries"][1]["remarks"] = json!("late");
    sc.ok("marks.bulkAdd", params);

    let rows = marks_for(&mut sc, "Assignment");
    let by_id = |id: &str| {
        rows.iter()
            .find(|r| r["studentId"] == json!(id))
            .map(|r| r["remarks"].clone())
            .expect("row")
    };
    assert_eq!(by_id("stu-1"), json!("graded by TA"));
    assert_eq!(by_id("stu-2"), json!("late"));
}
