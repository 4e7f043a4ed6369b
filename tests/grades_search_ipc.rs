mod common;

use common::{admin, spawn_sidecar, teacher, Sidecar};
use serde_json::json;

fn upload(
    sc: &mut Sidecar,
    actor: &serde_json::Value,
    username: &str,
    subject: &str,
    term: &str,
    session: &str,
) {
    sc.request_ok(
        "grades.upload",
        json!({
            "studentUsername": username,
            "subject": subject,
            "term": term,
            "session": session,
            "exam": 50
        }),
        Some(actor.clone()),
    );
}

fn rows(result: &serde_json::Value) -> Vec<(String, String)> {
    result["grades"]
        .as_array()
        .expect("grades")
        .iter()
        .map(|g| {
            (
                g["studentName"].as_str().unwrap_or_default().to_string(),
                g["subject"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn search_orders_by_surname_then_subject_and_filters() {
    let mut sc = spawn_sidecar();
    let jss1 = sc.classroom("JSS1");
    let jss2 = sc.classroom("JSS2");
    let teacher_id = sc.user("mr.bello", "Tunde", "Bello", "teacher", None);
    sc.user("adaeze", "Adaeze", "Okafor", "student", Some(&jss1));
    sc.user("bayo", "Bayo", "Adeyemi", "student", Some(&jss1));
    sc.user("chika", "Chika", "Zubair", "student", Some(&jss2));
    let actor = teacher(&teacher_id);

    upload(&mut sc, &actor, "adaeze", "Mathematics", "1st Term", "2024/2025");
    upload(&mut sc, &actor, "adaeze", "English", "1st Term", "2024/2025");
    upload(&mut sc, &actor, "chika", "Biology", "1st Term", "2024/2025");
    upload(&mut sc, &actor, "bayo", "Mathematics", "2nd Term", "2024/2025");
    upload(&mut sc, &actor, "bayo", "Civic Education", "1st Term", "2023/2024");

    let all = sc.request_ok("grades.search", json!({}), Some(actor.clone()));
    assert_eq!(
        rows(&all),
        pairs(&[
            ("Adeyemi, Bayo", "Civic Education"),
            ("Adeyemi, Bayo", "Mathematics"),
            ("Okafor, Adaeze", "English"),
            ("Okafor, Adaeze", "Mathematics"),
            ("Zubair, Chika", "Biology"),
        ])
    );
    let first = &all["grades"][0];
    assert_eq!(first["username"], json!("bayo"));
    assert_eq!(first["term"], json!("1st Term"));
    assert_eq!(first["session"], json!("2023/2024"));
    assert_eq!(first["totalScore"], json!(50));
    assert_eq!(first["grade"], json!("C"));

    let by_term = sc.request_ok(
        "grades.search",
        json!({ "term": "1st Term", "session": "2024" }),
        Some(actor.clone()),
    );
    assert_eq!(
        rows(&by_term),
        pairs(&[
            ("Adeyemi, Bayo", "Civic Education"),
            ("Okafor, Adaeze", "English"),
            ("Okafor, Adaeze", "Mathematics"),
            ("Zubair, Chika", "Biology"),
        ])
    );

    let by_session = sc.request_ok(
        "grades.search",
        json!({ "session": "2024/2025", "student": "ADA" }),
        Some(actor.clone()),
    );
    assert_eq!(
        rows(&by_session),
        pairs(&[
            ("Okafor, Adaeze", "English"),
            ("Okafor, Adaeze", "Mathematics"),
        ])
    );

    let by_class = sc.request_ok(
        "grades.search",
        json!({ "classroomId": jss2 }),
        Some(admin()),
    );
    assert_eq!(rows(&by_class), pairs(&[("Zubair, Chika", "Biology")]));

    let none = sc.request_ok(
        "grades.search",
        json!({ "student": "100%" }),
        Some(actor),
    );
    assert!(rows(&none).is_empty());
}

#[test]
fn class_listing_groups_reports_under_a_classroom() {
    let mut sc = spawn_sidecar();
    let jss1 = sc.classroom("JSS1");
    let teacher_id = sc.user("mr.bello", "Tunde", "Bello", "teacher", None);
    sc.user("adaeze", "Adaeze", "Okafor", "student", Some(&jss1));
    sc.user("bayo", "Bayo", "Adeyemi", "student", Some(&jss1));
    let actor = teacher(&teacher_id);

    upload(&mut sc, &actor, "adaeze", "Mathematics", "1st Term", "2024/2025");
    upload(&mut sc, &actor, "adaeze", "English", "1st Term", "2024/2025");
    upload(&mut sc, &actor, "bayo", "English", "1st Term", "2024/2025");

    let listed = sc.request_ok(
        "reports.listClass",
        json!({ "classroomName": "jss1", "term": "1st Term" }),
        Some(actor.clone()),
    );
    assert_eq!(listed["classroom"]["id"].as_str(), Some(jss1.as_str()));
    let reports = listed["reports"].as_array().expect("reports");
    let summary: Vec<(&str, i64)> = reports
        .iter()
        .map(|r| {
            (
                r["studentName"].as_str().unwrap_or_default(),
                r["subjectCount"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(summary, vec![("Adeyemi, Bayo", 1), ("Okafor, Adaeze", 2)]);

    let classes = sc.request_ok("classrooms.list", json!({}), Some(actor));
    assert_eq!(classes["classrooms"][0]["studentCount"], json!(2));
    assert_eq!(classes["classrooms"][0]["reportCount"], json!(2));
}
