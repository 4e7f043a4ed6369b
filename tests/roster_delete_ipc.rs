mod common;

use common::{admin, spawn_sidecar, teacher};
use serde_json::json;

fn count(sc: &mut common::Sidecar, student_id: &str) -> usize {
    let listed = sc.request_ok(
        "reports.forStudent",
        json!({ "studentId": student_id }),
        Some(admin()),
    );
    listed["reports"].as_array().map(|r| r.len()).unwrap_or_default()
}

#[test]
fn deleting_a_report_removes_its_grades_and_ratings() {
    let mut sc = spawn_sidecar();
    let class_id = sc.classroom("JSS3");
    let teacher_id = sc.user("mr.bello", "Tunde", "Bello", "teacher", None);
    let ada = sc.user("adaeze", "Adaeze", "Okafor", "student", Some(&class_id));
    let actor = Some(teacher(&teacher_id));

    let mut report_id = String::new();
    let mut english_id = String::new();
    for subject in ["Mathematics", "English"] {
        let up = sc.request_ok(
            "grades.upload",
            json!({
                "studentId": ada,
                "subject": subject,
                "term": "1st Term",
                "session": "2024/2025",
                "exam": 44,
                "skills": { "Politeness": 5, "Industry": 4 }
            }),
            actor.clone(),
        );
        report_id = up["reportId"].as_str().expect("reportId").to_string();
        if subject == "English" {
            english_id = up["subjectGradeId"].as_str().expect("id").to_string();
        }
    }

    sc.request_ok(
        "grades.delete",
        json!({ "subjectGradeId": english_id }),
        actor.clone(),
    );
    let error = sc.request_err(
        "grades.delete",
        json!({ "subjectGradeId": english_id }),
        actor.clone(),
    );
    assert_eq!(error["code"], json!("not_found"));

    let deleted = sc.request_ok("reports.delete", json!({ "reportId": report_id }), actor.clone());
    assert_eq!(deleted["deleted"]["subjectGrades"], json!(1));
    assert_eq!(deleted["deleted"]["skillRatings"], json!(2));

    let error = sc.request_err("reports.get", json!({ "reportId": report_id }), actor.clone());
    assert_eq!(error["code"], json!("not_found"));
    let found = sc.request_ok("grades.search", json!({}), actor);
    assert_eq!(found["grades"], json!([]));
    assert_eq!(count(&mut sc, &ada), 0);
}

#[test]
fn roster_deletes_cascade_to_reports() {
    let mut sc = spawn_sidecar();
    let jss1 = sc.classroom("JSS1");
    let jss2 = sc.classroom("JSS2");
    let ada = sc.user("adaeze", "Adaeze", "Okafor", "student", Some(&jss1));
    let bayo = sc.user("bayo", "Bayo", "Adeyemi", "student", Some(&jss2));
    let teacher_id = sc.user("mr.bello", "Tunde", "Bello", "teacher", None);

    for student_id in [&ada, &bayo] {
        sc.request_ok(
            "grades.upload",
            json!({
                "studentId": student_id,
                "subject": "Mathematics",
                "term": "1st Term",
                "session": "2024/2025",
                "exam": 55
            }),
            Some(teacher(&teacher_id)),
        );
    }

    sc.request_ok("classrooms.delete", json!({ "classroomId": jss1 }), Some(admin()));
    assert_eq!(count(&mut sc, &ada), 0);
    assert_eq!(count(&mut sc, &bayo), 1);

    let users = sc.request_ok("users.list", json!({ "role": "student" }), Some(admin()));
    let ada_row = users["users"]
        .as_array()
        .expect("users")
        .iter()
        .find(|u| u["username"] == json!("adaeze"))
        .cloned()
        .expect("adaeze kept");
    assert_eq!(ada_row["classroomId"], json!(null));
    assert_eq!(ada_row["displayName"], json!("Okafor, Adaeze"));

    // Grades keep their rows when the uploading teacher leaves.
    sc.request_ok("users.delete", json!({ "userId": teacher_id }), Some(admin()));
    let found = sc.request_ok("grades.search", json!({}), Some(admin()));
    assert_eq!(found["grades"][0]["uploadedBy"], json!(null));

    sc.request_ok("users.delete", json!({ "userId": bayo }), Some(admin()));
    let found = sc.request_ok("grades.search", json!({}), Some(admin()));
    assert_eq!(found["grades"], json!([]));

    let error = sc.request_err("users.delete", json!({ "userId": bayo }), Some(admin()));
    assert_eq!(error["code"], json!("not_found"));
}

#[test]
fn roster_rejects_duplicates_and_bad_input() {
    let mut sc = spawn_sidecar();
    let class_id = sc.classroom("JSS1");

    let error = sc.request_err("classrooms.create", json!({ "name": "jss1" }), Some(admin()));
    assert_eq!(error["code"], json!("conflict"));

    sc.user("adaeze", "Adaeze", "Okafor", "student", Some(&class_id));
    let error = sc.request_err(
        "users.create",
        json!({
            "username": "ADAEZE",
            "firstName": "Another",
            "lastName": "Okafor",
            "role": "student"
        }),
        Some(admin()),
    );
    assert_eq!(error["code"], json!("conflict"));

    let error = sc.request_err(
        "users.create",
        json!({ "username": "x", "firstName": "X", "lastName": "Y", "role": "janitor" }),
        Some(admin()),
    );
    assert_eq!(error["code"], json!("bad_params"));

    let error = sc.request_err(
        "users.create",
        json!({ "username": "y", "lastName": "Y", "role": "student" }),
        Some(admin()),
    );
    assert_eq!(error["code"], json!("bad_params"));

    let error = sc.request_err(
        "users.create",
        json!({
            "username": "z",
            "firstName": "Z",
            "lastName": "Z",
            "role": "student",
            "classroomName": "SS9"
        }),
        Some(admin()),
    );
    assert_eq!(error["code"], json!("not_found"));

    let error = sc.request_err("classrooms.delete", json!({ "classroomId": "nope" }), Some(admin()));
    assert_eq!(error["code"], json!("not_found"));
}
