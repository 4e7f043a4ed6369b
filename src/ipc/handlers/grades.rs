use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{json, Value};
use tracing::info;

use crate::authz::Actor;
use crate::error::{GradebookError, Result};
use crate::grading::{self, ComponentScores, FieldError, TermScores};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, required_str, FormReader};
use crate::ipc::types::{AppState, Request};
use crate::skills::{self, BehaviouralSkill};
use crate::store::grades::{self as grade_store, GradeSearch, SubjectGradeInput};
use crate::store::reports::{self as report_store, ReportKey, ReportSummary};
use crate::store::roster;
use crate::store::skills as skill_store;

use super::reports::read_summary;
use super::setup;

fn read_scores(f: &mut FormReader<'_>) -> (ComponentScores, TermScores) {
    let scores = ComponentScores {
        first_test: f.int("firstTest", "first_test"),
        second_test: f.int("secondTest", "second_test"),
        exam: f.int("exam", "exam"),
        manual_total: f.int("manualTotal", "manual_total"),
    };
    let term_scores = TermScores {
        first_term_score: f.int("firstTermScore", "first_term_score"),
        second_term_score: f.int("secondTermScore", "second_term_score"),
        average_score: f.float("averageScore", "average_score"),
    };
    (scores, term_scores)
}

/// One uploaded row: a subject grade plus optional report summary and
/// skill ratings, all for the same (student, term, session).
struct UploadForm {
    student: String,
    term: String,
    session: String,
    input: SubjectGradeInput,
    summary: ReportSummary,
    ratings: Vec<(BehaviouralSkill, i64)>,
}

/// Parses the whole form before touching storage so every bad field is
/// reported in one reply.
fn read_upload_form(req: &Request) -> Result<UploadForm> {
    let mut f = FormReader::new(Some(&req.params));
    let student = f
        .text("studentId")
        .or_else(|| f.text("studentUsername"))
        .unwrap_or_default();
    if student.is_empty() {
        f.errors.push(FieldError::new("student", "required"));
    }
    let subject = f.required_text("subject", "subject");
    let term = f.required_text("term", "term");
    let session = f.required_text("session", "session");
    let (scores, term_scores) = read_scores(&mut f);
    let manual_grade = grading::normalize_manual_grade(f.text("manualGrade").as_deref());
    let grade_comment = f.text("gradeComment");

    let mut report_form = FormReader::new(req.params.get("report"));
    let summary = read_summary(&mut report_form);

    let mut errors = f.errors;
    errors.extend(grading::validate(&scores, &term_scores));
    errors.extend(report_form.errors);
    errors.extend(summary.validate());
    let ratings = match skills::parse_rating_batch(req.params.get("skills")) {
        Ok(r) => r,
        Err(e) => {
            errors.extend(e);
            Vec::new()
        }
    };
    if !errors.is_empty() {
        return Err(GradebookError::Validation(errors));
    }

    Ok(UploadForm {
        student,
        term,
        session,
        input: SubjectGradeInput {
            subject,
            scores,
            manual_grade,
            term_scores,
            grade_comment,
            uploaded_by: None,
        },
        summary,
        ratings,
    })
}

/// The classroom named in the request, else the student's own.
fn resolve_classroom(conn: &Connection, req: &Request, student: &roster::User) -> Result<String> {
    if let Some(id) = optional_str(req, "classroomId") {
        return Ok(roster::find_classroom(conn, id)?.id);
    }
    if let Some(name) = optional_str(req, "classroomName") {
        return Ok(roster::find_classroom_by_name(conn, name)?.id);
    }
    student.classroom_id.clone().ok_or_else(|| {
        GradebookError::bad_params("student has no classroom; pass classroomId or classroomName")
    })
}

/// Uploader is recorded only when the actor is a known user.
fn resolve_uploader(conn: &Connection, actor: Option<&Actor>) -> Result<Option<String>> {
    let Some(actor) = actor else {
        return Ok(None);
    };
    match roster::find_user(conn, &actor.user_id) {
        Ok(u) => Ok(Some(u.id)),
        Err(GradebookError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn handle_grades_upload(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let mut form = read_upload_form(req)?;
    let student = roster::find_student(conn, &form.student)?;
    let classroom_id = resolve_classroom(conn, req, &student)?;
    form.input.uploaded_by = resolve_uploader(conn, req.actor.as_ref())?;
    let policy = setup::grading_policy(conn)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let key = ReportKey::new(&student.id, &classroom_id, &form.term, &form.session);
    let report = report_store::upsert_report(&tx, &key, &form.summary)?;
    let grade = grade_store::upsert_subject_grade(&tx, &report.id, &form.input)?;
    let ratings_stored = skill_store::set_ratings(&tx, &student.id, &report.id, &form.ratings)?;
    tx.commit()?;

    info!(
        report_id = %report.id,
        subject = %form.input.subject,
        created = grade.created,
        summary = !form.summary.is_empty(),
        "grade uploaded"
    );
    Ok(json!({
        "reportId": report.id,
        "reportCreated": report.created,
        "subjectGradeId": grade.id,
        "created": grade.created,
        "totalScore": form.input.scores.total(),
        "grade": grading::compute_grade(
            form.input.scores.total(),
            form.input.manual_grade.as_deref(),
            policy
        ),
        "ratingsStored": ratings_stored
    }))
}

/// Derived total and letter for unsaved form values.
fn handle_grades_preview(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let policy = setup::grading_policy(conn)?;
    let mut f = FormReader::new(Some(&req.params));
    let (scores, term_scores) = read_scores(&mut f);
    let manual_grade = f.text("manualGrade");

    let mut errors = f.errors;
    errors.extend(grading::validate(&scores, &term_scores));
    let total = scores.total();
    Ok(json!({
        "totalScore": total,
        "grade": grading::compute_grade(total, manual_grade.as_deref(), policy),
        "valid": errors.is_empty(),
        "errors": errors,
        "policy": policy
    }))
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let id = required_str(req, "subjectGradeId")?;
    let grade = grade_store::get_subject_grade(conn, id)?;
    grade_store::delete_subject_grade(conn, id)?;
    Ok(json!({
        "ok": true,
        "subjectGradeId": grade.id,
        "reportId": grade.report_id,
        "subject": grade.subject
    }))
}

fn handle_grades_search(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let policy = setup::grading_policy(conn)?;
    let q = GradeSearch {
        student: optional_str(req, "student"),
        term: optional_str(req, "term"),
        session: optional_str(req, "session"),
        classroom_id: optional_str(req, "classroomId"),
    };
    let rows = grade_store::search(conn, &q, policy)?;
    Ok(json!({ "grades": rows, "policy": policy }))
}

fn handle_skills_set(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let report_id = required_str(req, "reportId")?;
    let ratings =
        skills::parse_rating_batch(req.params.get("skills")).map_err(GradebookError::Validation)?;
    let student_id = skill_store::report_student(conn, report_id)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let stored = skill_store::set_ratings(&tx, &student_id, report_id, &ratings)?;
    tx.commit()?;

    let current = skill_store::ratings_for_report(conn, report_id)?;
    Ok(json!({ "ratingsStored": stored, "skills": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.upload" => Some(respond(&req.id, handle_grades_upload(state, req))),
        "grades.preview" => Some(respond(&req.id, handle_grades_preview(state, req))),
        "grades.delete" => Some(respond(&req.id, handle_grades_delete(state, req))),
        "grades.search" => Some(respond(&req.id, handle_grades_search(state, req))),
        "skills.set" => Some(respond(&req.id, handle_skills_set(state, req))),
        _ => None,
    }
}
