use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{json, Value};

use crate::authz::{self, Capability, Role};
use crate::error::{GradebookError, Result};
use crate::grading::FieldError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, required_str, FormReader};
use crate::ipc::types::{AppState, Request};
use crate::skills;
use crate::store::reports::{self as report_store, PeriodFilter, ReportKey, ReportSummary};
use crate::store::roster::{self, User};
use crate::store::skills as skill_store;

use super::setup;

/// Report summary fields of a form; absent keys stay out of the patch.
pub(super) fn read_summary(f: &mut FormReader<'_>) -> ReportSummary {
    ReportSummary {
        total_available_score: f.int_patch("totalAvailableScore", "total_available_score"),
        overall_score: f.int_patch("overallScore", "overall_score"),
        overall_average: f.float_patch("overallAverage", "overall_average"),
        overall_position: f.text_patch("overallPosition", "overall_position"),
        teacher_comment: f.text_patch("teacherComment", "teacher_comment"),
        admin_comment: f.text_patch("adminComment", "admin_comment"),
        next_term_date: f.date_patch("nextTermDate", "next_term_date"),
    }
}

/// `studentId` or `studentUsername`; students asking about themselves may
/// leave both out. Students get `forbidden` for any other key, known or not.
fn resolve_student(conn: &Connection, req: &Request) -> Result<User> {
    let actor = req.actor.as_ref();
    let named = optional_str(req, "studentId").or_else(|| optional_str(req, "studentUsername"));
    let key = match (named, actor) {
        (Some(k), _) => k,
        (None, Some(a)) if a.role == Role::Student => a.user_id.as_str(),
        (None, _) => return Err(GradebookError::bad_params("missing studentId")),
    };
    let student = match roster::find_student(conn, key) {
        Ok(s) => s,
        Err(GradebookError::NotFound { .. })
            if !actor.is_some_and(|a| a.role.allows(Capability::ViewAnyReport)) =>
        {
            return Err(GradebookError::Forbidden(
                "students may only view their own reports".into(),
            ));
        }
        Err(e) => return Err(e),
    };
    authz::ensure_can_view_student(actor, &student.id)?;
    Ok(student)
}

fn period(req: &Request) -> PeriodFilter<'_> {
    PeriodFilter {
        term: optional_str(req, "term"),
        session: optional_str(req, "session"),
    }
}

fn handle_reports_upsert(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let mut f = FormReader::new(Some(&req.params));
    let student_key = f
        .text("studentId")
        .or_else(|| f.text("studentUsername"))
        .unwrap_or_default();
    if student_key.is_empty() {
        f.errors.push(FieldError::new("student", "required"));
    }
    let term = f.required_text("term", "term");
    let session = f.required_text("session", "session");
    let summary = read_summary(&mut f);

    let mut errors = f.errors;
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

    let student = roster::find_student(conn, &student_key)?;
    let classroom_id = match (
        optional_str(req, "classroomId"),
        optional_str(req, "classroomName"),
    ) {
        (Some(id), _) => roster::find_classroom(conn, id)?.id,
        (None, Some(name)) => roster::find_classroom_by_name(conn, name)?.id,
        (None, None) => student
            .classroom_id
            .clone()
            .ok_or_else(|| GradebookError::bad_params("student has no classroom"))?,
    };

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let key = ReportKey::new(&student.id, &classroom_id, &term, &session);
    let outcome = report_store::upsert_report(&tx, &key, &summary)?;
    let ratings_stored = skill_store::set_ratings(&tx, &student.id, &outcome.id, &ratings)?;
    tx.commit()?;

    Ok(json!({
        "reportId": outcome.id,
        "created": outcome.created,
        "ratingsStored": ratings_stored
    }))
}

fn handle_reports_get(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let report_id = required_str(req, "reportId")?;
    let owner = skill_store::report_student(conn, report_id)?;
    authz::ensure_can_view_student(req.actor.as_ref(), &owner)?;
    let policy = setup::grading_policy(conn)?;
    let card = report_store::report_card(conn, report_id, policy)?;
    Ok(json!({ "card": card }))
}

fn handle_reports_for_student(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let student = resolve_student(conn, req)?;
    let reports = report_store::list_for_student(conn, &student.id, &period(req))?;
    Ok(json!({
        "student": student,
        "reports": reports
    }))
}

/// The card for the workspace's configured term and session.
fn handle_reports_current(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let student = resolve_student(conn, req)?;
    let (term, session) = setup::current_period(conn)?;
    let report = report_store::find_report(conn, &student.id, &term, &session)?
        .ok_or_else(|| GradebookError::not_found("report", format!("{}/{}", term, session)))?;
    let policy = setup::grading_policy(conn)?;
    let card = report_store::report_card(conn, &report.id, policy)?;
    Ok(json!({
        "term": term,
        "session": session,
        "card": card
    }))
}

fn handle_reports_list_class(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let classroom = match optional_str(req, "classroomId") {
        Some(id) => roster::find_classroom(conn, id)?,
        None => roster::find_classroom_by_name(conn, required_str(req, "classroomName")?)?,
    };
    let rows = report_store::list_for_classroom(conn, &classroom.id, &period(req))?;
    Ok(json!({
        "classroom": classroom,
        "reports": rows
    }))
}

fn handle_reports_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let report_id = required_str(req, "reportId")?;
    let deleted = report_store::delete_report(conn, report_id)?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.upsert" => Some(respond(&req.id, handle_reports_upsert(state, req))),
        "reports.get" => Some(respond(&req.id, handle_reports_get(state, req))),
        "reports.forStudent" => Some(respond(&req.id, handle_reports_for_student(state, req))),
        "reports.current" => Some(respond(&req.id, handle_reports_current(state, req))),
        "reports.listClass" => Some(respond(&req.id, handle_reports_list_class(state, req))),
        "reports.delete" => Some(respond(&req.id, handle_reports_delete(state, req))),
        _ => None,
    }
}
