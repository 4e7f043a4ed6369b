use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::{self, FieldError, GradingPolicy};

use super::grades::{self, SubjectGradeView};
use super::roster::{self, Classroom, User};
use super::skills::{self, SkillRating};
use super::{now_stamp, UpsertOutcome};

/// The (student, classroom, term, session) tuple a report is filed under.
/// Storage keeps one report per (student, term, session); the classroom
/// follows the latest upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub student_id: String,
    pub classroom_id: String,
    pub term: String,
    pub session: String,
}

impl ReportKey {
    pub fn new(
        student_id: impl Into<String>,
        classroom_id: impl Into<String>,
        term: &str,
        session: &str,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            classroom_id: classroom_id.into(),
            term: term.trim().to_string(),
            session: session.trim().to_string(),
        }
    }
}

/// Summary patch. Outer `None` leaves the stored value alone, `Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    pub total_available_score: Option<Option<i64>>,
    pub overall_score: Option<Option<i64>>,
    pub overall_average: Option<Option<f64>>,
    pub overall_position: Option<Option<String>>,
    pub teacher_comment: Option<Option<String>>,
    pub admin_comment: Option<Option<String>>,
    pub next_term_date: Option<Option<NaiveDate>>,
}

impl ReportSummary {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let Some(Some(v)) = self.total_available_score {
            if v < 0 {
                errors.push(FieldError::new("total_available_score", "must not be negative"));
            }
        }
        if let Some(Some(v)) = self.overall_score {
            if v < 0 {
                errors.push(FieldError::new("overall_score", "must not be negative"));
            }
        }
        if let Some(Some(v)) = self.overall_average {
            if !v.is_finite() || v < 0.0 {
                errors.push(FieldError::new("overall_average", "must not be negative"));
            }
        }
        errors
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub id: String,
    pub student_id: String,
    pub classroom_id: String,
    pub term: String,
    pub session: String,
    pub total_available_score: Option<i64>,
    pub overall_score: Option<i64>,
    pub overall_average: Option<f64>,
    pub overall_position: Option<String>,
    pub teacher_comment: Option<String>,
    pub admin_comment: Option<String>,
    pub next_term_date: Option<String>,
    pub date_uploaded: String,
}

const REPORT_COLUMNS: &str = "r.id, r.student_id, r.classroom_id, r.term, r.session,
    r.total_available_score, r.overall_score, r.overall_average, r.overall_position,
    r.teacher_comment, r.admin_comment, r.next_term_date, r.date_uploaded";

fn report_from_row(r: &Row<'_>) -> rusqlite::Result<GradeReport> {
    Ok(GradeReport {
        id: r.get(0)?,
        student_id: r.get(1)?,
        classroom_id: r.get(2)?,
        term: r.get(3)?,
        session: r.get(4)?,
        total_available_score: r.get(5)?,
        overall_score: r.get(6)?,
        overall_average: r.get(7)?,
        overall_position: r.get(8)?,
        teacher_comment: r.get(9)?,
        admin_comment: r.get(10)?,
        next_term_date: r.get(11)?,
        date_uploaded: r.get(12)?,
    })
}

fn find_report_id(conn: &Connection, key: &ReportKey) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM grade_reports WHERE student_id = ? AND term = ? AND session = ?",
            (&key.student_id, &key.term, &key.session),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn push_patch(sets: &mut Vec<String>, binds: &mut Vec<Value>, column: &str, patch: Option<Value>) {
    if let Some(v) = patch {
        sets.push(format!("{column} = ?"));
        binds.push(v);
    }
}

fn text_patch(p: &Option<Option<String>>) -> Option<Value> {
    p.as_ref().map(|v| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::Text(s.to_string()))
            .unwrap_or(Value::Null)
    })
}

/// Moves the report to `key.classroom_id`, applies the summary patch and
/// refreshes `date_uploaded`.
fn apply_summary(
    conn: &Connection,
    id: &str,
    key: &ReportKey,
    summary: &ReportSummary,
) -> Result<()> {
    let mut sets = vec!["classroom_id = ?".to_string(), "date_uploaded = ?".to_string()];
    let mut binds = vec![
        Value::Text(key.classroom_id.clone()),
        Value::Text(now_stamp()),
    ];
    push_patch(
        &mut sets,
        &mut binds,
        "total_available_score",
        summary
            .total_available_score
            .map(|v| v.map(Value::Integer).unwrap_or(Value::Null)),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "overall_score",
        summary
            .overall_score
            .map(|v| v.map(Value::Integer).unwrap_or(Value::Null)),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "overall_average",
        summary
            .overall_average
            .map(|v| v.map(Value::Real).unwrap_or(Value::Null)),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "overall_position",
        text_patch(&summary.overall_position),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "teacher_comment",
        text_patch(&summary.teacher_comment),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "admin_comment",
        text_patch(&summary.admin_comment),
    );
    push_patch(
        &mut sets,
        &mut binds,
        "next_term_date",
        summary.next_term_date.map(|v| {
            v.map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null)
        }),
    );
    binds.push(Value::Text(id.to_string()));

    let sql = format!("UPDATE grade_reports SET {} WHERE id = ?", sets.join(", "));
    conn.execute(&sql, params_from_iter(binds))?;
    Ok(())
}

/// Inserts the report row, or, when another writer created it first,
/// updates that row instead.
pub(crate) fn create_report(
    conn: &Connection,
    key: &ReportKey,
    summary: &ReportSummary,
) -> Result<UpsertOutcome> {
    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO grade_reports(id, student_id, classroom_id, term, session, date_uploaded)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &key.student_id,
            &key.classroom_id,
            &key.term,
            &key.session,
            now_stamp(),
        ),
    );
    match inserted {
        Ok(_) => {
            apply_summary(conn, &id, key, summary)?;
            info!(report_id = %id, student_id = %key.student_id, term = %key.term, session = %key.session, "report created");
            Ok(UpsertOutcome { id, created: true })
        }
        Err(e) if db::is_unique_violation(&e) => {
            warn!(student_id = %key.student_id, term = %key.term, session = %key.session, "report created concurrently; updating");
            let existing = find_report_id(conn, key)?.ok_or_else(|| {
                GradebookError::not_found("report", format!("{}/{}", key.term, key.session))
            })?;
            apply_summary(conn, &existing, key, summary)?;
            Ok(UpsertOutcome {
                id: existing,
                created: false,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Find-or-create on `key`; repeated calls update the same row.
pub fn upsert_report(
    conn: &Connection,
    key: &ReportKey,
    summary: &ReportSummary,
) -> Result<UpsertOutcome> {
    let mut errors = Vec::new();
    if key.term.is_empty() {
        errors.push(FieldError::new("term", "required"));
    }
    if key.session.is_empty() {
        errors.push(FieldError::new("session", "required"));
    }
    errors.extend(summary.validate());
    if !errors.is_empty() {
        return Err(GradebookError::Validation(errors));
    }

    match find_report_id(conn, key)? {
        Some(id) => {
            apply_summary(conn, &id, key, summary)?;
            debug!(report_id = %id, "report updated");
            Ok(UpsertOutcome { id, created: false })
        }
        None => create_report(conn, key, summary),
    }
}

pub fn get_report(conn: &Connection, id: &str) -> Result<GradeReport> {
    conn.query_row(
        &format!("SELECT {REPORT_COLUMNS} FROM grade_reports r WHERE r.id = ?"),
        [id],
        report_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("report", id))
}

pub fn find_report(
    conn: &Connection,
    student_id: &str,
    term: &str,
    session: &str,
) -> Result<Option<GradeReport>> {
    let report = conn
        .query_row(
            &format!(
                "SELECT {REPORT_COLUMNS} FROM grade_reports r
                 WHERE r.student_id = ? AND r.term = ? AND r.session = ?"
            ),
            (student_id, term.trim(), session.trim()),
            report_from_row,
        )
        .optional()?;
    Ok(report)
}

#[derive(Debug, Clone, Default)]
pub struct PeriodFilter<'a> {
    pub term: Option<&'a str>,
    pub session: Option<&'a str>,
}

impl PeriodFilter<'_> {
    fn push_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        if let Some(t) = self.term.map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(" AND r.term = ?");
            binds.push(Value::Text(t.to_string()));
        }
        if let Some(s) = self.session.map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(" AND r.session = ?");
            binds.push(Value::Text(s.to_string()));
        }
    }
}

pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    period: &PeriodFilter<'_>,
) -> Result<Vec<GradeReport>> {
    let mut sql = format!("SELECT {REPORT_COLUMNS} FROM grade_reports r WHERE r.student_id = ?");
    let mut binds = vec![Value::Text(student_id.to_string())];
    period.push_sql(&mut sql, &mut binds);
    sql.push_str(" ORDER BY r.session, r.term");

    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map(params_from_iter(binds), report_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reports)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReportRow {
    #[serde(flatten)]
    pub report: GradeReport,
    pub student_name: String,
    pub username: String,
    pub subject_count: i64,
}

/// Reports filed under a classroom, by student surname then first name.
pub fn list_for_classroom(
    conn: &Connection,
    classroom_id: &str,
    period: &PeriodFilter<'_>,
) -> Result<Vec<ClassReportRow>> {
    roster::find_classroom(conn, classroom_id)?;

    let mut sql = format!(
        "SELECT {REPORT_COLUMNS}, u.last_name, u.first_name, u.username,
           (SELECT COUNT(*) FROM subject_grades g WHERE g.report_id = r.id)
         FROM grade_reports r
         JOIN users u ON u.id = r.student_id
         WHERE r.classroom_id = ?"
    );
    let mut binds = vec![Value::Text(classroom_id.to_string())];
    period.push_sql(&mut sql, &mut binds);
    sql.push_str(
        " ORDER BY u.last_name COLLATE NOCASE, u.first_name COLLATE NOCASE, r.session, r.term",
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            let last: String = r.get(13)?;
            let first: String = r.get(14)?;
            Ok(ClassReportRow {
                report: report_from_row(r)?,
                student_name: format!("{}, {}", last, first),
                username: r.get(15)?,
                subject_count: r.get(16)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedReport {
    pub report_id: String,
    pub subject_grades: i64,
    pub skill_ratings: i64,
}

/// Deletes the report; its subject grades and ratings go with it.
pub fn delete_report(conn: &Connection, id: &str) -> Result<DeletedReport> {
    let tx = conn.unchecked_transaction()?;
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM grade_reports WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(GradebookError::not_found("report", id));
    }
    let subject_grades: i64 = tx.query_row(
        "SELECT COUNT(*) FROM subject_grades WHERE report_id = ?",
        [id],
        |r| r.get(0),
    )?;
    let skill_ratings: i64 = tx.query_row(
        "SELECT COUNT(*) FROM behavioural_skills WHERE report_id = ?",
        [id],
        |r| r.get(0),
    )?;
    tx.execute("DELETE FROM grade_reports WHERE id = ?", [id])?;
    tx.commit()?;

    info!(report_id = %id, subject_grades, skill_ratings, "report deleted");
    Ok(DeletedReport {
        report_id: id.to_string(),
        subject_grades,
        skill_ratings,
    })
}

/// Everything a printed report card shows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub report: GradeReport,
    pub student: User,
    pub classroom: Classroom,
    pub policy: GradingPolicy,
    pub subjects: Vec<SubjectGradeView>,
    pub skills: Vec<SkillRating>,
    /// Entered overall score, else the sum of subject totals.
    pub effective_overall_score: Option<i64>,
    /// Entered overall average, else the mean subject total.
    pub effective_overall_average: Option<f64>,
}

pub fn report_card(conn: &Connection, id: &str, policy: GradingPolicy) -> Result<ReportCard> {
    let report = get_report(conn, id)?;
    let student = roster::find_user(conn, &report.student_id)?;
    let classroom = roster::find_classroom(conn, &report.classroom_id)?;
    let subjects: Vec<SubjectGradeView> = grades::list_for_report(conn, id)?
        .iter()
        .map(|g| g.view(policy))
        .collect();
    let skills = skills::ratings_for_report(conn, id)?;

    let totals: Vec<i64> = subjects.iter().map(|s| s.total_score).collect();
    let effective_overall_score = report
        .overall_score
        .or_else(|| (!totals.is_empty()).then(|| totals.iter().sum()));
    let effective_overall_average = report
        .overall_average
        .or_else(|| grading::mean_total(&totals));

    Ok(ReportCard {
        report,
        student,
        classroom,
        policy,
        subjects,
        skills,
        effective_overall_score,
        effective_overall_average,
    })
}
