use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::{self, ComponentScores, FieldError, GradingPolicy, TermScores};

use super::{like_pattern, now_stamp, UpsertOutcome};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectGradeInput {
    pub subject: String,
    pub scores: ComponentScores,
    pub manual_grade: Option<String>,
    pub term_scores: TermScores,
    pub grade_comment: Option<String>,
    pub uploaded_by: Option<String>,
}

impl SubjectGradeInput {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.subject.trim().is_empty() {
            errors.push(FieldError::new("subject", "required"));
        }
        errors.extend(grading::validate(&self.scores, &self.term_scores));
        errors
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectGrade {
    pub id: String,
    pub report_id: String,
    pub subject: String,
    pub scores: ComponentScores,
    pub manual_grade: Option<String>,
    pub term_scores: TermScores,
    pub grade_comment: Option<String>,
    pub uploaded_by: Option<String>,
    pub date_uploaded: String,
}

impl SubjectGrade {
    pub fn total_score(&self) -> i64 {
        self.scores.total()
    }

    pub fn grade(&self, policy: GradingPolicy) -> String {
        grading::compute_grade(self.total_score(), self.manual_grade.as_deref(), policy)
    }

    pub fn view(&self, policy: GradingPolicy) -> SubjectGradeView {
        SubjectGradeView {
            id: self.id.clone(),
            report_id: self.report_id.clone(),
            subject: self.subject.clone(),
            first_test: self.scores.first_test,
            second_test: self.scores.second_test,
            exam: self.scores.exam,
            manual_total: self.scores.manual_total,
            manual_grade: self.manual_grade.clone(),
            first_term_score: self.term_scores.first_term_score,
            second_term_score: self.term_scores.second_term_score,
            average_score: self.term_scores.average_score,
            grade_comment: self.grade_comment.clone(),
            uploaded_by: self.uploaded_by.clone(),
            date_uploaded: self.date_uploaded.clone(),
            total_score: self.total_score(),
            grade: self.grade(policy),
        }
    }
}

/// A stored subject grade with its derived total and letter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGradeView {
    pub id: String,
    pub report_id: String,
    pub subject: String,
    pub first_test: Option<i64>,
    pub second_test: Option<i64>,
    pub exam: Option<i64>,
    pub manual_total: Option<i64>,
    pub manual_grade: Option<String>,
    pub first_term_score: Option<i64>,
    pub second_term_score: Option<i64>,
    pub average_score: Option<f64>,
    pub grade_comment: Option<String>,
    pub uploaded_by: Option<String>,
    pub date_uploaded: String,
    pub total_score: i64,
    pub grade: String,
}

const GRADE_COLUMNS: &str = "g.id, g.report_id, g.subject, g.first_test, g.second_test, g.exam,
    g.manual_total, g.manual_grade, g.first_term_score, g.second_term_score, g.average_score,
    g.grade_comment, g.uploaded_by, g.date_uploaded";

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<SubjectGrade> {
    Ok(SubjectGrade {
        id: r.get(0)?,
        report_id: r.get(1)?,
        subject: r.get(2)?,
        scores: ComponentScores {
            first_test: r.get(3)?,
            second_test: r.get(4)?,
            exam: r.get(5)?,
            manual_total: r.get(6)?,
        },
        manual_grade: r.get(7)?,
        term_scores: TermScores {
            first_term_score: r.get(8)?,
            second_term_score: r.get(9)?,
            average_score: r.get(10)?,
        },
        grade_comment: r.get(11)?,
        uploaded_by: r.get(12)?,
        date_uploaded: r.get(13)?,
    })
}

fn find_grade_id(conn: &Connection, report_id: &str, subject: &str) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM subject_grades WHERE report_id = ? AND subject = ?",
            (report_id, subject),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn clean_text(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Overwrites every stored field of the row with `input`.
fn write_fields(conn: &Connection, id: &str, input: &SubjectGradeInput) -> Result<()> {
    conn.execute(
        "UPDATE subject_grades SET
           first_test = ?, second_test = ?, exam = ?, manual_total = ?, manual_grade = ?,
           first_term_score = ?, second_term_score = ?, average_score = ?,
           grade_comment = ?, uploaded_by = ?, date_uploaded = ?
         WHERE id = ?",
        params_from_iter([
            input.scores.first_test.map(Value::Integer).unwrap_or(Value::Null),
            input.scores.second_test.map(Value::Integer).unwrap_or(Value::Null),
            input.scores.exam.map(Value::Integer).unwrap_or(Value::Null),
            input.scores.manual_total.map(Value::Integer).unwrap_or(Value::Null),
            grading::normalize_manual_grade(input.manual_grade.as_deref())
                .map(Value::Text)
                .unwrap_or(Value::Null),
            input
                .term_scores
                .first_term_score
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            input
                .term_scores
                .second_term_score
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            input
                .term_scores
                .average_score
                .map(Value::Real)
                .unwrap_or(Value::Null),
            clean_text(&input.grade_comment)
                .map(Value::Text)
                .unwrap_or(Value::Null),
            input
                .uploaded_by
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            Value::Text(now_stamp()),
            Value::Text(id.to_string()),
        ]),
    )?;
    Ok(())
}

pub(crate) fn create_subject_grade(
    conn: &Connection,
    report_id: &str,
    input: &SubjectGradeInput,
) -> Result<UpsertOutcome> {
    let subject = input.subject.trim();
    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO subject_grades(id, report_id, subject, date_uploaded) VALUES(?, ?, ?, ?)",
        (&id, report_id, subject, now_stamp()),
    );
    match inserted {
        Ok(_) => {
            write_fields(conn, &id, input)?;
            info!(subject_grade_id = %id, report_id, subject, "subject grade created");
            Ok(UpsertOutcome { id, created: true })
        }
        Err(e) if db::is_unique_violation(&e) => {
            warn!(report_id, subject, "subject grade created concurrently; updating");
            let existing = find_grade_id(conn, report_id, subject)?
                .ok_or_else(|| GradebookError::not_found("subject grade", subject))?;
            write_fields(conn, &existing, input)?;
            Ok(UpsertOutcome {
                id: existing,
                created: false,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Get-or-create on (report, subject), then store `input` in full.
pub fn upsert_subject_grade(
    conn: &Connection,
    report_id: &str,
    input: &SubjectGradeInput,
) -> Result<UpsertOutcome> {
    let errors = input.validate();
    if !errors.is_empty() {
        return Err(GradebookError::Validation(errors));
    }
    let report_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM grade_reports WHERE id = ?", [report_id], |r| {
            r.get(0)
        })
        .optional()?;
    if report_exists.is_none() {
        return Err(GradebookError::not_found("report", report_id));
    }

    match find_grade_id(conn, report_id, input.subject.trim())? {
        Some(id) => {
            write_fields(conn, &id, input)?;
            debug!(subject_grade_id = %id, "subject grade updated");
            Ok(UpsertOutcome { id, created: false })
        }
        None => create_subject_grade(conn, report_id, input),
    }
}

pub fn get_subject_grade(conn: &Connection, id: &str) -> Result<SubjectGrade> {
    conn.query_row(
        &format!("SELECT {GRADE_COLUMNS} FROM subject_grades g WHERE g.id = ?"),
        [id],
        grade_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("subject grade", id))
}

pub fn list_for_report(conn: &Connection, report_id: &str) -> Result<Vec<SubjectGrade>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRADE_COLUMNS} FROM subject_grades g
         WHERE g.report_id = ?
         ORDER BY g.subject"
    ))?;
    let rows = stmt
        .query_map([report_id], grade_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete_subject_grade(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM subject_grades WHERE id = ?", [id])?;
    if n == 0 {
        return Err(GradebookError::not_found("subject grade", id));
    }
    info!(subject_grade_id = %id, "subject grade deleted");
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct GradeSearch<'a> {
    /// Substring of the student's first name, last name or username.
    pub student: Option<&'a str>,
    /// Exact term.
    pub term: Option<&'a str>,
    /// Substring of the session.
    pub session: Option<&'a str>,
    pub classroom_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSearchRow {
    #[serde(flatten)]
    pub grade: SubjectGradeView,
    pub student_id: String,
    pub student_name: String,
    pub username: String,
    pub classroom_id: String,
    pub term: String,
    pub session: String,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Subject grades across all reports, by student surname then subject.
pub fn search(
    conn: &Connection,
    q: &GradeSearch<'_>,
    policy: GradingPolicy,
) -> Result<Vec<GradeSearchRow>> {
    let mut sql = format!(
        "SELECT {GRADE_COLUMNS}, u.id, u.last_name, u.first_name, u.username,
           r.classroom_id, r.term, r.session
         FROM subject_grades g
         JOIN grade_reports r ON r.id = g.report_id
         JOIN users u ON u.id = r.student_id
         WHERE 1 = 1"
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(s) = non_blank(q.student) {
        sql.push_str(
            " AND (u.first_name LIKE ? ESCAPE '\\'
                   OR u.last_name LIKE ? ESCAPE '\\'
                   OR u.username LIKE ? ESCAPE '\\')",
        );
        let pat = like_pattern(s);
        for _ in 0..3 {
            binds.push(Value::Text(pat.clone()));
        }
    }
    if let Some(t) = non_blank(q.term) {
        sql.push_str(" AND r.term = ?");
        binds.push(Value::Text(t.to_string()));
    }
    if let Some(s) = non_blank(q.session) {
        sql.push_str(" AND r.session LIKE ? ESCAPE '\\'");
        binds.push(Value::Text(like_pattern(s)));
    }
    if let Some(c) = non_blank(q.classroom_id) {
        sql.push_str(" AND r.classroom_id = ?");
        binds.push(Value::Text(c.to_string()));
    }
    sql.push_str(" ORDER BY u.last_name COLLATE NOCASE, u.first_name COLLATE NOCASE, g.subject");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            let grade = grade_from_row(r)?;
            let last: String = r.get(15)?;
            let first: String = r.get(16)?;
            Ok(GradeSearchRow {
                grade: grade.view(policy),
                student_id: r.get(14)?,
                student_name: format!("{}, {}", last, first),
                username: r.get(17)?,
                classroom_id: r.get(18)?,
                term: r.get(19)?,
                session: r.get(20)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
