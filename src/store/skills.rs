use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{GradebookError, Result};
use crate::skills::{self, BehaviouralSkill};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRating {
    pub skill: BehaviouralSkill,
    pub rating: i64,
}

/// Upsert keyed by (student, report, skill).
pub fn set_rating(
    conn: &Connection,
    student_id: &str,
    report_id: &str,
    skill: BehaviouralSkill,
    rating: i64,
) -> Result<()> {
    if let Some(e) = skills::check_rating(skill, rating) {
        return Err(GradebookError::Validation(vec![e]));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO behavioural_skills(id, student_id, report_id, skill, rating)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, report_id, skill) DO UPDATE SET
           rating = excluded.rating",
        (&id, student_id, report_id, skill.key(), rating),
    )?;
    debug!(report_id, skill = skill.key(), rating, "skill rating stored");
    Ok(())
}

/// Stores each rating of the batch. Skills missing from the batch keep
/// whatever rating they had.
pub fn set_ratings(
    conn: &Connection,
    student_id: &str,
    report_id: &str,
    ratings: &[(BehaviouralSkill, i64)],
) -> Result<usize> {
    for (skill, rating) in ratings {
        set_rating(conn, student_id, report_id, *skill, *rating)?;
    }
    Ok(ratings.len())
}

/// The report's ratings in report-card order.
pub fn ratings_for_report(conn: &Connection, report_id: &str) -> Result<Vec<SkillRating>> {
    let mut stmt =
        conn.prepare("SELECT skill, rating FROM behavioural_skills WHERE report_id = ?")?;
    let rows = stmt
        .query_map([report_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut out: Vec<SkillRating> = rows
        .into_iter()
        .filter_map(|(key, rating)| {
            BehaviouralSkill::parse(&key).map(|skill| SkillRating { skill, rating })
        })
        .collect();
    out.sort_by_key(|r| r.skill.position());
    Ok(out)
}

/// Owner of a report, for callers that only have the report id.
pub fn report_student(conn: &Connection, report_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT student_id FROM grade_reports WHERE id = ?",
        [report_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("report", report_id))
}
