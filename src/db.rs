use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    // Other processes may hold the write lock briefly; wait instead of failing.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            role TEXT NOT NULL,
            classroom_id TEXT,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_classroom ON users(classroom_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_last_name ON users(last_name, first_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            term TEXT NOT NULL,
            session TEXT NOT NULL,
            total_available_score INTEGER,
            overall_score INTEGER,
            overall_average REAL,
            overall_position TEXT,
            teacher_comment TEXT,
            admin_comment TEXT,
            next_term_date TEXT,
            date_uploaded TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id) ON DELETE CASCADE,
            UNIQUE(student_id, term, session)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_reports_classroom ON grade_reports(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_grades(
            id TEXT PRIMARY KEY,
            report_id TEXT NOT NULL,
            subject TEXT NOT NULL COLLATE NOCASE,
            first_test INTEGER,
            second_test INTEGER,
            exam INTEGER,
            manual_total INTEGER,
            manual_grade TEXT,
            first_term_score INTEGER,
            second_term_score INTEGER,
            average_score REAL,
            grade_comment TEXT,
            uploaded_by TEXT,
            date_uploaded TEXT NOT NULL,
            FOREIGN KEY(report_id) REFERENCES grade_reports(id) ON DELETE CASCADE,
            FOREIGN KEY(uploaded_by) REFERENCES users(id) ON DELETE SET NULL,
            UNIQUE(report_id, subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_grades_report ON subject_grades(report_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS behavioural_skills(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            report_id TEXT NOT NULL,
            skill TEXT NOT NULL,
            rating INTEGER NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY(report_id) REFERENCES grade_reports(id) ON DELETE CASCADE,
            UNIQUE(student_id, report_id, skill)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_behavioural_skills_report ON behavioural_skills(report_id)",
        [],
    )?;

    Ok(conn)
}

/// True when `e` is a UNIQUE or PRIMARY KEY violation, i.e. another writer
/// created the row first.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
