use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::authz::Role;
use crate::db;
use crate::error::{GradebookError, Result};

use super::like_pattern;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomRow {
    pub id: String,
    pub name: String,
    pub student_count: i64,
    pub report_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub role: Role,
    pub classroom_id: Option<String>,
}

impl User {
    /// "Surname, First" as printed on class lists.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub middle_name: Option<&'a str>,
    pub last_name: &'a str,
    pub role: Role,
    pub classroom_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter<'a> {
    pub role: Option<Role>,
    pub classroom_id: Option<&'a str>,
    pub query: Option<&'a str>,
}

const USER_COLUMNS: &str = "id, username, first_name, middle_name, last_name, role, classroom_id";

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let role_raw: String = r.get(5)?;
    let role = Role::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown role {role_raw}").into(),
        )
    })?;
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        first_name: r.get(2)?,
        middle_name: r.get(3)?,
        last_name: r.get(4)?,
        role,
        classroom_id: r.get(6)?,
    })
}

pub fn create_classroom(conn: &Connection, name: &str) -> Result<Classroom> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GradebookError::bad_params("name must not be empty"));
    }
    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO classrooms(id, name) VALUES(?, ?)",
        (&id, name),
    ) {
        Ok(_) => {}
        Err(e) if db::is_unique_violation(&e) => {
            return Err(GradebookError::Conflict(format!(
                "classroom {name} already exists"
            )))
        }
        Err(e) => return Err(e.into()),
    }
    info!(classroom_id = %id, name, "classroom created");
    Ok(Classroom {
        id,
        name: name.to_string(),
    })
}

pub fn list_classrooms(conn: &Connection) -> Result<Vec<ClassroomRow>> {
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM users u WHERE u.classroom_id = c.id AND u.role = 'student'),
           (SELECT COUNT(*) FROM grade_reports r WHERE r.classroom_id = c.id)
         FROM classrooms c
         ORDER BY c.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassroomRow {
                id: r.get(0)?,
                name: r.get(1)?,
                student_count: r.get(2)?,
                report_count: r.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_classroom(conn: &Connection, id: &str) -> Result<Classroom> {
    conn.query_row("SELECT id, name FROM classrooms WHERE id = ?", [id], |r| {
        Ok(Classroom {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .optional()?
    .ok_or_else(|| GradebookError::not_found("classroom", id))
}

pub fn find_classroom_by_name(conn: &Connection, name: &str) -> Result<Classroom> {
    let name = name.trim();
    conn.query_row(
        "SELECT id, name FROM classrooms WHERE name = ?",
        [name],
        |r| {
            Ok(Classroom {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("classroom", name))
}

/// Removes the classroom and every report filed under it. Members stay on
/// the roster without a classroom.
pub fn delete_classroom(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM classrooms WHERE id = ?", [id])?;
    if n == 0 {
        return Err(GradebookError::not_found("classroom", id));
    }
    info!(classroom_id = %id, "classroom deleted");
    Ok(())
}

pub fn create_user(conn: &Connection, new: &NewUser<'_>) -> Result<User> {
    let username = new.username.trim();
    let first_name = new.first_name.trim();
    let last_name = new.last_name.trim();
    let middle_name = new.middle_name.map(str::trim).filter(|s| !s.is_empty());

    let mut missing = Vec::new();
    if username.is_empty() {
        missing.push("username");
    }
    if first_name.is_empty() {
        missing.push("firstName");
    }
    if last_name.is_empty() {
        missing.push("lastName");
    }
    if !missing.is_empty() {
        return Err(GradebookError::bad_params(format!(
            "missing {}",
            missing.join(", ")
        )));
    }
    if let Some(cid) = new.classroom_id {
        find_classroom(conn, cid)?;
    }

    let id = Uuid::new_v4().to_string();
    match conn.execute(
        "INSERT INTO users(id, username, first_name, middle_name, last_name, role, classroom_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            username,
            first_name,
            middle_name,
            last_name,
            new.role.as_str(),
            new.classroom_id,
        ),
    ) {
        Ok(_) => {}
        Err(e) if db::is_unique_violation(&e) => {
            return Err(GradebookError::Conflict(format!(
                "username {username} is taken"
            )))
        }
        Err(e) => return Err(e.into()),
    }
    info!(user_id = %id, username, role = new.role.as_str(), "user created");

    Ok(User {
        id,
        username: username.to_string(),
        first_name: first_name.to_string(),
        middle_name: middle_name.map(str::to_string),
        last_name: last_name.to_string(),
        role: new.role,
        classroom_id: new.classroom_id.map(str::to_string),
    })
}

pub fn find_user(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("user", id))
}

/// Looks a student up by id, falling back to username.
pub fn find_student(conn: &Connection, id_or_username: &str) -> Result<User> {
    let key = id_or_username.trim();
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 OR username = ?1"),
            [key],
            user_from_row,
        )
        .optional()?;
    match user {
        Some(u) if u.role == Role::Student => Ok(u),
        _ => Err(GradebookError::not_found("student", key)),
    }
}

pub fn list_users(conn: &Connection, filter: &UserFilter<'_>) -> Result<Vec<User>> {
    let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1");
    let mut binds: Vec<Value> = Vec::new();
    if let Some(role) = filter.role {
        sql.push_str(" AND role = ?");
        binds.push(Value::Text(role.as_str().to_string()));
    }
    if let Some(cid) = filter.classroom_id {
        sql.push_str(" AND classroom_id = ?");
        binds.push(Value::Text(cid.to_string()));
    }
    if let Some(q) = filter.query.map(str::trim).filter(|q| !q.is_empty()) {
        sql.push_str(
            " AND (first_name LIKE ? ESCAPE '\\'
                   OR last_name LIKE ? ESCAPE '\\'
                   OR username LIKE ? ESCAPE '\\')",
        );
        let pat = like_pattern(q);
        for _ in 0..3 {
            binds.push(Value::Text(pat.clone()));
        }
    }
    sql.push_str(" ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, username");

    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(binds), user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

/// Deleting a student removes their reports; grades a teacher uploaded keep
/// their rows with the uploader cleared.
pub fn delete_user(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM users WHERE id = ?", [id])?;
    if n == 0 {
        return Err(GradebookError::not_found("user", id));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
