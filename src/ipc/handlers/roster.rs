use crate::authz::Role;
use crate::error::{GradebookError, Result};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::roster::{self, NewUser, UserFilter};
use serde_json::{json, Value};

fn handle_classrooms_list(state: &mut AppState) -> Result<Value> {
    let conn = state.conn()?;
    let classrooms = roster::list_classrooms(conn)?;
    Ok(json!({ "classrooms": classrooms }))
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let name = required_str(req, "name")?;
    let classroom = roster::create_classroom(conn, name)?;
    Ok(json!({ "classroomId": classroom.id, "name": classroom.name }))
}

fn handle_classrooms_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let classroom_id = required_str(req, "classroomId")?;
    roster::delete_classroom(conn, classroom_id)?;
    Ok(json!({ "ok": true }))
}

fn parse_role(raw: Option<&str>) -> Result<Option<Role>> {
    match raw {
        None => Ok(None),
        Some(r) => Role::parse(r)
            .map(Some)
            .ok_or_else(|| GradebookError::bad_params(format!("unknown role: {}", r))),
    }
}

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let filter = UserFilter {
        role: parse_role(optional_str(req, "role"))?,
        classroom_id: optional_str(req, "classroomId"),
        query: optional_str(req, "query"),
    };
    let users: Vec<Value> = roster::list_users(conn, &filter)?
        .into_iter()
        .map(|u| {
            let display_name = u.display_name();
            let mut v = json!(u);
            v["displayName"] = json!(display_name);
            v
        })
        .collect();
    Ok(json!({ "users": users }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let role = parse_role(Some(required_str(req, "role")?))?.unwrap_or(Role::Student);
    let classroom_id = match (
        optional_str(req, "classroomId"),
        optional_str(req, "classroomName"),
    ) {
        (Some(id), _) => Some(roster::find_classroom(conn, id)?.id),
        (None, Some(name)) => Some(roster::find_classroom_by_name(conn, name)?.id),
        (None, None) => None,
    };
    let user = roster::create_user(
        conn,
        &NewUser {
            username: optional_str(req, "username").unwrap_or(""),
            first_name: optional_str(req, "firstName").unwrap_or(""),
            middle_name: optional_str(req, "middleName"),
            last_name: optional_str(req, "lastName").unwrap_or(""),
            role,
            classroom_id: classroom_id.as_deref(),
        },
    )?;
    Ok(json!({ "user": user }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let user_id = required_str(req, "userId")?;
    roster::delete_user(conn, user_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(respond(&req.id, handle_classrooms_list(state))),
        "classrooms.create" => Some(respond(&req.id, handle_classrooms_create(state, req))),
        "classrooms.delete" => Some(respond(&req.id, handle_classrooms_delete(state, req))),
        "users.list" => Some(respond(&req.id, handle_users_list(state, req))),
        "users.create" => Some(respond(&req.id, handle_users_create(state, req))),
        "users.delete" => Some(respond(&req.id, handle_users_delete(state, req))),
        _ => None,
    }
}
