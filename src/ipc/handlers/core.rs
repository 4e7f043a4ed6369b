use crate::error::GradebookError;
use crate::ipc::error::{from_error, ok};
use crate::ipc::types::{AppState, Request};
use crate::skills::{BehaviouralSkill, RATING_MAX, RATING_MIN};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return from_error(&req.id, &GradebookError::bad_params("missing params.path"));
    };

    match state.open_workspace(&path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => crate::ipc::error::err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_skills_vocabulary(req: &Request) -> serde_json::Value {
    let skills: Vec<serde_json::Value> = BehaviouralSkill::ALL
        .iter()
        .map(|s| json!({ "key": s.key(), "label": s.label() }))
        .collect();
    ok(
        &req.id,
        json!({
            "skills": skills,
            "ratingMin": RATING_MIN,
            "ratingMax": RATING_MAX
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "skills.vocabulary" => Some(handle_skills_vocabulary(req)),
        _ => None,
    }
}
