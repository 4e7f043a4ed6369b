use tracing::warn;

use super::handlers;
use super::types::{AppState, Request};
use crate::authz;
use crate::ipc::error::{err, from_error};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Err(e) = authz::guard(&req.method, req.actor.as_ref()) {
        warn!(
            method = %req.method,
            role = req.actor.as_ref().map(|a| a.role.as_str()).unwrap_or("none"),
            "request denied"
        );
        return from_error(&req.id, &e);
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::roster::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
