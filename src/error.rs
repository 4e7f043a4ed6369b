use serde_json::json;
use thiserror::Error;

use crate::grading::FieldError;

/// Request-scoped failures. None of these stop the daemon; the IPC layer
/// turns each one into an error envelope for the caller.
#[derive(Debug, Error)]
pub enum GradebookError {
    #[error("{} invalid field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{entity} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadParams(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GradebookError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Forbidden(_) => "forbidden",
            Self::BadParams(_) => "bad_params",
            Self::NoWorkspace => "no_workspace",
            Self::Db(_) => "db_query_failed",
            Self::Other(_) => "internal",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(errors) => Some(json!({ "errors": errors })),
            Self::NotFound { entity, key } => Some(json!({ "entity": entity, "key": key })),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GradebookError>;
