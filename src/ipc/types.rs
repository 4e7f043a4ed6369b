use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::authz::Actor;
use crate::db;
use crate::error::{GradebookError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let conn = db::open_db(path)?;
        info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        Ok(())
    }

    pub fn conn(&self) -> Result<&Connection> {
        self.db.as_ref().ok_or(GradebookError::NoWorkspace)
    }
}
