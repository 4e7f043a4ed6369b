use std::path::PathBuf;

pub const LOG_ENV: &str = "GRADEBOOKD_LOG";
pub const WORKSPACE_ENV: &str = "GRADEBOOKD_WORKSPACE";
const DEFAULT_LOG_FILTER: &str = "info";

/// Process-level settings. Per-workspace settings live in the workspace
/// database (see the `setup.*` methods).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_filter: String,
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            log_filter: non_blank(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            workspace: non_blank(WORKSPACE_ENV).map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset_or_blank() {
        let env: HashMap<&str, &str> = HashMap::from([(WORKSPACE_ENV, "  ")]);
        let cfg = DaemonConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.workspace, None);
    }

    #[test]
    fn reads_filter_and_workspace() {
        let env: HashMap<&str, &str> = HashMap::from([
            (LOG_ENV, "gradebookd=debug"),
            (WORKSPACE_ENV, "/srv/school"),
        ]);
        let cfg = DaemonConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.log_filter, "gradebookd=debug");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/srv/school")));
    }
}
