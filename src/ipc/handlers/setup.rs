use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::GradingPolicy;
use crate::ipc::error::respond;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "policy": GradingPolicy::default().as_str()
        }),
        SetupSection::Reports => json!({
            "currentTerm": null,
            "currentSession": null
        }),
    }
}

fn as_object_mut(value: &mut Value) -> std::result::Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_nullable_string_max(
    v: &Value,
    key: &str,
    max_len: usize,
) -> std::result::Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string or null", key))?
        .trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s.to_string()))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> std::result::Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "policy" => {
                    let policy = v
                        .as_str()
                        .and_then(GradingPolicy::parse)
                        .ok_or("policy must be one of: standard, banded")?;
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "currentTerm" | "currentSession" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 20)?);
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// The workspace's letter-grade policy.
pub fn grading_policy(conn: &rusqlite::Connection) -> Result<GradingPolicy> {
    let section = load_section(conn, SetupSection::Grading)?;
    Ok(section
        .get("policy")
        .and_then(|v| v.as_str())
        .and_then(GradingPolicy::parse)
        .unwrap_or_default())
}

/// The configured (term, session) that "current report" requests refer to.
pub fn current_period(conn: &rusqlite::Connection) -> Result<(String, String)> {
    let section = load_section(conn, SetupSection::Reports)?;
    let term = section.get("currentTerm").and_then(|v| v.as_str());
    let session = section.get("currentSession").and_then(|v| v.as_str());
    match (term, session) {
        (Some(t), Some(s)) => Ok((t.to_string(), s.to_string())),
        _ => Err(GradebookError::bad_params(
            "current term and session are not configured",
        )),
    }
}

fn handle_setup_get(state: &mut AppState) -> Result<Value> {
    let conn = state.conn()?;
    let grading = load_section(conn, SetupSection::Grading)?;
    let reports = load_section(conn, SetupSection::Reports)?;
    Ok(json!({
        "grading": grading,
        "reports": reports
    }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value> {
    let conn = state.conn()?;
    let section_raw = required_str(req, "section")?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| GradebookError::bad_params("unknown section"))?;
    let patch_obj = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| GradebookError::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch_obj).map_err(GradebookError::BadParams)?;
    db::settings_set_json(conn, section.key(), &current)?;
    info!(section = section.key(), "setup updated");
    Ok(json!({ "ok": true, "section": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(&req.id, handle_setup_get(state))),
        "setup.update" => Some(respond(&req.id, handle_setup_update(state, req))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_to_standard_and_can_be_switched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        assert_eq!(grading_policy(&conn).expect("policy"), GradingPolicy::Standard);

        let mut current = load_section(&conn, SetupSection::Grading).expect("load");
        let patch = json!({ "policy": "BANDED" });
        merge_section_patch(
            SetupSection::Grading,
            &mut current,
            patch.as_object().expect("object"),
        )
        .expect("merge");
        db::settings_set_json(&conn, SetupSection::Grading.key(), &current).expect("save");
        assert_eq!(grading_policy(&conn).expect("policy"), GradingPolicy::Banded);
    }

    #[test]
    fn unknown_fields_and_policies_are_rejected() {
        let mut current = default_section(SetupSection::Grading);
        let bad = json!({ "policy": "curve" });
        assert!(merge_section_patch(
            SetupSection::Grading,
            &mut current,
            bad.as_object().expect("object")
        )
        .is_err());
        let mut reports = default_section(SetupSection::Reports);
        let unknown = json!({ "showPositions": true });
        assert!(merge_section_patch(
            SetupSection::Reports,
            &mut reports,
            unknown.as_object().expect("object")
        )
        .is_err());
    }

    #[test]
    fn current_period_requires_both_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        assert!(current_period(&conn).is_err());
        db::settings_set_json(
            &conn,
            SetupSection::Reports.key(),
            &json!({ "currentTerm": "1st Term", "currentSession": "2024/2025" }),
        )
        .expect("save");
        assert_eq!(
            current_period(&conn).expect("period"),
            ("1st Term".to_string(), "2024/2025".to_string())
        );
    }
}
