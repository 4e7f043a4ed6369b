//! Persistence for the report-card model. Every function takes a plain
//! `&Connection` so callers can group several calls in one transaction.

pub mod grades;
pub mod reports;
pub mod roster;
pub mod skills;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub id: String,
    pub created: bool,
}

pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `LIKE` pattern for a case-insensitive substring match; `\` escapes.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
