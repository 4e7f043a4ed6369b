use serde::{Deserialize, Serialize};

use crate::error::{GradebookError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    pub fn allows(self, cap: Capability) -> bool {
        match self {
            Self::Student => matches!(cap, Capability::ViewOwnReports),
            Self::Teacher => !matches!(cap, Capability::ManageRoster | Capability::ManageSetup),
            Self::Admin => true,
        }
    }
}

/// The authenticated caller, as reported by the host's identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewOwnReports,
    ViewAnyReport,
    UploadGrades,
    DeleteGrades,
    SearchGrades,
    ManageRoster,
    ManageSetup,
}

/// `None` marks methods that need no actor (process-level plumbing).
pub fn required_capability(method: &str) -> Option<Capability> {
    match method {
        "health" | "skills.vocabulary" => None,
        "workspace.select" => Some(Capability::ManageSetup),
        "reports.get" | "reports.forStudent" | "reports.current" => {
            Some(Capability::ViewOwnReports)
        }
        "reports.listClass" | "classrooms.list" | "users.list" => Some(Capability::ViewAnyReport),
        "grades.upload" | "grades.preview" | "reports.upsert" | "skills.set" => {
            Some(Capability::UploadGrades)
        }
        "grades.delete" | "reports.delete" => Some(Capability::DeleteGrades),
        "grades.search" => Some(Capability::SearchGrades),
        "classrooms.create" | "classrooms.delete" | "users.create" | "users.delete" => {
            Some(Capability::ManageRoster)
        }
        "setup.get" | "setup.update" => Some(Capability::ManageSetup),
        // Unknown methods fall through to the router's not_implemented reply.
        _ => None,
    }
}

pub fn guard(method: &str, actor: Option<&Actor>) -> Result<()> {
    let Some(cap) = required_capability(method) else {
        return Ok(());
    };
    let Some(actor) = actor else {
        return Err(GradebookError::Forbidden("missing actor".into()));
    };
    if actor.role.allows(cap) {
        Ok(())
    } else {
        Err(GradebookError::Forbidden(format!(
            "{} may not call {}",
            actor.role.as_str(),
            method
        )))
    }
}

/// Students only see their own reports; staff see everyone's.
pub fn ensure_can_view_student(actor: Option<&Actor>, student_id: &str) -> Result<()> {
    match actor {
        Some(a) if a.role.allows(Capability::ViewAnyReport) => Ok(()),
        Some(a) if a.user_id == student_id => Ok(()),
        _ => Err(GradebookError::Forbidden(
            "students may only view their own reports".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, id: &str) -> Actor {
        Actor {
            user_id: id.into(),
            role,
        }
    }

    #[test]
    fn students_cannot_upload_or_search() {
        let s = actor(Role::Student, "s1");
        assert!(guard("reports.get", Some(&s)).is_ok());
        assert!(matches!(
            guard("grades.upload", Some(&s)),
            Err(GradebookError::Forbidden(_))
        ));
        assert!(guard("grades.search", Some(&s)).is_err());
        assert!(guard("reports.listClass", Some(&s)).is_err());
    }

    #[test]
    fn teachers_grade_but_do_not_manage_roster() {
        let t = actor(Role::Teacher, "t1");
        assert!(guard("grades.upload", Some(&t)).is_ok());
        assert!(guard("grades.delete", Some(&t)).is_ok());
        assert!(guard("grades.search", Some(&t)).is_ok());
        assert!(guard("users.create", Some(&t)).is_err());
        assert!(guard("setup.update", Some(&t)).is_err());
    }

    #[test]
    fn admins_may_call_everything() {
        let a = actor(Role::Admin, "a1");
        for m in [
            "grades.upload",
            "grades.search",
            "reports.delete",
            "users.create",
            "setup.update",
        ] {
            assert!(guard(m, Some(&a)).is_ok(), "{m}");
        }
    }

    #[test]
    fn protected_methods_need_an_actor() {
        assert!(guard("health", None).is_ok());
        assert!(guard("reports.get", None).is_err());
    }

    #[test]
    fn only_admins_switch_workspace() {
        assert!(guard("workspace.select", None).is_err());
        assert!(guard("workspace.select", Some(&actor(Role::Teacher, "t1"))).is_err());
        assert!(guard("workspace.select", Some(&actor(Role::Admin, "a1"))).is_ok());
    }

    #[test]
    fn student_ownership_check() {
        let s = actor(Role::Student, "s1");
        assert!(ensure_can_view_student(Some(&s), "s1").is_ok());
        assert!(ensure_can_view_student(Some(&s), "s2").is_err());
        let t = actor(Role::Teacher, "t1");
        assert!(ensure_can_view_student(Some(&t), "s2").is_ok());
        assert!(ensure_can_view_student(None, "s1").is_err());
    }
}
