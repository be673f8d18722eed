//! Principals, roles, groups and permission levels.
//!
//! # Responsibility
//! - Model the authenticated identity handed over by the auth layer.
//! - Model group membership and per-module permission overrides.
//!
//! # Invariants
//! - Role `admin` implies full access to every module.
//! - Permission level ordering is `none < viewer < editor < admin`.

use crate::model::module::ModuleId;
use serde::{Deserialize, Serialize};

/// Stable user row id, as issued by the identity provider.
pub type UserId = i64;

/// Stable user group row id.
pub type GroupId = i64;

/// Coarse principal role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parses a role; anything other than `admin` is a regular user.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// Authenticated identity making a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub email: String,
}

impl Principal {
    pub fn new(id: UserId, role: Role, email: impl Into<String>) -> Self {
        Self {
            id,
            role,
            email: email.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Operation checked by the access evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOperation {
    View,
    Edit,
    Delete,
}

impl AccessOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

/// Per-user, per-module permission override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    None,
    Viewer,
    Editor,
    Admin,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Evaluated rights of one principal on one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleAccess {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl ModuleAccess {
    pub const FULL: Self = Self {
        can_view: true,
        can_edit: true,
        can_delete: true,
    };

    pub const NONE: Self = Self {
        can_view: false,
        can_edit: false,
        can_delete: false,
    };

    pub fn from_level(level: PermissionLevel) -> Self {
        Self {
            can_view: level >= PermissionLevel::Viewer,
            can_edit: level >= PermissionLevel::Editor,
            can_delete: level == PermissionLevel::Admin,
        }
    }

    pub fn allows(&self, operation: AccessOperation) -> bool {
        match operation {
            AccessOperation::View => self.can_view,
            AccessOperation::Edit => self.can_edit,
            AccessOperation::Delete => self.can_delete,
        }
    }
}

/// Mirrored identity-provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Named set of users with module and menu grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub member_ids: Vec<UserId>,
    pub module_ids: Vec<ModuleId>,
    pub menu_items: Vec<String>,
}
