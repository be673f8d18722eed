//! Module (entity type) domain model.
//!
//! # Responsibility
//! - Define the admin-authored entity type and its `config` blob.
//! - Resolve record status against the configured status list.
//!
//! # Invariants
//! - `name` is a slug and never changes after creation.
//! - A module is a sub-module iff `parent_module_id` is set.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable module row id.
pub type ModuleId = i64;

/// Status used when a module configures neither `defaultStatus` nor `statuses`.
pub const FALLBACK_STATUS: &str = "open";

const SLUG_MAX_CHARS: usize = 64;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid slug regex"));

/// Optional per-module feature switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFeature {
    Images,
    Documents,
    History,
    Links,
}

impl ModuleFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Documents => "documents",
            Self::History => "history",
            Self::Links => "links",
        }
    }
}

/// Recognized module options. Unknown keys in stored JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    pub default_status: Option<String>,
    pub statuses: Vec<String>,
    pub features: BTreeSet<ModuleFeature>,
    pub enable_email: bool,
    pub enable_email_inbox: bool,
    pub enable_label_print: bool,
}

impl ModuleConfig {
    pub fn has_feature(&self, feature: ModuleFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Status assigned when the caller gives none, or an unknown one.
    pub fn default_status(&self) -> String {
        self.default_status
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| self.statuses.first().map(String::as_str))
            .unwrap_or(FALLBACK_STATUS)
            .to_string()
    }

    /// Resolves a requested status.
    ///
    /// Blank input and values outside a non-empty `statuses` list both fall
    /// back to [`ModuleConfig::default_status`].
    pub fn resolve_status(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim).filter(|value| !value.is_empty()) {
            None => self.default_status(),
            Some(value) if self.statuses.is_empty() => value.to_string(),
            Some(value) if self.statuses.iter().any(|status| status == value) => {
                value.to_string()
            }
            Some(_) => self.default_status(),
        }
    }
}

/// Admin-defined entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub config: ModuleConfig,
    pub parent_module_id: Option<ModuleId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Module {
    pub fn is_sub_module(&self) -> bool {
        self.parent_module_id.is_some()
    }
}

/// Input for module creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewModule {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub config: ModuleConfig,
    /// Parent module by name; makes the new module a sub-module.
    pub parent_module: Option<String>,
}

/// Partial module update. `name` is intentionally absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub config: Option<ModuleConfig>,
    /// `Some(None)` (JSON `null`) detaches from the parent; absent leaves it unchanged.
    #[serde(deserialize_with = "super::double_option")]
    pub parent_module: Option<Option<String>>,
}

/// Slug validation failure for module and field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    Empty,
    TooLong(usize),
    InvalidCharacters(String),
}

impl Display for SlugError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "name must not be empty"),
            Self::TooLong(len) => {
                write!(f, "name is {len} characters; maximum is {SLUG_MAX_CHARS}")
            }
            Self::InvalidCharacters(value) => write!(
                f,
                "name `{value}` must be lowercase letters, digits, `_` or `-`"
            ),
        }
    }
}

impl Error for SlugError {}

/// Validates a module or field slug.
pub fn validate_slug(value: &str) -> Result<(), SlugError> {
    if value.is_empty() {
        return Err(SlugError::Empty);
    }
    let len = value.chars().count();
    if len > SLUG_MAX_CHARS {
        return Err(SlugError::TooLong(len));
    }
    if !SLUG_RE.is_match(value) {
        return Err(SlugError::InvalidCharacters(value.to_string()));
    }
    Ok(())
}
