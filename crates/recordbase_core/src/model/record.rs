//! Record domain model.
//!
//! # Responsibility
//! - Define one data instance of a module and its read projections.
//! - Define create/update payloads accepted by the record engine.
//!
//! # Invariants
//! - `module_id` never changes after creation.
//! - `parent_record_id`, when set, points at a record of the parent module.
//! - `version` increases by one on every successful update.

use crate::model::attachment::RecordImage;
use crate::model::module::ModuleId;
use crate::model::principal::UserId;
use crate::model::value::RecordData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Stable record row id.
pub type RecordId = i64;

/// Canonical stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub module_id: ModuleId,
    pub name: String,
    pub status: String,
    pub data: RecordData,
    pub parent_record_id: Option<RecordId>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// List row: record plus per-principal derived flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record: Record,
    /// True iff the requesting principal has a view marker for the record.
    pub is_viewed: bool,
    /// Path of the lowest-ordered image, if any.
    pub thumbnail: Option<String>,
}

/// Detail projection returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDetail {
    pub record: Record,
    /// Ordered by `sort_order ASC, id ASC`; index 0 is the primary image.
    pub images: Vec<RecordImage>,
}

/// Create payload. `data` is raw JSON coerced against the module schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRecord {
    pub name: String,
    pub data: Map<String, JsonValue>,
    pub status: Option<String>,
    pub parent_record_id: Option<RecordId>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
}

impl NewRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Update payload. Absent members keep the stored value.
///
/// `data`, when present, is merged into the stored map: listed keys are
/// replaced, `null` or blank values clear a key, unlisted keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordUpdate {
    pub name: Option<String>,
    pub data: Option<Map<String, JsonValue>>,
    pub status: Option<String>,
    /// `Some(None)` (JSON `null`) unassigns.
    #[serde(deserialize_with = "super::double_option")]
    pub assigned_to: Option<Option<UserId>>,
    pub updated_by: Option<UserId>,
    /// Optimistic concurrency check; `None` keeps last-write-wins.
    pub expected_version: Option<i64>,
}

/// What happens to child records when their parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDeleteMode {
    /// Refuse to delete a record that still has children.
    #[default]
    Restrict,
    /// Delete the whole descendant subtree with the record.
    Cascade,
    /// Detach direct children (`parent_record_id = NULL`) and keep them.
    Orphan,
}

impl RecordDeleteMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "restrict" => Some(Self::Restrict),
            "cascade" => Some(Self::Cascade),
            "orphan" => Some(Self::Orphan),
            _ => None,
        }
    }
}

/// Per-sub-module child count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubModuleCount {
    pub module_id: ModuleId,
    pub module_name: String,
    pub display_name: String,
    pub count: i64,
}

/// Advisory descendant summary shown before deleting a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenCount {
    pub total_count: i64,
    pub breakdown: Vec<SubModuleCount>,
}

/// Result of a record deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub record_id: RecordId,
    /// Every record removed, including cascaded descendants.
    pub deleted_record_ids: Vec<RecordId>,
    /// Records detached by `RecordDeleteMode::Orphan`.
    pub orphaned_child_ids: Vec<RecordId>,
}
