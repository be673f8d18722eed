//! Audit history domain model.
//!
//! # Invariants
//! - Entries are immutable once written.
//! - Entries disappear only through record deletion cascade.

use crate::model::principal::UserId;
use crate::model::record::RecordId;
use serde::{Deserialize, Serialize};

/// Stable history row id.
pub type HistoryId = i64;

/// Kind of audited change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    FieldUpdated,
    Updated,
    ImageAdded,
    ImageDeleted,
    DocumentAdded,
    DocumentDeleted,
    Note,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FieldUpdated => "field_updated",
            Self::Updated => "updated",
            Self::ImageAdded => "image_added",
            Self::ImageDeleted => "image_deleted",
            Self::DocumentAdded => "document_added",
            Self::DocumentDeleted => "document_deleted",
            Self::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "field_updated" => Some(Self::FieldUpdated),
            "updated" => Some(Self::Updated),
            "image_added" => Some(Self::ImageAdded),
            "image_deleted" => Some(Self::ImageDeleted),
            "document_added" => Some(Self::DocumentAdded),
            "document_deleted" => Some(Self::DocumentDeleted),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// Persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub record_id: RecordId,
    pub action: HistoryAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
    pub created_by: Option<UserId>,
    pub created_at: i64,
}

/// Entry waiting to be appended. The record id is supplied by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub action: HistoryAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: String,
    pub created_by: Option<UserId>,
}

impl NewHistoryEntry {
    pub fn new(action: HistoryAction, description: impl Into<String>, by: Option<UserId>) -> Self {
        Self {
            action,
            field_name: None,
            old_value: None,
            new_value: None,
            description: description.into(),
            created_by: by,
        }
    }

    /// `field_updated` entry with the canonical rendered description.
    pub fn field_change(
        field_name: impl Into<String>,
        display_name: &str,
        old_value: String,
        new_value: String,
        by: Option<UserId>,
    ) -> Self {
        let description = format!("{display_name} changed from \"{old_value}\" to \"{new_value}\"");
        Self {
            action: HistoryAction::FieldUpdated,
            field_name: Some(field_name.into()),
            old_value: Some(old_value),
            new_value: Some(new_value),
            description,
            created_by: by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryAction, NewHistoryEntry};

    #[test]
    fn field_change_renders_description() {
        let entry =
            NewHistoryEntry::field_change("priority", "Priority", "low".into(), "high".into(), None);
        assert_eq!(entry.action, HistoryAction::FieldUpdated);
        assert_eq!(entry.description, "Priority changed from \"low\" to \"high\"");
        assert_eq!(entry.old_value.as_deref(), Some("low"));
    }
}
