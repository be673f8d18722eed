//! Field (schema attribute) domain model.
//!
//! # Responsibility
//! - Describe one typed attribute of a module.
//! - Validate field definitions before they reach storage.
//!
//! # Invariants
//! - `options` is meaningful only for `FieldType::Select`.
//! - `relation_module` is set iff `field_type == FieldType::Relation`.
//! - Render order is `weight ASC, sort_order ASC, id ASC`.

use crate::model::module::{validate_slug, ModuleId, SlugError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable field row id.
pub type FieldId = i64;

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Boolean,
    Date,
    Email,
    Url,
    Select,
    Relation,
    User,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Email => "email",
            Self::Url => "url",
            Self::Select => "select",
            Self::Relation => "relation",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "textarea" => Some(Self::Textarea),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "email" => Some(Self::Email),
            "url" => Some(Self::Url),
            "select" => Some(Self::Select),
            "relation" => Some(Self::Relation),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// How date warnings are computed by list views. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningMode {
    /// Warn as the date approaches and after it passes.
    Overdue,
    /// Warn while the date is still ahead.
    Predate,
}

impl WarningMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Predate => "predate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "overdue" => Some(Self::Overdue),
            "predate" => Some(Self::Predate),
            _ => None,
        }
    }
}

/// One typed attribute of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub module_id: ModuleId,
    pub name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub options: Vec<String>,
    pub relation_module: Option<String>,
    pub is_required: bool,
    pub show_in_list: bool,
    pub weight: i64,
    pub sort_order: i64,
    pub default_value: Option<String>,
    pub warning_yellow_days: Option<i64>,
    pub warning_red_days: Option<i64>,
    pub warning_mode: Option<WarningMode>,
}

/// Field definition payload used by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDefinition {
    pub name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub options: Vec<String>,
    pub relation_module: Option<String>,
    pub is_required: bool,
    pub show_in_list: bool,
    pub weight: i64,
    pub sort_order: i64,
    pub default_value: Option<String>,
    pub warning_yellow_days: Option<i64>,
    pub warning_red_days: Option<i64>,
    pub warning_mode: Option<WarningMode>,
}

impl Default for FieldDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            field_type: FieldType::Text,
            options: Vec::new(),
            relation_module: None,
            is_required: false,
            show_in_list: false,
            weight: 0,
            sort_order: 0,
            default_value: None,
            warning_yellow_days: None,
            warning_red_days: None,
            warning_mode: None,
        }
    }
}

impl FieldDefinition {
    /// Shorthand for the common case in seeds and tests.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            field_type,
            ..Self::default()
        }
    }

    /// Checks shape rules that do not need storage lookups.
    ///
    /// Relation target existence is checked by the schema service.
    pub fn validate(&self) -> Result<(), FieldDefinitionError> {
        validate_slug(&self.name).map_err(FieldDefinitionError::InvalidName)?;
        if self.display_name.trim().is_empty() {
            return Err(FieldDefinitionError::BlankDisplayName);
        }

        match self.field_type {
            FieldType::Select => {
                if self.options.iter().all(|option| option.trim().is_empty()) {
                    return Err(FieldDefinitionError::SelectWithoutOptions);
                }
            }
            FieldType::Relation => {
                if self
                    .relation_module
                    .as_deref()
                    .map_or(true, |value| value.trim().is_empty())
                {
                    return Err(FieldDefinitionError::RelationWithoutTarget);
                }
            }
            _ => {}
        }

        if self.field_type != FieldType::Relation && self.relation_module.is_some() {
            return Err(FieldDefinitionError::UnexpectedRelationTarget);
        }

        if [self.warning_yellow_days, self.warning_red_days]
            .into_iter()
            .flatten()
            .any(|days| days < 0)
        {
            return Err(FieldDefinitionError::NegativeWarningDays);
        }

        Ok(())
    }
}

/// Field definition shape errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDefinitionError {
    InvalidName(SlugError),
    BlankDisplayName,
    SelectWithoutOptions,
    RelationWithoutTarget,
    UnexpectedRelationTarget,
    NegativeWarningDays,
}

impl Display for FieldDefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(err) => write!(f, "invalid field name: {err}"),
            Self::BlankDisplayName => write!(f, "field display name must not be blank"),
            Self::SelectWithoutOptions => write!(f, "select fields need at least one option"),
            Self::RelationWithoutTarget => {
                write!(f, "relation fields must name a relation module")
            }
            Self::UnexpectedRelationTarget => {
                write!(f, "only relation fields may set relation_module")
            }
            Self::NegativeWarningDays => write!(f, "warning thresholds must not be negative"),
        }
    }
}

impl Error for FieldDefinitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName(err) => Some(err),
            _ => None,
        }
    }
}
