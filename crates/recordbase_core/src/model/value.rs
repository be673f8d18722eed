//! Typed record field values.
//!
//! # Responsibility
//! - Represent record data as a tagged value per field.
//! - Coerce loosely typed JSON input against a field's declared type.
//! - Provide the canonical stringification used by audit diffs.
//!
//! # Invariants
//! - A stored value always matches the declared type it was coerced for.
//! - Absent and cleared values stringify to the empty string.

use crate::model::field::{Field, FieldType};
use crate::model::principal::UserId;
use crate::model::record::RecordId;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("valid url regex"));

/// Offset-less timestamps accepted next to plain dates and RFC 3339.
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Record payload keyed by field name.
pub type RecordData = BTreeMap<String, FieldValue>;

/// One typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// ISO-8601 date, optionally with a time part.
    Date(String),
    Relation(RecordId),
    User(UserId),
}

impl FieldValue {
    /// Canonical string form used for change detection and history rows.
    pub fn stringify(&self) -> String {
        match self {
            Self::Text(value) | Self::Date(value) => value.clone(),
            Self::Number(value) => format_number(*value),
            Self::Bool(value) => value.to_string(),
            Self::Relation(id) => id.to_string(),
            Self::User(id) => id.to_string(),
        }
    }

    /// Plain JSON projection for API consumers.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(value) | Self::Date(value) => JsonValue::String(value.clone()),
            Self::Number(value) => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Bool(value) => JsonValue::Bool(*value),
            Self::Relation(id) | Self::User(id) => JsonValue::from(*id),
        }
    }

    /// Related record id, when this is a relation value.
    pub fn relation_target(&self) -> Option<RecordId> {
        match self {
            Self::Relation(id) => Some(*id),
            _ => None,
        }
    }
}

/// Stringifies an optional value; `None` becomes the empty string.
pub fn stringify_optional(value: Option<&FieldValue>) -> String {
    value.map(FieldValue::stringify).unwrap_or_default()
}

/// Renders a whole data map as plain JSON.
pub fn data_to_json(data: &RecordData) -> JsonValue {
    JsonValue::Object(
        data.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Coercion failure for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub field_name: String,
    pub message: String,
}

impl ValueError {
    fn new(field: &Field, message: impl Into<String>) -> Self {
        Self {
            field_name: field.name.clone(),
            message: message.into(),
        }
    }
}

impl Display for ValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "field `{}`: {}", self.field_name, self.message)
    }
}

impl Error for ValueError {}

/// Coerces raw JSON input to a typed value for `field`.
///
/// Returns `Ok(None)` for `null` and blank strings, which clear the field.
/// Relation target existence is not checked here.
pub fn coerce_value(field: &Field, raw: &JsonValue) -> Result<Option<FieldValue>, ValueError> {
    if raw.is_null() {
        return Ok(None);
    }
    if let Some(text) = raw.as_str() {
        if text.trim().is_empty() {
            return Ok(None);
        }
    }

    let value = match field.field_type {
        FieldType::Text | FieldType::Textarea => FieldValue::Text(expect_string(field, raw)?),
        FieldType::Email => {
            let text = expect_string(field, raw)?.trim().to_string();
            if !EMAIL_RE.is_match(&text) {
                return Err(ValueError::new(field, format!("`{text}` is not an email address")));
            }
            FieldValue::Text(text)
        }
        FieldType::Url => {
            let text = expect_string(field, raw)?.trim().to_string();
            if !URL_RE.is_match(&text) {
                return Err(ValueError::new(field, format!("`{text}` is not an http(s) url")));
            }
            FieldValue::Text(text)
        }
        FieldType::Select => {
            let text = expect_string(field, raw)?;
            if !field.options.iter().any(|option| option == &text) {
                return Err(ValueError::new(
                    field,
                    format!("`{text}` is not one of {:?}", field.options),
                ));
            }
            FieldValue::Text(text)
        }
        FieldType::Number => FieldValue::Number(coerce_number(field, raw)?),
        FieldType::Boolean => FieldValue::Bool(coerce_bool(field, raw)?),
        FieldType::Date => FieldValue::Date(coerce_date(field, raw)?),
        FieldType::Relation => FieldValue::Relation(coerce_id(field, raw)?),
        FieldType::User => FieldValue::User(coerce_id(field, raw)?),
    };
    Ok(Some(value))
}

fn expect_string(field: &Field, raw: &JsonValue) -> Result<String, ValueError> {
    match raw {
        JsonValue::String(value) => Ok(value.clone()),
        // Numbers typed into text boxes arrive unquoted from some clients.
        JsonValue::Number(value) => Ok(value.to_string()),
        other => Err(ValueError::new(
            field,
            format!("expected a string, got {}", json_kind(other)),
        )),
    }
}

fn coerce_number(field: &Field, raw: &JsonValue) -> Result<f64, ValueError> {
    let parsed = match raw {
        JsonValue::Number(value) => value.as_f64(),
        JsonValue::String(value) => value.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValueError::new(field, format!("expected a number, got {raw}")))
}

fn coerce_bool(field: &Field, raw: &JsonValue) -> Result<bool, ValueError> {
    match raw {
        JsonValue::Bool(value) => Ok(*value),
        JsonValue::Number(value) if value.as_i64() == Some(1) => Ok(true),
        JsonValue::Number(value) if value.as_i64() == Some(0) => Ok(false),
        JsonValue::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ValueError::new(field, format!("expected a boolean, got `{value}`"))),
        },
        other => Err(ValueError::new(
            field,
            format!("expected a boolean, got {}", json_kind(other)),
        )),
    }
}

fn coerce_date(field: &Field, raw: &JsonValue) -> Result<String, ValueError> {
    let text = expect_string(field, raw)?.trim().to_string();
    let valid = NaiveDate::parse_from_str(&text, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(&text).is_ok()
        || NAIVE_DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(&text, format).is_ok());
    if !valid {
        return Err(ValueError::new(
            field,
            format!("`{text}` is not a valid YYYY-MM-DD date or ISO-8601 timestamp"),
        ));
    }
    Ok(text)
}

fn coerce_id(field: &Field, raw: &JsonValue) -> Result<i64, ValueError> {
    let parsed = match raw {
        JsonValue::Number(value) => value.as_i64(),
        JsonValue::String(value) => value.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|id| *id > 0)
        .ok_or_else(|| ValueError::new(field, format!("expected a positive id, got {raw}")))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{coerce_value, stringify_optional, FieldValue};
    use crate::model::field::{Field, FieldType};
    use serde_json::json;

    fn field(field_type: FieldType) -> Field {
        Field {
            id: 1,
            module_id: 1,
            name: "f".to_string(),
            display_name: "F".to_string(),
            field_type,
            options: vec!["low".to_string(), "high".to_string()],
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

    #[test]
    fn select_accepts_only_declared_options() {
        let select = field(FieldType::Select);
        assert_eq!(
            coerce_value(&select, &json!("high")).unwrap(),
            Some(FieldValue::Text("high".to_string()))
        );
        assert!(coerce_value(&select, &json!("urgent")).is_err());
    }

    #[test]
    fn number_and_boolean_accept_string_forms() {
        assert_eq!(
            coerce_value(&field(FieldType::Number), &json!("12.5")).unwrap(),
            Some(FieldValue::Number(12.5))
        );
        assert_eq!(
            coerce_value(&field(FieldType::Boolean), &json!("TRUE")).unwrap(),
            Some(FieldValue::Bool(true))
        );
        assert!(coerce_value(&field(FieldType::Number), &json!("twelve")).is_err());
        assert!(coerce_value(&field(FieldType::Boolean), &json!([true])).is_err());
    }

    #[test]
    fn null_and_blank_clear_the_value() {
        assert_eq!(coerce_value(&field(FieldType::Date), &json!(null)).unwrap(), None);
        assert_eq!(coerce_value(&field(FieldType::Email), &json!("  ")).unwrap(), None);
    }

    #[test]
    fn date_email_url_are_checked() {
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-02-29")).is_ok());
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-02-30")).is_err());
        assert!(coerce_value(&field(FieldType::Date), &json!("2023-02-29")).is_err());
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-13-01")).is_err());
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-01-05T10:00:00Z")).is_ok());
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-01-05 10:00:00")).is_ok());
        assert!(coerce_value(&field(FieldType::Date), &json!("2024-01-05T25:00:00Z")).is_err());
        assert!(coerce_value(&field(FieldType::Email), &json!("ops@example.com")).is_ok());
        assert!(coerce_value(&field(FieldType::Email), &json!("ops")).is_err());
        assert!(coerce_value(&field(FieldType::Url), &json!("ftp://x")).is_err());
    }

    #[test]
    fn relation_and_user_need_positive_ids() {
        assert_eq!(
            coerce_value(&field(FieldType::Relation), &json!("42")).unwrap(),
            Some(FieldValue::Relation(42))
        );
        assert!(coerce_value(&field(FieldType::User), &json!(0)).is_err());
    }

    #[test]
    fn stringify_drops_integral_fraction_and_maps_none_to_empty() {
        assert_eq!(FieldValue::Number(5.0).stringify(), "5");
        assert_eq!(FieldValue::Number(2.25).stringify(), "2.25");
        assert_eq!(FieldValue::Bool(false).stringify(), "false");
        assert_eq!(stringify_optional(None), "");
    }

    #[test]
    fn tagged_serialization_is_stable() {
        let encoded = serde_json::to_string(&FieldValue::Relation(7)).unwrap();
        assert_eq!(encoded, r#"{"type":"relation","value":7}"#);
    }
}
