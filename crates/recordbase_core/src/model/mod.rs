//! Domain model for modules, fields, records and their satellites.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep schema-as-data types (modules, fields) separate from record data.
//!
//! # Invariants
//! - Every stored object is identified by an SQLite integer row id.
//! - Timestamps are Unix epoch milliseconds.

pub mod attachment;
pub mod field;
pub mod history;
pub mod module;
pub mod principal;
pub mod record;
pub mod value;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent member (`None`) from an explicit `null` (`Some(None)`).
///
/// Pair with `#[serde(default)]` on the containing struct.
pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use crate::model::record::RecordUpdate;

    #[test]
    fn double_option_separates_absent_from_null() {
        let absent: RecordUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.assigned_to, None);

        let cleared: RecordUpdate = serde_json::from_str(r#"{"assigned_to":null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));

        let set: RecordUpdate = serde_json::from_str(r#"{"assigned_to":7}"#).unwrap();
        assert_eq!(set.assigned_to, Some(Some(7)));
    }
}
