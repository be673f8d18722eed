//! Route table and shared response shapes.

use crate::AppState;
use axum::Router;
use recordbase_core::model::value::data_to_json;
use recordbase_core::{
    ModuleId, Outcome, Record, RecordDetail, RecordId, RecordImage, RecordSummary, UserId,
};
use serde::Serialize;
use serde_json::Value as JsonValue;

pub mod admin;
pub mod attachments;
pub mod events;
pub mod health;
pub mod modules;
pub mod records;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::health_routes())
        .merge(events::event_routes())
        .merge(modules::module_routes())
        .merge(admin::admin_routes())
        .merge(records::record_routes())
        .merge(attachments::attachment_routes())
}

/// Mutation response: the value plus side effects that did not happen.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial_failures: Vec<String>,
}

impl<T> Envelope<T> {
    pub fn from_outcome<U>(outcome: Outcome<U>, f: impl FnOnce(U) -> T) -> Self {
        let Outcome {
            value,
            partial_failures,
        } = outcome;
        Self {
            data: f(value),
            partial_failures,
        }
    }
}

/// Record with `data` rendered as plain JSON values.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub id: RecordId,
    pub module_id: ModuleId,
    pub name: String,
    pub status: String,
    pub data: JsonValue,
    pub parent_record_id: Option<RecordId>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        Self {
            data: data_to_json(&record.data),
            id: record.id,
            module_id: record.module_id,
            name: record.name,
            status: record.status,
            parent_record_id: record.parent_record_id,
            assigned_to: record.assigned_to,
            created_by: record.created_by,
            updated_by: record.updated_by,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordSummaryView {
    #[serde(flatten)]
    pub record: RecordView,
    pub is_viewed: bool,
    pub thumbnail: Option<String>,
}

impl From<RecordSummary> for RecordSummaryView {
    fn from(summary: RecordSummary) -> Self {
        Self {
            record: summary.record.into(),
            is_viewed: summary.is_viewed,
            thumbnail: summary.thumbnail,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordDetailView {
    #[serde(flatten)]
    pub record: RecordView,
    pub images: Vec<RecordImage>,
}

impl From<RecordDetail> for RecordDetailView {
    fn from(detail: RecordDetail) -> Self {
        Self {
            record: detail.record.into(),
            images: detail.images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Envelope, RecordView};
    use recordbase_core::{FieldValue, Outcome, Record, RecordData};
    use serde_json::json;

    fn record() -> Record {
        let mut data = RecordData::new();
        data.insert("priority".to_string(), FieldValue::Text("high".to_string()));
        Record {
            id: 3,
            module_id: 1,
            name: "Printer jam".to_string(),
            status: "open".to_string(),
            data,
            parent_record_id: None,
            assigned_to: Some(9),
            created_by: Some(1),
            updated_by: None,
            version: 1,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn record_view_renders_plain_data() {
        let value = serde_json::to_value(RecordView::from(record())).unwrap();
        assert_eq!(value["data"], json!({"priority": "high"}));
        assert_eq!(value["assigned_to"], json!(9));
    }

    #[test]
    fn envelope_omits_empty_partial_failures() {
        let complete = Envelope::from_outcome(Outcome::complete(1), |v| v);
        assert_eq!(serde_json::to_value(&complete).unwrap(), json!({"data": 1}));

        let partial = Envelope::from_outcome(
            Outcome {
                value: 2,
                partial_failures: vec!["sse: closed".to_string()],
            },
            |v| v * 10,
        );
        assert_eq!(
            serde_json::to_value(&partial).unwrap(),
            json!({"data": 20, "partial_failures": ["sse: closed"]})
        );
    }
}
