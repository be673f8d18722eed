//! Record engine and audit trail routes.

use super::{Envelope, RecordDetailView, RecordSummaryView, RecordView};
use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathParams, QueryParams};
use crate::principal::Caller;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use recordbase_core::{
    ChildrenCount, DeletedRecord, HistoryEntry, NewRecord, RecordDeleteMode, RecordId,
    RecordListQuery, RecordUpdate, UserId,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub status: Option<String>,
    pub assigned_to: Option<UserId>,
    pub parent_record_id: Option<RecordId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<ListParams> for RecordListQuery {
    fn from(params: ListParams) -> Self {
        Self {
            status: params.status.filter(|status| !status.trim().is_empty()),
            assigned_to: params.assigned_to,
            parent_record_id: params.parent_record_id,
            limit: params.limit,
            offset: params.offset.unwrap_or(0),
        }
    }
}

/// GET /api/modules/:module/records
pub async fn list_records(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
    QueryParams(params): QueryParams<ListParams>,
) -> ApiResult<Json<Vec<RecordSummaryView>>> {
    let query = RecordListQuery::from(params);
    let rows = state
        .run(move |s| s.records().list(principal.as_ref(), &module, &query))
        .await?;
    Ok(Json(rows.into_iter().map(RecordSummaryView::from).collect()))
}

/// POST /api/modules/:module/records
pub async fn create_record(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
    JsonBody(mut input): JsonBody<NewRecord>,
) -> ApiResult<(StatusCode, Json<Envelope<RecordView>>)> {
    // Authorship always comes from the principal.
    input.created_by = None;
    let outcome = state
        .run(move |s| s.records().create(principal.as_ref(), &module, &input))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::from_outcome(outcome, RecordView::from)),
    ))
}

/// GET /api/modules/:module/records/:id
pub async fn get_record(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<Envelope<RecordDetailView>>> {
    let outcome = state
        .run(move |s| s.records().get(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(Envelope::from_outcome(outcome, RecordDetailView::from)))
}

/// PUT /api/modules/:module/records/:id
pub async fn update_record(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(mut update): JsonBody<RecordUpdate>,
) -> ApiResult<Json<Envelope<RecordView>>> {
    update.updated_by = None;
    let outcome = state
        .run(move |s| s.records().update(principal.as_ref(), &module, id, &update))
        .await?;
    Ok(Json(Envelope::from_outcome(outcome, RecordView::from)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteParams {
    pub children: Option<String>,
}

impl DeleteParams {
    pub fn mode(&self) -> ApiResult<RecordDeleteMode> {
        match self.children.as_deref() {
            None => Ok(RecordDeleteMode::default()),
            Some(value) => RecordDeleteMode::parse(value).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "children must be one of restrict, cascade, orphan; got `{value}`"
                ))
            }),
        }
    }
}

/// DELETE /api/modules/:module/records/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    QueryParams(params): QueryParams<DeleteParams>,
) -> ApiResult<Json<Envelope<DeletedRecord>>> {
    let mode = params.mode()?;
    let outcome = state
        .run(move |s| s.records().delete(principal.as_ref(), &module, id, mode))
        .await?;
    Ok(Json(Envelope::from_outcome(outcome, |deleted| deleted)))
}

/// GET /api/modules/:module/records/:id/children/:sub_module
pub async fn list_children(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id, sub_module)): PathParams<(String, RecordId, String)>,
) -> ApiResult<Json<Vec<RecordView>>> {
    let children = state
        .run(move |s| {
            s.records()
                .get_children(principal.as_ref(), &module, id, &sub_module)
        })
        .await?;
    Ok(Json(children.into_iter().map(RecordView::from).collect()))
}

/// GET /api/modules/:module/records/:id/children-count
pub async fn children_count(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<ChildrenCount>> {
    let count = state
        .run(move |s| s.records().get_children_count(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(count))
}

/// GET /api/modules/:module/records/:id/history
pub async fn list_history(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let entries = state
        .run(move |s| s.audit().list_history(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub note: String,
}

/// POST /api/modules/:module/records/:id/history
pub async fn add_note(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(body): JsonBody<NoteBody>,
) -> ApiResult<(StatusCode, Json<HistoryEntry>)> {
    let entry = state
        .run(move |s| s.audit().add_note(principal.as_ref(), &module, id, &body.note))
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/modules/:module/records",
            get(list_records).post(create_record),
        )
        .route(
            "/api/modules/:module/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route(
            "/api/modules/:module/records/:id/children/:sub_module",
            get(list_children),
        )
        .route(
            "/api/modules/:module/records/:id/children-count",
            get(children_count),
        )
        .route(
            "/api/modules/:module/records/:id/history",
            get(list_history).post(add_note),
        )
}
