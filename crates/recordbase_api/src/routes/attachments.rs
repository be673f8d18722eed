//! Images, documents and links hanging off a record.

use super::Envelope;
use crate::error::ApiResult;
use crate::extract::{JsonBody, PathParams};
use crate::principal::Caller;
use crate::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use recordbase_core::model::attachment::{DocumentId, ImageId, LinkId};
use recordbase_core::{RecordDocument, RecordId, RecordImage, RecordLink};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ImageBody {
    pub data_uri: String,
}

/// GET /api/modules/:module/records/:id/images
pub async fn list_images(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<Vec<RecordImage>>> {
    let images = state
        .run(move |s| s.attachments().list_images(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(images))
}

/// POST /api/modules/:module/records/:id/images
pub async fn add_image(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(body): JsonBody<ImageBody>,
) -> ApiResult<(StatusCode, Json<RecordImage>)> {
    let image = state
        .run(move |s| {
            s.attachments()
                .add_image(principal.as_ref(), &module, id, &body.data_uri)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[derive(Debug, Deserialize)]
pub struct ImageOrderBody {
    pub image_ids: Vec<ImageId>,
}

/// PUT /api/modules/:module/records/:id/images/order
pub async fn reorder_images(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(body): JsonBody<ImageOrderBody>,
) -> ApiResult<Json<Vec<RecordImage>>> {
    let images = state
        .run(move |s| {
            s.attachments()
                .reorder_images(principal.as_ref(), &module, id, &body.image_ids)
        })
        .await?;
    Ok(Json(images))
}

/// DELETE /api/modules/:module/records/:id/images/:image_id
pub async fn delete_image(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id, image_id)): PathParams<(String, RecordId, ImageId)>,
) -> ApiResult<Json<Envelope<()>>> {
    let outcome = state
        .run(move |s| {
            s.attachments()
                .delete_image(principal.as_ref(), &module, id, image_id)
        })
        .await?;
    Ok(Json(Envelope::from_outcome(outcome, |unit| unit)))
}

#[derive(Debug, Deserialize)]
pub struct DocumentBody {
    pub data_uri: String,
    pub file_name: String,
}

/// GET /api/modules/:module/records/:id/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<Vec<RecordDocument>>> {
    let documents = state
        .run(move |s| s.attachments().list_documents(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(documents))
}

/// POST /api/modules/:module/records/:id/documents
pub async fn add_document(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(body): JsonBody<DocumentBody>,
) -> ApiResult<(StatusCode, Json<RecordDocument>)> {
    let document = state
        .run(move |s| {
            s.attachments().add_document(
                principal.as_ref(),
                &module,
                id,
                &body.data_uri,
                &body.file_name,
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/modules/:module/records/:id/documents/:doc_id
///
/// Streams the stored bytes back as an attachment.
pub async fn download_document(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id, doc_id)): PathParams<(String, RecordId, DocumentId)>,
) -> ApiResult<Response> {
    let (document, bytes) = state
        .run(move |s| {
            s.attachments()
                .read_document(principal.as_ref(), &module, id, doc_id)
        })
        .await?;
    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/modules/:module/records/:id/documents/:doc_id
pub async fn delete_document(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id, doc_id)): PathParams<(String, RecordId, DocumentId)>,
) -> ApiResult<Json<Envelope<()>>> {
    let outcome = state
        .run(move |s| {
            s.attachments()
                .delete_document(principal.as_ref(), &module, id, doc_id)
        })
        .await?;
    Ok(Json(Envelope::from_outcome(outcome, |unit| unit)))
}

#[derive(Debug, Deserialize)]
pub struct LinkBody {
    pub linked_record_id: RecordId,
    #[serde(default)]
    pub note: Option<String>,
}

/// GET /api/modules/:module/records/:id/links
pub async fn list_links(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
) -> ApiResult<Json<Vec<RecordLink>>> {
    let links = state
        .run(move |s| s.attachments().list_links(principal.as_ref(), &module, id))
        .await?;
    Ok(Json(links))
}

/// POST /api/modules/:module/records/:id/links
pub async fn add_link(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id)): PathParams<(String, RecordId)>,
    JsonBody(body): JsonBody<LinkBody>,
) -> ApiResult<(StatusCode, Json<RecordLink>)> {
    let link = state
        .run(move |s| {
            s.attachments().add_link(
                principal.as_ref(),
                &module,
                id,
                body.linked_record_id,
                body.note.as_deref(),
            )
        })
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// DELETE /api/modules/:module/records/:id/links/:link_id
pub async fn delete_link(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((module, id, link_id)): PathParams<(String, RecordId, LinkId)>,
) -> ApiResult<StatusCode> {
    state
        .run(move |s| {
            s.attachments()
                .delete_link(principal.as_ref(), &module, id, link_id)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn attachment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/modules/:module/records/:id/images",
            get(list_images).post(add_image),
        )
        .route(
            "/api/modules/:module/records/:id/images/order",
            put(reorder_images),
        )
        .route(
            "/api/modules/:module/records/:id/images/:image_id",
            delete(delete_image),
        )
        .route(
            "/api/modules/:module/records/:id/documents",
            get(list_documents).post(add_document),
        )
        .route(
            "/api/modules/:module/records/:id/documents/:doc_id",
            get(download_document).delete(delete_document),
        )
        .route(
            "/api/modules/:module/records/:id/links",
            get(list_links).post(add_link),
        )
        .route(
            "/api/modules/:module/records/:id/links/:link_id",
            delete(delete_link),
        )
}
