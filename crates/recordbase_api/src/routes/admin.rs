//! Administrator routes: schema definition, users, groups and grants.
//!
//! Admin checks happen in the core; these handlers only shape requests.

use crate::error::ApiResult;
use crate::extract::{JsonBody, PathParams};
use crate::principal::Caller;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, post, put},
    Json, Router,
};
use recordbase_core::{
    Field, FieldDefinition, FieldId, GroupId, Module, ModuleUpdate, NewModule, PermissionLevel,
    Role, User, UserGroup, UserId,
};
use serde::Deserialize;

/// POST /api/admin/modules
pub async fn create_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(input): JsonBody<NewModule>,
) -> ApiResult<(StatusCode, Json<Module>)> {
    let module = state
        .run(move |s| s.schema().create_module(principal.as_ref(), &input))
        .await?;
    Ok((StatusCode::CREATED, Json(module)))
}

/// PUT /api/admin/modules/:module
pub async fn update_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
    JsonBody(update): JsonBody<ModuleUpdate>,
) -> ApiResult<Json<Module>> {
    let module = state
        .run(move |s| s.schema().update_module(principal.as_ref(), &module, &update))
        .await?;
    Ok(Json(module))
}

/// DELETE /api/admin/modules/:module
pub async fn delete_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
) -> ApiResult<StatusCode> {
    state
        .run(move |s| s.schema().delete_module(principal.as_ref(), &module))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/modules/:module/fields
pub async fn create_field(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
    JsonBody(def): JsonBody<FieldDefinition>,
) -> ApiResult<(StatusCode, Json<Field>)> {
    let field = state
        .run(move |s| s.schema().create_field(principal.as_ref(), &module, &def))
        .await?;
    Ok((StatusCode::CREATED, Json(field)))
}

/// PUT /api/admin/fields/:field_id
pub async fn update_field(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(field_id): PathParams<FieldId>,
    JsonBody(def): JsonBody<FieldDefinition>,
) -> ApiResult<Json<Field>> {
    let field = state
        .run(move |s| s.schema().update_field(principal.as_ref(), field_id, &def))
        .await?;
    Ok(Json(field))
}

/// DELETE /api/admin/fields/:field_id
pub async fn delete_field(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(field_id): PathParams<FieldId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |s| s.schema().delete_field(principal.as_ref(), field_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

/// PUT /api/admin/users/:user_id
pub async fn upsert_user(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(user_id): PathParams<UserId>,
    JsonBody(body): JsonBody<UserBody>,
) -> ApiResult<Json<User>> {
    let user = User {
        id: user_id,
        email: body.email,
        display_name: body.display_name,
        role: body.role,
    };
    let user = state
        .run(move |s| s.access().upsert_user(principal.as_ref(), &user))
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    /// `null` or absent removes the override.
    #[serde(default)]
    pub level: Option<PermissionLevel>,
}

/// PUT /api/admin/users/:user_id/permissions/:module
pub async fn set_module_permission(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((user_id, module)): PathParams<(UserId, String)>,
    JsonBody(body): JsonBody<PermissionBody>,
) -> ApiResult<StatusCode> {
    state
        .run(move |s| {
            s.access()
                .set_module_permission(principal.as_ref(), user_id, &module, body.level)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/groups
pub async fn list_groups(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> ApiResult<Json<Vec<UserGroup>>> {
    let groups = state
        .run(move |s| s.access().list_groups(principal.as_ref()))
        .await?;
    Ok(Json(groups))
}

#[derive(Debug, Deserialize)]
pub struct GroupBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/admin/groups
pub async fn create_group(
    State(state): State<AppState>,
    Caller(principal): Caller,
    JsonBody(body): JsonBody<GroupBody>,
) -> ApiResult<(StatusCode, Json<UserGroup>)> {
    let group = state
        .run(move |s| {
            s.access()
                .create_group(principal.as_ref(), &body.name, &body.description)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// DELETE /api/admin/groups/:group_id
pub async fn delete_group(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(group_id): PathParams<GroupId>,
) -> ApiResult<StatusCode> {
    state
        .run(move |s| s.access().delete_group(principal.as_ref(), group_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/groups/:group_id/members/:user_id
pub async fn add_group_member(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((group_id, user_id)): PathParams<(GroupId, UserId)>,
) -> ApiResult<Json<UserGroup>> {
    let group = state
        .run(move |s| {
            s.access()
                .add_group_member(principal.as_ref(), group_id, user_id)
        })
        .await?;
    Ok(Json(group))
}

/// DELETE /api/admin/groups/:group_id/members/:user_id
pub async fn remove_group_member(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((group_id, user_id)): PathParams<(GroupId, UserId)>,
) -> ApiResult<Json<UserGroup>> {
    let group = state
        .run(move |s| {
            s.access()
                .remove_group_member(principal.as_ref(), group_id, user_id)
        })
        .await?;
    Ok(Json(group))
}

/// PUT /api/admin/groups/:group_id/modules/:module
pub async fn grant_group_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((group_id, module)): PathParams<(GroupId, String)>,
) -> ApiResult<Json<UserGroup>> {
    let group = state
        .run(move |s| {
            s.access()
                .grant_group_module(principal.as_ref(), group_id, &module)
        })
        .await?;
    Ok(Json(group))
}

/// DELETE /api/admin/groups/:group_id/modules/:module
pub async fn revoke_group_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams((group_id, module)): PathParams<(GroupId, String)>,
) -> ApiResult<Json<UserGroup>> {
    let group = state
        .run(move |s| {
            s.access()
                .revoke_group_module(principal.as_ref(), group_id, &module)
        })
        .await?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
pub struct MenuItemsBody {
    pub items: Vec<String>,
}

/// PUT /api/admin/groups/:group_id/menu-items
pub async fn set_group_menu_items(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(group_id): PathParams<GroupId>,
    JsonBody(body): JsonBody<MenuItemsBody>,
) -> ApiResult<Json<UserGroup>> {
    let group = state
        .run(move |s| {
            s.access()
                .set_group_menu_items(principal.as_ref(), group_id, &body.items)
        })
        .await?;
    Ok(Json(group))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/modules", post(create_module))
        .route(
            "/api/admin/modules/:module",
            put(update_module).delete(delete_module),
        )
        .route("/api/admin/modules/:module/fields", post(create_field))
        .route(
            "/api/admin/fields/:field_id",
            put(update_field).delete(delete_field),
        )
        .route("/api/admin/users/:user_id", put(upsert_user))
        .route(
            "/api/admin/users/:user_id/permissions/:module",
            put(set_module_permission),
        )
        .route("/api/admin/groups", post(create_group).get(list_groups))
        .route("/api/admin/groups/:group_id", delete(delete_group))
        .route(
            "/api/admin/groups/:group_id/members/:user_id",
            put(add_group_member).delete(remove_group_member),
        )
        .route(
            "/api/admin/groups/:group_id/modules/:module",
            put(grant_group_module).delete(revoke_group_module),
        )
        .route(
            "/api/admin/groups/:group_id/menu-items",
            put(set_group_menu_items),
        )
}
