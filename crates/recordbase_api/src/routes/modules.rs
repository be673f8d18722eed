//! Read-side schema routes for any authenticated principal.

use crate::error::ApiResult;
use crate::extract::PathParams;
use crate::principal::Caller;
use crate::AppState;
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use recordbase_core::{AccessOperation, MenuItems, Module, ModuleSchema};

/// GET /api/modules
pub async fn list_modules(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> ApiResult<Json<Vec<Module>>> {
    let modules = state
        .run(move |s| s.access().accessible_modules(principal.as_ref()))
        .await?;
    Ok(Json(modules))
}

/// GET /api/modules/:module
pub async fn describe_module(
    State(state): State<AppState>,
    Caller(principal): Caller,
    PathParams(module): PathParams<String>,
) -> ApiResult<Json<ModuleSchema>> {
    let schema = state
        .run(move |s| {
            s.access()
                .authorize(principal.as_ref(), &module, AccessOperation::View)?;
            s.schema().describe_module(&module)
        })
        .await?;
    Ok(Json(schema))
}

/// GET /api/menu-items
pub async fn menu_items(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> ApiResult<Json<MenuItems>> {
    let items = state
        .run(move |s| s.access().accessible_menu_items(principal.as_ref()))
        .await?;
    Ok(Json(items))
}

pub fn module_routes() -> Router<AppState> {
    Router::new()
        .route("/api/modules", get(list_modules))
        .route("/api/modules/:module", get(describe_module))
        .route("/api/menu-items", get(menu_items))
}
