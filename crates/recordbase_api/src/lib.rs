//! HTTP surface for recordbase.
//!
//! # Responsibility
//! - Map the route table onto core services.
//! - Run synchronous core work off the async runtime.
//!
//! # Invariants
//! - One SQLite connection, serialized behind a mutex.
//! - Every handler passes the caller's principal to the core; the core
//!   decides on 401/403.

use axum::Router;
use recordbase_core::service::permission_cache::DEFAULT_PERMISSION_CAPACITY;
use recordbase_core::{
    LocalFileStore, NotificationHub, NotificationHubError, PermissionCache, ServiceResult,
    Services,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod principal;
pub mod routes;

use error::{ApiError, ApiResult};
use events::{EventBroadcaster, EVENT_CHANNEL_CAPACITY};

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
    cache: Arc<PermissionCache>,
    hub: Arc<NotificationHub>,
    files: Arc<LocalFileStore>,
    events: EventBroadcaster,
}

impl AppState {
    pub fn new(
        conn: Connection,
        files: LocalFileStore,
        permission_ttl: Duration,
    ) -> Result<Self, NotificationHubError> {
        let events = EventBroadcaster::new(EVENT_CHANNEL_CAPACITY);
        let mut hub = NotificationHub::new();
        hub.register(Arc::new(events.clone()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            cache: Arc::new(PermissionCache::new(permission_ttl, DEFAULT_PERMISSION_CAPACITY)),
            hub: Arc::new(hub),
            files: Arc::new(files),
            events,
        })
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Runs `job` against the core on the blocking pool.
    pub async fn run<T, F>(&self, job: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Services<'_>) -> ServiceResult<T> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = state.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let services = Services::new(&conn, &state.cache, &state.hub, state.files.as_ref());
            job(&services)
        })
        .await
        .map_err(|err| ApiError::Internal(format!("core task failed: {err}")))?
        .map_err(ApiError::from)
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    routes::router().with_state(state)
}
