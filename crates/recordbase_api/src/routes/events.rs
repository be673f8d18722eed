//! `/api/events`: record lifecycle events as Server-Sent Events.
//!
//! Each subscriber only receives events for modules it may view.

use crate::error::{ApiError, ApiResult};
use crate::principal::Caller;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use recordbase_core::{AccessOperation, Principal, ServiceError};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let principal = caller
        .0
        .ok_or(ApiError::Service(ServiceError::Unauthenticated))?;
    let mut rx = state.events().subscribe();
    log::info!(
        "event=sse_connect module=api status=ok user_id={} subscribers={}",
        principal.id,
        state.events().subscriber_count()
    );

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !may_view(&state, &principal, &event.module_name).await {
                        continue;
                    }
                    match Event::default().event(event.event_type.as_str()).json_data(&event) {
                        Ok(sse) => yield Ok::<Event, Infallible>(sse),
                        Err(err) => log::warn!(
                            "event=sse_send module=api status=error record_id={} error={}",
                            event.record_id,
                            err
                        ),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "event=sse_lagged module=api status=degraded user_id={} skipped={}",
                        principal.id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("heartbeat"),
    ))
}

async fn may_view(state: &AppState, principal: &Principal, module_name: &str) -> bool {
    if principal.is_admin() {
        return true;
    }
    let principal = principal.clone();
    let module_name = module_name.to_string();
    state
        .run(move |services| services.access().evaluate(Some(&principal), &module_name))
        .await
        .map(|access| access.allows(AccessOperation::View))
        .unwrap_or(false)
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/api/events", get(event_stream))
}
