use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError, routes::host::HOST_TOKEN_HEADER, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(("id" = String, Path, description = "Session identifier"),
    ("X-Host-Token" = Option<String>, Header, description = "Host token; marks the host as present while the stream is open")),
    responses(
        (status = 200, description = "Snapshot followed by session notifications", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown or closed session")
    )
)]
/// Stream a session's changes to hosts and spectators.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (snapshot, receiver) = sse_service::subscribe_session(&state, id).await?;
    let token = headers
        .get(HOST_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let presence = sse_service::host_presence(&state, id, token);
    info!(session_id = %id, host = presence.is_some(), "new session SSE connection");
    let events = sse_service::spawn_forwarder(id, snapshot, receiver, presence);
    Ok(sse_service::to_sse_stream(events))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/events", get(session_stream))
}
