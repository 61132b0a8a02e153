use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{error::AppError, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sessions/{id}/players/{player_id}/ws",
    tag = "players",
    params(("id" = String, Path, description = "Session identifier"),
    ("player_id" = String, Path, description = "Connecting player")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Unknown session or player")
    )
)]
/// Upgrade the HTTP connection into a player WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path((id, player_id)): Path<(Uuid, Uuid)>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let connection = websocket_service::prepare_connection(&state, id, player_id).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, connection, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/players/{player_id}/ws", get(ws_handler))
}
