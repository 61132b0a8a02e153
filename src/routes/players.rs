use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
};
use uuid::Uuid;

use crate::{
    dto::player::{AnswerResponse, SubmitAnswerRequest},
    error::AppError,
    services::player_service,
    state::SharedState,
};

/// Routes players use for their own record.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/sessions/{id}/players/{player_id}/answers",
            post(submit_answer),
        )
        .route("/sessions/{id}/players/{player_id}", delete(leave_session))
}

/// Submit an answer for the current question, or any question in self-paced sessions.
#[utoipa::path(
    post,
    path = "/sessions/{id}/players/{player_id}/answers",
    tag = "players",
    params(("id" = String, Path, description = "Session identifier"),
    ("player_id" = String, Path, description = "Answering player")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerResponse),
        (status = 409, description = "Question not accepting answers or already answered differently")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path((id, player_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    Ok(Json(
        player_service::submit_answer(&state, id, player_id, payload).await?,
    ))
}

/// Leave the session.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/players/{player_id}",
    tag = "players",
    params(("id" = String, Path, description = "Session identifier"),
    ("player_id" = String, Path, description = "Leaving player")),
    responses((status = 204, description = "Player left"))
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path((id, player_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    player_service::leave_session(&state, id, player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
