use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        JoinSessionRequest, JoinSessionResponse, LaunchSessionRequest, LaunchSessionResponse,
        LeaderboardResponse, SessionView,
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes creating, joining and reading sessions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(launch_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/leaderboard", get(get_leaderboard))
}

/// Launch a session from a quiz snapshot.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = LaunchSessionRequest,
    responses(
        (status = 201, description = "Session launched", body = LaunchSessionResponse),
        (status = 400, description = "Invalid quiz or settings"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn launch_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<LaunchSessionRequest>>,
) -> Result<(StatusCode, Json<LaunchSessionResponse>), AppError> {
    let response = session_service::launch_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Join a session waiting in its lobby.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined", body = JoinSessionResponse),
        (status = 404, description = "Unknown join code"),
        (status = 409, description = "Session already started")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinSessionRequest>>,
) -> Result<Json<JoinSessionResponse>, AppError> {
    Ok(Json(session_service::join_session(&state, payload).await?))
}

/// Full view of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// Players ranked by score.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Leaderboard", body = LeaderboardResponse))
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(session_service::leaderboard(&state, id).await?))
}
