use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        grid::{AwardPointsRequest, GridActionResponse, ResolveCellRequest},
        host::{KickResponse, StepQuery, TransitionResponse},
    },
    error::AppError,
    services::{grid_service, host_service},
    state::{SharedState, commands::HostCommand},
};

pub(crate) const HOST_TOKEN_HEADER: &str = "x-host-token";

/// Host-only endpoints driving a session. Every route requires the token returned at launch.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/host/start", post(start_session))
        .route("/sessions/{id}/host/reveal", post(reveal_question))
        .route("/sessions/{id}/host/next", post(next_question))
        .route("/sessions/{id}/host/end", post(end_session))
        .route("/sessions/{id}/host/close", post(close_session))
        .route(
            "/sessions/{id}/host/players/{player_id}",
            delete(kick_player),
        )
        .route(
            "/sessions/{id}/host/grid/cells/{index}/open",
            post(open_cell),
        )
        .route(
            "/sessions/{id}/host/grid/cells/{index}/resolve",
            post(resolve_cell),
        )
        .route(
            "/sessions/{id}/host/grid/cells/{index}/complete",
            post(complete_cell),
        )
        .route(
            "/sessions/{id}/host/grid/teams/{team_index}/points",
            post(award_points),
        )
        .route_layer(middleware::from_fn_with_state(state, require_host_token))
}

async fn command(
    state: &SharedState,
    id: Uuid,
    command: HostCommand,
) -> Result<Json<TransitionResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(
        host_service::run_command(state, &runtime, command).await?,
    ))
}

/// Leave the lobby and start playing.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/start",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session started", body = TransitionResponse),
        (status = 409, description = "Session cannot start from its current state")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    command(&state, id, HostCommand::Start).await
}

/// Reveal the correct answer of the current question.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/reveal",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"), StepQuery),
    responses((status = 200, description = "Question revealed", body = TransitionResponse))
)]
pub async fn reveal_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StepQuery>,
) -> Result<Json<TransitionResponse>, AppError> {
    let question_index = query.question_index;
    command(&state, id, HostCommand::Reveal { question_index }).await
}

/// Move on to the next question, or to the final scoreboard after the last one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/next",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"), StepQuery),
    responses((status = 200, description = "Advanced", body = TransitionResponse))
)]
pub async fn next_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StepQuery>,
) -> Result<Json<TransitionResponse>, AppError> {
    let question_index = query.question_index;
    command(&state, id, HostCommand::Next { question_index }).await
}

/// Jump to the final scoreboard.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/end",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Session finished", body = TransitionResponse))
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    command(&state, id, HostCommand::End).await
}

/// Close the session and disconnect everyone.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/close",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Session closed", body = TransitionResponse))
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    command(&state, id, HostCommand::Close).await
}

/// Remove a player from the session.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/host/players/{player_id}",
    tag = "host",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"),
    ("player_id" = String, Path, description = "Player to remove")),
    responses(
        (status = 200, description = "Player removed", body = KickResponse),
        (status = 404, description = "Unknown player")
    )
)]
pub async fn kick_player(
    State(state): State<SharedState>,
    Path((id, player_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<KickResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(
        host_service::kick_player(&state, &runtime, player_id).await?,
    ))
}

/// Open a grid cell.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/grid/cells/{index}/open",
    tag = "grid",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"),
    ("index" = usize, Path, description = "Cell index, row major")),
    responses((status = 200, description = "Cell opened", body = GridActionResponse))
)]
pub async fn open_cell(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<GridActionResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(grid_service::open_cell(&state, &runtime, index).await?))
}

/// Score a grid cell for the team in turn.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/grid/cells/{index}/resolve",
    tag = "grid",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"),
    ("index" = usize, Path, description = "Cell index, row major")),
    request_body = ResolveCellRequest,
    responses((status = 200, description = "Cell resolved", body = GridActionResponse))
)]
pub async fn resolve_cell(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(payload): Json<ResolveCellRequest>,
) -> Result<Json<GridActionResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(
        grid_service::resolve_cell(&state, &runtime, index, payload.option_index).await?,
    ))
}

/// Complete a grid cell without scoring it.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/grid/cells/{index}/complete",
    tag = "grid",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"),
    ("index" = usize, Path, description = "Cell index, row major")),
    responses((status = 200, description = "Cell completed", body = GridActionResponse))
)]
pub async fn complete_cell(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<GridActionResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(
        grid_service::complete_cell(&state, &runtime, index).await?,
    ))
}

/// Manually adjust one team's score.
#[utoipa::path(
    post,
    path = "/sessions/{id}/host/grid/teams/{team_index}/points",
    tag = "grid",
    params(("X-Host-Token" = String, Header, description = "Host token returned at launch"),
    ("id" = String, Path, description = "Session identifier"),
    ("team_index" = usize, Path, description = "Team index")),
    request_body = AwardPointsRequest,
    responses((status = 200, description = "Points awarded", body = GridActionResponse))
)]
pub async fn award_points(
    State(state): State<SharedState>,
    Path((id, team_index)): Path<(Uuid, usize)>,
    Valid(Json(payload)): Valid<Json<AwardPointsRequest>>,
) -> Result<Json<GridActionResponse>, AppError> {
    let runtime = state.session(id)?;
    Ok(Json(
        grid_service::award_points(&state, &runtime, team_index, payload.points).await?,
    ))
}

async fn require_host_token(
    State(state): State<SharedState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(HOST_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing host token header `X-Host-Token`".into()))?;

    let session_id = params
        .get("id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| AppError::BadRequest("invalid session identifier".into()))?;

    host_service::authorize(&state, session_id, provided)?;
    Ok(next.run(req).await)
}
