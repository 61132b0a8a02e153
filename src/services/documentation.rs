use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the quiz session backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::launch_session,
        crate::routes::sessions::join_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::get_leaderboard,
        crate::routes::players::submit_answer,
        crate::routes::players::leave_session,
        crate::routes::websocket::ws_handler,
        crate::routes::sse::session_stream,
        crate::routes::host::start_session,
        crate::routes::host::reveal_question,
        crate::routes::host::next_question,
        crate::routes::host::end_session,
        crate::routes::host::close_session,
        crate::routes::host::kick_player,
        crate::routes::host::open_cell,
        crate::routes::host::resolve_cell,
        crate::routes::host::complete_cell,
        crate::routes::host::award_points,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::LaunchSessionRequest,
            crate::dto::session::LaunchSessionResponse,
            crate::dto::session::JoinSessionRequest,
            crate::dto::session::JoinSessionResponse,
            crate::dto::session::SessionView,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::PlayerSummary,
            crate::dto::session::LeaderboardResponse,
            crate::dto::player::SubmitAnswerRequest,
            crate::dto::player::AnswerResponse,
            crate::dto::host::TransitionResponse,
            crate::dto::host::KickResponse,
            crate::dto::grid::GridSnapshot,
            crate::dto::grid::GridActionResponse,
            crate::dto::grid::ResolveCellRequest,
            crate::dto::grid::AwardPointsRequest,
            crate::dto::ws::PlayerInboundMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Launching, joining and reading sessions"),
        (name = "players", description = "Player answers, departures and WebSocket"),
        (name = "host", description = "Host lifecycle commands"),
        (name = "grid", description = "Grid commands of jeopardy sessions"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_host_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sessions",
            "/sessions/{id}/events",
            "/sessions/{id}/host/close",
            "/sessions/{id}/host/grid/teams/{team_index}/points",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
