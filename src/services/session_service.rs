//! Launching, joining and reading sessions.

use std::{future::Future, sync::Arc};

use tokio::time::timeout;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::storage::StorageResult,
    dto::{
        notification::Notification,
        session::{
            JoinSessionRequest, JoinSessionResponse, LaunchSessionRequest, LaunchSessionResponse,
            LeaderboardResponse, PlayerSummary, SessionSnapshot, SessionView,
        },
    },
    error::ServiceError,
    services::naming::{generate_join_code, pick_team_names, resolve_display_name},
    state::{
        AppState, Mutation, PendingWrite, SessionRuntime, SharedState,
        grid::GridBoard,
        session::{GameMode, Player, QuizSnapshot, Session},
        state_machine::SessionPhase,
    },
};

/// Teams created for a grid session when the host names none.
pub const DEFAULT_TEAM_COUNT: usize = 2;
const MAX_JOIN_CODE_ATTEMPTS: usize = 64;

/// Launch a session from a quiz snapshot and host options.
///
/// The session is persisted in the lobby before it becomes reachable by its join code.
pub async fn launch_session(
    state: &SharedState,
    request: LaunchSessionRequest,
) -> Result<LaunchSessionResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let app_config = state.config();
    let config = request.settings.to_config();
    let quiz = QuizSnapshot::from(request.quiz);

    let grid = (config.game_mode == GameMode::Jeopardy).then(|| {
        let mut rng = rand::rng();
        let team_names = match request.settings.team_names.filter(|names| !names.is_empty()) {
            Some(names) => names
                .into_iter()
                .map(|name| name.trim().to_string())
                .collect(),
            None => pick_team_names(
                &app_config,
                request.settings.team_count.unwrap_or(DEFAULT_TEAM_COUNT),
                &mut rng,
            ),
        };
        GridBoard::new(
            quiz.questions.len(),
            config.grid_columns,
            config.grid_score_mode,
            team_names,
            &mut rng,
        )
    });

    let mut session = Session::new(String::new(), request.host_id, quiz, config, grid);
    let session_id = session.id;
    session.join_code = reserve_join_code(state, session_id)?;
    let join_code = session.join_code.clone();

    let entity = session.to_entity(SessionPhase::Lobby, 0);
    if let Err(err) = with_timeout(state, store.save_session(entity)).await {
        state.release_join_code(&join_code, session_id);
        return Err(err);
    }

    let runtime = Arc::new(SessionRuntime::new(
        session,
        app_config.bus_capacity,
        state.transition_timeout(),
    ));
    state.register_session(runtime.clone());
    info!(
        session_id = %session_id,
        join_code = %join_code,
        game_mode = ?config.game_mode,
        "session launched"
    );

    Ok(LaunchSessionResponse {
        session: runtime.view().await,
        host_token: runtime.host_token().to_string(),
    })
}

/// Join a session in its lobby by code.
///
/// Late joins are refused so nobody enters with questions already behind them.
pub async fn join_session(
    state: &SharedState,
    request: JoinSessionRequest,
) -> Result<JoinSessionResponse, ServiceError> {
    let runtime = state.session_by_code(request.join_code.trim())?;
    let store = state.require_session_store().await?;
    let app_config = state.config();
    let requested = request.display_name;

    let (player, session) = runtime
        .write(&store, move |draft, machine| {
            if machine.phase != SessionPhase::Lobby {
                return Err(ServiceError::InvalidState(
                    "session is no longer accepting players".into(),
                ));
            }

            let display_name = resolve_display_name(
                requested.as_deref(),
                draft.config.force_random_names,
                &app_config,
                &mut rand::rng(),
            );
            let player = Player::new(display_name);
            let player_id = player.id;
            let summary = PlayerSummary::from(&player);
            draft.players.insert(player_id, player);
            let session = SessionSnapshot::build(draft, machine.phase, machine.version);

            Ok(
                Mutation::new((summary.clone(), session), PendingWrite::Player(player_id))
                    .notify(Notification::PlayerJoined(summary)),
            )
        })
        .await?;

    info!(
        session_id = %runtime.id(),
        player_id = %player.id,
        display_name = %player.display_name,
        "player joined"
    );

    Ok(JoinSessionResponse {
        session_id: runtime.id(),
        player,
        session,
    })
}

/// Full view of a session. Sessions no longer held in memory are read from the store.
pub async fn get_session(state: &SharedState, session_id: Uuid) -> Result<SessionView, ServiceError> {
    if let Some(runtime) = state.live_session(session_id) {
        return Ok(runtime.view().await);
    }
    let (session, phase, version) = load_persisted(state, session_id).await?;
    Ok(SessionView::build(&session, phase, version))
}

/// Players of a session ranked by score.
pub async fn leaderboard(
    state: &SharedState,
    session_id: Uuid,
) -> Result<LeaderboardResponse, ServiceError> {
    if let Some(runtime) = state.live_session(session_id) {
        return Ok(runtime
            .read(|session, phase| LeaderboardResponse::build(session, phase.status()))
            .await);
    }
    let (session, phase, _) = load_persisted(state, session_id).await?;
    Ok(LeaderboardResponse::build(&session, phase.status()))
}

async fn load_persisted(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(Session, SessionPhase, u64), ServiceError> {
    let store = state.require_session_store().await?;
    let entity = with_timeout(state, store.find_session(session_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))?;
    let players = with_timeout(state, store.list_players(session_id)).await?;

    let (status, index, step, version) = (
        entity.status,
        entity.current_question_index,
        entity.question_step,
        entity.version,
    );
    let session = Session::from_entity(entity, players);
    let phase = SessionPhase::from_persisted(status, index, step, session.layout());
    Ok((session, phase, version))
}

fn reserve_join_code(state: &AppState, session_id: Uuid) -> Result<String, ServiceError> {
    let mut rng = rand::rng();
    for _ in 0..MAX_JOIN_CODE_ATTEMPTS {
        let code = generate_join_code(&mut rng);
        if state.reserve_join_code(&code, session_id) {
            return Ok(code);
        }
    }
    Err(ServiceError::InvalidState(
        "no free join code is available".into(),
    ))
}

async fn with_timeout<T>(
    state: &AppState,
    work: impl Future<Output = StorageResult<T>>,
) -> Result<T, ServiceError> {
    match state.transition_timeout() {
        Some(limit) => match timeout(limit, work).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        },
        None => work.await.map_err(ServiceError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::{MemorySessionStore, SessionStore},
        dto::session::{QuestionInput, QuizInput, SessionSettingsInput},
        services::host_service,
        state::{commands::HostCommand, state_machine::SessionStatus},
    };

    fn request(settings: SessionSettingsInput) -> LaunchSessionRequest {
        LaunchSessionRequest {
            host_id: "host".into(),
            quiz: QuizInput {
                title: "Quiz".into(),
                questions: (0..3)
                    .map(|i| QuestionInput {
                        prompt: format!("Q{i}"),
                        options: vec!["a".into(), "b".into()],
                        correct_index: 0,
                        explanation: None,
                    })
                    .collect(),
            },
            settings,
        }
    }

    async fn ready_state() -> (SharedState, MemorySessionStore) {
        let memory = MemorySessionStore::new();
        let state = AppState::new(AppConfig::default());
        state.install_session_store(Arc::new(memory.clone())).await;
        (state, memory)
    }

    fn join(code: &str, name: Option<&str>) -> JoinSessionRequest {
        JoinSessionRequest {
            join_code: code.into(),
            display_name: name.map(Into::into),
        }
    }

    #[tokio::test]
    async fn launch_requires_storage() {
        let state = AppState::new(AppConfig::default());
        let err = launch_session(&state, request(SessionSettingsInput::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn launch_persists_a_lobby_reachable_by_code() {
        let (state, memory) = ready_state().await;
        let response = launch_session(&state, request(SessionSettingsInput::default()))
            .await
            .unwrap();
        let snapshot = &response.session.session;
        assert_eq!(snapshot.status, SessionStatus::Lobby);
        assert_eq!(snapshot.current_question_index, -1);
        assert_eq!(snapshot.join_code.len(), 6);
        assert!(!response.host_token.is_empty());

        let stored = memory.find_session(snapshot.id).await.unwrap().unwrap();
        assert_eq!(stored.join_code, snapshot.join_code);
        assert_eq!(
            state.session_by_code(&snapshot.join_code).unwrap().id(),
            snapshot.id
        );
    }

    #[tokio::test]
    async fn failed_launch_releases_its_join_code() {
        let (state, memory) = ready_state().await;
        memory.set_offline(true);
        let err = launch_session(&state, request(SessionSettingsInput::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(state.live_session_count(), 0);
    }

    #[tokio::test]
    async fn joins_are_limited_to_the_lobby() {
        let (state, memory) = ready_state().await;
        let response = launch_session(&state, request(SessionSettingsInput::default()))
            .await
            .unwrap();
        let code = response.session.session.join_code.clone();
        let mut bus = state
            .session(response.session.session.id)
            .unwrap()
            .subscribe();

        let joined = join_session(&state, join(&code, Some(" Ada ")))
            .await
            .unwrap();
        assert_eq!(joined.player.display_name, "Ada");
        assert_eq!(joined.session.player_count, 1);
        assert_eq!(
            bus.recv().await.unwrap(),
            Notification::PlayerJoined(joined.player.clone())
        );
        assert_eq!(
            memory.list_players(joined.session_id).await.unwrap().len(),
            1
        );

        let runtime = state.session(joined.session_id).unwrap();
        host_service::run_command(&state, &runtime, HostCommand::Start)
            .await
            .unwrap();
        let err = join_session(&state, join(&code, Some("Late")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = join_session(&state, join("000000", None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn forced_random_names_ignore_the_request() {
        let (state, _) = ready_state().await;
        let settings = SessionSettingsInput {
            force_random_names: true,
            ..SessionSettingsInput::default()
        };
        let response = launch_session(&state, request(settings)).await.unwrap();
        let joined = join_session(
            &state,
            join(&response.session.session.join_code, Some("Ada")),
        )
        .await
        .unwrap();
        assert_ne!(joined.player.display_name, "Ada");
    }

    #[tokio::test]
    async fn grid_sessions_get_teams_and_one_cell_per_question() {
        let (state, _) = ready_state().await;
        let settings = SessionSettingsInput {
            game_mode: GameMode::Jeopardy,
            team_count: Some(3),
            grid_columns: Some(2),
            ..SessionSettingsInput::default()
        };
        let response = launch_session(&state, request(settings)).await.unwrap();
        let grid = response.session.grid.unwrap();
        assert_eq!(grid.teams.len(), 3);
        assert_eq!(grid.cells.len(), 3);
        assert_eq!(grid.columns, 2);
    }

    #[tokio::test]
    async fn closed_sessions_are_read_back_from_the_store() {
        let (state, _) = ready_state().await;
        let response = launch_session(&state, request(SessionSettingsInput::default()))
            .await
            .unwrap();
        let session_id = response.session.session.id;
        join_session(&state, join(&response.session.session.join_code, Some("Ada")))
            .await
            .unwrap();

        let runtime = state.session(session_id).unwrap();
        host_service::run_command(&state, &runtime, HostCommand::Close)
            .await
            .unwrap();
        assert!(state.live_session(session_id).is_none());

        let view = get_session(&state, session_id).await.unwrap();
        assert_eq!(view.session.status, SessionStatus::Closed);
        assert_eq!(view.players.len(), 1);

        let board = leaderboard(&state, session_id).await.unwrap();
        assert_eq!(board.status, SessionStatus::Closed);
        assert_eq!(board.entries.len(), 1);

        assert!(matches!(
            get_session(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
