//! Host-driven lifecycle commands, kicks and the runtime's own system events.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::{
        host::{KickResponse, TransitionResponse},
        notification::{DirectMessage, Notification},
    },
    error::ServiceError,
    services::{phase_timer, player_service},
    state::{
        SessionRuntime, SharedState, TransitionOutcome,
        commands::{HostCommand, SystemEvent},
        session::{GameMode, Session},
        state_machine::{ActivePhase, QuestionStep, SessionEvent, SessionPhase},
    },
};

/// Live session whose host token matches `token`.
pub fn authorize(
    state: &SharedState,
    session_id: Uuid,
    token: &str,
) -> Result<Arc<SessionRuntime>, ServiceError> {
    let runtime = state.session(session_id)?;
    if !runtime.verify_host_token(token) {
        return Err(ServiceError::Unauthorized("invalid host token".into()));
    }
    runtime.touch_host();
    Ok(runtime)
}

/// Run a lifecycle command issued by the host.
///
/// A command the session already satisfies answers with `applied: false` instead of an
/// error, so redelivered commands are harmless.
pub async fn run_command(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    command: HostCommand,
) -> Result<TransitionResponse, ServiceError> {
    let event = command.to_event(runtime.phase().await)?;
    let guard: fn(&Session) -> Result<(), ServiceError> = match command {
        HostCommand::Start => require_players,
        _ => allow,
    };

    let outcome = transition(state, runtime, event, guard).await?;
    Ok(TransitionResponse {
        applied: outcome.applied(),
        session: outcome.into_snapshot(),
    })
}

/// Apply an event raised by a timer or by the answer flow.
pub async fn apply_system_event(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    event: SystemEvent,
) -> Result<TransitionOutcome, ServiceError> {
    transition(state, runtime, event.into(), allow).await
}

/// Close a session whose host went away, through the same teardown as an explicit close.
pub async fn close_abandoned(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
) -> Result<TransitionOutcome, ServiceError> {
    transition(state, runtime, SessionEvent::Close, allow).await
}

/// Remove a player on behalf of the host.
///
/// The record deletion is authoritative; the direct message only shortens the delay before
/// the device notices.
pub async fn kick_player(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    player_id: Uuid,
) -> Result<KickResponse, ServiceError> {
    player_service::remove_player(state, runtime, player_id).await?;
    let notified_directly = runtime.send_direct(player_id, DirectMessage::Kicked { player_id });
    info!(
        session_id = %runtime.id(),
        player_id = %player_id,
        notified_directly,
        "player kicked"
    );
    Ok(KickResponse {
        player_id,
        notified_directly,
    })
}

/// Question that every player has answered and that is still open in a live session.
pub(crate) fn auto_reveal_candidate(session: &Session, phase: SessionPhase) -> Option<usize> {
    match phase {
        SessionPhase::Active(ActivePhase::Question {
            index,
            step: QuestionStep::Answering,
        }) if session.config.game_mode == GameMode::Live && session.all_answered(index) => {
            Some(index)
        }
        _ => None,
    }
}

/// Reveal `index` early because every known player answered it. Best effort only.
pub(crate) async fn reveal_if_all_answered(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    index: usize,
) {
    match apply_system_event(state, runtime, SystemEvent::AllAnswered { index }).await {
        Ok(outcome) => debug!(
            session_id = %runtime.id(),
            index,
            applied = outcome.applied(),
            "all players answered"
        ),
        Err(err) => debug!(
            session_id = %runtime.id(),
            index,
            error = %err,
            "early reveal skipped"
        ),
    }
}

async fn transition<G>(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    event: SessionEvent,
    guard: G,
) -> Result<TransitionOutcome, ServiceError>
where
    G: FnOnce(&Session) -> Result<(), ServiceError>,
{
    let store = state.require_session_store().await?;
    let outcome = runtime.run_transition(&store, event, guard).await?;

    if let TransitionOutcome::Applied { from, to, .. } = &outcome {
        info!(
            session_id = %runtime.id(),
            from = ?from,
            to = ?to,
            event = ?event,
            "session transition applied"
        );
        if *to == SessionPhase::Closed {
            teardown(state, runtime);
        } else {
            phase_timer::schedule(state, runtime).await;
        }
    }

    Ok(outcome)
}

fn teardown(state: &SharedState, runtime: &SessionRuntime) {
    let session_id = runtime.id();
    runtime.timers().cancel_all();
    runtime.publish(Notification::SessionClosed { session_id });
    runtime.send_direct_to_all(DirectMessage::SessionClosed { session_id });
    state.retire_session(session_id);
    info!(
        session_id = %session_id,
        connections = runtime.connection_count(),
        "session closed and retired"
    );
}

fn require_players(session: &Session) -> Result<(), ServiceError> {
    // Grid sessions are played by teams in the room; devices are optional.
    if session.players.is_empty() && session.config.game_mode != GameMode::Jeopardy {
        return Err(ServiceError::InvalidState(
            "cannot start a session without players".into(),
        ));
    }
    Ok(())
}

fn allow(_: &Session) -> Result<(), ServiceError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::{MemorySessionStore, SessionStore},
        dto::session::{
            JoinSessionRequest, LaunchSessionRequest, QuestionInput, QuizInput,
            SessionSettingsInput,
        },
        services::session_service,
        state::{AppState, state_machine::SessionStatus, timers::TimerKind},
    };

    async fn launched(settings: SessionSettingsInput) -> (SharedState, Arc<SessionRuntime>) {
        let config = AppConfig::from_json_str(r#"{"preview_delay_ms": 20}"#).unwrap();
        let state = AppState::new(config);
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let questions = (0..2)
            .map(|i| QuestionInput {
                prompt: format!("Q{i}"),
                options: vec!["a".into(), "b".into()],
                correct_index: 0,
                explanation: None,
            })
            .collect();
        let response = session_service::launch_session(
            &state,
            LaunchSessionRequest {
                host_id: "host".into(),
                quiz: QuizInput {
                    title: "Quiz".into(),
                    questions,
                },
                settings,
            },
        )
        .await
        .unwrap();
        let runtime = state.session(response.session.session.id).unwrap();
        (state, runtime)
    }

    async fn join(state: &SharedState, runtime: &SessionRuntime, name: &str) -> Uuid {
        session_service::join_session(
            state,
            JoinSessionRequest {
                join_code: runtime.join_code().to_string(),
                display_name: Some(name.into()),
            },
        )
        .await
        .unwrap()
        .player
        .id
    }

    async fn wait_for_phase(runtime: &SessionRuntime, expected: SessionPhase) {
        for _ in 0..100 {
            if runtime.phase().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {expected:?}");
    }

    #[tokio::test]
    async fn start_is_blocked_without_players() {
        let (state, runtime) = launched(SessionSettingsInput::default()).await;
        let err = run_command(&state, &runtime, HostCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(runtime.phase().await, SessionPhase::Lobby);
    }

    #[tokio::test]
    async fn repeated_reveal_is_reported_not_failed() {
        let (state, runtime) = launched(SessionSettingsInput::default()).await;
        join(&state, &runtime, "Ada").await;
        run_command(&state, &runtime, HostCommand::Start).await.unwrap();

        let reveal = HostCommand::Reveal {
            question_index: Some(0),
        };
        let first = run_command(&state, &runtime, reveal).await.unwrap();
        let second = run_command(&state, &runtime, reveal).await.unwrap();
        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(first.session, second.session);
    }

    #[tokio::test]
    async fn preview_elapses_into_answering() {
        let settings = SessionSettingsInput {
            timer_enabled: true,
            timer_duration_seconds: Some(30),
            ..SessionSettingsInput::default()
        };
        let (state, runtime) = launched(settings).await;
        join(&state, &runtime, "Ada").await;
        let response = run_command(&state, &runtime, HostCommand::Start).await.unwrap();
        assert_eq!(response.session.question_step, Some(QuestionStep::Preview));
        assert!(response.session.question_started_at.is_none());

        wait_for_phase(
            &runtime,
            SessionPhase::Active(ActivePhase::Question {
                index: 0,
                step: QuestionStep::Answering,
            }),
        )
        .await;
        assert!(runtime.read(|s, _| s.question_started_at).await.is_some());
        // The deadline is armed right after the transition lands.
        for _ in 0..100 {
            if runtime.timers().is_armed(TimerKind::Deadline) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(runtime.timers().is_armed(TimerKind::Deadline));

        run_command(
            &state,
            &runtime,
            HostCommand::Reveal {
                question_index: None,
            },
        )
        .await
        .unwrap();
        assert!(!runtime.timers().is_armed(TimerKind::Deadline));
    }

    #[tokio::test]
    async fn close_retires_the_session_and_tells_connections() {
        let (state, runtime) = launched(SessionSettingsInput::default()).await;
        let player_id = join(&state, &runtime, "Ada").await;
        let (_, mut direct) = runtime.attach_connection(player_id);
        let mut bus = runtime.subscribe();

        let response = run_command(&state, &runtime, HostCommand::Close).await.unwrap();
        assert!(response.applied);
        assert_eq!(response.session.status, SessionStatus::Closed);
        assert!(state.live_session(runtime.id()).is_none());
        assert!(state.session_by_code(runtime.join_code()).is_err());

        assert_eq!(
            direct.recv().await,
            Some(DirectMessage::SessionClosed {
                session_id: runtime.id()
            })
        );
        assert!(matches!(
            bus.recv().await.unwrap(),
            Notification::SessionUpdated(_)
        ));
        assert_eq!(
            bus.recv().await.unwrap(),
            Notification::SessionClosed {
                session_id: runtime.id()
            }
        );

        let again = run_command(&state, &runtime, HostCommand::Close).await.unwrap();
        assert!(!again.applied);
        assert!(matches!(
            run_command(&state, &runtime, HostCommand::Start).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(runtime.phase().await, SessionPhase::Closed);
    }

    #[tokio::test]
    async fn kick_deletes_the_record_and_sends_a_direct_message() {
        let (state, runtime) = launched(SessionSettingsInput::default()).await;
        let player_id = join(&state, &runtime, "Ada").await;
        let (_, mut direct) = runtime.attach_connection(player_id);

        let response = kick_player(&state, &runtime, player_id).await.unwrap();
        assert!(response.notified_directly);
        assert_eq!(direct.recv().await, Some(DirectMessage::Kicked { player_id }));

        let store = state.require_session_store().await.unwrap();
        assert!(store.list_players(runtime.id()).await.unwrap().is_empty());
        assert!(matches!(
            kick_player(&state, &runtime, player_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_keeps_the_phase() {
        let memory = MemorySessionStore::new();
        let state = AppState::new(AppConfig::default());
        state.install_session_store(Arc::new(memory.clone())).await;
        let response = session_service::launch_session(
            &state,
            LaunchSessionRequest {
                host_id: "host".into(),
                quiz: QuizInput {
                    title: "Quiz".into(),
                    questions: vec![QuestionInput {
                        prompt: "Q".into(),
                        options: vec!["a".into(), "b".into()],
                        correct_index: 1,
                        explanation: None,
                    }],
                },
                settings: SessionSettingsInput::default(),
            },
        )
        .await
        .unwrap();
        let runtime = state.session(response.session.session.id).unwrap();
        join(&state, &runtime, "Ada").await;

        memory.set_offline(true);
        let err = run_command(&state, &runtime, HostCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(runtime.phase().await, SessionPhase::Lobby);
    }
}
