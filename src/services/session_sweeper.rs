use std::time::{Duration, Instant};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{services::host_service, state::SharedState};

/// Periodically close sessions whose host has been inactive for longer than the configured
/// timeout. Returns immediately when the timeout is disabled.
pub async fn run(state: SharedState) {
    let Some(limit) = state.host_idle_timeout() else {
        info!("host idle timeout disabled; abandoned sessions are kept");
        return;
    };

    let mut ticker = interval(state.config().idle_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let closed = sweep(&state, Instant::now(), limit).await;
        if closed > 0 {
            debug!(closed, "abandoned session sweep finished");
        }
    }
}

/// Close every live session whose host was last seen more than `limit` before `now`.
///
/// Failed closes are logged and retried on the next sweep.
pub async fn sweep(state: &SharedState, now: Instant, limit: Duration) -> usize {
    let mut closed = 0;
    for runtime in state.live_sessions() {
        if !runtime.host_idle(now, limit) {
            continue;
        }
        match host_service::close_abandoned(state, &runtime).await {
            Ok(outcome) if outcome.applied() => {
                closed += 1;
                info!(session_id = %runtime.id(), "closed session abandoned by its host");
            }
            Ok(_) => {}
            Err(err) => warn!(
                session_id = %runtime.id(),
                error = %err,
                "failed to close abandoned session"
            ),
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::{MemorySessionStore, SessionStore},
        dto::{
            notification::Notification,
            session::{LaunchSessionRequest, QuestionInput, QuizInput, SessionSettingsInput},
        },
        services::session_service,
        state::{AppState, SessionRuntime, state_machine::SessionStatus},
    };

    const LIMIT: Duration = Duration::from_secs(60);

    async fn launched(memory: &MemorySessionStore) -> (SharedState, Arc<SessionRuntime>) {
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
                        correct_index: 0,
                        explanation: None,
                    }],
                },
                settings: SessionSettingsInput::default(),
            },
        )
        .await
        .unwrap();
        let runtime = state.session(response.session.session.id).unwrap();
        (state, runtime)
    }

    #[tokio::test]
    async fn idle_sessions_are_closed_and_release_their_code() {
        let memory = MemorySessionStore::new();
        let (state, runtime) = launched(&memory).await;
        let mut bus = runtime.subscribe();
        let code = runtime.join_code().to_string();

        assert_eq!(sweep(&state, Instant::now(), LIMIT).await, 0);
        assert!(state.live_session(runtime.id()).is_some());

        let later = Instant::now() + LIMIT + Duration::from_secs(1);
        assert_eq!(sweep(&state, later, LIMIT).await, 1);

        assert!(state.live_session(runtime.id()).is_none());
        assert!(state.session_by_code(&code).is_err());
        assert!(state.reserve_join_code(&code, uuid::Uuid::new_v4()));

        let stored = memory.find_session(runtime.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Closed);
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
    }

    #[tokio::test]
    async fn host_requests_and_streams_keep_a_session_alive() {
        let memory = MemorySessionStore::new();
        let (state, runtime) = launched(&memory).await;
        let later = Instant::now() + LIMIT + Duration::from_secs(1);

        let presence = runtime.host_presence();
        assert_eq!(sweep(&state, later, LIMIT).await, 0);
        drop(presence);

        host_service::authorize(&state, runtime.id(), runtime.host_token()).unwrap();
        assert_eq!(sweep(&state, Instant::now() + LIMIT / 2, LIMIT).await, 0);
        assert!(state.live_session(runtime.id()).is_some());
    }

    #[tokio::test]
    async fn degraded_storage_defers_the_close() {
        let memory = MemorySessionStore::new();
        let (state, runtime) = launched(&memory).await;
        let later = Instant::now() + LIMIT + Duration::from_secs(1);

        memory.set_offline(true);
        assert_eq!(sweep(&state, later, LIMIT).await, 0);
        assert!(state.live_session(runtime.id()).is_some());

        memory.set_offline(false);
        assert_eq!(sweep(&state, later, LIMIT).await, 1);
    }
}
