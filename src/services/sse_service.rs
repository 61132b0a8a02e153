use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::notification::{Notification, ServerEvent},
    error::ServiceError,
    state::{HostPresence, SharedState},
};

/// Name of the first event of every session stream.
pub const SNAPSHOT_EVENT: &str = "session.snapshot";

/// Subscribe to a live session and capture its current view.
///
/// The subscription is taken before the view is read so no change between the two is
/// lost; the follower's version guard discards the overlap.
pub async fn subscribe_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(ServerEvent, broadcast::Receiver<Notification>), ServiceError> {
    let runtime = state.session(session_id)?;
    let receiver = runtime.subscribe();
    let view = runtime.view().await;
    let snapshot = ServerEvent::json(SNAPSHOT_EVENT.to_string(), &view)
        .map_err(|err| ServiceError::InvalidState(format!("unencodable session view: {err}")))?;
    Ok((snapshot, receiver))
}

/// Presence guard for a stream opened with the session's host token.
///
/// Any other token is ignored; spectators may watch without one.
pub fn host_presence(
    state: &SharedState,
    session_id: Uuid,
    token: Option<&str>,
) -> Option<HostPresence> {
    let runtime = state.live_session(session_id)?;
    token
        .filter(|token| runtime.verify_host_token(token))
        .map(|_| runtime.host_presence())
}

/// Forward the snapshot and every later notification into a channel until the client
/// goes away or the session closes.
///
/// A host presence guard is held for as long as the stream lives.
pub fn spawn_forwarder(
    session_id: Uuid,
    snapshot: ServerEvent,
    mut receiver: broadcast::Receiver<Notification>,
    presence: Option<HostPresence>,
) -> mpsc::Receiver<ServerEvent> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<ServerEvent>(8);

    tokio::spawn(async move {
        if tx.send(snapshot).await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(notification) => {
                            let closing = matches!(notification, Notification::SessionClosed { .. });
                            match notification.to_server_event() {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(err) => warn!(error = %err, "failed to encode notification"),
                            }
                            if closing {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Lost deltas are recovered from the next snapshot carried by the bus.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        drop(presence);
        info!(session_id = %session_id, "session SSE stream disconnected");
    });

    rx
}

/// Wrap forwarded events into an SSE response with keep-alive comments.
pub fn to_sse_stream(
    mut events: mpsc::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        while let Some(payload) = events.recv().await {
            let mut event = Event::default().data(payload.data);
            if let Some(name) = payload.event {
                event = event.event(name);
            }
            yield Ok(event);
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::MemorySessionStore,
        dto::session::{
            JoinSessionRequest, LaunchSessionRequest, QuestionInput, QuizInput,
            SessionSettingsInput,
        },
        services::{host_service, session_service},
        state::{AppState, commands::HostCommand},
    };

    async fn launched() -> (SharedState, Uuid) {
        let state = AppState::new(AppConfig::default());
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
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
        (state, response.session.session.id)
    }

    #[tokio::test]
    async fn unknown_sessions_have_no_stream() {
        let state = AppState::new(AppConfig::default());
        let err = subscribe_session(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_the_host_token_marks_the_host_present() {
        let (state, session_id) = launched().await;
        let runtime = state.session(session_id).unwrap();
        let later = std::time::Instant::now() + Duration::from_secs(3600);

        assert!(host_presence(&state, session_id, None).is_none());
        assert!(host_presence(&state, session_id, Some("wrong")).is_none());

        let presence = host_presence(&state, session_id, Some(runtime.host_token()));
        assert!(presence.is_some());
        let (snapshot, receiver) = subscribe_session(&state, session_id).await.unwrap();
        let mut events = spawn_forwarder(session_id, snapshot, receiver, presence);
        events.recv().await.unwrap();
        assert!(!runtime.host_idle(later, Duration::from_secs(60)));

        drop(events);
        for _ in 0..100 {
            if runtime.host_idle(later, Duration::from_secs(60)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("host presence outlived its stream");
    }

    #[tokio::test]
    async fn stream_starts_with_a_snapshot_and_ends_on_close() {
        let (state, session_id) = launched().await;
        let (snapshot, receiver) = subscribe_session(&state, session_id).await.unwrap();
        let mut events = spawn_forwarder(session_id, snapshot, receiver, None);

        let first = events.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(SNAPSHOT_EVENT));
        assert!(first.data.contains(&session_id.to_string()));

        let runtime = state.session(session_id).unwrap();
        session_service::join_session(
            &state,
            JoinSessionRequest {
                join_code: runtime.join_code().to_string(),
                display_name: Some("Ada".into()),
            },
        )
        .await
        .unwrap();
        let joined = events.recv().await.unwrap();
        assert_eq!(joined.event.as_deref(), Some("player.joined"));

        host_service::run_command(&state, &runtime, HostCommand::Close)
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(event) = events.recv().await {
            names.extend(event.event);
        }
        assert_eq!(names.last().map(String::as_str), Some("session.closed"));
    }
}
