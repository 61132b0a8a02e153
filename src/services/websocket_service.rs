use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        notification::Notification,
        session::SessionView,
        ws::{PlayerInboundMessage, PlayerOutboundMessage},
    },
    error::ServiceError,
    services::player_service::{self, PlayerOutcome},
    state::{SessionRuntime, SharedState},
    sync::{
        follower::{FollowerUpdate, SessionFollower},
        projection::SessionProjection,
    },
};

/// The writer task is gone, so the socket is closed.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// A player connection validated before the upgrade.
pub struct PlayerSocket {
    runtime: Arc<SessionRuntime>,
    player_id: Uuid,
    view: SessionView,
    bus: broadcast::Receiver<Notification>,
}

/// Check that the player belongs to the session and capture the view the device starts from.
///
/// The bus is subscribed before the view is read so nothing published in between is lost.
pub async fn prepare_connection(
    state: &SharedState,
    session_id: Uuid,
    player_id: Uuid,
) -> Result<PlayerSocket, ServiceError> {
    let runtime = state.session(session_id)?;
    let bus = runtime.subscribe();
    let view = runtime.view().await;
    if !view.players.iter().any(|player| player.id == player_id) {
        return Err(ServiceError::NotFound(format!(
            "player `{player_id}` not found in session `{session_id}`"
        )));
    }
    Ok(PlayerSocket {
        runtime,
        player_id,
        view,
        bus,
    })
}

/// Handle the full lifecycle of one player WebSocket connection.
pub async fn handle_socket(state: SharedState, connection: PlayerSocket, socket: WebSocket) {
    let PlayerSocket {
        runtime,
        player_id,
        view,
        bus,
    } = connection;
    let session_id = runtime.id();

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (connection_id, direct) = runtime.attach_connection(player_id);
    info!(session_id = %session_id, player_id = %player_id, "player connected");

    let mut projection = SessionProjection::for_player(player_id);
    projection.seed(view.clone());
    let welcome = PlayerOutboundMessage::Welcome {
        view: Box::new(view),
    };
    if send_message_to_websocket(&outbound_tx, &welcome).is_err() {
        runtime.detach_connection(player_id, connection_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let (follower, _view_rx, mut updates) = SessionFollower::new(projection, bus, direct);
    let follower_task = tokio::spawn(follower.run());
    let forward_tx = outbound_tx.clone();
    let mut forward_task = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if send_message_to_websocket(&forward_tx, &outbound_for(update)).is_err() {
                return;
            }
        }
        // The follower only stops on its own once the player was removed or the session closed.
        if let Ok(status) = follower_task.await {
            debug!(?status, "session follower finished");
        }
        let _ = forward_tx.send(Message::Close(None));
    });

    loop {
        let message = tokio::select! {
            _ = &mut forward_task => break,
            message = receiver.next() => message,
        };
        let Some(message) = message else {
            break;
        };

        match message {
            Ok(Message::Text(text)) => {
                let command = match PlayerInboundMessage::from_json_str(&text) {
                    Ok(inbound) => inbound.into_command(),
                    Err(err) => {
                        warn!(player_id = %player_id, error = %err, "failed to parse player message");
                        let rejected = PlayerOutboundMessage::Rejected {
                            reason: format!("malformed message: {err}"),
                        };
                        if send_message_to_websocket(&outbound_tx, &rejected).is_err() {
                            break;
                        }
                        continue;
                    }
                };
                let Some(command) = command else {
                    debug!(player_id = %player_id, "ignoring unknown player message");
                    continue;
                };

                let reply = match player_service::execute(&state, &runtime, player_id, command).await
                {
                    Ok(PlayerOutcome::Answered(answer)) => {
                        PlayerOutboundMessage::AnswerAccepted { answer }
                    }
                    Ok(PlayerOutcome::Left) => break,
                    Err(err) => PlayerOutboundMessage::Rejected {
                        reason: err.to_string(),
                    },
                };
                if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    runtime.detach_connection(player_id, connection_id);
    forward_task.abort();
    info!(session_id = %session_id, player_id = %player_id, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

fn outbound_for(update: FollowerUpdate) -> PlayerOutboundMessage {
    match update {
        FollowerUpdate::Notification(notification) => {
            PlayerOutboundMessage::Notification { notification }
        }
        FollowerUpdate::Direct(message) => PlayerOutboundMessage::Direct { message },
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is an error.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
