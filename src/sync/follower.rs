use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tracing::debug;

use crate::{
    dto::notification::{DirectMessage, Notification},
    sync::projection::{ApplyOutcome, ProjectionStatus, SessionProjection},
};

/// Message that changed the follower's projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowerUpdate {
    /// A bus notification.
    Notification(Notification),
    /// A message addressed to this device.
    Direct(DirectMessage),
}

/// Actor folding the session bus and the direct channel into one projection.
///
/// Only updates that change the projection are forwarded. The actor stops once the
/// projection turns terminal, when the bus closes, or when nobody reads its updates.
pub struct SessionFollower {
    projection: SessionProjection,
    notifications: broadcast::Receiver<Notification>,
    direct: mpsc::UnboundedReceiver<DirectMessage>,
    view: watch::Sender<SessionProjection>,
    updates: mpsc::UnboundedSender<FollowerUpdate>,
}

impl SessionFollower {
    /// Build a follower from a seeded projection and receivers subscribed before seeding.
    pub fn new(
        projection: SessionProjection,
        notifications: broadcast::Receiver<Notification>,
        direct: mpsc::UnboundedReceiver<DirectMessage>,
    ) -> (
        Self,
        watch::Receiver<SessionProjection>,
        mpsc::UnboundedReceiver<FollowerUpdate>,
    ) {
        let (view, view_rx) = watch::channel(projection.clone());
        let (updates, updates_rx) = mpsc::unbounded_channel();
        (
            Self {
                projection,
                notifications,
                direct,
                view,
                updates,
            },
            view_rx,
            updates_rx,
        )
    }

    /// Run until the projection is terminal or the channels close, returning the final status.
    pub async fn run(mut self) -> ProjectionStatus {
        let mut direct_open = true;

        while !self.projection.is_terminal() {
            let update = tokio::select! {
                biased;
                _ = self.updates.closed() => break,
                message = self.direct.recv(), if direct_open => match message {
                    Some(message) => match self.projection.apply_direct(&message) {
                        ApplyOutcome::Applied => FollowerUpdate::Direct(message),
                        ApplyOutcome::Stale | ApplyOutcome::Ignored => continue,
                    },
                    None => {
                        direct_open = false;
                        continue;
                    }
                },
                received = self.notifications.recv() => match received {
                    Ok(notification) => match self.projection.apply(&notification) {
                        ApplyOutcome::Applied => FollowerUpdate::Notification(notification),
                        ApplyOutcome::Stale | ApplyOutcome::Ignored => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        // Skip lagged messages; the next snapshot supersedes them.
                        debug!(skipped, "session follower lagged behind the bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            self.view.send_replace(self.projection.clone());
            if self.updates.send(update).is_err() {
                break;
            }
        }

        self.projection.status()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        dto::session::{PlayerSummary, SessionSnapshot, SessionView},
        state::{
            session::{GameMode, SessionConfig},
            state_machine::SessionStatus,
        },
    };

    fn seeded(session_id: Uuid, player_id: Uuid) -> SessionProjection {
        let mut projection = SessionProjection::for_player(player_id);
        projection.seed(SessionView {
            session: SessionSnapshot {
                id: session_id,
                join_code: "123456".into(),
                status: SessionStatus::Lobby,
                game_mode: GameMode::Live,
                current_question_index: -1,
                question_step: None,
                question_count: 1,
                question_started_at: None,
                timer_duration: None,
                question: None,
                player_count: 1,
                version: 0,
            },
            quiz_title: "Quiz".into(),
            config: SessionConfig::default(),
            players: vec![PlayerSummary {
                id: player_id,
                display_name: "Ada".into(),
                score: 0,
                answered_questions: Vec::new(),
            }],
            grid: None,
            questions: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".into(),
        });
        projection
    }

    #[tokio::test]
    async fn direct_kick_stops_the_follower() {
        let session_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let (bus, _) = broadcast::channel(8);
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (follower, view, mut updates) =
            SessionFollower::new(seeded(session_id, player_id), bus.subscribe(), direct_rx);
        let task = tokio::spawn(follower.run());

        direct_tx
            .send(DirectMessage::Kicked { player_id })
            .unwrap();

        assert_eq!(task.await.unwrap(), ProjectionStatus::Removed);
        assert_eq!(
            updates.recv().await,
            Some(FollowerUpdate::Direct(DirectMessage::Kicked { player_id }))
        );
        assert_eq!(view.borrow().status(), ProjectionStatus::Removed);
    }

    #[tokio::test]
    async fn stale_notifications_are_not_forwarded() {
        let session_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (bus, _) = broadcast::channel(8);
        let (_direct_tx, direct_rx) = mpsc::unbounded_channel();
        let (follower, _view, mut updates) =
            SessionFollower::new(seeded(session_id, player_id), bus.subscribe(), direct_rx);
        let task = tokio::spawn(follower.run());

        let joined = Notification::PlayerJoined(PlayerSummary {
            id: other,
            display_name: "Grace".into(),
            score: 0,
            answered_questions: Vec::new(),
        });
        bus.send(joined.clone()).unwrap();
        bus.send(joined.clone()).unwrap();
        bus.send(Notification::SessionClosed { session_id }).unwrap();

        assert_eq!(task.await.unwrap(), ProjectionStatus::Closed);
        assert_eq!(
            updates.recv().await,
            Some(FollowerUpdate::Notification(joined))
        );
        assert_eq!(
            updates.recv().await,
            Some(FollowerUpdate::Notification(Notification::SessionClosed {
                session_id
            }))
        );
        assert_eq!(updates.recv().await, None);
    }
}
