//! Messages fanned out to session subscribers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{
    grid::GridSnapshot,
    session::{PlayerSummary, SessionSnapshot},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// JSON body.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Change notification published on a session bus.
///
/// Delivery is at least once and unordered across variants; consumers guard with the
/// version carried by snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    /// The shared session record changed.
    SessionUpdated(SessionSnapshot),
    /// A player entered the lobby.
    PlayerJoined(PlayerSummary),
    /// A player's score or answers changed.
    PlayerUpdated(PlayerSummary),
    /// A player left or was removed.
    PlayerRemoved {
        /// Removed player.
        player_id: Uuid,
    },
    /// The grid changed.
    GridUpdated(GridSnapshot),
    /// The session was closed by its host.
    SessionClosed {
        /// Closed session.
        session_id: Uuid,
    },
}

impl Notification {
    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::SessionUpdated(_) => "session.updated",
            Notification::PlayerJoined(_) => "player.joined",
            Notification::PlayerUpdated(_) => "player.updated",
            Notification::PlayerRemoved { .. } => "player.removed",
            Notification::GridUpdated(_) => "grid.updated",
            Notification::SessionClosed { .. } => "session.closed",
        }
    }

    /// Encode as an SSE event.
    pub fn to_server_event(&self) -> serde_json::Result<ServerEvent> {
        ServerEvent::json(self.event_name().to_string(), self)
    }
}

/// Ephemeral message addressed to one connected device.
///
/// Sent alongside the durable change so the device reacts without waiting for the
/// shared notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectMessage {
    /// The host removed this player.
    Kicked {
        /// Removed player.
        player_id: Uuid,
    },
    /// The host closed the session.
    SessionClosed {
        /// Closed session.
        session_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_are_adjacently_tagged() {
        let player_id = Uuid::new_v4();
        let notification = Notification::PlayerRemoved { player_id };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "player_removed");
        assert_eq!(json["payload"]["player_id"], player_id.to_string());
        assert_eq!(notification.event_name(), "player.removed");

        let event = notification.to_server_event().unwrap();
        assert_eq!(event.event.as_deref(), Some("player.removed"));
    }

    #[test]
    fn direct_messages_are_internally_tagged() {
        let session_id = Uuid::new_v4();
        let json = serde_json::to_string(&DirectMessage::SessionClosed { session_id }).unwrap();
        let back: DirectMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DirectMessage::SessionClosed { session_id });
        assert!(json.contains("\"type\":\"session_closed\""));
    }
}
