use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::{
        notification::{DirectMessage, Notification},
        player::AnswerResponse,
        session::SessionView,
    },
    scoring::Confidence,
    state::commands::PlayerCommand,
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerInboundMessage {
    Answer {
        question_index: usize,
        option_index: usize,
        #[serde(default)]
        confidence: Option<Confidence>,
    },
    Leave,
    #[serde(other)]
    Unknown,
}

impl PlayerInboundMessage {
    /// Parse a text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Command carried by the message, if it is one.
    pub fn into_command(self) -> Option<PlayerCommand> {
        match self {
            Self::Answer {
                question_index,
                option_index,
                confidence,
            } => Some(PlayerCommand::Answer {
                question_index,
                option_index,
                confidence,
            }),
            Self::Leave => Some(PlayerCommand::Leave),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Serialize)]
/// Messages pushed to player WebSocket clients.
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerOutboundMessage {
    /// First frame: the view the device seeds its projection from.
    Welcome { view: Box<SessionView> },
    /// A bus notification that changed the device's projection.
    Notification { notification: Notification },
    /// A message addressed to this device only.
    Direct { message: DirectMessage },
    /// An answer sent over the socket was accepted.
    AnswerAccepted { answer: AnswerResponse },
    /// A command sent over the socket was refused.
    Rejected { reason: String },
}
