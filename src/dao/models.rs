use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::{
    scoring::Confidence,
    state::{
        grid::GridBoard,
        session::{QuizSnapshot, SessionConfig},
        state_machine::{QuestionStep, SessionStatus},
    },
};

/// Persisted session document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Primary key.
    pub id: Uuid,
    /// Six digit join code.
    pub join_code: String,
    /// Opaque host identifier.
    pub host_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current question, `-1` before the first one and in grid play.
    pub current_question_index: i64,
    /// Step of the current question.
    pub question_step: Option<QuestionStep>,
    /// Absolute start of the current answering window.
    pub question_started_at: Option<SystemTime>,
    /// Quiz content frozen at launch.
    pub quiz: QuizSnapshot,
    /// Launch options.
    pub config: SessionConfig,
    /// Grid state for jeopardy sessions.
    pub grid: Option<GridBoard>,
    /// Version of the last applied transition.
    pub version: u64,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
}

/// One answer stored on a player document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntry {
    /// Question answered.
    pub question_index: usize,
    /// Option chosen.
    pub option_index: usize,
    /// Declared confidence in wager mode.
    pub confidence: Option<Confidence>,
    /// Points awarded.
    pub award: i64,
    /// Acceptance time.
    pub answered_at: SystemTime,
}

/// Persisted player document, one per participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Primary key.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Running score.
    pub score: i64,
    /// Answer log in question order.
    pub answers: Vec<AnswerEntry>,
    /// Join time.
    pub joined_at: SystemTime,
}
