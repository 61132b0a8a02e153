use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::scoring::Confidence;

/// Answer submitted by a player.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub question_index: usize,
    pub option_index: usize,
    /// Only read in wager sessions; defaults to `guess`.
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

/// Outcome of an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub question_index: usize,
    pub option_index: usize,
    /// Points awarded for this answer (may be negative).
    pub award: i64,
    /// Player score after the answer.
    pub score: i64,
    /// `true` when this exact answer had already been recorded.
    pub duplicate: bool,
}
