use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::dto::session::SessionSnapshot;

/// Optional question targeted by `reveal` and `next`.
///
/// Sending it makes a retried command harmless: once the session moved past that
/// question the retry is reported as already applied.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StepQuery {
    /// Question the command is meant for; defaults to the current one.
    pub question_index: Option<usize>,
}

/// Response to every lifecycle command.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    /// `false` when the session already was in the requested state.
    pub applied: bool,
    pub session: SessionSnapshot,
}

/// Response to a kick.
#[derive(Debug, Serialize, ToSchema)]
pub struct KickResponse {
    pub player_id: Uuid,
    /// Whether the player had a live connection that was told directly.
    pub notified_directly: bool,
}
