//! Commands players send about their own record: answers and departures.

use std::{sync::Arc, time::SystemTime};

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        notification::Notification,
        player::{AnswerResponse, SubmitAnswerRequest},
        session::PlayerSummary,
    },
    error::ServiceError,
    scoring::compute_award,
    services::host_service,
    state::{
        Mutation, PendingWrite, SessionRuntime, SharedState,
        commands::PlayerCommand,
        session::AnswerRecord,
    },
};

/// What a player command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerOutcome {
    /// The answer was recorded, or had already been recorded identically.
    Answered(AnswerResponse),
    /// The player left the session.
    Left,
}

/// Record an answer for a player of a live session.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    player_id: Uuid,
    request: SubmitAnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    let runtime = state.session(session_id)?;
    let command = PlayerCommand::Answer {
        question_index: request.question_index,
        option_index: request.option_index,
        confidence: request.confidence,
    };
    match execute(state, &runtime, player_id, command).await? {
        PlayerOutcome::Answered(response) => Ok(response),
        PlayerOutcome::Left => Err(ServiceError::InvalidState(
            "answer command produced no answer".into(),
        )),
    }
}

/// Remove a player at their own request.
pub async fn leave_session(
    state: &SharedState,
    session_id: Uuid,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    let runtime = state.session(session_id)?;
    execute(state, &runtime, player_id, PlayerCommand::Leave).await?;
    Ok(())
}

/// Run a player command against a live session.
pub async fn execute(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    player_id: Uuid,
    command: PlayerCommand,
) -> Result<PlayerOutcome, ServiceError> {
    match command {
        PlayerCommand::Answer {
            question_index,
            option_index,
            confidence,
        } => {
            let store = state.require_session_store().await?;
            let table = state.config().confidence;

            let (response, reveal) = runtime
                .write(&store, move |draft, machine| {
                    if !machine.phase.accepts_answer_for(question_index) {
                        return Err(ServiceError::InvalidState(format!(
                            "question {question_index} is not accepting answers"
                        )));
                    }
                    let question = draft.question(question_index).cloned().ok_or_else(|| {
                        ServiceError::NotFound(format!("question {question_index} does not exist"))
                    })?;
                    let rules = draft.config.scoring_rules(table);
                    let now = SystemTime::now();
                    let elapsed_ms = if draft.config.is_timed() {
                        draft.elapsed_ms(now)
                    } else {
                        None
                    };
                    let window_ms = draft
                        .config
                        .timer_duration()
                        .map(|window| i64::try_from(window.as_millis()).unwrap_or(i64::MAX));
                    if let (Some(elapsed), Some(window_ms)) = (elapsed_ms, window_ms) {
                        if elapsed > window_ms {
                            return Err(ServiceError::InvalidState(format!(
                                "answering window of question {question_index} has closed"
                            )));
                        }
                    }

                    let player = draft.players.get_mut(&player_id).ok_or_else(|| {
                        ServiceError::NotFound(format!("player `{player_id}` not found"))
                    })?;

                    if let Some(existing) = player.answer(question_index) {
                        if existing.option_index != option_index {
                            return Err(ServiceError::InvalidState(format!(
                                "question {question_index} was already answered"
                            )));
                        }
                        let response = AnswerResponse {
                            question_index,
                            option_index,
                            award: existing.award,
                            score: player.score,
                            duplicate: true,
                        };
                        return Ok(Mutation::unchanged((response, None)));
                    }

                    let confidence = rules.wager.map(|_| confidence.unwrap_or_default());
                    let award =
                        compute_award(&question, option_index, &rules, elapsed_ms, confidence);
                    player.record_answer(
                        question_index,
                        AnswerRecord {
                            option_index,
                            confidence,
                            award,
                            answered_at: now,
                        },
                    );
                    let response = AnswerResponse {
                        question_index,
                        option_index,
                        award,
                        score: player.score,
                        duplicate: false,
                    };
                    let summary = PlayerSummary::from(&*player);
                    let reveal = host_service::auto_reveal_candidate(draft, machine.phase);

                    Ok(
                        Mutation::new((response, reveal), PendingWrite::Player(player_id))
                            .notify(Notification::PlayerUpdated(summary)),
                    )
                })
                .await?;

            if let Some(index) = reveal {
                host_service::reveal_if_all_answered(state, runtime, index).await;
            }
            Ok(PlayerOutcome::Answered(response))
        }
        PlayerCommand::Leave => {
            remove_player(state, runtime, player_id).await?;
            info!(session_id = %runtime.id(), player_id = %player_id, "player left");
            Ok(PlayerOutcome::Left)
        }
    }
}

/// Delete a player record and tell subscribers.
///
/// Removing the last player who had not answered may complete the question.
pub(crate) async fn remove_player(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let reveal = runtime
        .write(&store, move |draft, machine| {
            if draft.players.shift_remove(&player_id).is_none() {
                return Err(ServiceError::NotFound(format!(
                    "player `{player_id}` not found"
                )));
            }
            let reveal = host_service::auto_reveal_candidate(draft, machine.phase);
            Ok(
                Mutation::new(reveal, PendingWrite::DeletePlayer(player_id))
                    .notify(Notification::PlayerRemoved { player_id }),
            )
        })
        .await?;

    if let Some(index) = reveal {
        host_service::reveal_if_all_answered(state, runtime, index).await;
    }
    Ok(())
}
