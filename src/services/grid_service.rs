//! Grid commands of jeopardy sessions: opening, scoring and skipping cells, and manual
//! team awards.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    dto::{
        grid::{GridActionResponse, GridSnapshot},
        notification::Notification,
    },
    error::ServiceError,
    services::host_service,
    state::{
        Mutation, PendingWrite, SessionRuntime, SharedState,
        commands::SystemEvent,
        grid::{CellResolution, GridBoard},
        session::QuizSnapshot,
        state_machine::{ActivePhase, SessionPhase},
    },
};

/// Show a cell to the room.
pub async fn open_cell(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    index: usize,
) -> Result<GridActionResponse, ServiceError> {
    mutate_board(state, runtime, move |board, _| {
        board.open(index)?;
        Ok(None)
    })
    .await
}

/// Score a cell for the team in turn from the option the host recorded.
pub async fn resolve_cell(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    index: usize,
    option_index: usize,
) -> Result<GridActionResponse, ServiceError> {
    mutate_board(state, runtime, move |board, quiz| {
        let correct = quiz
            .questions
            .get(index)
            .is_some_and(|question| question.correct_index == option_index);
        Ok(Some(board.resolve(index, correct)?))
    })
    .await
}

/// Complete a cell without scoring it.
pub async fn complete_cell(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    index: usize,
) -> Result<GridActionResponse, ServiceError> {
    mutate_board(state, runtime, move |board, _| {
        board.complete(index)?;
        Ok(None)
    })
    .await
}

/// Add (or remove) points for one team.
pub async fn award_points(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    team_index: usize,
    points: i64,
) -> Result<GridActionResponse, ServiceError> {
    mutate_board(state, runtime, move |board, _| {
        let score = board.award_points(team_index, points)?;
        info!(team_index, points, score, "manual team award");
        Ok(None)
    })
    .await
}

async fn mutate_board<F>(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    action: F,
) -> Result<GridActionResponse, ServiceError>
where
    F: FnOnce(&mut GridBoard, &QuizSnapshot) -> Result<Option<CellResolution>, ServiceError>,
{
    let store = state.require_session_store().await?;

    let (grid, resolution, complete) = runtime
        .write(&store, move |draft, machine| {
            if machine.phase != SessionPhase::Active(ActivePhase::Board) {
                return Err(ServiceError::InvalidState(format!(
                    "grid commands need a running board, session is in {:?}",
                    machine.phase
                )));
            }
            let quiz = draft.quiz.clone();
            let board = draft
                .grid
                .as_mut()
                .ok_or_else(|| ServiceError::InvalidState("session has no grid".into()))?;

            let resolution = action(&mut *board, quiz.as_ref())?;
            let snapshot = GridSnapshot::build(board, &quiz);
            let complete = board.is_complete();

            Ok(
                Mutation::new(
                    (snapshot.clone(), resolution, complete),
                    PendingWrite::Session,
                )
                .notify(Notification::GridUpdated(snapshot)),
            )
        })
        .await?;

    let finished = if complete {
        finish_board(state, runtime).await
    } else {
        false
    };

    Ok(GridActionResponse {
        grid,
        resolution: resolution.map(Into::into),
        finished,
    })
}

async fn finish_board(state: &SharedState, runtime: &Arc<SessionRuntime>) -> bool {
    match host_service::apply_system_event(state, runtime, SystemEvent::BoardCompleted).await {
        Ok(outcome) => outcome.phase() == SessionPhase::Finished,
        Err(err) => {
            warn!(
                session_id = %runtime.id(),
                error = %err,
                "failed to finish a completed board"
            );
            false
        }
    }
}
