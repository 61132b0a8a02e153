//! Timers driving the system transitions of timed questions.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{sync::oneshot, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    services::host_service,
    state::{
        SessionRuntime, SharedState,
        commands::SystemEvent,
        state_machine::{ActivePhase, QuestionStep, SessionPhase},
        timers::TimerKind,
    },
};

/// Arm or cancel the timers matching the phase the session is in now.
///
/// A timer firing after its phase was left is harmless: the event names its question and
/// the state machine reports it as already applied.
pub async fn schedule(state: &SharedState, runtime: &Arc<SessionRuntime>) {
    let (phase, deadline) = runtime
        .read(|session, phase| (phase, session.answering_deadline()))
        .await;
    let timers = runtime.timers();

    match phase {
        SessionPhase::Active(ActivePhase::Question {
            index,
            step: QuestionStep::Preview,
        }) => {
            timers.cancel(TimerKind::Deadline);
            arm(
                state,
                runtime,
                TimerKind::Preview,
                state.config().preview_delay,
                SystemEvent::PreviewElapsed { index },
            );
        }
        SessionPhase::Active(ActivePhase::Question {
            index,
            step: QuestionStep::Answering,
        }) => {
            timers.cancel(TimerKind::Preview);
            match deadline {
                Some(deadline) => {
                    // Measured against the absolute deadline so a late schedule never extends it.
                    let delay = deadline
                        .duration_since(SystemTime::now())
                        .unwrap_or(Duration::ZERO);
                    arm(
                        state,
                        runtime,
                        TimerKind::Deadline,
                        delay,
                        SystemEvent::DeadlineReached { index },
                    );
                }
                None => timers.cancel(TimerKind::Deadline),
            }
        }
        _ => timers.cancel_all(),
    }
}

fn arm(
    state: &SharedState,
    runtime: &Arc<SessionRuntime>,
    kind: TimerKind,
    delay: Duration,
    event: SystemEvent,
) {
    let id = Uuid::new_v4();
    let (armed_tx, armed_rx) = oneshot::channel::<()>();
    let task_state = state.clone();
    let task_runtime = runtime.clone();

    let handle = tokio::spawn(async move {
        // Wait until the slot holds this timer, otherwise a zero delay could fire unregistered.
        if armed_rx.await.is_err() {
            return;
        }
        sleep(delay).await;
        if !task_runtime.timers().release(kind, id) {
            return;
        }

        debug!(session_id = %task_runtime.id(), ?event, "phase timer fired");
        if let Err(err) =
            host_service::apply_system_event(&task_state, &task_runtime, event).await
        {
            warn!(
                session_id = %task_runtime.id(),
                ?event,
                error = %err,
                "timer-driven transition failed"
            );
        }
    });

    runtime.timers().arm(kind, id, handle.abort_handle());
    let _ = armed_tx.send(());
}
