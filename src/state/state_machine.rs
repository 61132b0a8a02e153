use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Coarse lifecycle status persisted alongside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players may join; nothing is being played yet.
    Lobby,
    /// Questions (or the grid) are being played.
    Active,
    /// Final scores are shown; no further scoring happens.
    Finished,
    /// The host abandoned or closed the session. Terminal.
    Closed,
}

/// Sub-phase of a single question while the session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStep {
    /// The prompt is shown but answers are not accepted yet.
    Preview,
    /// Answers are accepted.
    Answering,
    /// The correct answer is visible; answers are refused.
    Revealed,
}

/// High-level phases a session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting room before the host starts.
    Lobby,
    /// Gameplay is running.
    Active(ActivePhase),
    /// Final scoreboard.
    Finished,
    /// Terminal state reached through an explicit close.
    Closed,
}

/// Fine-grained phase while the session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePhase {
    /// Sequential question play.
    Question {
        /// Zero-based index of the current question.
        index: usize,
        /// Step within the current question.
        step: QuestionStep,
    },
    /// Grid play: cells are opened in any unlocked order, no global question index.
    Board,
    /// Every player works through the questions at their own pace.
    SelfPaced,
}

impl SessionPhase {
    /// Persisted status derived from the phase.
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionPhase::Lobby => SessionStatus::Lobby,
            SessionPhase::Active(_) => SessionStatus::Active,
            SessionPhase::Finished => SessionStatus::Finished,
            SessionPhase::Closed => SessionStatus::Closed,
        }
    }

    /// Current question index, `-1` outside sequential question play.
    pub fn question_index(&self) -> i64 {
        match self {
            SessionPhase::Active(ActivePhase::Question { index, .. }) => {
                i64::try_from(*index).unwrap_or(i64::MAX)
            }
            _ => -1,
        }
    }

    /// Current question step, if any.
    pub fn step(&self) -> Option<QuestionStep> {
        match self {
            SessionPhase::Active(ActivePhase::Question { step, .. }) => Some(*step),
            _ => None,
        }
    }

    /// Rebuild a phase from its persisted fields.
    pub fn from_persisted(
        status: SessionStatus,
        question_index: i64,
        step: Option<QuestionStep>,
        layout: SessionLayout,
    ) -> Self {
        match status {
            SessionStatus::Lobby => SessionPhase::Lobby,
            SessionStatus::Finished => SessionPhase::Finished,
            SessionStatus::Closed => SessionPhase::Closed,
            SessionStatus::Active if layout.board => SessionPhase::Active(ActivePhase::Board),
            SessionStatus::Active if layout.self_paced => {
                SessionPhase::Active(ActivePhase::SelfPaced)
            }
            SessionStatus::Active => SessionPhase::Active(ActivePhase::Question {
                index: usize::try_from(question_index).unwrap_or_default(),
                step: step.unwrap_or(QuestionStep::Answering),
            }),
        }
    }

    /// Whether answers for `index` are accepted in this phase.
    ///
    /// Self-paced play accepts any index; the caller bounds it by the question count.
    pub fn accepts_answer_for(&self, index: usize) -> bool {
        match self {
            SessionPhase::Active(ActivePhase::Question {
                index: current,
                step: QuestionStep::Answering,
            }) => *current == index,
            SessionPhase::Active(ActivePhase::SelfPaced) => true,
            _ => false,
        }
    }
}

/// Why an answer was revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealReason {
    /// The host pressed reveal.
    Host,
    /// The answering deadline passed.
    TimerExpired,
    /// Every player in the roster answered.
    AllAnswered,
}

/// Why gameplay moved to the final scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Every grid cell has been completed.
    BoardCompleted,
    /// The host ended the session early.
    ManualStop,
}

/// Events that can be applied to the state machine.
///
/// Question-scoped events carry the index they were issued for, so a redelivered or
/// stale event is recognised instead of being applied to a later question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host leaves the lobby.
    Start,
    /// The preview delay of question `index` elapsed.
    PreviewElapsed {
        /// Question the delay was armed for.
        index: usize,
    },
    /// Reveal the answer of question `index`.
    Reveal {
        /// Question to reveal.
        index: usize,
        /// Trigger of the reveal.
        reason: RevealReason,
    },
    /// Move past question `from`.
    Advance {
        /// Question being left.
        from: usize,
    },
    /// Move to the final scoreboard.
    Finish(FinishReason),
    /// Close the session for good.
    Close,
}

/// Static shape of a session that drives its transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLayout {
    /// Number of questions in the quiz snapshot.
    pub question_count: usize,
    /// Whether questions go through a preview step before answering.
    pub timed: bool,
    /// Whether the session is played on a grid instead of sequentially.
    pub board: bool,
    /// Whether players answer at their own pace.
    pub self_paced: bool,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The event targets a state the machine already reached or moved past.
    AlreadyApplied(SessionPhase),
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: u64,
        /// Current version.
        actual: u64,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: SessionPhase,
    /// Phase the state machine will transition to.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: u64,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: SessionPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: u64,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<SessionPhase>,
}

enum Step {
    Move(SessionPhase),
    Unchanged,
}

/// Lifecycle state machine of a single session.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    layout: SessionLayout,
    phase: SessionPhase,
    version: u64,
    pending: Option<Plan>,
}

impl SessionStateMachine {
    /// Create a state machine in the lobby.
    pub fn new(layout: SessionLayout) -> Self {
        Self {
            layout,
            phase: SessionPhase::Lobby,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Version of the last applied transition.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Static layout the machine was built with.
    pub fn layout(&self) -> SessionLayout {
        self.layout
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: SessionEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = match self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?
        {
            Step::Move(next) => next,
            Step::Unchanged => return Err(PlanError::AlreadyApplied(self.phase)),
        };

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn first_question(&self) -> SessionPhase {
        if self.layout.question_count == 0 {
            return SessionPhase::Finished;
        }
        SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: self.entry_step(),
        })
    }

    fn entry_step(&self) -> QuestionStep {
        if self.layout.timed {
            QuestionStep::Preview
        } else {
            QuestionStep::Answering
        }
    }

    /// Compute a transition from an event if the transition is valid.
    ///
    /// Events aimed at a question the machine already moved past, or at a state it already
    /// reached, resolve to [`Step::Unchanged`] so redelivery is harmless.
    fn compute_transition(&self, event: SessionEvent) -> Result<Step, InvalidTransition> {
        use ActivePhase::Question;
        use QuestionStep::*;
        use SessionEvent as E;
        use SessionPhase as P;

        let invalid = || InvalidTransition {
            from: self.phase,
            event,
        };

        let step = match (self.phase, event) {
            (P::Lobby, E::Start) => {
                if self.layout.board {
                    Step::Move(P::Active(ActivePhase::Board))
                } else if self.layout.self_paced {
                    Step::Move(P::Active(ActivePhase::SelfPaced))
                } else {
                    Step::Move(self.first_question())
                }
            }
            (P::Active(_) | P::Finished, E::Start) => Step::Unchanged,

            (P::Active(Question { index, step: Preview }), E::PreviewElapsed { index: target })
                if target == index =>
            {
                Step::Move(P::Active(Question {
                    index,
                    step: Answering,
                }))
            }
            (P::Active(Question { index, step }), E::PreviewElapsed { index: target })
                if target < index || (target == index && step != Preview) =>
            {
                Step::Unchanged
            }

            (P::Active(Question { index, step: Answering }), E::Reveal { index: target, .. })
                if target == index =>
            {
                Step::Move(P::Active(Question {
                    index,
                    step: Revealed,
                }))
            }
            (P::Active(Question { index, step }), E::Reveal { index: target, .. })
                if target < index || (target == index && step == Revealed) =>
            {
                Step::Unchanged
            }

            (P::Active(Question { index, step: Revealed }), E::Advance { from })
                if from == index =>
            {
                let next = index + 1;
                if next >= self.layout.question_count {
                    Step::Move(P::Finished)
                } else {
                    Step::Move(P::Active(Question {
                        index: next,
                        step: self.entry_step(),
                    }))
                }
            }
            (P::Active(Question { index, .. }), E::Advance { from }) if from < index => {
                Step::Unchanged
            }

            (P::Finished, E::PreviewElapsed { .. } | E::Reveal { .. } | E::Advance { .. }) => {
                Step::Unchanged
            }

            (P::Active(_), E::Finish(_)) => Step::Move(P::Finished),
            (P::Finished, E::Finish(_)) => Step::Unchanged,

            (P::Lobby | P::Active(_) | P::Finished, E::Close) => Step::Move(P::Closed),
            (P::Closed, E::Close) => Step::Unchanged,

            _ => return Err(invalid()),
        };

        Ok(step)
    }
}
