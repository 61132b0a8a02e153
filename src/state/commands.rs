//! Commands accepted from hosts, players and the runtime itself, and their mapping onto
//! [`SessionEvent`]s.

use crate::{
    error::ServiceError,
    scoring::Confidence,
    state::state_machine::{ActivePhase, FinishReason, RevealReason, SessionEvent, SessionPhase},
};

/// Lifecycle commands issued by the host.
///
/// `Reveal` and `Next` may name the question they target. A redelivered command that
/// names a question already moved past is then recognised as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Leave the lobby.
    Start,
    /// Show the correct answer.
    Reveal {
        /// Target question; defaults to the current one.
        question_index: Option<usize>,
    },
    /// Move to the next question.
    Next {
        /// Question being left; defaults to the current one.
        question_index: Option<usize>,
    },
    /// Jump to the final scoreboard.
    End,
    /// Close the session for good.
    Close,
}

impl HostCommand {
    /// Resolve the command against the current phase.
    pub fn to_event(self, phase: SessionPhase) -> Result<SessionEvent, ServiceError> {
        let event = match self {
            HostCommand::Start => SessionEvent::Start,
            HostCommand::Reveal { question_index } => SessionEvent::Reveal {
                index: target_index(question_index, phase)?,
                reason: RevealReason::Host,
            },
            HostCommand::Next { question_index } => SessionEvent::Advance {
                from: target_index(question_index, phase)?,
            },
            HostCommand::End => SessionEvent::Finish(FinishReason::ManualStop),
            HostCommand::Close => SessionEvent::Close,
        };
        Ok(event)
    }
}

fn target_index(explicit: Option<usize>, phase: SessionPhase) -> Result<usize, ServiceError> {
    if let Some(index) = explicit {
        return Ok(index);
    }
    match phase {
        SessionPhase::Active(ActivePhase::Question { index, .. }) => Ok(index),
        // Past the last question every index is stale; the machine reports it as applied.
        SessionPhase::Finished | SessionPhase::Closed => Ok(0),
        other => Err(ServiceError::InvalidState(format!(
            "no question is being played in {other:?}"
        ))),
    }
}

/// Events raised by the runtime rather than by a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The preview delay of a timed question elapsed.
    PreviewElapsed {
        /// Question the timer was armed for.
        index: usize,
    },
    /// The answering window of a timed question closed.
    DeadlineReached {
        /// Question the timer was armed for.
        index: usize,
    },
    /// Every known player answered.
    AllAnswered {
        /// Answered question.
        index: usize,
    },
    /// The last grid cell was completed.
    BoardCompleted,
}

impl From<SystemEvent> for SessionEvent {
    fn from(value: SystemEvent) -> Self {
        match value {
            SystemEvent::PreviewElapsed { index } => SessionEvent::PreviewElapsed { index },
            SystemEvent::DeadlineReached { index } => SessionEvent::Reveal {
                index,
                reason: RevealReason::TimerExpired,
            },
            SystemEvent::AllAnswered { index } => SessionEvent::Reveal {
                index,
                reason: RevealReason::AllAnswered,
            },
            SystemEvent::BoardCompleted => SessionEvent::Finish(FinishReason::BoardCompleted),
        }
    }
}

/// Commands a player sends about their own record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Answer one question.
    Answer {
        /// Question answered.
        question_index: usize,
        /// Chosen option.
        option_index: usize,
        /// Declared confidence, wager sessions only.
        confidence: Option<Confidence>,
    },
    /// Leave the session.
    Leave,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::QuestionStep;

    #[test]
    fn reveal_defaults_to_the_current_question() {
        let phase = SessionPhase::Active(ActivePhase::Question {
            index: 3,
            step: QuestionStep::Answering,
        });
        let event = HostCommand::Reveal {
            question_index: None,
        }
        .to_event(phase)
        .unwrap();
        assert_eq!(
            event,
            SessionEvent::Reveal {
                index: 3,
                reason: RevealReason::Host
            }
        );

        let event = HostCommand::Next {
            question_index: Some(1),
        }
        .to_event(phase)
        .unwrap();
        assert_eq!(event, SessionEvent::Advance { from: 1 });
    }

    #[test]
    fn reveal_in_lobby_is_rejected() {
        let err = HostCommand::Reveal {
            question_index: None,
        }
        .to_event(SessionPhase::Lobby)
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn system_events_map_to_reveal_reasons() {
        assert_eq!(
            SessionEvent::from(SystemEvent::DeadlineReached { index: 2 }),
            SessionEvent::Reveal {
                index: 2,
                reason: RevealReason::TimerExpired
            }
        );
        assert_eq!(
            SessionEvent::from(SystemEvent::BoardCompleted),
            SessionEvent::Finish(FinishReason::BoardCompleted)
        );
    }
}
