use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, TimestampMilliSeconds, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        grid::GridSnapshot,
        validation::{validate_correct_index, validate_join_code},
    },
    scoring::{GridScoreMode, ScoreMode, WagerMode},
    state::{
        session::{
            DEFAULT_GRID_COLUMNS, DEFAULT_TIMER_SECONDS, GameMode, Player, Question, QuizSnapshot,
            Session, SessionConfig,
        },
        state_machine::{ActivePhase, QuestionStep, SessionPhase, SessionStatus},
    },
};

/// Payload used by a host to launch a new session from a quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LaunchSessionRequest {
    /// Opaque identifier of the hosting user.
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
    /// Quiz content; frozen at launch.
    #[validate(nested)]
    pub quiz: QuizInput,
    /// Launch options; every field has a default.
    #[serde(default)]
    #[validate(nested)]
    pub settings: SessionSettingsInput,
}

/// Quiz content supplied at launch.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct QuizInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 200), nested)]
    pub questions: Vec<QuestionInput>,
}

/// One multiple-choice question.
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
#[validate(schema(function = "validate_correct_index"))]
pub struct QuestionInput {
    #[validate(length(min = 1, max = 500))]
    pub prompt: String,
    #[validate(length(min = 2, max = 8))]
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Host options. Omitted fields fall back to the defaults of a live, untimed quiz.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(default)]
pub struct SessionSettingsInput {
    pub game_mode: GameMode,
    pub timer_enabled: bool,
    #[validate(range(min = 5, max = 600))]
    pub timer_duration_seconds: Option<u32>,
    pub score_mode: ScoreMode,
    pub wager_mode: WagerMode,
    pub force_random_names: bool,
    pub grid_score_mode: GridScoreMode,
    #[validate(range(min = 1, max = 12))]
    pub grid_columns: Option<usize>,
    /// Number of teams when names are generated.
    #[validate(range(min = 1, max = 8))]
    pub team_count: Option<usize>,
    /// Explicit team names; overrides `team_count`.
    #[validate(length(min = 1, max = 8))]
    pub team_names: Option<Vec<String>>,
}

impl SessionSettingsInput {
    /// Session options derived from the request.
    pub fn to_config(&self) -> SessionConfig {
        SessionConfig {
            game_mode: self.game_mode,
            timer_enabled: self.timer_enabled,
            timer_duration_seconds: self
                .timer_duration_seconds
                .unwrap_or(DEFAULT_TIMER_SECONDS),
            score_mode: self.score_mode,
            wager_mode: self.wager_mode,
            force_random_names: self.force_random_names,
            grid_score_mode: self.grid_score_mode,
            grid_columns: self.grid_columns.unwrap_or(DEFAULT_GRID_COLUMNS),
        }
    }
}

impl From<QuizInput> for QuizSnapshot {
    fn from(value: QuizInput) -> Self {
        Self {
            title: value.title,
            questions: value
                .questions
                .into_iter()
                .map(|question| Question {
                    prompt: question.prompt,
                    options: question.options,
                    correct_index: question.correct_index,
                    explanation: question.explanation,
                })
                .collect(),
        }
    }
}

/// Question as displayed to clients. The answer is only present once revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub index: usize,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuestionView {
    /// Build a view, exposing the answer only when `revealed`.
    pub fn from_question(index: usize, question: &Question, revealed: bool) -> Self {
        Self {
            index,
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            correct_index: revealed.then_some(question.correct_index),
            explanation: if revealed {
                question.explanation.clone()
            } else {
                None
            },
        }
    }
}

/// Shared session record as seen by every client.
///
/// `question_started_at` is an absolute timestamp so each client derives the remaining
/// time locally instead of trusting a relayed countdown.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub join_code: String,
    pub status: SessionStatus,
    pub game_mode: GameMode,
    /// `-1` before the first question and during grid play.
    pub current_question_index: i64,
    pub question_step: Option<QuestionStep>,
    pub question_count: usize,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[schema(value_type = Option<i64>)]
    pub question_started_at: Option<SystemTime>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[schema(value_type = Option<u64>)]
    pub timer_duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    pub player_count: usize,
    /// Transition version; increases with every lifecycle change.
    pub version: u64,
}

impl SessionSnapshot {
    /// Snapshot of `session` at the given lifecycle position.
    pub fn build(session: &Session, phase: SessionPhase, version: u64) -> Self {
        let question = match phase {
            SessionPhase::Active(ActivePhase::Question { index, step })
                if session.config.game_mode == GameMode::Live =>
            {
                session.question(index).map(|question| {
                    QuestionView::from_question(index, question, step == QuestionStep::Revealed)
                })
            }
            _ => None,
        };

        Self {
            id: session.id,
            join_code: session.join_code.clone(),
            status: phase.status(),
            game_mode: session.config.game_mode,
            current_question_index: phase.question_index(),
            question_step: phase.step(),
            question_count: session.question_count(),
            question_started_at: session.question_started_at,
            timer_duration: session.config.timer_duration(),
            question,
            player_count: session.players.len(),
            version,
        }
    }
}

/// Public projection of a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerSummary {
    pub id: Uuid,
    pub display_name: String,
    pub score: i64,
    pub answered_questions: Vec<usize>,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            display_name: player.display_name.clone(),
            score: player.score,
            answered_questions: player.answered_questions(),
        }
    }
}

/// Everything a client needs to seed its local view of a session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub session: SessionSnapshot,
    pub quiz_title: String,
    pub config: SessionConfig,
    pub players: Vec<PlayerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSnapshot>,
    /// Self-paced sessions expose every question, answers hidden.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<QuestionView>,
    pub created_at: String,
}

impl SessionView {
    /// Full view of `session` at the given lifecycle position.
    pub fn build(session: &Session, phase: SessionPhase, version: u64) -> Self {
        let questions = if session.config.game_mode == GameMode::Solo {
            let revealed = phase.status() >= SessionStatus::Finished;
            session
                .quiz
                .questions
                .iter()
                .enumerate()
                .map(|(index, question)| QuestionView::from_question(index, question, revealed))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            session: SessionSnapshot::build(session, phase, version),
            quiz_title: session.quiz.title.clone(),
            config: session.config,
            players: session.players.values().map(PlayerSummary::from).collect(),
            grid: session
                .grid
                .as_ref()
                .map(|grid| GridSnapshot::build(grid, &session.quiz)),
            questions,
            created_at: format_system_time(session.created_at),
        }
    }
}

/// Response returned to the host after a launch.
#[derive(Debug, Serialize, ToSchema)]
pub struct LaunchSessionResponse {
    pub session: SessionView,
    /// Secret required in the `x-host-token` header of host commands.
    pub host_token: String,
}

/// Request sent by a device to enter a session's lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(custom(function = "validate_join_code"))]
    pub join_code: String,
    /// Requested name; ignored when the host forces random names.
    #[serde(default)]
    #[validate(length(max = 40))]
    pub display_name: Option<String>,
}

/// Identity handed to a device after joining.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    pub session_id: Uuid,
    pub player: PlayerSummary,
    pub session: SessionSnapshot,
}

/// One row of the leaderboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: Uuid,
    pub display_name: String,
    pub score: i64,
}

/// Players ranked by score.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardResponse {
    /// Rank players with standard competition ranking (ties share a rank).
    pub fn build(session: &Session, status: SessionStatus) -> Self {
        let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(session.players.len());
        for (position, player) in session.leaderboard().into_iter().enumerate() {
            let rank = match entries.last() {
                Some(previous) if previous.score == player.score => previous.rank,
                _ => position + 1,
            };
            entries.push(LeaderboardEntry {
                rank,
                player_id: player.id,
                display_name: player.display_name.clone(),
                score: player.score,
            });
        }

        Self {
            session_id: session.id,
            status,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use validator::Validate;

    use super::*;
    use crate::state::session::AnswerRecord;

    fn quiz_input(correct_index: usize) -> QuizInput {
        QuizInput {
            title: "Quiz".into(),
            questions: vec![QuestionInput {
                prompt: "Pick b".into(),
                options: vec!["a".into(), "b".into()],
                correct_index,
                explanation: Some("b is b".into()),
            }],
        }
    }

    fn session() -> Session {
        Session::new(
            "123456".into(),
            "host".into(),
            quiz_input(1).into(),
            SessionConfig::default(),
            None,
        )
    }

    #[test]
    fn launch_request_rejects_out_of_range_answers() {
        let request = LaunchSessionRequest {
            host_id: "host".into(),
            quiz: quiz_input(2),
            settings: SessionSettingsInput::default(),
        };
        assert!(request.validate().is_err());

        let request = LaunchSessionRequest {
            quiz: quiz_input(1),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn join_request_requires_six_digits() {
        let request = JoinSessionRequest {
            join_code: "12345".into(),
            display_name: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn snapshot_hides_answer_until_revealed() {
        let session = session();
        let answering = SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: QuestionStep::Answering,
        });
        let snapshot = SessionSnapshot::build(&session, answering, 1);
        let question = snapshot.question.unwrap();
        assert_eq!(question.correct_index, None);
        assert_eq!(question.explanation, None);

        let revealed = SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: QuestionStep::Revealed,
        });
        let snapshot = SessionSnapshot::build(&session, revealed, 2);
        assert_eq!(snapshot.question.unwrap().correct_index, Some(1));
        assert_eq!(snapshot.version, 2);
    }

    #[test]
    fn snapshot_serializes_timestamps_as_epoch_millis() {
        let mut session = session();
        session.question_started_at =
            Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123));
        let snapshot = SessionSnapshot::build(&session, SessionPhase::Lobby, 0);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["question_started_at"], 1_700_000_000_123_i64);
        assert_eq!(json["status"], "lobby");
        assert_eq!(json["current_question_index"], -1);

        let back: SessionSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn leaderboard_shares_rank_on_ties() {
        let mut session = session();
        for (name, score) in [("a", 500), ("b", 900), ("c", 500)] {
            let mut player = Player::new(name.into());
            player.record_answer(
                0,
                AnswerRecord {
                    option_index: 1,
                    confidence: None,
                    award: score,
                    answered_at: SystemTime::now(),
                },
            );
            session.players.insert(player.id, player);
        }
        let board = LeaderboardResponse::build(&session, SessionStatus::Finished);
        let ranks: Vec<(String, usize)> = board
            .entries
            .iter()
            .map(|entry| (entry.display_name.clone(), entry.rank))
            .collect();
        assert_eq!(
            ranks,
            vec![("b".into(), 1), ("a".into(), 2), ("c".into(), 2)]
        );
    }
}
