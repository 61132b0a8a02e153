use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{AnswerEntry, PlayerEntity, SessionEntity},
    scoring::{Confidence, ConfidenceTable, GridScoreMode, ScoreMode, ScoringRules, WagerMode},
    state::{
        grid::GridBoard,
        state_machine::{ActivePhase, QuestionStep, SessionLayout, SessionPhase},
    },
};

/// Default answering window when a timer is enabled.
pub const DEFAULT_TIMER_SECONDS: u32 = 30;
/// Default number of grid columns.
pub const DEFAULT_GRID_COLUMNS: usize = 6;

/// A multiple-choice question as frozen at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Question text.
    pub prompt: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Optional text shown after the reveal.
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Immutable copy of the quiz content taken when the session is launched.
///
/// Later edits to the source quiz never affect a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSnapshot {
    /// Quiz title.
    pub title: String,
    /// Ordered questions.
    pub questions: Vec<Question>,
}

/// How questions are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Host-driven sequential questions.
    #[default]
    Live,
    /// Team grid with rotating turns.
    Jeopardy,
    /// Self-paced: each player answers any question once while the session is active.
    Solo,
}

/// Options chosen by the host at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionConfig {
    /// Play style.
    pub game_mode: GameMode,
    /// Whether questions are timed.
    pub timer_enabled: bool,
    /// Answering window in seconds.
    pub timer_duration_seconds: u32,
    /// Valuation of correct answers.
    pub score_mode: ScoreMode,
    /// Confidence wager toggle.
    pub wager_mode: WagerMode,
    /// Ignore requested names and assign random ones.
    pub force_random_names: bool,
    /// Grid valuation.
    pub grid_score_mode: GridScoreMode,
    /// Grid column count.
    pub grid_columns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_mode: GameMode::Live,
            timer_enabled: false,
            timer_duration_seconds: DEFAULT_TIMER_SECONDS,
            score_mode: ScoreMode::Speed,
            wager_mode: WagerMode::None,
            force_random_names: false,
            grid_score_mode: GridScoreMode::Progressive,
            grid_columns: DEFAULT_GRID_COLUMNS,
        }
    }
}

impl SessionConfig {
    /// Whether questions go through a preview and an answering deadline.
    pub fn is_timed(&self) -> bool {
        self.timer_enabled && self.game_mode == GameMode::Live
    }

    /// Answering window when the session is timed.
    pub fn timer_duration(&self) -> Option<Duration> {
        self.is_timed()
            .then(|| Duration::from_secs(u64::from(self.timer_duration_seconds)))
    }

    /// Transition shape of a session built from this configuration.
    pub fn layout(&self, question_count: usize) -> SessionLayout {
        SessionLayout {
            question_count,
            timed: self.is_timed(),
            board: self.game_mode == GameMode::Jeopardy,
            self_paced: self.game_mode == GameMode::Solo,
        }
    }

    /// Scoring rules for the question flow.
    pub fn scoring_rules(&self, confidence: ConfidenceTable) -> ScoringRules {
        ScoringRules {
            timer: self.timer_duration(),
            score_mode: self.score_mode,
            wager: (self.wager_mode == WagerMode::Hybris).then_some(confidence),
        }
    }
}

/// One answer recorded for a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Chosen option.
    pub option_index: usize,
    /// Declared confidence, wager mode only.
    pub confidence: Option<Confidence>,
    /// Points awarded (may be negative).
    pub award: i64,
    /// Server time at acceptance.
    pub answered_at: SystemTime,
}

/// Participant of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable identifier handed to the device at join.
    pub id: Uuid,
    /// Name shown on the leaderboard.
    pub display_name: String,
    /// Running score.
    pub score: i64,
    /// Answers keyed by question index.
    pub answers: BTreeMap<usize, AnswerRecord>,
    /// Join time.
    pub joined_at: SystemTime,
}

impl Player {
    /// Fresh player with zero score and no answers.
    pub fn new(display_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            score: 0,
            answers: BTreeMap::new(),
            joined_at: SystemTime::now(),
        }
    }

    /// Recorded answer for `index`, if any.
    pub fn answer(&self, index: usize) -> Option<&AnswerRecord> {
        self.answers.get(&index)
    }

    /// Record an answer and add its award. Returns `false` if the question was already answered.
    pub fn record_answer(&mut self, index: usize, record: AnswerRecord) -> bool {
        if self.answers.contains_key(&index) {
            return false;
        }
        self.score += record.award;
        self.answers.insert(index, record);
        true
    }

    /// Indices of answered questions, ascending.
    pub fn answered_questions(&self) -> Vec<usize> {
        self.answers.keys().copied().collect()
    }

    /// Persistence form of the player.
    pub fn to_entity(&self, session_id: Uuid) -> PlayerEntity {
        PlayerEntity {
            id: self.id,
            session_id,
            display_name: self.display_name.clone(),
            score: self.score,
            answers: self
                .answers
                .iter()
                .map(|(index, record)| AnswerEntry {
                    question_index: *index,
                    option_index: record.option_index,
                    confidence: record.confidence,
                    award: record.award,
                    answered_at: record.answered_at,
                })
                .collect(),
            joined_at: self.joined_at,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            score: value.score,
            answers: value
                .answers
                .into_iter()
                .map(|entry| {
                    (
                        entry.question_index,
                        AnswerRecord {
                            option_index: entry.option_index,
                            confidence: entry.confidence,
                            award: entry.award,
                            answered_at: entry.answered_at,
                        },
                    )
                })
                .collect(),
            joined_at: value.joined_at,
        }
    }
}

/// Mutable record of a running session. The lifecycle phase lives in the state machine.
#[derive(Debug, Clone)]
pub struct Session {
    /// Primary key.
    pub id: Uuid,
    /// Six digit code players type to join.
    pub join_code: String,
    /// Opaque identifier of the hosting user.
    pub host_id: String,
    /// Frozen quiz content.
    pub quiz: Arc<QuizSnapshot>,
    /// Launch options.
    pub config: SessionConfig,
    /// Roster in join order.
    pub players: IndexMap<Uuid, Player>,
    /// Grid state for jeopardy sessions.
    pub grid: Option<GridBoard>,
    /// Start of the current answering window.
    pub question_started_at: Option<SystemTime>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
}

impl Session {
    /// Build a new session in the lobby.
    pub fn new(
        join_code: String,
        host_id: String,
        quiz: QuizSnapshot,
        config: SessionConfig,
        grid: Option<GridBoard>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            join_code,
            host_id,
            quiz: Arc::new(quiz),
            config,
            players: IndexMap::new(),
            grid,
            question_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a session from its persisted records.
    pub fn from_entity(entity: SessionEntity, players: Vec<PlayerEntity>) -> Self {
        Self {
            id: entity.id,
            join_code: entity.join_code,
            host_id: entity.host_id,
            quiz: Arc::new(entity.quiz),
            config: entity.config,
            players: players
                .into_iter()
                .map(|player| (player.id, Player::from(player)))
                .collect(),
            grid: entity.grid,
            question_started_at: entity.question_started_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }

    /// Transition shape of this session.
    pub fn layout(&self) -> SessionLayout {
        self.config.layout(self.question_count())
    }

    /// Update the answering clock for a phase the session is entering.
    ///
    /// The clock starts when answering opens and is cleared everywhere else except on
    /// reveal, where it is kept for late score inspection.
    pub fn enter_phase(&mut self, phase: SessionPhase, now: SystemTime) {
        self.question_started_at = match phase {
            SessionPhase::Active(ActivePhase::Question {
                step: QuestionStep::Answering,
                ..
            }) => Some(now),
            SessionPhase::Active(ActivePhase::Question {
                step: QuestionStep::Revealed,
                ..
            }) => self.question_started_at,
            _ => None,
        };
    }

    /// Number of questions in the snapshot.
    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    /// Question at `index`.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.quiz.questions.get(index)
    }

    /// Milliseconds since the answering window opened, measured at `now`.
    pub fn elapsed_ms(&self, now: SystemTime) -> Option<i64> {
        let started = self.question_started_at?;
        let elapsed = match now.duration_since(started) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(err) => -i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX),
        };
        Some(elapsed)
    }

    /// Absolute deadline of the current answering window.
    pub fn answering_deadline(&self) -> Option<SystemTime> {
        let started = self.question_started_at?;
        self.config
            .timer_duration()
            .map(|duration| started + duration)
    }

    /// Whether every player in a non-empty roster answered question `index`.
    pub fn all_answered(&self, index: usize) -> bool {
        !self.players.is_empty()
            && self
                .players
                .values()
                .all(|player| player.answers.contains_key(&index))
    }

    /// Players sorted by descending score, join order breaking ties.
    pub fn leaderboard(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self.players.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Refresh the write timestamp.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }

    /// Persistence form of the session at the given lifecycle position.
    pub fn to_entity(&self, phase: SessionPhase, version: u64) -> SessionEntity {
        SessionEntity {
            id: self.id,
            join_code: self.join_code.clone(),
            host_id: self.host_id.clone(),
            status: phase.status(),
            current_question_index: phase.question_index(),
            question_step: phase.step(),
            question_started_at: self.question_started_at,
            quiz: self.quiz.as_ref().clone(),
            config: self.config,
            grid: self.grid.clone(),
            version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz() -> QuizSnapshot {
        QuizSnapshot {
            title: "Capitals".into(),
            questions: vec![Question {
                prompt: "Capital of France?".into(),
                options: vec!["Paris".into(), "Lyon".into()],
                correct_index: 0,
                explanation: None,
            }],
        }
    }

    fn record(award: i64) -> AnswerRecord {
        AnswerRecord {
            option_index: 0,
            confidence: None,
            award,
            answered_at: SystemTime::now(),
        }
    }

    #[test]
    fn player_records_each_question_once() {
        let mut player = Player::new("Ada".into());
        assert!(player.record_answer(0, record(1000)));
        assert!(!player.record_answer(0, record(1000)));
        assert_eq!(player.score, 1000);
        assert_eq!(player.answered_questions(), vec![0]);
    }

    #[test]
    fn negative_awards_lower_the_score() {
        let mut player = Player::new("Ada".into());
        player.record_answer(0, record(-500));
        assert_eq!(player.score, -500);
    }

    #[test]
    fn all_answered_requires_a_non_empty_roster() {
        let mut session = Session::new(
            "123456".into(),
            "host".into(),
            quiz(),
            SessionConfig::default(),
            None,
        );
        assert!(!session.all_answered(0));

        let mut ada = Player::new("Ada".into());
        let grace = Player::new("Grace".into());
        ada.record_answer(0, record(10));
        session.players.insert(ada.id, ada);
        session.players.insert(grace.id, grace.clone());
        assert!(!session.all_answered(0));

        session
            .players
            .get_mut(&grace.id)
            .unwrap()
            .record_answer(0, record(20));
        assert!(session.all_answered(0));
        assert_eq!(session.leaderboard()[0].display_name, "Grace");
    }

    #[test]
    fn timer_only_applies_to_live_sessions() {
        let timed = SessionConfig {
            timer_enabled: true,
            ..SessionConfig::default()
        };
        assert_eq!(timed.timer_duration(), Some(Duration::from_secs(30)));

        let solo = SessionConfig {
            game_mode: GameMode::Solo,
            ..timed
        };
        assert!(!solo.is_timed());
        assert_eq!(solo.timer_duration(), None);
    }

    #[test]
    fn elapsed_is_negative_when_clock_is_behind() {
        let mut session = Session::new(
            "123456".into(),
            "host".into(),
            quiz(),
            SessionConfig::default(),
            None,
        );
        let now = SystemTime::now();
        session.question_started_at = Some(now + Duration::from_secs(2));
        assert_eq!(session.elapsed_ms(now), Some(-2000));
        session.question_started_at = Some(now - Duration::from_secs(3));
        assert_eq!(session.elapsed_ms(now), Some(3000));
    }

    #[test]
    fn player_entity_roundtrip_keeps_answers() {
        let mut player = Player::new("Ada".into());
        player.record_answer(2, record(300));
        let session_id = Uuid::new_v4();
        let entity = player.to_entity(session_id);
        assert_eq!(entity.session_id, session_id);
        assert_eq!(Player::from(entity), player);
    }

    #[test]
    fn answering_clock_starts_once_and_clears_on_advance() {
        let mut session = Session::new(
            "123456".into(),
            "host".into(),
            quiz(),
            SessionConfig::default(),
            None,
        );
        let start = SystemTime::now();
        let answering = SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: QuestionStep::Answering,
        });
        session.enter_phase(answering, start);
        assert_eq!(session.question_started_at, Some(start));

        let revealed = SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: QuestionStep::Revealed,
        });
        session.enter_phase(revealed, start + Duration::from_secs(5));
        assert_eq!(session.question_started_at, Some(start));

        session.enter_phase(SessionPhase::Finished, start + Duration::from_secs(6));
        assert_eq!(session.question_started_at, None);
    }
}
