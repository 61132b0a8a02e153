//! Pure scoring rules for every session variant.
//!
//! Nothing in this module performs I/O or touches shared state: identical inputs always
//! produce identical awards. Malformed inputs (negative elapsed time, out-of-range option
//! index) degrade to a safe value instead of panicking, because they usually come from a
//! late or corrupted client payload.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::session::Question;

/// Award for a correct answer when speed scoring does not apply.
pub const FLAT_AWARD: i64 = 1000;
/// Minimum award for a correct answer under speed scoring (answered at the deadline).
pub const SPEED_FLOOR_AWARD: i64 = 100;
/// Portion of the speed award that decays linearly over the answering window.
pub const SPEED_DECAY_RANGE: i64 = 900;
/// Base value of a grid cell (flat mode, or first row in progressive mode).
pub const GRID_BASE_AWARD: i64 = 100;
/// Multiplier applied to a correct answer on a `double` cell.
pub const DOUBLE_MULTIPLIER: i64 = 2;
/// Multiplier applied (positively or negatively) on a `wagerable` cell.
pub const WAGERABLE_MULTIPLIER: i64 = 3;

/// Cumulative roll threshold below which a cell becomes `wagerable`.
pub const WAGERABLE_THRESHOLD: f64 = 0.10;
/// Cumulative roll threshold below which a cell becomes `double`.
pub const DOUBLE_THRESHOLD: f64 = 0.30;

/// How a correct answer is valued when a timer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Linear decay from 1000 to 100 over the answering window.
    #[default]
    Speed,
    /// Flat award regardless of timing.
    Simple,
}

/// Whether players declare a confidence level with each answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WagerMode {
    /// Plain quiz: wrong answers score zero.
    #[default]
    None,
    /// Confidence wager: gains and losses scale with the declared confidence.
    Hybris,
}

/// Self-declared confidence attached to an answer in wager mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// No stake.
    #[default]
    Guess,
    /// Medium stake.
    Believe,
    /// Full stake.
    Know,
}

/// Point magnitudes per confidence tier. Correct answers gain the magnitude on top of the
/// base award, wrong answers lose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceTable {
    /// Magnitude for [`Confidence::Guess`].
    pub guess: i64,
    /// Magnitude for [`Confidence::Believe`].
    pub believe: i64,
    /// Magnitude for [`Confidence::Know`].
    pub know: i64,
}

impl ConfidenceTable {
    /// Stake associated with the given tier.
    pub fn magnitude(&self, confidence: Confidence) -> i64 {
        match confidence {
            Confidence::Guess => self.guess,
            Confidence::Believe => self.believe,
            Confidence::Know => self.know,
        }
    }
}

impl Default for ConfidenceTable {
    fn default() -> Self {
        Self {
            guess: 0,
            believe: 200,
            know: 500,
        }
    }
}

/// Scoring mode of a grid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GridScoreMode {
    /// Every cell is worth the same base value.
    Flat,
    /// Cells are worth `(row + 1) * 100`.
    #[default]
    Progressive,
}

/// Random modifier attached to a grid cell at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CellModifier {
    /// Plain cell.
    #[default]
    Normal,
    /// Correct answers are worth twice the base value.
    Double,
    /// Correct answers are worth three times the base value, wrong ones cost as much.
    Wagerable,
}

impl CellModifier {
    /// Map a uniform roll in `[0, 1)` onto a modifier using cumulative thresholds.
    pub fn from_roll(roll: f64) -> Self {
        if roll < WAGERABLE_THRESHOLD {
            CellModifier::Wagerable
        } else if roll < DOUBLE_THRESHOLD {
            CellModifier::Double
        } else {
            CellModifier::Normal
        }
    }
}

/// Session-level inputs of the question scoring rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    /// Answering window when a timer is configured.
    pub timer: Option<Duration>,
    /// Speed or flat valuation.
    pub score_mode: ScoreMode,
    /// Confidence table when wager mode is enabled.
    pub wager: Option<ConfidenceTable>,
}

impl ScoringRules {
    /// Flat scoring without timer or wager.
    pub fn flat() -> Self {
        Self {
            timer: None,
            score_mode: ScoreMode::Simple,
            wager: None,
        }
    }
}

/// Points awarded for `chosen_index` on `question`.
///
/// `elapsed_ms` is measured from the start of the answering phase and is only consulted
/// under timed speed scoring. `confidence` defaults to [`Confidence::Guess`] in wager mode.
pub fn compute_award(
    question: &Question,
    chosen_index: usize,
    rules: &ScoringRules,
    elapsed_ms: Option<i64>,
    confidence: Option<Confidence>,
) -> i64 {
    if chosen_index >= question.options.len() {
        return 0;
    }

    let correct = chosen_index == question.correct_index;
    let stake = rules
        .wager
        .map(|table| table.magnitude(confidence.unwrap_or_default()));

    match (correct, stake) {
        (true, None) => base_award(rules, elapsed_ms),
        (true, Some(stake)) => base_award(rules, elapsed_ms) + stake,
        (false, None) => 0,
        (false, Some(stake)) => -stake,
    }
}

fn base_award(rules: &ScoringRules, elapsed_ms: Option<i64>) -> i64 {
    match (rules.score_mode, rules.timer) {
        (ScoreMode::Speed, Some(duration)) => {
            let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
            speed_award(duration_ms, elapsed_ms.unwrap_or(0))
        }
        _ => FLAT_AWARD,
    }
}

/// Linear decay from 1000 (instant) to 100 (deadline), rounded half up.
///
/// Elapsed time is clamped into `[0, duration_ms]`, so clock skew never yields more than
/// the maximum and late answers never fall below the floor.
pub fn speed_award(duration_ms: i64, elapsed_ms: i64) -> i64 {
    if duration_ms <= 0 {
        return FLAT_AWARD;
    }
    let elapsed = elapsed_ms.clamp(0, duration_ms);
    let remaining = duration_ms - elapsed;
    // floor(x + 0.5) on the rational 900 * remaining / duration
    let decayed = (2 * SPEED_DECAY_RANGE * remaining + duration_ms) / (2 * duration_ms);
    SPEED_FLOOR_AWARD + decayed
}

/// Value of a grid cell before modifiers.
pub fn cell_base_value(row: usize, mode: GridScoreMode) -> i64 {
    match mode {
        GridScoreMode::Flat => GRID_BASE_AWARD,
        GridScoreMode::Progressive => {
            let row = i64::try_from(row).unwrap_or(i64::MAX - 1);
            row.saturating_add(1).saturating_mul(GRID_BASE_AWARD)
        }
    }
}

/// Team award for resolving a grid cell.
pub fn compute_grid_award(
    row: usize,
    mode: GridScoreMode,
    modifier: CellModifier,
    correct: bool,
) -> i64 {
    let base = cell_base_value(row, mode);
    match (modifier, correct) {
        (CellModifier::Normal, true) => base,
        (CellModifier::Double, true) => base * DOUBLE_MULTIPLIER,
        (CellModifier::Wagerable, true) => base * WAGERABLE_MULTIPLIER,
        (CellModifier::Wagerable, false) => -base * WAGERABLE_MULTIPLIER,
        (CellModifier::Normal | CellModifier::Double, false) => 0,
    }
}
