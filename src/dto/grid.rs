use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::session::QuestionView,
    scoring::{CellModifier, GridScoreMode},
    state::{
        grid::{CellResolution, GridBoard},
        session::QuizSnapshot,
    },
};

/// Cell as shown on the board. The modifier stays hidden until the cell is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CellView {
    pub index: usize,
    pub row: usize,
    pub column: usize,
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<CellModifier>,
    pub completed: bool,
    pub locked: bool,
}

/// Team as shown on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TeamView {
    pub index: usize,
    pub name: String,
    pub score: i64,
}

/// Full board state, broadcast after every grid mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GridSnapshot {
    /// Increases with every board mutation.
    pub revision: u64,
    pub columns: usize,
    pub score_mode: GridScoreMode,
    pub cells: Vec<CellView>,
    pub teams: Vec<TeamView>,
    pub current_turn: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_cell: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_question: Option<QuestionView>,
    pub completed_cells: usize,
}

impl GridSnapshot {
    /// Project the board, binding the open cell to its question.
    pub fn build(board: &GridBoard, quiz: &QuizSnapshot) -> Self {
        let cells = board
            .cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                let (row, column) = board.position(index).unwrap_or_default();
                let visible = cell.completed || board.open_cell == Some(index);
                CellView {
                    index,
                    row,
                    column,
                    value: board.base_value(index).unwrap_or_default(),
                    modifier: visible.then_some(cell.modifier),
                    completed: cell.completed,
                    locked: board.is_locked(index),
                }
            })
            .collect();

        Self {
            revision: board.revision,
            columns: board.columns,
            score_mode: board.score_mode,
            cells,
            teams: board
                .teams
                .iter()
                .enumerate()
                .map(|(index, team)| TeamView {
                    index,
                    name: team.name.clone(),
                    score: team.score,
                })
                .collect(),
            current_turn: board.current_turn,
            open_cell: board.open_cell,
            open_question: board.open_cell.and_then(|index| {
                quiz.questions
                    .get(index)
                    .map(|question| QuestionView::from_question(index, question, false))
            }),
            completed_cells: board.completed_count(),
        }
    }
}

/// Option chosen by the team in turn, recorded by the host.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveCellRequest {
    /// An index outside the question's options counts as a wrong answer.
    pub option_index: usize,
}

/// Manual score adjustment for one team.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AwardPointsRequest {
    #[validate(range(min = -10000, max = 10000))]
    pub points: i64,
}

/// Outcome of scoring a cell.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolutionView {
    pub team_index: usize,
    pub award: i64,
    pub team_score: i64,
    pub next_turn: usize,
}

impl From<CellResolution> for ResolutionView {
    fn from(value: CellResolution) -> Self {
        Self {
            team_index: value.team_index,
            award: value.award,
            team_score: value.team_score,
            next_turn: value.next_turn,
        }
    }
}

/// Response to every grid command.
#[derive(Debug, Serialize, ToSchema)]
pub struct GridActionResponse {
    pub grid: GridSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionView>,
    /// True when this command completed the last cell and finished the session.
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::Question;

    fn quiz(count: usize) -> QuizSnapshot {
        QuizSnapshot {
            title: "Grid".into(),
            questions: (0..count)
                .map(|i| Question {
                    prompt: format!("Q{i}"),
                    options: vec!["a".into(), "b".into()],
                    correct_index: 0,
                    explanation: None,
                })
                .collect(),
        }
    }

    #[test]
    fn modifiers_are_hidden_until_opened() {
        let mut board = GridBoard::with_modifiers(
            2,
            GridScoreMode::Progressive,
            vec!["A".into(), "B".into()],
            vec![CellModifier::Double; 4],
        );
        let quiz = quiz(4);

        let snapshot = GridSnapshot::build(&board, &quiz);
        assert!(snapshot.cells.iter().all(|cell| cell.modifier.is_none()));
        assert_eq!(snapshot.cells[3].value, 200);
        assert!(snapshot.cells[3].locked);

        board.open(1).unwrap();
        let snapshot = GridSnapshot::build(&board, &quiz);
        assert_eq!(snapshot.cells[1].modifier, Some(CellModifier::Double));
        let question = snapshot.open_question.unwrap();
        assert_eq!(question.prompt, "Q1");
        assert_eq!(question.correct_index, None);
    }
}
