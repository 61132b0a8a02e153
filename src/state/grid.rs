use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::{CellModifier, GridScoreMode, cell_base_value, compute_grid_award};

/// Team competing on the grid. Turn order is the position in [`GridBoard::teams`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Display name.
    pub name: String,
    /// Running score.
    pub score: i64,
}

/// One cell, bound to the question with the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    /// Modifier rolled at launch.
    pub modifier: CellModifier,
    /// Whether the cell has been played or skipped.
    pub completed: bool,
}

/// Errors raised by grid operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// No cell with this index.
    #[error("cell {0} does not exist")]
    CellOutOfRange(usize),
    /// The cell above in the same column is not completed yet.
    #[error("cell {0} is locked until the cell above it is completed")]
    CellLocked(usize),
    /// The cell was already completed.
    #[error("cell {0} is already completed")]
    CellCompleted(usize),
    /// Another cell is currently open.
    #[error("cell {0} is already open")]
    AnotherCellOpen(usize),
    /// No team with this index.
    #[error("team {0} does not exist")]
    TeamOutOfRange(usize),
    /// The board has no teams to credit.
    #[error("the board has no teams")]
    NoTeams,
}

/// Result of resolving a cell for the team in turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellResolution {
    /// Team credited.
    pub team_index: usize,
    /// Points added to the team (may be negative).
    pub award: i64,
    /// Team score after the award.
    pub team_score: i64,
    /// Team whose turn it is now.
    pub next_turn: usize,
}

/// Jeopardy board: cells laid out row-major over `columns` columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBoard {
    /// Column count.
    pub columns: usize,
    /// Cell valuation.
    pub score_mode: GridScoreMode,
    /// Cells in question order.
    pub cells: Vec<GridCell>,
    /// Teams in turn order.
    pub teams: Vec<Team>,
    /// Index of the team in turn.
    pub current_turn: usize,
    /// Cell currently shown to the room.
    pub open_cell: Option<usize>,
    /// Incremented on every mutation.
    pub revision: u64,
}

impl GridBoard {
    /// Build a board whose modifiers are rolled once per cell.
    pub fn new<R: Rng + ?Sized>(
        cell_count: usize,
        columns: usize,
        score_mode: GridScoreMode,
        team_names: Vec<String>,
        rng: &mut R,
    ) -> Self {
        let modifiers = (0..cell_count)
            .map(|_| CellModifier::from_roll(rng.random::<f64>()))
            .collect();
        Self::with_modifiers(columns, score_mode, team_names, modifiers)
    }

    /// Build a board with explicit modifiers.
    pub fn with_modifiers(
        columns: usize,
        score_mode: GridScoreMode,
        team_names: Vec<String>,
        modifiers: Vec<CellModifier>,
    ) -> Self {
        Self {
            columns: columns.max(1),
            score_mode,
            cells: modifiers
                .into_iter()
                .map(|modifier| GridCell {
                    modifier,
                    completed: false,
                })
                .collect(),
            teams: team_names
                .into_iter()
                .map(|name| Team { name, score: 0 })
                .collect(),
            current_turn: 0,
            open_cell: None,
            revision: 0,
        }
    }

    /// Row and column of a cell.
    pub fn position(&self, index: usize) -> Option<(usize, usize)> {
        (index < self.cells.len()).then(|| (index / self.columns, index % self.columns))
    }

    /// Value of a cell before modifiers.
    pub fn base_value(&self, index: usize) -> Option<i64> {
        self.position(index)
            .map(|(row, _)| cell_base_value(row, self.score_mode))
    }

    /// A cell is locked while the cell directly above it is not completed.
    pub fn is_locked(&self, index: usize) -> bool {
        match self.position(index) {
            Some((0, _)) | None => false,
            Some(_) => !self.cells[index - self.columns].completed,
        }
    }

    /// Whether the cell may be opened now.
    pub fn is_openable(&self, index: usize) -> bool {
        self.cells
            .get(index)
            .is_some_and(|cell| !cell.completed && !self.is_locked(index))
    }

    /// Whether every cell has been completed.
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(|cell| cell.completed)
    }

    /// Number of completed cells.
    pub fn completed_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.completed).count()
    }

    /// Team in turn.
    pub fn current_team(&self) -> Option<&Team> {
        self.teams.get(self.current_turn)
    }

    fn check_playable(&self, index: usize) -> Result<(), GridError> {
        let cell = self.cells.get(index).ok_or(GridError::CellOutOfRange(index))?;
        if cell.completed {
            return Err(GridError::CellCompleted(index));
        }
        if self.is_locked(index) {
            return Err(GridError::CellLocked(index));
        }
        Ok(())
    }

    /// Open a cell for the team in turn. Reopening the open cell is a no-op.
    pub fn open(&mut self, index: usize) -> Result<(), GridError> {
        match self.open_cell {
            Some(open) if open == index => return Ok(()),
            Some(open) => return Err(GridError::AnotherCellOpen(open)),
            None => {}
        }
        self.check_playable(index)?;
        self.open_cell = Some(index);
        self.revision += 1;
        Ok(())
    }

    /// Score the cell for the team in turn, complete it and pass the turn.
    pub fn resolve(&mut self, index: usize, correct: bool) -> Result<CellResolution, GridError> {
        if let Some(open) = self.open_cell
            && open != index
        {
            return Err(GridError::AnotherCellOpen(open));
        }
        self.check_playable(index)?;
        if self.teams.is_empty() {
            return Err(GridError::NoTeams);
        }

        let (row, _) = self.position(index).ok_or(GridError::CellOutOfRange(index))?;
        let award = compute_grid_award(row, self.score_mode, self.cells[index].modifier, correct);
        let team_index = self.current_turn;
        self.teams[team_index].score += award;
        let team_score = self.teams[team_index].score;

        self.finish_cell(index);

        Ok(CellResolution {
            team_index,
            award,
            team_score,
            next_turn: self.current_turn,
        })
    }

    /// Mark a cell completed without scoring. The turn still passes.
    pub fn complete(&mut self, index: usize) -> Result<(), GridError> {
        if let Some(open) = self.open_cell
            && open != index
        {
            return Err(GridError::AnotherCellOpen(open));
        }
        self.check_playable(index)?;
        self.finish_cell(index);
        Ok(())
    }

    /// Manual score adjustment for one team.
    pub fn award_points(&mut self, team_index: usize, points: i64) -> Result<i64, GridError> {
        let team = self
            .teams
            .get_mut(team_index)
            .ok_or(GridError::TeamOutOfRange(team_index))?;
        team.score += points;
        let score = team.score;
        self.revision += 1;
        Ok(score)
    }

    fn finish_cell(&mut self, index: usize) {
        self.cells[index].completed = true;
        self.open_cell = None;
        if !self.teams.is_empty() {
            self.current_turn = (self.current_turn + 1) % self.teams.len();
        }
        self.revision += 1;
    }
}
