//! Local view of a session maintained by a subscriber.
//!
//! Notifications arrive at least once and in no guaranteed order across kinds, so every
//! update is checked against what the view already holds: the session lifecycle never
//! moves backwards, grids only move to a higher revision, and a removed player stays
//! removed.

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use indexmap::IndexMap;
use tracing::trace;
use uuid::Uuid;

use crate::{
    dto::{
        grid::GridSnapshot,
        notification::{DirectMessage, Notification},
        session::{PlayerSummary, SessionSnapshot, SessionView},
    },
    state::state_machine::{QuestionStep, SessionStatus},
};

/// Who the projection is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// The host screen; tracks every player.
    Host,
    /// One player's device.
    Player(Uuid),
}

/// Connection state of the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStatus {
    /// Following the session.
    Connected,
    /// The viewing player was removed. Terminal.
    Removed,
    /// The session was closed. Terminal.
    Closed,
}

/// What happened to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The view changed.
    Applied,
    /// Older than, or equal to, what the view already holds.
    Stale,
    /// Not relevant to this viewer.
    Ignored,
}

/// Ordering key of a session snapshot: lifecycle first, version as tiebreaker.
fn progress(snapshot: &SessionSnapshot) -> (SessionStatus, i64, Option<QuestionStep>, u64) {
    (
        snapshot.status,
        snapshot.current_question_index,
        snapshot.question_step,
        snapshot.version,
    )
}

/// Subscriber-side session view.
#[derive(Debug, Clone)]
pub struct SessionProjection {
    viewer: Viewer,
    session: Option<SessionSnapshot>,
    players: IndexMap<Uuid, PlayerSummary>,
    removed: HashSet<Uuid>,
    grid: Option<GridSnapshot>,
    status: ProjectionStatus,
}

impl SessionProjection {
    /// Empty projection for a player device.
    pub fn for_player(player_id: Uuid) -> Self {
        Self::new(Viewer::Player(player_id))
    }

    /// Empty projection for the host screen.
    pub fn for_host() -> Self {
        Self::new(Viewer::Host)
    }

    fn new(viewer: Viewer) -> Self {
        Self {
            viewer,
            session: None,
            players: IndexMap::new(),
            removed: HashSet::new(),
            grid: None,
            status: ProjectionStatus::Connected,
        }
    }

    /// Seed the projection from a fetched view.
    ///
    /// Subscribing happens before the fetch, so deltas buffered meanwhile may predate the
    /// view; the guards in [`SessionProjection::apply`] discard them.
    pub fn seed(&mut self, view: SessionView) {
        self.players = view
            .players
            .into_iter()
            .filter(|player| !self.removed.contains(&player.id))
            .map(|player| (player.id, player))
            .collect();
        if let Viewer::Player(me) = self.viewer
            && !self.players.contains_key(&me)
        {
            self.status = ProjectionStatus::Removed;
        }
        if view.session.status == SessionStatus::Closed {
            self.status = ProjectionStatus::Closed;
        }
        self.grid = view.grid;
        self.session = Some(view.session);
    }

    /// Apply a bus notification.
    pub fn apply(&mut self, notification: &Notification) -> ApplyOutcome {
        if self.is_terminal() {
            return ApplyOutcome::Ignored;
        }

        let outcome = match notification {
            Notification::SessionUpdated(snapshot) => self.apply_session(snapshot),
            Notification::PlayerJoined(player) => self.apply_joined(player),
            Notification::PlayerUpdated(player) => self.apply_player(player),
            Notification::PlayerRemoved { player_id } => self.apply_removed(*player_id),
            Notification::GridUpdated(grid) => self.apply_grid(grid),
            Notification::SessionClosed { session_id } => self.apply_closed(*session_id),
        };

        if outcome == ApplyOutcome::Stale {
            trace!(event = notification.event_name(), "discarding stale notification");
        }
        outcome
    }

    /// Apply a message addressed to this device.
    pub fn apply_direct(&mut self, message: &DirectMessage) -> ApplyOutcome {
        if self.is_terminal() {
            return ApplyOutcome::Ignored;
        }
        match message {
            DirectMessage::Kicked { player_id } if self.viewer == Viewer::Player(*player_id) => {
                self.status = ProjectionStatus::Removed;
                ApplyOutcome::Applied
            }
            DirectMessage::Kicked { .. } => ApplyOutcome::Ignored,
            DirectMessage::SessionClosed { session_id } => self.apply_closed(*session_id),
        }
    }

    fn apply_session(&mut self, incoming: &SessionSnapshot) -> ApplyOutcome {
        if let Some(current) = &self.session {
            if current.id != incoming.id {
                return ApplyOutcome::Ignored;
            }
            if progress(incoming) <= progress(current) {
                return ApplyOutcome::Stale;
            }
        }
        if incoming.status == SessionStatus::Closed {
            self.status = ProjectionStatus::Closed;
        }
        self.session = Some(incoming.clone());
        ApplyOutcome::Applied
    }

    fn apply_joined(&mut self, player: &PlayerSummary) -> ApplyOutcome {
        if self.removed.contains(&player.id) {
            return ApplyOutcome::Stale;
        }
        if self.players.contains_key(&player.id) {
            return ApplyOutcome::Stale;
        }
        self.players.insert(player.id, player.clone());
        self.sync_player_count();
        ApplyOutcome::Applied
    }

    fn apply_player(&mut self, player: &PlayerSummary) -> ApplyOutcome {
        if let Viewer::Player(me) = self.viewer
            && me != player.id
        {
            return ApplyOutcome::Ignored;
        }
        if self.removed.contains(&player.id) {
            return ApplyOutcome::Stale;
        }
        match self.players.get_mut(&player.id) {
            Some(current)
                if *current == *player
                    || player.answered_questions.len() < current.answered_questions.len() =>
            {
                ApplyOutcome::Stale
            }
            Some(current) => {
                *current = player.clone();
                ApplyOutcome::Applied
            }
            None => {
                self.players.insert(player.id, player.clone());
                self.sync_player_count();
                ApplyOutcome::Applied
            }
        }
    }

    fn apply_removed(&mut self, player_id: Uuid) -> ApplyOutcome {
        if !self.removed.insert(player_id) {
            return ApplyOutcome::Stale;
        }
        self.players.shift_remove(&player_id);
        self.sync_player_count();
        if self.viewer == Viewer::Player(player_id) {
            self.status = ProjectionStatus::Removed;
        }
        ApplyOutcome::Applied
    }

    fn apply_grid(&mut self, incoming: &GridSnapshot) -> ApplyOutcome {
        if let Some(current) = &self.grid
            && incoming.revision <= current.revision
        {
            return ApplyOutcome::Stale;
        }
        self.grid = Some(incoming.clone());
        ApplyOutcome::Applied
    }

    fn apply_closed(&mut self, session_id: Uuid) -> ApplyOutcome {
        match &self.session {
            Some(current) if current.id != session_id => ApplyOutcome::Ignored,
            _ => {
                self.status = ProjectionStatus::Closed;
                ApplyOutcome::Applied
            }
        }
    }

    fn sync_player_count(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.player_count = self.players.len();
        }
    }

    /// Viewer of this projection.
    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    /// Latest session snapshot.
    pub fn session(&self) -> Option<&SessionSnapshot> {
        self.session.as_ref()
    }

    /// Known players in join order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerSummary> {
        self.players.values()
    }

    /// The viewing player, if this is a player projection.
    pub fn me(&self) -> Option<&PlayerSummary> {
        match self.viewer {
            Viewer::Player(me) => self.players.get(&me),
            Viewer::Host => None,
        }
    }

    /// Latest grid snapshot.
    pub fn grid(&self) -> Option<&GridSnapshot> {
        self.grid.as_ref()
    }

    /// Connection state.
    pub fn status(&self) -> ProjectionStatus {
        self.status
    }

    /// Whether the projection stopped following the session.
    pub fn is_terminal(&self) -> bool {
        self.status != ProjectionStatus::Connected
    }

    /// Number of known players who answered question `index`.
    pub fn answered_count(&self, index: usize) -> usize {
        self.players
            .values()
            .filter(|player| player.answered_questions.contains(&index))
            .count()
    }

    /// Time left to answer, derived from the absolute start of the answering window.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        let session = self.session.as_ref()?;
        if session.question_step != Some(QuestionStep::Answering) {
            return None;
        }
        let deadline = session.question_started_at? + session.timer_duration?;
        Some(deadline.duration_since(now).unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scoring::GridScoreMode,
        state::session::{GameMode, SessionConfig},
    };

    fn snapshot(
        id: Uuid,
        status: SessionStatus,
        index: i64,
        step: Option<QuestionStep>,
        version: u64,
    ) -> SessionSnapshot {
        SessionSnapshot {
            id,
            join_code: "123456".into(),
            status,
            game_mode: GameMode::Live,
            current_question_index: index,
            question_step: step,
            question_count: 5,
            question_started_at: None,
            timer_duration: None,
            question: None,
            player_count: 0,
            version,
        }
    }

    fn player(id: Uuid, answered: Vec<usize>, score: i64) -> PlayerSummary {
        PlayerSummary {
            id,
            display_name: "Ada".into(),
            score,
            answered_questions: answered,
        }
    }

    fn view(session: SessionSnapshot, players: Vec<PlayerSummary>) -> SessionView {
        SessionView {
            session,
            quiz_title: "Quiz".into(),
            config: SessionConfig::default(),
            players,
            grid: None,
            questions: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn grid(revision: u64) -> GridSnapshot {
        GridSnapshot {
            revision,
            columns: 2,
            score_mode: GridScoreMode::Flat,
            cells: Vec::new(),
            teams: Vec::new(),
            current_turn: 0,
            open_cell: None,
            open_question: None,
            completed_cells: 0,
        }
    }

    #[test]
    fn question_index_never_moves_backwards() {
        let id = Uuid::new_v4();
        let mut projection = SessionProjection::for_host();
        projection.seed(view(
            snapshot(id, SessionStatus::Active, 3, Some(QuestionStep::Answering), 7),
            Vec::new(),
        ));

        let older = snapshot(id, SessionStatus::Active, 2, Some(QuestionStep::Revealed), 6);
        assert_eq!(
            projection.apply(&Notification::SessionUpdated(older)),
            ApplyOutcome::Stale
        );
        assert_eq!(projection.session().unwrap().current_question_index, 3);

        let newer = snapshot(id, SessionStatus::Active, 3, Some(QuestionStep::Revealed), 8);
        assert_eq!(
            projection.apply(&Notification::SessionUpdated(newer.clone())),
            ApplyOutcome::Applied
        );
        assert_eq!(
            projection.apply(&Notification::SessionUpdated(newer)),
            ApplyOutcome::Stale
        );
    }

    #[test]
    fn buffered_deltas_older_than_the_seed_are_discarded() {
        let id = Uuid::new_v4();
        let mut projection = SessionProjection::for_host();
        projection.seed(view(
            snapshot(id, SessionStatus::Finished, -1, None, 9),
            Vec::new(),
        ));
        let late = snapshot(id, SessionStatus::Active, 4, Some(QuestionStep::Revealed), 8);
        assert_eq!(
            projection.apply(&Notification::SessionUpdated(late)),
            ApplyOutcome::Stale
        );
        assert_eq!(projection.session().unwrap().status, SessionStatus::Finished);
    }

    #[test]
    fn removed_players_are_not_resurrected() {
        let id = Uuid::new_v4();
        let ada = Uuid::new_v4();
        let mut projection = SessionProjection::for_host();
        projection.seed(view(
            snapshot(id, SessionStatus::Lobby, -1, None, 0),
            vec![player(ada, vec![], 0)],
        ));

        assert_eq!(
            projection.apply(&Notification::PlayerRemoved { player_id: ada }),
            ApplyOutcome::Applied
        );
        assert_eq!(
            projection.apply(&Notification::PlayerJoined(player(ada, vec![], 0))),
            ApplyOutcome::Stale
        );
        assert_eq!(projection.players().count(), 0);
        assert_eq!(projection.session().unwrap().player_count, 0);
    }

    #[test]
    fn player_projection_ignores_other_players_updates() {
        let id = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut projection = SessionProjection::for_player(me);
        projection.seed(view(
            snapshot(id, SessionStatus::Active, 0, Some(QuestionStep::Answering), 1),
            vec![player(me, vec![], 0), player(other, vec![], 0)],
        ));

        assert_eq!(
            projection.apply(&Notification::PlayerUpdated(player(other, vec![0], 900))),
            ApplyOutcome::Ignored
        );
        assert_eq!(
            projection.apply(&Notification::PlayerUpdated(player(me, vec![0], 800))),
            ApplyOutcome::Applied
        );
        assert_eq!(projection.me().unwrap().score, 800);
        assert_eq!(
            projection.apply(&Notification::PlayerUpdated(player(me, vec![], 0))),
            ApplyOutcome::Stale
        );
    }

    #[test]
    fn host_counts_answers_per_question() {
        let id = Uuid::new_v4();
        let mut projection = SessionProjection::for_host();
        projection.seed(view(
            snapshot(id, SessionStatus::Active, 1, Some(QuestionStep::Answering), 3),
            vec![
                player(Uuid::new_v4(), vec![0, 1], 10),
                player(Uuid::new_v4(), vec![0], 5),
            ],
        ));
        assert_eq!(projection.answered_count(0), 2);
        assert_eq!(projection.answered_count(1), 1);
    }

    #[test]
    fn kick_is_terminal_through_either_path() {
        let id = Uuid::new_v4();
        let me = Uuid::new_v4();

        let mut direct = SessionProjection::for_player(me);
        direct.seed(view(
            snapshot(id, SessionStatus::Lobby, -1, None, 0),
            vec![player(me, vec![], 0)],
        ));
        assert_eq!(
            direct.apply_direct(&DirectMessage::Kicked { player_id: me }),
            ApplyOutcome::Applied
        );
        assert_eq!(direct.status(), ProjectionStatus::Removed);
        assert_eq!(
            direct.apply(&Notification::PlayerRemoved { player_id: me }),
            ApplyOutcome::Ignored
        );

        let mut broadcast = SessionProjection::for_player(me);
        broadcast.seed(view(
            snapshot(id, SessionStatus::Lobby, -1, None, 0),
            vec![player(me, vec![], 0)],
        ));
        broadcast.apply(&Notification::PlayerRemoved { player_id: me });
        assert_eq!(broadcast.status(), ProjectionStatus::Removed);
    }

    #[test]
    fn seeding_without_the_viewer_marks_it_removed() {
        let mut projection = SessionProjection::for_player(Uuid::new_v4());
        projection.seed(view(
            snapshot(Uuid::new_v4(), SessionStatus::Lobby, -1, None, 0),
            Vec::new(),
        ));
        assert!(projection.is_terminal());
    }

    #[test]
    fn grid_revisions_are_monotonic() {
        let mut projection = SessionProjection::for_host();
        assert_eq!(
            projection.apply(&Notification::GridUpdated(grid(2))),
            ApplyOutcome::Applied
        );
        assert_eq!(
            projection.apply(&Notification::GridUpdated(grid(1))),
            ApplyOutcome::Stale
        );
        assert_eq!(projection.grid().unwrap().revision, 2);
    }

    #[test]
    fn remaining_time_is_derived_from_the_start_timestamp() {
        let id = Uuid::new_v4();
        let started = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut session = snapshot(id, SessionStatus::Active, 0, Some(QuestionStep::Answering), 1);
        session.question_started_at = Some(started);
        session.timer_duration = Some(Duration::from_secs(30));

        let mut projection = SessionProjection::for_host();
        projection.seed(view(session, Vec::new()));

        assert_eq!(
            projection.remaining(started + Duration::from_secs(10)),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            projection.remaining(started + Duration::from_secs(45)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn close_is_terminal() {
        let id = Uuid::new_v4();
        let mut projection = SessionProjection::for_host();
        projection.seed(view(
            snapshot(id, SessionStatus::Finished, -1, None, 4),
            Vec::new(),
        ));
        assert_eq!(
            projection.apply(&Notification::SessionClosed { session_id: id }),
            ApplyOutcome::Applied
        );
        assert_eq!(projection.status(), ProjectionStatus::Closed);
        assert_eq!(
            projection.apply(&Notification::SessionUpdated(snapshot(
                id,
                SessionStatus::Closed,
                -1,
                None,
                5
            ))),
            ApplyOutcome::Ignored
        );
    }
}
