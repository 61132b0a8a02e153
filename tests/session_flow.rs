//! End-to-end session flows driven through the library API against the in-memory store.

use std::{sync::Arc, time::Duration};

use quiz_session_back::{
    config::AppConfig,
    dao::session_store::MemorySessionStore,
    dto::{
        player::SubmitAnswerRequest,
        session::{
            JoinSessionRequest, LaunchSessionRequest, QuestionInput, QuizInput,
            SessionSettingsInput,
        },
    },
    scoring::{
        CellModifier, GridScoreMode, ScoreMode, ScoringRules, compute_award,
    },
    services::{host_service, player_service, session_service},
    state::{
        AppState, SharedState,
        bus::SessionBus,
        commands::HostCommand,
        grid::GridBoard,
        session::Question,
        state_machine::{ActivePhase, QuestionStep, SessionPhase, SessionStatus},
    },
    sync::{
        follower::SessionFollower,
        projection::{ProjectionStatus, SessionProjection},
    },
};
use uuid::Uuid;

async fn ready_state() -> SharedState {
    let state = AppState::new(AppConfig::default());
    state
        .install_session_store(Arc::new(MemorySessionStore::new()))
        .await;
    state
}

fn quiz(count: usize) -> QuizInput {
    QuizInput {
        title: "General knowledge".into(),
        questions: (0..count)
            .map(|i| QuestionInput {
                prompt: format!("Question {i}"),
                options: vec!["right".into(), "wrong".into(), "also wrong".into()],
                correct_index: 0,
                explanation: None,
            })
            .collect(),
    }
}

async fn launch_with_players(
    state: &SharedState,
    settings: SessionSettingsInput,
    names: &[&str],
) -> (Uuid, Vec<Uuid>) {
    let launch = session_service::launch_session(
        state,
        LaunchSessionRequest {
            host_id: "host-1".into(),
            quiz: quiz(3),
            settings,
        },
    )
    .await
    .unwrap();
    let session_id = launch.session.session.id;
    let join_code = launch.session.session.join_code.clone();

    let mut players = Vec::new();
    for name in names {
        let joined = session_service::join_session(
            state,
            JoinSessionRequest {
                join_code: join_code.clone(),
                display_name: Some((*name).into()),
            },
        )
        .await
        .unwrap();
        players.push(joined.player.id);
    }
    (session_id, players)
}

#[tokio::test]
async fn untimed_flat_round_scores_right_and_wrong_answers() {
    let state = ready_state().await;
    let settings = SessionSettingsInput {
        score_mode: ScoreMode::Simple,
        ..SessionSettingsInput::default()
    };
    let (session_id, players) = launch_with_players(&state, settings, &["Ada", "Bob"]).await;
    let runtime = state.session(session_id).unwrap();

    let started = host_service::run_command(&state, &runtime, HostCommand::Start)
        .await
        .unwrap();
    assert_eq!(started.session.current_question_index, 0);
    assert_eq!(started.session.question_step, Some(QuestionStep::Answering));

    let answer = |option_index| SubmitAnswerRequest {
        question_index: 0,
        option_index,
        confidence: None,
    };
    let right = player_service::submit_answer(&state, session_id, players[0], answer(0))
        .await
        .unwrap();
    let wrong = player_service::submit_answer(&state, session_id, players[1], answer(1))
        .await
        .unwrap();
    assert_eq!(right.score, 1000);
    assert_eq!(wrong.score, 0);

    // Everyone answered, so the question revealed itself; a host reveal is a no-op.
    assert_eq!(
        runtime.phase().await,
        SessionPhase::Active(ActivePhase::Question {
            index: 0,
            step: QuestionStep::Revealed
        })
    );
    let reveal = host_service::run_command(
        &state,
        &runtime,
        HostCommand::Reveal {
            question_index: Some(0),
        },
    )
    .await
    .unwrap();
    assert!(!reveal.applied);

    let board = session_service::leaderboard(&state, session_id).await.unwrap();
    let scores: Vec<(Uuid, i64)> = board
        .entries
        .iter()
        .map(|entry| (entry.player_id, entry.score))
        .collect();
    assert_eq!(scores, vec![(players[0], 1000), (players[1], 0)]);

    for index in 0..3 {
        host_service::run_command(
            &state,
            &runtime,
            HostCommand::Reveal {
                question_index: Some(index),
            },
        )
        .await
        .unwrap();
        host_service::run_command(
            &state,
            &runtime,
            HostCommand::Next {
                question_index: Some(index),
            },
        )
        .await
        .unwrap();
    }
    assert_eq!(runtime.phase().await, SessionPhase::Finished);

    host_service::run_command(&state, &runtime, HostCommand::Close)
        .await
        .unwrap();
    let view = session_service::get_session(&state, session_id).await.unwrap();
    assert_eq!(view.session.status, SessionStatus::Closed);
}

#[test]
fn speed_scoring_three_seconds_before_the_deadline() {
    let question = Question {
        prompt: "Capital of France?".into(),
        options: vec!["Paris".into(), "Lyon".into()],
        correct_index: 0,
        explanation: None,
    };
    let rules = ScoringRules {
        timer: Some(Duration::from_secs(30)),
        score_mode: ScoreMode::Speed,
        wager: None,
    };
    assert_eq!(compute_award(&question, 0, &rules, Some(27_000), None), 190);
    assert_eq!(compute_award(&question, 0, &rules, Some(0), None), 1000);
    assert_eq!(compute_award(&question, 1, &rules, Some(0), None), 0);
}

#[test]
fn wrong_answer_on_a_wagerable_second_row_cell_costs_six_hundred() {
    let mut modifiers = vec![CellModifier::Normal; 12];
    modifiers[8] = CellModifier::Wagerable;
    let mut board = GridBoard::with_modifiers(
        6,
        GridScoreMode::Progressive,
        vec!["Red".into(), "Blue".into()],
        modifiers,
    );

    // Cell 8 sits below cell 2, which must be played first.
    board.resolve(2, true).unwrap();
    let resolution = board.resolve(8, false).unwrap();
    assert_eq!(resolution.team_index, 1);
    assert_eq!(resolution.award, -600);
    assert_eq!(board.teams[1].score, -600);
    assert_eq!(board.current_turn, 0);
}

#[tokio::test]
async fn kicked_player_reaches_removed_without_the_roster_notification() {
    let state = ready_state().await;
    let (session_id, players) =
        launch_with_players(&state, SessionSettingsInput::default(), &["Ada", "Bob"]).await;
    let runtime = state.session(session_id).unwrap();
    host_service::run_command(&state, &runtime, HostCommand::Start)
        .await
        .unwrap();

    let victim = players[1];
    let (_connection_id, direct) = runtime.attach_connection(victim);
    let mut projection = SessionProjection::for_player(victim);
    projection.seed(runtime.view().await);

    // A bus that never delivers stands in for a delayed roster notification.
    let silent_bus = SessionBus::new(4);
    let (follower, view, _updates) =
        SessionFollower::new(projection, silent_bus.subscribe(), direct);
    let follower_task = tokio::spawn(follower.run());

    let kick = host_service::kick_player(&state, &runtime, victim)
        .await
        .unwrap();
    assert!(kick.notified_directly);

    let status = tokio::time::timeout(Duration::from_secs(2), follower_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, ProjectionStatus::Removed);
    assert_eq!(view.borrow().status(), ProjectionStatus::Removed);

    let remaining = session_service::get_session(&state, session_id).await.unwrap();
    assert_eq!(remaining.players.len(), 1);
    drop(silent_bus);
}
