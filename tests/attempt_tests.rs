// tests/attempt_tests.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use practice_quiz::{
    attempt::{AttemptFlow, AttemptPhase, ManualClock, SubmitCheck, SubmitOutcome, SubmitTrigger, TimerEvent},
    error::AppError,
    handlers::catalog,
    state::AppState,
};
use tokio::sync::mpsc;

async fn student_setup() -> (MockBackend, AppState, Arc<ManualClock>) {
    let backend = spawn_app().await;
    let clock = Arc::new(ManualClock::new(t0()));
    let state = test_state(&backend, clock.clone()).await;
    login_as(&state, "mai").await;
    (backend, state, clock)
}

async fn open(state: &AppState, quiz_id: i64) -> AttemptFlow {
    let quiz = catalog::fetch_quiz(state, quiz_id).await.expect("Quiz lookup failed");
    AttemptFlow::new(quiz, state.attempt_deps())
}

async fn loaded(state: &AppState, quiz_id: i64) -> AttemptFlow {
    let flow = open(state, quiz_id).await;
    flow.load().await.expect("Failed to load attempt");
    flow
}

async fn wait_for_phase(flow: &AttemptFlow, phase: AttemptPhase) {
    let mut rx = flow.subscribe_phase();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|p| *p == phase))
        .await
        .expect("Timed out waiting for phase")
        .expect("Phase channel closed");
}

#[tokio::test]
async fn attempt_requires_login() {
    let backend = spawn_app().await;
    let state = test_state(&backend, Arc::new(ManualClock::new(t0()))).await;

    let flow = open(&state, OPTICS_QUIZ).await;
    let err = flow.load().await.unwrap_err();

    assert!(matches!(err, AppError::AuthError(_)));
    assert!(backend.requests_to("/odata/Question").is_empty());
}

#[tokio::test]
async fn quiz_without_questions_is_not_found() {
    let (_backend, state, _clock) = student_setup().await;

    let flow = open(&state, EMPTY_QUIZ).await;
    let err = flow.load().await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)), "got {:?}", err);
    assert_eq!(flow.phase(), AttemptPhase::Loading);
    assert!(state.deadlines.get(EMPTY_QUIZ).await.unwrap().is_none());
}

#[tokio::test]
async fn inactive_questions_and_options_are_hidden() {
    let (backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    let view = flow.view().unwrap();
    assert_eq!(view.count, 5);
    assert_eq!(view.question.question_id, 11);
    assert_eq!(view.question.options.len(), 3);
    assert_eq!(view.timer.remaining, 600);
    assert_eq!(flow.phase(), AttemptPhase::InProgress);

    let fetches = backend.requests_to("/odata/Question");
    assert_eq!(fetches.len(), 1);
    assert!(fetches[0].contains("QuizId%20eq%201"), "{}", fetches[0]);
}

#[tokio::test]
async fn navigation_stays_in_bounds() {
    let (_backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    assert!(!flow.previous().unwrap());
    assert_eq!(flow.view().unwrap().index, 0);

    for _ in 0..4 {
        assert!(flow.next().unwrap());
    }
    assert!(!flow.next().unwrap());
    assert_eq!(flow.view().unwrap().index, 4);

    assert!(!flow.jump_to(5).unwrap());
    assert_eq!(flow.view().unwrap().index, 4);
    assert!(flow.jump_to(1).unwrap());
    assert_eq!(flow.view().unwrap().question.question_id, 12);
}

#[tokio::test]
async fn reanswer_replaces_previous_choice() {
    let (_backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    flow.select_current(0).unwrap();
    flow.select_current(2).unwrap();

    let view = flow.view().unwrap();
    assert_eq!(view.selected, Some(113));
    assert_eq!(view.progress.answered, 1);
    assert_eq!(view.marks[0], (true, false));

    let err = flow.select_answer(99, 991).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn progress_is_bounded_and_stars_do_not_count() {
    let (_backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    assert!(flow.toggle_star_current().unwrap());
    for round in 0..2 {
        for i in 0..5 {
            flow.jump_to(i).unwrap();
            flow.select_current(round).unwrap();
            let progress = flow.progress().unwrap();
            assert!(progress.answered <= progress.total);
        }
    }

    let view = flow.view().unwrap();
    assert_eq!(view.progress.answered, 5);
    assert_eq!(view.progress.total, 5);
    assert_eq!(view.marks[0], (true, true));
    assert_eq!(flow.check_submit(), SubmitCheck::Ready);
}

#[tokio::test]
async fn remaining_hits_zero_at_deadline_and_never_increases() {
    let (_backend, state, clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    clock.advance(chrono::Duration::seconds(100));
    assert_eq!(flow.view().unwrap().timer.remaining, 500);

    // Wall clock stepping backwards does not give time back.
    clock.set(t0() + chrono::Duration::seconds(50));
    assert_eq!(flow.view().unwrap().timer.remaining, 500);

    clock.set(t0() + chrono::Duration::seconds(600));
    let timer = flow.view().unwrap().timer;
    assert_eq!(timer.remaining, 0);
    assert_eq!(timer.elapsed, 600);
}

#[tokio::test]
async fn reopening_resumes_the_same_deadline() {
    let (_backend, state, clock) = student_setup().await;

    let first = loaded(&state, OPTICS_QUIZ).await;
    clock.advance(chrono::Duration::seconds(30));
    // Closing without leaving (crash, tab closed) keeps the start time.
    drop(first);

    let second = loaded(&state, OPTICS_QUIZ).await;
    assert_eq!(second.view().unwrap().timer.remaining, 570);
    assert_eq!(state.deadlines.get(OPTICS_QUIZ).await.unwrap(), Some(t0()));

    // An explicit leave forgets it, so the next attempt starts fresh.
    second.leave().await.unwrap();
    assert!(state.deadlines.get(OPTICS_QUIZ).await.unwrap().is_none());

    let third = loaded(&state, OPTICS_QUIZ).await;
    assert_eq!(third.view().unwrap().timer.remaining, 600);
}

#[tokio::test]
async fn unanswered_questions_need_confirmation() {
    let (backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    for i in 0..3 {
        flow.jump_to(i).unwrap();
        flow.select_current(0).unwrap();
    }

    assert_eq!(flow.check_submit(), SubmitCheck::NeedsConfirmation { unanswered: 2 });
    let outcome = flow.submit(SubmitTrigger::Manual { confirmed: false }).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::NeedsConfirmation { unanswered: 2 }));
    assert_eq!(backend.submit_count(), 0);
    assert_eq!(flow.phase(), AttemptPhase::InProgress);

    let outcome = flow.submit(SubmitTrigger::Manual { confirmed: true }).await.unwrap();
    let SubmitOutcome::Submitted(result) = outcome else {
        panic!("expected a result");
    };
    assert_eq!(result.score, 60.0);
    assert_eq!(flow.phase(), AttemptPhase::Submitted);
    assert_eq!(flow.result().unwrap().result_id, result.result_id);

    let payload = backend.db().submissions[0].clone();
    assert_eq!(payload["studentId"], STUDENT_ID);
    assert_eq!(payload["quizId"], OPTICS_QUIZ);
    let answers = payload["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0]["questionId"], 11);
    assert_eq!(answers[0]["answerContent"], "Q11 option 1");
    assert_eq!(answers[2]["createdBy"], STUDENT_ID);

    assert!(state.deadlines.get(OPTICS_QUIZ).await.unwrap().is_none());
}

#[tokio::test]
async fn second_submit_is_rejected_while_in_flight() {
    let (backend, state, _clock) = student_setup().await;
    backend.db().submit_delay = Some(Duration::from_millis(300));
    let flow = loaded(&state, SHORT_QUIZ).await;

    let first = tokio::spawn({
        let flow = flow.clone();
        async move { flow.submit(SubmitTrigger::Manual { confirmed: true }).await }
    });
    wait_for_phase(&flow, AttemptPhase::Submitting).await;

    let manual = flow.submit(SubmitTrigger::Manual { confirmed: true }).await;
    let timeout = flow.submit(SubmitTrigger::Timeout).await;
    assert!(matches!(manual, Err(AppError::SubmissionInFlight)));
    assert!(matches!(timeout, Err(AppError::SubmissionInFlight)));
    assert!(matches!(flow.select_current(0), Err(AppError::SubmissionInFlight)));

    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));

    let again = flow.submit(SubmitTrigger::Manual { confirmed: true }).await;
    assert!(matches!(again, Err(AppError::SubmissionInFlight)));
    assert_eq!(backend.submit_count(), 1);
}

#[tokio::test]
async fn timeout_submits_empty_answers_and_clears_start() {
    let (backend, state, clock) = student_setup().await;
    let flow = loaded(&state, SHORT_QUIZ).await;
    assert!(state.deadlines.get(SHORT_QUIZ).await.unwrap().is_some());

    let (tx, mut rx) = mpsc::unbounded_channel();
    flow.start_timer(Duration::from_millis(5), Some(tx));
    clock.advance(chrono::Duration::seconds(60));

    wait_for_phase(&flow, AttemptPhase::Submitted).await;

    assert_eq!(backend.submit_count(), 1);
    let payload = backend.db().submissions[0].clone();
    assert_eq!(payload["answers"], serde_json::json!([]));
    assert!(state.deadlines.get(SHORT_QUIZ).await.unwrap().is_none());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.last(), Some(&TimerEvent::Expired));
    assert!(events.iter().any(|e| matches!(e, TimerEvent::Tick { remaining: 0, .. })));
}

#[tokio::test]
async fn expired_timer_never_asks_for_confirmation() {
    let (_backend, state, clock) = student_setup().await;
    let flow = loaded(&state, SHORT_QUIZ).await;

    assert_eq!(flow.check_submit(), SubmitCheck::NeedsConfirmation { unanswered: 2 });
    clock.advance(chrono::Duration::seconds(61));
    assert_eq!(flow.check_submit(), SubmitCheck::Ready);
}

#[tokio::test]
async fn failed_submission_keeps_answers_and_allows_retry() {
    let (backend, state, _clock) = student_setup().await;
    backend.db().fail_submit = true;
    let flow = loaded(&state, SHORT_QUIZ).await;
    flow.select_current(1).unwrap();

    let err = flow.submit(SubmitTrigger::Manual { confirmed: true }).await.unwrap_err();
    assert!(matches!(err, AppError::Server { status: 500, .. }), "got {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(flow.phase(), AttemptPhase::InProgress);
    assert!(flow.last_error().unwrap().contains("Database unavailable"));
    assert_eq!(flow.progress().unwrap().answered, 1);
    assert!(state.deadlines.get(SHORT_QUIZ).await.unwrap().is_some());

    backend.db().fail_submit = false;
    let outcome = flow.submit(SubmitTrigger::Manual { confirmed: true }).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert!(flow.last_error().is_none());
    assert_eq!(backend.submit_count(), 2);
}

#[tokio::test]
async fn two_instances_share_one_deadline() {
    let (backend, state, clock) = student_setup().await;
    let sibling = sibling_state(&state, clock.clone()).await;

    let a = loaded(&state, OPTICS_QUIZ).await;
    clock.advance(chrono::Duration::seconds(20));
    let b = loaded(&sibling, OPTICS_QUIZ).await;

    assert_eq!(a.view().unwrap().timer.remaining, 580);
    assert_eq!(b.view().unwrap().timer.remaining, 580);

    a.submit(SubmitTrigger::Manual { confirmed: true }).await.unwrap();
    assert!(state.deadlines.get(OPTICS_QUIZ).await.unwrap().is_none());

    // The other instance still submits on its own; its clear is a no-op.
    b.submit(SubmitTrigger::Manual { confirmed: true }).await.unwrap();
    assert_eq!(backend.submit_count(), 2);
    assert_eq!(b.phase(), AttemptPhase::Submitted);
}

#[tokio::test]
async fn dropping_the_flow_stops_the_ticker() {
    let (_backend, state, _clock) = student_setup().await;
    let flow = loaded(&state, OPTICS_QUIZ).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    flow.start_timer(Duration::from_millis(5), Some(tx));
    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert!(matches!(first, Some(TimerEvent::Tick { remaining: 600, .. })));

    drop(flow);

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "ticker kept running after the attempt was dropped");
}

#[tokio::test]
async fn unauthorized_response_ends_the_session() {
    let (backend, state, _clock) = student_setup().await;
    let flow = open(&state, OPTICS_QUIZ).await;
    backend.db().reject_tokens = true;

    let err = flow.load().await.unwrap_err();

    assert!(err.redirects_to_login(), "got {:?}", err);
    assert!(!state.session.is_authenticated());
    assert!(state.deadlines.get(OPTICS_QUIZ).await.unwrap().is_none());
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for condition");
}

#[tokio::test]
async fn failed_auto_submit_keeps_answers_and_allows_retry() {
    let (backend, state, clock) = student_setup().await;
    backend.db().fail_submit = true;
    let flow = loaded(&state, SHORT_QUIZ).await;
    flow.select_current(0).unwrap();

    flow.start_timer(Duration::from_millis(5), None);
    clock.advance(chrono::Duration::seconds(61));
    wait_until(|| backend.submit_count() == 1 && flow.last_error().is_some()).await;

    assert_eq!(flow.phase(), AttemptPhase::InProgress);
    assert!(flow.last_error().unwrap().contains("Database unavailable"));
    assert_eq!(flow.progress().unwrap().answered, 1);
    assert_eq!(state.deadlines.get(SHORT_QUIZ).await.unwrap(), Some(t0()));

    backend.db().fail_submit = false;
    let outcome = flow.submit(SubmitTrigger::Timeout).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert_eq!(flow.phase(), AttemptPhase::Submitted);
    assert_eq!(backend.submit_count(), 2);
    let payload = backend.db().submissions[1].clone();
    assert_eq!(payload["answers"].as_array().unwrap().len(), 1);
    assert!(state.deadlines.get(SHORT_QUIZ).await.unwrap().is_none());
}

#[tokio::test]
async fn fresh_start_is_not_reported_as_resumed() {
    let backend = spawn_app().await;
    // Sub-millisecond part that the store does not keep.
    let clock = Arc::new(ManualClock::new(t0() + chrono::Duration::nanoseconds(123_456_789)));
    let state = test_state(&backend, clock.clone()).await;
    login_as(&state, "mai").await;

    let first = loaded(&state, OPTICS_QUIZ).await;
    assert!(!first.is_resumed());

    clock.advance(chrono::Duration::seconds(5));
    let sibling = sibling_state(&state, clock.clone()).await;
    let second = loaded(&sibling, OPTICS_QUIZ).await;
    assert!(second.is_resumed());
}

#[tokio::test]
async fn duplicate_questions_are_asked_once() {
    let (backend, state, _clock) = student_setup().await;
    {
        let mut db = backend.db();
        let copy = db
            .questions
            .iter()
            .find(|q| q["QuestionId"] == 21)
            .cloned()
            .unwrap();
        db.questions.push(copy);
    }

    let flow = loaded(&state, SHORT_QUIZ).await;
    assert_eq!(flow.view().unwrap().count, 2);
    assert_eq!(flow.progress().unwrap().total, 2);

    flow.select_current(0).unwrap();
    flow.next().unwrap();
    flow.select_current(0).unwrap();

    assert_eq!(flow.check_submit(), SubmitCheck::Ready);
    let outcome = flow.submit(SubmitTrigger::Manual { confirmed: false }).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
}
