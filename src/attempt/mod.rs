// src/attempt/mod.rs

//! Timed quiz attempt: question fetch, countdown, navigation, answers and
//! exactly-once submission.

pub mod navigator;
pub mod submission;
pub mod timer;
pub mod tracker;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::{
    error::AppError,
    models::{
        question::AttemptQuestion,
        quiz::Quiz,
        result::QuizResult,
        status::EntityStatus,
    },
    session::SessionContext,
    store::DeadlineStore,
};

pub use navigator::Navigator;
pub use submission::{QuizApi, build_payload};
pub use timer::{Clock, Countdown, ManualClock, SystemClock, TimerEvent, TimerHandle, TimerReading};
pub use tracker::{AnswerTracker, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Loading,
    InProgress,
    Submitting,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The student pressed submit. `confirmed` acknowledges unanswered questions.
    Manual { confirmed: bool },
    /// The countdown reached zero. Never asks for confirmation.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCheck {
    Ready,
    NeedsConfirmation { unanswered: usize },
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Submitted(QuizResult),
    /// Nothing was sent; ask the student and retry with `confirmed: true`.
    NeedsConfirmation { unanswered: usize },
}

/// Everything the attempt needs from the outside world.
#[derive(Clone)]
pub struct AttemptDeps {
    pub api: Arc<dyn QuizApi>,
    pub store: Arc<dyn DeadlineStore>,
    pub session: SessionContext,
    pub clock: Arc<dyn Clock>,
}

/// Read-only snapshot for rendering.
#[derive(Debug, Clone)]
pub struct AttemptView {
    pub phase: AttemptPhase,
    pub index: usize,
    pub count: usize,
    pub question: AttemptQuestion,
    pub selected: Option<i64>,
    pub progress: Progress,
    pub timer: TimerReading,
    /// `(answered, starred)` per question, in order, for the navigation list.
    pub marks: Vec<(bool, bool)>,
    pub last_error: Option<String>,
}

struct Loaded {
    questions: Vec<AttemptQuestion>,
    navigator: Navigator,
    tracker: AnswerTracker,
    countdown: Countdown,
    resumed: bool,
}

struct AttemptState {
    phase: AttemptPhase,
    loaded: Option<Loaded>,
    result: Option<QuizResult>,
    last_error: Option<String>,
}

struct Inner {
    quiz: Quiz,
    deps: AttemptDeps,
    state: Mutex<AttemptState>,
    phase_tx: watch::Sender<AttemptPhase>,
    ticker: Mutex<Option<TimerHandle>>,
}

/// Shared handle to one attempt. Clones refer to the same attempt; dropping
/// the last clone cancels the countdown ticker.
#[derive(Clone)]
pub struct AttemptFlow {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl AttemptFlow {
    pub fn new(quiz: Quiz, deps: AttemptDeps) -> Self {
        let (phase_tx, _) = watch::channel(AttemptPhase::Loading);
        Self {
            inner: Arc::new(Inner {
                quiz,
                deps,
                state: Mutex::new(AttemptState {
                    phase: AttemptPhase::Loading,
                    loaded: None,
                    result: None,
                    last_error: None,
                }),
                phase_tx,
                ticker: Mutex::new(None),
            }),
        }
    }

    pub fn quiz(&self) -> &Quiz {
        &self.inner.quiz
    }

    pub fn phase(&self) -> AttemptPhase {
        lock(&self.inner.state).phase
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<AttemptPhase> {
        self.inner.phase_tx.subscribe()
    }

    pub fn result(&self) -> Option<QuizResult> {
        lock(&self.inner.state).result.clone()
    }

    /// Whether `load` picked up a start time recorded earlier.
    pub fn is_resumed(&self) -> bool {
        lock(&self.inner.state)
            .loaded
            .as_ref()
            .is_some_and(|l| l.resumed)
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.state).last_error.clone()
    }

    fn set_phase(&self, state: &mut AttemptState, phase: AttemptPhase) {
        state.phase = phase;
        self.inner.phase_tx.send_replace(phase);
    }

    fn require_student(&self) -> Result<i64, AppError> {
        let session = &self.inner.deps.session;
        match (session.token(), session.user_id()) {
            (Some(_), Some(user_id)) => Ok(user_id),
            _ => Err(AppError::AuthError(
                "Please login to take the quiz".to_string(),
            )),
        }
    }

    /// Fetches the questions and establishes the start time.
    ///
    /// The start time comes from the deadline store when an attempt at this
    /// quiz is already running, so reopening resumes the same deadline.
    /// An empty question set is `NotFound` and leaves nothing in the store.
    pub async fn load(&self) -> Result<(), AppError> {
        self.require_student()?;
        if self.phase() != AttemptPhase::Loading {
            return Ok(());
        }

        let quiz_id = self.inner.quiz.quiz_id;
        let fetched = self.inner.deps.api.fetch_questions(quiz_id).await.map_err(|e| {
            tracing::error!("Failed to fetch questions for quiz {}: {:?}", quiz_id, e);
            e
        })?;

        // A question listed twice is asked once.
        let mut seen = HashSet::new();
        let questions: Vec<AttemptQuestion> = fetched
            .iter()
            .filter(|q| q.quiz_id == quiz_id && q.status == EntityStatus::Active)
            .filter(|q| seen.insert(q.question_id))
            .map(|q| q.for_attempt())
            .collect();

        let Some(navigator) = Navigator::new(questions.len()) else {
            return Err(AppError::NotFound(
                "No questions available for this quiz".to_string(),
            ));
        };

        let now = self.inner.deps.clock.now();
        let started_at = self.inner.deps.store.put(quiz_id, now).await?;
        // The store keeps millisecond precision.
        let resumed = started_at.timestamp_millis() != now.timestamp_millis();
        if resumed {
            tracing::info!("Resuming attempt at quiz {} started {}", quiz_id, started_at);
        } else {
            tracing::info!("Starting attempt at quiz {}", quiz_id);
        }

        let tracker = AnswerTracker::new(questions.iter().map(|q| q.question_id));
        let countdown = Countdown::new(started_at, self.inner.quiz.duration_secs());

        let mut state = lock(&self.inner.state);
        state.loaded = Some(Loaded {
            questions,
            navigator,
            tracker,
            countdown,
            resumed,
        });
        self.set_phase(&mut state, AttemptPhase::InProgress);
        Ok(())
    }

    /// Starts the countdown ticker. Ticks go to `events` when given; reaching
    /// zero submits with `SubmitTrigger::Timeout`. Replaces a previous ticker.
    pub fn start_timer(&self, period: Duration, events: Option<mpsc::UnboundedSender<TimerEvent>>) {
        let weak_sample: Weak<Inner> = Arc::downgrade(&self.inner);
        let weak_expire = weak_sample.clone();

        let handle = timer::spawn_ticker(
            period,
            move || {
                let inner = weak_sample.upgrade()?;
                let now = inner.deps.clock.now();
                let mut state = lock(&inner.state);
                if state.phase == AttemptPhase::Submitted {
                    return None;
                }
                let reading = state.loaded.as_mut().map(|l| l.countdown.reading(now));
                reading
            },
            events,
            move || async move {
                let Some(inner) = weak_expire.upgrade() else {
                    return;
                };
                let flow = AttemptFlow { inner };
                // Detached so the submission runs to completion even if the
                // attempt is torn down meanwhile.
                tokio::spawn(async move {
                    match flow.submit(SubmitTrigger::Timeout).await {
                        Ok(_) => tracing::info!("Auto-submitted quiz {}", flow.quiz().quiz_id),
                        Err(AppError::SubmissionInFlight) => {
                            tracing::debug!("Auto-submit skipped, submission already running")
                        }
                        Err(e) => tracing::error!("Auto-submit failed: {:?}", e),
                    }
                });
            },
        );

        *lock(&self.inner.ticker) = Some(handle);
    }

    pub fn stop_timer(&self) {
        lock(&self.inner.ticker).take();
    }

    fn with_loaded<T>(
        &self,
        f: impl FnOnce(&mut Loaded) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut state = lock(&self.inner.state);
        match state.phase {
            AttemptPhase::InProgress => {}
            AttemptPhase::Loading => {
                return Err(AppError::BadRequest("Quiz is still loading".to_string()));
            }
            AttemptPhase::Submitting | AttemptPhase::Submitted => {
                return Err(AppError::SubmissionInFlight);
            }
        }
        let loaded = state
            .loaded
            .as_mut()
            .ok_or_else(|| AppError::InternalError("Attempt state missing".to_string()))?;
        f(loaded)
    }

    pub fn next(&self) -> Result<bool, AppError> {
        self.with_loaded(|l| Ok(l.navigator.next()))
    }

    pub fn previous(&self) -> Result<bool, AppError> {
        self.with_loaded(|l| Ok(l.navigator.previous()))
    }

    pub fn jump_to(&self, index: usize) -> Result<bool, AppError> {
        self.with_loaded(|l| Ok(l.navigator.jump_to(index)))
    }

    pub fn select_answer(&self, question_id: i64, option_id: i64) -> Result<(), AppError> {
        self.with_loaded(|l| l.tracker.set_answer(question_id, option_id).map(|_| ()))
    }

    /// Selects the `choice`-th option (0-based) of the current question.
    pub fn select_current(&self, choice: usize) -> Result<(), AppError> {
        self.with_loaded(|l| {
            let question = &l.questions[l.navigator.index()];
            let option = question.options.get(choice).ok_or_else(|| {
                AppError::BadRequest(format!("Question has no option {}", choice + 1))
            })?;
            l.tracker
                .set_answer(question.question_id, option.option_id)
                .map(|_| ())
        })
    }

    pub fn toggle_star(&self, question_id: i64) -> Result<bool, AppError> {
        self.with_loaded(|l| l.tracker.toggle_star(question_id))
    }

    pub fn toggle_star_current(&self) -> Result<bool, AppError> {
        self.with_loaded(|l| {
            let question_id = l.questions[l.navigator.index()].question_id;
            l.tracker.toggle_star(question_id)
        })
    }

    pub fn progress(&self) -> Option<Progress> {
        lock(&self.inner.state)
            .loaded
            .as_ref()
            .map(|l| l.tracker.progress())
    }

    pub fn view(&self) -> Option<AttemptView> {
        let now = self.inner.deps.clock.now();
        let mut state = lock(&self.inner.state);
        let phase = state.phase;
        let last_error = state.last_error.clone();
        let loaded = state.loaded.as_mut()?;
        let index = loaded.navigator.index();
        let question = loaded.questions[index].clone();
        Some(AttemptView {
            phase,
            index,
            count: loaded.navigator.count(),
            selected: loaded.tracker.answer(question.question_id),
            question,
            progress: loaded.tracker.progress(),
            timer: loaded.countdown.reading(now),
            marks: loaded
                .questions
                .iter()
                .map(|q| {
                    (
                        loaded.tracker.answer(q.question_id).is_some(),
                        loaded.tracker.is_starred(q.question_id),
                    )
                })
                .collect(),
            last_error,
        })
    }

    /// Whether a manual submit would need confirmation right now.
    /// An expired countdown never needs it.
    pub fn check_submit(&self) -> SubmitCheck {
        let now = self.inner.deps.clock.now();
        let state = lock(&self.inner.state);
        match state.loaded.as_ref() {
            Some(l) => {
                let unanswered = l.tracker.unanswered();
                if unanswered > 0 && l.countdown.remaining_at(now) > 0 {
                    SubmitCheck::NeedsConfirmation { unanswered }
                } else {
                    SubmitCheck::Ready
                }
            }
            None => SubmitCheck::Ready,
        }
    }

    /// Submits the attempt at most once.
    ///
    /// The phase moves to `Submitting` under the state lock before the network
    /// call, so any trigger arriving meanwhile (or after success) fails with
    /// `SubmissionInFlight` without touching the network. On failure the
    /// phase returns to `InProgress` with answers intact.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SubmitOutcome, AppError> {
        let student_id = self.require_student()?;
        let quiz_id = self.inner.quiz.quiz_id;

        let payload = {
            let mut state = lock(&self.inner.state);
            match state.phase {
                AttemptPhase::InProgress => {}
                AttemptPhase::Loading => {
                    return Err(AppError::BadRequest("Quiz is still loading".to_string()));
                }
                AttemptPhase::Submitting | AttemptPhase::Submitted => {
                    return Err(AppError::SubmissionInFlight);
                }
            }

            let now = self.inner.deps.clock.now();
            let loaded = state
                .loaded
                .as_ref()
                .ok_or_else(|| AppError::InternalError("Attempt state missing".to_string()))?;

            if let SubmitTrigger::Manual { confirmed: false } = trigger {
                let unanswered = loaded.tracker.unanswered();
                if unanswered > 0 && loaded.countdown.remaining_at(now) > 0 {
                    return Ok(SubmitOutcome::NeedsConfirmation { unanswered });
                }
            }

            let payload = build_payload(quiz_id, student_id, &loaded.questions, &loaded.tracker);
            state.last_error = None;
            self.set_phase(&mut state, AttemptPhase::Submitting);
            payload
        };

        tracing::info!(
            "Submitting quiz {} ({:?}, {} answers)",
            quiz_id,
            trigger,
            payload.answers.len()
        );

        match self.inner.deps.api.submit_attempt(&payload).await {
            Ok(result) => {
                if let Err(e) = self.inner.deps.store.delete(quiz_id).await {
                    tracing::error!("Failed to clear attempt start for quiz {}: {:?}", quiz_id, e);
                }
                {
                    let mut state = lock(&self.inner.state);
                    state.result = Some(result.clone());
                    self.set_phase(&mut state, AttemptPhase::Submitted);
                }
                self.stop_timer();
                Ok(SubmitOutcome::Submitted(result))
            }
            Err(e) => {
                tracing::error!("Failed to submit quiz {}: {:?}", quiz_id, e);
                let mut state = lock(&self.inner.state);
                state.last_error = Some(e.to_string());
                self.set_phase(&mut state, AttemptPhase::InProgress);
                Err(e)
            }
        }
    }

    /// Explicit navigation away: stops the ticker and forgets the start time,
    /// unless a submission is still running.
    pub async fn leave(self) -> Result<(), AppError> {
        self.stop_timer();
        let phase = self.phase();
        if matches!(phase, AttemptPhase::InProgress | AttemptPhase::Loading) {
            let removed = self.inner.deps.store.delete(self.inner.quiz.quiz_id).await?;
            if removed {
                tracing::info!("Left quiz {}, attempt start cleared", self.inner.quiz.quiz_id);
            }
        }
        Ok(())
    }
}
