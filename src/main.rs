// src/main.rs

use chrono::Utc;
use practice_quiz::{
    attempt::{AttemptFlow, AttemptPhase, SubmitOutcome, SubmitTrigger, TimerEvent},
    cli::{self, Command},
    config::{Config, LOW_TIME_WARNING_SECS},
    error::AppError,
    handlers::{
        admin::{
            questions::QuestionManager, quizzes::QuizManager, results::ResultManager,
            subjects::SubjectManager, users::UserManager,
        },
        auth,
        catalog::{self, QuizBrowser, SubjectBrowser},
        history::{self, HistoryScreen},
        profile,
    },
    models::{
        result::QuizResult,
        status::Role,
        subject::SubjectForm,
        user::{LoginRequest, RegisterRequest},
    },
    routes::{self, Guard, Route},
    state::AppState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

enum Screen {
    Login,
    Register,
    Home(SubjectBrowser),
    QuizList(QuizBrowser),
    Attempt {
        flow: AttemptFlow,
        confirming: Option<usize>,
    },
    Result(Option<QuizResult>),
    History(HistoryScreen),
    Profile,
    Dashboard,
    Subjects(SubjectManager),
    Quizzes(QuizManager),
    Questions(QuestionManager),
    Users(UserManager),
    Results(ResultManager),
}

/// What a screen command asks the loop to do next.
enum Next {
    Stay,
    Navigate(Route),
    StartQuiz(practice_quiz::models::quiz::Quiz),
}

struct App {
    state: AppState,
    screen: Screen,
    events: mpsc::UnboundedSender<TimerEvent>,
    phase_rx: Option<watch::Receiver<AttemptPhase>>,
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env is read inside)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "practice-quiz.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    // stderr keeps log lines out of the rendered screens on stdout
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("Using backend {}", config.api_base_url);
    let state = match AppState::init(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize local state: {:?}", e);
            eprintln!("{}", cli::render_error(&e));
            std::process::exit(1);
        }
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut app = App {
        state,
        screen: Screen::Login,
        events: events_tx,
        phase_rx: None,
    };

    println!("{}", cli::HELP);
    app.navigate(Route::Home).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !app.handle_line(&line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read input: {:?}", e);
                    break;
                }
            },
            Some(event) = events_rx.recv() => app.on_timer(event),
            Some(phase) = phase_changed(&mut app.phase_rx) => app.on_phase(phase),
        }
    }

    // Quitting keeps an unfinished attempt's start time for the next run.
    tracing::info!("Shutting down");
}

/// Moves an attempt out of `screen`, leaving `fallback` in its place.
/// Other screens are left untouched.
fn take_attempt(screen: &mut Screen, fallback: Screen) -> Option<AttemptFlow> {
    if !matches!(screen, Screen::Attempt { .. }) {
        return None;
    }
    match std::mem::replace(screen, fallback) {
        Screen::Attempt { flow, .. } => Some(flow),
        _ => None,
    }
}

/// The result on screen, when it belongs to `quiz_id`.
fn recent_result(screen: &Screen, quiz_id: i64) -> Option<QuizResult> {
    match screen {
        Screen::Result(Some(r)) if r.resolved_quiz_id() == Some(quiz_id) => Some(r.clone()),
        _ => None,
    }
}

async fn phase_changed(rx: &mut Option<watch::Receiver<AttemptPhase>>) -> Option<AttemptPhase> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

impl App {
    /// Returns false when the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}", msg);
                return true;
            }
        };
        if command == Command::Quit {
            return false;
        }
        if let Err(e) = self.dispatch(command).await {
            self.report(e);
        }
        true
    }

    fn report(&mut self, err: AppError) {
        println!("{}", cli::render_error(&err));
        if err.redirects_to_login() {
            // Dropping an attempt here keeps its start time for resuming.
            self.phase_rx = None;
            self.screen = Screen::Login;
            println!("== Login ==\nlogin <username> <password>");
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<(), AppError> {
        match command {
            Command::Help => println!("{}", cli::HELP),
            Command::Go(route) => self.navigate(route).await,
            Command::Login { username, password } => {
                let session = auth::login(&self.state, LoginRequest { username, password }).await?;
                println!("Welcome, {}.", session.full_name);
                let landing = match session.role {
                    Role::Teacher => Route::Dashboard,
                    Role::Student => Route::Home,
                };
                self.navigate(landing).await;
            }
            Command::Register {
                username,
                password,
                email,
                full_name,
            } => {
                let payload = RegisterRequest {
                    username,
                    password,
                    full_name,
                    email,
                };
                auth::register(&self.state, payload).await?;
                println!("Account created. Please login.");
                self.navigate(Route::Login).await;
            }
            Command::Logout => {
                self.phase_rx = None;
                self.screen = Screen::Login;
                auth::logout(&self.state).await?;
                println!("Signed out.");
                self.navigate(Route::Login).await;
            }
            Command::UpdateProfile { email, full_name } => {
                let user = profile::update_profile(&self.state, &full_name, &email).await?;
                println!("Profile saved: {} <{}>", user.full_name, user.email);
            }
            other => match self.screen_command(other).await? {
                Next::Stay => {}
                Next::Navigate(route) => self.navigate(route).await,
                Next::StartQuiz(quiz) => self.start_attempt(quiz).await?,
            },
        }
        Ok(())
    }

    /// Applies the route guard, leaves the current screen and opens `route`.
    async fn navigate(&mut self, route: Route) {
        let route = match routes::guard(route, &self.state.session, Utc::now()) {
            Guard::Allow => route,
            Guard::Redirect(to) => {
                println!("{} is not available, redirecting to {}", route, to);
                to
            }
        };

        // Any other screen stays in place until `open` succeeds, so a failed
        // navigation leaves it intact.
        let fallback = Screen::Home(SubjectBrowser::new(&self.state));
        if let Some(flow) = take_attempt(&mut self.screen, fallback) {
            self.phase_rx = None;
            if let Err(e) = flow.leave().await {
                tracing::error!("Failed to leave attempt: {:?}", e);
            }
        }

        if let Err(e) = self.open(route).await {
            self.report(e);
        }
    }

    async fn open(&mut self, route: Route) -> Result<(), AppError> {
        let state = &self.state;
        self.screen = match route {
            Route::Login => {
                println!("== Login ==\nlogin <username> <password>");
                Screen::Login
            }
            Route::Register => {
                println!("== Register ==\nregister <username> <password> <email> <full name>");
                Screen::Register
            }
            Route::Home => {
                let mut browser = SubjectBrowser::new(state);
                browser.refresh(state).await?;
                Screen::Home(browser)
            }
            Route::QuizList { subject_id } => {
                let mut browser = QuizBrowser::new(subject_id);
                browser.refresh(state).await?;
                Screen::QuizList(browser)
            }
            Route::QuizAttempt { quiz_id } => {
                let quiz = catalog::fetch_quiz(state, quiz_id).await?;
                return self.start_attempt(quiz).await;
            }
            Route::QuizResult { quiz_id } => {
                let last = recent_result(&self.screen, quiz_id);
                match &last {
                    Some(result) => println!("{}", cli::render_result(result)),
                    None => {
                        return Err(AppError::NotFound(format!(
                            "No recent result for quiz {}",
                            quiz_id
                        )));
                    }
                }
                Screen::Result(last)
            }
            Route::History => {
                let mut screen = HistoryScreen::new(state);
                screen.refresh(state).await?;
                Screen::History(screen)
            }
            Route::Profile => {
                let user = profile::get_profile(state).await?;
                println!(
                    "== Profile ==\n{} ({})\n{}\nRole: {}\nprofile <email> <full name> to edit",
                    user.full_name, user.username, user.email, user.role
                );
                Screen::Profile
            }
            Route::Dashboard => Screen::Dashboard,
            Route::ManageSubjects => {
                let mut m = SubjectManager::new(state);
                m.refresh(state).await?;
                Screen::Subjects(m)
            }
            Route::ManageQuizzes => {
                let mut m = QuizManager::new(state);
                m.refresh(state).await?;
                Screen::Quizzes(m)
            }
            Route::ManageQuestions => {
                let mut m = QuestionManager::new(state);
                m.refresh(state).await?;
                Screen::Questions(m)
            }
            Route::ManageUsers => {
                let mut m = UserManager::new(state);
                m.refresh(state).await?;
                Screen::Users(m)
            }
            Route::ManageResults => {
                let mut m = ResultManager::new(state);
                m.refresh(state).await?;
                Screen::Results(m)
            }
        };
        self.render();
        Ok(())
    }

    async fn start_attempt(&mut self, quiz: practice_quiz::models::quiz::Quiz) -> Result<(), AppError> {
        let flow = AttemptFlow::new(quiz, self.state.attempt_deps());
        flow.load().await?;
        if flow.is_resumed() {
            println!("Resuming your attempt; the countdown continues where it was.");
        }
        flow.start_timer(self.state.config.tick_interval(), Some(self.events.clone()));
        self.phase_rx = Some(flow.subscribe_phase());
        self.screen = Screen::Attempt {
            flow,
            confirming: None,
        };
        self.render();
        Ok(())
    }

    fn render(&self) {
        let out = match &self.screen {
            Screen::Login | Screen::Register | Screen::Profile | Screen::Result(_) => return,
            Screen::Home(b) => cli::render_subjects(b.subjects(), &b.paging(), b.search()),
            Screen::QuizList(b) => cli::render_quizzes(b.quizzes(), &b.paging()),
            Screen::Attempt { flow, .. } => match flow.view() {
                Some(view) => cli::render_attempt(flow.quiz(), &view),
                None => "Loading quiz...".to_string(),
            },
            Screen::History(h) => cli::render_history(h.results(), &h.paging()),
            Screen::Dashboard => cli::render_dashboard(),
            Screen::Subjects(m) => {
                let t = m.table();
                cli::render_table("Subjects", &t.page_rows(), t.page(), t.page_count(), t.total_filtered(), cli::subject_row)
            }
            Screen::Quizzes(m) => {
                let t = m.table();
                cli::render_table("Quizzes", &t.page_rows(), t.page(), t.page_count(), t.total_filtered(), cli::quiz_row)
            }
            Screen::Questions(m) => {
                let t = m.table();
                cli::render_table("Questions", &t.page_rows(), t.page(), t.page_count(), t.total_filtered(), cli::question_row)
            }
            Screen::Users(m) => {
                let t = m.table();
                cli::render_table("Users", &t.page_rows(), t.page(), t.page_count(), t.total_filtered(), cli::user_row)
            }
            Screen::Results(m) => {
                let t = m.table();
                cli::render_table("Results", &t.page_rows(), t.page(), t.page_count(), t.total_filtered(), cli::result_row)
            }
        };
        println!("{}", out);
    }

    async fn screen_command(&mut self, command: Command) -> Result<Next, AppError> {
        let state = &self.state;
        let next = match (&mut self.screen, command) {
            (Screen::Home(b), Command::Page(n)) => {
                if b.set_page(n) {
                    b.refresh(state).await?;
                }
                Next::Stay
            }
            (Screen::Home(b), Command::Search(text)) => {
                b.set_search(&text);
                b.refresh(state).await?;
                Next::Stay
            }
            (Screen::Home(b), Command::Sort(direction)) => {
                b.set_sort(direction);
                b.refresh(state).await?;
                Next::Stay
            }
            (Screen::Home(b), Command::Refresh) => {
                b.refresh(state).await?;
                Next::Stay
            }
            (Screen::Home(b), Command::Open(i)) => {
                let subject = b
                    .subjects()
                    .get(i)
                    .ok_or_else(|| AppError::NotFound(format!("No subject at position {}", i + 1)))?;
                Next::Navigate(Route::QuizList {
                    subject_id: subject.subject_id,
                })
            }

            (Screen::QuizList(b), Command::Page(n)) => {
                if b.set_page(n) {
                    b.refresh(state).await?;
                }
                Next::Stay
            }
            (Screen::QuizList(b), Command::Refresh) => {
                b.refresh(state).await?;
                Next::Stay
            }
            (Screen::QuizList(b), Command::Open(i)) => Next::StartQuiz(b.start(state, i)?),

            (Screen::Attempt { flow, confirming }, command) => {
                return attempt_command(flow, confirming, command).await;
            }

            (Screen::History(h), Command::Page(n)) => {
                if h.set_page(n) {
                    h.refresh(state).await?;
                }
                Next::Stay
            }
            (Screen::History(h), Command::Range { from, to }) => {
                h.set_range(from, to);
                h.refresh(state).await?;
                Next::Stay
            }
            (Screen::History(h), Command::Refresh) => {
                h.refresh(state).await?;
                Next::Stay
            }
            (Screen::History(h), Command::Open(i)) => {
                let result = h
                    .results()
                    .get(i)
                    .ok_or_else(|| AppError::NotFound(format!("No result at position {}", i + 1)))?;
                println!("{}", cli::render_review(&history::review_result(state, result).await));
                return Ok(Next::Stay);
            }

            (Screen::Subjects(m), command) => {
                subjects_command(state, m, command).await?;
                m.refresh_if_stale(state).await?;
                Next::Stay
            }
            (Screen::Quizzes(m), command) => {
                quizzes_command(state, m, command).await?;
                m.refresh_if_stale(state).await?;
                Next::Stay
            }
            (Screen::Questions(m), command) => {
                questions_command(state, m, command).await?;
                m.refresh_if_stale(state).await?;
                Next::Stay
            }
            (Screen::Users(m), command) => {
                users_command(state, m, command).await?;
                m.refresh_if_stale(state).await?;
                Next::Stay
            }
            (Screen::Results(m), command) => {
                results_command(state, m, command).await?;
                m.refresh_if_stale(state).await?;
                Next::Stay
            }

            (_, command) => {
                return Err(AppError::BadRequest(format!(
                    "{:?} is not available on this screen",
                    command
                )));
            }
        };
        self.render();
        Ok(next)
    }

    fn on_timer(&mut self, event: TimerEvent) {
        if !matches!(self.screen, Screen::Attempt { .. }) {
            return;
        }
        match event {
            TimerEvent::Tick { remaining, total, elapsed } => {
                let announce = remaining > 0
                    && (remaining % 60 == 0 || remaining == LOW_TIME_WARNING_SECS || remaining <= 10);
                if announce {
                    let reading = practice_quiz::attempt::TimerReading {
                        remaining,
                        elapsed,
                        total,
                    };
                    println!("{}", cli::render_countdown(&reading));
                }
            }
            TimerEvent::Expired => println!("Time is up. Submitting your answers..."),
        }
    }

    fn on_phase(&mut self, phase: AttemptPhase) {
        let Screen::Attempt { flow, .. } = &self.screen else {
            return;
        };
        match phase {
            AttemptPhase::Submitted => {
                let result = flow.result();
                if let Some(result) = &result {
                    println!("{}", cli::render_result(result));
                    println!("Type go /history to review it.");
                }
                self.phase_rx = None;
                self.screen = Screen::Result(result);
            }
            AttemptPhase::InProgress => {
                if let Some(err) = flow.last_error() {
                    println!("Submission failed: {}. Your answers are kept, type submit to retry.", err);
                }
            }
            AttemptPhase::Loading | AttemptPhase::Submitting => {}
        }
    }
}

async fn attempt_command(
    flow: &AttemptFlow,
    confirming: &mut Option<usize>,
    command: Command,
) -> Result<Next, AppError> {
    match command {
        Command::Next => {
            flow.next()?;
        }
        Command::Previous => {
            flow.previous()?;
        }
        Command::Jump(i) => {
            if !flow.jump_to(i)? {
                println!("There is no question {}", i + 1);
            }
        }
        Command::Answer(choice) => flow.select_current(choice)?,
        Command::Star => {
            flow.toggle_star_current()?;
        }
        Command::Submit | Command::Confirm(true) => {
            let confirmed = command == Command::Confirm(true);
            if confirmed && confirming.is_none() {
                return Ok(Next::Stay);
            }
            *confirming = None;
            match flow.submit(SubmitTrigger::Manual { confirmed }).await? {
                SubmitOutcome::NeedsConfirmation { unanswered } => {
                    *confirming = Some(unanswered);
                    println!("{}", cli::render_confirmation(unanswered));
                }
                // The phase watcher renders the result.
                SubmitOutcome::Submitted(_) => {}
            }
            return Ok(Next::Stay);
        }
        Command::Confirm(false) => *confirming = None,
        Command::Leave => return Ok(Next::Navigate(Route::Home)),
        other => {
            return Err(AppError::BadRequest(format!(
                "{:?} is not available during a quiz",
                other
            )));
        }
    }
    if let Some(view) = flow.view() {
        println!("{}", cli::render_attempt(flow.quiz(), &view));
    }
    Ok(Next::Stay)
}

async fn subjects_command(state: &AppState, m: &mut SubjectManager, command: Command) -> Result<(), AppError> {
    match command {
        Command::Page(n) => {
            m.table_mut().set_page(n as usize);
        }
        Command::Filter { field, value } => cli::apply_subject_filter(m.table_mut().filter_mut(), &field, &value)?,
        Command::ClearFilter => m.table_mut().set_filter(Default::default()),
        Command::Refresh => m.refresh(state).await?,
        Command::Create(fields) => m.create(state, cli::subject_form(SubjectForm::default(), &fields)?).await?,
        Command::Edit(id, fields) => {
            let subject = m
                .table()
                .find(|s| s.subject_id == id)
                .ok_or_else(|| AppError::NotFound(format!("Subject {} not found", id)))?;
            let base = subject.to_form();
            m.update(state, id, cli::subject_form(base, &fields)?).await?
        }
        Command::Deactivate(id) => m.deactivate(state, id).await?,
        other => return Err(unsupported(other)),
    }
    Ok(())
}

async fn quizzes_command(state: &AppState, m: &mut QuizManager, command: Command) -> Result<(), AppError> {
    use practice_quiz::models::quiz::QuizForm;
    match command {
        Command::Page(n) => {
            m.table_mut().set_page(n as usize);
        }
        Command::Filter { field, value } => cli::apply_quiz_filter(m.table_mut().filter_mut(), &field, &value)?,
        Command::ClearFilter => m.table_mut().set_filter(Default::default()),
        Command::Refresh => m.refresh(state).await?,
        Command::Create(fields) => m.create(state, cli::quiz_form(QuizForm::default(), &fields)?).await?,
        Command::Edit(id, fields) => {
            let quiz = m
                .table()
                .find(|q| q.quiz_id == id)
                .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))?;
            let base = quiz.to_form();
            m.update(state, id, cli::quiz_form(base, &fields)?).await?
        }
        Command::Deactivate(id) => m.deactivate(state, id).await?,
        Command::QuizCode(id) => {
            let code = m.quiz_code(state, id).await?;
            println!("Quiz {} code: {}", id, code.code);
        }
        other => return Err(unsupported(other)),
    }
    Ok(())
}

async fn questions_command(state: &AppState, m: &mut QuestionManager, command: Command) -> Result<(), AppError> {
    use practice_quiz::models::question::QuestionForm;
    match command {
        Command::Page(n) => {
            m.table_mut().set_page(n as usize);
        }
        Command::Filter { field, value } => cli::apply_question_filter(m.table_mut().filter_mut(), &field, &value)?,
        Command::ClearFilter => m.table_mut().set_filter(Default::default()),
        Command::Refresh => m.refresh(state).await?,
        Command::Details(id) => println!("{}", cli::render_question_details(&m.details(id)?)),
        Command::Create(fields) => m.create(state, cli::question_form(QuestionForm::default(), &fields)?).await?,
        Command::Edit(id, fields) => {
            let question = m
                .table()
                .find(|q| q.question_id == id)
                .ok_or_else(|| AppError::NotFound(format!("Question {} not found", id)))?;
            let base = question.to_form();
            m.update(state, id, cli::question_form(base, &fields)?).await?
        }
        Command::Deactivate(id) => m.deactivate(state, id).await?,
        Command::AddOption(question_id, fields) => {
            // `option <question id> id=<option id> | ...` edits an existing option.
            let form = cli::option_form(question_id, &fields)?;
            match fields.parsed("id", |r| r.parse::<i64>().ok())? {
                Some(option_id) if form.status == practice_quiz::models::EntityStatus::Inactive => {
                    m.deactivate_option(state, option_id).await?
                }
                Some(option_id) => m.update_option(state, option_id, form).await?,
                None => m.add_option(state, form).await?,
            }
        }
        other => return Err(unsupported(other)),
    }
    Ok(())
}

async fn users_command(state: &AppState, m: &mut UserManager, command: Command) -> Result<(), AppError> {
    match command {
        Command::Page(n) => {
            m.table_mut().set_page(n as usize);
        }
        Command::Filter { field, value } => cli::apply_user_filter(m.table_mut().filter_mut(), &field, &value)?,
        Command::ClearFilter => m.table_mut().set_filter(Default::default()),
        Command::Refresh => m.refresh(state).await?,
        Command::Create(fields) => m.create(state, cli::register_form(&fields)).await?,
        Command::Edit(id, fields) => {
            let user = m
                .table()
                .find(|u| u.user_id == id)
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
            let payload = cli::user_update(user.to_update(), &fields)?;
            m.update(state, id, payload).await?
        }
        Command::Deactivate(id) => m.deactivate(state, id).await?,
        other => return Err(unsupported(other)),
    }
    Ok(())
}

async fn results_command(state: &AppState, m: &mut ResultManager, command: Command) -> Result<(), AppError> {
    match command {
        Command::Page(n) => {
            m.table_mut().set_page(n as usize);
        }
        Command::Filter { field, value } => cli::apply_result_filter(m.table_mut().filter_mut(), &field, &value)?,
        Command::ClearFilter => m.table_mut().set_filter(Default::default()),
        Command::Refresh => m.refresh(state).await?,
        Command::Details(id) => println!("{}", cli::render_review(&m.details(id)?)),
        other => return Err(unsupported(other)),
    }
    Ok(())
}

fn unsupported(command: Command) -> AppError {
    AppError::BadRequest(format!("{:?} is not available on this screen", command))
}
