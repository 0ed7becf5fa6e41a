// src/cli.rs

//! Line-oriented terminal front end: command parsing and text rendering.
//! Everything here is pure; `main.rs` owns the loop and the controllers.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    api::SortDirection,
    attempt::{AttemptView, TimerReading},
    config::LOW_TIME_WARNING_SECS,
    error::{AppError, ErrorKind},
    handlers::{
        admin::{
            DASHBOARD,
            questions::{QuestionDetails, QuestionFilter},
            quizzes::QuizFilter,
            results::ResultFilter,
            subjects::SubjectFilter,
            users::UserFilter,
        },
        history::ResultReview,
        listing::ServerPaging,
    },
    models::{
        question::{Level, OptionForm, Question, QuestionForm, QuestionType},
        quiz::{Quiz, QuizForm},
        result::{QuizResult, ScoreBand},
        status::{EntityStatus, Role},
        subject::{Subject, SubjectForm},
        user::{RegisterRequest, User, UserUpdate},
    },
    routes::Route,
    utils::time::{format_countdown, format_local},
};

pub const HELP: &str = "\
Navigation:  go <path>   (/home /subject/{id} /quiz/{id} /history /profile /dashboard[/subjects|quizzes|questions|users|results])
Account:     login <username> <password> | register <username> <password> <email> <full name> | logout
Lists:       page <n> | search <text> | sort asc|desc | open <n> | refresh | range <from|-> <to|->
Attempt:     next | prev | jump <n> | answer <n> | star | submit | yes | no | leave
Management:  filter <field> <value> | clear | details <id> | code <id> | deactivate <id>
             create field=value | field=value ...   edit <id> field=value | ...
             option <question id> content=... | correct=true
Profile:     profile <email> <full name>
Other:       help | quit";

/// Parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Go(Route),
    Login { username: String, password: String },
    Register {
        username: String,
        password: String,
        email: String,
        full_name: String,
    },
    Logout,
    UpdateProfile { email: String, full_name: String },
    Next,
    Previous,
    Jump(usize),
    Answer(usize),
    Star,
    Submit,
    Confirm(bool),
    Leave,
    Page(u32),
    Search(String),
    Sort(SortDirection),
    Open(usize),
    Refresh,
    Range {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    Filter { field: String, value: String },
    ClearFilter,
    Details(i64),
    QuizCode(i64),
    Deactivate(i64),
    Create(FormFields),
    Edit(i64, FormFields),
    AddOption(i64, FormFields),
    Help,
    Quit,
}

/// `key=value` pairs separated by `|`, as typed after `create` or `edit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut fields = HashMap::new();
        for part in raw.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("Expected field=value, got {:?}", part))?;
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Parses an optional field, `Ok(None)` when absent.
    pub fn parsed<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>, AppError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse(raw)
                .map(Some)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid value for {}: {}", key, raw))),
        }
    }
}

fn number<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T, String> {
    raw.and_then(|r| r.trim().parse().ok())
        .ok_or_else(|| format!("Expected a number for {}", what))
}

/// `YYYY-MM-DD` as the start (or end) of that UTC day; `-` means open.
fn parse_day(raw: &str, end_of_day: bool) -> Result<Option<DateTime<Utc>>, String> {
    if raw == "-" {
        return Ok(None);
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Expected YYYY-MM-DD, got {:?}", raw))?;
    let time = if end_of_day {
        day.and_hms_opt(23, 59, 59)
    } else {
        day.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc()))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };
        let mut args = rest.split_whitespace();

        let command = match word.to_ascii_lowercase().as_str() {
            "go" => Command::Go(
                Route::parse(rest).ok_or_else(|| format!("Unknown path {:?}", rest))?,
            ),
            "login" => match (args.next(), args.next()) {
                (Some(u), Some(p)) => Command::Login {
                    username: u.to_string(),
                    password: p.to_string(),
                },
                _ => return Err("Usage: login <username> <password>".to_string()),
            },
            "register" => {
                let (Some(username), Some(password), Some(email)) =
                    (args.next(), args.next(), args.next())
                else {
                    return Err("Usage: register <username> <password> <email> <full name>".to_string());
                };
                Command::Register {
                    username: username.to_string(),
                    password: password.to_string(),
                    email: email.to_string(),
                    full_name: args.collect::<Vec<_>>().join(" "),
                }
            }
            "logout" => Command::Logout,
            "profile" => {
                let Some(email) = args.next() else {
                    return Err("Usage: profile <email> <full name>".to_string());
                };
                Command::UpdateProfile {
                    email: email.to_string(),
                    full_name: args.collect::<Vec<_>>().join(" "),
                }
            }
            "next" | "n" => Command::Next,
            "prev" | "p" => Command::Previous,
            "jump" | "j" => Command::Jump(one_based(args.next(), "question")?),
            "answer" | "a" => Command::Answer(one_based(args.next(), "option")?),
            "star" | "s" => Command::Star,
            "submit" => Command::Submit,
            "yes" | "y" => Command::Confirm(true),
            "no" => Command::Confirm(false),
            "leave" => Command::Leave,
            "page" => Command::Page(number(args.next(), "page")?),
            "search" => Command::Search(rest.to_string()),
            "sort" => match args.next().map(str::to_ascii_lowercase).as_deref() {
                Some("asc") | Some("oldest") => Command::Sort(SortDirection::Asc),
                Some("desc") | Some("newest") => Command::Sort(SortDirection::Desc),
                _ => return Err("Usage: sort asc|desc".to_string()),
            },
            "open" | "o" => Command::Open(one_based(args.next(), "row")?),
            "refresh" | "r" => Command::Refresh,
            "range" => match (args.next(), args.next()) {
                (Some(from), Some(to)) => Command::Range {
                    from: parse_day(from, false)?,
                    to: parse_day(to, true)?,
                },
                _ => return Err("Usage: range <from|-> <to|->".to_string()),
            },
            "filter" => {
                let Some(field) = args.next() else {
                    return Err("Usage: filter <field> <value>".to_string());
                };
                Command::Filter {
                    field: field.to_ascii_lowercase(),
                    value: args.collect::<Vec<_>>().join(" "),
                }
            }
            "clear" => Command::ClearFilter,
            "details" => Command::Details(number(args.next(), "id")?),
            "code" => Command::QuizCode(number(args.next(), "quiz id")?),
            "deactivate" | "delete" => Command::Deactivate(number(args.next(), "id")?),
            "create" => Command::Create(FormFields::parse(rest)?),
            "edit" | "option" => {
                let (id, fields) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let id = number(Some(id), "id")?;
                let fields = FormFields::parse(fields)?;
                if word.eq_ignore_ascii_case("edit") {
                    Command::Edit(id, fields)
                } else {
                    Command::AddOption(id, fields)
                }
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("Unknown command {:?}, type help", other)),
        };
        Ok(command)
    }
}

/// Users count from 1.
fn one_based(raw: Option<&str>, what: &str) -> Result<usize, String> {
    let n: usize = number(raw, what)?;
    n.checked_sub(1)
        .ok_or_else(|| format!("{} numbers start at 1", what))
}

pub fn render_countdown(reading: &TimerReading) -> String {
    let mut line = format!(
        "Time left {} ({:.0}%)",
        format_countdown(reading.remaining),
        reading.percent_left()
    );
    if reading.remaining < LOW_TIME_WARNING_SECS {
        line.push_str("  !! less than a minute left");
    }
    line
}

/// One cell per question: `[3]` current, `3*` starred, `3+` answered.
pub fn render_nav_marks(marks: &[(bool, bool)], current: usize) -> String {
    marks
        .iter()
        .enumerate()
        .map(|(i, (answered, starred))| {
            let mut cell = (i + 1).to_string();
            if *answered {
                cell.push('+');
            }
            if *starred {
                cell.push('*');
            }
            if i == current {
                format!("[{}]", cell)
            } else {
                cell
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_attempt(quiz: &Quiz, view: &AttemptView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", quiz.title);
    let _ = writeln!(out, "{}", render_countdown(&view.timer));
    let _ = writeln!(
        out,
        "Answered {}/{}   {}",
        view.progress.answered,
        view.progress.total,
        render_nav_marks(&view.marks, view.index)
    );
    let _ = writeln!(
        out,
        "\nQuestion {} of {}: {}",
        view.index + 1,
        view.count,
        view.question.content
    );
    for (i, option) in view.question.options.iter().enumerate() {
        let marker = if view.selected == Some(option.option_id) {
            "(x)"
        } else {
            "( )"
        };
        let _ = writeln!(out, "  {} {}. {}", marker, i + 1, option.content);
    }
    if let Some(err) = &view.last_error {
        let _ = writeln!(out, "\nLast submission failed: {}. Type submit to retry.", err);
    }
    out
}

pub fn render_confirmation(unanswered: usize) -> String {
    format!(
        "You have {} unanswered question{}. Submit anyway? (yes/no)",
        unanswered,
        if unanswered == 1 { "" } else { "s" }
    )
}

pub fn render_result(result: &QuizResult) -> String {
    format!(
        "Submitted {}: score {:.1} ({} of {} correct), {} min",
        result.quiz_title(),
        result.score,
        result.correct_count(),
        result.answers.len(),
        result.duration_minutes()
    )
}

fn paging_footer(paging: &ServerPaging) -> String {
    format!(
        "Page {}/{} ({} total)",
        paging.page,
        paging.page_count().max(1),
        paging.total
    )
}

pub fn render_subjects(subjects: &[Subject], paging: &ServerPaging, search: &str) -> String {
    let mut out = String::from("== Subjects ==\n");
    if !search.is_empty() {
        let _ = writeln!(out, "Search: {}", search);
    }
    if subjects.is_empty() {
        out.push_str("No subjects found.\n");
    }
    for (i, s) in subjects.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {} - {}", i + 1, s.subject_name, s.description);
    }
    out.push_str(&paging_footer(paging));
    out
}

pub fn render_quizzes(quizzes: &[Quiz], paging: &ServerPaging) -> String {
    let mut out = String::from("== Quizzes ==\n");
    if quizzes.is_empty() {
        out.push_str("No quizzes for this subject yet. Type go /home to go back.\n");
    }
    for (i, q) in quizzes.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {} ({} min) by {}",
            i + 1,
            q.title,
            q.time_limit,
            q.teacher_name()
        );
    }
    out.push_str(&paging_footer(paging));
    out
}

pub fn render_history(results: &[QuizResult], paging: &ServerPaging) -> String {
    let mut out = String::from("== History ==\n");
    if results.is_empty() {
        out.push_str("No results yet. Type go /home to pick a quiz.\n");
    }
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<30} {:>5.1}  {}",
            i + 1,
            r.quiz_title(),
            r.score,
            format_local(&r.end_time)
        );
    }
    out.push_str(&paging_footer(paging));
    out
}

pub fn render_review(review: &ResultReview) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", review.quiz_title);
    if let Some(code) = &review.quiz_code {
        let _ = writeln!(out, "Code: {}", code);
    }
    let _ = writeln!(
        out,
        "Score {:.1}, {} of {} correct",
        review.score,
        review.correct,
        review.lines.len()
    );
    let _ = writeln!(
        out,
        "{} -> {} ({} min)",
        format_local(&review.start_time),
        format_local(&review.end_time),
        review.duration_minutes
    );
    for line in &review.lines {
        let _ = writeln!(
            out,
            "{:>3}. [{}] {}\n     {}",
            line.number,
            if line.is_correct { "correct" } else { "wrong" },
            line.question,
            line.answer
        );
    }
    out
}

pub fn render_dashboard() -> String {
    let mut out = String::from("== Dashboard ==\n");
    for entry in DASHBOARD.iter() {
        let _ = writeln!(out, "  {:<22} go {}", entry.title, entry.route);
    }
    out
}

/// Client-side paged management table.
pub fn render_table<T>(
    title: &str,
    rows: &[&T],
    page: usize,
    page_count: usize,
    total: usize,
    line: impl Fn(&T) -> String,
) -> String {
    let mut out = format!("== {} ==\n", title);
    if rows.is_empty() {
        out.push_str("Nothing matches the current filter.\n");
    }
    for row in rows {
        let _ = writeln!(out, "  {}", line(*row));
    }
    let _ = write!(out, "Page {}/{} ({} rows)", page, page_count.max(1), total);
    out
}

pub fn subject_row(s: &Subject) -> String {
    format!("#{} {} [{}] by {}", s.subject_id, s.subject_name, s.status, s.author_name())
}

pub fn quiz_row(q: &Quiz) -> String {
    format!(
        "#{} {} ({}, {} min) [{}]",
        q.quiz_id,
        q.title,
        q.subject_name(),
        q.time_limit,
        q.status
    )
}

pub fn question_row(q: &Question) -> String {
    format!(
        "#{} {} ({}, {}) [{}]",
        q.question_id, q.content, q.question_type, q.level, q.status
    )
}

pub fn user_row(u: &User) -> String {
    format!(
        "#{} {} ({}) {} [{}]",
        u.user_id, u.username, u.full_name, u.role, u.status
    )
}

pub fn result_row(r: &QuizResult) -> String {
    format!(
        "#{} {} - {} {:.1} ({}) {}",
        r.result_id,
        r.student_name(),
        r.quiz_title(),
        r.score,
        r.band(),
        format_local(&r.end_time)
    )
}

pub fn render_question_details(details: &QuestionDetails) -> String {
    let q = &details.question;
    let mut out = format!("#{} {}\n", q.question_id, q.content);
    let _ = writeln!(
        out,
        "Quiz: {}  Type: {}  Level: {}  Status: {}",
        details.quiz_title.as_deref().unwrap_or("-"),
        q.question_type,
        q.level,
        q.status
    );
    for option in &q.options {
        let _ = writeln!(
            out,
            "  #{} {}{} [{}]",
            option.option_id,
            option.content,
            if option.is_correct { " (correct)" } else { "" },
            option.status
        );
    }
    out
}

/// Error line plus the recovery hint for its kind.
pub fn render_error(err: &AppError) -> String {
    match err.kind() {
        ErrorKind::Auth => format!("{}. Please login again (go /login).", err),
        ErrorKind::Empty => format!("{}. Type go /home to go back.", err),
        ErrorKind::Transient if err.is_retryable() => format!("{}. Try again.", err),
        ErrorKind::Transient => err.to_string(),
    }
}

/// Overlays typed fields on `base` (the row being edited, or defaults).
pub fn subject_form(base: SubjectForm, fields: &FormFields) -> Result<SubjectForm, AppError> {
    Ok(SubjectForm {
        subject_name: fields.get("name").map(str::to_string).unwrap_or(base.subject_name),
        description: fields.get("description").map(str::to_string).unwrap_or(base.description),
        status: fields.parsed("status", EntityStatus::parse)?.unwrap_or(base.status),
    })
}

pub fn quiz_form(base: QuizForm, fields: &FormFields) -> Result<QuizForm, AppError> {
    Ok(QuizForm {
        title: fields.get("title").map(str::to_string).unwrap_or(base.title),
        description: fields.get("description").map(str::to_string).unwrap_or(base.description),
        subject_id: fields.parsed("subject", |r| r.parse().ok())?.unwrap_or(base.subject_id),
        time_limit: fields.parsed("timelimit", |r| r.parse().ok())?.unwrap_or(base.time_limit),
        status: fields.parsed("status", EntityStatus::parse)?.unwrap_or(base.status),
    })
}

pub fn question_form(base: QuestionForm, fields: &FormFields) -> Result<QuestionForm, AppError> {
    Ok(QuestionForm {
        content: fields.get("content").map(str::to_string).unwrap_or(base.content),
        question_type: fields.parsed("type", QuestionType::parse)?.unwrap_or(base.question_type),
        level: fields.parsed("level", Level::parse)?.unwrap_or(base.level),
        quiz_id: fields.parsed("quiz", |r| r.parse().ok())?.unwrap_or(base.quiz_id),
        status: fields.parsed("status", EntityStatus::parse)?.unwrap_or(base.status),
    })
}

pub fn option_form(question_id: i64, fields: &FormFields) -> Result<OptionForm, AppError> {
    Ok(OptionForm {
        question_id,
        content: fields.text("content"),
        is_correct: fields.parsed("correct", parse_bool)?.unwrap_or(false),
        status: fields.parsed("status", EntityStatus::parse)?.unwrap_or_default(),
    })
}

pub fn register_form(fields: &FormFields) -> RegisterRequest {
    RegisterRequest {
        username: fields.text("username"),
        password: fields.text("password"),
        full_name: fields.text("fullname"),
        email: fields.text("email"),
    }
}

pub fn user_update(base: UserUpdate, fields: &FormFields) -> Result<UserUpdate, AppError> {
    Ok(UserUpdate {
        username: base.username,
        full_name: fields.get("fullname").map(str::to_string).unwrap_or(base.full_name),
        email: fields.get("email").map(str::to_string).unwrap_or(base.email),
        role: fields.parsed("role", Role::parse)?.unwrap_or(base.role),
        status: fields.parsed("status", EntityStatus::parse)?.unwrap_or(base.status),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Empty or `all` clears a choice filter.
fn choice<T>(value: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>, AppError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    parse(value)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown filter value {:?}", value)))
}

fn unknown_field(field: &str) -> AppError {
    AppError::BadRequest(format!("Unknown filter field {:?}", field))
}

pub fn apply_subject_filter(f: &mut SubjectFilter, field: &str, value: &str) -> Result<(), AppError> {
    match field {
        "name" => f.name = value.to_string(),
        "description" => f.description = value.to_string(),
        "status" => f.status = choice(value, EntityStatus::parse)?,
        other => return Err(unknown_field(other)),
    }
    Ok(())
}

pub fn apply_quiz_filter(f: &mut QuizFilter, field: &str, value: &str) -> Result<(), AppError> {
    match field {
        "title" => f.title = value.to_string(),
        "description" => f.description = value.to_string(),
        "subject" => f.subject_id = choice(value, |r| r.parse().ok())?,
        "status" => f.status = choice(value, EntityStatus::parse)?,
        other => return Err(unknown_field(other)),
    }
    Ok(())
}

pub fn apply_question_filter(f: &mut QuestionFilter, field: &str, value: &str) -> Result<(), AppError> {
    match field {
        "content" => f.content = value.to_string(),
        "type" => f.question_type = choice(value, QuestionType::parse)?,
        "level" => f.level = choice(value, Level::parse)?,
        "status" => f.status = choice(value, EntityStatus::parse)?,
        other => return Err(unknown_field(other)),
    }
    Ok(())
}

pub fn apply_user_filter(f: &mut UserFilter, field: &str, value: &str) -> Result<(), AppError> {
    match field {
        "username" => f.username = value.to_string(),
        "fullname" | "name" => f.full_name = value.to_string(),
        "role" => f.role = choice(value, Role::parse)?,
        "status" => f.status = choice(value, EntityStatus::parse)?,
        other => return Err(unknown_field(other)),
    }
    Ok(())
}

pub fn apply_result_filter(f: &mut ResultFilter, field: &str, value: &str) -> Result<(), AppError> {
    match field {
        "student" => f.student_name = value.to_string(),
        "quiz" => f.quiz_title = choice(value, |r| Some(r.to_string()))?,
        "band" | "score" => f.band = choice(value, ScoreBand::parse)?,
        other => return Err(unknown_field(other)),
    }
    Ok(())
}
