// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use practice_quiz::{
    attempt::ManualClock,
    config::Config,
    handlers::auth,
    models::user::LoginRequest,
    session::Session,
    state::AppState,
    store,
};
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;

pub const PASSWORD: &str = "password123";

pub const TEACHER_ID: i64 = 1;
pub const STUDENT_ID: i64 = 2;

/// Five active questions (plus one inactive), 10 minutes.
pub const OPTICS_QUIZ: i64 = 1;
/// Two questions, 1 minute.
pub const SHORT_QUIZ: i64 = 2;
/// No questions at all.
pub const EMPTY_QUIZ: i64 = 3;

/// In-memory backend data, PascalCase like the OData feed.
#[derive(Default)]
pub struct MockDb {
    pub users: Vec<Value>,
    pub subjects: Vec<Value>,
    pub quizzes: Vec<Value>,
    pub questions: Vec<Value>,
    /// Stored camelCase, as `api/Result` answers.
    pub results: Vec<Value>,
    /// Every body received by `POST api/Result/submit`.
    pub submissions: Vec<Value>,
    /// `METHOD /path?query` of every request, in order.
    pub requests: Vec<String>,
    pub submit_delay: Option<Duration>,
    pub fail_submit: bool,
    /// Answer 401 to every request carrying a bearer token.
    pub reject_tokens: bool,
}

type Db = Arc<Mutex<MockDb>>;

#[derive(Clone)]
pub struct MockBackend {
    pub address: String,
    pub db: Db,
}

impl MockBackend {
    pub fn db(&self) -> MutexGuard<'_, MockDb> {
        self.db.lock().unwrap()
    }

    pub fn submit_count(&self) -> usize {
        self.db().submissions.len()
    }

    pub fn requests_to(&self, needle: &str) -> Vec<String> {
        self.db()
            .requests
            .iter()
            .filter(|r| r.contains(needle))
            .cloned()
            .collect()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn make_token(user_id: i64, role: &str, exp: DateTime<Utc>) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": user_id.to_string(), "role": role, "exp": exp.timestamp() }),
        &EncodingKey::from_secret(b"mock-backend-secret"),
    )
    .unwrap()
}

fn stamp(days: i64) -> String {
    (t0() - chrono::Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn question(id: i64, quiz_id: i64, status: &str) -> Value {
    let options: Vec<Value> = (1..=4)
        .map(|k| {
            json!({
                "OptionId": id * 10 + k,
                "QuestionId": id,
                "Content": format!("Q{} option {}", id, k),
                "IsCorrect": k == 1,
                // The last option of question 11 is retired.
                "Status": if id == 11 && k == 4 { "inactive" } else { "active" },
            })
        })
        .collect();
    json!({
        "QuestionId": id,
        "QuizId": quiz_id,
        "Content": format!("Question {}", id),
        "QuestionType": "Multiple Choice",
        "Level": "Easy",
        "Options": options,
        "Status": status,
        "CreatedByUser": { "FullName": "Lan Pham" },
        "CreatedAt": stamp(30),
    })
}

impl MockDb {
    pub fn seeded() -> Self {
        let users = vec![
            json!({"UserId": TEACHER_ID, "Username": "teacher", "FullName": "Lan Pham", "Email": "lan@example.com", "Role": "teacher", "Status": "active", "CreatedAt": stamp(100)}),
            json!({"UserId": STUDENT_ID, "Username": "mai", "FullName": "Mai Tran", "Email": "mai@example.com", "Role": "student", "Status": "active", "CreatedAt": stamp(90)}),
            json!({"UserId": 3, "Username": "bao", "FullName": "Bao Le", "Email": "bao@example.com", "Role": "student", "Status": "active", "CreatedAt": stamp(80)}),
        ];

        let mut subjects = vec![
            json!({"SubjectId": 1, "SubjectName": "Physics", "Description": "Light and motion", "Status": "Active", "CreatedByUser": {"FullName": "Lan Pham"}, "CreatedAt": stamp(60)}),
            json!({"SubjectId": 2, "SubjectName": "Mathematics", "Description": "Numbers", "Status": "Active", "CreatedByUser": {"FullName": "Lan Pham"}, "CreatedAt": stamp(59)}),
        ];
        for id in 3..=12 {
            subjects.push(json!({
                "SubjectId": id,
                "SubjectName": format!("Elective {:02}", id),
                "Description": "Optional course",
                "Status": "Active",
                "CreatedAt": stamp(60 - id),
            }));
        }

        let teacher = json!({"FullName": "Lan Pham"});
        let quizzes = vec![
            json!({"QuizId": OPTICS_QUIZ, "Title": "Optics", "Description": "Lenses", "TimeLimit": 10, "SubjectId": 1, "Subject": {"SubjectName": "Physics"}, "Teacher": teacher, "Status": "active", "CreatedAt": stamp(20)}),
            json!({"QuizId": SHORT_QUIZ, "Title": "Quick check", "Description": "One minute", "TimeLimit": 1, "SubjectId": 1, "Subject": {"SubjectName": "Physics"}, "Teacher": teacher, "Status": "active", "CreatedAt": stamp(10)}),
            json!({"QuizId": EMPTY_QUIZ, "Title": "Draft", "Description": "", "TimeLimit": 5, "SubjectId": 2, "Subject": {"SubjectName": "Mathematics"}, "Teacher": teacher, "Status": "active", "CreatedAt": stamp(5)}),
        ];

        let mut questions: Vec<Value> = (11..=15).map(|id| question(id, OPTICS_QUIZ, "active")).collect();
        questions.push(question(16, OPTICS_QUIZ, "inactive"));
        questions.push(question(21, SHORT_QUIZ, "active"));
        questions.push(question(22, SHORT_QUIZ, "active"));

        let results = vec![
            json!({"resultId": 1, "score": 90.0, "startTime": "2024-04-01T08:00:00Z", "endTime": "2024-04-01T08:09:00Z", "quizId": OPTICS_QUIZ, "quiz": {"title": "Optics"}, "studentId": STUDENT_ID, "student": {"fullName": "Mai Tran"}, "quizCode": "QZ0001",
                   "answers": [{"questionId": 11, "answerContent": "Q11 option 1", "isCorrect": true}, {"answerContent": "Q12 option 1", "isCorrect": true}], "createdAt": "2024-04-01T08:09:00Z"}),
            json!({"resultId": 2, "score": 40.0, "startTime": "2024-04-15T08:00:00Z", "endTime": "2024-04-15T08:03:00Z", "quizId": SHORT_QUIZ, "quiz": {"title": "Quick check"}, "studentId": STUDENT_ID, "student": {"fullName": "Mai Tran"}, "quizCode": "QZ0002",
                   "answers": [], "createdAt": "2024-04-15T08:03:00Z"}),
            json!({"resultId": 3, "score": 60.0, "startTime": "2024-04-20T08:00:00Z", "endTime": "2024-04-20T08:05:00Z", "quizId": OPTICS_QUIZ, "quiz": {"title": "Optics"}, "studentId": 3, "student": {"fullName": "Bao Le"}, "quizCode": "QZ0001",
                   "answers": [], "createdAt": "2024-04-20T08:05:00Z"}),
        ];

        Self {
            users,
            subjects,
            quizzes,
            questions,
            results,
            ..Default::default()
        }
    }
}

/// Spawns the mock backend on a random port.
pub async fn spawn_app() -> MockBackend {
    let db: Db = Arc::new(Mutex::new(MockDb::seeded()));

    let app = Router::new()
        .route("/api/User/login", post(login))
        .route("/api/User/register", post(register))
        .route("/api/User/{id}", get(get_user).put(put_user))
        .route("/api/Result", get(all_results))
        .route("/api/Result/submit", post(submit))
        .route("/api/Quiz/quiz-code/{id}", get(quiz_code))
        .route("/api/{entity}", post(create_entity).put(update_entity))
        .route("/odata/{entity}", get(odata))
        .layer(middleware::from_fn_with_state(db.clone(), record))
        .layer(TraceLayer::new_for_http())
        .with_state(db.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { address, db }
}

/// Fresh client state against `backend` with its own in-memory store.
pub async fn test_state(backend: &MockBackend, clock: Arc<ManualClock>) -> AppState {
    let config = Config::for_base_url(&backend.address);
    let pool = store::connect(&config).await.expect("Failed to open store");
    AppState::with_pool(config, pool, clock)
        .await
        .expect("Failed to build state")
}

/// Second client instance sharing `other`'s local store.
pub async fn sibling_state(other: &AppState, clock: Arc<ManualClock>) -> AppState {
    AppState::with_pool(other.config.clone(), other.pool.clone(), clock)
        .await
        .expect("Failed to build state")
}

pub async fn login_as(state: &AppState, username: &str) -> Session {
    auth::login(
        state,
        LoginRequest {
            username: username.to_string(),
            password: PASSWORD.to_string(),
        },
    )
    .await
    .expect("Login failed")
}

async fn record(State(db): State<Db>, req: Request, next: Next) -> Response {
    let line = format!("{} {}", req.method(), req.uri());
    let has_token = req.headers().contains_key("authorization");
    let reject = {
        let mut db = db.lock().unwrap();
        db.requests.push(line);
        db.reject_tokens && has_token
    };
    if reject {
        return error(StatusCode::UNAUTHORIZED, "Token expired");
    }
    next.run(req).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn field<'a>(row: &'a Value, name: &str) -> Option<&'a Value> {
    row.as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn id_of(row: &Value, key: &str) -> i64 {
    field(row, key).and_then(Value::as_i64).unwrap_or_default()
}

fn pascalize(body: &Value) -> Map<String, Value> {
    body.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let mut chars = k.chars();
                    let key = match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    };
                    (key, v.clone())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn merge(row: &mut Value, body: &Value) {
    if let Some(obj) = row.as_object_mut() {
        for (k, v) in pascalize(body) {
            obj.insert(k, v);
        }
    }
}

async fn login(State(db): State<Db>, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let db = db.lock().unwrap();
    let user = db.users.iter().find(|u| {
        u["Username"] == username && u["Status"].as_str().is_some_and(|s| s.eq_ignore_ascii_case("active"))
    });
    match user {
        Some(user) if password == PASSWORD => {
            let user_id = user["UserId"].as_i64().unwrap_or_default();
            let role = user["Role"].as_str().unwrap_or("student");
            let token = make_token(user_id, role, Utc::now() + chrono::Duration::hours(2));
            Json(json!({
                "token": token,
                "user": { "userId": user_id, "fullName": user["FullName"], "role": role },
            }))
            .into_response()
        }
        _ => error(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn register(State(db): State<Db>, Json(body): Json<Value>) -> Response {
    let mut db = db.lock().unwrap();
    if db.users.iter().any(|u| u["Username"] == body["username"]) {
        return error(StatusCode::BAD_REQUEST, "Username already exists");
    }
    let id = db.users.iter().map(|u| id_of(u, "UserId")).max().unwrap_or_default() + 1;
    db.users.push(json!({
        "UserId": id,
        "Username": body["username"],
        "FullName": body["fullName"],
        "Email": body["email"],
        "Role": "student",
        "Status": "active",
        "CreatedAt": stamp(0),
    }));
    (StatusCode::CREATED, Json(json!({ "message": "Registered" }))).into_response()
}

async fn get_user(State(db): State<Db>, Path(id): Path<i64>) -> Response {
    let db = db.lock().unwrap();
    match db.users.iter().find(|u| id_of(u, "UserId") == id) {
        Some(user) => Json(user.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn put_user(State(db): State<Db>, Path(id): Path<i64>, Json(body): Json<Value>) -> Response {
    let mut db = db.lock().unwrap();
    match db.users.iter_mut().find(|u| id_of(u, "UserId") == id) {
        Some(user) => {
            merge(user, &body);
            Json(user.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn all_results(State(db): State<Db>) -> Response {
    Json(db.lock().unwrap().results.clone()).into_response()
}

async fn quiz_code(State(db): State<Db>, Path(id): Path<i64>) -> Response {
    let db = db.lock().unwrap();
    if db.quizzes.iter().any(|q| id_of(q, "QuizId") == id) {
        Json(json!({ "code": format!("QZ{:04}", id) })).into_response()
    } else {
        error(StatusCode::NOT_FOUND, "Quiz not found")
    }
}

async fn submit(State(db): State<Db>, Json(body): Json<Value>) -> Response {
    let (delay, fail) = {
        let mut db = db.lock().unwrap();
        db.submissions.push(body.clone());
        (db.submit_delay, db.fail_submit)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if fail {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable");
    }

    let mut db = db.lock().unwrap();
    let quiz_id = body["quizId"].as_i64().unwrap_or_default();
    let student_id = body["studentId"].as_i64().unwrap_or_default();
    let questions: Vec<&Value> = db
        .questions
        .iter()
        .filter(|q| id_of(q, "QuizId") == quiz_id && q["Status"] == "active")
        .collect();

    let answers: Vec<Value> = body["answers"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|a| {
            let question = questions.iter().find(|q| q["QuestionId"] == a["questionId"]);
            let is_correct = question.is_some_and(|q| {
                q["Options"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .any(|o| o["Content"] == a["answerContent"] && o["IsCorrect"] == true)
            });
            json!({ "questionId": a["questionId"], "answerContent": a["answerContent"], "isCorrect": is_correct })
        })
        .collect();

    let correct = answers.iter().filter(|a| a["isCorrect"] == true).count();
    let score = if questions.is_empty() {
        0.0
    } else {
        correct as f64 * 100.0 / questions.len() as f64
    };
    let title = db
        .quizzes
        .iter()
        .find(|q| id_of(q, "QuizId") == quiz_id)
        .map(|q| q["Title"].clone())
        .unwrap_or(Value::Null);
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let result = json!({
        "resultId": db.results.len() as i64 + 1,
        "score": score,
        "startTime": now,
        "endTime": now,
        "quizId": quiz_id,
        "quiz": { "quizId": quiz_id, "title": title },
        "studentId": student_id,
        "quizCode": format!("QZ{:04}", quiz_id),
        "answers": answers,
        "createdAt": now,
    });
    db.results.push(result.clone());
    Json(result).into_response()
}

fn collection<'a>(db: &'a mut MockDb, entity: &str) -> Option<(&'a mut Vec<Value>, &'static str)> {
    match entity {
        "Subject" => Some((&mut db.subjects, "SubjectId")),
        "Quiz" => Some((&mut db.quizzes, "QuizId")),
        "Question" => Some((&mut db.questions, "QuestionId")),
        "User" => Some((&mut db.users, "UserId")),
        "Result" => Some((&mut db.results, "ResultId")),
        _ => None,
    }
}

async fn create_entity(
    State(db): State<Db>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut db = db.lock().unwrap();
    if entity == "Option" {
        let question_id = body["questionId"].as_i64().unwrap_or_default();
        let next_id = db
            .questions
            .iter()
            .flat_map(|q| q["Options"].as_array().cloned().unwrap_or_default())
            .map(|o| id_of(&o, "OptionId"))
            .max()
            .unwrap_or_default()
            + 1;
        let Some(question) = db.questions.iter_mut().find(|q| id_of(q, "QuestionId") == question_id) else {
            return error(StatusCode::NOT_FOUND, "Question not found");
        };
        let mut option = Value::Object(pascalize(&body));
        option["OptionId"] = json!(next_id);
        if let Some(options) = question["Options"].as_array_mut() {
            options.push(option.clone());
        }
        return (StatusCode::CREATED, Json(option)).into_response();
    }

    let Some((rows, key)) = collection(&mut db, &entity) else {
        return error(StatusCode::NOT_FOUND, "Unknown entity");
    };
    let id = rows.iter().map(|r| id_of(r, key)).max().unwrap_or_default() + 1;
    let mut row = Value::Object(pascalize(&body));
    row[key] = json!(id);
    row["CreatedAt"] = json!(stamp(0));
    if entity == "Question" {
        row["Options"] = json!([]);
    }
    rows.push(row.clone());
    (StatusCode::CREATED, Json(row)).into_response()
}

async fn update_entity(
    State(db): State<Db>,
    Path(entity): Path<String>,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
) -> Response {
    let id = query
        .as_deref()
        .and_then(|q| q.split_once('='))
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .unwrap_or_default();
    let mut db = db.lock().unwrap();

    if entity == "Option" {
        let option = db
            .questions
            .iter_mut()
            .filter_map(|q| q["Options"].as_array_mut())
            .flatten()
            .find(|o| id_of(o, "OptionId") == id);
        return match option {
            Some(option) => {
                merge(option, &body);
                Json(option.clone()).into_response()
            }
            None => error(StatusCode::NOT_FOUND, "Option not found"),
        };
    }

    let Some((rows, key)) = collection(&mut db, &entity) else {
        return error(StatusCode::NOT_FOUND, "Unknown entity");
    };
    match rows.iter_mut().find(|r| id_of(r, key) == id) {
        Some(row) => {
            merge(row, &body);
            Json(row.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn unquote(literal: &str) -> String {
    literal
        .trim()
        .trim_start_matches('\'')
        .trim_end_matches('\'')
        .replace("''", "'")
}

fn clause_matches(row: &Value, clause: &str) -> bool {
    if let Some(inner) = clause.strip_prefix("contains(").and_then(|c| c.strip_suffix(')')) {
        let Some((prop, literal)) = inner.split_once(',') else {
            return false;
        };
        let needle = unquote(literal).to_lowercase();
        return field(row, prop)
            .and_then(Value::as_str)
            .is_some_and(|v| v.to_lowercase().contains(&needle));
    }

    let parts: Vec<&str> = clause.splitn(3, ' ').collect();
    let [prop, op, literal] = parts.as_slice() else {
        return false;
    };
    let value = field(row, prop);
    match *op {
        "eq" => match literal.parse::<i64>() {
            Ok(n) => value.and_then(Value::as_i64) == Some(n),
            Err(_) => value.and_then(Value::as_str) == Some(unquote(literal).as_str()),
        },
        "ge" => value.and_then(Value::as_str).is_some_and(|v| v >= *literal),
        "le" => value.and_then(Value::as_str).is_some_and(|v| v <= *literal),
        _ => false,
    }
}

async fn odata(State(db): State<Db>, Path(entity): Path<String>, RawQuery(query): RawQuery) -> Response {
    let params: Vec<(String, String)> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .into_owned()
        .collect();
    let param = |name: &str| params.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

    let mut db = db.lock().unwrap();
    let Some((rows, _)) = collection(&mut db, &entity) else {
        return error(StatusCode::NOT_FOUND, "Unknown entity");
    };

    let mut matched: Vec<Value> = rows
        .iter()
        .filter(|row| match param("$filter") {
            Some(filter) => filter.split(" and ").all(|c| clause_matches(row, c)),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(order) = param("$orderby") {
        let (prop, direction) = order.split_once(' ').unwrap_or((order.as_str(), "asc"));
        let key = |r: &Value| field(r, prop).and_then(Value::as_str).unwrap_or_default().to_string();
        matched.sort_by_key(key);
        if direction == "desc" {
            matched.reverse();
        }
    }

    let count = matched.len();
    let skip = param("$skip").and_then(|s| s.parse().ok()).unwrap_or(0);
    let top = param("$top").and_then(|s| s.parse().ok()).unwrap_or(usize::MAX);
    let page: Vec<Value> = matched.into_iter().skip(skip).take(top).collect();

    let mut body = json!({ "value": page });
    if param("$count").as_deref() == Some("true") {
        body["@odata.count"] = json!(count);
    }
    Json(body).into_response()
}
