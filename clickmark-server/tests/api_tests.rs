//! Integration tests for clickmark-server endpoints
//!
//! Each test builds the full router over a fresh database and upload folder
//! in a temp directory and drives it with `oneshot` requests, carrying the
//! session cookie by hand between requests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use clickmark_common::config::ParticipantMode;
use clickmark_common::db::{init_database, Role, SqliteRepository, StudyRepository};
use clickmark_common::password::hash_password;
use clickmark_server::session::SessionStore;
use clickmark_server::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const BOUNDARY: &str = "clickmark-test-boundary";

struct TestApp {
    router: Router,
    state: AppState,
    pool: SqlitePool,
    upload_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    async fn new(mode: ParticipantMode) -> Self {
        Self::with_sessions(mode, SessionStore::new("test-secret")).await
    }

    async fn with_sessions(mode: ParticipantMode, sessions: SessionStore) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("instance/app.db")).await.unwrap();
        let upload_dir = dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();

        let repo: Arc<dyn StudyRepository> = Arc::new(SqliteRepository::new(pool.clone()));
        let state = AppState::new(repo, sessions, mode, upload_dir.clone());

        Self {
            router: build_router(state.clone()),
            state,
            pool,
            upload_dir,
            _dir: dir,
        }
    }

    async fn add_identity(&self, username: &str, password: &str, role: Role) -> i64 {
        self.state
            .repo
            .insert_identity(username, &hash_password(password).unwrap(), role)
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Log in and return the session cookie
    async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .send(form_request("/login", None, &format!("username={}&password={}", username, password)))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("login should set a session cookie")
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn form_request(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn json_request(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Multipart upload of `(field, filename, content)` parts
fn upload_request(cookie: Option<&str>, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder().method("POST").uri("/upload").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// `name=value` part of the session `Set-Cookie` header
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("session=") && pair.len() > "session=".len())
        .map(str::to_string)
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn extract_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

const DEMOGRAPHICS_FORM: &str =
    "participant_id=P1&age=30&gender=female&education=msc&handedness=right&ethnicity=n%2Fa";

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(ParticipantMode::Account).await;

    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "clickmark-server");
    assert!(body["version"].is_string());
}

// =============================================================================
// Login / logout
// =============================================================================

#[tokio::test]
async fn test_wrong_password_leaves_no_session() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("alice", "right-password", Role::Participant).await;

    for body in ["username=alice&password=wrong", "username=nobody&password=right-password"] {
        let response = app.send(form_request("/login", None, body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(session_cookie(&response).is_none());
        assert_eq!(extract_bytes(response.into_body()).await, b"Invalid credentials");
    }

    assert!(app.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_login_lands_by_role() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    app.add_identity("alice", "pw", Role::Participant).await;

    let response = app.send(form_request("/login", None, "username=admin&password=pw")).await;
    assert_eq!(location(&response), "/admin");
    let admin_cookie = session_cookie(&response).unwrap();
    let response = app.send(get("/admin", Some(&admin_cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(form_request("/login", None, "username=alice&password=pw")).await;
    assert_eq!(location(&response), "/user");
}

#[tokio::test]
async fn test_relogin_replaces_session() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;

    let first = app.login("admin", "pw").await;
    let response = app
        .send(form_request("/login", Some(&first), "username=admin&password=pw"))
        .await;
    let second = session_cookie(&response).unwrap();

    assert_ne!(first, second);
    assert_eq!(app.state.sessions.len().await, 1);
    let response = app.send(get("/admin", Some(&first))).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_logout_destroys_session() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let response = app.send(form_request("/logout", Some(&cookie), "")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(app.state.sessions.is_empty().await);

    let response = app.send(get("/admin", Some(&cookie))).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_forged_cookie_is_no_session() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let other = SessionStore::new("other-secret");
    let id = cookie
        .trim_start_matches("session=")
        .split('.')
        .next()
        .unwrap()
        .parse()
        .unwrap();
    let forged = format!("session={}", other.cookie_value(id));

    let response = app.send(get("/admin", Some(&forged))).await;
    assert_eq!(location(&response), "/login");
}

// =============================================================================
// Workflow gating
// =============================================================================

#[tokio::test]
async fn test_incomplete_demographics_redirected_everywhere() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("alice", "pw", Role::Participant).await;
    let cookie = app.login("alice", "pw").await;

    for uri in ["/user", "/instructions", "/instructions2"] {
        let response = app.send(get(uri, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/demographics", "{}", uri);
    }

    for uri in ["/instructions", "/instructions2"] {
        let response = app.send(form_request(uri, Some(&cookie), "")).await;
        assert_eq!(location(&response), "/demographics", "POST {}", uri);
    }
}

#[tokio::test]
async fn test_logged_out_redirects_by_mode() {
    let account = TestApp::new(ParticipantMode::Account).await;
    assert_eq!(location(&account.send(get("/user", None)).await), "/login");
    assert_eq!(location(&account.send(get("/demographics", None)).await), "/login");
    assert_eq!(location(&account.send(get("/", None)).await), "/login");

    let anonymous = TestApp::new(ParticipantMode::Anonymous).await;
    assert_eq!(location(&anonymous.send(get("/user", None)).await), "/");
    assert_eq!(anonymous.send(get("/", None)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_sent_home_from_participant_pages() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    for uri in ["/user", "/instructions", "/instructions2", "/demographics"] {
        let response = app.send(get(uri, Some(&cookie))).await;
        assert_eq!(location(&response), "/admin", "{}", uri);
    }
}

#[tokio::test]
async fn test_invalid_age_rejected() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("alice", "pw", Role::Participant).await;
    let cookie = app.login("alice", "pw").await;

    let response = app
        .send(form_request("/demographics", Some(&cookie), "participant_id=P1&age=old"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.count("demographics").await, 0);
}

// =============================================================================
// Participant flows
// =============================================================================

#[tokio::test]
async fn test_account_participant_full_flow() {
    let app = TestApp::new(ParticipantMode::Account).await;
    let identity_id = app.add_identity("alice", "pw", Role::Participant).await;
    let cookie = app.login("alice", "pw").await;

    let response = app.send(form_request("/demographics", Some(&cookie), DEMOGRAPHICS_FORM)).await;
    assert_eq!(location(&response), "/instructions");
    assert_eq!(app.count("demographics").await, 1);

    // Demographics are created once per session
    let response = app.send(get("/demographics", Some(&cookie))).await;
    assert_eq!(location(&response), "/instructions");

    let response = app.send(form_request("/instructions", Some(&cookie), "")).await;
    assert_eq!(location(&response), "/instructions2");
    let response = app.send(form_request("/instructions2", Some(&cookie), "")).await;
    assert_eq!(location(&response), "/user");
    assert_eq!(app.send(get("/user", Some(&cookie))).await.status(), StatusCode::OK);

    let response = app
        .send(json_request(
            "/save_user_locations",
            Some(&cookie),
            json!({
                "question": "Where is the cat?",
                "locations": [
                    {"final_x": 10.5, "final_y": 20.0, "src": "a.png"},
                    {"final_x": 3.0, "final_y": 4.0, "src": "b.png"}
                ]
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/end");

    assert_eq!(app.count("demographics").await, 1);
    assert_eq!(app.count("user_locations").await, 2);
    assert!(app.state.sessions.is_empty().await);

    let demographics = app
        .state
        .repo
        .find_demographics_for_identity(identity_id)
        .await
        .unwrap()
        .unwrap();
    assert!(demographics.end_time.is_some());

    // Session is gone after submission
    let response = app.send(get("/user", Some(&cookie))).await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_anonymous_submission_writes_one_demographics_row() {
    let app = TestApp::new(ParticipantMode::Anonymous).await;

    let response = app.send(form_request("/", None, DEMOGRAPHICS_FORM)).await;
    assert_eq!(location(&response), "/instructions");
    let cookie = session_cookie(&response).unwrap();

    // Held in the session until submission
    assert_eq!(app.count("demographics").await, 0);
    let response = app.send(get("/load_user_locations", Some(&cookie))).await;
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["locations"], json!([]));

    let response = app
        .send(json_request(
            "/save_user_locations",
            Some(&cookie),
            json!({"locations": [{"final_x": 1, "final_y": 2, "src": "a.png"}]}),
        ))
        .await;
    assert_eq!(location(&response), "/end");

    assert_eq!(app.count("demographics").await, 1);
    assert_eq!(app.count("user_locations").await, 1);
    assert!(app.state.sessions.is_empty().await);

    let (x, y, src): (f64, f64, String) =
        sqlx::query_as("SELECT final_x, final_y, src FROM user_locations")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!((x, y, src.as_str()), (1.0, 2.0, "a.png"));
}

#[tokio::test]
async fn test_concurrent_submits_write_once() {
    let app = TestApp::new(ParticipantMode::Anonymous).await;

    let response = app.send(form_request("/", None, DEMOGRAPHICS_FORM)).await;
    let cookie = session_cookie(&response).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let router = app.router.clone();
        let request = json_request(
            "/save_user_locations",
            Some(&cookie),
            json!({"locations": [{"final_x": 1, "final_y": 2, "src": "a.png"}]}),
        );
        handles.push(tokio::spawn(async move { router.oneshot(request).await.unwrap() }));
    }

    let mut finished = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        if location(&response) == "/end" {
            finished += 1;
        }
    }

    assert_eq!(finished, 1);
    assert_eq!(app.count("demographics").await, 1);
    assert_eq!(app.count("user_locations").await, 1);
    assert!(app.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_failed_submission_keeps_session() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("alice", "pw", Role::Participant).await;
    let cookie = app.login("alice", "pw").await;
    app.send(form_request("/demographics", Some(&cookie), DEMOGRAPHICS_FORM)).await;

    // Demographics row vanishes underneath the session, so the write fails
    sqlx::query("DELETE FROM demographics").execute(&app.pool).await.unwrap();

    let request = || {
        json_request(
            "/save_user_locations",
            Some(&cookie),
            json!({"locations": [{"final_x": 1, "final_y": 2, "src": "a.png"}]}),
        )
    };
    let response = app.send(request()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.state.sessions.len().await, 1);
    assert_eq!(app.count("user_locations").await, 0);

    let response = app.send(get("/user", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_abandoned_anonymous_sessions_reclaimed() {
    let sessions =
        SessionStore::new("test-secret").with_idle_timeout(chrono::Duration::seconds(1));
    let app = TestApp::with_sessions(ParticipantMode::Anonymous, sessions).await;

    for _ in 0..20 {
        let response = app.send(form_request("/", None, DEMOGRAPHICS_FORM)).await;
        assert_eq!(location(&response), "/instructions");
    }
    assert_eq!(app.state.sessions.len().await, 20);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    let response = app.send(form_request("/", None, DEMOGRAPHICS_FORM)).await;
    let cookie = session_cookie(&response).unwrap();
    assert_eq!(app.state.sessions.len().await, 1);
    assert_eq!(app.send(get("/instructions", Some(&cookie))).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_submission_without_session_expired() {
    let app = TestApp::new(ParticipantMode::Anonymous).await;

    let response = app
        .send(json_request(
            "/save_user_locations",
            None,
            json!({"locations": [{"final_x": 1, "final_y": 2, "src": "a.png"}]}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert_eq!(app.count("user_locations").await, 0);
}

// =============================================================================
// Admin coordinates
// =============================================================================

#[tokio::test]
async fn test_admin_batches_append() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let batch = json!({
        "question": "Where is the exit?",
        "locations": [{"initial_x": 5.0, "initial_y": 6.0, "src": "a.png"}]
    });
    for _ in 0..2 {
        let response = app
            .send(json_request("/save_admin_locations", Some(&cookie), batch.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["message"], "Admin locations saved successfully");
    }

    assert_eq!(app.count("admin_locations").await, 2);

    let response = app.send(get("/load_admin_locations", Some(&cookie))).await;
    let body = extract_json(response.into_body()).await;
    let locations = body["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 2);
    assert!(locations.iter().all(|l| l["question"] == "Where is the exit?"));
}

#[tokio::test]
async fn test_admin_locations_require_admin() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("alice", "pw", Role::Participant).await;
    let cookie = app.login("alice", "pw").await;

    let response = app
        .send(json_request(
            "/save_admin_locations",
            Some(&cookie),
            json!({"question": "q", "locations": []}),
        ))
        .await;
    assert_eq!(location(&response), "/login");

    let response = app.send(get("/load_admin_locations", None)).await;
    assert_eq!(location(&response), "/login");
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
async fn test_upload_last_write_wins() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let response = app
        .send(upload_request(
            Some(&cookie),
            &[("files[]", "a.png", &b"first"[..]), ("files[]", "a.png", &b"second"[..])],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["message"], "Files uploaded successfully");

    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 1);
    assert_eq!(std::fs::read(app.upload_dir.join("a.png")).unwrap(), &b"second"[..]);

    let response = app.send(get("/uploads/a.png", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_bytes(response.into_body()).await, &b"second"[..]);
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let response = app.send(upload_request(Some(&cookie), &[("files[]", "", &b""[..])])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["message"], "No files uploaded");
}

#[tokio::test]
async fn test_upload_requires_login() {
    let app = TestApp::new(ParticipantMode::Anonymous).await;

    let response = app.send(upload_request(None, &[("files[]", "a.png", &b"x"[..])])).await;
    assert_eq!(location(&response), "/login");
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_rejected_name_aborts_whole_upload() {
    let app = TestApp::new(ParticipantMode::Account).await;
    app.add_identity("admin", "pw", Role::Admin).await;
    let cookie = app.login("admin", "pw").await;

    let response = app
        .send(upload_request(
            Some(&cookie),
            &[("files[]", "a.png", &b"kept out"[..]), ("files[]", "..", &b"x"[..])],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(&app.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_upload_not_found() {
    let app = TestApp::new(ParticipantMode::Account).await;

    let response = app.send(get("/uploads/missing.png", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
