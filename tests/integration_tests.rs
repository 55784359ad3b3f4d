use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use auth_web_app::{
    build_router, AppState, AuthConfig, AuthService, Config, CreateUser, Database, GoogleConfig,
    GoogleOAuth, Provider, SessionIssuer, SessionManager, SessionToken, SessionUser,
    UserRepository, UserStore,
};

struct TestApp {
    server: TestServer,
    database: Database,
    _db_file: NamedTempFile,
}

async fn setup_test_app(google_server: Option<&MockServer>) -> TestApp {
    let db_file = NamedTempFile::new().unwrap();
    let database_url = format!("sqlite:{}", db_file.path().to_str().unwrap());

    let google = google_server.map(|server| GoogleConfig {
        client_id: "test_google_client_id".to_string(),
        client_secret: "test_google_client_secret".to_string(),
        auth_url: format!("{}/o/oauth2/v2/auth", server.uri()),
        token_url: format!("{}/token", server.uri()),
        userinfo_url: format!("{}/v1/userinfo", server.uri()),
    });

    let config = Config {
        database_url: database_url.clone(),
        auth_secret: "test_auth_secret_key_for_testing_purposes".to_string(),
        base_url: "http://localhost:3000".to_string(),
        session_max_age: 86400,
        secure_cookies: false,
        google,
    };

    let database = Database::new(&database_url).await.unwrap();
    let user_repository = UserRepository::new(database.pool().clone());

    let google_oauth = GoogleOAuth::from_config(&config).unwrap();
    let auth_service = AuthService::new(google_oauth, Arc::new(user_repository));
    let app_state = AppState::new(AuthConfig::from_config(&config), auth_service, &config.auth_secret);

    let session_manager = SessionManager::new(false);
    let mut server = TestServer::new(build_router(app_state, &session_manager)).unwrap();
    server.save_cookies();

    TestApp {
        server,
        database,
        _db_file: db_file,
    }
}

async fn seed_user(app: &TestApp, email: &str, password: &str, provider: Provider) {
    let password_hash = if password.is_empty() {
        String::new()
    } else {
        bcrypt::hash(password, 4).unwrap()
    };

    UserRepository::new(app.database.pool().clone())
        .create(CreateUser {
            email: email.to_string(),
            firstname: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            password_hash,
            provider,
        })
        .await
        .unwrap();
}

async fn sign_in(app: &TestApp, email: &str, password: &str) -> TestResponse {
    app.server
        .post("/auth/credentials")
        .form(&[("email", email), ("password", password)])
        .await
}

async fn mount_google(mock_server: &MockServer, name: &str, email: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "google-access-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "google-user-1",
            "name": name,
            "email": email,
            "email_verified": true
        })))
        .mount(mock_server)
        .await;
}

/// Starts the Google flow and returns the CSRF state the app generated.
async fn start_google_flow(app: &TestApp) -> String {
    let response = app.server.get("/auth/google").await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    let url = reqwest::Url::parse(&location(&response)).unwrap();
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

fn location(response: &TestResponse) -> String {
    response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookies(response: &TestResponse) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn session_cookie(response: &TestResponse) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|cookie| cookie.starts_with("auth_session_token="))
}

async fn count_users(app: &TestApp, email: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(app.database.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_root_redirects_to_login_when_not_authenticated() {
    let app = setup_test_app(None).await;

    let response = app.server.get("/").await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_login_page_renders_successfully() {
    let mock_server = MockServer::start().await;
    let app = setup_test_app(Some(&mock_server)).await;

    let response = app.server.get("/login").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.contains("Login"));
    assert!(body.contains("Continue with Google"));
    assert!(response.headers()["content-type"].to_str().unwrap().contains("text/html"));
}

#[tokio::test]
async fn test_login_page_hides_disabled_google() {
    let app = setup_test_app(None).await;

    let body = app.server.get("/login").await.text();
    assert!(!body.contains("Continue with Google"));
}

#[tokio::test]
async fn test_login_page_displays_error_and_provider_hint() {
    let app = setup_test_app(None).await;

    let body = app.server.get("/login?error=Test%20error%20message").await.text();
    assert!(body.contains("Test error message"));

    let body = app.server.get("/login?provider=credentials").await.text();
    assert!(body.contains("already registered with credentials"));
}

#[tokio::test]
async fn test_template_rendering_escapes_error() {
    let app = setup_test_app(None).await;

    let response = app
        .server
        .get("/login?error=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!response.text().contains("<script>"));
}

#[tokio::test]
async fn test_credentials_sign_in_and_home_page() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;

    let response = sign_in(&app, "Ada@Example.com", "hunter22").await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=86400"));

    let home = app.server.get("/").await;
    assert_eq!(home.status_code(), StatusCode::OK);
    let body = home.text();
    assert!(body.contains("Hello Ada Lovelace"));
    assert!(body.contains("ada@example.com"));
}

#[tokio::test]
async fn test_guarded_request_reissues_session_cookie() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    sign_in(&app, "ada@example.com", "hunter22").await;

    let home = app.server.get("/").await;

    assert_eq!(home.status_code(), StatusCode::OK);
    assert!(session_cookie(&home).is_some());
}

#[tokio::test]
async fn test_wrong_password_is_generic_failure() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;

    let wrong_password = sign_in(&app, "ada@example.com", "hunter23").await;
    let unknown_user = sign_in(&app, "ghost@example.com", "hunter22").await;
    let malformed = sign_in(&app, "not-an-email", "hunter22").await;

    for response in [&wrong_password, &unknown_user, &malformed] {
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(location(response), "/login?error=Invalid%20credentials%21");
        assert!(session_cookie(response).is_none());
    }
}

#[tokio::test]
async fn test_google_account_cannot_use_password() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "", Provider::Google).await;

    let response = sign_in(&app, "ada@example.com", "").await;
    assert_eq!(location(&response), "/login?error=Invalid%20credentials%21");

    let response = sign_in(&app, "ada@example.com", "guess").await;
    assert_eq!(location(&response), "/login?error=Invalid%20credentials%21");
}

#[tokio::test]
async fn test_signed_in_user_is_sent_home_from_login() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    sign_in(&app, "ada@example.com", "hunter22").await;

    for page in ["/login", "/signup"] {
        let response = app.server.get(page).await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }
}

#[tokio::test]
async fn test_tampered_session_is_treated_as_signed_out() {
    let app = setup_test_app(None).await;

    let response = app
        .server
        .get("/")
        .add_header(
            header::COOKIE,
            HeaderValue::from_static("auth_session_token=eyJhbGciOiJIUzI1NiJ9.e30.forged"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let cookie = session_cookie(&response).expect("stale session cookie should be cleared");
    assert!(cookie.starts_with("auth_session_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_anonymous_redirect_leaves_cookies_alone() {
    let app = setup_test_app(None).await;

    let response = app.server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_session_read() {
    let app = setup_test_app(None).await;

    let anonymous = app.server.get("/auth/session").await;
    assert_eq!(anonymous.status_code(), StatusCode::OK);
    assert_eq!(anonymous.json::<Option<SessionUser>>(), None);

    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    sign_in(&app, "ada@example.com", "hunter22").await;

    let user = app.server.get("/auth/session").await.json::<Option<SessionUser>>().unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.name, "Ada Lovelace");
    assert!(user.id.is_some());
}

#[tokio::test]
async fn test_session_read_fills_in_missing_id() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    let stored = UserRepository::new(app.database.pool().clone())
        .find_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();

    let raw = SessionIssuer::new("test_auth_secret_key_for_testing_purposes", 86400)
        .issue(&SessionToken::new("ada@example.com", "Ada"))
        .unwrap();

    let response = app
        .server
        .get("/auth/session")
        .add_header(
            header::COOKIE,
            HeaderValue::from_str(&format!("auth_session_token={}", raw)).unwrap(),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(session_cookie(&response).is_some());

    let user = response.json::<Option<SessionUser>>().unwrap();
    assert_eq!(user.id, Some(stored.id.to_string()));
    assert_eq!(user.name, "Ada Lovelace");
}

#[tokio::test]
async fn test_session_update_changes_only_name() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    sign_in(&app, "ada@example.com", "hunter22").await;
    let before = app.server.get("/auth/session").await.json::<Option<SessionUser>>().unwrap();

    let response = app
        .server
        .post("/auth/session")
        .json(&json!({ "name": "New Name" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let after = response.json::<SessionUser>();
    assert_eq!(after.name, "New Name");
    assert_eq!(after.id, before.id);
    assert_eq!(after.email, before.email);

    let home = app.server.get("/").await.text();
    assert!(home.contains("Hello New Name"));
}

#[tokio::test]
async fn test_session_update_requires_session() {
    let app = setup_test_app(None).await;

    let response = app
        .server
        .post("/auth/session")
        .json(&json!({ "name": "New Name" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_logout_clears_session_cookie() {
    let app = setup_test_app(None).await;

    let response = app.server.post("/logout").await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cookie = session_cookie(&response).unwrap();
    assert!(cookie.starts_with("auth_session_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_signup_creates_credentials_user() {
    let app = setup_test_app(None).await;

    let response = app
        .server
        .post("/signup")
        .form(&[
            ("firstname", "Grace"),
            ("lastname", "Hopper"),
            ("email", "Grace@Example.com"),
            ("password", "cobol1959"),
        ])
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(session_cookie(&response).is_some());

    let user = UserRepository::new(app.database.pool().clone())
        .find_by_email("grace@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.provider, Provider::Credentials);
    assert!(bcrypt::verify("cobol1959", &user.password_hash).unwrap());

    let home = app.server.get("/").await.text();
    assert!(home.contains("Hello Grace Hopper"));
}

#[tokio::test]
async fn test_signup_rejects_taken_email_and_bad_input() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;

    let taken = app
        .server
        .post("/signup")
        .form(&[
            ("firstname", "Ada"),
            ("email", "ada@example.com"),
            ("password", "another"),
        ])
        .await;
    assert_eq!(taken.status_code(), StatusCode::SEE_OTHER);
    assert!(location(&taken).starts_with("/signup?error="));

    let invalid = app
        .server
        .post("/signup")
        .form(&[("firstname", ""), ("email", "nope"), ("password", "")])
        .await;
    assert!(location(&invalid).starts_with("/signup?error="));
    assert_eq!(count_users(&app, "ada@example.com").await, 1);
}

#[tokio::test]
async fn test_google_sign_in_creates_user() {
    let mock_server = MockServer::start().await;
    mount_google(&mock_server, "Grace Hopper", "grace@example.com").await;
    let app = setup_test_app(Some(&mock_server)).await;

    let state = start_google_flow(&app).await;
    let response = app
        .server
        .get(&format!("/auth/callback/google?code=auth-code&state={}", state))
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(session_cookie(&response).is_some());
    assert_eq!(count_users(&app, "grace@example.com").await, 1);

    let home = app.server.get("/").await.text();
    assert!(home.contains("Hello Grace Hopper"));
}

#[tokio::test]
async fn test_repeat_google_sign_in_reuses_user() {
    let mock_server = MockServer::start().await;
    mount_google(&mock_server, "Grace Hopper", "grace@example.com").await;
    let app = setup_test_app(Some(&mock_server)).await;

    for _ in 0..2 {
        let state = start_google_flow(&app).await;
        let response = app
            .server
            .get(&format!("/auth/callback/google?code=auth-code&state={}", state))
            .await;
        assert_eq!(location(&response), "/");
    }

    assert_eq!(count_users(&app, "grace@example.com").await, 1);
}

#[tokio::test]
async fn test_google_sign_in_refuses_credentials_account() {
    let mock_server = MockServer::start().await;
    mount_google(&mock_server, "Ada Lovelace", "ada@example.com").await;
    let app = setup_test_app(Some(&mock_server)).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;

    let state = start_google_flow(&app).await;
    let response = app
        .server
        .get(&format!("/auth/callback/google?code=auth-code&state={}", state))
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?provider=credentials");
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_google_callback_csrf_protection() {
    let mock_server = MockServer::start().await;
    mount_google(&mock_server, "Grace Hopper", "grace@example.com").await;
    let app = setup_test_app(Some(&mock_server)).await;

    start_google_flow(&app).await;
    let response = app
        .server
        .get("/auth/callback/google?code=auth-code&state=invalid_state")
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?error="));
    assert_eq!(count_users(&app, "grace@example.com").await, 0);
}

#[tokio::test]
async fn test_google_callback_without_flow_is_rejected() {
    let mock_server = MockServer::start().await;
    let app = setup_test_app(Some(&mock_server)).await;

    let response = app
        .server
        .get("/auth/callback/google?code=auth-code&state=some_state")
        .await;
    assert!(location(&response).contains("Security%20error"));

    let response = app.server.get("/auth/callback/google?state=some_state").await;
    assert!(location(&response).starts_with("/login?error="));
}

#[tokio::test]
async fn test_google_oauth_error_handling() {
    let mock_server = MockServer::start().await;
    let app = setup_test_app(Some(&mock_server)).await;

    let response = app
        .server
        .get("/auth/callback/google?error=access_denied")
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert!(location(&response).contains("Google%20authentication%20failed"));
}

#[tokio::test]
async fn test_disabled_google_provider() {
    let app = setup_test_app(None).await;

    let response = app.server.get("/auth/google").await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert!(location(&response).contains("Invalid%20login%20provider"));
}

#[tokio::test]
async fn test_unknown_route_redirects_anonymous_visitor() {
    let app = setup_test_app(None).await;

    let response = app.server.get("/dashboard").await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_invalid_routes_return_404_when_signed_in() {
    let app = setup_test_app(None).await;
    seed_user(&app, "ada@example.com", "hunter22", Provider::Credentials).await;
    sign_in(&app, "ada@example.com", "hunter22").await;

    let response = app.server.get("/nonexistent-route").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let app = setup_test_app(None).await;

    let response = app.server.get("/logout").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    let response = app.server.get("/auth/credentials").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}
