use askama::Template;
use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    credentials::{self, SignInForm},
    error::{AppError, AuthError},
    models::{CreateUser, Provider, SessionPatch, SessionUser},
    session::{removal_cookie_header, session_cookie_header, CurrentUser, SessionExt},
    state::AppState,
    templates::{HomeTemplate, LoginTemplate, SignupTemplate},
    token::{enrich, SessionToken, TokenContext},
};

// Query parameters for OAuth2 callbacks
#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupQuery {
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn issue_cookie(state: &AppState, token: &SessionToken) -> Result<HeaderValue, AppError> {
    let raw = state.issuer.issue(token)?;
    session_cookie_header(
        &raw,
        state.issuer.max_age(),
        state.auth_config.secure_cookies,
    )
}

/// Signs `token` into a cookie and sends the browser home.
fn signed_in_response(state: &AppState, token: &SessionToken) -> Result<Response, AppError> {
    let cookie = issue_cookie(state, token)?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

fn ensure_enabled(state: &AppState, provider: Provider) -> Result<(), AuthError> {
    if state.auth_config.is_enabled(provider) {
        Ok(())
    } else {
        Err(AuthError::InvalidProvider(provider.to_string()))
    }
}

// Pages (behind the route guard)
pub async fn home_handler(current_user: CurrentUser) -> Result<impl IntoResponse, AppError> {
    let template = HomeTemplate::from(current_user.user());
    Ok(Html(template.render()?))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<impl IntoResponse, AppError> {
    let provider = query.provider.and_then(|p| p.parse::<Provider>().ok());
    let template = LoginTemplate::new(
        query.error,
        provider,
        state.auth_config.is_enabled(Provider::Google),
    );
    Ok(Html(template.render()?))
}

pub async fn signup_page_handler(
    Query(query): Query<SignupQuery>,
) -> Result<impl IntoResponse, AppError> {
    let template = SignupTemplate { error: query.error };
    Ok(Html(template.render()?))
}

pub async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub async fn signup_handler(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    ensure_enabled(&state, Provider::Credentials)?;

    let firstname = form.firstname.trim();
    let sign_in = SignInForm {
        email: form.email,
        password: form.password,
    };
    let Some(attempt) = sign_in.validate().filter(|_| !firstname.is_empty()) else {
        let redirect_url = format!(
            "/signup?error={}",
            urlencoding::encode("Please provide a name, a valid email and a password.")
        );
        return Ok(Redirect::to(&redirect_url).into_response());
    };

    let create_user = CreateUser {
        email: attempt.email,
        firstname: firstname.to_string(),
        lastname: form.lastname.trim().to_string(),
        password_hash: credentials::hash_password(&attempt.password)?,
        provider: Provider::Credentials,
    };

    let user = match state.auth_service.store().create(create_user).await {
        Ok(user) => user,
        Err(AppError::DuplicateUser(_)) => return Err(AuthError::EmailTaken.into()),
        Err(e) => return Err(e),
    };
    tracing::info!("Registered user {}", user.id);

    let token = enrich(
        SessionToken::new(user.email.clone(), user.full_name()),
        TokenContext::InitialSignIn {
            identity: user.identity(),
            provider: Provider::Credentials,
        },
        state.auth_service.store(),
    )
    .await;

    signed_in_response(&state, &token)
}

// Auth actions (outside the route guard)
pub async fn credentials_sign_in_handler(
    State(state): State<AppState>,
    Form(form): Form<SignInForm>,
) -> Result<Response, AppError> {
    ensure_enabled(&state, Provider::Credentials)?;

    let identity = match state.auth_service.verify_credentials(&form).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(AuthError::InvalidCredentials.into()),
        Err(e) => return Err(AuthError::UserLookup(e.to_string()).into()),
    };

    let token = enrich(
        SessionToken::new(identity.email.clone(), identity.name.clone()),
        TokenContext::InitialSignIn {
            identity,
            provider: Provider::Credentials,
        },
        state.auth_service.store(),
    )
    .await;

    tracing::info!("User {:?} signed in with credentials", token.id);
    signed_in_response(&state, &token)
}

pub async fn google_auth_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, AppError> {
    ensure_enabled(&state, Provider::Google)?;

    let (auth_url, oauth_state) = state.auth_service.initiate_google_auth()?;
    session.set_oauth_state(oauth_state).await?;

    Ok(Redirect::to(&auth_url))
}

pub async fn google_callback_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    session: Session,
) -> Result<Response, AppError> {
    if let Some(error) = query.error {
        tracing::error!("Google OAuth2 error: {}", error);
        let redirect_url = format!(
            "/login?error={}",
            urlencoding::encode("Google authentication failed. Please try again.")
        );
        return Ok(Redirect::to(&redirect_url).into_response());
    }

    let code = query.code.ok_or(AuthError::MissingAuthCode)?;
    let state_param = query.state.ok_or(AuthError::StateMismatch)?;
    let expected = session
        .take_oauth_state()
        .await?
        .ok_or(AuthError::StateMismatch)?;

    let user = state
        .auth_service
        .handle_google_callback(code, state_param, expected)
        .await?;

    let token = enrich(
        SessionToken::new(user.email.clone(), user.full_name()),
        TokenContext::InitialSignIn {
            identity: user.identity(),
            provider: Provider::Google,
        },
        state.auth_service.store(),
    )
    .await;

    tracing::info!("User {} successfully authenticated via Google", user.id);
    signed_in_response(&state, &token)
}

/// Session read accessor; `null` when nobody is signed in. A signed-in read
/// refreshes the token and reissues the cookie.
pub async fn session_handler(
    State(state): State<AppState>,
    current_user: Option<CurrentUser>,
) -> Result<Response, AppError> {
    let Some(current_user) = current_user else {
        return Ok(Json(None::<SessionUser>).into_response());
    };

    let token = enrich(
        current_user.token,
        TokenContext::TokenRefresh,
        state.auth_service.store(),
    )
    .await;
    let cookie = issue_cookie(&state, &token)?;

    Ok(([(header::SET_COOKIE, cookie)], Json(Some(token.user()))).into_response())
}

/// Session update trigger. Only the name can change.
pub async fn update_session_handler(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(patch): Json<SessionPatch>,
) -> Result<impl IntoResponse, AppError> {
    let token = enrich(
        current_user.token,
        TokenContext::SessionUpdate(patch),
        state.auth_service.store(),
    )
    .await;
    let cookie = issue_cookie(&state, &token)?;

    Ok(([(header::SET_COOKIE, cookie)], Json(token.user())))
}

pub async fn logout_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cookie = removal_cookie_header(state.auth_config.secure_cookies)?;

    tracing::info!("User logged out successfully");
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/login")))
}
