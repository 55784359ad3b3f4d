use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use cookie::{time::Duration, Cookie, SameSite};
use serde::{Deserialize, Serialize};
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

use crate::{
    error::{AppError, AuthError},
    models::SessionUser,
    token::{SessionIssuer, SessionToken},
};

/// Cookie holding the signed session token.
pub const SESSION_COOKIE: &str = "auth_session_token";

// Server-side session keys (OAuth handshake only)
const OAUTH_STATE_KEY: &str = "oauth_state";

/// Server-side store for short-lived OAuth handshake state. The authenticated
/// identity itself never lives here; it travels in the signed cookie.
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: MemoryStore,
    secure: bool,
}

impl SessionManager {
    pub fn new(secure: bool) -> Self {
        Self {
            store: MemoryStore::default(),
            secure,
        }
    }

    pub fn layer(&self) -> SessionManagerLayer<MemoryStore> {
        SessionManagerLayer::new(self.store.clone())
            .with_secure(self.secure)
            .with_same_site(tower_sessions::cookie::SameSite::Lax)
            .with_http_only(true)
            .with_name("auth_handshake")
    }
}

/// CSRF state and PKCE verifier for an in-flight OAuth sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
}

pub trait SessionExt {
    async fn set_oauth_state(&self, state: OAuthState) -> Result<(), AppError>;
    async fn take_oauth_state(&self) -> Result<Option<OAuthState>, AppError>;
}

impl SessionExt for Session {
    async fn set_oauth_state(&self, state: OAuthState) -> Result<(), AppError> {
        self.insert(OAUTH_STATE_KEY, state).await.map_err(|e| {
            tracing::error!("Failed to store OAuth state: {}", e);
            AppError::Auth(AuthError::InvalidSession)
        })
    }

    async fn take_oauth_state(&self) -> Result<Option<OAuthState>, AppError> {
        self.remove::<OAuthState>(OAUTH_STATE_KEY).await.map_err(|e| {
            tracing::error!("Failed to read OAuth state: {}", e);
            AppError::Auth(AuthError::InvalidSession)
        })
    }
}

fn session_cookie(raw_token: &str, max_age: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, raw_token.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(max_age))
        .build()
}

/// Builds the `Set-Cookie` header carrying a freshly issued token.
pub fn session_cookie_header(
    raw_token: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&session_cookie(raw_token, max_age, secure).to_string())
        .map_err(|e| AppError::Config(format!("invalid session cookie: {}", e)))
}

/// Expires the session cookie on the client.
pub fn removal_cookie_header(secure: bool) -> Result<HeaderValue, AppError> {
    session_cookie_header("", 0, secure)
}

pub fn read_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value_trimmed().is_empty())
        .map(|cookie| cookie.value_trimmed().to_string())
}

/// The signed-in user, taken from the token the route guard refreshed or,
/// outside guarded routes, straight from the cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub token: SessionToken,
}

impl CurrentUser {
    pub fn user(&self) -> SessionUser {
        self.token.user()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    SessionIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = parts.extensions.get::<SessionToken>() {
            return Ok(CurrentUser {
                token: token.clone(),
            });
        }

        let raw = read_session_cookie(&parts.headers).ok_or(AuthError::NotAuthenticated)?;
        let token = SessionIssuer::from_ref(state).decode(&raw).map_err(|e| {
            tracing::debug!("Rejected session token: {}", e);
            AuthError::InvalidSession
        })?;

        Ok(CurrentUser { token })
    }
}

// `Option<CurrentUser>` yields `None` on any rejection, matching axum 0.7's
// blanket `Option<T>` extractor.
impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    SessionIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(<CurrentUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .ok())
    }
}
