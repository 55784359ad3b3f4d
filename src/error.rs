use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::models::Provider;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials!";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong!";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("User already exists: {0}")]
    DuplicateUser(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is registered with provider {0}")]
    ProviderMismatch(Provider),

    #[error("Identity provider returned an incomplete profile")]
    InvalidProfile,

    #[error("OAuth2 state mismatch")]
    StateMismatch,

    #[error("Failed to exchange code for token: {0}")]
    TokenExchange(String),

    #[error("Failed to fetch user profile: {0}")]
    ProfileFetch(String),

    #[error("Failed to look up user: {0}")]
    UserLookup(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Invalid OAuth2 provider: {0}")]
    InvalidProvider(String),

    #[error("Missing OAuth2 authorization code")]
    MissingAuthCode,

    #[error("Email already registered")]
    EmailTaken,
}

fn login_with_error(message: &str) -> Response {
    let redirect_url = format!("/login?error={}", urlencoding::encode(message));
    Redirect::to(&redirect_url).into_response()
}

fn server_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(AuthError::NotAuthenticated) | AppError::Auth(AuthError::InvalidSession) => {
                tracing::warn!("Authentication required, redirecting to login: {}", self);
                Redirect::to("/login").into_response()
            }

            // Not generic: the provider name is not a secret
            AppError::Auth(AuthError::ProviderMismatch(provider)) => {
                tracing::warn!("Provider mismatch, account registered with {}", provider);
                Redirect::to(&format!("/login?provider={}", provider)).into_response()
            }

            AppError::Auth(AuthError::InvalidProfile) => {
                tracing::warn!("Incomplete OAuth profile, redirecting to login");
                Redirect::to("/login").into_response()
            }

            AppError::Auth(AuthError::EmailTaken) => {
                tracing::warn!("Registration refused: email already registered");
                let redirect_url = format!(
                    "/signup?error={}",
                    urlencoding::encode("An account with this email already exists.")
                );
                Redirect::to(&redirect_url).into_response()
            }

            AppError::Auth(auth_error) => {
                tracing::error!("Authentication error: {}", auth_error);
                let error_msg = match auth_error {
                    AuthError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE,
                    AuthError::StateMismatch => "Security error during login. Please try again.",
                    AuthError::TokenExchange(_) => "Failed to complete login. Please try again.",
                    AuthError::ProfileFetch(_) => "Failed to retrieve your profile. Please try again.",
                    AuthError::InvalidProvider(_) => "Invalid login provider selected.",
                    AuthError::MissingAuthCode => "Login was incomplete. Please try again.",
                    _ => GENERIC_FAILURE_MESSAGE,
                };
                login_with_error(error_msg)
            }

            AppError::DuplicateUser(ref email) => {
                tracing::warn!("Duplicate user rejected by store: {}", email);
                server_error(
                    StatusCode::CONFLICT,
                    "Conflict",
                    "A user with this email already exists.",
                )
            }

            AppError::Database(ref db_error) => {
                tracing::error!("Database error: {}", db_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error",
                    "A database error occurred. Please try again later.",
                )
            }

            AppError::Template(ref template_error) => {
                tracing::error!("Template error: {}", template_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Template error",
                    "A page rendering error occurred.",
                )
            }

            AppError::Http(ref http_error) => {
                tracing::error!("HTTP client error: {}", http_error);
                server_error(
                    StatusCode::BAD_GATEWAY,
                    "External service error",
                    "Failed to communicate with external service. Please try again later.",
                )
            }

            AppError::Config(ref config_error) => {
                tracing::error!("Configuration error: {}", config_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error",
                    "Server configuration error.",
                )
            }

            AppError::Migration(ref migration_error) => {
                tracing::error!("Migration error: {}", migration_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database migration error",
                    "Database initialization failed.",
                )
            }

            AppError::Token(ref token_error) => {
                tracing::error!("Session token error: {}", token_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Session error",
                    "Failed to issue session.",
                )
            }

            AppError::Password(ref hash_error) => {
                tracing::error!("Password hashing error: {}", hash_error);
                server_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Password error",
                    "Failed to process password.",
                )
            }
        }
    }
}
