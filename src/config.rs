use std::env;

use crate::{error::AppError, models::Provider};

pub const DEFAULT_SESSION_MAX_AGE: i64 = 24 * 60 * 60;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub auth_secret: String,
    pub base_url: String,
    pub session_max_age: i64,
    pub secure_cookies: bool,
    pub google: Option<GoogleConfig>,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let auth_secret = env::var("AUTH_SECRET")
            .map_err(|e| AppError::Config(format!("AUTH_SECRET: {}", e)))?;

        let session_max_age = match env::var("SESSION_MAX_AGE") {
            Ok(value) => value
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| AppError::Config(format!("SESSION_MAX_AGE: invalid value {:?}", value)))?,
            Err(_) => DEFAULT_SESSION_MAX_AGE,
        };

        let secure_cookies = env::var("SECURE_COOKIES")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // Google is only offered when both halves of the client pair are present
        let google = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(id), Ok(secret)) => {
                let mut google = GoogleConfig::new(id, secret);
                if let Ok(url) = env::var("GOOGLE_AUTH_URL") {
                    google.auth_url = url;
                }
                if let Ok(url) = env::var("GOOGLE_TOKEN_URL") {
                    google.token_url = url;
                }
                if let Ok(url) = env::var("GOOGLE_USERINFO_URL") {
                    google.userinfo_url = url;
                }
                Some(google)
            }
            _ => None,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:auth_app.db".to_string()),
            auth_secret,
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_max_age,
            secure_cookies,
            google,
        })
    }
}

/// Authentication settings handed to the request handlers.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub sign_in_page: String,
    pub session_max_age: i64,
    pub providers: Vec<Provider>,
    pub secure_cookies: bool,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut providers = vec![Provider::Credentials];
        if config.google.is_some() {
            providers.push(Provider::Google);
        }

        Self {
            sign_in_page: "/login".to_string(),
            session_max_age: config.session_max_age,
            providers,
            secure_cookies: config.secure_cookies,
        }
    }

    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.providers.contains(&provider)
    }
}
