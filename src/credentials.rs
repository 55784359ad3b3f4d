use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::{
    database::UserStore,
    error::AppError,
    models::{normalize_email, Identity},
};

/// bcrypt cost used when registering new accounts.
pub const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;

#[derive(Debug, Clone, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// A sign-in attempt that passed structural validation.
#[derive(Debug, Clone)]
pub struct ValidatedSignIn {
    pub email: String,
    pub password: String,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

impl SignInForm {
    /// Structural check only; never touches the store.
    pub fn validate(&self) -> Option<ValidatedSignIn> {
        if !is_valid_email(&self.email) || self.password.is_empty() {
            return None;
        }

        Some(ValidatedSignIn {
            email: normalize_email(&self.email),
            password: self.password.clone(),
        })
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, PASSWORD_HASH_COST)?)
}

/// Returns `Ok(None)` for malformed input, unknown users and wrong passwords
/// alike. Only store failures surface as `Err`.
pub async fn verify_credentials(
    store: &dyn UserStore,
    form: &SignInForm,
) -> Result<Option<Identity>, AppError> {
    let Some(attempt) = form.validate() else {
        tracing::debug!("Rejected malformed sign-in attempt");
        return Ok(None);
    };

    let user = match store.find_by_email(&attempt.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!("Sign-in for unknown email");
            return Ok(None);
        }
        Err(e) => {
            tracing::error!("Authentication error: {}", e);
            return Err(e);
        }
    };

    // OAuth-only accounts carry an empty hash, which bcrypt rejects as invalid
    let matches = match bcrypt::verify(&attempt.password, &user.password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::debug!("Stored hash for user {} not usable: {}", user.id, e);
            false
        }
    };

    if !matches {
        return Ok(None);
    }

    Ok(Some(user.identity()))
}
