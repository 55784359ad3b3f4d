use std::sync::Arc;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    database::UserStore,
    error::AppError,
    models::{Identity, Provider, SessionPatch, SessionUser},
};

/// JWT claims carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Local user id; absent until enrichment finds the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

impl SessionToken {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            name: name.into(),
            iat: 0,
            exp: 0,
            jti: String::new(),
        }
    }

    pub fn user(&self) -> SessionUser {
        SessionUser {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Why the token is being enriched.
#[derive(Debug, Clone)]
pub enum TokenContext {
    InitialSignIn { identity: Identity, provider: Provider },
    TokenRefresh,
    SessionUpdate(SessionPatch),
}

/// Fills in id and name from the store. Lookup failures are logged and the
/// token is returned unchanged.
async fn reload_from_store(mut token: SessionToken, store: &dyn UserStore) -> SessionToken {
    match store.find_by_email(&token.email).await {
        Ok(Some(user)) => {
            token.id = Some(user.id.to_string());
            token.name = user.full_name();
        }
        Ok(None) => {
            tracing::warn!("No user row for session email {}", token.email);
        }
        Err(e) => {
            tracing::error!("Error fetching user ID: {}", e);
        }
    }
    token
}

pub async fn enrich(
    token: SessionToken,
    context: TokenContext,
    store: &dyn UserStore,
) -> SessionToken {
    match context {
        TokenContext::InitialSignIn { identity, provider } => {
            let token = SessionToken {
                id: Some(identity.id),
                email: identity.email,
                name: identity.name,
                ..token
            };
            match provider {
                Provider::Google => reload_from_store(token, store).await,
                Provider::Credentials => token,
            }
        }
        TokenContext::TokenRefresh => {
            if token.id.is_some() {
                token
            } else {
                reload_from_store(token, store).await
            }
        }
        TokenContext::SessionUpdate(patch) => match patch.name {
            Some(name) if !name.trim().is_empty() => SessionToken { name, ..token },
            _ => token,
        },
    }
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    max_age: i64,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &str, max_age: i64) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            max_age,
        }
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    /// Stamps a fresh lifetime and signs the token.
    pub fn issue(&self, token: &SessionToken) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionToken {
            iat: now,
            exp: now + self.max_age,
            jti: uuid::Uuid::new_v4().to_string(),
            ..token.clone()
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn decode(&self, raw: &str) -> Result<SessionToken, AppError> {
        let data = decode::<SessionToken>(raw, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}
