use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    auth::AuthService,
    config::AuthConfig,
    token::SessionIssuer,
};

/// Everything a request handler needs, built once at startup.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub auth_config: Arc<AuthConfig>,
    pub auth_service: AuthService,
    pub issuer: SessionIssuer,
}

impl AppState {
    pub fn new(auth_config: AuthConfig, auth_service: AuthService, secret: &str) -> Self {
        let issuer = SessionIssuer::new(secret, auth_config.session_max_age);
        Self {
            auth_config: Arc::new(auth_config),
            auth_service,
            issuer,
        }
    }
}
