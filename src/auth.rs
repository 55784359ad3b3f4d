use std::sync::Arc;

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;

use crate::{
    config::{Config, GoogleConfig},
    credentials::{self, SignInForm},
    database::UserStore,
    error::{AppError, AuthError},
    models::{normalize_email, CreateUser, Identity, OAuthProfile, Provider, User},
    session::OAuthState,
};

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    pub client: BasicClient,
    pub userinfo_url: String,
    pub http_client: HttpClient,
}

impl GoogleOAuth {
    pub fn new(google: &GoogleConfig, base_url: &str) -> Result<Self, AppError> {
        let invalid = |field: &str, e: oauth2::url::ParseError| {
            AppError::Config(format!("invalid Google {}: {}", field, e))
        };

        let client = BasicClient::new(
            ClientId::new(google.client_id.clone()),
            Some(ClientSecret::new(google.client_secret.clone())),
            AuthUrl::new(google.auth_url.clone()).map_err(|e| invalid("auth url", e))?,
            Some(TokenUrl::new(google.token_url.clone()).map_err(|e| invalid("token url", e))?),
        )
        .set_redirect_uri(
            RedirectUrl::new(format!("{}/auth/callback/google", base_url))
                .map_err(|e| invalid("redirect url", e))?,
        );

        Ok(GoogleOAuth {
            client,
            userinfo_url: google.userinfo_url.clone(),
            http_client: HttpClient::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        config
            .google
            .as_ref()
            .map(|google| Self::new(google, &config.base_url))
            .transpose()
    }
}

#[derive(Clone)]
pub struct AuthService {
    google: Option<GoogleOAuth>,
    store: Arc<dyn UserStore>,
}

impl AuthService {
    pub fn new(google: Option<GoogleOAuth>, store: Arc<dyn UserStore>) -> Self {
        Self { google, store }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    pub async fn verify_credentials(&self, form: &SignInForm) -> Result<Option<Identity>, AppError> {
        credentials::verify_credentials(self.store(), form).await
    }

    fn google(&self) -> Result<&GoogleOAuth, AuthError> {
        self.google
            .as_ref()
            .ok_or_else(|| AuthError::InvalidProvider(Provider::Google.to_string()))
    }

    pub fn initiate_google_auth(&self) -> Result<(String, OAuthState), AuthError> {
        let google = self.google()?;
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = google
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let state = OAuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };

        Ok((auth_url.to_string(), state))
    }

    pub async fn handle_google_callback(
        &self,
        code: String,
        state: String,
        expected: OAuthState,
    ) -> Result<User, AuthError> {
        let google = self.google()?;

        if state != expected.csrf_token {
            return Err(AuthError::StateMismatch);
        }

        let token_result = google
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(expected.pkce_verifier))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

        let profile_response = google
            .http_client
            .get(&google.userinfo_url)
            .bearer_auth(token_result.access_token().secret())
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        if !profile_response.status().is_success() {
            return Err(AuthError::ProfileFetch(format!(
                "HTTP {}",
                profile_response.status()
            )));
        }

        let profile: OAuthProfile = profile_response
            .json()
            .await
            .map_err(|e| AuthError::ProfileFetch(e.to_string()))?;

        bridge_oauth_profile(self.store(), &profile, Provider::Google).await
    }
}

async fn lookup(store: &dyn UserStore, email: &str) -> Result<Option<User>, AuthError> {
    store.find_by_email(email).await.map_err(|e| {
        tracing::error!("Error during sign-in: {}", e);
        AuthError::UserLookup(e.to_string())
    })
}

fn check_provider(user: User, provider: Provider) -> Result<User, AuthError> {
    if user.provider != provider {
        tracing::info!(
            "Refusing {} sign-in for account registered with {}",
            provider,
            user.provider
        );
        return Err(AuthError::ProviderMismatch(user.provider));
    }
    Ok(user)
}

/// Maps a provider-asserted profile onto a local user, creating the row on
/// first sign-in. Accounts are never linked across providers.
pub async fn bridge_oauth_profile(
    store: &dyn UserStore,
    profile: &OAuthProfile,
    provider: Provider,
) -> Result<User, AuthError> {
    let name = profile.name.as_deref().map(str::trim).unwrap_or_default();
    let email = profile.email.as_deref().map(normalize_email).unwrap_or_default();
    if name.is_empty() || email.is_empty() {
        return Err(AuthError::InvalidProfile);
    }

    if let Some(existing) = lookup(store, &email).await? {
        return check_provider(existing, provider);
    }

    let (firstname, lastname) = OAuthProfile::name_parts(name);
    let create_user = CreateUser {
        email: email.clone(),
        firstname,
        lastname,
        password_hash: String::new(),
        provider,
    };

    match store.create(create_user).await {
        Ok(user) => {
            tracing::info!("Created {} user {} on first sign-in", provider, user.id);
            Ok(user)
        }
        // Another request created the row between our lookup and insert
        Err(AppError::DuplicateUser(_)) => {
            tracing::warn!("Concurrent first sign-in for {}, reloading user", email);
            match lookup(store, &email).await? {
                Some(existing) => check_provider(existing, provider),
                None => Err(AuthError::UserLookup(format!(
                    "user {} missing after duplicate insert",
                    email
                ))),
            }
        }
        Err(e) => {
            tracing::error!("Error during sign-in: {}", e);
            Err(AuthError::UserLookup(e.to_string()))
        }
    }
}
