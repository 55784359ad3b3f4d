pub mod auth;
pub mod config;
pub mod credentials;
pub mod database;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
pub mod token;

pub use auth::{bridge_oauth_profile, AuthService, GoogleOAuth};
pub use config::{AuthConfig, Config, GoogleConfig};
pub use credentials::{verify_credentials, SignInForm};
pub use database::{Database, UserRepository, UserStore};
pub use error::{AppError, AuthError};
pub use guard::{authorize, route_guard, GuardOutcome};
pub use models::{CreateUser, Identity, OAuthProfile, Provider, SessionPatch, SessionUser, User};
pub use routes::build_router;
pub use session::{CurrentUser, SessionManager, SESSION_COOKIE};
pub use state::AppState;
pub use templates::{HomeTemplate, LoginTemplate, SignupTemplate};
pub use token::{enrich, SessionIssuer, SessionToken, TokenContext};
