use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    guard::route_guard,
    handlers::{
        credentials_sign_in_handler, google_auth_handler, google_callback_handler, home_handler,
        login_handler, logout_handler, not_found_handler, session_handler, signup_handler,
        signup_page_handler, update_session_handler,
    },
    session::SessionManager,
    state::AppState,
};

pub fn build_router(state: AppState, session_manager: &SessionManager) -> Router {
    // Pages and unknown paths go through the route guard
    let pages = Router::new()
        .route("/", get(home_handler))
        .route("/login", get(login_handler))
        .route("/signup", get(signup_page_handler).post(signup_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn_with_state(state.clone(), route_guard));

    let auth_actions = Router::new()
        .route("/auth/credentials", post(credentials_sign_in_handler))
        .route("/auth/google", get(google_auth_handler))
        .route("/auth/callback/google", get(google_callback_handler))
        .route(
            "/auth/session",
            get(session_handler).post(update_session_handler),
        )
        .route("/logout", post(logout_handler));

    pages
        .merge(auth_actions)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(session_manager.layer()),
        )
}
