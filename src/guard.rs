use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    session::{read_session_cookie, removal_cookie_header, session_cookie_header},
    state::AppState,
    token::{enrich, TokenContext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    RedirectToRoot,
    /// Send the visitor to the sign-in page.
    Deny,
}

fn is_auth_page(path: &str) -> bool {
    path.starts_with("/login") || path.starts_with("/signup")
}

/// Route authorization. Any signed-in user has full access.
pub fn authorize(logged_in: bool, path: &str) -> GuardOutcome {
    let on_auth_page = is_auth_page(path);

    if logged_in && on_auth_page {
        return GuardOutcome::RedirectToRoot;
    }

    if on_auth_page {
        return GuardOutcome::Allow;
    }

    if path.starts_with('/') {
        return if logged_in {
            GuardOutcome::Allow
        } else {
            GuardOutcome::Deny
        };
    }

    if logged_in {
        GuardOutcome::RedirectToRoot
    } else {
        GuardOutcome::Allow
    }
}

/// Applies [`authorize`] to every page path, known or not, and slides the
/// session expiry on every allowed, signed-in request.
pub async fn route_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let raw = read_session_cookie(request.headers());
    let token = raw.as_deref().and_then(|raw| {
        state
            .issuer
            .decode(raw)
            .map_err(|e| tracing::debug!("Ignoring unusable session token: {}", e))
            .ok()
    });
    let stale_cookie = raw.is_some() && token.is_none();

    let path = request.uri().path().to_owned();
    match authorize(token.is_some(), &path) {
        GuardOutcome::Allow => {}
        GuardOutcome::RedirectToRoot => return Redirect::to("/").into_response(),
        GuardOutcome::Deny => {
            tracing::debug!("Unauthenticated request for {}, redirecting", path);
            let mut response = Redirect::to(&state.auth_config.sign_in_page).into_response();
            if stale_cookie {
                match removal_cookie_header(state.auth_config.secure_cookies) {
                    Ok(cookie) => {
                        response.headers_mut().append(header::SET_COOKIE, cookie);
                    }
                    Err(e) => tracing::warn!("Failed to clear session cookie: {}", e),
                }
            }
            return response;
        }
    }

    let Some(token) = token else {
        return next.run(request).await;
    };

    let token = enrich(token, TokenContext::TokenRefresh, state.auth_service.store()).await;
    let refreshed = state.issuer.issue(&token).and_then(|raw| {
        session_cookie_header(
            &raw,
            state.issuer.max_age(),
            state.auth_config.secure_cookies,
        )
    });
    request.extensions_mut().insert(token);

    let mut response = next.run(request).await;
    match refreshed {
        Ok(cookie) => {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Err(e) => tracing::warn!("Failed to refresh session token: {}", e),
    }
    response
}
