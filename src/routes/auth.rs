//! Auth routes, email access codes, session management, WS tickets.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use crate::services::directory::load_identity;
use crate::services::email_auth::{self, EmailAuthError, SignUp};
use crate::services::session;
use crate::state::AppState;
use crate::wall::model::Identity;

const COOKIE_NAME: &str = "session_token";

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn cookie_secure() -> bool {
    if let Some(value) = env_bool("COOKIE_SECURE") {
        return value;
    }

    std::env::var("WALL_PUBLIC_URL")
        .map(|url| url.starts_with("https://"))
        .unwrap_or(false)
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub identity: Identity,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user_id = session::session_user(&app_state.pool, token)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let identity = load_identity(&app_state.pool, user_id)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { identity, token: token.to_owned() })
    }
}

// =============================================================================
// EMAIL ACCESS CODES
// =============================================================================

fn email_auth_status(err: &EmailAuthError) -> StatusCode {
    match err {
        EmailAuthError::InvalidEmail | EmailAuthError::InvalidCode => StatusCode::BAD_REQUEST,
        EmailAuthError::InviteRequired => StatusCode::FORBIDDEN,
        EmailAuthError::VerificationFailed => StatusCode::UNAUTHORIZED,
        EmailAuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
        EmailAuthError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn email_auth_error(err: &EmailAuthError) -> Response {
    let status = email_auth_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "email auth failed");
    } else {
        tracing::info!(error = %err, "email auth rejected");
    }
    (status, err.to_string()).into_response()
}

#[derive(Deserialize)]
pub struct RequestCodeBody {
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    invite_code: Option<String>,
}

/// `POST /api/auth/email/request-code`, email a fresh access code.
pub async fn request_email_code(State(state): State<AppState>, Json(body): Json<RequestCodeBody>) -> Response {
    let Some(email_config) = &state.email else {
        return (StatusCode::SERVICE_UNAVAILABLE, "email sign-in not configured").into_response();
    };

    let sign_up = SignUp { display_name: body.name.as_deref(), invite_code: body.invite_code.as_deref() };
    let code = match email_auth::request_access_code(&state.pool, &body.email, sign_up, &state.sign_up).await {
        Ok(code) => code,
        Err(e) => return email_auth_error(&e),
    };

    let to = body.email.trim().to_ascii_lowercase();
    if let Err(e) = email_auth::send_access_code_email(email_config, &to, &code).await {
        return email_auth_error(&e);
    }

    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
pub struct VerifyCodeBody {
    email: String,
    code: String,
}

/// `POST /api/auth/email/verify-code`: exchange a code for a session cookie.
pub async fn verify_email_code(State(state): State<AppState>, Json(body): Json<VerifyCodeBody>) -> Response {
    let user_id = match email_auth::verify_access_code(&state.pool, &body.email, &body.code).await {
        Ok(id) => id,
        Err(e) => return email_auth_error(&e),
    };

    let identity = match load_identity(&state.pool, user_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "identity load failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let token = match session::open_session(&state.pool, user_id).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "session creation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session").into_response();
        }
    };

    tracing::info!(%user_id, "email auth: signed in");
    let mut cookie = session_cookie(token, cookie_secure());
    cookie.set_max_age(Duration::days(session::SESSION_DAYS.into()));
    let jar = CookieJar::new().add(cookie);
    (jar, Json(serde_json::json!({ "user": identity }))).into_response()
}

// =============================================================================
// SESSION
// =============================================================================

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<Identity> {
    Json(auth.identity)
}

/// `POST /api/auth/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    let _ = session::close_session(&state.pool, &auth.token).await;

    let mut cookie = session_cookie(String::new(), cookie_secure());
    cookie.set_max_age(Duration::ZERO);

    let jar = CookieJar::new().add(cookie);
    (jar, StatusCode::NO_CONTENT)
}

/// `POST /api/auth/ws-ticket`: create a one-time WS ticket.
pub async fn ws_ticket(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session::issue_ticket(&state.pool, auth.identity.uid)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
