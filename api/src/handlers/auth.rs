use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use common::auth::{Registration, Session, TokenPair};
use common::models::{AuthUser, User};
use serde::{Deserialize, Serialize};

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::middleware::{clear_session_cookies, session_cookies, REFRESH_COOKIE};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, alias = "phoneNo")]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            user: session.user,
            tokens: session.tokens,
        }
    }
}

fn respond(
    state: &AppState,
    jar: CookieJar,
    session: Session,
    message: &str,
) -> (CookieJar, Json<SuccessResponse<SessionResponse>>) {
    let jar = session_cookies(jar, &session.tokens, state.config.auth.cookie_secure);
    (jar, Json(SuccessResponse::with_message(session.into(), message)))
}

/// Create a local account and sign it in
#[tracing::instrument(skip(state, jar, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SuccessResponse<SessionResponse>>), ErrorResponse> {
    let session = state
        .auth
        .register(Registration {
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            email: req.email,
            password: req.password,
        })
        .await?;

    tracing::info!(user_id = session.user.id, "User registered");
    Ok(respond(&state, jar, session, "Registration successful"))
}

#[tracing::instrument(skip(state, jar, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SuccessResponse<SessionResponse>>), ErrorResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ErrorResponse::validation("Email and password are required"));
    }

    let session = state.auth.login(&req.email, &req.password).await.map_err(|e| {
        tracing::warn!(error = %e, "Login failed");
        ErrorResponse::from(e)
    })?;

    Ok(respond(&state, jar, session, "Login successful"))
}

/// Rotate the refresh token; the cookie wins over a body value
#[tracing::instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<SuccessResponse<SessionResponse>>), ErrorResponse> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .ok_or_else(|| ErrorResponse::new("unauthorized", "Refresh token required"))?;

    let session = state.auth.refresh(&token).await.map_err(|e| {
        tracing::warn!(error = %e, "Refresh rejected");
        ErrorResponse::new("unauthorized", "Invalid refresh token")
    })?;

    Ok(respond(&state, jar, session, "Token refreshed"))
}

#[tracing::instrument(skip(state, jar, user), fields(user_id = user.id))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<AuthUser>,
) -> Result<(CookieJar, Json<SuccessResponse<()>>), ErrorResponse> {
    state.auth.logout(user.id).await?;
    Ok((
        clear_session_cookies(jar),
        Json(SuccessResponse::with_message((), "Logged out")),
    ))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, ErrorResponse> {
    let account = state.auth.profile(user.id).await?;
    let plan = state.plans.current_plan(user.id).await?;

    Ok(Json(SuccessResponse::new(serde_json::json!({
        "user": account,
        "plan": plan,
    }))))
}
