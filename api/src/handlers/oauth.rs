use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common::errors::OAuthError;
use common::oauth::{generate_state, OAuthClient};
use serde::Deserialize;

use crate::middleware::session_cookies;
use crate::state::AppState;

pub const STATE_COOKIE: &str = "oauth_state";
const STATE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn login_error(jar: CookieJar, message: &str) -> Response {
    let jar = jar.remove(Cookie::build(STATE_COOKIE).path("/"));
    let target = format!("/login?error={}", message.replace(' ', "+"));
    (jar, Redirect::to(&target)).into_response()
}

/// Redirect to the provider's consent screen
#[tracing::instrument(skip(state, jar))]
pub async fn start(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(provider): Path<String>,
) -> Response {
    let client = match OAuthClient::from_settings(&state.config.oauth, &provider) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "OAuth login unavailable");
            return login_error(jar, "Social login is not available");
        }
    };

    let oauth_state = generate_state();
    let url = match client.authorize_url(&oauth_state) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build authorize url");
            return login_error(jar, "Social login is not available");
        }
    };

    let cookie = Cookie::build((STATE_COOKIE, oauth_state))
        .http_only(true)
        .secure(state.config.auth.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(STATE_TTL_SECONDS));
    (jar.add(cookie), Redirect::to(&url)).into_response()
}

async fn complete_login(
    state: &AppState,
    provider: &str,
    query: CallbackQuery,
    expected_state: Option<String>,
) -> Result<common::auth::Session, OAuthError> {
    let client = OAuthClient::from_settings(&state.config.oauth, provider)?;

    match (query.state.as_deref(), expected_state.as_deref()) {
        (Some(got), Some(expected)) if got == expected => {}
        _ => return Err(OAuthError::StateMismatch),
    }

    if let Some(error) = query.error {
        return Err(OAuthError::ExchangeFailed(error));
    }
    let code = query
        .code
        .ok_or_else(|| OAuthError::ExchangeFailed("missing authorization code".to_string()))?;

    let access_token = client.exchange_code(&code).await?;
    let profile = client.fetch_profile(&access_token).await?;
    state
        .auth
        .login_social(profile)
        .await
        .map_err(|e| OAuthError::ProfileFailed(e.to_string()))
}

/// Provider callback: check state, exchange the code and sign the user in
#[tracing::instrument(skip(state, jar, query))]
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_string());

    match complete_login(&state, &provider, query, expected).await {
        Ok(session) => {
            tracing::info!(user_id = session.user.id, provider = %provider, "Social login succeeded");
            let jar = jar.remove(Cookie::build(STATE_COOKIE).path("/"));
            let jar = session_cookies(jar, &session.tokens, state.config.auth.cookie_secure);
            (jar, Redirect::to("/dashboard")).into_response()
        }
        Err(OAuthError::MissingEmail) => {
            tracing::warn!(provider = %provider, "Social profile has no email");
            login_error(jar, "Your account did not share an email address")
        }
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Social login failed");
            login_error(jar, "Social login failed")
        }
    }
}
