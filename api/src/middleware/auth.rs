use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common::auth::{TokenPair, UserStore};
use common::models::{AuthUser, UserStatus};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Access token from the `accessToken` cookie, falling back to a Bearer header
pub fn token_from_request(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Page requests get redirects and HTML; everything under `/api/` gets JSON
pub fn wants_html(req: &Request) -> bool {
    !req.uri().path().starts_with("/api/")
}

fn cookie(name: &'static str, value: String, secure: bool, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Store a freshly issued pair as http-only cookies
pub fn session_cookies(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    let now = chrono::Utc::now();
    let access_age = (tokens.access_expires_at - now).num_seconds().max(0);
    let refresh_age = (tokens.refresh_expires_at - now).num_seconds().max(0);
    jar.add(cookie(ACCESS_COOKIE, tokens.access_token.clone(), secure, access_age))
        .add(cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), secure, refresh_age))
}

pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

fn reject(html: bool, jar: CookieJar, error: ErrorResponse) -> Response {
    if html {
        (clear_session_cookies(jar), Redirect::to("/login")).into_response()
    } else {
        error.into_response()
    }
}

/// Authentication middleware: validates the access token and attaches the
/// account as an `AuthUser` extension
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let html = wants_html(&req);

    let Some(token) = token_from_request(&jar, req.headers()) else {
        return reject(html, jar, ErrorResponse::new("unauthorized", "Authentication required"));
    };

    let claims = match state.auth.tokens().verify_access(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected access token");
            return reject(html, jar, ErrorResponse::new("unauthorized", "Invalid or expired token"));
        }
    };

    let Some(user_id) = claims.user_id() else {
        return reject(html, jar, ErrorResponse::new("unauthorized", "Invalid token subject"));
    };

    let user = match state.users().find_by_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(user_id, "Token for unknown user");
            return reject(html, jar, ErrorResponse::new("unauthorized", "User not found"));
        }
        Err(e) => return ErrorResponse::from(e).into_response(),
    };

    if user.status == UserStatus::Disabled {
        tracing::warn!(user_id, "Disabled account attempted access");
        return reject(html, jar, ErrorResponse::new("forbidden", "Account disabled"));
    }

    req.extensions_mut().insert(AuthUser::from(&user));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let jar = CookieJar::new().add(Cookie::new(ACCESS_COOKIE, "from-cookie"));
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from_request(&jar, &headers).as_deref(), Some("from-cookie"));
        assert_eq!(
            token_from_request(&CookieJar::new(), &headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let mut headers = HeaderMap::new();
        assert!(token_from_request(&CookieJar::new(), &headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(token_from_request(&CookieJar::new(), &headers).is_none());
    }

    #[test]
    fn test_session_cookies_are_http_only() {
        let now = chrono::Utc::now();
        let tokens = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            access_expires_at: now + chrono::Duration::minutes(15),
            refresh_expires_at: now + chrono::Duration::days(7),
        };
        let jar = session_cookies(CookieJar::new(), &tokens, true);
        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(jar.get(REFRESH_COOKIE).unwrap().value(), "r");
    }
}
