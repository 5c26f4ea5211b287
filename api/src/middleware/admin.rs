use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::models::AuthUser;

use crate::handlers::{pages, ErrorResponse};
use crate::middleware::wants_html;

/// Admin-only guard; must run after `auth_middleware`
#[tracing::instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn admin_middleware(req: Request, next: Next) -> Response {
    let html = wants_html(&req);
    let Some(user) = req.extensions().get::<AuthUser>().cloned() else {
        return ErrorResponse::new("unauthorized", "Authentication required").into_response();
    };

    if !user.is_admin() {
        tracing::warn!(user_id = user.id, "Non-admin denied admin route");
        if html {
            return (StatusCode::FORBIDDEN, pages::access_denied(&user)).into_response();
        }
        return ErrorResponse::new("forbidden", "Admin access required").into_response();
    }

    tracing::info!(
        user_id = user.id,
        method = %req.method(),
        path = %req.uri().path(),
        "Admin operation"
    );
    next.run(req).await
}
