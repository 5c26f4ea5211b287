mod admin;
mod auth;
mod metrics;

pub use admin::admin_middleware;
pub use auth::{
    auth_middleware, clear_session_cookies, session_cookies, token_from_request, wants_html,
    ACCESS_COOKIE, REFRESH_COOKIE,
};
pub use metrics::track_metrics;
