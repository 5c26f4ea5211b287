use axum::{
    extract::{Query, State},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use common::auth::PasswordChange;
use common::models::{AuthUser, ProfileUpdate, User};
use serde::{Deserialize, Serialize};

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::middleware::clear_session_cookies;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub logout_all_devices: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyResetQuery {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
}

const RESET_REQUESTED: &str =
    "If an account with that email exists, a password reset link has been sent.";

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<User>>, ErrorResponse> {
    let account = state.auth.profile(user.id).await?;
    Ok(Json(SuccessResponse::new(account)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<SuccessResponse<User>>, ErrorResponse> {
    let account = state
        .auth
        .update_profile(
            user.id,
            ProfileUpdate {
                first_name: req.first_name,
                last_name: req.last_name,
                phone: req.phone,
                timezone: req.timezone,
            },
        )
        .await?;
    Ok(Json(SuccessResponse::with_message(account, "Profile updated successfully")))
}

/// Signing out of every device also ends this browser session
#[tracing::instrument(skip(state, jar, user, req), fields(user_id = user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<SuccessResponse<()>>), ErrorResponse> {
    let logout_all = req.logout_all_devices;
    state
        .auth
        .change_password(
            user.id,
            PasswordChange {
                current_password: req.current_password,
                new_password: req.new_password,
                confirm_password: req.confirm_password,
                logout_all_devices: logout_all,
            },
        )
        .await?;

    let jar = if logout_all { clear_session_cookies(jar) } else { jar };
    Ok((
        jar,
        Json(SuccessResponse::with_message((), "Password changed successfully")),
    ))
}

/// Same answer whether or not the email has an account
#[tracing::instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    if req.email.trim().is_empty() {
        return Err(ErrorResponse::validation("Please provide your email address"));
    }
    if let Err(e) = state.auth.request_password_reset(&req.email).await {
        tracing::error!(error = %e, "Password reset request failed");
    }
    Ok(Json(SuccessResponse::with_message((), RESET_REQUESTED)))
}

#[tracing::instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state
        .auth
        .reset_password(&req.token, &req.email, &req.password)
        .await?;
    Ok(Json(SuccessResponse::with_message(
        (),
        "Password has been reset successfully. You can now login with your new password.",
    )))
}

#[tracing::instrument(skip_all)]
pub async fn verify_reset_token(
    State(state): State<AppState>,
    Query(query): Query<VerifyResetQuery>,
) -> Result<Json<SuccessResponse<ResetTokenStatus>>, ErrorResponse> {
    if query.token.is_empty() || query.email.is_empty() {
        return Err(ErrorResponse::validation("Token and email are required"));
    }
    let valid = state.auth.verify_reset_token(&query.token, &query.email).await?;
    Ok(Json(SuccessResponse::new(ResetTokenStatus { valid })))
}
