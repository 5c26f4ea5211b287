use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::models::{AuthUser, Business};
use common::plan;
use common::validation::require_non_empty;
use serde::Deserialize;

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BusinessRequest {
    #[serde(default, alias = "businessName")]
    pub business_name: String,
    pub category: Option<String>,
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn create_business(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<BusinessRequest>,
) -> Result<Created<Business>, ErrorResponse> {
    require_non_empty("business_name", &req.business_name)?;
    let businesses = state.businesses();
    let current = state.plans.current_plan(user.id).await?;
    plan::check_business_quota(current.as_ref(), businesses.count(user.id).await?)?;

    let business = businesses
        .create(user.id, req.business_name.trim(), req.category.as_deref())
        .await?;
    Ok(Created(business))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_businesses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Vec<Business>>>, ErrorResponse> {
    let businesses = state.businesses().list(user.id).await?;
    Ok(Json(SuccessResponse::new(businesses)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn update_business(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<BusinessRequest>,
) -> Result<Json<SuccessResponse<Business>>, ErrorResponse> {
    require_non_empty("business_name", &req.business_name)?;
    let business = state
        .businesses()
        .update(user.id, id, req.business_name.trim(), req.category.as_deref())
        .await?;
    Ok(Json(SuccessResponse::new(business)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_business(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state.businesses().delete(user.id, id).await?;
    Ok(Json(SuccessResponse::with_message((), "Business deleted")))
}
