use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::models::{AuthUser, Plan, PlanInput};

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

/// Every plan, inactive ones included (admin only)
#[tracing::instrument(skip(state, admin), fields(admin_id = admin.id))]
pub async fn list_plans(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Vec<Plan>>>, ErrorResponse> {
    let plans = state.plans.list_all().await?;
    Ok(Json(SuccessResponse::new(plans)))
}

#[tracing::instrument(skip(state, admin), fields(admin_id = admin.id))]
pub async fn get_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<Plan>>, ErrorResponse> {
    let plan = state.plans.get(id).await?;
    Ok(Json(SuccessResponse::new(plan)))
}

#[tracing::instrument(skip(state, admin, input), fields(admin_id = admin.id))]
pub async fn create_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(input): Json<PlanInput>,
) -> Result<Created<Plan>, ErrorResponse> {
    let plan = state.plans.create_plan(input).await?;
    Ok(Created(plan))
}

#[tracing::instrument(skip(state, admin, input), fields(admin_id = admin.id))]
pub async fn update_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<PlanInput>,
) -> Result<Json<SuccessResponse<Plan>>, ErrorResponse> {
    let plan = state.plans.update_plan(id, input).await?;
    Ok(Json(SuccessResponse::with_message(plan, "Plan updated successfully")))
}

#[tracing::instrument(skip(state, admin), fields(admin_id = admin.id))]
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state.plans.delete_plan(id).await?;
    Ok(Json(SuccessResponse::with_message((), "Plan deleted successfully")))
}
