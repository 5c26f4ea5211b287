use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use common::customer_import::{self, ImportReport};
use common::db::repositories::CustomerFilter;
use common::models::{AuthUser, Customer, CustomerInput, CustomerPatch, TimelineEvent};
use common::plan;
use common::validation::{clean_tags, normalize_phone, require_e164, require_email};
use serde::Deserialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRequest {
    #[serde(alias = "business_id")]
    pub business_id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, alias = "phone_e164", alias = "phoneE164")]
    pub phone: String,
    #[serde(alias = "whatsapp_e164", alias = "whatsappE164")]
    pub whatsapp: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub consent: bool,
    #[serde(alias = "date_of_birth")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(alias = "anniversary_date")]
    pub anniversary_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub tag: Option<String>,
    pub business_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub business_id: Option<i64>,
}

fn normalized(field: &str, raw: &str) -> Result<String, ErrorResponse> {
    let phone = normalize_phone(raw).unwrap_or_else(|| raw.trim().to_string());
    require_e164(field, &phone)?;
    Ok(phone)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The business a new customer goes under: the requested one if the caller
/// owns it, otherwise their first business
async fn resolve_business(
    state: &AppState,
    user_id: i64,
    requested: Option<i64>,
) -> Result<i64, ErrorResponse> {
    let business = match requested {
        Some(id) => state.businesses().find(user_id, id).await?,
        None => state.businesses().first_for_owner(user_id).await?,
    };
    business
        .map(|b| b.id)
        .ok_or_else(|| ErrorResponse::validation("Please create a business first"))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_customers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SuccessResponse<Vec<Customer>>>, ErrorResponse> {
    let filter = CustomerFilter {
        tag: non_blank(query.tag),
        business_id: query.business_id,
        limit: query.limit,
    };
    let customers = state.customers().list(user.id, &filter).await?;
    Ok(Json(SuccessResponse::new(customers)))
}

/// Add a customer, or update the existing one with the same phone number.
/// Only new customers count against the plan's customer limit.
#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn create_customer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CustomerRequest>,
) -> Result<Response, ErrorResponse> {
    let business_id = resolve_business(&state, user.id, req.business_id).await?;

    let phone = normalized("phone", &req.phone)?;
    let whatsapp = match non_blank(req.whatsapp) {
        Some(raw) => normalized("whatsapp", &raw)?,
        None => phone.clone(),
    };
    let email = non_blank(req.email);
    if let Some(email) = email.as_deref() {
        require_email("email", email)?;
    }

    let input = CustomerInput {
        business_id: Some(business_id),
        name: non_blank(req.name),
        email,
        phone_e164: phone,
        whatsapp_e164: Some(whatsapp),
        tags: req.tags.map(clean_tags),
        consent: req.consent,
        date_of_birth: req.date_of_birth,
        anniversary_date: req.anniversary_date,
    };

    let customers = state.customers();
    if customers.find_by_phone(user.id, &input.phone_e164).await?.is_none() {
        let current = state.plans.current_plan(user.id).await?;
        plan::check_customer_quota(current.as_ref(), customers.count(user.id).await?)?;
    }

    let outcome = customers.upsert(user.id, &input).await?;
    let customer = outcome.customer;

    if outcome.created {
        state
            .notes()
            .log_event(TimelineEvent::customer_created(user.id, customer.id))
            .await;
        Ok((StatusCode::CREATED, Json(SuccessResponse::with_message(customer, "Customer created")))
            .into_response())
    } else {
        Ok(Json(SuccessResponse::with_message(customer, "Customer updated")).into_response())
    }
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_customer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<Customer>>, ErrorResponse> {
    let customer = state
        .customers()
        .find(user.id, id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;
    Ok(Json(SuccessResponse::new(customer)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn update_customer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<CustomerPatch>,
) -> Result<Json<SuccessResponse<Customer>>, ErrorResponse> {
    let mut patch = req;
    if let Some(raw) = patch.phone_e164.take() {
        patch.phone_e164 = Some(normalized("phone", &raw)?);
    }
    if let Some(raw) = patch.whatsapp_e164.take() {
        patch.whatsapp_e164 = Some(normalized("whatsapp", &raw)?);
    }
    if let Some(email) = patch.email.as_deref().filter(|e| !e.is_empty()) {
        require_email("email", email)?;
    }
    if let Some(business_id) = patch.business_id {
        resolve_business(&state, user.id, Some(business_id)).await?;
    }
    patch.tags = patch.tags.map(clean_tags);

    let customer = state.customers().update(user.id, id, &patch).await?;
    Ok(Json(SuccessResponse::new(customer)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_customer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state.customers().delete(user.id, id).await?;
    Ok(Json(SuccessResponse::with_message((), "Customer deleted")))
}

/// CSV upload with `name,phone,whatsapp,email,tags` columns
#[tracing::instrument(skip(state, user, body), fields(user_id = user.id, bytes = body.len()))]
pub async fn bulk_upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UploadQuery>,
    body: String,
) -> Result<Json<SuccessResponse<ImportReport>>, ErrorResponse> {
    if body.trim().is_empty() {
        return Err(ErrorResponse::validation("CSV body is empty"));
    }
    let business_id = resolve_business(&state, user.id, query.business_id).await?;

    let customers = state.customers();
    let current = state.plans.current_plan(user.id).await?;
    let capacity = plan::remaining_customers(current.as_ref(), customers.count(user.id).await?);

    let report = customer_import::import_customers(
        &customers,
        &state.notes(),
        user.id,
        business_id,
        capacity,
        &body,
    )
    .await;
    let message = format!(
        "{} created, {} updated, {} failed",
        report.created, report.updated, report.failed
    );
    Ok(Json(SuccessResponse::with_message(report, message)))
}
