use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use common::billing::provider::ProviderSubscription;
use common::billing::service::{
    CancelOutcome, CreatedOrder, CreatedSubscription, VerifiedPayment, WebhookOutcome,
};
use common::billing::{OrderInput, PaymentConfirmation, Prefill};
use common::models::{AuthUser, BillingCycle, Invoice, Plan, PlanSummary, Subscription};
use serde::{Deserialize, Serialize};

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(alias = "plan_id")]
    pub plan_id: i64,
    #[serde(alias = "billing_cycle")]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default, alias = "customer_info", alias = "customerInfo")]
    pub customer: Prefill,
    pub gstin: Option<String>,
    #[serde(alias = "billing_email")]
    pub billing_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(alias = "paymentId")]
    pub razorpay_payment_id: String,
    #[serde(alias = "signature")]
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[serde(alias = "plan_id")]
    pub plan_id: i64,
    #[serde(alias = "total_count")]
    pub total_count: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(alias = "cancel_at_period_end")]
    pub cancel_at_period_end: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SimulatedPayment {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Fill blank checkout prefill fields from the signed-in account
fn prefill_for(user: &AuthUser, mut prefill: Prefill) -> Prefill {
    if prefill.name.trim().is_empty() {
        prefill.name = format!("{} {}", user.first_name, user.last_name)
            .trim()
            .to_string();
    }
    if prefill.email.trim().is_empty() {
        prefill.email = user.email.clone();
    }
    prefill
}

pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<Vec<Plan>>>, ErrorResponse> {
    let plans = state.billing.list_plans().await?;
    Ok(Json(SuccessResponse::new(plans)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, plan_id = req.plan_id))]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Created<CreatedOrder>, ErrorResponse> {
    let input = OrderInput {
        plan_id: req.plan_id,
        billing_cycle: req.billing_cycle,
        customer: prefill_for(&user, req.customer),
        gstin: req.gstin.filter(|g| !g.trim().is_empty()),
        billing_email: req.billing_email.filter(|e| !e.trim().is_empty()),
    };
    let order = state.billing.create_order(user.id, input).await?;
    Ok(Created(order))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, order_id = %order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<String>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<SuccessResponse<VerifiedPayment>>, ErrorResponse> {
    let verified = state
        .billing
        .verify_payment(
            user.id,
            PaymentConfirmation {
                order_id,
                payment_id: req.razorpay_payment_id,
                signature: req.razorpay_signature,
            },
        )
        .await?;
    Ok(Json(SuccessResponse::with_message(verified, "Payment verified")))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, plan_id = req.plan_id))]
pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<Created<CreatedSubscription>, ErrorResponse> {
    let created = state
        .billing
        .create_subscription(user.id, req.plan_id, req.total_count)
        .await?;
    Ok(Created(created))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn my_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Option<Subscription>>>, ErrorResponse> {
    let subscription = state.billing.my_subscription(user.id).await?;
    Ok(Json(SuccessResponse::new(subscription)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    req: Option<Json<CancelRequest>>,
) -> Result<Json<SuccessResponse<CancelOutcome>>, ErrorResponse> {
    let at_period_end = req
        .and_then(|Json(r)| r.cancel_at_period_end)
        .unwrap_or(true);
    let outcome = state
        .billing
        .cancel_subscription(user.id, id, at_period_end)
        .await?;

    let message = if outcome.cancel_at_period_end {
        "Subscription will be cancelled at the end of the billing period"
    } else {
        "Subscription cancelled"
    };
    Ok(Json(SuccessResponse::with_message(outcome, message)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn my_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Option<PlanSummary>>>, ErrorResponse> {
    let plan = state.billing.my_current_plan(user.id).await?;
    Ok(Json(SuccessResponse::new(plan)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<SuccessResponse<Vec<Invoice>>>, ErrorResponse> {
    let invoices = state.billing.invoices(user.id, query.limit).await?;
    Ok(Json(SuccessResponse::new(invoices)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<Invoice>>, ErrorResponse> {
    let invoice = state.billing.invoice(user.id, id).await?;
    Ok(Json(SuccessResponse::new(invoice)))
}

/// Provider webhook; authenticated only by the body signature
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ErrorResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = state
        .billing
        .handle_webhook(&body, signature)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook rejected");
            ErrorResponse::from(e)
        })?;

    tracing::info!(
        event = %outcome.event,
        processed = outcome.processed,
        ignored = outcome.ignored,
        "Webhook handled"
    );
    Ok(Json(outcome))
}

fn simulator_unavailable() -> ErrorResponse {
    ErrorResponse::not_found("Payment simulator")
}

/// Mock mode only: capture a payment for an order and return what checkout would post back
#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn simulate_order_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<String>,
) -> Result<Json<SuccessResponse<SimulatedPayment>>, ErrorResponse> {
    let simulator = state
        .payment_simulator
        .as_ref()
        .ok_or_else(simulator_unavailable)?;
    let (payment_id, signature) = simulator.simulate_order_payment(&order_id).await?;
    Ok(Json(SuccessResponse::new(SimulatedPayment {
        razorpay_order_id: order_id,
        razorpay_payment_id: payment_id,
        razorpay_signature: signature,
    })))
}

/// Mock mode only: advance a provider subscription by one paid cycle
#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn simulate_subscription_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(subscription_id): Path<String>,
) -> Result<Json<SuccessResponse<ProviderSubscription>>, ErrorResponse> {
    let simulator = state
        .payment_simulator
        .as_ref()
        .ok_or_else(simulator_unavailable)?;
    let subscription = simulator.simulate_payment(&subscription_id).await?;
    Ok(Json(SuccessResponse::new(subscription)))
}
