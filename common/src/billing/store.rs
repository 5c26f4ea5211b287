// Persistence seam for the billing service

use crate::errors::DatabaseError;
use crate::models::{
    BillingStatus, Invoice, NewInvoice, NewPaymentLog, NewSubscription, PaymentLog, Plan,
    PlanSummary, Subscription, UserPlan,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A plan to make current for a user
#[derive(Debug, Clone, PartialEq)]
pub struct PlanActivation {
    pub user_id: i64,
    pub plan_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Everything a verified checkout writes
#[derive(Debug, Clone)]
pub struct OrderCompletion {
    pub activation: PlanActivation,
    pub order_id: String,
    pub payment_id: String,
    pub paid_at: DateTime<Utc>,
    /// `user_plan_id` is filled in with the activated plan
    pub invoice: NewInvoice,
}

/// Plan period and invoice granted for one order
#[derive(Debug, Clone)]
pub struct CompletedOrder {
    pub user_plan: UserPlan,
    pub invoice: Invoice,
}

/// Subscription columns to change; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionUpdate {
    pub status: Option<BillingStatus>,
    pub current_cycle_start: Option<DateTime<Utc>>,
    pub current_cycle_end: Option<DateTime<Utc>>,
    pub billed_count: Option<i32>,
    pub cancel_at_period_end: Option<bool>,
    /// `Some(None)` clears the cancellation timestamp
    pub cancelled_at: Option<Option<DateTime<Utc>>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError>;

    async fn plan_by_id(&self, plan_id: i64) -> Result<Option<Plan>, DatabaseError>;

    async fn create_payment_log(&self, log: NewPaymentLog) -> Result<PaymentLog, DatabaseError>;

    async fn payment_log_by_order(&self, order_id: &str) -> Result<Option<PaymentLog>, DatabaseError>;

    async fn complete_payment_log(
        &self,
        order_id: &str,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn fail_payment_log(&self, order_id: &str, error_message: &str) -> Result<(), DatabaseError>;

    /// Demote the user's current plan and insert `activation` as current
    async fn activate_user_plan(&self, activation: PlanActivation) -> Result<UserPlan, DatabaseError>;

    /// Activate the plan, complete the payment log and issue the invoice in one
    /// transaction. `None` when the order already has an invoice.
    async fn complete_order(&self, completion: OrderCompletion) -> Result<Option<CompletedOrder>, DatabaseError>;

    /// Plan and invoice from an earlier completion of the order
    async fn completed_order(&self, order_id: &str) -> Result<Option<CompletedOrder>, DatabaseError>;

    /// User plan already granted for a completed order, if any
    async fn user_plan_for_order(&self, order_id: &str) -> Result<Option<UserPlan>, DatabaseError>;

    async fn current_plan(&self, user_id: i64) -> Result<Option<PlanSummary>, DatabaseError>;

    async fn invoices(&self, user_id: i64, limit: i64) -> Result<Vec<Invoice>, DatabaseError>;

    async fn invoice_by_id(&self, invoice_id: i64) -> Result<Option<Invoice>, DatabaseError>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, DatabaseError>;

    /// Insert or update the webhook log row as processed
    async fn record_event(&self, event_id: &str, event_type: &str, data: &Value) -> Result<(), DatabaseError>;

    async fn provider_plan_id(&self, plan_id: i64) -> Result<Option<String>, DatabaseError>;

    async fn save_provider_plan_id(&self, plan_id: i64, provider_plan_id: &str) -> Result<(), DatabaseError>;

    async fn create_subscription(&self, subscription: NewSubscription) -> Result<Subscription, DatabaseError>;

    async fn subscription_by_id(&self, subscription_id: i64) -> Result<Option<Subscription>, DatabaseError>;

    async fn update_subscription(
        &self,
        subscription_id: i64,
        update: SubscriptionUpdate,
    ) -> Result<(), DatabaseError>;

    /// Returns the number of local rows touched
    async fn update_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<u64, DatabaseError>;

    async fn active_subscription(&self, user_id: i64) -> Result<Option<Subscription>, DatabaseError>;
}
