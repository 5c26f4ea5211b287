// Payment provider abstraction

use crate::errors::BillingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Order as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPlan {
    pub id: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub interval: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_start: Option<i64>,
    #[serde(default)]
    pub current_end: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub total_count: Option<i64>,
    #[serde(default)]
    pub paid_count: Option<i64>,
    #[serde(default)]
    pub remaining_count: Option<i64>,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub notes: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub amount_paise: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub name: String,
    pub amount_paise: i64,
    pub currency: String,
    pub interval: i64,
    pub period: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    pub plan_id: String,
    pub total_count: i32,
    pub notes: Map<String, Value>,
}

/// Checkout prefill for the payer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prefill {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub contact: String,
}

/// Options handed to the browser checkout widget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutConfig {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefill: Option<Prefill>,
    #[serde(rename = "_mock", skip_serializing_if = "std::ops::Not::not")]
    pub mock: bool,
}

/// Operations the billing service needs from a payment gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    fn key_id(&self) -> String;

    fn is_mock(&self) -> bool;

    async fn create_order(&self, request: OrderRequest) -> Result<ProviderOrder, BillingError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<ProviderPayment, BillingError>;

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    async fn create_plan(&self, request: PlanRequest) -> Result<ProviderPlan, BillingError>;

    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError>;

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool;
}

pub fn order_checkout(
    provider: &dyn PaymentProvider,
    order: &ProviderOrder,
    name: &str,
    description: &str,
    prefill: Prefill,
) -> CheckoutConfig {
    CheckoutConfig {
        key: provider.key_id(),
        order_id: Some(order.id.clone()),
        subscription_id: None,
        amount: Some(order.amount),
        currency: Some(order.currency.clone()),
        name: name.to_string(),
        description: description.to_string(),
        prefill: Some(prefill),
        mock: provider.is_mock(),
    }
}

pub fn subscription_checkout(
    provider: &dyn PaymentProvider,
    subscription_id: &str,
    name: &str,
    description: &str,
) -> CheckoutConfig {
    CheckoutConfig {
        key: provider.key_id(),
        order_id: None,
        subscription_id: Some(subscription_id.to_string()),
        amount: None,
        currency: None,
        name: name.to_string(),
        description: description.to_string(),
        prefill: None,
        mock: provider.is_mock(),
    }
}
