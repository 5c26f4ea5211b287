// In-memory stand-in for the Razorpay API, used for local development

use super::provider::{
    OrderRequest, PaymentProvider, PlanRequest, ProviderOrder, ProviderPayment, ProviderPlan,
    ProviderSubscription, SubscriptionRequest,
};
use super::signature;
use crate::config::BillingConfig;
use crate::errors::BillingError;
use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

const CYCLE_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Default)]
struct MockState {
    plans: HashMap<String, ProviderPlan>,
    subscriptions: HashMap<String, ProviderSubscription>,
    orders: HashMap<String, ProviderOrder>,
    payments: HashMap<String, ProviderPayment>,
}

/// Simulates plans, subscriptions, orders and payments in process memory
pub struct MockRazorpayProvider {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    state: RwLock<MockState>,
}

fn mock_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_mock_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}

fn not_found(what: &str, id: &str) -> BillingError {
    BillingError::Provider(format!("BAD_REQUEST_ERROR: {} {} not found", what, id))
}

impl MockRazorpayProvider {
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        if config.key_id.is_empty() || config.key_secret.is_empty() {
            return Err(BillingError::NotConfigured("Razorpay keys missing".to_string()));
        }
        if config.webhook_secret.is_empty() {
            return Err(BillingError::NotConfigured(
                "Razorpay webhook secret missing".to_string(),
            ));
        }

        warn!("Using mock Razorpay provider, payments are simulated locally");
        Ok(Self {
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            state: RwLock::new(MockState::default()),
        })
    }

    /// Mark a subscription paid for one more 30-day cycle
    #[instrument(skip(self))]
    pub async fn simulate_payment(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError> {
        let mut state = self.state.write().await;
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("Subscription", subscription_id))?;

        let now = Utc::now().timestamp();
        sub.status = "active".to_string();
        sub.current_start = Some(now);
        sub.current_end = Some(now + CYCLE_SECONDS);
        let paid = sub.paid_count.unwrap_or(0) + 1;
        sub.paid_count = Some(paid);
        sub.remaining_count = sub.total_count.map(|total| total - paid);

        info!(subscription_id, paid_count = paid, "Simulated subscription payment");
        Ok(sub.clone())
    }

    /// Capture a payment against an order, returning the payment id and the
    /// checkout signature a browser would post back.
    #[instrument(skip(self))]
    pub async fn simulate_order_payment(&self, order_id: &str) -> Result<(String, String), BillingError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| not_found("Order", order_id))?;

        let payment_id = mock_id("pay");
        state.payments.insert(
            payment_id.clone(),
            ProviderPayment {
                id: payment_id.clone(),
                order_id: Some(order.id.clone()),
                amount: order.amount,
                currency: order.currency.clone(),
                status: Some("captured".to_string()),
                method: Some("upi".to_string()),
                email: None,
                contact: None,
            },
        );
        if let Some(o) = state.orders.get_mut(order_id) {
            o.status = Some("paid".to_string());
        }

        let sig = signature::sign_hex(
            signature::order_payload(order_id, &payment_id).as_bytes(),
            &self.key_secret,
        );
        Ok((payment_id, sig))
    }
}

#[async_trait]
impl PaymentProvider for MockRazorpayProvider {
    fn name(&self) -> &'static str {
        "razorpay-mock"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn create_order(&self, request: OrderRequest) -> Result<ProviderOrder, BillingError> {
        let order = ProviderOrder {
            id: mock_id("order"),
            amount: request.amount_paise,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".to_string()),
        };
        self.state
            .write()
            .await
            .orders
            .insert(order.id.clone(), order.clone());
        info!(order_id = %order.id, "Mock order created");
        Ok(order)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<ProviderPayment, BillingError> {
        self.state
            .read()
            .await
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| not_found("Payment", payment_id))
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature::verify_order_signature(order_id, payment_id, signature, &self.key_secret)
    }

    async fn create_plan(&self, request: PlanRequest) -> Result<ProviderPlan, BillingError> {
        let plan = ProviderPlan {
            id: mock_id("plan"),
            period: Some(request.period),
            interval: Some(request.interval),
        };
        self.state
            .write()
            .await
            .plans
            .insert(plan.id.clone(), plan.clone());
        info!(plan_id = %plan.id, name = %request.name, "Mock plan created");
        Ok(plan)
    }

    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError> {
        let mut state = self.state.write().await;
        if !state.plans.contains_key(&request.plan_id) {
            return Err(not_found("Plan", &request.plan_id));
        }

        let total = i64::from(request.total_count);
        let sub = ProviderSubscription {
            id: mock_id("sub"),
            plan_id: Some(request.plan_id),
            status: "created".to_string(),
            current_start: None,
            current_end: None,
            ended_at: None,
            total_count: Some(total),
            paid_count: Some(0),
            remaining_count: Some(total),
            short_url: None,
            notes: Value::Object(request.notes),
        };
        let sub = ProviderSubscription {
            short_url: Some(format!("https://rzp.io/mock/{}", sub.id)),
            ..sub
        };
        state.subscriptions.insert(sub.id.clone(), sub.clone());
        info!(subscription_id = %sub.id, "Mock subscription created");
        Ok(sub)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        let mut state = self.state.write().await;
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| not_found("Subscription", subscription_id))?;

        if at_cycle_end {
            sub.status = "pending_cancellation".to_string();
            sub.ended_at = None;
        } else {
            sub.status = "cancelled".to_string();
            sub.ended_at = Some(Utc::now().timestamp());
        }
        Ok(sub.clone())
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError> {
        self.state
            .read()
            .await
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| not_found("Subscription", subscription_id))
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        signature::verify_webhook_signature(raw_body, signature, &self.webhook_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingMode;

    fn config() -> BillingConfig {
        BillingConfig {
            mode: BillingMode::Mock,
            key_id: "rzp_test_mock".into(),
            key_secret: "mock_key_secret".into(),
            webhook_secret: "mock_webhook_secret".into(),
            brand_name: "Mini CRM 360".into(),
            currency: "INR".into(),
            api_base_url: String::new(),
        }
    }

    #[test]
    fn test_construction_requires_secrets() {
        let mut c = config();
        c.webhook_secret.clear();
        assert!(matches!(
            MockRazorpayProvider::new(&c),
            Err(BillingError::NotConfigured(_))
        ));
        let mut c = config();
        c.key_id.clear();
        assert!(MockRazorpayProvider::new(&c).is_err());
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let provider = MockRazorpayProvider::new(&config()).unwrap();
        let plan = provider
            .create_plan(PlanRequest {
                name: "Gold".into(),
                amount_paise: 99_900,
                currency: "INR".into(),
                interval: 1,
                period: "monthly".into(),
                description: "Gold monthly".into(),
            })
            .await
            .unwrap();
        assert!(plan.id.starts_with("plan_mock_"));

        let sub = provider
            .create_subscription(SubscriptionRequest {
                plan_id: plan.id.clone(),
                total_count: 12,
                notes: Default::default(),
            })
            .await
            .unwrap();
        assert!(sub.id.starts_with("sub_mock_"));
        assert_eq!(sub.status, "created");

        let paid = provider.simulate_payment(&sub.id).await.unwrap();
        assert_eq!(paid.status, "active");
        assert_eq!(paid.paid_count, Some(1));
        assert_eq!(paid.remaining_count, Some(11));
        assert_eq!(paid.current_end.unwrap() - paid.current_start.unwrap(), CYCLE_SECONDS);

        let cancelled = provider.cancel_subscription(&sub.id, true).await.unwrap();
        assert_eq!(cancelled.status, "pending_cancellation");
        let cancelled = provider.cancel_subscription(&sub.id, false).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(cancelled.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_subscription_needs_known_plan() {
        let provider = MockRazorpayProvider::new(&config()).unwrap();
        let err = provider
            .create_subscription(SubscriptionRequest {
                plan_id: "plan_missing".into(),
                total_count: 12,
                notes: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Provider(_)));
    }

    #[tokio::test]
    async fn test_order_payment_signature_verifies() {
        let provider = MockRazorpayProvider::new(&config()).unwrap();
        let order = provider
            .create_order(OrderRequest {
                amount_paise: 49_900,
                currency: "INR".into(),
                receipt: "order_2_1_0".into(),
                notes: Default::default(),
            })
            .await
            .unwrap();

        let (payment_id, sig) = provider.simulate_order_payment(&order.id).await.unwrap();
        assert!(provider.verify_payment_signature(&order.id, &payment_id, &sig));
        assert!(!provider.verify_payment_signature(&order.id, &payment_id, "deadbeef"));

        let payment = provider.fetch_payment(&payment_id).await.unwrap();
        assert_eq!(payment.amount, 49_900);
        assert_eq!(payment.order_id.as_deref(), Some(order.id.as_str()));
    }
}
