// Razorpay REST client

use super::provider::{
    OrderRequest, PaymentProvider, PlanRequest, ProviderOrder, ProviderPayment, ProviderPlan,
    ProviderSubscription, SubscriptionRequest,
};
use super::signature;
use crate::config::BillingConfig;
use crate::errors::BillingError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{instrument, warn};

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Live Razorpay provider over HTTPS with key id / secret basic auth
pub struct RazorpayProvider {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl RazorpayProvider {
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| BillingError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        if config.key_id.is_empty() || config.key_secret.is_empty() {
            warn!("Razorpay keys not configured, payment features are disabled");
        }

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
        })
    }

    fn ensure_configured(&self) -> Result<(), BillingError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(BillingError::NotConfigured("Razorpay keys are missing".to_string()))
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, BillingError> {
        self.ensure_configured()?;

        let response = request
            .send()
            .await
            .map_err(|e| BillingError::Provider(format!("{} request failed: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Provider(format!(
                "{} failed with status {}: {}",
                what, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::Provider(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl PaymentProvider for RazorpayProvider {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }

    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    fn is_mock(&self) -> bool {
        false
    }

    #[instrument(skip(self, request), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: OrderRequest) -> Result<ProviderOrder, BillingError> {
        let body = json!({
            "amount": request.amount_paise,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": request.notes,
        });
        self.send(self.request(reqwest::Method::POST, "/orders").json(&body), "Create order")
            .await
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<ProviderPayment, BillingError> {
        self.send(
            self.request(reqwest::Method::GET, &format!("/payments/{}", payment_id)),
            "Fetch payment",
        )
        .await
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature::verify_order_signature(order_id, payment_id, signature, &self.key_secret)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    async fn create_plan(&self, request: PlanRequest) -> Result<ProviderPlan, BillingError> {
        let body = json!({
            "period": request.period,
            "interval": request.interval,
            "item": {
                "name": request.name,
                "amount": request.amount_paise,
                "currency": request.currency,
                "description": request.description,
            },
        });
        self.send(self.request(reqwest::Method::POST, "/plans").json(&body), "Create plan")
            .await
    }

    #[instrument(skip(self, request), fields(plan_id = %request.plan_id))]
    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError> {
        let body = json!({
            "plan_id": request.plan_id,
            "customer_notify": 1,
            "total_count": request.total_count,
            "notes": request.notes,
        });
        self.send(
            self.request(reqwest::Method::POST, "/subscriptions").json(&body),
            "Create subscription",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        let body = json!({ "cancel_at_cycle_end": if at_cycle_end { 1 } else { 0 } });
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("/subscriptions/{}/cancel", subscription_id),
            )
            .json(&body),
            "Cancel subscription",
        )
        .await
    }

    #[instrument(skip(self))]
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription, BillingError> {
        self.send(
            self.request(reqwest::Method::GET, &format!("/subscriptions/{}", subscription_id)),
            "Fetch subscription",
        )
        .await
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        signature::verify_webhook_signature(raw_body, signature, &self.webhook_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingMode;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, key_id: &str) -> BillingConfig {
        BillingConfig {
            mode: BillingMode::Live,
            key_id: key_id.to_string(),
            key_secret: "secret".to_string(),
            webhook_secret: "whsec".to_string(),
            brand_name: "Mini CRM 360".to_string(),
            currency: "INR".to_string(),
            api_base_url: base_url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_order_posts_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_abc", "amount": 49900, "currency": "INR",
                "receipt": "order_2_7_1", "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = RazorpayProvider::new(&config(&server.uri(), "rzp_test_key")).unwrap();
        let order = provider
            .create_order(OrderRequest {
                amount_paise: 49900,
                currency: "INR".into(),
                receipt: "order_2_7_1".into(),
                notes: Default::default(),
            })
            .await
            .unwrap();

        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 49900);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_missing"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let provider = RazorpayProvider::new(&config(&server.uri(), "rzp_test_key")).unwrap();
        let err = provider.fetch_payment("pay_missing").await.unwrap_err();
        assert!(matches!(err, BillingError::Provider(msg) if msg.contains("400")));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_calls() {
        let provider = RazorpayProvider::new(&config("http://127.0.0.1:1", "")).unwrap();
        assert!(!provider.is_configured());
        let err = provider.fetch_subscription("sub_1").await.unwrap_err();
        assert!(matches!(err, BillingError::NotConfigured(_)));
    }

    #[test]
    fn test_signatures_use_configured_secrets() {
        let provider = RazorpayProvider::new(&config("http://localhost", "key")).unwrap();
        let order_sig = signature::sign_hex(b"order_1|pay_1", "secret");
        assert!(provider.verify_payment_signature("order_1", "pay_1", &order_sig));
        let hook_sig = signature::sign_hex(b"{}", "whsec");
        assert!(provider.verify_webhook_signature(b"{}", &hook_sig));
        assert!(!provider.verify_webhook_signature(b"{}", &order_sig));
    }
}
