// Razorpay billing: provider clients, webhook events and the billing service

pub mod events;
pub mod mock;
pub mod provider;
pub mod razorpay;
pub mod service;
pub mod signature;
pub mod store;

pub use mock::MockRazorpayProvider;
pub use provider::{CheckoutConfig, PaymentProvider, Prefill};
pub use razorpay::RazorpayProvider;
pub use service::{BillingService, OrderInput, PaymentConfirmation};
pub use store::BillingStore;

use crate::config::{BillingConfig, BillingMode};
use crate::errors::BillingError;
use std::sync::Arc;
use tracing::info;

/// The configured provider, plus the simulator handle when running in mock mode
#[derive(Clone)]
pub struct ProviderHandle {
    pub provider: Arc<dyn PaymentProvider>,
    pub simulator: Option<Arc<MockRazorpayProvider>>,
}

pub fn build_provider(config: &BillingConfig) -> Result<ProviderHandle, BillingError> {
    match config.mode {
        BillingMode::Live => {
            let provider = Arc::new(RazorpayProvider::new(config)?);
            info!(configured = provider.is_configured(), "Using Razorpay provider");
            Ok(ProviderHandle {
                provider,
                simulator: None,
            })
        }
        BillingMode::Mock => {
            let mock = Arc::new(MockRazorpayProvider::new(config)?);
            Ok(ProviderHandle {
                provider: mock.clone(),
                simulator: Some(mock),
            })
        }
    }
}
