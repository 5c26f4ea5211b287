// Orders, subscriptions and webhook processing on top of a payment provider

use super::events::{self, PaymentEntity, PlanNotes, SubscriptionEntity};
use super::provider::{
    order_checkout, subscription_checkout, CheckoutConfig, OrderRequest, PaymentProvider,
    PlanRequest, Prefill, ProviderSubscription, SubscriptionRequest,
};
use super::store::{
    BillingStore, CompletedOrder, OrderCompletion, PlanActivation, SubscriptionUpdate,
};
use crate::errors::BillingError;
use crate::models::{
    BillingCycle, BillingStatus, Invoice, InvoiceStatus, NewInvoice, NewPaymentLog,
    NewSubscription, PaymentStatus, Plan, PlanSummary, Subscription, UserPlan,
};
use crate::plan::{period_end, price_for_cycle};
use crate::telemetry;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const DEFAULT_SUBSCRIPTION_COUNT: i32 = 12;
pub const DEFAULT_INVOICE_LIMIT: i64 = 20;
const SUBSCRIPTION_CYCLE_DAYS: i64 = 30;
const INVOICE_DUE_DAYS: i64 = 15;

/// Checkout request for a one-off plan purchase
#[derive(Debug, Clone, Default)]
pub struct OrderInput {
    pub plan_id: i64,
    pub billing_cycle: Option<BillingCycle>,
    pub customer: Prefill,
    pub gstin: Option<String>,
    pub billing_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanBrief {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub amount_paise: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: OrderSummary,
    pub checkout: CheckoutConfig,
    pub plan: PlanBrief,
    pub key_id: String,
}

/// Fields posted back by the checkout widget
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub verified: bool,
    pub payment_id: String,
    pub order_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub method: Option<String>,
    pub user_plan: UserPlan,
    pub invoice: Invoice,
}

impl VerifiedPayment {
    fn from_completed(
        payment_id: String,
        order_id: String,
        method: Option<String>,
        done: CompletedOrder,
    ) -> Self {
        Self {
            verified: true,
            payment_id,
            order_id,
            amount_paise: done.invoice.amount_paise,
            currency: done.invoice.currency.clone(),
            method,
            user_plan: done.user_plan,
            invoice: done.invoice,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedSubscription {
    pub subscription: Subscription,
    pub provider_subscription: ProviderSubscription,
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub cancelled: bool,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event: String,
    pub processed: bool,
    pub ignored: bool,
}

/// `INV-{yyyymmdd}-{6 chars}`
pub fn invoice_number(now: chrono::DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("INV-{}-{}", now.format("%Y%m%d"), suffix)
}

#[derive(Clone)]
pub struct BillingService {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn BillingStore>,
    brand_name: String,
}

impl BillingService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn BillingStore>,
        brand_name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            brand_name: brand_name.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    pub fn provider(&self) -> &Arc<dyn PaymentProvider> {
        &self.provider
    }

    fn ensure_configured(&self) -> Result<(), BillingError> {
        if self.provider.is_configured() {
            Ok(())
        } else {
            Err(BillingError::NotConfigured(
                "Razorpay keys are not configured".to_string(),
            ))
        }
    }

    async fn plan(&self, plan_id: i64) -> Result<Plan, BillingError> {
        self.store
            .plan_by_id(plan_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(plan_id.to_string()))
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, BillingError> {
        Ok(self.store.list_plans().await?)
    }

    #[instrument(skip(self, input), fields(plan_id = input.plan_id))]
    pub async fn create_order(&self, user_id: i64, input: OrderInput) -> Result<CreatedOrder, BillingError> {
        self.ensure_configured()?;
        let plan = self.plan(input.plan_id).await?;
        let cycle = input.billing_cycle.unwrap_or(BillingCycle::Monthly);

        let amount_paise = price_for_cycle(&plan, cycle);
        if amount_paise <= 0 {
            return Err(BillingError::InvalidPayload(format!(
                "Plan {} has no price to charge",
                plan.slug
            )));
        }

        let receipt = format!("order_{}_{}_{}", plan.id, user_id, Utc::now().timestamp_millis());
        let billing_email = input
            .billing_email
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| input.customer.email.clone());

        let mut notes = Map::new();
        notes.insert("user_id".into(), json!(user_id.to_string()));
        notes.insert("plan_id".into(), json!(plan.id.to_string()));
        notes.insert("plan_slug".into(), json!(plan.slug));
        notes.insert("plan_name".into(), json!(plan.name));
        notes.insert("billing_cycle".into(), json!(cycle.as_str()));
        notes.insert("gstin".into(), json!(input.gstin.clone().unwrap_or_default()));
        notes.insert("billing_email".into(), json!(billing_email));

        let order = self
            .provider
            .create_order(OrderRequest {
                amount_paise,
                currency: plan.currency.clone(),
                receipt,
                notes,
            })
            .await?;

        self.store
            .create_payment_log(NewPaymentLog {
                user_id,
                plan_id: plan.id,
                razorpay_order_id: order.id.clone(),
                amount_paise,
                currency: plan.currency.clone(),
                billing_cycle: cycle,
                metadata: json!({ "gstin": input.gstin, "billing_email": billing_email }),
            })
            .await?;

        let cycle_label = match cycle {
            BillingCycle::Monthly => "Monthly",
            BillingCycle::Yearly => "Yearly",
        };
        let checkout = order_checkout(
            self.provider.as_ref(),
            &order,
            &self.brand_name,
            &format!("{} - {} Subscription", plan.name, cycle_label),
            input.customer,
        );

        info!(user_id, order_id = %order.id, amount_paise, "Order created");
        Ok(CreatedOrder {
            order: OrderSummary {
                id: order.id,
                amount: order.amount,
                currency: order.currency,
            },
            checkout,
            plan: PlanBrief {
                id: plan.id,
                name: plan.name,
                slug: plan.slug,
                amount_paise,
            },
            key_id: self.provider.key_id(),
        })
    }

    /// Confirm a checkout payment and grant the purchased plan.
    ///
    /// Plan and cycle come from the stored payment log, not from the caller.
    #[instrument(skip(self, confirmation), fields(order_id = %confirmation.order_id))]
    pub async fn verify_payment(
        &self,
        user_id: i64,
        confirmation: PaymentConfirmation,
    ) -> Result<VerifiedPayment, BillingError> {
        let PaymentConfirmation {
            order_id,
            payment_id,
            signature,
        } = confirmation;

        let log = self
            .store
            .payment_log_by_order(&order_id)
            .await?
            .filter(|log| log.user_id == user_id)
            .ok_or_else(|| BillingError::OrderNotFound(order_id.clone()))?;

        if !self
            .provider
            .verify_payment_signature(&order_id, &payment_id, &signature)
        {
            if log.status != PaymentStatus::Completed {
                self.store
                    .fail_payment_log(&order_id, "Invalid payment signature")
                    .await?;
            }
            warn!(user_id, order_id = %order_id, "Payment signature mismatch");
            return Err(BillingError::InvalidSignature);
        }

        // A repeated confirmation returns what the first one granted
        if log.status == PaymentStatus::Completed {
            if let Some(done) = self.store.completed_order(&order_id).await? {
                info!(user_id, order_id = %order_id, "Payment already verified");
                return Ok(VerifiedPayment::from_completed(payment_id, order_id, None, done));
            }
        }

        let payment = self.provider.fetch_payment(&payment_id).await?;
        let plan = self.plan(log.plan_id).await?;

        let now = Utc::now();
        let completion = OrderCompletion {
            activation: PlanActivation {
                user_id,
                plan_id: plan.id,
                start_date: now,
                end_date: Some(period_end(now, log.billing_cycle)),
            },
            order_id: order_id.clone(),
            payment_id: payment_id.clone(),
            paid_at: now,
            invoice: NewInvoice {
                invoice_number: invoice_number(now),
                user_id,
                plan_id: plan.id,
                user_plan_id: None,
                amount_paise: payment.amount,
                currency: payment.currency.clone(),
                razorpay_order_id: Some(order_id.clone()),
                razorpay_payment_id: Some(payment_id.clone()),
                status: InvoiceStatus::Paid,
                billing_cycle: log.billing_cycle,
                description: Some(format!("{} - {} subscription", plan.name, log.billing_cycle)),
                paid_at: Some(now),
                due_date: now + Duration::days(INVOICE_DUE_DAYS),
            },
        };

        let done = match self.store.complete_order(completion).await? {
            Some(done) => done,
            // Lost a race with a concurrent confirmation of the same order
            None => self
                .store
                .completed_order(&order_id)
                .await?
                .ok_or_else(|| BillingError::OrderNotFound(order_id.clone()))?,
        };

        self.store
            .record_event(
                &format!("payment_{}", payment_id),
                "payment.captured.manual",
                &json!({
                    "payment_id": payment_id,
                    "order_id": order_id,
                    "amount": payment.amount,
                    "currency": payment.currency,
                    "method": payment.method,
                    "email": payment.email,
                    "contact": payment.contact,
                }),
            )
            .await?;

        info!(user_id, plan_id = plan.id, invoice = %done.invoice.invoice_number, "Payment verified");
        Ok(VerifiedPayment::from_completed(payment_id, order_id, payment.method, done))
    }

    #[instrument(skip(self))]
    pub async fn create_subscription(
        &self,
        user_id: i64,
        plan_id: i64,
        total_count: Option<i32>,
    ) -> Result<CreatedSubscription, BillingError> {
        self.ensure_configured()?;
        let plan = self.plan(plan_id).await?;
        let total_count = total_count
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_SUBSCRIPTION_COUNT);

        let provider_plan_id = match self.store.provider_plan_id(plan.id).await? {
            Some(id) => id,
            None => {
                let created = self
                    .provider
                    .create_plan(PlanRequest {
                        name: plan.name.clone(),
                        amount_paise: plan.price_paise,
                        currency: plan.currency.clone(),
                        interval: 1,
                        period: "monthly".to_string(),
                        description: plan
                            .description
                            .clone()
                            .unwrap_or_else(|| format!("{} monthly subscription", plan.name)),
                    })
                    .await?;
                self.store.save_provider_plan_id(plan.id, &created.id).await?;
                info!(plan_id = plan.id, provider_plan_id = %created.id, "Provider plan created");
                created.id
            }
        };

        let mut notes = Map::new();
        notes.insert("user_id".into(), json!(user_id.to_string()));
        notes.insert("plan_id".into(), json!(plan.id.to_string()));
        notes.insert("plan_name".into(), json!(plan.name));

        let provider_subscription = self
            .provider
            .create_subscription(SubscriptionRequest {
                plan_id: provider_plan_id,
                total_count,
                notes,
            })
            .await?;

        let now = Utc::now();
        let subscription = self
            .store
            .create_subscription(NewSubscription {
                user_id,
                plan_id: plan.id,
                razorpay_subscription_id: provider_subscription.id.clone(),
                status: BillingStatus::Pending,
                total_count,
                current_cycle_start: now,
                current_cycle_end: now + Duration::days(SUBSCRIPTION_CYCLE_DAYS),
            })
            .await?;

        let checkout = subscription_checkout(
            self.provider.as_ref(),
            &provider_subscription.id,
            &self.brand_name,
            &format!("{} subscription", plan.name),
        );

        Ok(CreatedSubscription {
            subscription,
            provider_subscription,
            checkout,
        })
    }

    #[instrument(skip(self))]
    pub async fn cancel_subscription(
        &self,
        user_id: i64,
        subscription_id: i64,
        at_period_end: bool,
    ) -> Result<CancelOutcome, BillingError> {
        let subscription = self
            .store
            .subscription_by_id(subscription_id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;
        if subscription.user_id != user_id {
            return Err(BillingError::NotOwner(subscription_id.to_string()));
        }

        if let Some(provider_id) = subscription.razorpay_subscription_id.as_deref() {
            self.provider
                .cancel_subscription(provider_id, at_period_end)
                .await?;
        }

        let update = if at_period_end {
            SubscriptionUpdate {
                status: Some(BillingStatus::Active),
                cancel_at_period_end: Some(true),
                cancelled_at: Some(None),
                ..Default::default()
            }
        } else {
            SubscriptionUpdate {
                status: Some(BillingStatus::Cancelled),
                cancel_at_period_end: Some(false),
                cancelled_at: Some(Some(Utc::now())),
                ..Default::default()
            }
        };
        self.store.update_subscription(subscription_id, update).await?;

        info!(user_id, subscription_id, at_period_end, "Subscription cancelled");
        Ok(CancelOutcome {
            cancelled: true,
            cancel_at_period_end: at_period_end,
        })
    }

    pub async fn my_subscription(&self, user_id: i64) -> Result<Option<Subscription>, BillingError> {
        Ok(self.store.active_subscription(user_id).await?)
    }

    pub async fn my_current_plan(&self, user_id: i64) -> Result<Option<PlanSummary>, BillingError> {
        Ok(self.store.current_plan(user_id).await?)
    }

    pub async fn invoices(&self, user_id: i64, limit: Option<i64>) -> Result<Vec<Invoice>, BillingError> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_INVOICE_LIMIT)
            .min(100);
        Ok(self.store.invoices(user_id, limit).await?)
    }

    /// Invoices of other users are reported as missing
    pub async fn invoice(&self, user_id: i64, invoice_id: i64) -> Result<Invoice, BillingError> {
        self.store
            .invoice_by_id(invoice_id)
            .await?
            .filter(|invoice| invoice.user_id == user_id)
            .ok_or_else(|| BillingError::InvoiceNotFound(invoice_id.to_string()))
    }

    /// Verify, deduplicate and apply a provider webhook delivery
    #[instrument(skip(self, raw_body, signature), fields(bytes = raw_body.len()))]
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookOutcome, BillingError> {
        if !self.provider.verify_webhook_signature(raw_body, signature) {
            warn!("Rejected webhook with invalid signature");
            return Err(BillingError::InvalidWebhookSignature);
        }

        let event: Value = serde_json::from_slice(raw_body)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let name = events::event_name(&event);
        let event_id = events::event_id(&event, Utc::now().timestamp_millis());

        if self.store.is_event_processed(&event_id).await? {
            info!(event = %name, event_id = %event_id, "Duplicate webhook ignored");
            telemetry::record_webhook_event(&name, "ignored");
            return Ok(WebhookOutcome {
                event: name,
                processed: false,
                ignored: true,
            });
        }

        match name.as_str() {
            events::PAYMENT_CAPTURED => {
                if let Some(payment) = events::payment_entity(&event) {
                    self.on_payment_captured(payment).await?;
                }
            }
            events::PAYMENT_FAILED => {
                if let Some(payment) = events::payment_entity(&event) {
                    self.on_payment_failed(payment).await?;
                }
            }
            events::SUBSCRIPTION_ACTIVATED | events::SUBSCRIPTION_CHARGED => {
                if let Some(sub) = events::subscription_entity(&event) {
                    self.on_subscription_active(sub).await?;
                }
            }
            events::SUBSCRIPTION_CANCELLED => {
                if let Some(sub) = events::subscription_entity(&event) {
                    self.store
                        .update_subscription_by_provider_id(
                            &sub.id,
                            SubscriptionUpdate {
                                status: Some(BillingStatus::Cancelled),
                                cancelled_at: Some(Some(Utc::now())),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
            events::SUBSCRIPTION_HALTED | events::SUBSCRIPTION_PENDING => {
                if let Some(sub) = events::subscription_entity(&event) {
                    self.store
                        .update_subscription_by_provider_id(
                            &sub.id,
                            SubscriptionUpdate {
                                status: Some(BillingStatus::PastDue),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
            other => {
                info!(
                    event = other,
                    mapped_status = ?events::map_event_to_status(other),
                    subscription = ?events::provider_subscription_id(&event),
                    "Unhandled webhook event"
                );
            }
        }

        self.store.record_event(&event_id, &name, &event).await?;
        telemetry::record_webhook_event(&name, "processed");

        Ok(WebhookOutcome {
            event: name,
            processed: true,
            ignored: false,
        })
    }

    async fn on_payment_captured(&self, payment: PaymentEntity) -> Result<(), BillingError> {
        let Some(order_id) = payment.order_id.as_deref() else {
            return Ok(());
        };
        self.store
            .complete_payment_log(order_id, &payment.id, Utc::now())
            .await?;

        let Some((user_id, plan_id)) = payment.notes.target() else {
            return Ok(());
        };
        if self.store.user_plan_for_order(order_id).await?.is_some() {
            return Ok(());
        }
        self.activate_from_notes(user_id, plan_id, &payment.notes).await
    }

    async fn on_payment_failed(&self, payment: PaymentEntity) -> Result<(), BillingError> {
        if let Some(order_id) = payment.order_id.as_deref() {
            let message = payment
                .error_description
                .as_deref()
                .unwrap_or("Payment failed");
            self.store.fail_payment_log(order_id, message).await?;
        }
        Ok(())
    }

    async fn activate_from_notes(&self, user_id: i64, plan_id: i64, notes: &PlanNotes) -> Result<(), BillingError> {
        if self.store.plan_by_id(plan_id).await?.is_none() {
            warn!(plan_id, "Webhook references unknown plan");
            return Ok(());
        }
        let now = Utc::now();
        let cycle = notes.billing_cycle.unwrap_or(BillingCycle::Monthly);
        self.store
            .activate_user_plan(PlanActivation {
                user_id,
                plan_id,
                start_date: now,
                end_date: Some(period_end(now, cycle)),
            })
            .await?;
        info!(user_id, plan_id, "Plan activated from webhook");
        Ok(())
    }

    async fn on_subscription_active(&self, sub: SubscriptionEntity) -> Result<(), BillingError> {
        let touched = self
            .store
            .update_subscription_by_provider_id(
                &sub.id,
                SubscriptionUpdate {
                    status: Some(BillingStatus::Active),
                    current_cycle_start: sub.current_start,
                    current_cycle_end: sub.current_end,
                    billed_count: sub.paid_count.and_then(|c| i32::try_from(c).ok()),
                    ..Default::default()
                },
            )
            .await?;
        if touched == 0 {
            warn!(subscription = %sub.id, "Webhook for unknown subscription");
        }

        if let Some((user_id, plan_id)) = sub.notes.target() {
            self.store
                .activate_user_plan(PlanActivation {
                    user_id,
                    plan_id,
                    start_date: sub.current_start.unwrap_or_else(Utc::now),
                    end_date: sub.current_end,
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::provider::{MockPaymentProvider, ProviderOrder, ProviderPayment, ProviderPlan};
    use crate::billing::signature::sign_hex;
    use crate::billing::store::MockBillingStore;
    use crate::models::{PaymentLog, UserPlanStatus};
    use mockall::predicate::eq;

    fn plan(id: i64, price: i64) -> Plan {
        Plan {
            id,
            name: "Gold".into(),
            slug: "gold".into(),
            description: None,
            price_paise: price,
            yearly_price_paise: None,
            currency: "INR".into(),
            billing_period: "monthly".into(),
            max_customers: None,
            max_businesses: None,
            max_emails_per_month: None,
            max_whatsapp_messages_per_month: None,
            has_email_templates: true,
            has_whatsapp_templates: true,
            has_invoice: true,
            has_analytics: true,
            has_api_access: false,
            has_custom_integrations: false,
            has_priority_support: false,
            is_active: true,
            display_order: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payment_log(user_id: i64, cycle: BillingCycle) -> PaymentLog {
        PaymentLog {
            id: 1,
            user_id,
            plan_id: 3,
            razorpay_order_id: "order_1".into(),
            razorpay_payment_id: None,
            amount_paise: 99_900,
            currency: "INR".into(),
            billing_cycle: cycle,
            status: PaymentStatus::Pending,
            error_message: None,
            metadata: json!({}),
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user_plan(user_id: i64, plan_id: i64) -> UserPlan {
        UserPlan {
            id: 11,
            user_id,
            plan_id,
            status: UserPlanStatus::Active,
            start_date: Utc::now(),
            end_date: None,
            is_current: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn invoice_from(new: NewInvoice) -> Invoice {
        Invoice {
            id: 5,
            invoice_number: new.invoice_number,
            user_id: new.user_id,
            plan_id: new.plan_id,
            user_plan_id: new.user_plan_id,
            amount_paise: new.amount_paise,
            currency: new.currency,
            razorpay_order_id: new.razorpay_order_id,
            razorpay_payment_id: new.razorpay_payment_id,
            status: new.status,
            billing_cycle: new.billing_cycle,
            description: new.description,
            paid_at: new.paid_at,
            due_date: new.due_date,
            created_at: Utc::now(),
        }
    }

    fn configured_provider() -> MockPaymentProvider {
        let mut provider = MockPaymentProvider::new();
        provider.expect_is_configured().return_const(true);
        provider.expect_key_id().returning(|| "rzp_test".to_string());
        provider.expect_is_mock().return_const(false);
        provider
    }

    fn service(provider: MockPaymentProvider, store: MockBillingStore) -> BillingService {
        BillingService::new(Arc::new(provider), Arc::new(store), "Mini CRM 360")
    }

    #[test]
    fn test_invoice_number_format() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 9, 10, 0, 0).unwrap();
        let number = invoice_number(now);
        assert!(number.starts_with("INV-20260309-"));
        assert_eq!(number.len(), "INV-20260309-".len() + 6);
    }

    #[tokio::test]
    async fn test_create_order_charges_yearly_fallback_and_logs_pending() {
        let mut provider = configured_provider();
        provider
            .expect_create_order()
            .withf(|req| {
                req.amount_paise == 99_900 * 12
                    && req.receipt.starts_with("order_3_7_")
                    && req.notes.get("billing_cycle") == Some(&json!("yearly"))
            })
            .returning(|req| {
                Ok(ProviderOrder {
                    id: "order_abc".into(),
                    amount: req.amount_paise,
                    currency: req.currency,
                    receipt: Some(req.receipt),
                    status: Some("created".into()),
                })
            });

        let mut store = MockBillingStore::new();
        store
            .expect_plan_by_id()
            .with(eq(3))
            .returning(|id| Ok(Some(plan(id, 99_900))));
        store
            .expect_create_payment_log()
            .withf(|log| log.razorpay_order_id == "order_abc" && log.billing_cycle == BillingCycle::Yearly)
            .returning(|_| Ok(payment_log(7, BillingCycle::Yearly)));

        let created = service(provider, store)
            .create_order(
                7,
                OrderInput {
                    plan_id: 3,
                    billing_cycle: Some(BillingCycle::Yearly),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(created.order.id, "order_abc");
        assert_eq!(created.plan.amount_paise, 99_900 * 12);
        assert_eq!(created.checkout.description, "Gold - Yearly Subscription");
        assert_eq!(created.key_id, "rzp_test");
    }

    #[tokio::test]
    async fn test_create_order_requires_configured_provider() {
        let mut provider = MockPaymentProvider::new();
        provider.expect_is_configured().return_const(false);
        let err = service(provider, MockBillingStore::new())
            .create_order(1, OrderInput { plan_id: 1, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_verify_payment_bad_signature_marks_log_failed() {
        let mut provider = configured_provider();
        provider.expect_verify_payment_signature().return_const(false);

        let mut store = MockBillingStore::new();
        store
            .expect_payment_log_by_order()
            .returning(|_| Ok(Some(payment_log(7, BillingCycle::Monthly))));
        store
            .expect_fail_payment_log()
            .withf(|order, message| order == "order_1" && message == "Invalid payment signature")
            .times(1)
            .returning(|_, _| Ok(()));
        store.expect_complete_order().never();

        let err = service(provider, store)
            .verify_payment(
                7,
                PaymentConfirmation {
                    order_id: "order_1".into(),
                    payment_id: "pay_1".into(),
                    signature: "bad".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_verify_payment_rejects_foreign_order() {
        let mut store = MockBillingStore::new();
        store
            .expect_payment_log_by_order()
            .returning(|_| Ok(Some(payment_log(8, BillingCycle::Monthly))));

        let err = service(configured_provider(), store)
            .verify_payment(
                7,
                PaymentConfirmation {
                    order_id: "order_1".into(),
                    payment_id: "pay_1".into(),
                    signature: "sig".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_payment_activates_plan_and_issues_invoice() {
        let mut provider = configured_provider();
        provider.expect_verify_payment_signature().return_const(true);
        provider.expect_fetch_payment().returning(|id| {
            Ok(ProviderPayment {
                id: id.to_string(),
                order_id: Some("order_1".into()),
                amount: 99_900,
                currency: "INR".into(),
                status: Some("captured".into()),
                method: Some("upi".into()),
                email: None,
                contact: None,
            })
        });

        let mut store = MockBillingStore::new();
        store
            .expect_payment_log_by_order()
            .returning(|_| Ok(Some(payment_log(7, BillingCycle::Monthly))));
        store.expect_plan_by_id().returning(|id| Ok(Some(plan(id, 99_900))));
        store
            .expect_complete_order()
            .withf(|c| {
                c.activation.user_id == 7
                    && c.activation.plan_id == 3
                    && c.activation.end_date == Some(period_end(c.activation.start_date, BillingCycle::Monthly))
                    && c.order_id == "order_1"
                    && c.payment_id == "pay_9"
                    && c.invoice.status == InvoiceStatus::Paid
            })
            .times(1)
            .returning(|c| {
                let user_plan = user_plan(c.activation.user_id, c.activation.plan_id);
                let invoice = invoice_from(NewInvoice {
                    user_plan_id: Some(user_plan.id),
                    ..c.invoice
                });
                Ok(Some(CompletedOrder { user_plan, invoice }))
            });
        store
            .expect_record_event()
            .withf(|id, kind, _| id == "payment_pay_9" && kind == "payment.captured.manual")
            .returning(|_, _, _| Ok(()));

        let verified = service(provider, store)
            .verify_payment(
                7,
                PaymentConfirmation {
                    order_id: "order_1".into(),
                    payment_id: "pay_9".into(),
                    signature: "good".into(),
                },
            )
            .await
            .unwrap();

        assert!(verified.verified);
        assert_eq!(verified.invoice.amount_paise, 99_900);
        assert_eq!(verified.user_plan.id, 11);
    }

    #[tokio::test]
    async fn test_verify_payment_replay_returns_first_invoice() {
        let mut provider = configured_provider();
        provider.expect_verify_payment_signature().return_const(true);
        provider.expect_fetch_payment().never();

        let mut store = MockBillingStore::new();
        store.expect_payment_log_by_order().returning(|_| {
            Ok(Some(PaymentLog {
                status: PaymentStatus::Completed,
                razorpay_payment_id: Some("pay_9".into()),
                ..payment_log(7, BillingCycle::Monthly)
            }))
        });
        store
            .expect_completed_order()
            .withf(|order| order == "order_1")
            .times(1)
            .returning(|_| {
                let invoice = Invoice {
                    invoice_number: "INV-20260309-ABC123".into(),
                    ..invoice_from(NewInvoice {
                        invoice_number: String::new(),
                        user_id: 7,
                        plan_id: 3,
                        user_plan_id: Some(11),
                        amount_paise: 99_900,
                        currency: "INR".into(),
                        razorpay_order_id: Some("order_1".into()),
                        razorpay_payment_id: Some("pay_9".into()),
                        status: InvoiceStatus::Paid,
                        billing_cycle: BillingCycle::Monthly,
                        description: None,
                        paid_at: Some(Utc::now()),
                        due_date: Utc::now(),
                    })
                };
                Ok(Some(CompletedOrder {
                    user_plan: user_plan(7, 3),
                    invoice,
                }))
            });
        store.expect_complete_order().never();
        store.expect_fail_payment_log().never();
        store.expect_record_event().never();

        let verified = service(provider, store)
            .verify_payment(
                7,
                PaymentConfirmation {
                    order_id: "order_1".into(),
                    payment_id: "pay_9".into(),
                    signature: "good".into(),
                },
            )
            .await
            .unwrap();

        assert!(verified.verified);
        assert_eq!(verified.invoice.invoice_number, "INV-20260309-ABC123");
        assert_eq!(verified.user_plan.id, 11);
        assert_eq!(verified.amount_paise, 99_900);
    }

    #[tokio::test]
    async fn test_create_subscription_reuses_plan_mapping() {
        let mut provider = configured_provider();
        provider.expect_create_plan().never();
        provider
            .expect_create_subscription()
            .withf(|req| req.plan_id == "plan_rzp" && req.total_count == 12)
            .returning(|req| {
                Ok(ProviderSubscription {
                    id: "sub_1".into(),
                    plan_id: Some(req.plan_id),
                    status: "created".into(),
                    current_start: None,
                    current_end: None,
                    ended_at: None,
                    total_count: Some(12),
                    paid_count: Some(0),
                    remaining_count: Some(12),
                    short_url: None,
                    notes: json!({}),
                })
            });

        let mut store = MockBillingStore::new();
        store.expect_plan_by_id().returning(|id| Ok(Some(plan(id, 49_900))));
        store
            .expect_provider_plan_id()
            .returning(|_| Ok(Some("plan_rzp".into())));
        store.expect_create_subscription().returning(|s| {
            Ok(Subscription {
                id: 4,
                user_id: s.user_id,
                plan_id: s.plan_id,
                razorpay_subscription_id: Some(s.razorpay_subscription_id),
                status: s.status,
                total_count: s.total_count,
                billed_count: 0,
                current_cycle_start: Some(s.current_cycle_start),
                current_cycle_end: Some(s.current_cycle_end),
                cancel_at_period_end: false,
                cancelled_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        });

        let created = service(provider, store)
            .create_subscription(7, 2, None)
            .await
            .unwrap();

        assert_eq!(created.subscription.status, BillingStatus::Pending);
        let cycle = created.subscription.current_cycle_end.unwrap()
            - created.subscription.current_cycle_start.unwrap();
        assert_eq!(cycle.num_days(), 30);
        assert_eq!(created.checkout.subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_create_subscription_creates_missing_provider_plan() {
        let mut provider = configured_provider();
        provider.expect_create_plan().times(1).returning(|req| {
            Ok(ProviderPlan {
                id: "plan_new".into(),
                period: Some(req.period),
                interval: Some(req.interval),
            })
        });
        provider.expect_create_subscription().returning(|_| {
            Err(BillingError::Provider("stop here".into()))
        });

        let mut store = MockBillingStore::new();
        store.expect_plan_by_id().returning(|id| Ok(Some(plan(id, 49_900))));
        store.expect_provider_plan_id().returning(|_| Ok(None));
        store
            .expect_save_provider_plan_id()
            .withf(|plan_id, provider_id| *plan_id == 2 && provider_id == "plan_new")
            .times(1)
            .returning(|_, _| Ok(()));

        let err = service(provider, store)
            .create_subscription(7, 2, Some(6))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Provider(_)));
    }

    fn owned_subscription(user_id: i64) -> Subscription {
        Subscription {
            id: 4,
            user_id,
            plan_id: 2,
            razorpay_subscription_id: Some("sub_1".into()),
            status: BillingStatus::Active,
            total_count: 12,
            billed_count: 1,
            current_cycle_start: None,
            current_cycle_end: None,
            cancel_at_period_end: false,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cancel_at_period_end_keeps_subscription_active() {
        let mut provider = configured_provider();
        provider
            .expect_cancel_subscription()
            .withf(|id, at_end| id == "sub_1" && *at_end)
            .returning(|id, _| {
                Ok(ProviderSubscription {
                    id: id.to_string(),
                    plan_id: None,
                    status: "active".into(),
                    current_start: None,
                    current_end: None,
                    ended_at: None,
                    total_count: None,
                    paid_count: None,
                    remaining_count: None,
                    short_url: None,
                    notes: Value::Null,
                })
            });

        let mut store = MockBillingStore::new();
        store
            .expect_subscription_by_id()
            .returning(|_| Ok(Some(owned_subscription(7))));
        store
            .expect_update_subscription()
            .withf(|_, u| {
                u.status == Some(BillingStatus::Active)
                    && u.cancel_at_period_end == Some(true)
                    && u.cancelled_at == Some(None)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = service(provider, store)
            .cancel_subscription(7, 4, true)
            .await
            .unwrap();
        assert!(outcome.cancelled && outcome.cancel_at_period_end);
    }

    #[tokio::test]
    async fn test_cancel_rejects_other_owner() {
        let mut store = MockBillingStore::new();
        store
            .expect_subscription_by_id()
            .returning(|_| Ok(Some(owned_subscription(8))));

        let err = service(configured_provider(), store)
            .cancel_subscription(7, 4, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotOwner(_)));
    }

    fn webhook_provider(secret: &'static str) -> MockPaymentProvider {
        let mut provider = configured_provider();
        provider
            .expect_verify_webhook_signature()
            .returning(move |body, sig| crate::billing::signature::verify_webhook_signature(body, sig, secret));
        provider
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let err = service(webhook_provider("whsec"), MockBillingStore::new())
            .handle_webhook(br#"{"event":"payment.captured"}"#, "00")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidWebhookSignature));
    }

    #[tokio::test]
    async fn test_webhook_duplicate_event_is_ignored() {
        let body = br#"{"id":"evt_1","event":"subscription.charged"}"#;
        let sig = sign_hex(body, "whsec");

        let mut store = MockBillingStore::new();
        store
            .expect_is_event_processed()
            .withf(|id| id == "evt_1")
            .returning(|_| Ok(true));
        store.expect_record_event().never();

        let outcome = service(webhook_provider("whsec"), store)
            .handle_webhook(body, &sig)
            .await
            .unwrap();
        assert!(outcome.ignored);
        assert!(!outcome.processed);
    }

    #[tokio::test]
    async fn test_webhook_subscription_activated_updates_and_grants_plan() {
        let body = json!({
            "id": "evt_2",
            "event": "subscription.activated",
            "payload": {"subscription": {"entity": {
                "id": "sub_1",
                "current_start": 1_700_000_000,
                "current_end": 1_702_592_000,
                "paid_count": 1,
                "notes": {"user_id": "7", "plan_id": "2"}
            }}}
        })
        .to_string();
        let sig = sign_hex(body.as_bytes(), "whsec");

        let mut store = MockBillingStore::new();
        store.expect_is_event_processed().returning(|_| Ok(false));
        store
            .expect_update_subscription_by_provider_id()
            .withf(|id, u| {
                id == "sub_1"
                    && u.status == Some(BillingStatus::Active)
                    && u.current_cycle_start.map(|d| d.timestamp()) == Some(1_700_000_000)
                    && u.billed_count == Some(1)
            })
            .returning(|_, _| Ok(1));
        store
            .expect_activate_user_plan()
            .withf(|a| a.user_id == 7 && a.plan_id == 2)
            .times(1)
            .returning(|a| Ok(user_plan(a.user_id, a.plan_id)));
        store
            .expect_record_event()
            .withf(|id, kind, _| id == "evt_2" && kind == "subscription.activated")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let outcome = service(webhook_provider("whsec"), store)
            .handle_webhook(body.as_bytes(), &sig)
            .await
            .unwrap();
        assert!(outcome.processed);
    }

    #[tokio::test]
    async fn test_webhook_payment_captured_skips_already_granted_order() {
        let body = json!({
            "id": "evt_3",
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_1", "order_id": "order_1", "amount": 49900,
                "notes": {"user_id": 7, "plan_id": 2, "billing_cycle": "monthly"}
            }}}
        })
        .to_string();
        let sig = sign_hex(body.as_bytes(), "whsec");

        let mut store = MockBillingStore::new();
        store.expect_is_event_processed().returning(|_| Ok(false));
        store
            .expect_complete_payment_log()
            .withf(|order, payment, _| order == "order_1" && payment == "pay_1")
            .returning(|_, _, _| Ok(()));
        store
            .expect_user_plan_for_order()
            .returning(|_| Ok(Some(user_plan(7, 2))));
        store.expect_activate_user_plan().never();
        store.expect_record_event().returning(|_, _, _| Ok(()));

        let outcome = service(webhook_provider("whsec"), store)
            .handle_webhook(body.as_bytes(), &sig)
            .await
            .unwrap();
        assert_eq!(outcome.event, "payment.captured");
    }

    #[tokio::test]
    async fn test_invoice_of_other_user_is_not_found() {
        let mut store = MockBillingStore::new();
        store.expect_invoice_by_id().returning(|id| {
            let mut invoice = invoice_from(NewInvoice {
                invoice_number: "INV-1".into(),
                user_id: 8,
                plan_id: 2,
                user_plan_id: None,
                amount_paise: 100,
                currency: "INR".into(),
                razorpay_order_id: None,
                razorpay_payment_id: None,
                status: InvoiceStatus::Paid,
                billing_cycle: BillingCycle::Monthly,
                description: None,
                paid_at: None,
                due_date: Utc::now(),
            });
            invoice.id = id;
            Ok(Some(invoice))
        });

        let err = service(configured_provider(), store)
            .invoice(7, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvoiceNotFound(_)));
    }
}
