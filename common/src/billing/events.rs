// Payment provider webhook payload helpers

use crate::models::{BillingCycle, BillingStatus};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const SUBSCRIPTION_ACTIVATED: &str = "subscription.activated";
pub const SUBSCRIPTION_CHARGED: &str = "subscription.charged";
pub const SUBSCRIPTION_CANCELLED: &str = "subscription.cancelled";
pub const SUBSCRIPTION_HALTED: &str = "subscription.halted";
pub const SUBSCRIPTION_PENDING: &str = "subscription.pending";

/// Keyword mapping of an event name to a subscription status; `None` leaves
/// the status unchanged.
pub fn map_event_to_status(event_name: &str) -> Option<BillingStatus> {
    let e = event_name.to_lowercase();
    if e.contains("activated") || e.contains("paid") || e.contains("charged") {
        Some(BillingStatus::Active)
    } else if e.contains("failed") || e.contains("halted") || e.contains("past_due") {
        Some(BillingStatus::PastDue)
    } else if e.contains("cancel") {
        Some(BillingStatus::Cancelled)
    } else if e.contains("complete") || e.contains("expire") {
        Some(BillingStatus::Expired)
    } else {
        None
    }
}

pub fn event_name(event: &Value) -> String {
    event
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Dedup key: `id`, then `event_id`, then `"{event}:{created_at}"`
/// (falling back to `now_millis` when the payload has no timestamp).
pub fn event_id(event: &Value, now_millis: i64) -> String {
    if let Some(id) = event.get("id").and_then(value_as_string) {
        return id;
    }
    if let Some(id) = event.get("event_id").and_then(value_as_string) {
        return id;
    }
    let created = event
        .get("created_at")
        .and_then(value_as_string)
        .unwrap_or_else(|| now_millis.to_string());
    format!("{}:{}", event_name(event), created)
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Provider subscription id from any of the entities that can carry it
pub fn provider_subscription_id(event: &Value) -> Option<String> {
    let p = event.get("payload")?;
    [
        p.pointer("/subscription/entity/id"),
        p.pointer("/subscription/id"),
        p.pointer("/invoice/entity/subscription_id"),
        p.pointer("/payment/entity/subscription_id"),
    ]
    .into_iter()
    .flatten()
    .find_map(value_as_string)
}

pub fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

/// Our own identifiers, echoed back in the provider's `notes`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanNotes {
    pub user_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub billing_cycle: Option<BillingCycle>,
}

impl PlanNotes {
    pub fn from_value(notes: Option<&Value>) -> Self {
        let Some(notes) = notes else {
            return Self::default();
        };
        Self {
            user_id: notes.get("user_id").and_then(value_as_i64),
            plan_id: notes.get("plan_id").and_then(value_as_i64),
            billing_cycle: notes
                .get("billing_cycle")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn target(&self) -> Option<(i64, i64)> {
        Some((self.user_id?, self.plan_id?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: Option<String>,
    pub error_description: Option<String>,
    pub notes: PlanNotes,
}

pub fn payment_entity(event: &Value) -> Option<PaymentEntity> {
    let e = event.pointer("/payload/payment/entity")?;
    Some(PaymentEntity {
        id: e.get("id").and_then(value_as_string)?,
        order_id: e.get("order_id").and_then(value_as_string),
        amount: e.get("amount").and_then(value_as_i64).unwrap_or(0),
        currency: e.get("currency").and_then(value_as_string),
        error_description: e.get("error_description").and_then(value_as_string),
        notes: PlanNotes::from_value(e.get("notes")),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEntity {
    pub id: String,
    pub current_start: Option<DateTime<Utc>>,
    pub current_end: Option<DateTime<Utc>>,
    pub paid_count: Option<i64>,
    pub notes: PlanNotes,
}

pub fn subscription_entity(event: &Value) -> Option<SubscriptionEntity> {
    let e = event.pointer("/payload/subscription/entity")?;
    Some(SubscriptionEntity {
        id: e.get("id").and_then(value_as_string)?,
        current_start: e.get("current_start").and_then(value_as_i64).and_then(unix_to_utc),
        current_end: e.get("current_end").and_then(value_as_i64).and_then(unix_to_utc),
        paid_count: e.get("paid_count").and_then(value_as_i64),
        notes: PlanNotes::from_value(e.get("notes")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_event_to_status() {
        assert_eq!(map_event_to_status("subscription.activated"), Some(BillingStatus::Active));
        assert_eq!(map_event_to_status("invoice.paid"), Some(BillingStatus::Active));
        assert_eq!(map_event_to_status("subscription.charged"), Some(BillingStatus::Active));
        assert_eq!(map_event_to_status("payment.failed"), Some(BillingStatus::PastDue));
        assert_eq!(map_event_to_status("subscription.halted"), Some(BillingStatus::PastDue));
        assert_eq!(map_event_to_status("subscription.cancelled"), Some(BillingStatus::Cancelled));
        assert_eq!(map_event_to_status("subscription.completed"), Some(BillingStatus::Expired));
        assert_eq!(map_event_to_status("order.created"), None);
    }

    #[test]
    fn test_event_id_fallbacks() {
        assert_eq!(event_id(&json!({"id": "evt_1", "event": "x"}), 5), "evt_1");
        assert_eq!(event_id(&json!({"event_id": "evt_2"}), 5), "evt_2");
        assert_eq!(
            event_id(&json!({"event": "payment.failed", "created_at": 1700000000}), 5),
            "payment.failed:1700000000"
        );
        assert_eq!(event_id(&json!({}), 42), "unknown:42");
    }

    #[test]
    fn test_subscription_id_from_invoice() {
        let event = json!({"payload": {"invoice": {"entity": {"subscription_id": "sub_9"}}}});
        assert_eq!(provider_subscription_id(&event).as_deref(), Some("sub_9"));
        assert_eq!(provider_subscription_id(&json!({})), None);
    }

    #[test]
    fn test_payment_entity_with_string_notes() {
        let event = json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_1", "order_id": "order_1", "amount": 49900, "currency": "INR",
                "notes": {"user_id": "7", "plan_id": 2, "billing_cycle": "yearly"}
            }}}
        });
        let p = payment_entity(&event).unwrap();
        assert_eq!(p.order_id.as_deref(), Some("order_1"));
        assert_eq!(p.amount, 49900);
        assert_eq!(p.notes.target(), Some((7, 2)));
        assert_eq!(p.notes.billing_cycle, Some(BillingCycle::Yearly));
    }

    #[test]
    fn test_subscription_entity_cycle_from_unix() {
        let event = json!({"payload": {"subscription": {"entity": {
            "id": "sub_1", "current_start": 1700000000, "current_end": 0
        }}}});
        let s = subscription_entity(&event).unwrap();
        assert_eq!(s.current_start.unwrap().timestamp(), 1700000000);
        assert!(s.current_end.is_none());
        assert!(s.notes.target().is_none());
    }
}
