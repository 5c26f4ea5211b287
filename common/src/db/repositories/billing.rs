// MySQL storage for orders, invoices, subscriptions and webhook events

use super::queries::{billing_queries, plan_queries};
use crate::billing::store::{
    BillingStore, CompletedOrder, OrderCompletion, PlanActivation, SubscriptionUpdate,
};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{
    Invoice, NewInvoice, NewPaymentLog, NewSubscription, PaymentLog, PaymentStatus, Plan,
    PlanSummary, Subscription, UserPlan, UserPlanStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::mysql::MySqlArguments;
use sqlx::types::Json;
use sqlx::{MySql, MySqlConnection};
use tracing::{debug, instrument};

const USER_PLAN_COLUMNS: &str =
    "id, user_id, plan_id, status, start_date, end_date, is_current, created_at, updated_at";

/// Make `activation` the user's only current plan; returns the new row id
async fn insert_current_plan(
    conn: &mut MySqlConnection,
    activation: &PlanActivation,
) -> Result<i64, DatabaseError> {
    sqlx::query(
        "UPDATE user_plans SET is_current = FALSE, updated_at = ? WHERE user_id = ? AND is_current = TRUE",
    )
    .bind(Utc::now())
    .bind(activation.user_id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO user_plans (user_id, plan_id, status, start_date, end_date, is_current)
        VALUES (?, ?, ?, ?, ?, TRUE)
        "#,
    )
    .bind(activation.user_id)
    .bind(activation.plan_id)
    .bind(UserPlanStatus::Active.as_str())
    .bind(activation.start_date)
    .bind(activation.end_date)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_id() as i64)
}

async fn insert_invoice(conn: &mut MySqlConnection, invoice: &NewInvoice) -> Result<i64, DatabaseError> {
    let result = sqlx::query(
        r#"
        INSERT INTO invoices
            (invoice_number, user_id, plan_id, user_plan_id, amount_paise, currency,
             razorpay_order_id, razorpay_payment_id, status, billing_cycle, description,
             paid_at, due_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&invoice.invoice_number)
    .bind(invoice.user_id)
    .bind(invoice.plan_id)
    .bind(invoice.user_plan_id)
    .bind(invoice.amount_paise)
    .bind(&invoice.currency)
    .bind(&invoice.razorpay_order_id)
    .bind(&invoice.razorpay_payment_id)
    .bind(invoice.status.as_str())
    .bind(invoice.billing_cycle.as_str())
    .bind(&invoice.description)
    .bind(invoice.paid_at)
    .bind(invoice.due_date)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_id() as i64)
}

#[derive(Clone)]
pub struct BillingRepository {
    pool: DbPool,
}

impl BillingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn payment_log_by_id(&self, id: i64) -> Result<PaymentLog, DatabaseError> {
        sqlx::query_as::<_, PaymentLog>(&format!(
            "SELECT {} FROM payment_logs WHERE id = ?",
            billing_queries::PAYMENT_LOG_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Payment log not found: {}", id)))
    }

    async fn user_plan_by_id(&self, id: i64) -> Result<UserPlan, DatabaseError> {
        sqlx::query_as::<_, UserPlan>(&format!(
            "SELECT {} FROM user_plans WHERE id = ?",
            USER_PLAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("User plan not found: {}", id)))
    }
}

#[async_trait]
impl BillingStore for BillingRepository {
    #[instrument(skip(self))]
    async fn list_plans(&self) -> Result<Vec<Plan>, DatabaseError> {
        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE is_active = TRUE ORDER BY display_order ASC, price_paise ASC",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(plans)
    }

    #[instrument(skip(self))]
    async fn plan_by_id(&self, plan_id: i64) -> Result<Option<Plan>, DatabaseError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE id = ?",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(plan)
    }

    #[instrument(skip(self, log), fields(order_id = %log.razorpay_order_id))]
    async fn create_payment_log(&self, log: NewPaymentLog) -> Result<PaymentLog, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_logs
                (user_id, plan_id, razorpay_order_id, amount_paise, currency, billing_cycle,
                 status, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.user_id)
        .bind(log.plan_id)
        .bind(&log.razorpay_order_id)
        .bind(log.amount_paise)
        .bind(&log.currency)
        .bind(log.billing_cycle.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(Json(&log.metadata))
        .execute(self.pool.pool())
        .await?;

        self.payment_log_by_id(result.last_insert_id() as i64).await
    }

    #[instrument(skip(self))]
    async fn payment_log_by_order(&self, order_id: &str) -> Result<Option<PaymentLog>, DatabaseError> {
        let log = sqlx::query_as::<_, PaymentLog>(&format!(
            "SELECT {} FROM payment_logs WHERE razorpay_order_id = ?",
            billing_queries::PAYMENT_LOG_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(log)
    }

    #[instrument(skip(self))]
    async fn complete_payment_log(
        &self,
        order_id: &str,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_logs
            SET status = ?, razorpay_payment_id = ?, paid_at = ?, error_message = NULL, updated_at = ?
            WHERE razorpay_order_id = ?
            "#,
        )
        .bind(PaymentStatus::Completed.as_str())
        .bind(payment_id)
        .bind(paid_at)
        .bind(Utc::now())
        .bind(order_id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            debug!(order_id, "No payment log for completed order");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_payment_log(&self, order_id: &str, error_message: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE payment_logs SET status = ?, error_message = ?, updated_at = ? WHERE razorpay_order_id = ?",
        )
        .bind(PaymentStatus::Failed.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(order_id)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn activate_user_plan(&self, activation: PlanActivation) -> Result<UserPlan, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_current_plan(&mut *tx, &activation).await?;
        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        self.user_plan_by_id(id).await
    }

    #[instrument(skip(self, completion), fields(order_id = %completion.order_id))]
    async fn complete_order(&self, completion: OrderCompletion) -> Result<Option<CompletedOrder>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent completions of one order
        sqlx::query("SELECT id FROM payment_logs WHERE razorpay_order_id = ? FOR UPDATE")
            .bind(&completion.order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let invoiced: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE razorpay_order_id = ?")
            .bind(&completion.order_id)
            .fetch_one(&mut *tx)
            .await?;
        if invoiced > 0 {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
            debug!("Order already invoiced");
            return Ok(None);
        }

        let user_plan_id = insert_current_plan(&mut *tx, &completion.activation).await?;

        sqlx::query(
            r#"
            UPDATE payment_logs
            SET status = ?, razorpay_payment_id = ?, paid_at = ?, error_message = NULL, updated_at = ?
            WHERE razorpay_order_id = ?
            "#,
        )
        .bind(PaymentStatus::Completed.as_str())
        .bind(&completion.payment_id)
        .bind(completion.paid_at)
        .bind(Utc::now())
        .bind(&completion.order_id)
        .execute(&mut *tx)
        .await?;

        let invoice = NewInvoice {
            user_plan_id: Some(user_plan_id),
            ..completion.invoice
        };
        let invoice_id = insert_invoice(&mut *tx, &invoice).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let invoice = self
            .invoice_by_id(invoice_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Invoice not found: {}", invoice_id)))?;
        Ok(Some(CompletedOrder {
            user_plan: self.user_plan_by_id(user_plan_id).await?,
            invoice,
        }))
    }

    #[instrument(skip(self))]
    async fn completed_order(&self, order_id: &str) -> Result<Option<CompletedOrder>, DatabaseError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE razorpay_order_id = ? ORDER BY id ASC LIMIT 1",
            billing_queries::INVOICE_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(self.pool.pool())
        .await?;

        let Some(invoice) = invoice else {
            return Ok(None);
        };
        let Some(user_plan_id) = invoice.user_plan_id else {
            return Ok(None);
        };
        Ok(Some(CompletedOrder {
            user_plan: self.user_plan_by_id(user_plan_id).await?,
            invoice,
        }))
    }

    #[instrument(skip(self))]
    async fn user_plan_for_order(&self, order_id: &str) -> Result<Option<UserPlan>, DatabaseError> {
        let plan = sqlx::query_as::<_, UserPlan>(
            r#"
            SELECT up.id, up.user_id, up.plan_id, up.status, up.start_date, up.end_date,
                   up.is_current, up.created_at, up.updated_at
            FROM user_plans up
            INNER JOIN invoices i ON i.user_plan_id = up.id
            WHERE i.razorpay_order_id = ?
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn current_plan(&self, user_id: i64) -> Result<Option<PlanSummary>, DatabaseError> {
        let summary = sqlx::query_as::<_, PlanSummary>(plan_queries::SELECT_CURRENT_FOR_USER)
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn invoices(&self, user_id: i64, limit: i64) -> Result<Vec<Invoice>, DatabaseError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            billing_queries::INVOICE_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(invoices)
    }

    #[instrument(skip(self))]
    async fn invoice_by_id(&self, invoice_id: i64) -> Result<Option<Invoice>, DatabaseError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE id = ?",
            billing_queries::INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn is_event_processed(&self, event_id: &str) -> Result<bool, DatabaseError> {
        let processed: Option<bool> =
            sqlx::query_scalar("SELECT processed FROM webhook_logs WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(self.pool.pool())
                .await?;

        Ok(processed.unwrap_or(false))
    }

    #[instrument(skip(self, data))]
    async fn record_event(&self, event_id: &str, event_type: &str, data: &Value) -> Result<(), DatabaseError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO webhook_logs (event_id, event_type, data, processed, processed_at)
            VALUES (?, ?, ?, TRUE, ?)
            ON DUPLICATE KEY UPDATE processed = TRUE, processed_at = VALUES(processed_at)
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Json(data))
        .bind(now)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn provider_plan_id(&self, plan_id: i64) -> Result<Option<String>, DatabaseError> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT razorpay_plan_id FROM razorpay_plan_mappings WHERE plan_id = ?")
                .bind(plan_id)
                .fetch_optional(self.pool.pool())
                .await?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn save_provider_plan_id(&self, plan_id: i64, provider_plan_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO razorpay_plan_mappings (plan_id, razorpay_plan_id)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE razorpay_plan_id = VALUES(razorpay_plan_id)
            "#,
        )
        .bind(plan_id)
        .bind(provider_plan_id)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self, subscription), fields(user_id = subscription.user_id))]
    async fn create_subscription(&self, subscription: NewSubscription) -> Result<Subscription, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, plan_id, razorpay_subscription_id, status, total_count, billed_count,
                 current_cycle_start, current_cycle_end, cancel_at_period_end)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, FALSE)
            "#,
        )
        .bind(subscription.user_id)
        .bind(subscription.plan_id)
        .bind(&subscription.razorpay_subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.total_count)
        .bind(subscription.current_cycle_start)
        .bind(subscription.current_cycle_end)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        self.subscription_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Subscription not found: {}", id)))
    }

    #[instrument(skip(self))]
    async fn subscription_by_id(&self, subscription_id: i64) -> Result<Option<Subscription>, DatabaseError> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            billing_queries::SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(subscription)
    }

    #[instrument(skip(self))]
    async fn update_subscription(
        &self,
        subscription_id: i64,
        update: SubscriptionUpdate,
    ) -> Result<(), DatabaseError> {
        let result = apply_subscription_update(UPDATE_SUBSCRIPTION_BY_ID, update)
            .bind(subscription_id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Subscription not found: {}",
                subscription_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<u64, DatabaseError> {
        let result = apply_subscription_update(UPDATE_SUBSCRIPTION_BY_PROVIDER_ID, update)
            .bind(provider_subscription_id.to_string())
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn active_subscription(&self, user_id: i64) -> Result<Option<Subscription>, DatabaseError> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"SELECT {} FROM subscriptions
            WHERE user_id = ? AND status IN ('active', 'pending', 'past_due')
            ORDER BY created_at DESC, id DESC
            LIMIT 1"#,
            billing_queries::SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(subscription)
    }
}

macro_rules! subscription_update_sql {
    ($where:literal) => {
        concat!(
            "UPDATE subscriptions SET ",
            "status = COALESCE(?, status), ",
            "current_cycle_start = COALESCE(?, current_cycle_start), ",
            "current_cycle_end = COALESCE(?, current_cycle_end), ",
            "billed_count = COALESCE(?, billed_count), ",
            "cancel_at_period_end = COALESCE(?, cancel_at_period_end), ",
            "cancelled_at = CASE WHEN ? THEN ? ELSE cancelled_at END, ",
            "updated_at = ? WHERE ",
            $where
        )
    };
}

const UPDATE_SUBSCRIPTION_BY_ID: &str = subscription_update_sql!("id = ?");
const UPDATE_SUBSCRIPTION_BY_PROVIDER_ID: &str =
    subscription_update_sql!("razorpay_subscription_id = ?");

/// Binds every SET parameter; unset fields keep their stored value.
/// The caller binds the WHERE parameter last.
fn apply_subscription_update(
    sql: &'static str,
    update: SubscriptionUpdate,
) -> sqlx::query::Query<'static, MySql, MySqlArguments> {
    let (touch_cancelled, cancelled_at) = match update.cancelled_at {
        Some(at) => (true, at),
        None => (false, None),
    };

    sqlx::query(sql)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.current_cycle_start)
        .bind(update.current_cycle_end)
        .bind(update.billed_count)
        .bind(update.cancel_at_period_end)
        .bind(touch_cancelled)
        .bind(cancelled_at)
        .bind(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_statements_bind_where_last() {
        assert!(UPDATE_SUBSCRIPTION_BY_ID.ends_with("WHERE id = ?"));
        assert!(UPDATE_SUBSCRIPTION_BY_PROVIDER_ID.ends_with("WHERE razorpay_subscription_id = ?"));
        assert_eq!(UPDATE_SUBSCRIPTION_BY_ID.matches('?').count(), 9);
    }
}
