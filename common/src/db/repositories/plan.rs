// Plan catalogue and user plan assignment

use super::queries::plan_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Plan, PlanDraft, PlanSummary, UserPlanStatus};
use chrono::Utc;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::MySql;
use tracing::instrument;

fn bind_draft<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    draft: &'q PlanDraft,
) -> Query<'q, MySql, MySqlArguments> {
    query
        .bind(&draft.name)
        .bind(&draft.slug)
        .bind(&draft.description)
        .bind(draft.price_paise)
        .bind(draft.yearly_price_paise)
        .bind(&draft.currency)
        .bind(&draft.billing_period)
        .bind(draft.max_customers)
        .bind(draft.max_businesses)
        .bind(draft.max_emails_per_month)
        .bind(draft.max_whatsapp_messages_per_month)
        .bind(draft.has_email_templates)
        .bind(draft.has_whatsapp_templates)
        .bind(draft.has_invoice)
        .bind(draft.has_analytics)
        .bind(draft.has_api_access)
        .bind(draft.has_custom_integrations)
        .bind(draft.has_priority_support)
        .bind(draft.is_active)
        .bind(draft.display_order)
}

#[derive(Clone)]
pub struct PlanRepository {
    pool: DbPool,
}

impl PlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Active plans in display order, cheapest first on ties
    #[instrument(skip(self))]
    pub async fn list_active(&self) -> Result<Vec<Plan>, DatabaseError> {
        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE is_active = TRUE ORDER BY display_order ASC, price_paise ASC",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(plans)
    }

    /// Every plan, inactive ones included, for the admin catalogue
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Plan>, DatabaseError> {
        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans ORDER BY display_order ASC, price_paise ASC",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        Ok(plans)
    }

    #[instrument(skip(self, draft), fields(slug = %draft.slug))]
    pub async fn create(&self, draft: &PlanDraft) -> Result<Plan, DatabaseError> {
        let sql = format!(
            "INSERT INTO plans SET {}, created_at = ?, updated_at = ?",
            plan_queries::WRITE_COLUMNS
        );
        let now = Utc::now();
        let result = bind_draft(sqlx::query(&sql), draft)
            .bind(now)
            .bind(now)
            .execute(self.pool.pool())
            .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(plan_id = id, "Plan created");
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Plan not found: {}", id)))
    }

    #[instrument(skip(self, draft))]
    pub async fn update(&self, id: i64, draft: &PlanDraft) -> Result<Plan, DatabaseError> {
        let sql = format!(
            "UPDATE plans SET {}, updated_at = ? WHERE id = ?",
            plan_queries::WRITE_COLUMNS
        );
        bind_draft(sqlx::query(&sql), draft)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Plan not found: {}", id)))
    }

    /// Users and subscriptions that still point at the plan
    #[instrument(skip(self))]
    pub async fn count_references(&self, id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT (SELECT COUNT(*) FROM user_plans WHERE plan_id = ?)
                    + (SELECT COUNT(*) FROM subscriptions WHERE plan_id = ?)"#,
        )
        .bind(id)
        .bind(id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Plan not found: {}", id)));
        }
        tracing::info!(plan_id = id, "Plan deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Plan>, DatabaseError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE id = ?",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(plan)
    }

    #[instrument(skip(self))]
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Plan>, DatabaseError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE slug = ?",
            plan_queries::SELECT_ALL_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(plan)
    }

    /// The user's current plan with limits and feature flags; a lapsed period does not count
    #[instrument(skip(self))]
    pub async fn current_for_user(&self, user_id: i64) -> Result<Option<PlanSummary>, DatabaseError> {
        let summary = sqlx::query_as::<_, PlanSummary>(plan_queries::SELECT_CURRENT_FOR_USER)
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(summary)
    }

    /// Open-ended trial assignment that becomes the current plan
    #[instrument(skip(self))]
    pub async fn assign_trial(&self, user_id: i64, plan_id: i64) -> Result<i64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE user_plans SET is_current = FALSE, updated_at = ? WHERE user_id = ? AND is_current = TRUE")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_plans (user_id, plan_id, status, start_date, end_date, is_current)
            VALUES (?, ?, ?, ?, NULL, TRUE)
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(UserPlanStatus::Trial.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(result.last_insert_id() as i64)
    }
}
