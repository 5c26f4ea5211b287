// Customer repository; every query is scoped to the owning user

use super::queries::customer_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Customer, CustomerInput, CustomerPatch};
use crate::validation::clean_tags;
use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use tracing::instrument;

/// Hard cap on list page size
pub const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub tag: Option<String>,
    pub business_id: Option<i64>,
    pub limit: Option<i64>,
}

/// Result of a find-or-create by phone
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub customer: Customer,
    pub created: bool,
}

/// Fields a repeat capture may refresh on an existing customer
fn upsert_patch(input: &CustomerInput) -> CustomerPatch {
    CustomerPatch {
        name: input.name.clone().filter(|n| !n.trim().is_empty()),
        tags: input.tags.clone(),
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct CustomerRepository {
    pool: DbPool,
}

impl CustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new customer; the WhatsApp number defaults to the phone
    #[instrument(skip(self, input))]
    pub async fn create(&self, user_id: i64, input: &CustomerInput) -> Result<Customer, DatabaseError> {
        let tags = clean_tags(input.tags.clone().unwrap_or_default());
        let whatsapp = input
            .whatsapp_e164
            .clone()
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(|| input.phone_e164.clone());

        let result = sqlx::query(
            r#"
            INSERT INTO customers (
                user_id, business_id, name, email, phone_e164, whatsapp_e164,
                tags, consent_at, date_of_birth, anniversary_date
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(input.business_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone_e164)
        .bind(&whatsapp)
        .bind(Json(&tags))
        .bind(input.consent.then(Utc::now))
        .bind(input.date_of_birth)
        .bind(input.anniversary_date)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(customer_id = id, user_id, "Customer created");

        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Customer not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_phone(
        &self,
        user_id: i64,
        phone_e164: &str,
    ) -> Result<Option<Customer>, DatabaseError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE user_id = ? AND phone_e164 = ?",
            customer_queries::SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .bind(phone_e164)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(customer)
    }

    /// Find-or-create by (user, phone). An existing row gets the new name and
    /// tags when they are supplied; its email is left as stored.
    #[instrument(skip(self, input))]
    pub async fn upsert(&self, user_id: i64, input: &CustomerInput) -> Result<UpsertOutcome, DatabaseError> {
        let Some(existing) = self.find_by_phone(user_id, &input.phone_e164).await? else {
            let customer = self.create(user_id, input).await?;
            return Ok(UpsertOutcome {
                customer,
                created: true,
            });
        };

        let patch = upsert_patch(input);
        let customer = self.update(user_id, existing.id, &patch).await?;
        Ok(UpsertOutcome {
            customer,
            created: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i64, filter: &CustomerFilter) -> Result<Vec<Customer>, DatabaseError> {
        let mut query = format!(
            "SELECT {} FROM customers WHERE user_id = ?",
            customer_queries::SELECT_ALL_COLUMNS
        );

        if filter.tag.is_some() {
            query.push_str(" AND JSON_CONTAINS(tags, JSON_QUOTE(?))");
        }
        if filter.business_id.is_some() {
            query.push_str(" AND business_id = ?");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let limit = filter.limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

        let mut query_builder = sqlx::query_as::<_, Customer>(&query).bind(user_id);
        if let Some(tag) = &filter.tag {
            query_builder = query_builder.bind(tag);
        }
        if let Some(business_id) = filter.business_id {
            query_builder = query_builder.bind(business_id);
        }

        let customers = query_builder.bind(limit).fetch_all(self.pool.pool()).await?;
        tracing::debug!(count = customers.len(), "Listed customers");
        Ok(customers)
    }

    #[instrument(skip(self))]
    pub async fn find(&self, user_id: i64, id: i64) -> Result<Option<Customer>, DatabaseError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE id = ? AND user_id = ?",
            customer_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(customer)
    }

    /// Apply a partial update; absent fields keep their stored value
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        patch: &CustomerPatch,
    ) -> Result<Customer, DatabaseError> {
        let current = self
            .find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Customer not found: {}", id)))?;

        let tags = patch
            .tags
            .as_ref()
            .map(|t| clean_tags(t))
            .unwrap_or_else(|| current.tags.clone());

        sqlx::query(
            r#"
            UPDATE customers
            SET name = ?, email = ?, phone_e164 = ?, whatsapp_e164 = ?,
                tags = ?, business_id = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(patch.name.as_ref().or(current.name.as_ref()))
        .bind(patch.email.as_ref().or(current.email.as_ref()))
        .bind(patch.phone_e164.as_ref().unwrap_or(&current.phone_e164))
        .bind(patch.whatsapp_e164.as_ref().or(current.whatsapp_e164.as_ref()))
        .bind(Json(&tags))
        .bind(patch.business_id.or(current.business_id))
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(customer_id = id, user_id, "Customer updated");
        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Customer not found: {}", id)))
    }

    /// Lead resubmission: fill blanks and replace tags with the merged set
    #[instrument(skip(self, name, email, tags))]
    pub async fn apply_lead_update(
        &self,
        id: i64,
        name: Option<String>,
        email: Option<String>,
        tags: &[String],
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE customers
            SET name = COALESCE(?, name), email = COALESCE(?, email), tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(Json(tags))
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Customer not found: {}", id)));
        }

        tracing::info!(customer_id = id, user_id, "Customer deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_reminder_dates(
        &self,
        user_id: i64,
        id: i64,
        date_of_birth: Option<NaiveDate>,
        anniversary_date: Option<NaiveDate>,
    ) -> Result<Customer, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET date_of_birth = ?, anniversary_date = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(date_of_birth)
        .bind(anniversary_date)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Customer not found: {}", id)));
        }

        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Customer not found: {}", id)))
    }

    /// Customers with a birthday or anniversary on file
    #[instrument(skip(self))]
    pub async fn with_reminder_dates(&self, user_id: i64) -> Result<Vec<Customer>, DatabaseError> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            r#"SELECT {} FROM customers
            WHERE user_id = ? AND (date_of_birth IS NOT NULL OR anniversary_date IS NOT NULL)"#,
            customer_queries::SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(customers)
    }

    #[instrument(skip(self))]
    pub async fn count(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool.pool())
            .await?;

        Ok(count)
    }
}
