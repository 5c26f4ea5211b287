// Business repository, always scoped to the owning user

use super::queries::business_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::Business;
use chrono::Utc;
use tracing::instrument;

#[derive(Clone)]
pub struct BusinessRepository {
    pool: DbPool,
}

impl BusinessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        owner_id: i64,
        business_name: &str,
        category: Option<&str>,
    ) -> Result<Business, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO businesses (owner_id, business_name, category) VALUES (?, ?, ?)",
        )
        .bind(owner_id)
        .bind(business_name)
        .bind(category)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(business_id = id, owner_id, "Business created");

        self.find(owner_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Business not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn list(&self, owner_id: i64) -> Result<Vec<Business>, DatabaseError> {
        let businesses = sqlx::query_as::<_, Business>(&format!(
            "SELECT {} FROM businesses WHERE owner_id = ? ORDER BY created_at DESC",
            business_queries::SELECT_ALL_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(businesses)
    }

    #[instrument(skip(self))]
    pub async fn find(&self, owner_id: i64, id: i64) -> Result<Option<Business>, DatabaseError> {
        let business = sqlx::query_as::<_, Business>(&format!(
            "SELECT {} FROM businesses WHERE id = ? AND owner_id = ?",
            business_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(business)
    }

    /// First business of the owner; customers attach to it when none is given
    #[instrument(skip(self))]
    pub async fn first_for_owner(&self, owner_id: i64) -> Result<Option<Business>, DatabaseError> {
        let business = sqlx::query_as::<_, Business>(&format!(
            "SELECT {} FROM businesses WHERE owner_id = ? ORDER BY id ASC LIMIT 1",
            business_queries::SELECT_ALL_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(business)
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        owner_id: i64,
        id: i64,
        business_name: &str,
        category: Option<&str>,
    ) -> Result<Business, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET business_name = ?, category = ?, updated_at = ?
            WHERE id = ? AND owner_id = ?
            "#,
        )
        .bind(business_name)
        .bind(category)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Business not found: {}", id)));
        }

        self.find(owner_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Business not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, owner_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM businesses WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Business not found: {}", id)));
        }

        tracing::info!(business_id = id, owner_id, "Business deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn count(&self, owner_id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM businesses WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(self.pool.pool())
            .await?;
        Ok(count)
    }
}
