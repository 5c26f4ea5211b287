// User repository: accounts, profile edits and token storage

use super::queries::user_queries;
use crate::auth::UserStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{AuthProvider, NewUser, ProfileUpdate, StoredToken, User};
use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;

/// Repository for user-related database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn not_found(id: i64) -> DatabaseError {
        DatabaseError::NotFound(format!("User not found: {}", id))
    }
}

#[async_trait]
impl UserStore for UserRepository {
    /// Insert a user and return the stored row
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create(&self, user: &NewUser) -> Result<User, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                email, password_hash, first_name, last_name, phone,
                avatar_url, provider, provider_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.avatar_url)
        .bind(user.provider.as_str())
        .bind(&user.provider_id)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(user_id = id, "User created");

        self.find_by_id(id).await?.ok_or_else(|| Self::not_found(id))
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            user_queries::SELECT_ALL_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            user_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    /// Replace (or clear, with `None`) the stored refresh token hash
    #[instrument(skip(self, token))]
    async fn store_refresh_token(
        &self,
        id: i64,
        token: Option<StoredToken>,
    ) -> Result<(), DatabaseError> {
        let (hash, expires_at) = token.map(|t| (t.hash, t.expires_at)).unzip();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = ?, refresh_token_expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(hash)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn store_reset_token(
        &self,
        id: i64,
        token: Option<StoredToken>,
    ) -> Result<(), DatabaseError> {
        let (hash, expires_at) = token.map(|t| (t.hash, t.expires_at)).unzip();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_reset_hash = ?, password_reset_expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(hash)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    /// Set a new password hash; any pending reset token is consumed
    #[instrument(skip(self, password_hash))]
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, password_reset_hash = NULL,
                password_reset_expires_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        tracing::info!(user_id = id, "Password updated");
        Ok(())
    }

    #[instrument(skip(self, update))]
    async fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                phone = COALESCE(?, phone),
                timezone = COALESCE(?, timezone),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone)
        .bind(&update.timezone)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        self.find_by_id(id).await?.ok_or_else(|| Self::not_found(id))
    }

    /// Attach an OAuth identity to an existing account
    #[instrument(skip(self, provider_id))]
    async fn link_provider(
        &self,
        id: i64,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE users
            SET provider = ?, provider_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(provider.as_str())
        .bind(provider_id)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(user_id = id, provider = %provider, "Linked social provider");
        Ok(())
    }
}
