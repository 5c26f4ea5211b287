// Lead form repository

use super::queries::lead_form_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::lead_form::{conversion_rate, slug_candidate};
use crate::models::{FormAnalytics, FormStatus, LeadForm, LeadFormInput};
use chrono::Utc;
use serde_json::json;
use sqlx::types::Json;
use std::collections::HashMap;
use tracing::instrument;

#[derive(Clone)]
pub struct LeadFormRepository {
    pool: DbPool,
}

impl LeadFormRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lead_forms WHERE slug = ? AND id <> ?",
        )
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count > 0)
    }

    /// First free slug among `base`, `base-1`, `base-2`, ...
    #[instrument(skip(self))]
    pub async fn unique_slug(&self, base: &str, exclude_id: Option<i64>) -> Result<String, DatabaseError> {
        let mut n = 0;
        loop {
            let candidate = slug_candidate(base, n);
            if !self.slug_exists(&candidate, exclude_id).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        user_id: i64,
        slug: &str,
        input: &LeadFormInput,
    ) -> Result<LeadForm, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO lead_forms (
                user_id, business_id, name, slug, description, fields, success_message,
                redirect_url, is_active, status, theme, lead_settings, success_behavior,
                notifications, anti_spam, analytics, consent_required, consent_text
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(input.business_id)
        .bind(input.name.trim())
        .bind(slug)
        .bind(&input.description)
        .bind(Json(&input.fields))
        .bind(&input.success_message)
        .bind(&input.redirect_url)
        .bind(input.status == FormStatus::Published)
        .bind(input.status.as_str())
        .bind(Json(input.theme.clone().unwrap_or_else(|| json!({}))))
        .bind(Json(&input.lead_settings))
        .bind(Json(&input.success_behavior))
        .bind(Json(input.notifications.clone().unwrap_or_default()))
        .bind(Json(&input.anti_spam))
        .bind(Json(FormAnalytics::default()))
        .bind(input.consent_required)
        .bind(&input.consent_text)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(form_id = id, user_id, slug = %slug, "Lead form created");

        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Lead form not found: {}", id)))
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        slug: &str,
        input: &LeadFormInput,
    ) -> Result<LeadForm, DatabaseError> {
        let current = self
            .find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Lead form not found: {}", id)))?;

        sqlx::query(
            r#"
            UPDATE lead_forms
            SET business_id = ?, name = ?, slug = ?, description = ?, fields = ?,
                success_message = ?, redirect_url = ?, is_active = ?, status = ?, theme = ?,
                lead_settings = ?, success_behavior = ?, notifications = ?, anti_spam = ?,
                consent_required = ?, consent_text = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(input.business_id.or(current.business_id))
        .bind(input.name.trim())
        .bind(slug)
        .bind(&input.description)
        .bind(Json(&input.fields))
        .bind(&input.success_message)
        .bind(&input.redirect_url)
        .bind(input.status == FormStatus::Published)
        .bind(input.status.as_str())
        .bind(Json(input.theme.clone().unwrap_or(current.theme)))
        .bind(Json(&input.lead_settings))
        .bind(Json(&input.success_behavior))
        .bind(Json(input.notifications.clone().unwrap_or(current.notifications)))
        .bind(Json(&input.anti_spam))
        .bind(input.consent_required)
        .bind(&input.consent_text)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(form_id = id, user_id, "Lead form updated");
        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Lead form not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn find(&self, user_id: i64, id: i64) -> Result<Option<LeadForm>, DatabaseError> {
        let form = sqlx::query_as::<_, LeadForm>(&format!(
            "SELECT {} FROM lead_forms WHERE id = ? AND user_id = ?",
            lead_form_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(form)
    }

    /// Published, active form by slug; anything else is invisible to the public
    #[instrument(skip(self))]
    pub async fn find_public_by_slug(&self, slug: &str) -> Result<Option<LeadForm>, DatabaseError> {
        let form = sqlx::query_as::<_, LeadForm>(&format!(
            "SELECT {} FROM lead_forms WHERE slug = ? AND is_active = TRUE AND status = 'published'",
            lead_form_queries::SELECT_ALL_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(form)
    }

    /// Owner's forms, newest first, with submission counts brought up to date
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i64) -> Result<Vec<LeadForm>, DatabaseError> {
        let mut forms = sqlx::query_as::<_, LeadForm>(&format!(
            "SELECT {} FROM lead_forms WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            lead_form_queries::SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?;

        let counts: HashMap<i64, i64> = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT s.form_id, COUNT(*)
            FROM form_submissions s
            INNER JOIN lead_forms f ON f.id = s.form_id
            WHERE f.user_id = ?
            GROUP BY s.form_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.pool())
        .await?
        .into_iter()
        .collect();

        for form in forms.iter_mut() {
            let submissions = counts.get(&form.id).copied().unwrap_or(0);
            let rate = conversion_rate(form.analytics.views, submissions);
            if form.analytics.submissions != submissions || form.analytics.conversion_rate != rate {
                form.analytics.submissions = submissions;
                form.analytics.conversion_rate = rate;
                sqlx::query(lead_form_queries::SYNC_SUBMISSIONS)
                    .bind(submissions)
                    .bind(submissions)
                    .bind(form.id)
                    .execute(self.pool.pool())
                    .await?;
            }
        }

        Ok(forms)
    }

    /// Count a public page view
    #[instrument(skip(self))]
    pub async fn record_view(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query(lead_form_queries::COUNT_VIEW)
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }

    /// Count an accepted submission
    #[instrument(skip(self))]
    pub async fn record_submission(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query(lead_form_queries::COUNT_SUBMISSION)
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM lead_forms WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Lead form not found: {}", id)));
        }

        tracing::info!(form_id = id, user_id, "Lead form deleted");
        Ok(())
    }
}
