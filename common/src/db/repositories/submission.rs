// Form submission repository

use super::queries::submission_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{FormSubmission, SubmissionMeta, SubmissionStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use tracing::instrument;

pub const DEFAULT_PAGE_SIZE: u32 = 25;
const MAX_PAGE_SIZE: u32 = 100;

/// Searched keys inside `submitted_data`
const SEARCH_KEYS: [&str; 5] = ["name", "email", "phone", "message", "fullName"];

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl SubmissionFilter {
    fn page_size(&self) -> u32 {
        match self.limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> u32 {
        self.page.max(1).saturating_sub(1) * self.page_size()
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")))
    }
}

/// One page of submissions plus the total matching count
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionPage {
    pub submissions: Vec<FormSubmission>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Clone)]
pub struct SubmissionRepository {
    pool: DbPool,
}

impl SubmissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, data, meta))]
    pub async fn create(
        &self,
        form_id: i64,
        customer_id: Option<i64>,
        data: &Value,
        meta: &SubmissionMeta,
        status: SubmissionStatus,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO form_submissions (
                form_id, customer_id, submitted_data, ip_address, user_agent, referrer,
                utm_source, utm_campaign, utm_medium, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(form_id)
        .bind(customer_id)
        .bind(Json(data))
        .bind(&meta.ip_address)
        .bind(&meta.user_agent)
        .bind(&meta.referrer)
        .bind(&meta.utm_source)
        .bind(&meta.utm_campaign)
        .bind(&meta.utm_medium)
        .bind(status.as_str())
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    /// Submissions to a form from one IP since `since`
    #[instrument(skip(self))]
    pub async fn count_recent_from_ip(
        &self,
        form_id: i64,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM form_submissions
            WHERE form_id = ? AND ip_address = ? AND created_at >= ?
            "#,
        )
        .bind(form_id)
        .bind(ip)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }

    /// Newest-first page of a form's submissions, optionally searched by
    /// name, email, phone or message.
    #[instrument(skip(self))]
    pub async fn list(&self, form_id: i64, filter: &SubmissionFilter) -> Result<SubmissionPage, DatabaseError> {
        let pattern = filter.search_pattern();
        let mut condition = String::from("form_id = ?");
        if pattern.is_some() {
            let clauses: Vec<String> = SEARCH_KEYS
                .iter()
                .map(|key| format!("JSON_UNQUOTE(JSON_EXTRACT(submitted_data, '$.{}')) LIKE ?", key))
                .collect();
            condition.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }

        let count_sql = format!("SELECT COUNT(*) FROM form_submissions WHERE {}", condition);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(form_id);
        if let Some(p) = &pattern {
            for _ in SEARCH_KEYS {
                count_query = count_query.bind(p);
            }
        }
        let total = count_query.fetch_one(self.pool.pool()).await?;

        let list_sql = format!(
            "SELECT {} FROM form_submissions WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            submission_queries::SELECT_ALL_COLUMNS,
            condition
        );
        let mut list_query = sqlx::query_as::<_, FormSubmission>(&list_sql).bind(form_id);
        if let Some(p) = &pattern {
            for _ in SEARCH_KEYS {
                list_query = list_query.bind(p);
            }
        }
        let submissions = list_query
            .bind(filter.page_size())
            .bind(filter.offset())
            .fetch_all(self.pool.pool())
            .await?;

        Ok(SubmissionPage {
            submissions,
            total,
            page: filter.page.max(1),
            limit: filter.page_size(),
        })
    }
}
