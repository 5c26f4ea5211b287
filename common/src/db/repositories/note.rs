// Notes timeline repository

use super::queries::note_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Note, NoteType, TimelineEvent};
use chrono::Utc;
use sqlx::types::Json;
use tracing::{instrument, warn};

#[derive(Clone)]
pub struct NoteRepository {
    pool: DbPool,
}

impl NoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Customer timeline, newest first
    #[instrument(skip(self))]
    pub async fn timeline(&self, user_id: i64, customer_id: i64) -> Result<Vec<Note>, DatabaseError> {
        let notes = sqlx::query_as::<_, Note>(&format!(
            r#"SELECT {} FROM notes_timeline
            WHERE user_id = ? AND customer_id = ?
            ORDER BY created_at DESC, id DESC"#,
            note_queries::SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .bind(customer_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(notes)
    }

    /// Most recent entries across all customers of the user
    #[instrument(skip(self))]
    pub async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<Note>, DatabaseError> {
        let notes = sqlx::query_as::<_, Note>(&format!(
            r#"SELECT {} FROM notes_timeline
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?"#,
            note_queries::SELECT_ALL_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(notes)
    }

    #[instrument(skip(self))]
    pub async fn find(&self, user_id: i64, id: i64) -> Result<Option<Note>, DatabaseError> {
        let note = sqlx::query_as::<_, Note>(&format!(
            "SELECT {} FROM notes_timeline WHERE id = ? AND user_id = ?",
            note_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(note)
    }

    /// Write a timeline entry and return it
    #[instrument(skip(self, event), fields(customer_id = event.customer_id, note_type = %event.note_type))]
    pub async fn create(&self, event: &TimelineEvent) -> Result<Note, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notes_timeline (
                user_id, customer_id, note_type, title, content, metadata, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.user_id)
        .bind(event.customer_id)
        .bind(event.note_type.as_str())
        .bind(&event.title)
        .bind(&event.content)
        .bind(Json(&event.metadata))
        .bind(event.created_by)
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        self.find(event.user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Note not found: {}", id)))
    }

    /// Record an automatic event; failures are logged and swallowed
    pub async fn log_event(&self, event: TimelineEvent) {
        if let Err(e) = self.create(&event).await {
            warn!(
                error = %e,
                customer_id = event.customer_id,
                note_type = %event.note_type,
                "Failed to log timeline event"
            );
        }
    }

    /// Edit a manual note written by `user_id`
    #[instrument(skip(self, title, content))]
    pub async fn update_manual(
        &self,
        user_id: i64,
        id: i64,
        title: Option<&str>,
        content: &str,
    ) -> Result<Note, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE notes_timeline
            SET title = ?, content = ?, updated_at = ?
            WHERE id = ? AND user_id = ? AND created_by = ? AND note_type = ?
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .bind(user_id)
        .bind(NoteType::Note.as_str())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Note not found: {}", id)));
        }

        self.find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Note not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn delete_manual(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM notes_timeline
            WHERE id = ? AND user_id = ? AND created_by = ? AND note_type = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(user_id)
        .bind(NoteType::Note.as_str())
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Note not found: {}", id)));
        }
        Ok(())
    }
}
