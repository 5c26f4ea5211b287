// Task repository: filtered listing, stats and reminder polling

use super::queries::task_queries;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{NewTask, Task, TaskPatch, TaskStats, TaskStatus, TaskView};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use tracing::instrument;

/// Due-date window for task listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskWindow {
    #[default]
    All,
    Today,
    Overdue,
    Upcoming,
}

impl FromStr for TaskWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "" => Ok(TaskWindow::All),
            "today" => Ok(TaskWindow::Today),
            "overdue" => Ok(TaskWindow::Overdue),
            "upcoming" => Ok(TaskWindow::Upcoming),
            other => Err(format!("Invalid task filter: {}", other)),
        }
    }
}

/// Listing filter; `day_start`/`day_end` bound "today" in the owner's timezone
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub window: TaskWindow,
    pub status: Option<TaskStatus>,
    pub customer_id: Option<i64>,
    pub day_start: DateTime<Utc>,
    pub day_end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: DbPool,
}

impl TaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Tasks with customer details, by due date then priority.
    ///
    /// Without a status filter only pending and done tasks are returned; the
    /// overdue window is always pending only.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: i64, filter: &TaskFilter) -> Result<Vec<TaskView>, DatabaseError> {
        let mut query = format!(
            r#"SELECT {} FROM tasks t
            LEFT JOIN customers c ON c.id = t.customer_id
            WHERE t.user_id = ?"#,
            task_queries::SELECT_VIEW_COLUMNS
        );

        let status = match filter.window {
            TaskWindow::Overdue => Some(TaskStatus::Pending),
            _ => filter.status,
        };
        match status {
            Some(_) => query.push_str(" AND t.status = ?"),
            None => query.push_str(" AND t.status IN ('pending', 'done')"),
        }
        if filter.customer_id.is_some() {
            query.push_str(" AND t.customer_id = ?");
        }
        match filter.window {
            TaskWindow::All => {}
            TaskWindow::Today => query.push_str(" AND t.due_date >= ? AND t.due_date < ?"),
            TaskWindow::Overdue => query.push_str(" AND t.due_date < ?"),
            TaskWindow::Upcoming => query.push_str(" AND t.due_date >= ?"),
        }
        query.push_str(&format!(
            " ORDER BY t.due_date ASC, {} ASC",
            task_queries::PRIORITY_ORDER
        ));

        let mut query_builder = sqlx::query_as::<_, TaskView>(&query).bind(user_id);
        if let Some(status) = status {
            query_builder = query_builder.bind(status.as_str());
        }
        if let Some(customer_id) = filter.customer_id {
            query_builder = query_builder.bind(customer_id);
        }
        query_builder = match filter.window {
            TaskWindow::All => query_builder,
            TaskWindow::Today => query_builder.bind(filter.day_start).bind(filter.day_end),
            TaskWindow::Overdue => query_builder.bind(filter.day_start),
            TaskWindow::Upcoming => query_builder.bind(filter.day_end),
        };

        let tasks = query_builder.fetch_all(self.pool.pool()).await?;
        tracing::debug!(count = tasks.len(), "Listed tasks");
        Ok(tasks)
    }

    #[instrument(skip(self))]
    pub async fn find_view(&self, user_id: i64, id: i64) -> Result<Option<TaskView>, DatabaseError> {
        let task = sqlx::query_as::<_, TaskView>(&format!(
            r#"SELECT {} FROM tasks t
            LEFT JOIN customers c ON c.id = t.customer_id
            WHERE t.id = ? AND t.user_id = ?"#,
            task_queries::SELECT_VIEW_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn find(&self, user_id: i64, id: i64) -> Result<Option<Task>, DatabaseError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = ? AND user_id = ?",
            task_queries::SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(task)
    }

    #[instrument(skip(self, task), fields(customer_id = task.customer_id))]
    pub async fn create(&self, user_id: i64, task: &NewTask) -> Result<TaskView, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                user_id, customer_id, title, description, task_type, status,
                due_date, reminder_date, priority
            )
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(task.customer_id)
        .bind(task.title.trim())
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.due_date)
        .bind(task.reminder_date)
        .bind(task.priority.as_str())
        .execute(self.pool.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        tracing::info!(task_id = id, user_id, "Task created");

        self.find_view(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Task not found: {}", id)))
    }

    /// Apply a partial update. Moving the reminder date re-arms the reminder;
    /// `null` for description or reminder date clears the column.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, user_id: i64, id: i64, patch: &TaskPatch) -> Result<TaskView, DatabaseError> {
        let current = self
            .find(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Task not found: {}", id)))?;

        let reminder_date = patch.reminder_after(current.reminder_date);
        let reminder_sent = current.is_reminder_sent && reminder_date == current.reminder_date;

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, description = ?, task_type = ?, status = ?, due_date = ?,
                reminder_date = ?, is_reminder_sent = ?, priority = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(patch.title.as_deref().map(str::trim).unwrap_or(&current.title))
        .bind(patch.description_after(current.description.clone()))
        .bind(patch.task_type.unwrap_or(current.task_type).as_str())
        .bind(patch.status.unwrap_or(current.status).as_str())
        .bind(patch.due_date.unwrap_or(current.due_date))
        .bind(reminder_date)
        .bind(reminder_sent)
        .bind(patch.priority.unwrap_or(current.priority).as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(self.pool.pool())
        .await?;

        self.find_view(user_id, id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Task not found: {}", id)))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Task not found: {}", id)));
        }

        tracing::info!(task_id = id, user_id, "Task deleted");
        Ok(())
    }

    /// Pending and done tasks; cancelled ones do not count toward plan limits
    #[instrument(skip(self))]
    pub async fn count_active(&self, user_id: i64) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ? AND status IN ('pending', 'done')",
        )
        .bind(user_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn stats(
        &self,
        user_id: i64,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<TaskStats, DatabaseError> {
        let stats = sqlx::query_as::<_, TaskStats>(
            r#"
            SELECT
                CAST(COALESCE(SUM(status = 'pending' AND due_date >= ? AND due_date < ?), 0) AS SIGNED) AS today,
                CAST(COALESCE(SUM(status = 'pending' AND due_date < ?), 0) AS SIGNED) AS overdue,
                CAST(COALESCE(SUM(status = 'pending' AND due_date >= ?), 0) AS SIGNED) AS upcoming,
                CAST(COALESCE(SUM(status IN ('pending', 'done')), 0) AS SIGNED) AS total
            FROM tasks
            WHERE user_id = ?
            "#,
        )
        .bind(day_start)
        .bind(day_end)
        .bind(day_start)
        .bind(day_end)
        .bind(user_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(stats)
    }

    /// Pending tasks whose reminder time has passed and was not yet sent
    #[instrument(skip(self))]
    pub async fn due_reminders(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<TaskView>, DatabaseError> {
        let tasks = sqlx::query_as::<_, TaskView>(&format!(
            r#"SELECT {} FROM tasks t
            LEFT JOIN customers c ON c.id = t.customer_id
            WHERE t.status = 'pending'
              AND t.is_reminder_sent = FALSE
              AND t.reminder_date IS NOT NULL
              AND t.reminder_date <= ?
            ORDER BY t.reminder_date ASC
            LIMIT ?"#,
            task_queries::SELECT_VIEW_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(tasks)
    }

    /// Flag the reminder as sent; false when another worker got there first
    #[instrument(skip(self))]
    pub async fn mark_reminder_sent(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET is_reminder_sent = TRUE, updated_at = ?
            WHERE id = ? AND is_reminder_sent = FALSE
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
