use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use common::db::repositories::{TaskFilter, TaskWindow};
use common::models::{
    AuthUser, NewTask, NoteType, TaskPatch, TaskStats, TaskStatus, TaskView, TimelineEvent,
};
use common::plan::{self, FREE_TRIAL_TASK_LIMIT};
use common::reminder;
use common::validation::require_non_empty;
use serde::Deserialize;

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub filter: Option<String>,
    pub status: Option<String>,
    pub customer_id: Option<i64>,
}

fn today_bounds(user: &AuthUser) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    reminder::day_bounds(reminder::today_in(&user.timezone), &user.timezone)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<SuccessResponse<Vec<TaskView>>>, ErrorResponse> {
    let window: TaskWindow = query
        .filter
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(ErrorResponse::validation)?;
    let status = match query.status.as_deref().filter(|s| !s.is_empty() && *s != "all") {
        Some(s) => Some(s.parse::<TaskStatus>().map_err(|_| {
            ErrorResponse::validation(format!("Invalid task status: {}", s))
        })?),
        None => None,
    };

    let (day_start, day_end) = today_bounds(&user);
    let filter = TaskFilter {
        window,
        status,
        customer_id: query.customer_id,
        day_start,
        day_end,
    };
    let mut tasks = state.tasks().list(user.id, &filter).await?;

    if window == TaskWindow::All {
        let current = state.plans.current_plan(user.id).await?;
        if plan::is_free_trial(current.as_ref()) {
            tasks.truncate(FREE_TRIAL_TASK_LIMIT as usize);
        }
    }

    Ok(Json(SuccessResponse::new(tasks)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, customer_id = req.customer_id))]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<NewTask>,
) -> Result<Created<TaskView>, ErrorResponse> {
    require_non_empty("title", &req.title)?;

    let customer = state
        .customers()
        .find(user.id, req.customer_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;

    let tasks = state.tasks();
    let current = state.plans.current_plan(user.id).await?;
    plan::check_task_quota(current.as_ref(), tasks.count_active(user.id).await?)?;
    if req.reminder_date.is_some() {
        plan::check_reminders_allowed(current.as_ref())?;
    }

    let task = tasks.create(user.id, &req).await?;

    state
        .notes()
        .log_event(
            TimelineEvent::new(user.id, customer.id, NoteType::TaskCreated)
                .title(format!("Task created: {}", task.task.title))
                .content(task.task.description.clone().unwrap_or_default())
                .metadata(serde_json::json!({
                    "task_id": task.task.id,
                    "due_date": task.task.due_date,
                    "priority": task.task.priority,
                })),
        )
        .await;

    Ok(Created(task))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<TaskView>>, ErrorResponse> {
    let task = state
        .tasks()
        .find_view(user.id, id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Task"))?;
    Ok(Json(SuccessResponse::new(task)))
}

#[tracing::instrument(skip(state, user, patch), fields(user_id = user.id))]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<SuccessResponse<TaskView>>, ErrorResponse> {
    if let Some(title) = patch.title.as_deref() {
        require_non_empty("title", title)?;
    }

    let tasks = state.tasks();
    let before = tasks
        .find(user.id, id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Task"))?;

    if patch.sets_reminder() {
        let current = state.plans.current_plan(user.id).await?;
        plan::check_reminders_allowed(current.as_ref())?;
    }

    let task = tasks.update(user.id, id, &patch).await?;

    if before.status != TaskStatus::Done && task.task.status == TaskStatus::Done {
        state
            .notes()
            .log_event(
                TimelineEvent::new(user.id, task.task.customer_id, NoteType::TaskCompleted)
                    .title(format!("Task completed: {}", task.task.title))
                    .metadata(serde_json::json!({ "task_id": task.task.id })),
            )
            .await;
    }

    Ok(Json(SuccessResponse::new(task)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state.tasks().delete(user.id, id).await?;
    Ok(Json(SuccessResponse::with_message((), "Task deleted")))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn task_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<TaskStats>>, ErrorResponse> {
    let (day_start, day_end) = today_bounds(&user);
    let stats = state.tasks().stats(user.id, day_start, day_end).await?;
    Ok(Json(SuccessResponse::new(stats)))
}
