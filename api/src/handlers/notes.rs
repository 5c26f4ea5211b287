use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::models::{AuthUser, Note, NoteType, TimelineEvent};
use common::validation::require_non_empty;
use serde::Deserialize;

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[serde(alias = "customer_id")]
    pub customer_id: i64,
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
}

async fn owned_note(state: &AppState, user: &AuthUser, id: i64) -> Result<Note, ErrorResponse> {
    let note = state
        .notes()
        .find(user.id, id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Note"))?;
    if !note.is_editable_by(user.id) {
        return Err(ErrorResponse::new(
            "forbidden",
            "Only notes you wrote yourself can be changed",
        ));
    }
    Ok(note)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn customer_timeline(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(customer_id): Path<i64>,
) -> Result<Json<SuccessResponse<Vec<Note>>>, ErrorResponse> {
    state
        .customers()
        .find(user.id, customer_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;

    let notes = state.notes().timeline(user.id, customer_id).await?;
    Ok(Json(SuccessResponse::new(notes)))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, customer_id = req.customer_id))]
pub async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Created<Note>, ErrorResponse> {
    require_non_empty("content", &req.content)?;
    state
        .customers()
        .find(user.id, req.customer_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;

    let mut event = TimelineEvent::new(user.id, req.customer_id, NoteType::Note)
        .content(req.content.trim())
        .created_by(user.id);
    if let Some(title) = req.title.filter(|t| !t.trim().is_empty()) {
        event = event.title(title.trim());
    }

    let note = state.notes().create(&event).await?;
    Ok(Created(note))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<SuccessResponse<Note>>, ErrorResponse> {
    require_non_empty("content", &req.content)?;
    owned_note(&state, &user, id).await?;

    let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let note = state
        .notes()
        .update_manual(user.id, id, title, req.content.trim())
        .await?;
    Ok(Json(SuccessResponse::new(note)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    owned_note(&state, &user, id).await?;
    state.notes().delete_manual(user.id, id).await?;
    Ok(Json(SuccessResponse::with_message((), "Note deleted")))
}
