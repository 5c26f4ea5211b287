use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use common::errors::ValidationError;
use common::models::{AuthUser, Customer, NoteType, TimelineEvent};
use common::reminder::{self, Reminder, ReminderKind, DEFAULT_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

/// Longest lookahead a caller may ask for
const MAX_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Default, Deserialize)]
pub struct ReminderQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReminderList {
    pub reminders: Vec<Reminder>,
    pub days: i64,
}

/// Absent keys keep the stored date; `null` or `""` clears it
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDates {
    #[serde(default, alias = "date_of_birth")]
    pub date_of_birth: Option<Value>,
    #[serde(default, alias = "anniversary_date")]
    pub anniversary_date: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WishChannel {
    Email,
    Whatsapp,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendWishRequest {
    pub customer_id: i64,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub channel: WishChannel,
    pub subject: Option<String>,
    pub custom_message: Option<String>,
}

fn date_change(field: &str, value: Option<Value>) -> Result<Option<Option<NaiveDate>>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(None)),
        Some(Value::String(s)) => {
            // Accept full timestamps as well as plain dates
            let day = s.trim().get(..10).unwrap_or(s.trim());
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(|d| Some(Some(d)))
                .map_err(|_| ValidationError::invalid(field, "must be a date (YYYY-MM-DD)"))
        }
        Some(_) => Err(ValidationError::invalid(field, "must be a date (YYYY-MM-DD)")),
    }
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn upcoming(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ReminderQuery>,
) -> Result<Json<SuccessResponse<ReminderList>>, ErrorResponse> {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(0, MAX_WINDOW_DAYS);
    let today = reminder::today_in(&user.timezone);

    let customers = state.customers().with_reminder_dates(user.id).await?;
    let reminders = reminder::upcoming_reminders(&customers, today, days);
    tracing::debug!(count = reminders.len(), days, "Computed reminders");

    Ok(Json(SuccessResponse::new(ReminderList { reminders, days })))
}

#[tracing::instrument(skip(state, user, req), fields(user_id = user.id))]
pub async fn update_customer_dates(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(customer_id): Path<i64>,
    Json(req): Json<ReminderDates>,
) -> Result<Json<SuccessResponse<Customer>>, ErrorResponse> {
    let customers = state.customers();
    let current = customers
        .find(user.id, customer_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;

    let dob = date_change("date_of_birth", req.date_of_birth)?.unwrap_or(current.date_of_birth);
    let anniversary =
        date_change("anniversary_date", req.anniversary_date)?.unwrap_or(current.anniversary_date);

    let customer = customers
        .set_reminder_dates(user.id, customer_id, dob, anniversary)
        .await?;
    Ok(Json(SuccessResponse::with_message(
        customer,
        "Customer reminders updated",
    )))
}

/// Send a birthday or anniversary greeting and record it on the timeline
#[tracing::instrument(skip(state, user, req), fields(user_id = user.id, customer_id = req.customer_id))]
pub async fn send_wish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SendWishRequest>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    let customer = state
        .customers()
        .find(user.id, req.customer_id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Customer"))?;

    if req.channel == WishChannel::Whatsapp {
        return Err(ErrorResponse::validation(
            "WhatsApp template is required. Please send the wish by email.",
        ));
    }

    let email = reminder::wish_email(
        &customer,
        req.kind,
        req.subject.as_deref(),
        req.custom_message.as_deref(),
    )?;
    let subject = email.subject.clone();
    state.mailer.send(email).await?;

    state
        .notes()
        .log_event(
            TimelineEvent::new(user.id, customer.id, NoteType::EmailSent)
                .title(format!(
                    "{} wish sent via email (Subject: {})",
                    req.kind.title(),
                    subject
                ))
                .metadata(serde_json::json!({ "wish": req.kind.as_str() }))
                .created_by(user.id),
        )
        .await;

    Ok(Json(SuccessResponse::with_message(
        (),
        format!("{} wish sent successfully", req.kind.title()),
    )))
}
