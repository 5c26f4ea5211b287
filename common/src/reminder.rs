// Yearly birthday / anniversary reminders

use crate::errors::ValidationError;
use crate::mailer::{escape_html, Email};
use crate::models::Customer;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Lookahead used when the caller does not pass one
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Birthday,
    Anniversary,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Birthday => "birthday",
            ReminderKind::Anniversary => "anniversary",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReminderKind::Birthday => "Birthday",
            ReminderKind::Anniversary => "Anniversary",
        }
    }
}

/// Greeting email for a customer's birthday or anniversary.
///
/// A custom message is sent as written; otherwise a default greeting is used.
pub fn wish_email(
    customer: &Customer,
    kind: ReminderKind,
    subject: Option<&str>,
    custom_message: Option<&str>,
) -> Result<Email, ValidationError> {
    let to = customer
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            ValidationError::ConstraintViolation("Customer does not have an email address".to_string())
        })?;
    let name = customer
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Valued Customer");

    let subject = subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Happy {}!", kind.title()));
    let html = match custom_message.map(str::trim).filter(|m| !m.is_empty()) {
        Some(message) => format!("<p>{}</p>", escape_html(message).replace('\n', "<br>")),
        None => format!(
            "<h2>Happy {} {}!</h2><p>Wishing you a wonderful day filled with joy and happiness!</p>",
            kind.title(),
            escape_html(name)
        ),
    };

    Ok(Email {
        to: to.to_string(),
        subject,
        html,
    })
}

/// An upcoming occurrence of a customer's yearly date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub id: String,
    pub customer_id: i64,
    pub customer_name: String,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub date: NaiveDate,
    pub original_date: NaiveDate,
    pub days_until: i64,
    pub is_today: bool,
    pub phone_e164: String,
    pub email: Option<String>,
}

/// Place `date`'s month and day in `year`.
///
/// Feb 29 in a non-leap year overflows to Mar 1.
pub fn occurrence_in_year(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day()).or_else(|| {
        NaiveDate::from_ymd_opt(year, date.month(), 1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
    })
}

/// Next occurrence of `date` on or after `today`
pub fn next_occurrence(date: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = occurrence_in_year(date, today.year())?;
    if this_year < today {
        occurrence_in_year(date, today.year() + 1)
    } else {
        Some(this_year)
    }
}

/// Build a reminder when the next occurrence falls within `window_days` of `today`.
pub fn build_reminder(
    customer: &Customer,
    kind: ReminderKind,
    date: NaiveDate,
    today: NaiveDate,
    window_days: i64,
) -> Option<Reminder> {
    let next = next_occurrence(date, today)?;
    let days_until = (next - today).num_days();

    if days_until < 0 || days_until > window_days {
        return None;
    }

    Some(Reminder {
        id: format!("{}_{}", kind.as_str(), customer.id),
        customer_id: customer.id,
        customer_name: customer
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "Unnamed Customer".to_string()),
        kind,
        date: next,
        original_date: date,
        days_until,
        is_today: days_until == 0,
        phone_e164: customer.contact_phone().to_string(),
        email: customer.email.clone(),
    })
}

/// Birthday and anniversary reminders for all customers, today first then soonest.
pub fn upcoming_reminders(customers: &[Customer], today: NaiveDate, window_days: i64) -> Vec<Reminder> {
    let mut reminders: Vec<Reminder> = customers
        .iter()
        .flat_map(|c| {
            let birthday = c
                .date_of_birth
                .and_then(|d| build_reminder(c, ReminderKind::Birthday, d, today, window_days));
            let anniversary = c
                .anniversary_date
                .and_then(|d| build_reminder(c, ReminderKind::Anniversary, d, today, window_days));
            birthday.into_iter().chain(anniversary)
        })
        .collect();

    reminders.sort_by(|a, b| {
        b.is_today
            .cmp(&a.is_today)
            .then(a.days_until.cmp(&b.days_until))
    });
    reminders
}

/// Calendar date "now" in the account's timezone; unknown zones fall back to UTC
pub fn today_in(timezone: &str) -> NaiveDate {
    match timezone.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).date_naive(),
        Err(_) => {
            tracing::warn!(timezone = %timezone, "Unknown timezone, using UTC");
            Utc::now().date_naive()
        }
    }
}

/// UTC bounds `[start, end)` of the calendar day `date` in `timezone`
pub fn day_bounds(date: NaiveDate, timezone: &str) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    let tz: Tz = timezone.parse().unwrap_or(Tz::UTC);
    let midnight = |d: NaiveDate| {
        let local = d.and_time(chrono::NaiveTime::MIN);
        tz.from_local_datetime(&local)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    };
    (midnight(date), midnight(next))
}
