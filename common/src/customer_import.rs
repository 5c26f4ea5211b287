// CSV bulk upload of customers

use crate::db::repositories::{CustomerRepository, NoteRepository};
use crate::models::{CustomerInput, TimelineEvent};
use crate::validation::{clean_tags, is_email, normalize_phone};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Hard cap on rows accepted in one upload
pub const MAX_IMPORT_ROWS: usize = 5_000;

const CUSTOMER_LIMIT_REACHED: &str = "customer limit of your plan reached; upgrade to add more";

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    whatsapp: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based data row, not counting the header
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn row_to_input(row: CsvRow, business_id: i64) -> Result<CustomerInput, String> {
    let raw_phone = non_empty(row.phone).ok_or_else(|| "phone is required".to_string())?;
    let phone = normalize_phone(&raw_phone)
        .ok_or_else(|| format!("phone {} is not a valid number", raw_phone))?;

    let whatsapp = match non_empty(row.whatsapp) {
        Some(raw) => Some(
            normalize_phone(&raw).ok_or_else(|| format!("whatsapp {} is not a valid number", raw))?,
        ),
        None => Some(phone.clone()),
    };

    let email = non_empty(row.email);
    if let Some(email) = email.as_deref() {
        if !is_email(email) {
            return Err(format!("email {} is not valid", email));
        }
    }

    let tags = non_empty(row.tags).map(|t| clean_tags(t.split(|c| c == ';' || c == '|')));

    Ok(CustomerInput {
        business_id: Some(business_id),
        name: non_empty(row.name),
        email,
        phone_e164: phone,
        whatsapp_e164: whatsapp,
        tags,
        consent: false,
        date_of_birth: None,
        anniversary_date: None,
    })
}

/// Parse a `name,phone,whatsapp,email,tags` document. Header names are
/// matched case-insensitively; tags within a cell are split on `;` or `|`.
pub fn parse_customer_csv(body: &str, business_id: i64) -> (Vec<(usize, CustomerInput)>, Vec<RowError>) {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());

    if let Ok(headers) = reader.headers() {
        let lowered: csv::StringRecord = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        reader.set_headers(lowered);
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = index + 1;
        if row > MAX_IMPORT_ROWS {
            errors.push(RowError {
                row,
                error: format!("upload is limited to {} rows", MAX_IMPORT_ROWS),
            });
            break;
        }
        match record.map_err(|e| e.to_string()).and_then(|r| row_to_input(r, business_id)) {
            Ok(input) => rows.push((row, input)),
            Err(error) => errors.push(RowError { row, error }),
        }
    }
    (rows, errors)
}

/// New customers still allowed in this upload; `None` is unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Capacity(Option<i64>);

impl Capacity {
    fn exhausted(&self) -> bool {
        self.0.map_or(false, |left| left <= 0)
    }

    fn take(&mut self) {
        if let Some(left) = self.0.as_mut() {
            *left -= 1;
        }
    }
}

/// Validate and upsert every row, collecting per-row failures.
///
/// Rows that match an existing phone number always update; rows that would
/// insert fail once `capacity` new customers have been added.
#[instrument(skip(customers, notes, body), fields(bytes = body.len()))]
pub async fn import_customers(
    customers: &CustomerRepository,
    notes: &NoteRepository,
    user_id: i64,
    business_id: i64,
    capacity: Option<i64>,
    body: &str,
) -> ImportReport {
    let (rows, mut errors) = parse_customer_csv(body, business_id);
    let mut report = ImportReport::default();
    let mut capacity = Capacity(capacity);

    for (row, input) in rows {
        if capacity.exhausted() {
            match customers.find_by_phone(user_id, &input.phone_e164).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    errors.push(RowError {
                        row,
                        error: CUSTOMER_LIMIT_REACHED.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    errors.push(RowError {
                        row,
                        error: e.to_string(),
                    });
                    continue;
                }
            }
        }

        match customers.upsert(user_id, &input).await {
            Ok(outcome) if outcome.created => {
                report.created += 1;
                capacity.take();
                notes
                    .log_event(TimelineEvent::customer_created(user_id, outcome.customer.id))
                    .await;
            }
            Ok(_) => report.updated += 1,
            Err(e) => {
                warn!(row, error = %e, "Customer row failed to import");
                errors.push(RowError {
                    row,
                    error: e.to_string(),
                });
            }
        }
    }

    errors.sort_by_key(|e| e.row);
    report.failed = errors.len();
    report.errors = errors;
    info!(
        user_id,
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "Customer import finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_rows() {
        let body = "Name,Phone,WhatsApp,Email,Tags\n\
                    Asha,9876543210,,asha@example.com,vip;diwali\n\
                    Ravi,+919812345678,+919800000000,,\n";
        let (rows, errors) = parse_customer_csv(body, 4);

        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(rows.len(), 2);
        let (_, asha) = &rows[0];
        assert_eq!(asha.phone_e164, "+919876543210");
        assert_eq!(asha.whatsapp_e164.as_deref(), Some("+919876543210"));
        assert_eq!(asha.tags, Some(vec!["vip".to_string(), "diwali".to_string()]));
        assert_eq!(asha.business_id, Some(4));

        let (_, ravi) = &rows[1];
        assert_eq!(ravi.whatsapp_e164.as_deref(), Some("+919800000000"));
        assert_eq!(ravi.email, None);
        assert_eq!(ravi.tags, None);
    }

    #[test]
    fn test_row_errors_carry_row_numbers() {
        let body = "name,phone,whatsapp,email,tags\n\
                    NoPhone,,,,\n\
                    BadMail,9876543210,,nope,\n\
                    Good,9876543211,,,\n";
        let (rows, errors) = parse_customer_csv(body, 1);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 3);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].row, 1);
        assert!(errors[0].error.contains("phone is required"));
        assert_eq!(errors[1].row, 2);
    }

    #[test]
    fn test_missing_optional_columns() {
        let (rows, errors) = parse_customer_csv("phone\n9876543210\n", 1);
        assert!(errors.is_empty());
        assert_eq!(rows[0].1.name, None);
    }

    #[test]
    fn test_capacity_counts_down_to_exhaustion() {
        let mut unlimited = Capacity(None);
        unlimited.take();
        assert!(!unlimited.exhausted());

        let mut two = Capacity(Some(2));
        assert!(!two.exhausted());
        two.take();
        assert!(!two.exhausted());
        two.take();
        assert!(two.exhausted());

        assert!(Capacity(Some(0)).exhausted());
    }
}
