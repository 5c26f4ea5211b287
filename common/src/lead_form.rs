// Lead form helpers and public submission capture

use crate::auth::UserStore;
use crate::db::repositories::{
    CustomerRepository, LeadFormRepository, NoteRepository, SubmissionRepository,
};
use crate::errors::{DatabaseError, ValidationError};
use crate::mailer::{escape_html, Email, Mailer};
use crate::models::{
    AntiSpam, CustomerInput, DuplicateHandling, FormField, LeadForm, NoteType, SubmissionMeta,
    SubmissionStatus, SuccessKind, TimelineEvent,
};
use crate::telemetry;
use crate::validation::{clean_tags, digits_only, is_email};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Honeypot input rendered hidden on every public form
pub const HONEYPOT_FIELD: &str = "website_url";

/// Lowercase the name and collapse non-alphanumeric runs into single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "form".to_string()
    } else {
        slug
    }
}

/// Slug to try on attempt `n` (0 is the base itself)
pub fn slug_candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// Phone as typed on a lead form to E.164.
///
/// Accepts 10 digits (Indian mobile, `+91` prefixed) or 12/13 digits that
/// already start with the `91` country code.
pub fn lead_phone_e164(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    match digits.len() {
        10 => Some(format!("+91{}", digits)),
        12 | 13 if digits.starts_with("91") => Some(format!("+{}", digits)),
        _ => None,
    }
}

fn plausible_phone(raw: &str) -> bool {
    matches!(digits_only(raw).len(), 10 | 12 | 13)
}

fn value_as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Contact details pulled out of a raw submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub submitted_data: Map<String, Value>,
}

/// Map submitted values onto contact fields by field type, then by field name.
pub fn extract_lead(fields: &[FormField], data: &Map<String, Value>) -> ExtractedLead {
    let mut lead = ExtractedLead::default();

    for field in fields {
        let value = value_as_text(data.get(&field.name));
        lead.submitted_data
            .insert(field.name.clone(), Value::String(value.clone()));

        let name = field.name.to_lowercase();
        let kind = field.field_type.as_str();
        if kind == "name" || name.contains("name") {
            lead.name = value;
        } else if kind == "email" || name.contains("email") {
            lead.email = value;
        } else if kind == "phone" || kind == "tel" || name.contains("phone") {
            lead.phone = value;
        } else if kind == "textarea" || kind == "message" || name.contains("message") {
            lead.message = value;
        }
    }

    lead
}

fn field_label(field: &FormField) -> &str {
    field.label.as_deref().unwrap_or(&field.name)
}

/// Check required fields and their declared `email` / `phone` validation.
pub fn validate_submission(
    fields: &[FormField],
    data: &Map<String, Value>,
) -> Result<(), ValidationError> {
    for field in fields.iter().filter(|f| f.required) {
        let value = value_as_text(data.get(&field.name));
        if value.is_empty() {
            return Err(ValidationError::MissingField(field_label(field).to_string()));
        }

        match field.validation.as_deref() {
            Some("email") if !is_email(&value) => {
                return Err(ValidationError::invalid(field_label(field), "invalid email format"));
            }
            Some("phone") if !plausible_phone(&value) => {
                return Err(ValidationError::invalid(field_label(field), "invalid phone format"));
            }
            _ => {}
        }
    }
    Ok(())
}

pub fn honeypot_triggered(anti_spam: &AntiSpam, data: &Map<String, Value>) -> bool {
    anti_spam.honeypot && !value_as_text(data.get(HONEYPOT_FIELD)).is_empty()
}

/// Submissions per 100 views, rounded to two decimals
pub fn conversion_rate(views: i64, submissions: i64) -> f64 {
    if views <= 0 {
        return 0.0;
    }
    ((submissions as f64 / views as f64) * 10_000.0).round() / 100.0
}

/// Append form tags not already on the customer
pub fn merge_tags(existing: &[String], extra: &[String]) -> Vec<String> {
    clean_tags(existing.iter().chain(extra.iter()))
}

fn excerpt(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

fn timeline_content(prefix: &str, form_name: &str, message: &str) -> String {
    if message.is_empty() {
        format!("{}: {}", prefix, form_name)
    } else {
        format!("{}: {} - Message: {}", prefix, form_name, excerpt(message, 100))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    Iframe,
    Script,
}

pub fn embed_code(base_url: &str, slug: &str, kind: EmbedKind) -> String {
    let base = base_url.trim_end_matches('/');
    match kind {
        EmbedKind::Iframe => format!(
            r#"<iframe src="{}/forms/{}" width="100%" height="600" frameborder="0" style="border: none; border-radius: 8px;"></iframe>"#,
            base, slug
        ),
        EmbedKind::Script => format!(
            r#"<script src="{}/public/js/lead-form-embed.js" data-form-slug="{}"></script>"#,
            base, slug
        ),
    }
}

/// Body returned to the visitor after a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

pub fn success_response(form: &LeadForm) -> SubmitResponse {
    let behavior = &form.success_behavior;
    let message = behavior
        .message
        .clone()
        .or_else(|| form.success_message.clone())
        .unwrap_or_else(|| "Thank you! We will get back to you soon.".to_string());

    SubmitResponse {
        success: true,
        message,
        redirect_url: match behavior.kind {
            SuccessKind::Redirect => behavior
                .redirect_url
                .clone()
                .or_else(|| form.redirect_url.clone()),
            _ => None,
        },
        download_url: match behavior.kind {
            SuccessKind::Download => behavior.download_url.clone(),
            _ => None,
        },
    }
}

fn or_na(value: &str) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        escape_html(value)
    }
}

/// Email telling the form owner about a new lead
pub fn owner_notification_email(
    form: &LeadForm,
    lead: &ExtractedLead,
    owner_email: &str,
    base_url: &str,
) -> Email {
    let mut html = format!(
        "<h2>New Lead Submission</h2>\
         <p><strong>Form:</strong> {}</p>\
         <p><strong>Customer:</strong> {}</p>\
         <p><strong>Email:</strong> {}</p>\
         <p><strong>Phone:</strong> {}</p>",
        escape_html(&form.name),
        or_na(&lead.name),
        or_na(&lead.email),
        or_na(&lead.phone),
    );
    if !lead.message.is_empty() {
        html.push_str(&format!("<p><strong>Message:</strong> {}</p>", escape_html(&lead.message)));
    }
    html.push_str(&format!(
        "<p><a href=\"{}/customers\">View in CRM</a></p>",
        base_url.trim_end_matches('/')
    ));

    Email {
        to: owner_email.to_string(),
        subject: format!("New Lead Submission: {}", form.name),
        html,
    }
}

/// Thank-you email to the lead; `None` when they left no usable address
pub fn auto_reply_email(form: &LeadForm, lead: &ExtractedLead) -> Option<Email> {
    if !is_email(&lead.email) {
        return None;
    }
    let behavior = &form.success_behavior;
    let subject = behavior
        .reply_subject
        .clone()
        .unwrap_or_else(|| "Thank you for contacting us!".to_string());
    let message = behavior
        .reply_message
        .clone()
        .or_else(|| form.success_message.clone())
        .unwrap_or_else(|| "Thank you for your interest!".to_string());

    Some(Email {
        to: lead.email.clone(),
        subject,
        html: format!(
            "<h2>Thank you for your interest!</h2><p>{}</p><p>We will contact you soon.</p>",
            escape_html(&message)
        ),
    })
}

/// Sends the emails a form's notification settings ask for.
///
/// Mail failures are logged and never fail the submission.
#[derive(Clone)]
pub struct SubmissionNotifier {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl SubmissionNotifier {
    pub fn new(users: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, base_url: String) -> Self {
        Self {
            users,
            mailer,
            base_url,
        }
    }

    /// Returns how many emails were handed to the mailer
    #[instrument(skip(self, form, lead), fields(form_id = form.id))]
    pub async fn notify(&self, form: &LeadForm, lead: &ExtractedLead) -> usize {
        let mut outgoing = Vec::new();

        if form.notifications.on_submission {
            match self.users.find_by_id(form.user_id).await {
                Ok(Some(owner)) => {
                    outgoing.push(owner_notification_email(form, lead, &owner.email, &self.base_url))
                }
                Ok(None) => warn!(user_id = form.user_id, "Form owner not found"),
                Err(e) => warn!(error = %e, "Could not load form owner for notification"),
            }
        }
        if form.notifications.auto_reply_email {
            outgoing.extend(auto_reply_email(form, lead));
        }

        let mut sent = 0;
        for email in outgoing {
            match self.mailer.send(email).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(error = %e, "Failed to send lead form email"),
            }
        }
        sent
    }
}

/// Reasons a public submission is rejected
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Form not found or not published")]
    FormNotFound,

    #[error("Too many submissions. Please try again later.")]
    RateLimited,

    #[error("A lead with this phone number already exists")]
    DuplicateBlocked,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Captures public lead form submissions into customers and submission rows
#[derive(Clone)]
pub struct LeadCaptureService {
    forms: LeadFormRepository,
    submissions: SubmissionRepository,
    customers: CustomerRepository,
    notes: NoteRepository,
    notifier: SubmissionNotifier,
    max_per_hour: u32,
}

impl LeadCaptureService {
    pub fn new(
        forms: LeadFormRepository,
        submissions: SubmissionRepository,
        customers: CustomerRepository,
        notes: NoteRepository,
        notifier: SubmissionNotifier,
        max_per_hour: u32,
    ) -> Self {
        Self {
            forms,
            submissions,
            customers,
            notes,
            notifier,
            max_per_hour,
        }
    }

    #[instrument(skip(self, data, meta), fields(slug = %slug))]
    pub async fn submit(
        &self,
        slug: &str,
        data: &Map<String, Value>,
        meta: SubmissionMeta,
    ) -> Result<SubmitResponse, CaptureError> {
        let form = self
            .forms
            .find_public_by_slug(slug)
            .await?
            .ok_or(CaptureError::FormNotFound)?;

        if honeypot_triggered(&form.anti_spam, data) {
            warn!(form_id = form.id, "Honeypot field filled, dropping submission");
            return Ok(success_response(&form));
        }

        if form.anti_spam.rate_limit {
            if let Some(ip) = meta.ip_address.as_deref() {
                let since = Utc::now() - Duration::hours(1);
                let recent = self.submissions.count_recent_from_ip(form.id, ip, since).await?;
                if recent >= i64::from(self.max_per_hour) {
                    warn!(form_id = form.id, ip = %ip, recent, "Lead form rate limit hit");
                    return Err(CaptureError::RateLimited);
                }
            }
        }

        validate_submission(&form.fields, data)?;
        let lead = extract_lead(&form.fields, data);

        if lead.phone.is_empty() || !plausible_phone(&lead.phone) {
            return Err(ValidationError::invalid("phone", "valid phone number is required").into());
        }
        let phone_e164 = lead_phone_e164(&lead.phone)
            .ok_or_else(|| ValidationError::invalid("phone", "invalid phone number format"))?;

        let settings = &form.lead_settings;
        let existing = self.customers.find_by_phone(form.user_id, &phone_e164).await?;

        let (customer_id, status) = match (existing, settings.duplicate_handling) {
            (Some(_), DuplicateHandling::Block) => return Err(CaptureError::DuplicateBlocked),
            (Some(customer), DuplicateHandling::Update) => {
                let name = (customer.name.as_deref().unwrap_or("").is_empty() && !lead.name.is_empty())
                    .then(|| lead.name.clone());
                let email = (customer.email.as_deref().unwrap_or("").is_empty()
                    && !lead.email.is_empty())
                .then(|| lead.email.clone());
                let tags = merge_tags(&customer.tags, &settings.tags);
                self.customers
                    .apply_lead_update(customer.id, name, email, &tags)
                    .await?;

                self.notes
                    .log_event(
                        TimelineEvent::new(form.user_id, customer.id, NoteType::CustomerUpdated)
                            .title("Lead form resubmission")
                            .content(timeline_content(
                                "Lead form resubmission from",
                                &form.name,
                                &lead.message,
                            ))
                            .metadata(serde_json::json!({ "form_id": form.id })),
                    )
                    .await;
                (customer.id, SubmissionStatus::Duplicate)
            }
            (existing, _) => {
                let input = CustomerInput {
                    business_id: form.business_id,
                    name: (!lead.name.is_empty()).then(|| lead.name.clone()),
                    email: (!lead.email.is_empty()).then(|| lead.email.clone()),
                    phone_e164: phone_e164.clone(),
                    whatsapp_e164: None,
                    tags: Some(settings.tags.clone()),
                    consent: form.consent_required,
                    date_of_birth: None,
                    anniversary_date: None,
                };
                // Duplicate with "create" handling reuses the row because (user, phone) is unique
                let customer = match existing {
                    Some(c) => c,
                    None => self.customers.create(form.user_id, &input).await?,
                };

                self.notes
                    .log_event(
                        TimelineEvent::new(form.user_id, customer.id, NoteType::CustomerCreated)
                            .title("Lead captured")
                            .content(timeline_content(
                                "Lead captured from form",
                                &form.name,
                                &lead.message,
                            ))
                            .metadata(serde_json::json!({ "form_id": form.id })),
                    )
                    .await;
                (customer.id, SubmissionStatus::New)
            }
        };

        self.submissions
            .create(
                form.id,
                Some(customer_id),
                &Value::Object(lead.submitted_data.clone()),
                &meta,
                status,
            )
            .await?;

        self.forms.record_submission(form.id).await?;

        telemetry::record_lead_submission(status.as_str());
        info!(form_id = form.id, customer_id, status = %status, "Lead form submission captured");

        self.notifier.notify(&form, &lead).await;

        Ok(success_response(&form))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockUserStore;
    use crate::mailer::MockMailer;
    use crate::models::{FormAnalytics, FormNotifications, SuccessBehavior};

    fn field(name: &str, kind: &str, required: bool) -> FormField {
        FormField {
            id: name.to_string(),
            field_type: kind.to_string(),
            name: name.to_string(),
            label: Some(name.to_uppercase()),
            required,
            placeholder: None,
            options: vec![],
            validation: None,
        }
    }

    fn data(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer Sale 2024!"), "summer-sale-2024");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("!!!"), "form");
        assert_eq!(slug_candidate("contact", 0), "contact");
        assert_eq!(slug_candidate("contact", 2), "contact-2");
    }

    #[test]
    fn test_lead_phone_e164() {
        assert_eq!(lead_phone_e164("98765 43210").as_deref(), Some("+919876543210"));
        assert_eq!(lead_phone_e164("+91 98765 43210").as_deref(), Some("+919876543210"));
        assert_eq!(lead_phone_e164("4155550100"), Some("+914155550100".to_string()));
        assert_eq!(lead_phone_e164("+1 415 555 0100"), None);
        assert_eq!(lead_phone_e164("123"), None);
    }

    #[test]
    fn test_extract_lead_by_type_and_name() {
        let fields = vec![
            field("full_name", "text", true),
            field("contact", "email", false),
            field("mobile", "phone", true),
            field("notes", "textarea", false),
        ];
        let lead = extract_lead(
            &fields,
            &data(&[
                ("full_name", "Ravi"),
                ("contact", "ravi@example.com"),
                ("mobile", "9876543210"),
                ("notes", "call me"),
                ("ignored", "x"),
            ]),
        );
        assert_eq!(lead.name, "Ravi");
        assert_eq!(lead.email, "ravi@example.com");
        assert_eq!(lead.phone, "9876543210");
        assert_eq!(lead.message, "call me");
        assert!(!lead.submitted_data.contains_key("ignored"));
    }

    #[test]
    fn test_validate_submission_required_and_email() {
        let mut email = field("email", "email", true);
        email.validation = Some("email".into());
        let fields = vec![field("name", "name", true), email];

        assert!(matches!(
            validate_submission(&fields, &data(&[("email", "a@b.io")])),
            Err(ValidationError::MissingField(_))
        ));
        assert!(validate_submission(&fields, &data(&[("name", "A"), ("email", "nope")])).is_err());
        assert!(validate_submission(&fields, &data(&[("name", "A"), ("email", "a@b.io")])).is_ok());
    }

    #[test]
    fn test_honeypot() {
        let anti = AntiSpam::default();
        assert!(honeypot_triggered(&anti, &data(&[(HONEYPOT_FIELD, "http://spam")])));
        assert!(!honeypot_triggered(&anti, &data(&[(HONEYPOT_FIELD, "")])));
        let off = AntiSpam {
            honeypot: false,
            rate_limit: true,
        };
        assert!(!honeypot_triggered(&off, &data(&[(HONEYPOT_FIELD, "x")])));
    }

    #[test]
    fn test_conversion_rate() {
        assert_eq!(conversion_rate(0, 5), 0.0);
        assert_eq!(conversion_rate(3, 1), 33.33);
        assert_eq!(conversion_rate(200, 50), 25.0);
    }

    #[test]
    fn test_merge_tags() {
        let merged = merge_tags(&["vip".to_string()], &["Lead Form".to_string(), "vip".to_string()]);
        assert_eq!(merged, vec!["vip".to_string(), "Lead Form".to_string()]);
    }

    #[test]
    fn test_embed_code() {
        let iframe = embed_code("https://crm.example.com/", "contact", EmbedKind::Iframe);
        assert!(iframe.contains(r#"src="https://crm.example.com/forms/contact""#));
        let script = embed_code("https://crm.example.com", "contact", EmbedKind::Script);
        assert!(script.contains(r#"data-form-slug="contact""#));
    }

    fn contact_form() -> LeadForm {
        LeadForm {
            id: 1,
            user_id: 1,
            business_id: None,
            name: "Contact".into(),
            slug: "contact".into(),
            description: None,
            fields: vec![],
            success_message: Some("Thanks".into()),
            redirect_url: None,
            is_active: true,
            status: crate::models::FormStatus::Published,
            theme: serde_json::json!({}),
            lead_settings: Default::default(),
            success_behavior: SuccessBehavior::default(),
            notifications: FormNotifications::default(),
            anti_spam: AntiSpam::default(),
            analytics: FormAnalytics::default(),
            consent_required: false,
            consent_text: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lead(email: &str) -> ExtractedLead {
        ExtractedLead {
            name: "Ravi <Kumar>".into(),
            email: email.into(),
            phone: "9876543210".into(),
            message: "Call me".into(),
            submitted_data: Map::new(),
        }
    }

    #[test]
    fn test_success_response_redirect() {
        let mut form = contact_form();
        form.success_behavior = SuccessBehavior {
            kind: SuccessKind::Redirect,
            redirect_url: Some("https://example.com/thanks".into()),
            ..SuccessBehavior::default()
        };
        let resp = success_response(&form);
        assert_eq!(resp.message, "Thanks");
        assert_eq!(resp.redirect_url.as_deref(), Some("https://example.com/thanks"));
        assert!(resp.download_url.is_none());
    }

    #[test]
    fn test_owner_notification_email() {
        let email = owner_notification_email(&contact_form(), &lead(""), "owner@shop.in", "https://crm.example.com/");
        assert_eq!(email.to, "owner@shop.in");
        assert_eq!(email.subject, "New Lead Submission: Contact");
        assert!(email.html.contains("Ravi &lt;Kumar&gt;"));
        assert!(email.html.contains("<strong>Email:</strong> N/A"));
        assert!(email.html.contains("Call me"));
        assert!(email.html.contains(r#"href="https://crm.example.com/customers""#));
    }

    #[test]
    fn test_auto_reply_needs_an_address_and_prefers_reply_settings() {
        let mut form = contact_form();
        assert!(auto_reply_email(&form, &lead("")).is_none());
        assert!(auto_reply_email(&form, &lead("not-an-email")).is_none());

        let reply = auto_reply_email(&form, &lead("ravi@example.com")).unwrap();
        assert_eq!(reply.subject, "Thank you for contacting us!");
        assert!(reply.html.contains("Thanks"));

        form.success_behavior.reply_subject = Some("We got it".into());
        form.success_behavior.reply_message = Some("Talk soon".into());
        let reply = auto_reply_email(&form, &lead("ravi@example.com")).unwrap();
        assert_eq!(reply.subject, "We got it");
        assert!(reply.html.contains("Talk soon"));
    }

    fn owner(id: i64) -> crate::models::User {
        let now = Utc::now();
        crate::models::User {
            id,
            email: "owner@shop.in".into(),
            password_hash: None,
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            phone: None,
            avatar_url: None,
            provider: crate::models::AuthProvider::Local,
            provider_id: None,
            role: crate::models::UserRole::ShopOwner,
            status: crate::models::UserStatus::Active,
            refresh_token_hash: None,
            refresh_token_expires_at: None,
            password_reset_hash: None,
            password_reset_expires_at: None,
            timezone: "Asia/Kolkata".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_notifier_follows_form_settings() {
        let mut users = MockUserStore::new();
        users.expect_find_by_id().returning(|id| Ok(Some(owner(id))));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|email| email.to == "owner@shop.in" || email.to == "ravi@example.com")
            .times(2)
            .returning(|_| Ok(()));

        let notifier = SubmissionNotifier::new(Arc::new(users), Arc::new(mailer), "http://localhost:3000".into());
        let mut form = contact_form();
        form.notifications = FormNotifications {
            on_submission: true,
            auto_reply_email: true,
        };
        assert_eq!(notifier.notify(&form, &lead("ravi@example.com")).await, 2);
    }

    #[tokio::test]
    async fn test_notifier_is_silent_when_disabled_and_survives_mail_errors() {
        let mut users = MockUserStore::new();
        users.expect_find_by_id().returning(|id| Ok(Some(owner(id))));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(1)
            .returning(|_| Err(crate::errors::MailError::Transport("refused".into())));

        let notifier = SubmissionNotifier::new(Arc::new(users), Arc::new(mailer), "http://localhost:3000".into());
        let mut form = contact_form();
        assert_eq!(notifier.notify(&form, &lead("ravi@example.com")).await, 0);

        form.notifications.on_submission = true;
        assert_eq!(notifier.notify(&form, &lead("ravi@example.com")).await, 0);
    }
}
