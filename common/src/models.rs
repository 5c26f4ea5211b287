use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Declares a string-backed status enum stored as VARCHAR.
///
/// Generates `as_str`, `Display`, `FromStr` and `TryFrom<String>` so rows can
/// decode through `#[sqlx(try_from = "String")]`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_str(&s)
            }
        }
    };
}

/// Patch field decoder: a missing key stays `None`, an explicit `null` becomes `Some(None)`.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// User and Authentication Models
// ============================================================================

string_enum! {
    /// Role of an account within its shop
    pub enum UserRole {
        Admin => "admin",
        ShopOwner => "shop_owner",
        ShopManager => "shop_manager",
        ShopWorker => "shop_worker",
    }
}

string_enum! {
    pub enum UserStatus {
        Active => "active",
        Invited => "invited",
        Disabled => "disabled",
    }
}

string_enum! {
    /// Where the account's identity comes from
    pub enum AuthProvider {
        Local => "local",
        Google => "google",
        Facebook => "facebook",
        Instagram => "instagram",
    }
}

/// User represents an account (shop owner, staff member or admin)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    #[sqlx(try_from = "String")]
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_reset_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Fields needed to insert a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
}

/// Profile fields a user may change; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub timezone: Option<String>,
}

/// A hashed single-use token and when it stops being accepted
#[derive(Debug, Clone, PartialEq)]
pub struct StoredToken {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// UserClaims represents JWT token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,   // Subject (user ID)
    pub email: String, // Account email at issue time
    pub typ: String,   // "access" or "refresh"
    pub exp: i64,      // Expiration time (Unix timestamp)
    pub iat: i64,      // Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>, // Unique id so rotated refresh tokens never repeat
}

impl UserClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// The authenticated account attached to a request
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub timezone: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            timezone: user.timezone.clone(),
        }
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

// ============================================================================
// Business and Customer Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Business {
    pub id: i64,
    pub owner_id: i64,
    pub business_name: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer is a contact owned by a user, unique per (user, phone)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub user_id: i64,
    pub business_id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_e164: String,
    pub whatsapp_e164: Option<String>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub consent_at: Option<DateTime<Utc>>,
    pub date_of_birth: Option<NaiveDate>,
    pub anniversary_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Number used for WhatsApp contact, falling back to the primary phone
    pub fn contact_phone(&self) -> &str {
        self.whatsapp_e164
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.phone_e164)
    }
}

/// Input for creating or upserting a customer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInput {
    pub business_id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_e164: String,
    pub whatsapp_e164: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub consent: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub anniversary_date: Option<NaiveDate>,
}

/// Partial update for a customer; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_e164: Option<String>,
    pub whatsapp_e164: Option<String>,
    pub tags: Option<Vec<String>>,
    pub business_id: Option<i64>,
}

// ============================================================================
// Task Models
// ============================================================================

string_enum! {
    pub enum TaskType {
        Call => "call",
        Meeting => "meeting",
        PaymentFollowup => "payment_followup",
        Other => "other",
    }
}

string_enum! {
    pub enum TaskStatus {
        Pending => "pending",
        Done => "done",
        Cancelled => "cancelled",
    }
}

string_enum! {
    pub enum TaskPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

/// Follow-up task attached to a customer
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub customer_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub task_type: TaskType,
    #[sqlx(try_from = "String")]
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub is_reminder_sent: bool,
    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task row joined with the customer it belongs to
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaskView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub task: Task,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub customer_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: TaskType,
    pub due_date: DateTime<Utc>,
    pub reminder_date: Option<DateTime<Utc>>,
    #[serde(default = "default_task_priority")]
    pub priority: TaskPriority,
}

fn default_task_type() -> TaskType {
    TaskType::Other
}

fn default_task_priority() -> TaskPriority {
    TaskPriority::Medium
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub reminder_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<TaskPriority>,
}

impl TaskPatch {
    pub fn description_after(&self, current: Option<String>) -> Option<String> {
        match &self.description {
            Some(value) => value.clone(),
            None => current,
        }
    }

    pub fn reminder_after(&self, current: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.reminder_date.unwrap_or(current)
    }

    /// Setting a reminder needs a paid plan; clearing one does not
    pub fn sets_reminder(&self) -> bool {
        matches!(self.reminder_date, Some(Some(_)))
    }
}

/// Pending task counts by due window; `total` counts pending and done
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, FromRow)]
pub struct TaskStats {
    pub today: i64,
    pub overdue: i64,
    pub upcoming: i64,
    pub total: i64,
}

// ============================================================================
// Notes Timeline Models
// ============================================================================

string_enum! {
    /// Kind of entry on a customer's timeline
    pub enum NoteType {
        Note => "note",
        CampaignSent => "campaign_sent",
        InvoiceCreated => "invoice_created",
        WhatsappSent => "whatsapp_sent",
        EmailSent => "email_sent",
        TaskCreated => "task_created",
        TaskCompleted => "task_completed",
        TaskReminder => "task_reminder",
        CustomerCreated => "customer_created",
        CustomerUpdated => "customer_updated",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub customer_id: i64,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub note_type: NoteType,
    pub title: Option<String>,
    pub content: Option<String>,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Only hand-written notes may be edited, and only by their author
    pub fn is_editable_by(&self, user_id: i64) -> bool {
        self.note_type == NoteType::Note && self.created_by == Some(user_id)
    }
}

/// Timeline entry about to be written
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub user_id: i64,
    pub customer_id: i64,
    pub note_type: NoteType,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: Option<i64>,
}

impl TimelineEvent {
    pub fn new(user_id: i64, customer_id: i64, note_type: NoteType) -> Self {
        Self {
            user_id,
            customer_id,
            note_type,
            title: None,
            content: None,
            metadata: serde_json::json!({}),
            created_by: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn created_by(mut self, user_id: i64) -> Self {
        self.created_by = Some(user_id);
        self
    }

    /// Logged whenever a customer row is inserted by the account owner
    pub fn customer_created(user_id: i64, customer_id: i64) -> Self {
        Self::new(user_id, customer_id, NoteType::CustomerCreated)
            .title("Customer added")
            .created_by(user_id)
    }
}

// ============================================================================
// Lead Form Models
// ============================================================================

string_enum! {
    pub enum FormStatus {
        Draft => "draft",
        Published => "published",
    }
}

string_enum! {
    pub enum SubmissionStatus {
        New => "new",
        Processed => "processed",
        Duplicate => "duplicate",
        Spam => "spam",
    }
}

string_enum! {
    /// What to do when a submission's phone matches an existing customer
    pub enum DuplicateHandling {
        Update => "update",
        Block => "block",
        Create => "create",
    }
}

string_enum! {
    pub enum SuccessKind {
        Message => "message",
        Redirect => "redirect",
        Download => "download",
    }
}

/// A single input on a lead form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// Extra check on required values: `email` or `phone`
    #[serde(default)]
    pub validation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSettings {
    #[serde(default = "default_duplicate_handling")]
    pub duplicate_handling: DuplicateHandling,
    #[serde(default = "default_lead_tags")]
    pub tags: Vec<String>,
}

fn default_duplicate_handling() -> DuplicateHandling {
    DuplicateHandling::Update
}

fn default_lead_tags() -> Vec<String> {
    vec!["Lead Form".to_string()]
}

impl Default for LeadSettings {
    fn default() -> Self {
        Self {
            duplicate_handling: default_duplicate_handling(),
            tags: default_lead_tags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBehavior {
    #[serde(rename = "type", default = "default_success_kind")]
    pub kind: SuccessKind,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Subject and body of the auto-reply email to the lead
    #[serde(default)]
    pub reply_subject: Option<String>,
    #[serde(default)]
    pub reply_message: Option<String>,
}

fn default_success_kind() -> SuccessKind {
    SuccessKind::Message
}

impl Default for SuccessBehavior {
    fn default() -> Self {
        Self {
            kind: SuccessKind::Message,
            message: None,
            redirect_url: None,
            download_url: None,
            reply_subject: None,
            reply_message: None,
        }
    }
}

/// Emails sent when a form is submitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormNotifications {
    /// Tell the form owner about every new submission
    #[serde(default)]
    pub on_submission: bool,
    /// Send the lead a thank-you email when they left an address
    #[serde(default)]
    pub auto_reply_email: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiSpam {
    #[serde(default = "default_true")]
    pub honeypot: bool,
    #[serde(default = "default_true")]
    pub rate_limit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AntiSpam {
    fn default() -> Self {
        Self {
            honeypot: true,
            rate_limit: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormAnalytics {
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub submissions: i64,
    #[serde(default)]
    pub conversion_rate: f64,
}

/// Public form definition; fields and behavior are stored as JSON columns
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadForm {
    pub id: i64,
    pub user_id: i64,
    pub business_id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub fields: Vec<FormField>,
    pub success_message: Option<String>,
    pub redirect_url: Option<String>,
    pub is_active: bool,
    #[sqlx(try_from = "String")]
    pub status: FormStatus,
    #[sqlx(json)]
    pub theme: serde_json::Value,
    #[sqlx(json)]
    pub lead_settings: LeadSettings,
    #[sqlx(json)]
    pub success_behavior: SuccessBehavior,
    #[sqlx(json)]
    pub notifications: FormNotifications,
    #[sqlx(json)]
    pub anti_spam: AntiSpam,
    #[sqlx(json)]
    pub analytics: FormAnalytics,
    pub consent_required: bool,
    pub consent_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadForm {
    pub fn is_public(&self) -> bool {
        self.is_active && self.status == FormStatus::Published
    }
}

/// Create/update payload for a lead form
#[derive(Debug, Clone, Deserialize)]
pub struct LeadFormInput {
    pub name: String,
    pub business_id: Option<i64>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
    pub success_message: Option<String>,
    pub redirect_url: Option<String>,
    #[serde(default = "default_form_status")]
    pub status: FormStatus,
    #[serde(default)]
    pub theme: Option<serde_json::Value>,
    #[serde(default)]
    pub lead_settings: LeadSettings,
    #[serde(default)]
    pub success_behavior: SuccessBehavior,
    #[serde(default)]
    pub notifications: Option<FormNotifications>,
    #[serde(default)]
    pub anti_spam: AntiSpam,
    #[serde(default)]
    pub consent_required: bool,
    pub consent_text: Option<String>,
}

fn default_form_status() -> FormStatus {
    FormStatus::Draft
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormSubmission {
    pub id: i64,
    pub form_id: i64,
    pub customer_id: Option<i64>,
    #[sqlx(json)]
    pub submitted_data: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_medium: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

/// Request metadata captured with a submission
#[derive(Debug, Clone, Default)]
pub struct SubmissionMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_medium: Option<String>,
}

// ============================================================================
// Plan Models
// ============================================================================

string_enum! {
    pub enum UserPlanStatus {
        Active => "active",
        Expired => "expired",
        Cancelled => "cancelled",
        Trial => "trial",
    }
}

string_enum! {
    /// Plan feature flags that can be checked per user
    pub enum PlanFeature {
        EmailTemplates => "email_templates",
        WhatsappTemplates => "whatsapp_templates",
        Invoice => "invoice",
        Analytics => "analytics",
        ApiAccess => "api_access",
        CustomIntegrations => "custom_integrations",
        PrioritySupport => "priority_support",
    }
}

/// Subscription plan; prices are stored in paise
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_paise: i64,
    pub yearly_price_paise: Option<i64>,
    pub currency: String,
    pub billing_period: String,
    pub max_customers: Option<i32>,
    pub max_businesses: Option<i32>,
    pub max_emails_per_month: Option<i32>,
    pub max_whatsapp_messages_per_month: Option<i32>,
    pub has_email_templates: bool,
    pub has_whatsapp_templates: bool,
    pub has_invoice: bool,
    pub has_analytics: bool,
    pub has_api_access: bool,
    pub has_custom_integrations: bool,
    pub has_priority_support: bool,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin create/update request. Absent fields keep their current (or default)
/// value; `null` on a limit means unlimited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub price_paise: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub yearly_price_paise: Option<Option<i64>>,
    pub currency: Option<String>,
    pub billing_period: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_customers: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_businesses: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_emails_per_month: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_whatsapp_messages_per_month: Option<Option<i32>>,
    pub has_email_templates: Option<bool>,
    pub has_whatsapp_templates: Option<bool>,
    pub has_invoice: Option<bool>,
    pub has_analytics: Option<bool>,
    pub has_api_access: Option<bool>,
    pub has_custom_integrations: Option<bool>,
    pub has_priority_support: Option<bool>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

/// Fully resolved plan row ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDraft {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_paise: i64,
    pub yearly_price_paise: Option<i64>,
    pub currency: String,
    pub billing_period: String,
    pub max_customers: Option<i32>,
    pub max_businesses: Option<i32>,
    pub max_emails_per_month: Option<i32>,
    pub max_whatsapp_messages_per_month: Option<i32>,
    pub has_email_templates: bool,
    pub has_whatsapp_templates: bool,
    pub has_invoice: bool,
    pub has_analytics: bool,
    pub has_api_access: bool,
    pub has_custom_integrations: bool,
    pub has_priority_support: bool,
    pub is_active: bool,
    pub display_order: i32,
}

impl From<&Plan> for PlanDraft {
    fn from(plan: &Plan) -> Self {
        Self {
            name: plan.name.clone(),
            slug: plan.slug.clone(),
            description: plan.description.clone(),
            price_paise: plan.price_paise,
            yearly_price_paise: plan.yearly_price_paise,
            currency: plan.currency.clone(),
            billing_period: plan.billing_period.clone(),
            max_customers: plan.max_customers,
            max_businesses: plan.max_businesses,
            max_emails_per_month: plan.max_emails_per_month,
            max_whatsapp_messages_per_month: plan.max_whatsapp_messages_per_month,
            has_email_templates: plan.has_email_templates,
            has_whatsapp_templates: plan.has_whatsapp_templates,
            has_invoice: plan.has_invoice,
            has_analytics: plan.has_analytics,
            has_api_access: plan.has_api_access,
            has_custom_integrations: plan.has_custom_integrations,
            has_priority_support: plan.has_priority_support,
            is_active: plan.is_active,
            display_order: plan.display_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPlan {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    #[sqlx(try_from = "String")]
    pub status: UserPlanStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's current plan with its limits and flags
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanSummary {
    pub plan_id: i64,
    pub name: String,
    pub slug: String,
    #[sqlx(try_from = "String")]
    pub status: UserPlanStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_customers: Option<i32>,
    pub max_businesses: Option<i32>,
    pub max_emails_per_month: Option<i32>,
    pub max_whatsapp_messages_per_month: Option<i32>,
    pub has_email_templates: bool,
    pub has_whatsapp_templates: bool,
    pub has_invoice: bool,
    pub has_analytics: bool,
    pub has_api_access: bool,
    pub has_custom_integrations: bool,
    pub has_priority_support: bool,
}

impl PlanSummary {
    pub fn has(&self, feature: PlanFeature) -> bool {
        match feature {
            PlanFeature::EmailTemplates => self.has_email_templates,
            PlanFeature::WhatsappTemplates => self.has_whatsapp_templates,
            PlanFeature::Invoice => self.has_invoice,
            PlanFeature::Analytics => self.has_analytics,
            PlanFeature::ApiAccess => self.has_api_access,
            PlanFeature::CustomIntegrations => self.has_custom_integrations,
            PlanFeature::PrioritySupport => self.has_priority_support,
        }
    }
}

// ============================================================================
// Billing Models
// ============================================================================

string_enum! {
    /// Lifecycle of a recurring subscription
    pub enum BillingStatus {
        Pending => "pending",
        Active => "active",
        PastDue => "past_due",
        Cancelled => "cancelled",
        Expired => "expired",
        Trial => "trial",
    }
}

string_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

string_enum! {
    pub enum InvoiceStatus {
        Issued => "issued",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
    }
}

string_enum! {
    pub enum BillingCycle {
        Monthly => "monthly",
        Yearly => "yearly",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub razorpay_subscription_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: BillingStatus,
    pub total_count: i32,
    pub billed_count: i32,
    pub current_cycle_start: Option<DateTime<Utc>>,
    pub current_cycle_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub plan_id: i64,
    pub razorpay_subscription_id: String,
    pub status: BillingStatus,
    pub total_count: i32,
    pub current_cycle_start: DateTime<Utc>,
    pub current_cycle_end: DateTime<Utc>,
}

/// Record of a one-off order and its payment outcome
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentLog {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub amount_paise: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub billing_cycle: BillingCycle,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub error_message: Option<String>,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentLog {
    pub user_id: i64,
    pub plan_id: i64,
    pub razorpay_order_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub user_id: i64,
    pub plan_id: i64,
    pub user_plan_id: Option<i64>,
    pub amount_paise: i64,
    pub currency: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    #[sqlx(try_from = "String")]
    pub billing_cycle: BillingCycle,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub user_id: i64,
    pub plan_id: i64,
    pub user_plan_id: Option<i64>,
    pub amount_paise: i64,
    pub currency: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub status: InvoiceStatus,
    pub billing_cycle: BillingCycle,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
}

/// Inbound payment-provider event, unique by event id
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookLog {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    #[sqlx(json)]
    pub data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
