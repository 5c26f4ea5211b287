// Idempotent schema migrations and seed data

use crate::auth::PASSWORD_COST;
use crate::config::AdminSeedConfig;
use crate::db::DbPool;
use crate::errors::{DatabaseError, MigrationError};
use crate::models::{UserRole, UserStatus};
use crate::telemetry;
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    CreateTable { table: &'static str },
    AddColumn { table: &'static str, column: &'static str },
    CreateIndex { table: &'static str, index: &'static str },
    SeedPlans,
    SeedAdmin,
}

#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub name: &'static str,
    pub kind: StepKind,
    pub sql: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// "Already exists" failures count as a skipped step; anything else is fatal
pub fn classify(step: &str, result: Result<(), DatabaseError>) -> Result<StepOutcome, MigrationError> {
    match result {
        Ok(()) => Ok(StepOutcome::Applied),
        Err(e) if e.is_already_exists() => {
            warn!(step, error = %e, "Object already exists, skipping");
            Ok(StepOutcome::Skipped)
        }
        Err(e) => Err(MigrationError::StepFailed {
            step: step.to_string(),
            reason: e.to_string(),
        }),
    }
}

const CREATE_USERS: &str = r#"
CREATE TABLE users (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    email VARCHAR(255) NOT NULL,
    password_hash VARCHAR(255) NULL,
    first_name VARCHAR(100) NOT NULL DEFAULT '',
    last_name VARCHAR(100) NOT NULL DEFAULT '',
    phone VARCHAR(20) NULL,
    avatar_url VARCHAR(500) NULL,
    provider VARCHAR(20) NOT NULL DEFAULT 'local',
    provider_id VARCHAR(255) NULL,
    role VARCHAR(20) NOT NULL DEFAULT 'shop_owner',
    status VARCHAR(20) NOT NULL DEFAULT 'active',
    refresh_token_hash VARCHAR(64) NULL,
    refresh_token_expires_at DATETIME NULL,
    password_reset_hash VARCHAR(64) NULL,
    password_reset_expires_at DATETIME NULL,
    timezone VARCHAR(64) NOT NULL DEFAULT 'Asia/Kolkata',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_users_email (email)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_BUSINESSES: &str = r#"
CREATE TABLE businesses (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    owner_id BIGINT NOT NULL,
    business_name VARCHAR(255) NOT NULL,
    category VARCHAR(100) NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    CONSTRAINT fk_businesses_owner FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_CUSTOMERS: &str = r#"
CREATE TABLE customers (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    business_id BIGINT NULL,
    name VARCHAR(255) NULL,
    email VARCHAR(255) NULL,
    phone_e164 VARCHAR(20) NOT NULL,
    whatsapp_e164 VARCHAR(20) NULL,
    tags JSON NOT NULL,
    consent_at DATETIME NULL,
    date_of_birth DATE NULL,
    anniversary_date DATE NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_customers_user_phone (user_id, phone_e164),
    CONSTRAINT fk_customers_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_customers_business FOREIGN KEY (business_id) REFERENCES businesses(id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_TASKS: &str = r#"
CREATE TABLE tasks (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    customer_id BIGINT NOT NULL,
    title VARCHAR(255) NOT NULL,
    description TEXT NULL,
    task_type VARCHAR(30) NOT NULL DEFAULT 'other',
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    due_date DATETIME NOT NULL,
    reminder_date DATETIME NULL,
    is_reminder_sent BOOLEAN NOT NULL DEFAULT FALSE,
    priority VARCHAR(10) NOT NULL DEFAULT 'medium',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    KEY idx_tasks_user_due (user_id, due_date),
    CONSTRAINT fk_tasks_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_tasks_customer FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_NOTES_TIMELINE: &str = r#"
CREATE TABLE notes_timeline (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    customer_id BIGINT NOT NULL,
    note_type VARCHAR(30) NOT NULL DEFAULT 'note',
    title VARCHAR(255) NULL,
    content TEXT NULL,
    metadata JSON NOT NULL,
    created_by BIGINT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    KEY idx_notes_customer (customer_id, created_at),
    CONSTRAINT fk_notes_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_notes_customer FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_LEAD_FORMS: &str = r#"
CREATE TABLE lead_forms (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    business_id BIGINT NULL,
    name VARCHAR(255) NOT NULL,
    slug VARCHAR(255) NOT NULL,
    description TEXT NULL,
    fields JSON NOT NULL,
    success_message TEXT NULL,
    redirect_url VARCHAR(500) NULL,
    is_active BOOLEAN NOT NULL DEFAULT FALSE,
    status VARCHAR(20) NOT NULL DEFAULT 'draft',
    theme JSON NOT NULL,
    lead_settings JSON NOT NULL,
    success_behavior JSON NOT NULL,
    notifications JSON NOT NULL,
    anti_spam JSON NOT NULL,
    analytics JSON NOT NULL,
    consent_required BOOLEAN NOT NULL DEFAULT FALSE,
    consent_text TEXT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_lead_forms_slug (slug),
    CONSTRAINT fk_lead_forms_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_lead_forms_business FOREIGN KEY (business_id) REFERENCES businesses(id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_FORM_SUBMISSIONS: &str = r#"
CREATE TABLE form_submissions (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    form_id BIGINT NOT NULL,
    customer_id BIGINT NULL,
    submitted_data JSON NOT NULL,
    ip_address VARCHAR(64) NULL,
    user_agent VARCHAR(500) NULL,
    referrer VARCHAR(500) NULL,
    utm_source VARCHAR(255) NULL,
    utm_campaign VARCHAR(255) NULL,
    utm_medium VARCHAR(255) NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'new',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CONSTRAINT fk_submissions_form FOREIGN KEY (form_id) REFERENCES lead_forms(id) ON DELETE CASCADE,
    CONSTRAINT fk_submissions_customer FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_PLANS: &str = r#"
CREATE TABLE plans (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    slug VARCHAR(100) NOT NULL,
    description TEXT NULL,
    price_paise BIGINT NOT NULL DEFAULT 0,
    yearly_price_paise BIGINT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    billing_period VARCHAR(20) NOT NULL DEFAULT 'monthly',
    max_customers INT NULL,
    max_businesses INT NULL,
    max_emails_per_month INT NULL,
    max_whatsapp_messages_per_month INT NULL,
    has_email_templates BOOLEAN NOT NULL DEFAULT FALSE,
    has_whatsapp_templates BOOLEAN NOT NULL DEFAULT FALSE,
    has_invoice BOOLEAN NOT NULL DEFAULT FALSE,
    has_analytics BOOLEAN NOT NULL DEFAULT FALSE,
    has_api_access BOOLEAN NOT NULL DEFAULT FALSE,
    has_custom_integrations BOOLEAN NOT NULL DEFAULT FALSE,
    has_priority_support BOOLEAN NOT NULL DEFAULT FALSE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    display_order INT NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_plans_slug (slug)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_USER_PLANS: &str = r#"
CREATE TABLE user_plans (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    plan_id BIGINT NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'active',
    start_date DATETIME NOT NULL,
    end_date DATETIME NULL,
    is_current BOOLEAN NOT NULL DEFAULT TRUE,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    KEY idx_user_plans_current (user_id, is_current),
    CONSTRAINT fk_user_plans_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_user_plans_plan FOREIGN KEY (plan_id) REFERENCES plans(id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_SUBSCRIPTIONS: &str = r#"
CREATE TABLE subscriptions (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    plan_id BIGINT NOT NULL,
    razorpay_subscription_id VARCHAR(100) NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    total_count INT NOT NULL DEFAULT 12,
    billed_count INT NOT NULL DEFAULT 0,
    current_cycle_start DATETIME NULL,
    current_cycle_end DATETIME NULL,
    cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
    cancelled_at DATETIME NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_subscriptions_provider (razorpay_subscription_id),
    CONSTRAINT fk_subscriptions_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_subscriptions_plan FOREIGN KEY (plan_id) REFERENCES plans(id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_PAYMENT_LOGS: &str = r#"
CREATE TABLE payment_logs (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    plan_id BIGINT NOT NULL,
    razorpay_order_id VARCHAR(100) NOT NULL,
    razorpay_payment_id VARCHAR(100) NULL,
    amount_paise BIGINT NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    billing_cycle VARCHAR(10) NOT NULL DEFAULT 'monthly',
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    error_message TEXT NULL,
    metadata JSON NOT NULL,
    paid_at DATETIME NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    UNIQUE KEY uq_payment_logs_order (razorpay_order_id),
    CONSTRAINT fk_payment_logs_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_INVOICES: &str = r#"
CREATE TABLE invoices (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    invoice_number VARCHAR(40) NOT NULL,
    user_id BIGINT NOT NULL,
    plan_id BIGINT NOT NULL,
    user_plan_id BIGINT NULL,
    amount_paise BIGINT NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    razorpay_order_id VARCHAR(100) NULL,
    razorpay_payment_id VARCHAR(100) NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'issued',
    billing_cycle VARCHAR(10) NOT NULL DEFAULT 'monthly',
    description VARCHAR(500) NULL,
    paid_at DATETIME NULL,
    due_date DATETIME NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uq_invoices_number (invoice_number),
    KEY idx_invoices_user (user_id, created_at),
    CONSTRAINT fk_invoices_user FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    CONSTRAINT fk_invoices_user_plan FOREIGN KEY (user_plan_id) REFERENCES user_plans(id) ON DELETE SET NULL
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_WEBHOOK_LOGS: &str = r#"
CREATE TABLE webhook_logs (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    event_id VARCHAR(191) NOT NULL,
    event_type VARCHAR(100) NOT NULL,
    data JSON NOT NULL,
    processed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    processed_at DATETIME NULL,
    UNIQUE KEY uq_webhook_logs_event (event_id)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

const CREATE_PLAN_MAPPINGS: &str = r#"
CREATE TABLE razorpay_plan_mappings (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    plan_id BIGINT NOT NULL,
    razorpay_plan_id VARCHAR(100) NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uq_plan_mappings_plan (plan_id),
    CONSTRAINT fk_plan_mappings_plan FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"#;

/// Plans seeded when missing: (slug, name, description, monthly, yearly,
/// max customers, max businesses, premium features, display order)
const SEED_PLANS: &[(&str, &str, &str, i64, Option<i64>, Option<i32>, Option<i32>, bool, i32)] = &[
    (
        "free-trial",
        "Free Trial",
        "Try the CRM with basic customer management",
        0,
        None,
        Some(50),
        Some(1),
        false,
        1,
    ),
    (
        "silver",
        "Silver",
        "Reminders, templates and invoices for a growing shop",
        49_900,
        Some(499_000),
        Some(1_000),
        Some(2),
        false,
        2,
    ),
    (
        "gold",
        "Gold",
        "Everything in Silver plus analytics, API access and priority support",
        99_900,
        Some(999_000),
        None,
        None,
        true,
        3,
    ),
];

/// Every step in execution order
pub fn steps() -> Vec<MigrationStep> {
    use StepKind::*;
    vec![
        MigrationStep { name: "create_users", kind: CreateTable { table: "users" }, sql: CREATE_USERS },
        MigrationStep { name: "create_businesses", kind: CreateTable { table: "businesses" }, sql: CREATE_BUSINESSES },
        MigrationStep { name: "create_customers", kind: CreateTable { table: "customers" }, sql: CREATE_CUSTOMERS },
        MigrationStep { name: "create_tasks", kind: CreateTable { table: "tasks" }, sql: CREATE_TASKS },
        MigrationStep { name: "create_notes_timeline", kind: CreateTable { table: "notes_timeline" }, sql: CREATE_NOTES_TIMELINE },
        MigrationStep { name: "create_lead_forms", kind: CreateTable { table: "lead_forms" }, sql: CREATE_LEAD_FORMS },
        MigrationStep { name: "create_form_submissions", kind: CreateTable { table: "form_submissions" }, sql: CREATE_FORM_SUBMISSIONS },
        MigrationStep { name: "create_plans", kind: CreateTable { table: "plans" }, sql: CREATE_PLANS },
        MigrationStep { name: "create_user_plans", kind: CreateTable { table: "user_plans" }, sql: CREATE_USER_PLANS },
        MigrationStep { name: "create_subscriptions", kind: CreateTable { table: "subscriptions" }, sql: CREATE_SUBSCRIPTIONS },
        MigrationStep { name: "create_payment_logs", kind: CreateTable { table: "payment_logs" }, sql: CREATE_PAYMENT_LOGS },
        MigrationStep { name: "create_invoices", kind: CreateTable { table: "invoices" }, sql: CREATE_INVOICES },
        MigrationStep { name: "create_webhook_logs", kind: CreateTable { table: "webhook_logs" }, sql: CREATE_WEBHOOK_LOGS },
        MigrationStep { name: "create_razorpay_plan_mappings", kind: CreateTable { table: "razorpay_plan_mappings" }, sql: CREATE_PLAN_MAPPINGS },
        // Columns added after the first release; no-ops on a fresh schema
        MigrationStep {
            name: "add_users_timezone",
            kind: AddColumn { table: "users", column: "timezone" },
            sql: "ALTER TABLE users ADD COLUMN timezone VARCHAR(64) NOT NULL DEFAULT 'Asia/Kolkata'",
        },
        MigrationStep {
            name: "add_users_avatar_url",
            kind: AddColumn { table: "users", column: "avatar_url" },
            sql: "ALTER TABLE users ADD COLUMN avatar_url VARCHAR(500) NULL",
        },
        MigrationStep {
            name: "add_users_password_reset_hash",
            kind: AddColumn { table: "users", column: "password_reset_hash" },
            sql: "ALTER TABLE users ADD COLUMN password_reset_hash VARCHAR(64) NULL",
        },
        MigrationStep {
            name: "add_users_password_reset_expires_at",
            kind: AddColumn { table: "users", column: "password_reset_expires_at" },
            sql: "ALTER TABLE users ADD COLUMN password_reset_expires_at DATETIME NULL",
        },
        MigrationStep {
            name: "add_customers_date_of_birth",
            kind: AddColumn { table: "customers", column: "date_of_birth" },
            sql: "ALTER TABLE customers ADD COLUMN date_of_birth DATE NULL",
        },
        MigrationStep {
            name: "add_customers_anniversary_date",
            kind: AddColumn { table: "customers", column: "anniversary_date" },
            sql: "ALTER TABLE customers ADD COLUMN anniversary_date DATE NULL",
        },
        MigrationStep {
            name: "add_lead_forms_consent_text",
            kind: AddColumn { table: "lead_forms", column: "consent_text" },
            sql: "ALTER TABLE lead_forms ADD COLUMN consent_text TEXT NULL",
        },
        MigrationStep {
            name: "index_tasks_reminders",
            kind: CreateIndex { table: "tasks", index: "idx_tasks_reminders" },
            sql: "CREATE INDEX idx_tasks_reminders ON tasks (is_reminder_sent, reminder_date)",
        },
        MigrationStep {
            name: "index_submissions_form_ip",
            kind: CreateIndex { table: "form_submissions", index: "idx_submissions_form_ip" },
            sql: "CREATE INDEX idx_submissions_form_ip ON form_submissions (form_id, ip_address, created_at)",
        },
        MigrationStep { name: "seed_plans", kind: SeedPlans, sql: "" },
        MigrationStep { name: "seed_admin_user", kind: SeedAdmin, sql: "" },
    ]
}

pub struct Migrator {
    pool: DbPool,
    admin: AdminSeedConfig,
}

impl Migrator {
    pub fn new(pool: DbPool, admin: AdminSeedConfig) -> Self {
        Self { pool, admin }
    }

    /// Apply every step in order, stopping at the first fatal failure
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();

        for step in steps() {
            let outcome = if self.already_present(&step).await? {
                StepOutcome::Skipped
            } else {
                classify(step.name, self.apply(&step).await)?
            };

            match outcome {
                StepOutcome::Applied => {
                    info!(step = step.name, "Migration step applied");
                    telemetry::record_migration_applied(step.name);
                    report.applied.push(step.name.to_string());
                }
                StepOutcome::Skipped => report.skipped.push(step.name.to_string()),
            }
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migrations finished"
        );
        Ok(report)
    }

    async fn already_present(&self, step: &MigrationStep) -> Result<bool, MigrationError> {
        let count: Result<i64, sqlx::Error> = match step.kind {
            StepKind::CreateTable { table } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
                )
                .bind(table)
                .fetch_one(self.pool.pool())
                .await
            }
            StepKind::AddColumn { table, column } => {
                sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS
                    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?"#,
                )
                .bind(table)
                .bind(column)
                .fetch_one(self.pool.pool())
                .await
            }
            StepKind::CreateIndex { table, index } => {
                sqlx::query_scalar(
                    r#"SELECT COUNT(*) FROM INFORMATION_SCHEMA.STATISTICS
                    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME = ?"#,
                )
                .bind(table)
                .bind(index)
                .fetch_one(self.pool.pool())
                .await
            }
            StepKind::SeedPlans | StepKind::SeedAdmin => return Ok(false),
        };

        count
            .map(|c| c > 0)
            .map_err(|e| MigrationError::Introspection(e.to_string()))
    }

    async fn apply(&self, step: &MigrationStep) -> Result<(), DatabaseError> {
        match step.kind {
            StepKind::SeedPlans => self.seed_plans().await,
            StepKind::SeedAdmin => self.seed_admin().await,
            _ => {
                sqlx::query(step.sql).execute(self.pool.pool()).await?;
                Ok(())
            }
        }
    }

    async fn seed_plans(&self) -> Result<(), DatabaseError> {
        for &(slug, name, description, price, yearly, max_customers, max_businesses, premium, order) in
            SEED_PLANS
        {
            let paid = price > 0;
            let result = sqlx::query(
                r#"
                INSERT INTO plans
                    (name, slug, description, price_paise, yearly_price_paise, currency,
                     billing_period, max_customers, max_businesses, has_email_templates,
                     has_whatsapp_templates, has_invoice, has_analytics, has_api_access,
                     has_custom_integrations, has_priority_support, is_active, display_order)
                SELECT ?, ?, ?, ?, ?, 'INR', 'monthly', ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?
                FROM DUAL
                WHERE NOT EXISTS (SELECT 1 FROM plans WHERE slug = ?)
                "#,
            )
            .bind(name)
            .bind(slug)
            .bind(description)
            .bind(price)
            .bind(yearly)
            .bind(max_customers)
            .bind(max_businesses)
            .bind(paid)
            .bind(paid)
            .bind(paid)
            .bind(premium)
            .bind(premium)
            .bind(premium)
            .bind(premium)
            .bind(order)
            .bind(slug)
            .execute(self.pool.pool())
            .await?;

            if result.rows_affected() > 0 {
                info!(slug, "Seeded plan");
            }
        }
        Ok(())
    }

    /// Create the admin account, or promote an existing account with that email
    async fn seed_admin(&self) -> Result<(), DatabaseError> {
        let email = self.admin.email.trim().to_lowercase();
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(self.pool.pool())
            .await?;

        if let Some(id) = existing {
            sqlx::query("UPDATE users SET role = ?, status = ? WHERE id = ?")
                .bind(UserRole::Admin.as_str())
                .bind(UserStatus::Active.as_str())
                .bind(id)
                .execute(self.pool.pool())
                .await?;
            info!(user_id = id, "Existing user promoted to admin");
            return Ok(());
        }

        let hash = bcrypt::hash(&self.admin.password, PASSWORD_COST)
            .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to hash admin password: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, phone, provider, role, status)
            VALUES (?, ?, ?, ?, '+911234567890', 'local', ?, ?)
            "#,
        )
        .bind(&email)
        .bind(hash)
        .bind(&self.admin.first_name)
        .bind(&self.admin.last_name)
        .bind(UserRole::Admin.as_str())
        .bind(UserStatus::Active.as_str())
        .execute(self.pool.pool())
        .await?;

        info!(email = %email, "Admin user created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_already_exists_as_skipped() {
        let outcome = classify(
            "create_users",
            Err(DatabaseError::AlreadyExists("Table 'users' already exists".into())),
        )
        .unwrap();
        assert_eq!(outcome, StepOutcome::Skipped);

        let outcome = classify("seed", Err(DatabaseError::DuplicateKey("dup".into()))).unwrap();
        assert_eq!(outcome, StepOutcome::Skipped);
    }

    #[test]
    fn test_classify_other_errors_are_fatal() {
        let err = classify(
            "create_tasks",
            Err(DatabaseError::QueryFailed("syntax error".into())),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::StepFailed { step, .. } if step == "create_tasks"));
        assert_eq!(classify("x", Ok(())).unwrap(), StepOutcome::Applied);
    }

    #[test]
    fn test_step_names_are_unique_and_tables_precede_alters() {
        let all = steps();
        let mut names: Vec<_> = all.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());

        let first_alter = all
            .iter()
            .position(|s| !matches!(s.kind, StepKind::CreateTable { .. }))
            .unwrap();
        assert!(all[first_alter..]
            .iter()
            .all(|s| !matches!(s.kind, StepKind::CreateTable { .. })));
        assert!(matches!(all.last().map(|s| s.kind), Some(StepKind::SeedAdmin)));
    }

    #[test]
    fn test_seed_plans_include_free_trial() {
        assert!(SEED_PLANS.iter().any(|p| p.0 == crate::plan::FREE_TRIAL_SLUG && p.3 == 0));
    }

    #[tokio::test]
    #[ignore] // Requires MySQL (DATABASE_URL)
    async fn test_migrations_are_idempotent() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = DbPool::from_pool(sqlx::MySqlPool::connect(&url).await.unwrap());
        let migrator = Migrator::new(pool, AdminSeedConfig::default());

        migrator.run().await.unwrap();
        let second = migrator.run().await.unwrap();
        assert!(second
            .applied
            .iter()
            .all(|s| s == "seed_plans" || s == "seed_admin_user"));
    }
}
