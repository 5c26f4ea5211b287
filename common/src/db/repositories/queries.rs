// Shared SELECT column lists, one module per table

pub mod user_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, email, password_hash, first_name, last_name,
        phone, avatar_url, provider, provider_id, role, status,
        refresh_token_hash, refresh_token_expires_at, password_reset_hash,
        password_reset_expires_at, timezone, created_at, updated_at"#;
}

pub mod business_queries {
    pub const SELECT_ALL_COLUMNS: &str =
        "id, owner_id, business_name, category, created_at, updated_at";
}

pub mod customer_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, business_id, name, email, phone_e164,
        whatsapp_e164, tags, consent_at, date_of_birth, anniversary_date, created_at, updated_at"#;
}

pub mod task_queries {
    /// Task columns qualified with `t.` plus the joined customer fields
    pub const SELECT_VIEW_COLUMNS: &str = r#"t.id, t.user_id, t.customer_id, t.title,
        t.description, t.task_type, t.status, t.due_date, t.reminder_date, t.is_reminder_sent,
        t.priority, t.created_at, t.updated_at,
        c.name AS customer_name, c.phone_e164 AS customer_phone"#;

    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, customer_id, title, description,
        task_type, status, due_date, reminder_date, is_reminder_sent, priority,
        created_at, updated_at"#;

    /// MySQL FIELD() ordering so high priority sorts first
    pub const PRIORITY_ORDER: &str = "FIELD(t.priority, 'high', 'medium', 'low')";
}

pub mod note_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, customer_id, note_type, title, content,
        metadata, created_by, created_at, updated_at"#;
}

pub mod lead_form_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, user_id, business_id, name, slug, description,
        fields, success_message, redirect_url, is_active, status, theme, lead_settings,
        success_behavior, notifications, anti_spam, analytics, consent_required, consent_text,
        created_at, updated_at"#;

    // Analytics counters are updated in place so concurrent views and
    // submissions never overwrite each other. JSON_SET reads the
    // pre-update document for every value expression.

    pub const COUNT_VIEW: &str = r#"
        UPDATE lead_forms
        SET analytics = JSON_SET(
            analytics,
            '$.views', COALESCE(JSON_EXTRACT(analytics, '$.views'), 0) + 1,
            '$.conversion_rate', ROUND(
                COALESCE(JSON_EXTRACT(analytics, '$.submissions'), 0) * 100
                    / (COALESCE(JSON_EXTRACT(analytics, '$.views'), 0) + 1), 2))
        WHERE id = ?"#;

    pub const COUNT_SUBMISSION: &str = r#"
        UPDATE lead_forms
        SET analytics = JSON_SET(
            analytics,
            '$.submissions', COALESCE(JSON_EXTRACT(analytics, '$.submissions'), 0) + 1,
            '$.conversion_rate', IF(COALESCE(JSON_EXTRACT(analytics, '$.views'), 0) > 0,
                ROUND((COALESCE(JSON_EXTRACT(analytics, '$.submissions'), 0) + 1) * 100
                    / JSON_EXTRACT(analytics, '$.views'), 2), 0))
        WHERE id = ?"#;

    /// Bind: submission count, submission count, form id
    pub const SYNC_SUBMISSIONS: &str = r#"
        UPDATE lead_forms
        SET analytics = JSON_SET(
            analytics,
            '$.submissions', ?,
            '$.conversion_rate', IF(COALESCE(JSON_EXTRACT(analytics, '$.views'), 0) > 0,
                ROUND(? * 100 / JSON_EXTRACT(analytics, '$.views'), 2), 0))
        WHERE id = ?"#;
}

pub mod submission_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, form_id, customer_id, submitted_data, ip_address,
        user_agent, referrer, utm_source, utm_campaign, utm_medium, status, created_at"#;
}

pub mod plan_queries {
    pub const SELECT_ALL_COLUMNS: &str = r#"id, name, slug, description, price_paise,
        yearly_price_paise, currency, billing_period, max_customers, max_businesses,
        max_emails_per_month, max_whatsapp_messages_per_month, has_email_templates,
        has_whatsapp_templates, has_invoice, has_analytics, has_api_access,
        has_custom_integrations, has_priority_support, is_active, display_order,
        created_at, updated_at"#;

    /// Current, unexpired plan of one user; binds the user id
    pub const SELECT_CURRENT_FOR_USER: &str = r#"SELECT p.id AS plan_id, p.name, p.slug, up.status,
        up.start_date, up.end_date, p.max_customers, p.max_businesses, p.max_emails_per_month,
        p.max_whatsapp_messages_per_month, p.has_email_templates, p.has_whatsapp_templates,
        p.has_invoice, p.has_analytics, p.has_api_access, p.has_custom_integrations,
        p.has_priority_support
        FROM user_plans up
        INNER JOIN plans p ON p.id = up.plan_id
        WHERE up.user_id = ? AND up.is_current = TRUE
          AND (up.end_date IS NULL OR up.end_date >= NOW())
        ORDER BY up.start_date DESC
        LIMIT 1"#;

    /// Writable plan columns, bound in `PlanDraft` field order
    pub const WRITE_COLUMNS: &str = r#"name = ?, slug = ?, description = ?, price_paise = ?,
        yearly_price_paise = ?, currency = ?, billing_period = ?, max_customers = ?,
        max_businesses = ?, max_emails_per_month = ?, max_whatsapp_messages_per_month = ?,
        has_email_templates = ?, has_whatsapp_templates = ?, has_invoice = ?, has_analytics = ?,
        has_api_access = ?, has_custom_integrations = ?, has_priority_support = ?,
        is_active = ?, display_order = ?"#;
}

pub mod billing_queries {
    pub const SUBSCRIPTION_COLUMNS: &str = r#"id, user_id, plan_id, razorpay_subscription_id,
        status, total_count, billed_count, current_cycle_start, current_cycle_end,
        cancel_at_period_end, cancelled_at, created_at, updated_at"#;

    pub const PAYMENT_LOG_COLUMNS: &str = r#"id, user_id, plan_id, razorpay_order_id,
        razorpay_payment_id, amount_paise, currency, billing_cycle, status, error_message,
        metadata, paid_at, created_at, updated_at"#;

    pub const INVOICE_COLUMNS: &str = r#"id, invoice_number, user_id, plan_id, user_plan_id,
        amount_paise, currency, razorpay_order_id, razorpay_payment_id, status, billing_cycle,
        description, paid_at, due_date, created_at"#;

    pub const WEBHOOK_LOG_COLUMNS: &str =
        "id, event_id, event_type, data, processed, created_at, processed_at";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_analytics_counters_update_in_place() {
        for sql in [
            lead_form_queries::COUNT_VIEW,
            lead_form_queries::COUNT_SUBMISSION,
            lead_form_queries::SYNC_SUBMISSIONS,
        ] {
            assert!(sql.contains("JSON_SET("));
            assert!(!sql.contains("SELECT"));
        }
        assert_eq!(placeholders(lead_form_queries::COUNT_VIEW), 1);
        assert_eq!(placeholders(lead_form_queries::SYNC_SUBMISSIONS), 3);
    }

    #[test]
    fn test_current_plan_skips_lapsed_periods() {
        assert!(plan_queries::SELECT_CURRENT_FOR_USER
            .contains("(up.end_date IS NULL OR up.end_date >= NOW())"));
        assert_eq!(placeholders(plan_queries::SELECT_CURRENT_FOR_USER), 1);
    }

    #[test]
    fn test_plan_write_columns_match_draft_fields() {
        assert_eq!(placeholders(plan_queries::WRITE_COLUMNS), 20);
    }
}
