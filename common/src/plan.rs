// Plan pricing and plan-based restrictions

use crate::db::repositories::PlanRepository;
use crate::errors::{DatabaseError, PlanError, ValidationError};
use crate::models::{BillingCycle, Plan, PlanDraft, PlanFeature, PlanInput, PlanSummary};
use crate::validation::require_non_empty;
use chrono::{DateTime, Months, Utc};
use tracing::{info, instrument, warn};

pub const FREE_TRIAL_SLUG: &str = "free-trial";

/// Tasks a Free Trial account may hold
pub const FREE_TRIAL_TASK_LIMIT: i64 = 10;

/// Limits applied when a user has no current plan
pub const DEFAULT_CUSTOMER_LIMIT: i32 = 50;
pub const DEFAULT_BUSINESS_LIMIT: i32 = 1;

/// Defaults for limits an admin leaves out when creating a plan
const DEFAULT_EMAILS_PER_MONTH: i32 = 100;
const DEFAULT_WHATSAPP_PER_MONTH: i32 = 0;

const BILLING_PERIODS: &[&str] = &["monthly", "yearly"];

/// Amount charged for one cycle of `plan`, in paise.
///
/// Yearly falls back to twelve monthly payments when no yearly price is set.
pub fn price_for_cycle(plan: &Plan, cycle: BillingCycle) -> i64 {
    match cycle {
        BillingCycle::Monthly => plan.price_paise,
        BillingCycle::Yearly => plan
            .yearly_price_paise
            .filter(|p| *p > 0)
            .unwrap_or(plan.price_paise * 12),
    }
}

/// End of a paid period starting at `start`
pub fn period_end(start: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    let months = match cycle {
        BillingCycle::Monthly => Months::new(1),
        BillingCycle::Yearly => Months::new(12),
    };
    start.checked_add_months(months).unwrap_or(start)
}

/// No plan at all is treated like Free Trial
pub fn is_free_trial(plan: Option<&PlanSummary>) -> bool {
    plan.map_or(true, |p| p.slug == FREE_TRIAL_SLUG)
}

/// Reject task creation once a Free Trial account reaches its task limit
pub fn check_task_quota(plan: Option<&PlanSummary>, existing_tasks: i64) -> Result<(), PlanError> {
    if is_free_trial(plan) && existing_tasks >= FREE_TRIAL_TASK_LIMIT {
        return Err(PlanError::UpgradeRequired(format!(
            "Free Trial allows up to {} tasks. Upgrade your plan to add more.",
            FREE_TRIAL_TASK_LIMIT
        )));
    }
    Ok(())
}

/// Task reminders are a paid feature
pub fn check_reminders_allowed(plan: Option<&PlanSummary>) -> Result<(), PlanError> {
    if is_free_trial(plan) {
        return Err(PlanError::UpgradeRequired(
            "Task reminders are not available on Free Trial. Upgrade your plan to use reminders."
                .to_string(),
        ));
    }
    Ok(())
}

fn customer_limit(plan: Option<&PlanSummary>) -> Option<i32> {
    plan.map_or(Some(DEFAULT_CUSTOMER_LIMIT), |p| p.max_customers)
}

fn business_limit(plan: Option<&PlanSummary>) -> Option<i32> {
    plan.map_or(Some(DEFAULT_BUSINESS_LIMIT), |p| p.max_businesses)
}

/// Customers the user may still add; `None` means unlimited
pub fn remaining_customers(plan: Option<&PlanSummary>, existing: i64) -> Option<i64> {
    customer_limit(plan).map(|limit| (i64::from(limit) - existing).max(0))
}

/// Reject a new customer once the plan's customer limit is reached
pub fn check_customer_quota(plan: Option<&PlanSummary>, existing: i64) -> Result<(), PlanError> {
    match customer_limit(plan) {
        Some(limit) if existing >= i64::from(limit) => Err(PlanError::UpgradeRequired(format!(
            "Your plan allows up to {} customers. Upgrade your plan to add more.",
            limit
        ))),
        _ => Ok(()),
    }
}

/// Reject a new business once the plan's business limit is reached
pub fn check_business_quota(plan: Option<&PlanSummary>, existing: i64) -> Result<(), PlanError> {
    match business_limit(plan) {
        Some(limit) if existing >= i64::from(limit) => Err(PlanError::UpgradeRequired(format!(
            "Your plan allows up to {} businesses. Upgrade your plan to add more.",
            limit
        ))),
        _ => Ok(()),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn check_draft(draft: &PlanDraft) -> Result<(), ValidationError> {
    require_non_empty("name", &draft.name)?;
    require_non_empty("slug", &draft.slug)?;
    if !draft
        .slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::invalid(
            "slug",
            "may only contain lowercase letters, digits and dashes",
        ));
    }
    if draft.price_paise < 0 || draft.yearly_price_paise.map_or(false, |p| p < 0) {
        return Err(ValidationError::invalid("price_paise", "must not be negative"));
    }
    if !BILLING_PERIODS.contains(&draft.billing_period.as_str()) {
        return Err(ValidationError::invalid("billing_period", "must be monthly or yearly"));
    }
    let limits = [
        draft.max_customers,
        draft.max_businesses,
        draft.max_emails_per_month,
        draft.max_whatsapp_messages_per_month,
    ];
    if limits.iter().flatten().any(|limit| *limit < 0) {
        return Err(ValidationError::invalid("limits", "must not be negative"));
    }
    Ok(())
}

/// New plan from an admin request; omitted fields take the catalogue defaults
pub fn draft_for_create(input: PlanInput) -> Result<PlanDraft, ValidationError> {
    let draft = PlanDraft {
        name: trimmed(input.name).unwrap_or_default(),
        slug: trimmed(input.slug).unwrap_or_default(),
        description: input.description.flatten(),
        price_paise: input.price_paise.unwrap_or(0),
        yearly_price_paise: input.yearly_price_paise.flatten(),
        currency: input.currency.unwrap_or_else(|| "INR".to_string()),
        billing_period: input.billing_period.unwrap_or_else(|| "monthly".to_string()),
        max_customers: input.max_customers.unwrap_or(Some(DEFAULT_CUSTOMER_LIMIT)),
        max_businesses: input.max_businesses.unwrap_or(Some(DEFAULT_BUSINESS_LIMIT)),
        max_emails_per_month: input.max_emails_per_month.unwrap_or(Some(DEFAULT_EMAILS_PER_MONTH)),
        max_whatsapp_messages_per_month: input
            .max_whatsapp_messages_per_month
            .unwrap_or(Some(DEFAULT_WHATSAPP_PER_MONTH)),
        has_email_templates: input.has_email_templates.unwrap_or(false),
        has_whatsapp_templates: input.has_whatsapp_templates.unwrap_or(false),
        has_invoice: input.has_invoice.unwrap_or(false),
        has_analytics: input.has_analytics.unwrap_or(false),
        has_api_access: input.has_api_access.unwrap_or(false),
        has_custom_integrations: input.has_custom_integrations.unwrap_or(false),
        has_priority_support: input.has_priority_support.unwrap_or(false),
        is_active: input.is_active.unwrap_or(true),
        display_order: input.display_order.unwrap_or(0),
    };
    check_draft(&draft)?;
    Ok(draft)
}

/// `current` with the fields present in `input` replaced
pub fn draft_for_update(current: &Plan, input: PlanInput) -> Result<PlanDraft, ValidationError> {
    let base = PlanDraft::from(current);
    let draft = PlanDraft {
        name: trimmed(input.name).unwrap_or(base.name),
        slug: trimmed(input.slug).unwrap_or(base.slug),
        description: input.description.unwrap_or(base.description),
        price_paise: input.price_paise.unwrap_or(base.price_paise),
        yearly_price_paise: input.yearly_price_paise.unwrap_or(base.yearly_price_paise),
        currency: input.currency.unwrap_or(base.currency),
        billing_period: input.billing_period.unwrap_or(base.billing_period),
        max_customers: input.max_customers.unwrap_or(base.max_customers),
        max_businesses: input.max_businesses.unwrap_or(base.max_businesses),
        max_emails_per_month: input.max_emails_per_month.unwrap_or(base.max_emails_per_month),
        max_whatsapp_messages_per_month: input
            .max_whatsapp_messages_per_month
            .unwrap_or(base.max_whatsapp_messages_per_month),
        has_email_templates: input.has_email_templates.unwrap_or(base.has_email_templates),
        has_whatsapp_templates: input.has_whatsapp_templates.unwrap_or(base.has_whatsapp_templates),
        has_invoice: input.has_invoice.unwrap_or(base.has_invoice),
        has_analytics: input.has_analytics.unwrap_or(base.has_analytics),
        has_api_access: input.has_api_access.unwrap_or(base.has_api_access),
        has_custom_integrations: input.has_custom_integrations.unwrap_or(base.has_custom_integrations),
        has_priority_support: input.has_priority_support.unwrap_or(base.has_priority_support),
        is_active: input.is_active.unwrap_or(base.is_active),
        display_order: input.display_order.unwrap_or(base.display_order),
    };
    check_draft(&draft)?;
    Ok(draft)
}

fn slug_conflict(err: DatabaseError, slug: &str) -> PlanError {
    match err {
        DatabaseError::DuplicateKey(_) => PlanError::SlugTaken(slug.to_string()),
        other => other.into(),
    }
}

/// Resolves and assigns user plans
#[derive(Clone)]
pub struct PlanService {
    plans: PlanRepository,
}

impl PlanService {
    pub fn new(plans: PlanRepository) -> Self {
        Self { plans }
    }

    #[instrument(skip(self))]
    pub async fn current_plan(&self, user_id: i64) -> Result<Option<PlanSummary>, DatabaseError> {
        self.plans.current_for_user(user_id).await
    }

    /// Give the user Free Trial unless they already have a current plan.
    #[instrument(skip(self))]
    pub async fn assign_free_trial(&self, user_id: i64) -> Result<(), DatabaseError> {
        if self.plans.current_for_user(user_id).await?.is_some() {
            return Ok(());
        }

        let Some(plan) = self.plans.find_by_slug(FREE_TRIAL_SLUG).await? else {
            warn!("Free Trial plan is not seeded");
            return Err(DatabaseError::NotFound(format!("Plan {}", FREE_TRIAL_SLUG)));
        };

        self.plans.assign_trial(user_id, plan.id).await?;
        info!(user_id, plan_id = plan.id, "Assigned Free Trial plan");
        Ok(())
    }

    /// Like `assign_free_trial` but only logs failures; login and signup continue either way.
    pub async fn ensure_plan(&self, user_id: i64) {
        if let Err(e) = self.assign_free_trial(user_id).await {
            warn!(user_id, error = %e, "Could not assign Free Trial plan");
        }
    }

    /// Whole catalogue for the admin screen
    pub async fn list_all(&self) -> Result<Vec<Plan>, DatabaseError> {
        self.plans.list_all().await
    }

    pub async fn get(&self, id: i64) -> Result<Plan, PlanError> {
        self.plans.find_by_id(id).await?.ok_or(PlanError::NotFound(id))
    }

    #[instrument(skip(self, input))]
    pub async fn create_plan(&self, input: PlanInput) -> Result<Plan, PlanError> {
        let draft = draft_for_create(input)?;
        if self.plans.find_by_slug(&draft.slug).await?.is_some() {
            return Err(PlanError::SlugTaken(draft.slug));
        }
        let plan = self
            .plans
            .create(&draft)
            .await
            .map_err(|e| slug_conflict(e, &draft.slug))?;
        info!(plan_id = plan.id, slug = %plan.slug, "Plan created by admin");
        Ok(plan)
    }

    #[instrument(skip(self, input))]
    pub async fn update_plan(&self, id: i64, input: PlanInput) -> Result<Plan, PlanError> {
        let current = self.get(id).await?;
        let draft = draft_for_update(&current, input)?;
        if draft.slug != current.slug && self.plans.find_by_slug(&draft.slug).await?.is_some() {
            return Err(PlanError::SlugTaken(draft.slug));
        }
        let plan = self
            .plans
            .update(id, &draft)
            .await
            .map_err(|e| slug_conflict(e, &draft.slug))?;
        info!(plan_id = id, "Plan updated by admin");
        Ok(plan)
    }

    /// Plans that users or subscriptions still reference cannot be removed;
    /// deactivate them instead
    #[instrument(skip(self))]
    pub async fn delete_plan(&self, id: i64) -> Result<(), PlanError> {
        let plan = self.get(id).await?;
        if plan.slug == FREE_TRIAL_SLUG || self.plans.count_references(id).await? > 0 {
            return Err(PlanError::InUse(plan.slug));
        }
        self.plans.delete(id).await.map_err(|e| match e {
            DatabaseError::ForeignKeyViolation(_) => PlanError::InUse(plan.slug.clone()),
            other => other.into(),
        })?;
        info!(plan_id = id, slug = %plan.slug, "Plan deleted by admin");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn has_feature(&self, user_id: i64, feature: PlanFeature) -> Result<bool, DatabaseError> {
        Ok(self
            .plans
            .current_for_user(user_id)
            .await?
            .map_or(false, |p| p.has(feature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserPlanStatus;
    use chrono::TimeZone;

    fn plan(price: i64, yearly: Option<i64>) -> Plan {
        Plan {
            id: 2,
            name: "Silver".into(),
            slug: "silver".into(),
            description: None,
            price_paise: price,
            yearly_price_paise: yearly,
            currency: "INR".into(),
            billing_period: "monthly".into(),
            max_customers: Some(500),
            max_businesses: Some(1),
            max_emails_per_month: Some(1000),
            max_whatsapp_messages_per_month: Some(0),
            has_email_templates: true,
            has_whatsapp_templates: false,
            has_invoice: true,
            has_analytics: false,
            has_api_access: false,
            has_custom_integrations: false,
            has_priority_support: false,
            is_active: true,
            display_order: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn summary(slug: &str) -> PlanSummary {
        PlanSummary {
            plan_id: 1,
            name: slug.into(),
            slug: slug.into(),
            status: UserPlanStatus::Active,
            start_date: Utc::now(),
            end_date: None,
            max_customers: None,
            max_businesses: None,
            max_emails_per_month: None,
            max_whatsapp_messages_per_month: None,
            has_email_templates: true,
            has_whatsapp_templates: false,
            has_invoice: false,
            has_analytics: true,
            has_api_access: false,
            has_custom_integrations: false,
            has_priority_support: false,
        }
    }

    #[test]
    fn test_price_for_cycle() {
        assert_eq!(price_for_cycle(&plan(49_900, None), BillingCycle::Monthly), 49_900);
        assert_eq!(price_for_cycle(&plan(49_900, None), BillingCycle::Yearly), 598_800);
        assert_eq!(
            price_for_cycle(&plan(49_900, Some(499_000)), BillingCycle::Yearly),
            499_000
        );
    }

    #[test]
    fn test_period_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(
            period_end(start, BillingCycle::Monthly),
            Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap()
        );
        assert_eq!(
            period_end(start, BillingCycle::Yearly),
            Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_free_trial_limits() {
        assert!(is_free_trial(None));
        assert!(is_free_trial(Some(&summary(FREE_TRIAL_SLUG))));
        assert!(!is_free_trial(Some(&summary("gold"))));

        assert!(check_task_quota(None, 9).is_ok());
        assert!(matches!(
            check_task_quota(None, 10),
            Err(PlanError::UpgradeRequired(_))
        ));
        assert!(check_task_quota(Some(&summary("gold")), 500).is_ok());

        assert!(check_reminders_allowed(Some(&summary(FREE_TRIAL_SLUG))).is_err());
        assert!(check_reminders_allowed(Some(&summary("gold"))).is_ok());
    }

    fn limited(customers: Option<i32>, businesses: Option<i32>) -> PlanSummary {
        PlanSummary {
            max_customers: customers,
            max_businesses: businesses,
            ..summary("silver")
        }
    }

    #[test]
    fn test_customer_quota() {
        let silver = limited(Some(500), Some(1));
        assert!(check_customer_quota(Some(&silver), 499).is_ok());
        assert!(matches!(
            check_customer_quota(Some(&silver), 500),
            Err(PlanError::UpgradeRequired(msg)) if msg.contains("500 customers")
        ));
        assert!(check_customer_quota(Some(&limited(None, None)), 1_000_000).is_ok());

        // No plan falls back to the default limit
        assert!(check_customer_quota(None, 49).is_ok());
        assert!(check_customer_quota(None, 50).is_err());

        assert_eq!(remaining_customers(Some(&silver), 480), Some(20));
        assert_eq!(remaining_customers(Some(&silver), 900), Some(0));
        assert_eq!(remaining_customers(Some(&limited(None, None)), 900), None);
    }

    #[test]
    fn test_business_quota() {
        let single = limited(None, Some(1));
        assert!(check_business_quota(Some(&single), 0).is_ok());
        assert!(matches!(
            check_business_quota(Some(&single), 1),
            Err(PlanError::UpgradeRequired(msg)) if msg.contains("1 businesses")
        ));
        assert!(check_business_quota(Some(&limited(None, Some(3))), 2).is_ok());
        assert!(check_business_quota(Some(&limited(None, None)), 40).is_ok());
        assert!(check_business_quota(None, 1).is_err());
    }

    fn input(json: serde_json::Value) -> PlanInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_new_plan_defaults() {
        let draft = draft_for_create(input(serde_json::json!({
            "name": " Gold ",
            "slug": "gold",
            "price_paise": 99_900,
            "max_businesses": null
        })))
        .unwrap();

        assert_eq!(draft.name, "Gold");
        assert_eq!(draft.currency, "INR");
        assert_eq!(draft.billing_period, "monthly");
        assert_eq!(draft.max_customers, Some(DEFAULT_CUSTOMER_LIMIT));
        assert_eq!(draft.max_businesses, None);
        assert_eq!(draft.max_emails_per_month, Some(100));
        assert_eq!(draft.max_whatsapp_messages_per_month, Some(0));
        assert!(draft.is_active);
        assert!(!draft.has_invoice);
    }

    #[test]
    fn test_new_plan_requires_name_and_valid_fields() {
        assert!(matches!(
            draft_for_create(input(serde_json::json!({ "slug": "gold" }))),
            Err(ValidationError::MissingField(f)) if f == "name"
        ));
        assert!(draft_for_create(input(serde_json::json!({ "name": "Gold" }))).is_err());
        assert!(draft_for_create(input(serde_json::json!({ "name": "Gold", "slug": "Gold Plan" }))).is_err());
        assert!(draft_for_create(input(serde_json::json!({
            "name": "Gold", "slug": "gold", "billing_period": "weekly"
        })))
        .is_err());
        assert!(draft_for_create(input(serde_json::json!({
            "name": "Gold", "slug": "gold", "max_customers": -1
        })))
        .is_err());
    }

    #[test]
    fn test_plan_update_keeps_absent_fields_and_clears_null_limits() {
        let current = plan(49_900, Some(499_000));
        let draft = draft_for_update(
            &current,
            input(serde_json::json!({
                "price_paise": 59_900,
                "max_customers": null,
                "is_active": false
            })),
        )
        .unwrap();

        assert_eq!(draft.price_paise, 59_900);
        assert_eq!(draft.max_customers, None);
        assert_eq!(draft.max_emails_per_month, Some(1000));
        assert_eq!(draft.yearly_price_paise, Some(499_000));
        assert_eq!(draft.slug, "silver");
        assert!(!draft.is_active);

        assert!(draft_for_update(&current, input(serde_json::json!({ "name": "  " })))
            .is_err());
    }

    #[test]
    fn test_summary_feature_flags() {
        let s = summary("gold");
        assert!(s.has(PlanFeature::Analytics));
        assert!(!s.has(PlanFeature::Invoice));
    }
}
