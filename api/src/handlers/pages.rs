use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};
use common::db::repositories::{CustomerFilter, TaskFilter, TaskWindow};
use common::models::AuthUser;
use common::reminder::{self, DEFAULT_WINDOW_DAYS};
use serde::Deserialize;
use tera::Context;

use crate::state::AppState;
use crate::templates::TEMPLATES;

/// Reminders shown on the dashboard card
const DASHBOARD_REMINDER_DAYS: i64 = 7;

fn render_with_status(status: StatusCode, template: &str, context: &Context) -> Response {
    match TEMPLATES.render(template, context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(template, error = %e, "Template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Something went wrong</h1>".to_string()))
                .into_response()
        }
    }
}

fn render(template: &str, context: &Context) -> Response {
    render_with_status(StatusCode::OK, template, context)
}

fn page_context(user: &AuthUser, active_page: &str) -> Context {
    let mut context = Context::new();
    context.insert("user", user);
    context.insert("active_page", active_page);
    context
}

fn error_page(user: &AuthUser, e: impl std::fmt::Display) -> Response {
    tracing::error!(user_id = user.id, error = %e, "Failed to load page data");
    let mut context = page_context(user, "");
    context.insert("message", "We could not load this page. Please try again.");
    render_with_status(StatusCode::INTERNAL_SERVER_ERROR, "error.html", &context)
}

pub fn access_denied(user: &AuthUser) -> Html<String> {
    let context = page_context(user, "");
    Html(
        TEMPLATES
            .render("access_denied.html", &context)
            .unwrap_or_else(|_| "<h1>Access denied</h1>".to_string()),
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

pub async fn root() -> Redirect {
    Redirect::to("/login")
}

#[tracing::instrument(skip(state))]
pub async fn login_page(State(state): State<AppState>, Query(params): Query<LoginQuery>) -> Response {
    let mut context = Context::new();
    context.insert("error", &params.error.unwrap_or_default());
    context.insert("google_enabled", &state.config.oauth.google.is_some());
    context.insert("facebook_enabled", &state.config.oauth.facebook.is_some());
    render("login.html", &context)
}

#[tracing::instrument(skip(state))]
pub async fn register_page(State(state): State<AppState>) -> Response {
    let mut context = Context::new();
    context.insert("google_enabled", &state.config.oauth.google.is_some());
    context.insert("facebook_enabled", &state.config.oauth.facebook.is_some());
    render("register.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn dashboard(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let today = reminder::today_in(&user.timezone);
    let (day_start, day_end) = reminder::day_bounds(today, &user.timezone);

    let customer_count = match state.customers().count(user.id).await {
        Ok(n) => n,
        Err(e) => return error_page(&user, e),
    };
    let task_stats = match state.tasks().stats(user.id, day_start, day_end).await {
        Ok(stats) => stats,
        Err(e) => return error_page(&user, e),
    };
    let reminders = match state.customers().with_reminder_dates(user.id).await {
        Ok(customers) => reminder::upcoming_reminders(&customers, today, DASHBOARD_REMINDER_DAYS),
        Err(e) => return error_page(&user, e),
    };
    let recent_notes = match state.notes().recent(user.id, 5).await {
        Ok(notes) => notes,
        Err(e) => return error_page(&user, e),
    };
    let plan = match state.plans.current_plan(user.id).await {
        Ok(plan) => plan,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "dashboard");
    context.insert("customer_count", &customer_count);
    context.insert("task_stats", &task_stats);
    context.insert("reminders", &reminders);
    context.insert("recent_notes", &recent_notes);
    context.insert("plan", &plan);
    render("dashboard.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn customers_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let customers = match state.customers().list(user.id, &CustomerFilter::default()).await {
        Ok(c) => c,
        Err(e) => return error_page(&user, e),
    };
    let businesses = match state.businesses().list(user.id).await {
        Ok(b) => b,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "customers");
    context.insert("customers", &customers);
    context.insert("businesses", &businesses);
    render("customers.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn tasks_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let today = reminder::today_in(&user.timezone);
    let (day_start, day_end) = reminder::day_bounds(today, &user.timezone);
    let filter = TaskFilter {
        window: TaskWindow::All,
        status: None,
        customer_id: None,
        day_start,
        day_end,
    };

    let tasks = match state.tasks().list(user.id, &filter).await {
        Ok(t) => t,
        Err(e) => return error_page(&user, e),
    };
    let stats = match state.tasks().stats(user.id, day_start, day_end).await {
        Ok(s) => s,
        Err(e) => return error_page(&user, e),
    };
    let customers = match state.customers().list(user.id, &CustomerFilter::default()).await {
        Ok(c) => c,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "tasks");
    context.insert("tasks", &tasks);
    context.insert("stats", &stats);
    context.insert("customers", &customers);
    render("tasks.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn reminders_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let today = reminder::today_in(&user.timezone);
    let reminders = match state.customers().with_reminder_dates(user.id).await {
        Ok(customers) => reminder::upcoming_reminders(&customers, today, DEFAULT_WINDOW_DAYS),
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "reminders");
    context.insert("reminders", &reminders);
    context.insert("window_days", &DEFAULT_WINDOW_DAYS);
    render("reminders.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn notes_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let notes = match state.notes().recent(user.id, 50).await {
        Ok(n) => n,
        Err(e) => return error_page(&user, e),
    };
    let customers = match state.customers().list(user.id, &CustomerFilter::default()).await {
        Ok(c) => c,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "notes");
    context.insert("notes", &notes);
    context.insert("customers", &customers);
    render("notes.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn lead_forms_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let forms = match state.lead_forms().list(user.id).await {
        Ok(f) => f,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "lead_forms");
    context.insert("forms", &forms);
    context.insert("base_url", &state.config.server.public_base_url);
    render("lead_forms.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn billing_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let plans = match state.billing.list_plans().await {
        Ok(p) => p,
        Err(e) => return error_page(&user, e),
    };
    let current = match state.billing.my_current_plan(user.id).await {
        Ok(p) => p,
        Err(e) => return error_page(&user, e),
    };
    let subscription = match state.billing.my_subscription(user.id).await {
        Ok(s) => s,
        Err(e) => return error_page(&user, e),
    };
    let invoices = match state.billing.invoices(user.id, None).await {
        Ok(i) => i,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "billing");
    context.insert("plans", &plans);
    context.insert("current_plan", &current);
    context.insert("subscription", &subscription);
    context.insert("invoices", &invoices);
    context.insert("payments_enabled", &state.billing.is_configured());
    context.insert("key_id", &state.config.billing.key_id);
    render("billing.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn admin_plans_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let plans = match state.plans.list_all().await {
        Ok(p) => p,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "admin");
    context.insert("plans", &plans);
    render("admin_plans.html", &context)
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn profile_page(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Response {
    let account = match state.auth.profile(user.id).await {
        Ok(account) => account,
        Err(e) => return error_page(&user, e),
    };

    let mut context = page_context(&user, "profile");
    context.insert("account", &account);
    context.insert("has_password", &account.password_hash.is_some());
    render("profile.html", &context)
}

pub async fn forgot_password_page() -> Response {
    render("forgot_password.html", &Context::new())
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPageQuery {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub email: String,
}

pub async fn reset_password_page(Query(params): Query<ResetPageQuery>) -> Response {
    let mut context = Context::new();
    context.insert("token", &params.token);
    context.insert("email", &params.email);
    render("reset_password.html", &context)
}

/// Public lead form page; unknown, draft and inactive forms get a 404 page
#[tracing::instrument(skip(state))]
pub async fn public_form(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let repo = state.lead_forms();
    let form = match repo.find_public_by_slug(&slug).await {
        Ok(Some(form)) => form,
        Ok(None) => return render_with_status(StatusCode::NOT_FOUND, "form_not_found.html", &Context::new()),
        Err(e) => {
            tracing::error!(slug = %slug, error = %e, "Failed to load public form");
            return render_with_status(StatusCode::NOT_FOUND, "form_not_found.html", &Context::new());
        }
    };

    if let Err(e) = repo.record_view(form.id).await {
        tracing::warn!(form_id = form.id, error = %e, "Could not record form view");
    }

    let mut context = Context::new();
    context.insert("form", &form);
    context.insert("honeypot_field", common::lead_form::HONEYPOT_FIELD);
    render("public_form.html", &context)
}

/// Script behind the `<script data-form-slug=...>` embed; swaps itself for an iframe
const EMBED_SCRIPT: &str = r#"(function () {
  var scripts = document.querySelectorAll('script[data-form-slug]');
  for (var i = 0; i < scripts.length; i++) {
    var tag = scripts[i];
    if (tag.getAttribute('data-embedded')) continue;
    tag.setAttribute('data-embedded', '1');
    var base = tag.src.replace(/\/public\/js\/lead-form-embed\.js.*$/, '');
    var frame = document.createElement('iframe');
    frame.src = base + '/forms/' + encodeURIComponent(tag.getAttribute('data-form-slug'));
    frame.width = '100%';
    frame.height = '600';
    frame.style.border = 'none';
    frame.style.borderRadius = '8px';
    tag.parentNode.insertBefore(frame, tag.nextSibling);
  }
})();
"#;

pub async fn embed_script() -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        EMBED_SCRIPT,
    )
        .into_response()
}
