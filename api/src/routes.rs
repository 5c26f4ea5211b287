use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{admin_middleware, auth_middleware, track_metrics};
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/", get(handlers::pages::root))
        .route("/login", get(handlers::pages::login_page))
        .route("/register", get(handlers::pages::register_page))
        .route("/forgot-password", get(handlers::pages::forgot_password_page))
        .route("/reset-password", get(handlers::pages::reset_password_page))
        .route("/forms/:slug", get(handlers::pages::public_form))
        .route("/public/js/lead-form-embed.js", get(handlers::pages::embed_script))
        .route("/auth/:provider", get(handlers::oauth::start))
        .route("/auth/:provider/callback", get(handlers::oauth::callback))
        .route("/api/v1/health", get(handlers::health::health_check))
        .route("/api/v1/users/register", post(handlers::auth::register))
        .route("/api/v1/users/login", post(handlers::auth::login))
        .route("/api/v1/users/refresh", post(handlers::auth::refresh))
        .route(
            "/api/v1/users/forgot-password",
            post(handlers::profile::forgot_password),
        )
        .route(
            "/api/v1/users/reset-password",
            post(handlers::profile::reset_password),
        )
        .route(
            "/api/v1/users/reset-password/verify",
            get(handlers::profile::verify_reset_token),
        )
        .route("/api/v1/forms/:slug/submit", post(handlers::lead_forms::submit))
        .route("/api/v1/billing/plans", get(handlers::billing::list_plans))
        // Signed by the provider, not by a session
        .route(
            "/api/v1/billing/webhook/razorpay",
            post(handlers::billing::razorpay_webhook),
        );

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        // Pages
        .route("/dashboard", get(handlers::pages::dashboard))
        .route("/customers", get(handlers::pages::customers_page))
        .route("/tasks", get(handlers::pages::tasks_page))
        .route("/reminders", get(handlers::pages::reminders_page))
        .route("/notes", get(handlers::pages::notes_page))
        .route("/lead-forms", get(handlers::pages::lead_forms_page))
        .route("/billing", get(handlers::pages::billing_page))
        .route("/profile", get(handlers::pages::profile_page))
        // Session
        .route("/api/v1/users/logout", post(handlers::auth::logout))
        .route("/api/v1/users/me", get(handlers::auth::me))
        // Profile
        .route(
            "/api/v1/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route(
            "/api/v1/profile/change-password",
            post(handlers::profile::change_password),
        )
        // Businesses
        .route(
            "/api/v1/business",
            get(handlers::business::list_businesses).post(handlers::business::create_business),
        )
        .route(
            "/api/v1/business/:id",
            put(handlers::business::update_business).delete(handlers::business::delete_business),
        )
        // Customers
        .route(
            "/api/v1/customers",
            get(handlers::customers::list_customers).post(handlers::customers::create_customer),
        )
        .route(
            "/api/v1/customers/bulk-upload",
            post(handlers::customers::bulk_upload),
        )
        .route(
            "/api/v1/customers/:id",
            get(handlers::customers::get_customer)
                .put(handlers::customers::update_customer)
                .delete(handlers::customers::delete_customer),
        )
        // Reminders
        .route("/api/v1/reminders", get(handlers::reminders::upcoming))
        .route("/api/v1/reminders/send-wish", post(handlers::reminders::send_wish))
        .route(
            "/api/v1/reminders/customer/:id",
            put(handlers::reminders::update_customer_dates),
        )
        // Tasks
        .route(
            "/api/v1/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route("/api/v1/tasks/stats", get(handlers::tasks::task_stats))
        .route(
            "/api/v1/tasks/:id",
            get(handlers::tasks::get_task)
                .put(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        // Notes timeline
        .route("/api/v1/notes", post(handlers::notes::create_note))
        .route(
            "/api/v1/notes/customer/:id",
            get(handlers::notes::customer_timeline),
        )
        .route(
            "/api/v1/notes/:id",
            put(handlers::notes::update_note).delete(handlers::notes::delete_note),
        )
        // Lead forms
        .route(
            "/api/v1/lead-forms",
            get(handlers::lead_forms::list_forms).post(handlers::lead_forms::create_form),
        )
        .route(
            "/api/v1/lead-forms/:id",
            get(handlers::lead_forms::get_form)
                .put(handlers::lead_forms::update_form)
                .delete(handlers::lead_forms::delete_form),
        )
        .route("/api/v1/lead-forms/:id/embed", get(handlers::lead_forms::embed))
        .route(
            "/api/v1/lead-forms/:id/submissions",
            get(handlers::lead_forms::submissions),
        )
        // Billing
        .route("/api/v1/billing/orders", post(handlers::billing::create_order))
        .route(
            "/api/v1/billing/orders/:id/verify",
            post(handlers::billing::verify_payment),
        )
        .route(
            "/api/v1/billing/subscriptions",
            post(handlers::billing::create_subscription),
        )
        .route(
            "/api/v1/billing/subscriptions/me",
            get(handlers::billing::my_subscription),
        )
        .route(
            "/api/v1/billing/subscriptions/:id/cancel",
            post(handlers::billing::cancel_subscription),
        )
        .route("/api/v1/billing/my-plan", get(handlers::billing::my_plan))
        .route("/api/v1/billing/invoices", get(handlers::billing::list_invoices))
        .route("/api/v1/billing/invoices/:id", get(handlers::billing::get_invoice))
        .route(
            "/api/v1/billing/mock/orders/:id/pay",
            post(handlers::billing::simulate_order_payment),
        )
        .route(
            "/api/v1/billing/mock/subscriptions/:id/pay",
            post(handlers::billing::simulate_subscription_payment),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Admin routes (authentication and admin role required)
    let admin_routes = Router::new()
        .route("/admin", get(handlers::pages::admin_plans_page))
        .route(
            "/api/v1/admin/plans",
            get(handlers::admin::list_plans).post(handlers::admin::create_plan),
        )
        .route(
            "/api/v1/admin/plans/:id",
            get(handlers::admin::get_plan)
                .put(handlers::admin::update_plan)
                .delete(handlers::admin::delete_plan),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                ))
                .layer(axum::middleware::from_fn(admin_middleware)),
        );

    // Metrics endpoint (no authentication for Prometheus scraping)
    let metrics_routes = Router::new().route("/metrics", get(handlers::metrics::metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .merge(metrics_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(track_metrics)),
        )
        .with_state(state)
}
