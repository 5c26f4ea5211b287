use std::sync::Arc;

use common::auth::{AuthService, ResetLinks, TokenService};
use common::billing::{self, BillingService, MockRazorpayProvider};
use common::config::Settings;
use common::db::repositories::{
    BillingRepository, BusinessRepository, CustomerRepository, LeadFormRepository,
    NoteRepository, PlanRepository, SubmissionRepository, TaskRepository, UserRepository,
};
use common::db::DbPool;
use common::lead_form::{LeadCaptureService, SubmissionNotifier};
use common::mailer::{self, Mailer};
use common::plan::PlanService;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
    pub auth: AuthService,
    pub plans: PlanService,
    pub billing: BillingService,
    pub lead_capture: LeadCaptureService,
    pub mailer: Arc<dyn Mailer>,
    /// Present only when billing runs against the in-memory provider
    pub payment_simulator: Option<Arc<MockRazorpayProvider>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        db_pool: DbPool,
        config: Settings,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let plans = PlanService::new(PlanRepository::new(db_pool.clone()));
        let users = Arc::new(UserRepository::new(db_pool.clone()));
        let mailer = mailer::build_mailer(&config.mail)?;
        let auth = AuthService::new(
            TokenService::new(&config.auth),
            users.clone(),
            plans.clone(),
            mailer.clone(),
            ResetLinks {
                base_url: config.server.public_base_url.clone(),
                ttl: chrono::Duration::minutes(config.mail.reset_token_ttl_minutes),
            },
        );

        let handle = billing::build_provider(&config.billing)?;
        let billing = BillingService::new(
            handle.provider,
            Arc::new(BillingRepository::new(db_pool.clone())),
            config.billing.brand_name.clone(),
        );

        let lead_capture = LeadCaptureService::new(
            LeadFormRepository::new(db_pool.clone()),
            SubmissionRepository::new(db_pool.clone()),
            CustomerRepository::new(db_pool.clone()),
            NoteRepository::new(db_pool.clone()),
            SubmissionNotifier::new(users, mailer.clone(), config.server.public_base_url.clone()),
            config.lead_forms.max_submissions_per_hour,
        );

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            auth,
            plans,
            billing,
            lead_capture,
            mailer,
            payment_simulator: handle.simulator,
            metrics,
        })
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db_pool.clone())
    }

    pub fn businesses(&self) -> BusinessRepository {
        BusinessRepository::new(self.db_pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.db_pool.clone())
    }

    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.db_pool.clone())
    }

    pub fn notes(&self) -> NoteRepository {
        NoteRepository::new(self.db_pool.clone())
    }

    pub fn lead_forms(&self) -> LeadFormRepository {
        LeadFormRepository::new(self.db_pool.clone())
    }

    pub fn submissions(&self) -> SubmissionRepository {
        SubmissionRepository::new(self.db_pool.clone())
    }
}
