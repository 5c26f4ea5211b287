// Repository layer for database operations

pub mod billing;
pub mod business;
pub mod customer;
pub mod lead_form;
pub mod note;
pub mod plan;
pub mod submission;
pub mod task;
pub mod user;
pub mod queries;

pub use billing::BillingRepository;
pub use business::BusinessRepository;
pub use customer::{CustomerFilter, CustomerRepository, UpsertOutcome};
pub use lead_form::LeadFormRepository;
pub use note::NoteRepository;
pub use plan::PlanRepository;
pub use submission::{SubmissionFilter, SubmissionRepository};
pub use task::{TaskFilter, TaskRepository, TaskWindow};
pub use user::UserRepository;
