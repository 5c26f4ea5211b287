// Shared library for the Mini CRM 360 api, worker and migrator

pub mod auth;
pub mod billing;
pub mod config;
pub mod customer_import;
pub mod db;
pub mod errors;
pub mod lead_form;
pub mod mailer;
pub mod models;
pub mod oauth;
pub mod plan;
pub mod reminder;
pub mod telemetry;
pub mod validation;
