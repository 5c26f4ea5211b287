// HTTP surface of the CRM: JSON API, server-rendered pages and middleware

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod templates;
