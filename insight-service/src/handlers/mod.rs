pub mod auth;
pub mod files;
pub mod health;
pub mod invoices;
pub mod plans;
pub mod settings;

pub use health::{health_check, metrics_endpoint, readiness_check};
