pub mod conciliations;
pub mod health;

pub use conciliations::{assign_documents, dissolve_group, list_groups};
pub use health::{fallback, health_check, metrics_handler, readiness_check};
