//! HTTP request handlers.

mod certificate;
mod health;

pub use certificate::issue_certificate;
pub use health::{banner, health_check, metrics_handler, BANNER};
