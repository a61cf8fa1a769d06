//! ARCA Enrollment Server Library
//!
//! This crate wires the enrollment workflow (portal automation plus the
//! OpenSSL toolkit) behind an HTTP API, with configuration, shared state and
//! Prometheus metrics.

pub mod config;
pub mod http;
pub mod metrics;
pub mod service;
pub mod state;

pub use config::Config;
pub use service::EnrollmentService;
pub use state::AppState;
