//! Shared application state.

use std::sync::Arc;

use crate::metrics::EnrollmentMetrics;
use crate::service::EnrollmentService;

/// Shared application state.
pub struct AppState {
    /// Enrollment workflow.
    pub service: EnrollmentService,

    /// Enrollment counters for `/metrics`.
    pub metrics: EnrollmentMetrics,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(service: EnrollmentService) -> Arc<Self> {
        Arc::new(Self {
            service,
            metrics: EnrollmentMetrics::new(),
        })
    }
}
