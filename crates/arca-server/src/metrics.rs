//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arca_core::EnrollError;

use crate::state::AppState;

/// Error kinds always present in the output, so series exist from startup.
const FAILURE_KINDS: &[&str] = &[
    "validation",
    "authentication",
    "navigation",
    "download",
    "crypto_tool",
    "browser",
    "io",
];

/// Enrollment counters.
#[derive(Debug, Default)]
pub struct EnrollmentMetrics {
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: Mutex<BTreeMap<&'static str, u64>>,
}

impl EnrollmentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an enrollment as started; it stays in flight until the guard drops.
    pub fn start(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight { metrics: self }
    }

    pub fn record_success(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &EnrollError) {
        let mut failed = match self.failed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *failed.entry(error.kind()).or_insert(0) += 1;
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self, kind: &str) -> u64 {
        let failed = match self.failed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failed.get(kind).copied().unwrap_or(0)
    }
}

/// In-flight marker returned by [`EnrollmentMetrics::start`].
pub struct InFlight<'a> {
    metrics: &'a EnrollmentMetrics,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Collect all metrics from AppState and format as Prometheus text.
pub fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_enrollment_metrics(&state.metrics, &mut output);
    collect_capacity_metrics(state, &mut output);

    output
}

fn collect_enrollment_metrics(metrics: &EnrollmentMetrics, output: &mut String) {
    writeln!(
        output,
        "# HELP arca_enrollments_in_flight Enrollments currently running"
    )
    .ok();
    writeln!(output, "# TYPE arca_enrollments_in_flight gauge").ok();
    writeln!(output, "arca_enrollments_in_flight {}", metrics.in_flight()).ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP arca_enrollments_completed_total Enrollments that returned a certificate"
    )
    .ok();
    writeln!(output, "# TYPE arca_enrollments_completed_total counter").ok();
    writeln!(
        output,
        "arca_enrollments_completed_total {}",
        metrics.completed()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP arca_enrollments_failed_total Failed enrollments by error kind"
    )
    .ok();
    writeln!(output, "# TYPE arca_enrollments_failed_total counter").ok();
    for kind in FAILURE_KINDS {
        writeln!(
            output,
            "arca_enrollments_failed_total{{kind=\"{kind}\"}} {}",
            metrics.failed(kind)
        )
        .ok();
    }
}

fn collect_capacity_metrics(state: &Arc<AppState>, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP arca_enrollment_permits_available Browser session permits not in use"
    )
    .ok();
    writeln!(output, "# TYPE arca_enrollment_permits_available gauge").ok();
    writeln!(
        output,
        "arca_enrollment_permits_available {}",
        state.service.available_permits()
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_portal::testing::{PortalScript, ScriptedFactory};

    use crate::config::Config;
    use crate::service::EnrollmentService;

    fn state() -> Arc<AppState> {
        let factory = Arc::new(ScriptedFactory::new(PortalScript::default()));
        AppState::new(EnrollmentService::new(factory, &Config::default()))
    }

    #[test]
    fn test_collect_metrics_empty_state() {
        let state = state();
        let output = collect_metrics(&state);

        assert!(output.contains("arca_enrollments_in_flight 0"));
        assert!(output.contains("arca_enrollments_completed_total 0"));
        assert!(output.contains("arca_enrollments_failed_total{kind=\"navigation\"} 0"));
        assert!(output.contains("arca_enrollment_permits_available 2"));
    }

    #[test]
    fn test_in_flight_guard() {
        let metrics = EnrollmentMetrics::new();
        {
            let _first = metrics.start();
            let _second = metrics.start();
            assert_eq!(metrics.in_flight(), 2);
        }
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_failures_are_labeled_by_kind() {
        let state = state();
        state
            .metrics
            .record_failure(&EnrollError::Authentication("no identity".to_string()));
        state.metrics.record_success();

        let output = collect_metrics(&state);
        assert!(output.contains("arca_enrollments_failed_total{kind=\"authentication\"} 1"));
        assert!(output.contains("arca_enrollments_completed_total 1"));
    }
}
