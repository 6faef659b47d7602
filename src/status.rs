//! Health report to status mapping
//!
//! The status state machine itself lives in the registry (`set_status`
//! deduplicates transitions and publishes change events); this module owns
//! the one place where a reported health document is turned into a
//! [`ServiceStatus`].

use serde_json::Value;

use crate::model::ServiceStatus;

/// Map a reported health document to a service status
///
/// Recognized `status` values follow the usual actuator vocabulary; an
/// explicit partial-health report is the only way to reach `Warning`.
/// Unrecognized or missing values map to `Unknown`, never to `Down` - only
/// a failed probe may conclude the service is down.
pub fn map_health_report(report: &Value) -> ServiceStatus {
    match report.get("status").and_then(|value| value.as_str()) {
        Some("UP") => ServiceStatus::Up,
        Some("DOWN") => ServiceStatus::Down,
        Some("OUT_OF_SERVICE") | Some("PARTIAL") => ServiceStatus::Warning,
        _ => ServiceStatus::Unknown,
    }
}
