//! Structured audit logging.
//!
//! Operations that change forwarding state on behalf of an operator or a
//! lifecycle event (device join, VPN populate/cleanup, tunnel transitions,
//! daemon start/stop) emit one [`AuditRecord`] through [`audit_log!`].
//! Records go to the `audit` tracing target with the whole record attached
//! as JSON, so they can be filtered out of the regular log stream.
//!
//! With the default `env_logger` setup the records show up as ordinary log
//! lines (tracing's `log` bridge). [`init_logging`] installs a JSON
//! subscriber instead, for collectors that ingest structured logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AUDIT_TARGET: &str = "audit";

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Configuration loaded.
    ConfigurationChange,
    /// Routes programmed onto a DPN that joined a VPN.
    ResourceCreate,
    /// Routes removed from a DPN that left a VPN.
    ResourceDelete,
    /// Daemon start and stop.
    SystemLifecycle,
    /// Tunnel or device state transition.
    NetworkConfig,
    /// Operation explicitly requested by an operator.
    AdminAction,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::ConfigurationChange => "CONFIGURATION_CHANGE",
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
            AuditCategory::NetworkConfig => "NETWORK_CONFIG",
            AuditCategory::AdminAction => "ADMIN_ACTION",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// Completed, but some routes failed.
    Partial,
    InProgress,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Partial => "partial",
            AuditOutcome::InProgress => "in_progress",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that emitted the record, e.g. `FibOrch`.
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    /// e.g. `dpn-7` or `dpn-1->192.0.2.2`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// e.g. `dpn` or `tunnel`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Starts a record stamped now. The outcome stays `InProgress` until set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(self, outcome: AuditOutcome) -> Self {
        Self { outcome, ..self }
    }

    pub fn with_object_id(self, id: impl Into<String>) -> Self {
        Self {
            object_id: Some(id.into()),
            ..self
        }
    }

    pub fn with_object_type(self, kind: impl Into<String>) -> Self {
        Self {
            object_type: Some(kind.into()),
            ..self
        }
    }

    pub fn with_details(self, details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..self
        }
    }

    /// Records `error` and turns the outcome into `Failure`.
    pub fn with_error(self, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            outcome: AuditOutcome::Failure,
            ..self
        }
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => serde_json::json!({ "action": self.action, "encode_error": e.to_string() })
                .to_string(),
        }
    }
}

/// Writes `record` to the audit target at a level picked from its outcome:
/// debug while in progress, info on success, warn otherwise.
pub fn emit(record: &AuditRecord) {
    let object = record.object_id.as_deref().unwrap_or("-");
    let json = record.to_json();
    match record.outcome {
        AuditOutcome::InProgress => tracing::debug!(
            target: AUDIT_TARGET,
            audit_json = %json,
            "audit {} {} {}: {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
        AuditOutcome::Success => tracing::info!(
            target: AUDIT_TARGET,
            audit_json = %json,
            "audit {} {} {}: {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
        AuditOutcome::Failure | AuditOutcome::Partial => tracing::warn!(
            target: AUDIT_TARGET,
            audit_json = %json,
            error = record.error.as_deref().unwrap_or(""),
            "audit {} {} {}: {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
    }
}

/// Emits an [`AuditRecord`] built by the argument expression.
///
/// ```ignore
/// audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, "FibOrch", "populate_fib_on_new_dpn")
///     .with_outcome(AuditOutcome::Success)
///     .with_object_id("dpn-7"));
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        $crate::audit::emit(&$record)
    };
}

/// Installs a JSON tracing subscriber. `RUST_LOG` overrides `log_level`.
///
/// Replaces `env_logger`; call at most once.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(false)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let record = AuditRecord::new(
            AuditCategory::ResourceCreate,
            "FibOrch",
            "populate_fib_on_new_dpn",
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id("dpn-7")
        .with_object_type("dpn");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id.as_deref(), Some("dpn-7"));
        assert_eq!(record.object_type.as_deref(), Some("dpn"));
    }

    #[test]
    fn test_error_marks_failure() {
        let record = AuditRecord::new(AuditCategory::ResourceDelete, "FibOrch", "cleanup_dpn_for_vpn")
            .with_outcome(AuditOutcome::Success)
            .with_error("VPN id not resolvable for rd 65000:100");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert!(record.error.unwrap().contains("65000:100"));
    }

    #[test]
    fn test_json_uses_wire_names_and_skips_empty_fields() {
        let record = AuditRecord::new(AuditCategory::NetworkConfig, "FibOrch", "tunnel_up")
            .with_outcome(AuditOutcome::Partial)
            .with_object_id("dpn-1->192.0.2.2")
            .with_details(serde_json::json!({ "drained": 3, "failed": 1 }));

        let value: serde_json::Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(value["category"], "NETWORK_CONFIG");
        assert_eq!(value["outcome"], "partial");
        assert_eq!(value["details"]["drained"], 3);
        assert!(value.get("error").is_none());
        assert!(value.get("object_type").is_none());
    }

    #[test]
    fn test_display_matches_serde() {
        for category in [AuditCategory::SystemLifecycle, AuditCategory::AdminAction] {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json.trim_matches('"'), category.to_string());
        }
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }
}
