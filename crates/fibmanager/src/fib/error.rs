//! FIB manager error type.

use fib_orch_common::{TaskError, TaskStatus};
use thiserror::Error;
use vpn_types::{DpnId, IpPrefix, RouteDistinguisher};

/// Error type for FIB reconciliation.
#[derive(Debug, Clone, Error)]
pub enum FibError {
    /// No VPN instance is configured for the route distinguisher.
    #[error("VPN id not resolvable for rd {0}")]
    VpnIdUnresolved(RouteDistinguisher),

    /// A collaborator (route source, membership, resolver) could not answer.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The flow programmer rejected an install or remove.
    #[error("Flow programming failed on {dpn} for {rd} {prefix}: {message}")]
    FlowProgramming {
        dpn: DpnId,
        rd: RouteDistinguisher,
        prefix: IpPrefix,
        message: String,
    },

    /// A route handler could not make sense of the entry.
    #[error("Invalid route {rd} {prefix}: {message}")]
    InvalidRoute {
        rd: RouteDistinguisher,
        prefix: IpPrefix,
        message: String,
    },
}

impl FibError {
    pub fn flow_programming(
        dpn: DpnId,
        rd: RouteDistinguisher,
        prefix: IpPrefix,
        message: impl Into<String>,
    ) -> Self {
        FibError::FlowProgramming {
            dpn,
            rd,
            prefix,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        FibError::DependencyUnavailable(message.into())
    }

    /// Classifies this error for daemon statistics.
    pub fn to_status(&self) -> TaskStatus {
        TaskError::from(self.clone()).to_status()
    }
}

impl From<FibError> for TaskError {
    fn from(err: FibError) -> Self {
        match err {
            FibError::VpnIdUnresolved(_) | FibError::DependencyUnavailable(_) => {
                TaskError::waiting_for(err.to_string())
            }
            FibError::FlowProgramming { .. } => TaskError::programming(err.to_string()),
            FibError::InvalidRoute { .. } => TaskError::invalid_entry(err.to_string()),
        }
    }
}

/// Result type for FIB operations.
pub type Result<T> = std::result::Result<T, FibError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let rd: RouteDistinguisher = "65000:100".parse().unwrap();
        let prefix: IpPrefix = "10.1.1.0/24".parse().unwrap();

        assert_eq!(
            FibError::VpnIdUnresolved(rd).to_status(),
            TaskStatus::WaitingForDependency
        );
        assert_eq!(
            FibError::flow_programming(DpnId(1), rd, prefix, "table full").to_status(),
            TaskStatus::Failed
        );
        assert_eq!(
            FibError::InvalidRoute {
                rd,
                prefix,
                message: "no paths".to_string()
            }
            .to_status(),
            TaskStatus::InvalidEntry
        );
    }

    #[test]
    fn test_error_display() {
        let err = FibError::flow_programming(
            DpnId(3),
            "65000:100".parse().unwrap(),
            "10.1.1.0/24".parse().unwrap(),
            "table full",
        );
        assert_eq!(
            err.to_string(),
            "Flow programming failed on dpn-3 for 65000:100 10.1.1.0/24: table full"
        );
    }
}
