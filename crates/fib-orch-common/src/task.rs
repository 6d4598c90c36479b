//! Notification outcome classification.

use std::fmt;
use thiserror::Error;

/// How processing one notification ended, as counted by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Success,
    /// The notification itself was malformed.
    InvalidEntry,
    /// A device rejected a flow, or the task panicked.
    Failed,
    /// Nothing to do: no handler claimed the route, or it did not change.
    Ignore,
    /// A collaborator could not answer; the producer may resend later.
    WaitingForDependency,
}

impl TaskStatus {
    /// True for outcomes that leave forwarding state as intended.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::InvalidEntry => "invalid_entry",
            TaskStatus::Failed => "failed",
            TaskStatus::Ignore => "ignore",
            TaskStatus::WaitingForDependency => "waiting_for_dependency",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a notification task, reduced to what the daemon counts.
///
/// Domain errors convert into this with `From` so the daemon can classify
/// them without knowing their variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Flow programming failed: {0}")]
    Programming(String),

    #[error("Waiting for dependency: {0}")]
    WaitingForDependency(String),
}

impl TaskError {
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        TaskError::InvalidEntry(message.into())
    }

    pub fn programming(message: impl Into<String>) -> Self {
        TaskError::Programming(message.into())
    }

    pub fn waiting_for(dependency: impl Into<String>) -> Self {
        TaskError::WaitingForDependency(dependency.into())
    }

    pub fn to_status(&self) -> TaskStatus {
        match self {
            TaskError::InvalidEntry(_) => TaskStatus::InvalidEntry,
            TaskError::Programming(_) => TaskStatus::Failed,
            TaskError::WaitingForDependency(_) => TaskStatus::WaitingForDependency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_and_ignore_are_not_failures() {
        assert!(TaskStatus::Success.is_success());
        assert!(TaskStatus::Ignore.is_success());
        for status in [
            TaskStatus::InvalidEntry,
            TaskStatus::Failed,
            TaskStatus::WaitingForDependency,
        ] {
            assert!(status.is_failure(), "{} should be a failure", status);
        }
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            TaskError::invalid_entry("update replaces another prefix").to_status(),
            TaskStatus::InvalidEntry
        );
        assert_eq!(
            TaskError::programming("dpn-1 rejected flow").to_status(),
            TaskStatus::Failed
        );
        assert_eq!(
            TaskError::waiting_for("vpn-id resolver").to_status(),
            TaskStatus::WaitingForDependency
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            TaskError::waiting_for("route source").to_string(),
            "Waiting for dependency: route source"
        );
    }
}
