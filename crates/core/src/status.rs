//! Job lifecycle status machine.
//!
//! `pending -> processing -> {completed | failed | expired}`, with no exits
//! from terminal states. Every status write in the store goes through a
//! compare-and-set keyed on the expected current status, so an illegal edge
//! cannot be observed even when two workers race the same job.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle states for a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and token-reserved, not yet submitted to the provider.
    Pending,
    /// Submitted; status checks are scheduled.
    Processing,
    /// Asset persisted and the reservation consumed.
    Completed,
    /// Rejected, errored, or cancelled; the reservation was refunded.
    Failed,
    /// Poll ceiling exhausted without an answer; refunded.
    Expired,
}

impl JobStatus {
    /// Stable lowercase name, used for persistence and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        }
    }

    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        valid_transitions(self).is_empty()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "expired" => Ok(JobStatus::Expired),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Returns the set of valid target statuses reachable from `from`.
///
/// Terminal states (Completed, Failed, Expired) return an empty slice
/// because no further transitions are allowed.
pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
    match from {
        // Pending -> Processing (submitted), Failed (submit error or cancel)
        JobStatus::Pending => &[JobStatus::Processing, JobStatus::Failed],
        // Processing -> Completed, Failed, Expired
        JobStatus::Processing => &[
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Expired,
        ],
        // Terminal states
        JobStatus::Completed | JobStatus::Failed | JobStatus::Expired => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning a typed error for invalid ones.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_processing() {
        assert!(can_transition(JobStatus::Pending, JobStatus::Processing));
    }

    #[test]
    fn pending_to_failed() {
        assert!(can_transition(JobStatus::Pending, JobStatus::Failed));
    }

    #[test]
    fn processing_to_completed() {
        assert!(can_transition(JobStatus::Processing, JobStatus::Completed));
    }

    #[test]
    fn processing_to_failed() {
        assert!(can_transition(JobStatus::Processing, JobStatus::Failed));
    }

    #[test]
    fn processing_to_expired() {
        assert!(can_transition(JobStatus::Processing, JobStatus::Expired));
    }

    // -----------------------------------------------------------------------
    // Terminal states have no outgoing transitions
    // -----------------------------------------------------------------------

    #[test]
    fn completed_has_no_transitions() {
        assert!(valid_transitions(JobStatus::Completed).is_empty());
    }

    #[test]
    fn failed_has_no_transitions() {
        assert!(valid_transitions(JobStatus::Failed).is_empty());
    }

    #[test]
    fn expired_has_no_transitions() {
        assert!(valid_transitions(JobStatus::Expired).is_empty());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_completed_invalid() {
        assert!(!can_transition(JobStatus::Pending, JobStatus::Completed));
    }

    #[test]
    fn pending_to_expired_invalid() {
        assert!(!can_transition(JobStatus::Pending, JobStatus::Expired));
    }

    #[test]
    fn completed_to_processing_invalid() {
        assert!(!can_transition(JobStatus::Completed, JobStatus::Processing));
    }

    #[test]
    fn failed_to_pending_invalid() {
        assert!(!can_transition(JobStatus::Failed, JobStatus::Pending));
    }

    #[test]
    fn expired_to_completed_invalid() {
        assert!(!can_transition(JobStatus::Expired, JobStatus::Completed));
    }

    // -----------------------------------------------------------------------
    // validate_transition returns descriptive error
    // -----------------------------------------------------------------------

    #[test]
    fn validate_transition_ok() {
        assert!(validate_transition(JobStatus::Pending, JobStatus::Processing).is_ok());
    }

    #[test]
    fn validate_transition_err() {
        let err = validate_transition(JobStatus::Completed, JobStatus::Processing).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("processing"));
    }

    // -----------------------------------------------------------------------
    // Terminal flag and string round-trip
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_flags() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
    }

    #[test]
    fn as_str_parse_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Expired,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn parse_unknown_status_fails() {
        assert!("cancelled".parse::<JobStatus>().is_err());
    }
}
