// ABOUTME: Custom error types for the app builder client
// ABOUTME: Provides the failure classes callers match on, with user-facing messages

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderError {
    /// The job-creation request was rejected or could not be sent.
    QueueFailed(String),
    /// The server reported the job as failed.
    JobFailed(String),
    /// The poll loop hit its attempt or duration bound.
    TimedOut { attempts: u32, elapsed: Duration },
    /// Too many status fetches failed in a row.
    Unreachable { consecutive_errors: u32, last_error: String },
    /// The poll loop was superseded or cancelled by the caller.
    Cancelled,
    InvalidForm(String),
    Config(String),
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuilderError::QueueFailed(msg) => write!(f, "Failed to queue job: {}", msg),
            BuilderError::JobFailed(msg) => write!(f, "Job failed: {}", msg),
            BuilderError::TimedOut { attempts, elapsed } => write!(
                f,
                "Gave up waiting for job after {} status checks ({:.1}s)",
                attempts,
                elapsed.as_secs_f64()
            ),
            BuilderError::Unreachable {
                consecutive_errors,
                last_error,
            } => write!(
                f,
                "Lost contact with the job service after {} failed status checks: {}",
                consecutive_errors, last_error
            ),
            BuilderError::Cancelled => write!(f, "Polling was cancelled"),
            BuilderError::InvalidForm(msg) => write!(f, "Invalid form: {}", msg),
            BuilderError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BuilderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_keeps_server_message() {
        let err = BuilderError::JobFailed("bad input".to_string());
        assert_eq!(err.to_string(), "Job failed: bad input");
    }

    #[test]
    fn test_timed_out_reports_attempts() {
        let err = BuilderError::TimedOut {
            attempts: 3,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Gave up waiting for job after 3 status checks (1.5s)"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = BuilderError::Cancelled.into();
        assert_eq!(
            err.downcast_ref::<BuilderError>(),
            Some(&BuilderError::Cancelled)
        );
    }
}
