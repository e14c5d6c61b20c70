//! Error types for the fleet orchestrator
//!
//! Every fallible core operation returns [`OrchestratorResult`]. Construction
//! errors (`Validation`, `EmptyTargetSet`) are raised before any state is
//! written; the remaining variants describe an action that is not legal for
//! the current state of a job, run or plan.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed or missing input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A plan was requested without any target host
    #[error("Validation failed: target server set is empty")]
    EmptyTargetSet,

    /// Action not legal for the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// State machine edge not in the allowed table
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A second run was started for a host that already has one running
    #[error("Host {host_id} already has a running host run ({run_id})")]
    DuplicateRun { host_id: String, run_id: String },

    /// Retry requested beyond the job's retry budget
    #[error("Job {job_id} exhausted its retries ({retry_count}/{max_retries})")]
    RetryExhausted {
        job_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    /// Failure reported by the external execution worker
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found<S: Into<String>>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's input rather than by stored state
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::EmptyTargetSet)
    }

    /// True for errors signalling a conflict with the current state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::InvalidTransition { .. }
                | Self::DuplicateRun { .. }
                | Self::RetryExhausted { .. }
        )
    }
}
