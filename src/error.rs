//! Error taxonomy.
//!
//! Callee-local errors are recovered when the caller has a documented
//! alternative path; everything else is surfaced through this enum.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GridError>;

/// The tagged error enum shared by every fallible operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// `find`/`add` could not resolve a target object.
    #[error("unrecognized object: {0}")]
    UnrecognizedObject(String),

    /// `set`/`get` saw a parameter name no component accepts.
    #[error("unrecognized parameter: {0}")]
    UnrecognizedParameter(String),

    /// Syntactically recognized parameter, semantically out of range.
    #[error("invalid value for parameter {param}: {value}")]
    InvalidParameterValue { param: String, value: String },

    /// Naming conflict, duplicate insert, or wrong kind on `add`.
    #[error("failed to add object: {0}")]
    ObjectAddFailure(String),

    /// Inconsistent `locIndex` on `remove`.
    #[error("failed to remove object: {0}")]
    ObjectRemoveFailure(String),

    /// `updateObjectLinkages` after clone found no matching object in the new tree.
    #[error("failed to update linkage for cloned object: {0}")]
    ObjectUpdateFailure(String),

    /// The solver returned a non-success status.
    #[error("solver did not converge: {0}")]
    SolverConvergence(String),

    /// Topology cannot be solved — no slack bus in a connected network.
    #[error("no slack bus found in network partition {0}")]
    NoSlackBusFound(u32),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file incomplete: {0}")]
    FileIncomplete(String),

    #[error("failed to load file: {0}")]
    FileLoadFailure(String),
}

impl GridError {
    /// Process exit codes: 10-19 topology, 20-29 solver, 4-6 load-file.
    pub fn exit_code(&self) -> i32 {
        match self {
            GridError::NoSlackBusFound(_) => 10,
            GridError::SolverConvergence(_) => 20,
            GridError::FileNotFound(_) => 4,
            GridError::FileIncomplete(_) => 5,
            GridError::FileLoadFailure(_) => 6,
            GridError::UnrecognizedObject(_)
            | GridError::UnrecognizedParameter(_)
            | GridError::InvalidParameterValue { .. }
            | GridError::ObjectAddFailure(_)
            | GridError::ObjectRemoveFailure(_)
            | GridError::ObjectUpdateFailure(_) => 1,
        }
    }
}

/// Severity for the `Warning`/`Error` distinction used when logging a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable at the current call site.
    Warning,
    /// Fatal to the current action.
    Error,
}

/// Logs a [`GridError`] at the given severity: Warning for a soft, recovered
/// failure, Error when it is fatal to the current action.
pub fn log_error(err: &GridError, severity: Severity) {
    match severity {
        Severity::Warning => tracing::warn!(error = %err, "recovered from grid error"),
        Severity::Error => tracing::error!(error = %err, "fatal grid error"),
    }
}
