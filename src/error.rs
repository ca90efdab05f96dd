//! Error taxonomy for package lifecycle operations.
//!
//! Functions return `anyhow::Result`; the domain failures below travel inside
//! `anyhow::Error` and can be recovered with `downcast_ref::<PackageError>()`.

use std::fmt;

use thiserror::Error;

use crate::solver::Action;

#[derive(Debug, Error)]
pub enum PackageError {
    /// Unknown package, status or file.
    #[error("{0}")]
    NotFound(String),

    /// Double install/uninstall, or an installer failed and was compensated.
    #[error("{message}")]
    InvalidState {
        message: String,
        #[source]
        source: Option<TransactionFailure>,
    },

    /// A requirement is missing, or an installed package still depends on the target.
    #[error("{0}")]
    DependencyConflict(String),

    #[error("Solution '{package}:{action}' is already added.")]
    DuplicateSolution { package: String, action: Action },

    #[error("Cyclic dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

impl PackageError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        PackageError::InvalidState {
            message: message.into(),
            source: None,
        }
    }

    /// The transaction failure wrapped by an `InvalidState`, if any.
    pub fn transaction(&self) -> Option<&TransactionFailure> {
        match self {
            PackageError::InvalidState { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}

/// Outcome of a failed installer transaction.
///
/// Carries the step that failed with its original error, plus every error
/// raised while compensating the installers that had already been applied.
/// The step is an installer id, or `registry` when the new status could not
/// be saved.
#[derive(Debug, Error)]
#[error("'{installer}' failed: {cause}")]
pub struct TransactionFailure {
    pub installer: String,
    #[source]
    pub cause: anyhow::Error,
    pub compensation_errors: Vec<CompensationError>,
}

impl TransactionFailure {
    pub fn is_clean(&self) -> bool {
        self.compensation_errors.is_empty()
    }
}

#[derive(Debug)]
pub struct CompensationError {
    pub installer: String,
    pub error: anyhow::Error,
}

impl fmt::Display for CompensationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.installer, self.error)
    }
}
