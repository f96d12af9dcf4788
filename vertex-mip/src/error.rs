//! Error types for the MIP solver.

use thiserror::Error;

/// Errors that can occur during MIP solving.
#[derive(Error, Debug)]
pub enum MipError {
    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// The LP relaxation solver failed
    #[error("Relaxation solve failed: {0}")]
    RelaxationError(#[from] vertex_core::SolverError),

    /// Internal solver error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for MIP operations.
pub type MipResult<T> = Result<T, MipError>;
