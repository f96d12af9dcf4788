//! Error types for the LP solver.

use thiserror::Error;

/// Errors that can occur while building or solving a model.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Model data failed validation (dimensions, NaN, index range)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An index collection was non-monotonic or out of range
    #[error("Invalid index collection: {0}")]
    InvalidIndexCollection(String),

    /// A column or row has lower bound above its upper bound
    #[error("Infeasible bounds on {kind} {index}: [{lower}, {upper}]")]
    InfeasibleBounds {
        /// "column" or "row"
        kind: &'static str,
        /// Index of the offending column or row
        index: usize,
        /// Lower bound
        lower: f64,
        /// Upper bound
        upper: f64,
    },

    /// The basis matrix stayed singular after the maximum number of repairs
    #[error("Singular basis: column {column} has no acceptable pivot")]
    Singular {
        /// Basis position of the column that could not be pivoted
        column: usize,
    },

    /// The ratio test could not produce a dual-feasible step
    #[error("Dual ratio test failed after fallback")]
    RatioTestFailed,

    /// Solution or basis file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A basis file was malformed or did not match the host model
    #[error("Basis file error: {0}")]
    BasisFile(String),
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Coarse status returned to callers alongside detailed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Call completed as requested
    Ok,
    /// Call completed but something was adjusted (e.g. collapsed bounds)
    Warning,
    /// Call failed
    Error,
}
