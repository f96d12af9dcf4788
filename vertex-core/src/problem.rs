//! Model data structures, options and statuses.
//!
//! This module defines the canonical LP representation consumed by the
//! solver, the option set, and the result types.

use std::fmt;

use sprs::CsMat;

use crate::error::{SolverError, SolverResult, Status};
use crate::linalg::sparse::SparseMatrix;
use crate::simplex::basis::SimplexBasis;

/// Objective sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjSense {
    /// Minimize the objective
    #[default]
    Minimize,
    /// Maximize the objective
    Maximize,
}

/// Variable integrality tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarType {
    /// Continuous variable
    #[default]
    Continuous,
    /// Integer-constrained variable
    Integer,
}

/// Linear (or convex-quadratic) program:
///
/// ```text
/// minimize    c^T x + (1/2) x^T Q x + offset
/// subject to  row_lower <= A x <= row_upper
///             col_lower <=   x <= col_upper
/// ```
///
/// Structural columns are indexed `0..num_col`; the solver appends one
/// logical per row internally. `Q` is optional; `Q = None` is a pure LP,
/// which is the only form the simplex driver solves.
#[derive(Debug, Clone, Default)]
pub struct Lp {
    /// Number of structural columns
    pub num_col: usize,
    /// Number of rows
    pub num_row: usize,
    /// Objective coefficients (length num_col)
    pub col_cost: Vec<f64>,
    /// Constant objective offset
    pub offset: f64,
    /// Column lower bounds
    pub col_lower: Vec<f64>,
    /// Column upper bounds
    pub col_upper: Vec<f64>,
    /// Row lower bounds
    pub row_lower: Vec<f64>,
    /// Row upper bounds
    pub row_upper: Vec<f64>,
    /// Constraint matrix, num_row x num_col, CSC
    pub a_matrix: SparseMatrix,
    /// Optional quadratic objective term, num_col x num_col, CSC
    pub q_matrix: Option<SparseMatrix>,
    /// Optional integrality tags (length num_col)
    pub integrality: Option<Vec<VarType>>,
    /// Objective sense
    pub sense: ObjSense,
    /// Model name, used in reports
    pub name: String,
}

impl Lp {
    /// Create an LP of the given shape with free rows and `[0, +inf)`
    /// columns of zero cost.
    pub fn new(num_col: usize, num_row: usize) -> Self {
        Self {
            num_col,
            num_row,
            col_cost: vec![0.0; num_col],
            offset: 0.0,
            col_lower: vec![0.0; num_col],
            col_upper: vec![f64::INFINITY; num_col],
            row_lower: vec![f64::NEG_INFINITY; num_row],
            row_upper: vec![f64::INFINITY; num_row],
            a_matrix: SparseMatrix::new(num_row, num_col),
            q_matrix: None,
            integrality: None,
            sense: ObjSense::Minimize,
            name: String::new(),
        }
    }

    /// Build an LP around an existing `sprs` matrix.
    pub fn with_matrix(mat: &CsMat<f64>) -> Self {
        let mut lp = Self::new(mat.cols(), mat.rows());
        lp.a_matrix = SparseMatrix::from_csmat(mat);
        lp
    }

    /// Total number of variables including logicals.
    pub fn num_tot(&self) -> usize {
        self.num_col + self.num_row
    }

    /// Whether any column carries an integrality tag.
    pub fn is_mip(&self) -> bool {
        self.integrality
            .as_ref()
            .map(|tags| tags.iter().any(|&t| t == VarType::Integer))
            .unwrap_or(false)
    }

    /// Validate and canonicalize the model in place.
    ///
    /// - dimension and NaN checks are fatal;
    /// - a cost at or above `infinite_cost` is fatal;
    /// - bounds with magnitude at or above `infinite_bound` become infinite;
    /// - a bound gap within the primal tolerance collapses to the midpoint
    ///   (reported as a warning), a crossing beyond it is fatal;
    /// - matrix entries are filtered against the matrix value range.
    pub fn assess(&mut self, options: &Options) -> SolverResult<Status> {
        let n = self.num_col;
        let m = self.num_row;
        if self.col_cost.len() != n
            || self.col_lower.len() != n
            || self.col_upper.len() != n
            || self.row_lower.len() != m
            || self.row_upper.len() != m
        {
            return Err(SolverError::InvalidInput(format!(
                "vector lengths disagree with model shape {}x{}",
                m, n
            )));
        }
        if self.a_matrix.num_row != m || self.a_matrix.num_col != n {
            return Err(SolverError::InvalidInput(format!(
                "matrix is {}x{}, model is {}x{}",
                self.a_matrix.num_row, self.a_matrix.num_col, m, n
            )));
        }
        if let Some(tags) = &self.integrality {
            if tags.len() != n {
                return Err(SolverError::InvalidInput(format!(
                    "integrality has length {}, expected {}",
                    tags.len(),
                    n
                )));
            }
        }
        if let Some(q) = &self.q_matrix {
            if q.num_row != n || q.num_col != n {
                return Err(SolverError::InvalidInput(format!(
                    "quadratic term is {}x{}, expected {}x{}",
                    q.num_row, q.num_col, n, n
                )));
            }
        }

        for (j, &c) in self.col_cost.iter().enumerate() {
            if c.is_nan() {
                return Err(SolverError::InvalidInput(format!("cost {} is NaN", j)));
            }
            if c.abs() >= options.infinite_cost {
                return Err(SolverError::InvalidInput(format!(
                    "cost {} has magnitude {} at or above infinite_cost",
                    j, c
                )));
            }
        }

        let mut status = Status::Ok;
        let tol = options.primal_feasibility_tol;
        let inf = options.infinite_bound;
        let mut fix_bounds = |lower: &mut f64, upper: &mut f64, kind, index| {
            if lower.is_nan() || upper.is_nan() {
                return Err(SolverError::InvalidInput(format!(
                    "{} {} has NaN bound",
                    kind, index
                )));
            }
            if *lower <= -inf {
                *lower = f64::NEG_INFINITY;
            }
            if *upper >= inf {
                *upper = f64::INFINITY;
            }
            if *lower > *upper {
                if *lower - *upper <= tol {
                    let mid = 0.5 * (*lower + *upper);
                    *lower = mid;
                    *upper = mid;
                    status = Status::Warning;
                } else {
                    return Err(SolverError::InfeasibleBounds {
                        kind,
                        index,
                        lower: *lower,
                        upper: *upper,
                    });
                }
            }
            Ok(())
        };
        for j in 0..n {
            fix_bounds(&mut self.col_lower[j], &mut self.col_upper[j], "column", j)?;
        }
        for i in 0..m {
            fix_bounds(&mut self.row_lower[i], &mut self.row_upper[i], "row", i)?;
        }

        let dropped = self
            .a_matrix
            .assess(options.small_matrix_value, options.large_matrix_value)?;
        if dropped > 0 {
            log::debug!("assess dropped {} small matrix entries", dropped);
            status = Status::Warning;
        }
        if let Some(q) = &mut self.q_matrix {
            q.assess(options.small_matrix_value, options.large_matrix_value)?;
        }
        Ok(status)
    }
}

/// Solver options.
///
/// Passed by reference everywhere; there is no global state.
#[derive(Debug, Clone)]
pub struct Options {
    /// Run presolve before the simplex solve
    pub presolve: bool,
    /// Equilibrate the constraint matrix for the factorization
    pub scaling: bool,
    /// Wall-clock limit in seconds (None = unlimited)
    pub time_limit: Option<f64>,
    /// Simplex iteration limit (None = unlimited)
    pub iteration_limit: Option<u64>,
    /// Primal feasibility tolerance
    pub primal_feasibility_tol: f64,
    /// Dual feasibility tolerance
    pub dual_feasibility_tol: f64,
    /// Bounds at or above this magnitude are treated as infinite
    pub infinite_bound: f64,
    /// Costs at or above this magnitude are an input error
    pub infinite_cost: f64,
    /// Matrix entries at or below this magnitude are dropped
    pub small_matrix_value: f64,
    /// Matrix entries above this magnitude are an input error
    pub large_matrix_value: f64,
    /// Relative pivot stability threshold for the factorization
    pub pivot_tol: f64,
    /// Product-form updates between refactorizations
    pub update_limit: usize,
    /// Iterations between full dual-objective recomputations
    pub dual_objective_resync_iters: u64,
    /// Verify B against the basic columns after each invert (debug)
    pub debug_check_invert: bool,
    /// Log solve progress
    pub verbose: bool,
    /// Iterations between progress log lines
    pub log_freq: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            presolve: true,
            scaling: true,
            time_limit: None,
            iteration_limit: None,
            primal_feasibility_tol: 1e-7,
            dual_feasibility_tol: 1e-7,
            infinite_bound: 1e20,
            infinite_cost: 1e20,
            small_matrix_value: 1e-9,
            large_matrix_value: 1e15,
            pivot_tol: 0.1,
            update_limit: 100,
            dual_objective_resync_iters: 1000,
            debug_check_invert: false,
            verbose: false,
            log_freq: 100,
        }
    }
}

impl Options {
    /// Set a wall-clock limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set a simplex iteration limit.
    pub fn with_iteration_limit(mut self, iterations: u64) -> Self {
        self.iteration_limit = Some(iterations);
        self
    }

    /// Disable presolve.
    pub fn without_presolve(mut self) -> Self {
        self.presolve = false;
        self
    }
}

/// Model status after a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelStatus {
    /// No solve has run
    #[default]
    NotSet,
    /// Optimal solution found
    Optimal,
    /// Primal infeasible
    Infeasible,
    /// Dual infeasible; unbounded if a feasible point exists
    UnboundedOrInfeasible,
    /// Primal unbounded
    Unbounded,
    /// Wall-clock limit reached
    ReachedTimeLimit,
    /// Iteration limit reached
    ReachedIterationLimit,
    /// The solve failed numerically
    SolveError,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::NotSet => write!(f, "Not set"),
            ModelStatus::Optimal => write!(f, "Optimal"),
            ModelStatus::Infeasible => write!(f, "Infeasible"),
            ModelStatus::UnboundedOrInfeasible => write!(f, "Unbounded or infeasible"),
            ModelStatus::Unbounded => write!(f, "Unbounded"),
            ModelStatus::ReachedTimeLimit => write!(f, "Time limit reached"),
            ModelStatus::ReachedIterationLimit => write!(f, "Iteration limit reached"),
            ModelStatus::SolveError => write!(f, "Solve error"),
        }
    }
}

/// Solution and diagnostics of one solve.
#[derive(Debug, Clone, Default)]
pub struct SolveResult {
    /// Model status
    pub status: ModelStatus,
    /// Column values
    pub col_value: Vec<f64>,
    /// Column reduced costs
    pub col_dual: Vec<f64>,
    /// Row activities
    pub row_value: Vec<f64>,
    /// Row duals
    pub row_dual: Vec<f64>,
    /// Final basis
    pub basis: SimplexBasis,
    /// Objective value (original sense, including offset)
    pub obj_value: f64,
    /// Solve diagnostics
    pub info: SolveInfo,
}

/// Detailed solve information.
#[derive(Debug, Clone, Default)]
pub struct SolveInfo {
    /// Simplex iterations across all phases
    pub simplex_iterations: u64,
    /// Iterations spent establishing dual feasibility
    pub phase1_iterations: u64,
    /// Number of basis factorizations
    pub invert_count: u64,
    /// Number of primal infeasibilities at termination
    pub num_primal_infeasibilities: usize,
    /// Largest primal infeasibility at termination
    pub max_primal_infeasibility: f64,
    /// Number of dual infeasibilities at termination
    pub num_dual_infeasibilities: usize,
    /// Largest dual infeasibility at termination
    pub max_dual_infeasibility: f64,
    /// Wall-clock solve time in milliseconds
    pub solve_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_promotes_infinite_bounds() {
        let mut lp = Lp::new(1, 1);
        lp.col_upper[0] = 2e20;
        lp.row_lower[0] = -3e20;
        let status = lp.assess(&Options::default()).expect("valid model");
        assert_eq!(status, Status::Ok);
        assert!(lp.col_upper[0].is_infinite());
        assert!(lp.row_lower[0].is_infinite());
    }

    #[test]
    fn test_assess_collapses_near_equal_bounds() {
        let mut lp = Lp::new(1, 0);
        lp.col_lower[0] = 1.0 + 5e-8;
        lp.col_upper[0] = 1.0;
        let status = lp.assess(&Options::default()).expect("within tolerance");
        assert_eq!(status, Status::Warning);
        assert_eq!(lp.col_lower[0], lp.col_upper[0]);
    }

    #[test]
    fn test_assess_rejects_crossed_bounds() {
        let mut lp = Lp::new(1, 0);
        lp.col_lower[0] = 2.0;
        lp.col_upper[0] = 1.0;
        assert!(matches!(
            lp.assess(&Options::default()),
            Err(SolverError::InfeasibleBounds { .. })
        ));
    }

    #[test]
    fn test_assess_rejects_infinite_cost() {
        let mut lp = Lp::new(1, 0);
        lp.col_cost[0] = 1e20;
        assert!(lp.assess(&Options::default()).is_err());
    }

    #[test]
    fn test_assess_rejects_nan() {
        let mut lp = Lp::new(1, 0);
        lp.col_lower[0] = f64::NAN;
        assert!(lp.assess(&Options::default()).is_err());
    }

    #[test]
    fn test_is_mip() {
        let mut lp = Lp::new(2, 0);
        assert!(!lp.is_mip());
        lp.integrality = Some(vec![VarType::Continuous, VarType::Integer]);
        assert!(lp.is_mip());
    }
}
