//! Vertex: a revised dual simplex solver for linear programming.
//!
//! The solver minimizes `c^T x + offset` subject to two-sided row and
//! column bounds, with the constraint matrix in CSC format. The core is a
//! revised dual simplex with:
//!
//! - a Markowitz-style sparse LU factorization of the basis with
//!   product-form rank-one updates and refactorization triggers;
//! - Devex pricing and a two-pass Harris ratio test with bound flipping;
//! - a presolve/postsolve pair and matrix equilibration;
//! - a persistent [`Solver`] with basis freezing for warm-started
//!   re-solves, which the `vertex-mip` crate drives for branch-and-bound.
//!
//! # Example
//!
//! ```
//! use vertex_core::{solve, Lp, Options};
//! use vertex_core::linalg::sparse::SparseMatrix;
//!
//! // min x  s.t.  x + y >= 2, 0 <= x, y <= 10
//! let mut lp = Lp::new(2, 1);
//! lp.col_cost = vec![1.0, 0.0];
//! lp.col_upper = vec![10.0, 10.0];
//! lp.row_lower = vec![2.0];
//! lp.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
//!
//! let result = solve(&lp, &Options::default()).unwrap();
//! println!("{}: obj {}", result.status, result.obj_value);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod error;
pub mod io;
pub mod linalg;
pub mod postsolve;
pub mod presolve;
pub mod problem;
pub mod scaling;
pub mod simplex;

pub use driver::{solve, Solver};
pub use error::{SolverError, SolverResult, Status};
pub use presolve::PresolveStatus;
pub use problem::{
    Lp, ModelStatus, ObjSense, Options, SolveInfo, SolveResult, VarType,
};
pub use simplex::{BasisStatus, SimplexBasis};
