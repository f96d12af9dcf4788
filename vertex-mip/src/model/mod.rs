//! MIP problem and solution types.

mod problem;
mod solution;

pub use problem::MipProblem;
pub use solution::{IncumbentTracker, MipSolution, MipStatus};
