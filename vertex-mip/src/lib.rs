//! Branch-and-bound MIP solver over the vertex dual simplex engine.
//!
//! Each node solves the LP relaxation through a persistent
//! [`vertex_core::Solver`] (presolve off, warm-started by unfreezing the
//! parent's basis snapshot), checks integrality, and either updates the
//! incumbent or branches on a column selected by pseudocost score.
//!
//! # Example
//!
//! ```
//! use vertex_core::linalg::sparse::SparseMatrix;
//! use vertex_core::{Lp, ObjSense, VarType};
//! use vertex_mip::{solve_mip, MipSettings};
//!
//! // max 5a + 4b + 3c  s.t.  2a + 3b + c <= 4, binaries.
//! let mut lp = Lp::new(3, 1);
//! lp.sense = ObjSense::Maximize;
//! lp.col_cost = vec![5.0, 4.0, 3.0];
//! lp.col_upper = vec![1.0, 1.0, 1.0];
//! lp.row_upper = vec![4.0];
//! lp.a_matrix = SparseMatrix::from_triplets(1, 3, vec![(0, 0, 2.0), (0, 1, 3.0), (0, 2, 1.0)]);
//! lp.integrality = Some(vec![VarType::Integer; 3]);
//!
//! let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
//! assert!((solution.obj_val - 8.0).abs() < 1e-6);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod search;
pub mod settings;

pub use error::{MipError, MipResult};
pub use model::{IncumbentTracker, MipProblem, MipSolution, MipStatus};
pub use settings::{MipSettings, NodeSelection};

use log::debug;
use vertex_core::{Lp, ModelStatus, ObjSense, Solver};

use crate::search::{BranchAndBound, SearchNode};

/// Solve a mixed-integer program by branch-and-bound.
pub fn solve_mip(lp: &Lp, settings: &MipSettings) -> MipResult<MipSolution> {
    // Work in minimization; unfold at the end.
    let maximize = lp.sense == ObjSense::Maximize;
    let mut model = lp.clone();
    if maximize {
        for c in model.col_cost.iter_mut() {
            *c = -*c;
        }
        model.offset = -model.offset;
        model.sense = ObjSense::Minimize;
    }
    let prob = MipProblem::new(model.clone())?;

    let mut lp_options = settings.lp_options.clone();
    lp_options.presolve = false;
    let mut solver = Solver::new(model, lp_options)?;

    let mut tree = BranchAndBound::new(settings.clone(), prob.num_vars());
    tree.initialize(f64::NEG_INFINITY);

    let status = loop {
        if let Some(status) = tree.check_termination() {
            break status;
        }
        let Some(node) = tree.next_node() else {
            // check_termination covers the empty queue; defensive only.
            break if tree.incumbent.has_incumbent() {
                MipStatus::Optimal
            } else {
                MipStatus::Infeasible
            };
        };
        if node.can_prune(tree.incumbent.obj_val) {
            tree.node_pruned();
            continue;
        }

        let Some((lower, upper)) = apply_node_bounds(&mut solver, &prob, &node)? else {
            tree.node_pruned();
            continue;
        };
        if let Some(id) = node.frozen_basis {
            // A stale handle just means a cold start for this node.
            if solver.unfreeze_basis(id).is_err() {
                debug!("node {}: frozen basis handle no longer valid", node.id);
            }
        }

        let result = solver.solve()?;
        tree.node_explored(result.info.simplex_iterations);
        tree.log_progress();

        match result.status {
            ModelStatus::Optimal => {
                let obj = result.obj_value;
                if let Some(origin) = node.origin {
                    let objdelta = (obj - origin.parent_obj).max(0.0);
                    tree.branching
                        .pseudocost
                        .add_observation(origin.col, origin.delta, objdelta);
                }
                if obj >= tree.incumbent.obj_val - settings.gap_abs_tol {
                    if let Some(origin) = node.origin {
                        tree.branching
                            .pseudocost
                            .add_cutoff_observation(origin.col, origin.delta > 0.0);
                    }
                    tree.node_pruned();
                    continue;
                }
                if prob.is_integer_feasible(&result.col_value, settings.integrality_tol) {
                    let mut x = result.col_value.clone();
                    prob.round_integers(&mut x);
                    tree.update_incumbent(&x, obj);
                    continue;
                }
                let Some(decision) = tree.branching.select(
                    &result.col_value,
                    (&lower, &upper),
                    &prob,
                    settings.integrality_tol,
                ) else {
                    // Numerically integral after all.
                    let mut x = result.col_value.clone();
                    prob.round_integers(&mut x);
                    tree.update_incumbent(&x, obj);
                    continue;
                };
                if let Some(origin) = node.origin {
                    // One bound tightening per branch in this rule set.
                    tree.branching
                        .pseudocost
                        .add_inference_observation(origin.col, 1, origin.delta > 0.0);
                }
                let down_frozen = solver.freeze_basis();
                let up_frozen = solver.freeze_basis();
                tree.branch(&node, &decision, obj, (Some(down_frozen), Some(up_frozen)));
            }
            ModelStatus::Infeasible | ModelStatus::UnboundedOrInfeasible => {
                if node.depth == 0 && result.status == ModelStatus::UnboundedOrInfeasible {
                    break MipStatus::Unbounded;
                }
                if let Some(origin) = node.origin {
                    tree.branching
                        .pseudocost
                        .add_cutoff_observation(origin.col, origin.delta > 0.0);
                }
                tree.node_pruned();
            }
            ModelStatus::Unbounded => {
                break MipStatus::Unbounded;
            }
            ModelStatus::ReachedTimeLimit | ModelStatus::ReachedIterationLimit => {
                break MipStatus::TimeLimit;
            }
            other => {
                return Err(MipError::InternalError(format!(
                    "node {} relaxation ended with status {}",
                    node.id, other
                )));
            }
        }
    };

    let mut solution = tree.finalize(status);
    if solution.status == MipStatus::Unbounded {
        solution.obj_val = f64::NEG_INFINITY;
        solution.bound = f64::NEG_INFINITY;
        solution.x.clear();
    }
    if maximize {
        solution.obj_val = -solution.obj_val;
        solution.bound = -solution.bound;
    }
    Ok(solution)
}

/// Reset the integer columns to the node's bounds.
///
/// Returns the full working bound vectors, or `None` when a bound change
/// empties a domain.
fn apply_node_bounds(
    solver: &mut Solver,
    prob: &MipProblem,
    node: &SearchNode,
) -> MipResult<Option<(Vec<f64>, Vec<f64>)>> {
    let mut lower = prob.root_lb.clone();
    let mut upper = prob.root_ub.clone();
    for change in &node.bound_changes {
        lower[change.col] = lower[change.col].max(change.new_lb);
        upper[change.col] = upper[change.col].min(change.new_ub);
    }
    for &j in &prob.integer_vars {
        if lower[j] > upper[j] + 1e-9 {
            return Ok(None);
        }
        solver.set_col_bounds(j, lower[j], upper[j])?;
    }
    Ok(Some((lower, upper)))
}
