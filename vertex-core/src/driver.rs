//! Solve orchestration: assess, presolve, scale, simplex, postsolve.
//!
//! [`solve`] is the one-shot entry point. [`Solver`] keeps the engine alive
//! between solves for warm starts, bound and cost changes, and basis
//! freezing; the branch-and-bound layer drives node solves through it (with
//! presolve off, since bound changes would invalidate the reductions).

use std::time::Instant;

use log::{debug, info};

use crate::error::{SolverError, SolverResult};
use crate::postsolve::Postsolve;
use crate::presolve::{presolve, PresolveStatus};
use crate::problem::{Lp, ModelStatus, ObjSense, Options, SolveResult};
use crate::scaling::{equilibrate, Scale, DEFAULT_SCALE_ITERS};
use crate::simplex::basis::SimplexBasis;
use crate::simplex::engine::DualSimplex;

/// Solve an LP to a terminal status.
pub fn solve(lp: &Lp, options: &Options) -> SolverResult<SolveResult> {
    let start = Instant::now();
    let mut model = lp.clone();
    model.assess(options)?;
    reject_quadratic(&model)?;
    fold_sense(&mut model);

    let (reduced, postsolve, presolve_status) = if options.presolve {
        let result = presolve(&model, options)?;
        match result.status {
            PresolveStatus::Infeasible => {
                return Ok(terminal_result(lp, ModelStatus::Infeasible, start));
            }
            PresolveStatus::Unbounded => {
                return Ok(terminal_result(lp, ModelStatus::Unbounded, start));
            }
            status => (result.lp, result.postsolve, status),
        }
    } else {
        (model.clone(), Postsolve::identity(&model), PresolveStatus::NotReduced)
    };

    let reduced_result = if presolve_status == PresolveStatus::ReducedToEmpty {
        debug!("presolve reduced the model to empty");
        SolveResult {
            status: ModelStatus::Optimal,
            basis: SimplexBasis::logical(reduced.num_col, reduced.num_row),
            col_value: vec![0.0; reduced.num_col],
            col_dual: vec![0.0; reduced.num_col],
            row_value: vec![0.0; reduced.num_row],
            row_dual: vec![0.0; reduced.num_row],
            ..Default::default()
        }
    } else {
        let scale = if options.scaling {
            equilibrate(&reduced.a_matrix, DEFAULT_SCALE_ITERS)
        } else {
            Scale::identity(reduced.num_col, reduced.num_row)
        };
        let mut engine = DualSimplex::new(&reduced, scale, options);
        let status = engine.solve(options.time_limit, options.iteration_limit)?;
        extract_result(&engine, &reduced, status)
    };

    let mut result = postsolve.restore(&model, &reduced_result);
    unfold_sense(lp.sense, &mut result);
    result.info.solve_time_ms = start.elapsed().as_millis() as u64;
    if options.verbose {
        info!(
            "model {}: {} after {} iterations ({} ms)",
            lp.name,
            result.status,
            result.info.simplex_iterations,
            result.info.solve_time_ms
        );
    }
    Ok(result)
}

/// A persistent solver: repeated solves over one model with bound and cost
/// changes, warm starts and basis freezing.
///
/// Presolve is not applied here; the caller owns the model shape.
pub struct Solver {
    lp: Lp,
    sense: ObjSense,
    options: Options,
    engine: DualSimplex,
}

impl Solver {
    /// Assess the model and set up the engine.
    pub fn new(lp: Lp, options: Options) -> SolverResult<Self> {
        let mut model = lp;
        model.assess(&options)?;
        reject_quadratic(&model)?;
        let sense = model.sense;
        fold_sense(&mut model);
        let scale = if options.scaling {
            equilibrate(&model.a_matrix, DEFAULT_SCALE_ITERS)
        } else {
            Scale::identity(model.num_col, model.num_row)
        };
        let engine = DualSimplex::new(&model, scale, &options);
        Ok(Self {
            lp: model,
            sense,
            options,
            engine,
        })
    }

    /// The (sense-folded) model being solved.
    pub fn lp(&self) -> &Lp {
        &self.lp
    }

    /// Solve from the current basis.
    pub fn solve(&mut self) -> SolverResult<SolveResult> {
        let start = Instant::now();
        let status = self
            .engine
            .solve(self.options.time_limit, self.options.iteration_limit)?;
        let mut result = extract_result(&self.engine, &self.lp, status);
        unfold_sense(self.sense, &mut result);
        result.info.solve_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Snapshot the current basis and update region.
    pub fn freeze_basis(&mut self) -> i32 {
        self.engine.freeze_basis()
    }

    /// Restore a frozen basis for the next solve.
    pub fn unfreeze_basis(&mut self, id: i32) -> SolverResult<()> {
        self.engine.unfreeze_basis(id)
    }

    /// Install an explicit starting basis.
    pub fn set_basis(&mut self, basis: SimplexBasis) -> SolverResult<()> {
        self.engine.set_basis(basis)
    }

    /// Change the bounds of a structural column.
    pub fn set_col_bounds(&mut self, col: usize, lower: f64, upper: f64) -> SolverResult<()> {
        if col >= self.lp.num_col {
            return Err(SolverError::InvalidInput(format!(
                "column {} out of range",
                col
            )));
        }
        if lower > upper {
            return Err(SolverError::InfeasibleBounds {
                kind: "column",
                index: col,
                lower,
                upper,
            });
        }
        self.lp.col_lower[col] = lower;
        self.lp.col_upper[col] = upper;
        self.engine.set_variable_bounds(col, lower, upper);
        Ok(())
    }

    /// Change the cost of a structural column (in the model's own sense).
    pub fn set_col_cost(&mut self, col: usize, cost: f64) -> SolverResult<()> {
        if col >= self.lp.num_col {
            return Err(SolverError::InvalidInput(format!(
                "column {} out of range",
                col
            )));
        }
        let folded = match self.sense {
            ObjSense::Minimize => cost,
            ObjSense::Maximize => -cost,
        };
        self.lp.col_cost[col] = folded;
        self.engine.set_variable_cost(col, folded);
        Ok(())
    }

    /// Number of factorizations performed so far.
    pub fn invert_count(&self) -> u64 {
        self.engine.invert_count
    }

    /// Number of simplex iterations performed so far.
    pub fn iteration_count(&self) -> u64 {
        self.engine.iteration_count
    }
}

fn reject_quadratic(lp: &Lp) -> SolverResult<()> {
    if let Some(q) = &lp.q_matrix {
        if q.nnz() > 0 {
            return Err(SolverError::InvalidInput(
                "quadratic objective is not supported by the simplex solver".to_string(),
            ));
        }
    }
    Ok(())
}

/// Fold a maximization into minimization by negating the costs.
fn fold_sense(lp: &mut Lp) {
    if lp.sense == ObjSense::Maximize {
        for c in lp.col_cost.iter_mut() {
            *c = -*c;
        }
        lp.offset = -lp.offset;
    }
}

/// Report objective and duals in the model's original sense.
fn unfold_sense(sense: ObjSense, result: &mut SolveResult) {
    if sense == ObjSense::Maximize {
        result.obj_value = -result.obj_value;
        for d in result.col_dual.iter_mut() {
            *d = -*d;
        }
        for d in result.row_dual.iter_mut() {
            *d = -*d;
        }
    }
}

/// Read the engine's terminal state into a `SolveResult` in the (reduced)
/// model space.
fn extract_result(engine: &DualSimplex, lp: &Lp, status: ModelStatus) -> SolveResult {
    let n = lp.num_col;
    let m = lp.num_row;
    let mut result = SolveResult {
        status,
        col_value: vec![0.0; n],
        col_dual: vec![0.0; n],
        row_value: vec![0.0; m],
        row_dual: vec![0.0; m],
        basis: engine.basis.clone(),
        ..Default::default()
    };
    for j in 0..n {
        result.col_value[j] = engine.variable_value(j);
        result.col_dual[j] = engine.variable_dual(j);
    }
    for i in 0..m {
        // A x + s = 0, so the activity is the negated logical value.
        result.row_value[i] = -engine.variable_value(n + i);
        result.row_dual[i] = -engine.variable_dual(n + i);
    }
    let mut obj = 0.0;
    for j in 0..n {
        obj += lp.col_cost[j] * result.col_value[j];
    }
    result.obj_value = obj + lp.offset;

    let (num_primal, max_primal, num_dual, max_dual) = engine.infeasibility_stats();
    result.info.simplex_iterations = engine.iteration_count;
    result.info.phase1_iterations = engine.phase1_iterations;
    result.info.invert_count = engine.invert_count;
    result.info.num_primal_infeasibilities = num_primal;
    result.info.max_primal_infeasibility = max_primal;
    result.info.num_dual_infeasibilities = num_dual;
    result.info.max_dual_infeasibility = max_dual;
    result
}

fn terminal_result(lp: &Lp, status: ModelStatus, start: Instant) -> SolveResult {
    let mut result = SolveResult {
        status,
        col_value: vec![0.0; lp.num_col],
        col_dual: vec![0.0; lp.num_col],
        row_value: vec![0.0; lp.num_row],
        row_dual: vec![0.0; lp.num_row],
        basis: SimplexBasis::logical(lp.num_col, lp.num_row),
        obj_value: 0.0,
        info: Default::default(),
    };
    result.info.solve_time_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::SparseMatrix;

    /// min x s.t. 1 <= x <= 10: presolve fixes nothing, simplex returns 1.
    #[test]
    fn test_trivial_lp() {
        let mut lp = Lp::new(1, 1);
        lp.col_cost = vec![1.0];
        lp.col_lower = vec![1.0];
        lp.col_upper = vec![10.0];
        lp.row_lower = vec![f64::NEG_INFINITY];
        lp.row_upper = vec![100.0];
        lp.a_matrix = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]);

        let result = solve(&lp, &Options::default()).expect("solves");
        assert_eq!(result.status, ModelStatus::Optimal);
        assert!((result.col_value[0] - 1.0).abs() < 1e-7);
        assert!((result.obj_value - 1.0).abs() < 1e-7);
    }

    /// Maximization folds and unfolds the sense.
    #[test]
    fn test_maximize_sense() {
        let mut lp = Lp::new(1, 1);
        lp.sense = ObjSense::Maximize;
        lp.col_cost = vec![2.0];
        lp.col_lower = vec![0.0];
        lp.col_upper = vec![3.0];
        lp.row_lower = vec![f64::NEG_INFINITY];
        lp.row_upper = vec![50.0];
        lp.a_matrix = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]);

        let result = solve(&lp, &Options::default()).expect("solves");
        assert_eq!(result.status, ModelStatus::Optimal);
        assert!((result.col_value[0] - 3.0).abs() < 1e-7);
        assert!((result.obj_value - 6.0).abs() < 1e-7);
    }

    /// Quadratic objectives are rejected with a specific error.
    #[test]
    fn test_quadratic_rejected() {
        let mut lp = Lp::new(1, 0);
        lp.q_matrix = Some(SparseMatrix::from_triplets(1, 1, vec![(0, 0, 2.0)]));
        assert!(matches!(
            solve(&lp, &Options::default()),
            Err(SolverError::InvalidInput(_))
        ));
    }

    /// Warm start through the persistent solver: perturb a cost, re-solve
    /// from the frozen basis in few iterations.
    #[test]
    fn test_solver_warm_start() {
        let mut lp = Lp::new(2, 2);
        lp.col_cost = vec![1.0, 2.0];
        lp.col_lower = vec![0.0, 0.0];
        lp.col_upper = vec![10.0, 10.0];
        lp.row_lower = vec![1.0, 1.0];
        lp.row_upper = vec![f64::INFINITY, f64::INFINITY];
        lp.a_matrix = SparseMatrix::from_triplets(
            2,
            2,
            vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 2.0)],
        );

        let mut solver = Solver::new(lp, Options::default()).expect("valid model");
        let first = solver.solve().expect("solves");
        assert_eq!(first.status, ModelStatus::Optimal);

        let frozen = solver.freeze_basis();
        solver.set_col_cost(0, 1.0 + 1e-3).expect("in range");
        solver.unfreeze_basis(frozen).expect("valid handle");
        let iterations_before = solver.iteration_count();
        let second = solver.solve().expect("solves");
        assert_eq!(second.status, ModelStatus::Optimal);
        // A tiny cost perturbation must not move the optimal basis.
        let extra = solver.iteration_count() - iterations_before;
        assert!(extra <= 2, "warm start took {} iterations", extra);
        assert!((second.col_value[0] - first.col_value[0]).abs() < 1e-7);
    }
}
