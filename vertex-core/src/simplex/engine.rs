//! Dual simplex engine.
//!
//! One iteration runs the pipeline price (CHUZR) -> BTRAN -> row formation
//! -> ratio test (CHUZC) -> FTRAN -> primal/dual/weight updates -> basis
//! update, committing all state at the iteration boundary or rolling the
//! iteration back entirely on numerical trouble. The caller pumps
//! [`DualSimplex::iterate`] in a loop, observing budgets and refactorization
//! requests between iterations; [`DualSimplex::solve`] is that pump.
//!
//! Dual feasibility of the start point is arranged by bound choice; free or
//! one-sided variables that cannot be made dual feasible receive temporary
//! phase-1 bounds which are withdrawn (or diagnosed as unboundedness) at
//! optimality of the relaxation.

use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, info, warn};

use crate::error::{SolverError, SolverResult};
use crate::linalg::eta::UpdateStatus;
use crate::linalg::factor::FactorError;
use crate::linalg::hvector::HVector;
use crate::linalg::sparse::SparseMatrix;
use crate::problem::{Lp, ModelStatus, Options};
use crate::scaling::Scale;
use crate::simplex::basis::{BasisStatus, SimplexBasis};
use crate::simplex::dual_row::{ChuzcFailure, DualRow};
use crate::simplex::nla::Nla;

/// Magnitude of the temporary bounds installed for phase 1.
const PHASE1_BOUND: f64 = 1e7;

/// Devex weights are reset once the reference weight grows past this.
const DEVEX_RESET_WEIGHT: f64 = 1e7;

/// Relative disagreement between the row- and column-wise pivot values that
/// triggers a refactorization.
const ALPHA_VERIFY_TOL: f64 = 1e-7;

/// Outcome of one pumped iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The iteration committed; keep pumping
    Iterated,
    /// No primal infeasibility found
    Optimal,
    /// The iteration rolled back; refactorize before pumping again
    RefactorAndRetry,
    /// The ratio test proved the chosen row cannot be satisfied
    Infeasible,
    /// The ratio test failed even after fallback on a fresh factorization
    RatioTestFailed,
}

/// Simplex phase: phase 1 runs with temporary bounds installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplexPhase {
    /// Attaining dual feasibility under auxiliary bounds
    One,
    /// Optimizing the true problem
    Two,
}

/// Revised dual simplex engine.
///
/// Owns the basis, the NLA layer (factor + updates + frozen bases), the work
/// arrays over the `num_col + num_row` variable set, and the pricing
/// weights. The LP data is copied in at [`DualSimplex::new`]; the engine
/// works in unscaled quantities while the NLA layer factorizes scaled ones.
pub struct DualSimplex {
    num_col: usize,
    num_row: usize,
    num_tot: usize,

    a_cols: SparseMatrix,
    a_rows: SparseMatrix,

    /// Working lower bounds over all variables
    pub work_lower: Vec<f64>,
    /// Working upper bounds
    pub work_upper: Vec<f64>,
    /// Bound ranges (upper minus lower)
    pub work_range: Vec<f64>,
    /// Working costs
    pub work_cost: Vec<f64>,
    /// Values of the nonbasic variables
    pub work_value: Vec<f64>,
    /// +1 at lower, -1 at upper, 0 basic/fixed/free
    pub nonbasic_move: Vec<i8>,
    /// Reduced costs
    pub work_dual: Vec<f64>,

    /// Basis status vector and base_index
    pub basis: SimplexBasis,
    /// Values of the basic variables, by row
    pub baseval: Vec<f64>,
    baselo: Vec<f64>,
    baseup: Vec<f64>,

    edge_weight: Vec<f64>,
    devex_index: Vec<i8>,
    permutation: Vec<usize>,
    free_list: BTreeSet<usize>,
    temp_bounds: Vec<(usize, f64, f64)>,

    nla: Nla,
    dual_row: DualRow,

    // Tolerances and limits copied from Options
    primal_tol: f64,
    dual_tol: f64,
    resync_iters: u64,
    debug_check_invert: bool,
    verbose: bool,
    log_freq: u64,

    /// Iterations performed by this engine
    pub iteration_count: u64,
    /// Iterations spent in phase 1
    pub phase1_iterations: u64,
    /// Factorizations performed
    pub invert_count: u64,
    update_count: u64,
    fresh_invert: bool,
    rebuild_needed: bool,
    skip_next_invert: bool,
    phase: SimplexPhase,

    dual_objective: f64,
    col_aq_density: f64,
    row_ep_density: f64,
}

impl DualSimplex {
    /// Set up the engine for an LP (minimization, costs as given).
    pub fn new(lp: &Lp, scale: Scale, options: &Options) -> Self {
        let num_col = lp.num_col;
        let num_row = lp.num_row;
        let num_tot = num_col + num_row;

        let a_cols = lp.a_matrix.clone();
        let a_rows = a_cols.transpose();

        let mut work_lower = vec![0.0; num_tot];
        let mut work_upper = vec![0.0; num_tot];
        let mut work_cost = vec![0.0; num_tot];
        for j in 0..num_col {
            work_lower[j] = lp.col_lower[j];
            work_upper[j] = lp.col_upper[j];
            work_cost[j] = lp.col_cost[j];
        }
        // The logical of row i carries A x + s = 0, s in [-upper, -lower].
        for i in 0..num_row {
            work_lower[num_col + i] = -lp.row_upper[i];
            work_upper[num_col + i] = -lp.row_lower[i];
        }
        let work_range: Vec<f64> = work_lower
            .iter()
            .zip(&work_upper)
            .map(|(&l, &u)| u - l)
            .collect();

        // Fixed pseudo-random permutation for anti-cycling tie-breaks.
        let mut permutation: Vec<usize> = (0..num_tot).collect();
        let mut state = 0x9e3779b97f4a7c15u64;
        for i in (1..num_tot).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            permutation.swap(i, j);
        }

        Self {
            num_col,
            num_row,
            num_tot,
            a_cols,
            a_rows,
            work_lower,
            work_upper,
            work_range,
            work_cost,
            work_value: vec![0.0; num_tot],
            nonbasic_move: vec![0; num_tot],
            work_dual: vec![0.0; num_tot],
            basis: SimplexBasis::logical(num_col, num_row),
            baseval: vec![0.0; num_row],
            baselo: vec![0.0; num_row],
            baseup: vec![0.0; num_row],
            edge_weight: vec![1.0; num_row],
            devex_index: vec![0; num_tot],
            permutation,
            free_list: BTreeSet::new(),
            temp_bounds: Vec::new(),
            nla: Nla::new(
                num_col,
                num_row,
                scale,
                options.pivot_tol,
                options.update_limit,
            ),
            dual_row: DualRow::default(),
            primal_tol: options.primal_feasibility_tol,
            dual_tol: options.dual_feasibility_tol,
            resync_iters: options.dual_objective_resync_iters.max(1),
            debug_check_invert: options.debug_check_invert,
            verbose: options.verbose,
            log_freq: options.log_freq.max(1),
            iteration_count: 0,
            phase1_iterations: 0,
            invert_count: 0,
            update_count: 0,
            fresh_invert: false,
            rebuild_needed: true,
            skip_next_invert: false,
            phase: SimplexPhase::Two,
            dual_objective: 0.0,
            col_aq_density: 0.0,
            row_ep_density: 0.0,
        }
    }

    /// Install a starting basis (e.g. from a frozen snapshot).
    pub fn set_basis(&mut self, basis: SimplexBasis) -> SolverResult<()> {
        if basis.num_tot() != self.num_tot || !basis.is_consistent(self.num_row) {
            return Err(SolverError::InvalidInput(
                "basis does not match model shape".to_string(),
            ));
        }
        self.basis = basis;
        self.rebuild_needed = true;
        Ok(())
    }

    /// Freeze the current basis together with the update region.
    pub fn freeze_basis(&mut self) -> i32 {
        self.nla.freeze(&self.basis)
    }

    /// Restore a frozen basis.
    ///
    /// The work arrays are recomputed on the next rebuild; if the frozen
    /// update region is still compatible with the factorization, that
    /// rebuild skips the re-invert.
    pub fn unfreeze_basis(&mut self, id: i32) -> SolverResult<()> {
        use crate::simplex::nla::UnfreezeStatus;
        match self.nla.unfreeze(id, &mut self.basis) {
            Some(status) => {
                self.skip_next_invert = status == UnfreezeStatus::InvertRestored;
                self.rebuild_needed = true;
                Ok(())
            }
            None => Err(SolverError::InvalidInput(format!(
                "frozen basis id {} is not valid",
                id
            ))),
        }
    }

    /// Change the bounds of a variable between solves.
    pub fn set_variable_bounds(&mut self, var: usize, lower: f64, upper: f64) {
        self.work_lower[var] = lower;
        self.work_upper[var] = upper;
        self.work_range[var] = upper - lower;
        self.rebuild_needed = true;
    }

    /// Change the cost of a variable between solves.
    pub fn set_variable_cost(&mut self, var: usize, cost: f64) {
        self.work_cost[var] = cost;
        self.rebuild_needed = true;
    }

    /// Incrementally maintained dual objective value.
    pub fn dual_objective(&self) -> f64 {
        self.dual_objective
    }

    /// Dual objective recomputed from the nonbasic duals and values.
    pub fn recompute_dual_objective(&self) -> f64 {
        let mut obj = 0.0;
        for j in 0..self.num_tot {
            if !self.basis.status[j].is_basic() {
                obj += self.work_dual[j] * self.work_value[j];
            }
        }
        obj
    }

    /// Primal objective of the current (possibly infeasible) iterate.
    pub fn primal_objective(&self) -> f64 {
        let mut obj = 0.0;
        for j in 0..self.num_tot {
            if self.basis.status[j].is_basic() {
                continue;
            }
            obj += self.work_cost[j] * self.work_value[j];
        }
        for (p, &var) in self.basis.base_index.iter().enumerate() {
            obj += self.work_cost[var] * self.baseval[p];
        }
        obj
    }

    /// Value of variable `var` in the current iterate.
    pub fn variable_value(&self, var: usize) -> f64 {
        if self.basis.status[var].is_basic() {
            let p = self
                .basis
                .base_index
                .iter()
                .position(|&v| v == var)
                .expect("basic variable is in base_index");
            self.baseval[p]
        } else {
            self.work_value[var]
        }
    }

    /// Reduced cost of variable `var`.
    pub fn variable_dual(&self, var: usize) -> f64 {
        self.work_dual[var]
    }

    /// Solve to a terminal status under the given budgets.
    pub fn solve(
        &mut self,
        time_limit: Option<f64>,
        iteration_limit: Option<u64>,
    ) -> SolverResult<ModelStatus> {
        let start = Instant::now();
        self.setup_bounds_and_moves();

        loop {
            // Budgets are observed at iteration boundaries only.
            if let Some(limit) = time_limit {
                if start.elapsed().as_secs_f64() >= limit {
                    return Ok(ModelStatus::ReachedTimeLimit);
                }
            }
            if let Some(limit) = iteration_limit {
                if self.iteration_count >= limit {
                    return Ok(ModelStatus::ReachedIterationLimit);
                }
            }

            if self.rebuild_needed || self.nla.refactor_recommended() {
                self.rebuild()?;
            }

            match self.iterate() {
                IterationOutcome::Iterated => {
                    if self.verbose && self.iteration_count % self.log_freq == 0 {
                        info!(
                            "iter {:>8} | dual obj {:.8e} | infeas {} | updates {}",
                            self.iteration_count,
                            self.dual_objective,
                            self.num_primal_infeasibilities(),
                            self.update_count,
                        );
                    }
                }
                IterationOutcome::Optimal => {
                    if !self.fresh_invert && self.update_count > 0 {
                        // Confirm optimality on a fresh factorization.
                        self.rebuild()?;
                        continue;
                    }
                    return Ok(self.resolve_phase1_outcome());
                }
                IterationOutcome::RefactorAndRetry => {
                    self.rebuild_needed = true;
                }
                IterationOutcome::Infeasible => {
                    return Ok(if self.temp_bounds.is_empty() {
                        ModelStatus::Infeasible
                    } else {
                        ModelStatus::UnboundedOrInfeasible
                    });
                }
                IterationOutcome::RatioTestFailed => {
                    return Err(SolverError::RatioTestFailed);
                }
            }
        }
    }

    /// One dual simplex iteration.
    ///
    /// Stage order: priced -> btran_done -> row_formed -> pivoted ->
    /// updating. Any abort before the update stages leaves the engine state
    /// untouched apart from the `RefactorAndRetry` request.
    pub fn iterate(&mut self) -> IterationOutcome {
        // --- CHUZR: pick the leaving row ---------------------------------
        let Some((row_out, delta)) = self.choose_row() else {
            return IterationOutcome::Optimal;
        };

        // --- BTRAN -------------------------------------------------------
        let mut row_ep = HVector::new(self.num_row);
        row_ep.set(row_out, 1.0);
        let ep_density = self.row_ep_density;
        self.nla
            .btran(&mut row_ep, ep_density, &self.basis.base_index);
        self.row_ep_density = 0.95 * self.row_ep_density + 0.05 * row_ep.density();

        // --- Row formation: row_ap = pi^T A over structural columns ------
        let mut row_ap = HVector::new(self.num_col);
        for (i, pi) in row_ep.iter() {
            if pi == 0.0 {
                continue;
            }
            for k in self.a_rows.start[i]..self.a_rows.start[i + 1] {
                row_ap.add(self.a_rows.index[k], self.a_rows.value[k] * pi);
            }
        }
        row_ap.sanitize(1e-14);
        row_ep.sanitize(1e-14);

        // --- CHUZC -------------------------------------------------------
        let ta = self.pass_a_tolerance();
        self.dual_row.clear();
        self.dual_row.work_delta = delta;
        self.dual_row.make_pack(&row_ap, 0);
        self.dual_row.make_pack(&row_ep, self.num_col);
        self.create_freemove(&row_ap, &row_ep, delta);
        self.dual_row
            .choose_possible(&self.nonbasic_move, &self.work_dual, ta, self.dual_tol);

        if self.dual_row.work_count == 0 {
            self.delete_freemove();
            if self.update_count > 0 {
                // Rule out a stale factorization before declaring anything.
                return IterationOutcome::RefactorAndRetry;
            }
            return IterationOutcome::Infeasible;
        }

        let mut chuzc = self.dual_row.choose_final(
            &self.nonbasic_move,
            &self.work_dual,
            &self.work_range,
            &self.permutation,
            self.dual_tol,
            false,
        );
        if let Err(failure) = chuzc {
            debug!("ratio test fallback to quadratic strategy: {:?}", failure);
            // The failed pass consumed the candidate list; rebuild it from
            // the packed row before retrying.
            self.dual_row
                .choose_possible(&self.nonbasic_move, &self.work_dual, ta, self.dual_tol);
            chuzc = self.dual_row.choose_final(
                &self.nonbasic_move,
                &self.work_dual,
                &self.work_range,
                &self.permutation,
                self.dual_tol,
                true,
            );
        }
        if let Err(failure) = chuzc {
            self.delete_freemove();
            return match failure {
                ChuzcFailure::Stalled | ChuzcFailure::WouldCreateInfeasibility => {
                    if !self.fresh_invert {
                        IterationOutcome::RefactorAndRetry
                    } else {
                        IterationOutcome::RatioTestFailed
                    }
                }
            };
        }

        let var_in = self.dual_row.work_pivot.expect("choose_final set a pivot");
        let theta_dual = self.dual_row.work_theta;
        let alpha_row = self.dual_row.work_alpha;

        // --- FTRAN of the entering column --------------------------------
        let mut col_aq = HVector::new(self.num_row);
        self.collect_variable_column(&mut col_aq, var_in, 1.0);
        let aq_density = self.col_aq_density;
        self.nla
            .ftran(&mut col_aq, aq_density, &self.basis.base_index);
        self.col_aq_density = 0.95 * self.col_aq_density + 0.05 * col_aq.density();

        let alpha_col = col_aq.array[row_out];
        if (alpha_col - alpha_row).abs() > ALPHA_VERIFY_TOL * (1.0 + alpha_row.abs()) {
            warn!(
                "pivot disagreement: row {:.12e} vs col {:.12e}",
                alpha_row, alpha_col
            );
            self.delete_freemove();
            if !self.fresh_invert {
                return IterationOutcome::RefactorAndRetry;
            }
            // On a fresh invert trust the column value.
        }
        if alpha_col == 0.0 {
            self.delete_freemove();
            if self.fresh_invert {
                return IterationOutcome::RatioTestFailed;
            }
            return IterationOutcome::RefactorAndRetry;
        }

        // --- Commit point: updating -------------------------------------
        // Record the product-form update against the pre-pivot basis.
        let update_status = self
            .nla
            .update(&col_aq, row_out, var_in, &self.basis.base_index);

        self.update_flips();
        // Flips may have absorbed part (or all) of the infeasibility.
        let flipped_delta = self.row_infeasibility(row_out);

        let theta_primal = flipped_delta / alpha_col;
        for (p, v) in col_aq.iter() {
            self.baseval[p] -= theta_primal * v;
        }

        self.update_dual(theta_dual);
        self.update_devex(&col_aq, row_out, alpha_col);
        // The leaving variable goes to the bound it was infeasible against,
        // regardless of what the flips did to its value.
        self.commit_pivot(row_out, var_in, delta, theta_dual, theta_primal);
        self.delete_freemove();

        self.iteration_count += 1;
        if self.phase == SimplexPhase::One {
            self.phase1_iterations += 1;
        }
        self.update_count += 1;
        self.fresh_invert = false;

        if self.iteration_count % self.resync_iters == 0 {
            self.resync_dual_objective();
        }
        if update_status != UpdateStatus::Ok {
            self.rebuild_needed = true;
        }
        IterationOutcome::Iterated
    }

    // --- setup -----------------------------------------------------------

    /// Choose nonbasic bounds by cost sign and install temporary phase-1
    /// bounds where no dual-feasible bound exists.
    fn setup_bounds_and_moves(&mut self) {
        // A previous solve may have stopped on a budget with temporary
        // bounds still installed.
        for (j, lo, up) in std::mem::take(&mut self.temp_bounds) {
            self.work_lower[j] = lo;
            self.work_upper[j] = up;
        }
        self.free_list.clear();
        for j in 0..self.num_tot {
            if self.basis.status[j].is_basic() {
                self.nonbasic_move[j] = 0;
                continue;
            }
            let (lo, up) = (self.work_lower[j], self.work_upper[j]);
            let cost = self.work_cost[j];
            let status = self.basis.status[j];

            // Respect an explicit warm-start status when its bound exists.
            let chosen = match status {
                BasisStatus::Lower if lo.is_finite() => Some((lo, 1i8)),
                BasisStatus::Upper if up.is_finite() => Some((up, -1i8)),
                BasisStatus::Zero if lo.is_infinite() && up.is_infinite() => Some((0.0, 0i8)),
                _ => None,
            };
            let (value, mv) = chosen.unwrap_or_else(|| {
                if lo == up {
                    (lo, 0)
                } else if cost >= 0.0 {
                    if lo.is_finite() {
                        (lo, 1)
                    } else if up.is_finite() {
                        if cost > 0.0 {
                            // Wants to decrease without a lower bound.
                            let tmp = up - PHASE1_BOUND;
                            self.temp_bounds.push((j, lo, up));
                            self.work_lower[j] = tmp;
                            (tmp, 1)
                        } else {
                            (up, -1)
                        }
                    } else if cost > 0.0 {
                        self.temp_bounds.push((j, lo, up));
                        self.work_lower[j] = -PHASE1_BOUND;
                        (-PHASE1_BOUND, 1)
                    } else {
                        (0.0, 0)
                    }
                } else if up.is_finite() {
                    (up, -1)
                } else if lo.is_finite() {
                    self.temp_bounds.push((j, lo, up));
                    self.work_upper[j] = lo + PHASE1_BOUND;
                    (lo + PHASE1_BOUND, -1)
                } else {
                    self.temp_bounds.push((j, lo, up));
                    self.work_upper[j] = PHASE1_BOUND;
                    (PHASE1_BOUND, -1)
                }
            });
            self.work_value[j] = value;
            self.nonbasic_move[j] = mv;
            self.basis.status[j] = match mv {
                1 => BasisStatus::Lower,
                -1 => BasisStatus::Upper,
                _ if lo == up => BasisStatus::Lower,
                _ => BasisStatus::Zero,
            };
            if mv == 0 && lo.is_infinite() && up.is_infinite() {
                self.free_list.insert(j);
            }
        }
        for j in 0..self.num_tot {
            self.work_range[j] = self.work_upper[j] - self.work_lower[j];
        }
        self.phase = if self.temp_bounds.is_empty() {
            SimplexPhase::Two
        } else {
            SimplexPhase::One
        };
        if !self.temp_bounds.is_empty() {
            debug!(
                "phase 1: {} temporary bounds installed",
                self.temp_bounds.len()
            );
        }
        self.rebuild_needed = true;
    }

    /// Decide the final status once the relaxation is optimal, withdrawing
    /// temporary bounds.
    fn resolve_phase1_outcome(&mut self) -> ModelStatus {
        if self.temp_bounds.is_empty() {
            return ModelStatus::Optimal;
        }
        let temp = std::mem::take(&mut self.temp_bounds);
        let mut unbounded = false;
        for &(j, lo, up) in &temp {
            let at_temp_lower = (self.work_value[j] - self.work_lower[j]).abs() < self.primal_tol
                && self.work_lower[j] != lo;
            let at_temp_upper = (self.work_value[j] - self.work_upper[j]).abs() < self.primal_tol
                && self.work_upper[j] != up;
            let at_temp_bound =
                !self.basis.status[j].is_basic() && (at_temp_lower || at_temp_upper);
            if at_temp_bound && self.work_dual[j].abs() > self.dual_tol {
                unbounded = true;
            }
            self.work_lower[j] = lo;
            self.work_upper[j] = up;
            self.work_range[j] = up - lo;
            if !self.basis.status[j].is_basic() && at_temp_bound {
                // The variable rests at a withdrawn bound: leave its value,
                // mark it free-nonbasic.
                self.basis.status[j] = BasisStatus::Zero;
                self.nonbasic_move[j] = 0;
            }
        }
        self.phase = SimplexPhase::Two;
        if unbounded {
            ModelStatus::Unbounded
        } else {
            ModelStatus::Optimal
        }
    }

    // --- rebuild ---------------------------------------------------------

    /// Re-invert from `base_index`, repairing singular columns with
    /// logicals, then recompute duals, values and the dual objective.
    ///
    /// A restored frozen basis with a compatible update region skips the
    /// re-invert and only recomputes the derived quantities.
    fn rebuild(&mut self) -> SolverResult<()> {
        if self.skip_next_invert && self.nla.has_invert() {
            self.skip_next_invert = false;
            self.fresh_invert = false;
            self.rebuild_needed = false;
            self.update_count = self.nla.update_count() as u64;
            self.compute_dual();
            self.flip_for_dual_feasibility();
            self.compute_primal();
            self.reset_devex();
            self.dual_objective = self.recompute_dual_objective();
            return Ok(());
        }
        self.skip_next_invert = false;
        let mut repairs = 0;
        loop {
            match self.nla.invert(&self.a_cols, &self.basis.base_index) {
                Ok(()) => break,
                Err(FactorError::Singular {
                    basis_position,
                    repair_row,
                }) => {
                    repairs += 1;
                    if repairs > self.num_row {
                        return Err(SolverError::Singular {
                            column: basis_position,
                        });
                    }
                    let logical = self.num_col + repair_row;
                    if self.basis.status[logical].is_basic() {
                        return Err(SolverError::Singular {
                            column: basis_position,
                        });
                    }
                    let old = self.basis.base_index[basis_position];
                    warn!(
                        "basis repair: replacing variable {} with logical of row {}",
                        old, repair_row
                    );
                    self.basis.base_index[basis_position] = logical;
                    self.basis.status[logical] = BasisStatus::Basic;
                    self.nonbasic_move[logical] = 0;
                    self.set_nonbasic_at_best_bound(old);
                }
            }
        }
        self.invert_count += 1;
        self.update_count = 0;
        self.fresh_invert = true;
        self.rebuild_needed = false;

        self.compute_dual();
        self.flip_for_dual_feasibility();
        self.compute_primal();
        self.reset_devex();
        self.dual_objective = self.recompute_dual_objective();
        if self.debug_check_invert {
            let residual = self.basic_residual_norm();
            if residual > 1e-6 {
                warn!("invert residual {:.3e} above tolerance", residual);
            }
        }
        Ok(())
    }

    fn set_nonbasic_at_best_bound(&mut self, var: usize) {
        let (lo, up) = (self.work_lower[var], self.work_upper[var]);
        if lo.is_finite() {
            self.basis.status[var] = BasisStatus::Lower;
            self.work_value[var] = lo;
            self.nonbasic_move[var] = if lo == up { 0 } else { 1 };
        } else if up.is_finite() {
            self.basis.status[var] = BasisStatus::Upper;
            self.work_value[var] = up;
            self.nonbasic_move[var] = -1;
        } else {
            self.basis.status[var] = BasisStatus::Zero;
            self.work_value[var] = 0.0;
            self.nonbasic_move[var] = 0;
            self.free_list.insert(var);
        }
    }

    /// Recompute every reduced cost from a BTRAN of the basic costs.
    fn compute_dual(&mut self) {
        let mut pi = HVector::new(self.num_row);
        for (p, &var) in self.basis.base_index.iter().enumerate() {
            let c = self.work_cost[var];
            if c != 0.0 {
                pi.set(p, c);
            }
        }
        self.nla.btran(&mut pi, 1.0, &self.basis.base_index);

        for j in 0..self.num_col {
            self.work_dual[j] = if self.basis.status[j].is_basic() {
                0.0
            } else {
                self.work_cost[j] - self.a_cols.compute_dot(&pi.array, j)
            };
        }
        for i in 0..self.num_row {
            let j = self.num_col + i;
            self.work_dual[j] = if self.basis.status[j].is_basic() {
                0.0
            } else {
                self.work_cost[j] - pi.array[i]
            };
        }
    }

    /// Flip boxed nonbasic variables sitting at a dual-infeasible bound.
    fn flip_for_dual_feasibility(&mut self) {
        let mut flipped = 0;
        for j in 0..self.num_tot {
            let mv = self.nonbasic_move[j];
            if mv == 0 {
                continue;
            }
            if (mv as f64) * self.work_dual[j] < -self.dual_tol
                && self.work_range[j].is_finite()
            {
                let (status, value, new_move) = if mv > 0 {
                    (BasisStatus::Upper, self.work_upper[j], -1i8)
                } else {
                    (BasisStatus::Lower, self.work_lower[j], 1i8)
                };
                self.basis.status[j] = status;
                self.work_value[j] = value;
                self.nonbasic_move[j] = new_move;
                flipped += 1;
            }
        }
        if flipped > 0 {
            debug!("rebuild flipped {} bounds for dual feasibility", flipped);
        }
    }

    /// Recompute the basic variable values from the nonbasic ones.
    fn compute_primal(&mut self) {
        let mut rhs = HVector::new(self.num_row);
        for j in 0..self.num_tot {
            if self.basis.status[j].is_basic() {
                continue;
            }
            let v = self.work_value[j];
            if v != 0.0 {
                self.collect_variable_column(&mut rhs, j, -v);
            }
        }
        self.nla.ftran(&mut rhs, 1.0, &self.basis.base_index);
        for p in 0..self.num_row {
            self.baseval[p] = rhs.array[p];
            let var = self.basis.base_index[p];
            self.baselo[p] = self.work_lower[var];
            self.baseup[p] = self.work_upper[var];
        }
    }

    fn reset_devex(&mut self) {
        for w in self.edge_weight.iter_mut() {
            *w = 1.0;
        }
        for j in 0..self.num_tot {
            self.devex_index[j] = if self.basis.status[j].is_basic() { 0 } else { 1 };
        }
    }

    // --- iteration pieces ------------------------------------------------

    /// Pass-A attractiveness threshold, decaying with the update count.
    fn pass_a_tolerance(&self) -> f64 {
        if self.update_count < 10 {
            1e-9
        } else if self.update_count < 20 {
            3e-8
        } else {
            1e-6
        }
    }

    /// Signed infeasibility of the basic variable in `row`: negative below
    /// its lower bound, positive above its upper bound, zero otherwise.
    fn row_infeasibility(&self, row: usize) -> f64 {
        let v = self.baseval[row];
        if v < self.baselo[row] {
            v - self.baselo[row]
        } else if v > self.baseup[row] {
            v - self.baseup[row]
        } else {
            0.0
        }
    }

    /// CHUZR: most attractive primal-infeasible row by squared
    /// infeasibility over edge weight.
    fn choose_row(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        let mut best_score = 0.0;
        for p in 0..self.num_row {
            let delta = self.row_infeasibility(p);
            if delta.abs() <= self.primal_tol {
                continue;
            }
            let score = delta * delta / self.edge_weight[p];
            if score > best_score {
                best_score = score;
                best = Some((p, delta));
            }
        }
        best
    }

    fn num_primal_infeasibilities(&self) -> usize {
        (0..self.num_row)
            .filter(|&p| self.row_infeasibility(p).abs() > self.primal_tol)
            .count()
    }

    /// Gather the constraint column of a variable (structural or logical).
    fn collect_variable_column(&self, col: &mut HVector, var: usize, multiplier: f64) {
        if var < self.num_col {
            self.a_cols.collect_col(col, var, multiplier);
        } else {
            col.add(var - self.num_col, multiplier);
        }
    }

    /// Give free nonbasic variables a temporary move so the ratio test can
    /// drive them into the basis.
    fn create_freemove(&mut self, row_ap: &HVector, row_ep: &HVector, delta: f64) {
        if self.free_list.is_empty() {
            return;
        }
        let ta = self.pass_a_tolerance();
        let move_out = if delta < 0.0 { -1.0 } else { 1.0 };
        for &j in self.free_list.iter() {
            let alpha = if j < self.num_col {
                row_ap.array[j]
            } else {
                row_ep.array[j - self.num_col]
            };
            if alpha.abs() > ta {
                self.nonbasic_move[j] = if alpha * move_out > 0.0 { 1 } else { -1 };
            }
        }
    }

    /// Reset the temporary moves installed by [`Self::create_freemove`].
    fn delete_freemove(&mut self) {
        for &j in self.free_list.iter() {
            if !self.basis.status[j].is_basic() {
                self.nonbasic_move[j] = 0;
            }
        }
    }

    /// Apply the BFRT bound flips and their effect on the basic values.
    fn update_flips(&mut self) {
        if self.dual_row.flips.is_empty() {
            return;
        }
        let mut flip_col = HVector::new(self.num_row);
        let flips = std::mem::take(&mut self.dual_row.flips);
        for &(col, change) in &flips {
            debug_assert!(change.is_finite());
            self.work_value[col] += change;
            self.basis.status[col] = match self.basis.status[col] {
                BasisStatus::Lower => BasisStatus::Upper,
                BasisStatus::Upper => BasisStatus::Lower,
                other => other,
            };
            self.nonbasic_move[col] = -self.nonbasic_move[col];
            self.dual_objective += change * self.work_dual[col];
            self.collect_variable_column(&mut flip_col, col, change);
        }
        self.dual_row.flips = flips;
        if flip_col.count > 0 {
            let density = self.col_aq_density;
            self.nla
                .ftran(&mut flip_col, density, &self.basis.base_index);
            for (p, v) in flip_col.iter() {
                self.baseval[p] -= v;
            }
        }
    }

    /// Dual update over the packed pivotal row, maintaining the dual
    /// objective incrementally.
    fn update_dual(&mut self, theta_dual: f64) {
        if theta_dual == 0.0 {
            return;
        }
        let mut objective_change = 0.0;
        for k in 0..self.dual_row.pack_index.len() {
            let col = self.dual_row.pack_index[k];
            if self.basis.status[col].is_basic() {
                continue;
            }
            let delta_dual = theta_dual * self.dual_row.pack_value[k];
            self.work_dual[col] -= delta_dual;
            objective_change += -self.work_value[col] * delta_dual;
        }
        self.dual_objective += objective_change;
    }

    /// Devex recurrence on the pivot column, with a framework reset when the
    /// weights have grown too far.
    fn update_devex(&mut self, col_aq: &HVector, row_out: usize, alpha_col: f64) {
        let mut computed = 0.0;
        for k in 0..self.dual_row.pack_index.len() {
            let col = self.dual_row.pack_index[k];
            if self.basis.status[col].is_basic() || self.devex_index[col] == 0 {
                continue;
            }
            let v = self.dual_row.pack_value[k];
            computed += v * v;
        }
        let computed = computed.max(1.0);
        let aa2 = alpha_col * alpha_col;
        for (p, v) in col_aq.iter() {
            if p == row_out {
                continue;
            }
            let candidate = (v * v / aa2) * computed;
            if candidate > self.edge_weight[p] {
                self.edge_weight[p] = candidate;
            }
        }
        self.edge_weight[row_out] = (computed / aa2).max(1.0);
        if self.edge_weight[row_out] > DEVEX_RESET_WEIGHT {
            debug!("devex reference framework reset");
            self.reset_devex();
        }
    }

    /// Install the pivot: leaving variable to its bound, entering variable
    /// basic, statuses, duals and the dual objective adjusted.
    fn commit_pivot(
        &mut self,
        row_out: usize,
        var_in: usize,
        delta: f64,
        theta_dual: f64,
        theta_primal: f64,
    ) {
        let var_out = self.basis.base_index[row_out];
        let (status, bound, mv) = if delta < 0.0 {
            (BasisStatus::Lower, self.baselo[row_out], 1i8)
        } else {
            (BasisStatus::Upper, self.baseup[row_out], -1i8)
        };
        let mv = if self.work_lower[var_out] == self.work_upper[var_out] {
            0
        } else {
            mv
        };
        self.basis.status[var_out] = status;
        self.work_value[var_out] = bound;
        self.nonbasic_move[var_out] = mv;
        self.work_dual[var_out] = -theta_dual;
        self.dual_objective += -theta_dual * bound;

        let value_in = self.work_value[var_in] + theta_primal;
        self.basis.status[var_in] = BasisStatus::Basic;
        self.nonbasic_move[var_in] = 0;
        self.work_dual[var_in] = 0.0;
        self.basis.base_index[row_out] = var_in;
        self.baseval[row_out] = value_in;
        self.baselo[row_out] = self.work_lower[var_in];
        self.baseup[row_out] = self.work_upper[var_in];
        self.free_list.remove(&var_in);
        self.devex_index[var_in] = 0;
    }

    /// Periodic full recomputation of the incrementally maintained dual
    /// objective, logging drift beyond tolerance.
    fn resync_dual_objective(&mut self) {
        let recomputed = self.recompute_dual_objective();
        let drift = (recomputed - self.dual_objective).abs();
        if drift > 1e-8 * (1.0 + recomputed.abs()) {
            debug!(
                "dual objective resync: drift {:.3e} after {} iterations",
                drift, self.iteration_count
            );
        }
        self.dual_objective = recomputed;
    }

    /// Infinity norm of A x + s over the current iterate (zero for an exact
    /// solve).
    fn basic_residual_norm(&self) -> f64 {
        let mut activity = vec![0.0; self.num_row];
        for j in 0..self.num_tot {
            let v = self.variable_value(j);
            if v == 0.0 {
                continue;
            }
            if j < self.num_col {
                for k in self.a_cols.start[j]..self.a_cols.start[j + 1] {
                    activity[self.a_cols.index[k]] += self.a_cols.value[k] * v;
                }
            } else {
                activity[j - self.num_col] += v;
            }
        }
        activity.iter().fold(0.0f64, |acc, &r| acc.max(r.abs()))
    }

    /// Termination diagnostics: primal and dual infeasibility counts and
    /// maxima.
    pub fn infeasibility_stats(&self) -> (usize, f64, usize, f64) {
        let mut num_primal = 0;
        let mut max_primal = 0.0f64;
        for p in 0..self.num_row {
            let infeas = self.row_infeasibility(p).abs();
            if infeas > self.primal_tol {
                num_primal += 1;
            }
            max_primal = max_primal.max(infeas);
        }
        let mut num_dual = 0;
        let mut max_dual = 0.0f64;
        for j in 0..self.num_tot {
            let mv = self.nonbasic_move[j] as f64;
            if mv == 0.0 {
                continue;
            }
            let infeas = -(mv * self.work_dual[j]);
            if infeas > self.dual_tol {
                num_dual += 1;
            }
            max_dual = max_dual.max(infeas.max(0.0));
        }
        (num_primal, max_primal, num_dual, max_dual)
    }
}
