//! Presolve: size reductions applied before the simplex solve.
//!
//! The rule set is deliberately small: empty rows, fixed columns, empty
//! columns and singleton rows. Each removal pushes an action onto the
//! postsolve stack so the solution can be mapped back to the original
//! space.

use log::debug;

use crate::error::SolverResult;
use crate::linalg::sparse::IndexCollection;
use crate::postsolve::{Postsolve, PresolveAction};
use crate::problem::{Lp, Options};

/// Outcome of the presolve pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresolveStatus {
    /// Some rows or columns were removed
    Reduced,
    /// Everything was removed; the solution is determined by postsolve
    ReducedToEmpty,
    /// No reduction found
    NotReduced,
    /// The model was detected infeasible
    Infeasible,
    /// The model was detected unbounded
    Unbounded,
}

/// Reduced model plus the transformation back to the original space.
#[derive(Debug)]
pub struct PresolveResult {
    /// Status of the reduction
    pub status: PresolveStatus,
    /// The reduced LP (unchanged clone when `NotReduced`)
    pub lp: Lp,
    /// Inverse transformation
    pub postsolve: Postsolve,
}

/// Maximum number of full passes over the rule set.
const MAX_PASSES: usize = 5;

/// Run the presolve rules on `lp`.
pub fn presolve(lp: &Lp, options: &Options) -> SolverResult<PresolveResult> {
    let mut work = lp.clone();
    let tol = options.primal_feasibility_tol;
    let mut actions: Vec<PresolveAction> = Vec::new();
    let mut drop_row = vec![false; lp.num_row];
    let mut drop_col = vec![false; lp.num_col];

    // Row entry counts maintained across passes.
    let mut row_count = vec![0usize; lp.num_row];
    let mut col_count = vec![0usize; lp.num_col];
    for j in 0..lp.num_col {
        for &i in work.a_matrix.col_indices(j) {
            row_count[i] += 1;
            col_count[j] += 1;
        }
    }

    for pass in 0..MAX_PASSES {
        let mut changed = false;

        // Empty rows: feasible iff zero activity fits the bounds.
        for i in 0..lp.num_row {
            if drop_row[i] || row_count[i] > 0 {
                continue;
            }
            if work.row_lower[i] > tol || work.row_upper[i] < -tol {
                return Ok(infeasible_result(lp));
            }
            drop_row[i] = true;
            actions.push(PresolveAction::EmptyRow { row: i });
            changed = true;
        }

        // Fixed columns: substitute the value into rows and objective.
        for j in 0..lp.num_col {
            if drop_col[j] || work.col_lower[j] != work.col_upper[j] {
                continue;
            }
            let value = work.col_lower[j];
            work.offset += work.col_cost[j] * value;
            for (&i, &a) in work
                .a_matrix
                .col_indices(j)
                .iter()
                .zip(work.a_matrix.col_values(j))
            {
                if drop_row[i] {
                    continue;
                }
                if work.row_lower[i].is_finite() {
                    work.row_lower[i] -= a * value;
                }
                if work.row_upper[i].is_finite() {
                    work.row_upper[i] -= a * value;
                }
                row_count[i] -= 1;
            }
            drop_col[j] = true;
            col_count[j] = 0;
            actions.push(PresolveAction::FixedCol { col: j, value });
            changed = true;
        }

        // Empty columns: fix at the cost-preferred bound.
        for j in 0..lp.num_col {
            if drop_col[j] || col_count[j] > 0 {
                continue;
            }
            let c = work.col_cost[j];
            let value = if c > 0.0 {
                if work.col_lower[j].is_infinite() {
                    return Ok(unbounded_result(lp));
                }
                work.col_lower[j]
            } else if c < 0.0 {
                if work.col_upper[j].is_infinite() {
                    return Ok(unbounded_result(lp));
                }
                work.col_upper[j]
            } else if work.col_lower[j].is_finite() {
                work.col_lower[j]
            } else if work.col_upper[j].is_finite() {
                work.col_upper[j]
            } else {
                0.0
            };
            work.offset += c * value;
            drop_col[j] = true;
            actions.push(PresolveAction::EmptyCol { col: j, value });
            changed = true;
        }

        // Singleton rows: fold the row into the column's bounds.
        for j in 0..lp.num_col {
            if drop_col[j] {
                continue;
            }
            // Collect live singleton rows hitting this column.
            let indices: Vec<usize> = work.a_matrix.col_indices(j).to_vec();
            let values: Vec<f64> = work.a_matrix.col_values(j).to_vec();
            for (&i, &a) in indices.iter().zip(&values) {
                if drop_row[i] || row_count[i] != 1 || a == 0.0 {
                    continue;
                }
                let (mut implied_lo, mut implied_up) = if a > 0.0 {
                    (work.row_lower[i] / a, work.row_upper[i] / a)
                } else {
                    (work.row_upper[i] / a, work.row_lower[i] / a)
                };
                if implied_lo.is_nan() {
                    implied_lo = f64::NEG_INFINITY;
                }
                if implied_up.is_nan() {
                    implied_up = f64::INFINITY;
                }
                let tightened_lower = implied_lo > work.col_lower[j];
                let tightened_upper = implied_up < work.col_upper[j];
                if tightened_lower {
                    work.col_lower[j] = implied_lo;
                }
                if tightened_upper {
                    work.col_upper[j] = implied_up;
                }
                if work.col_lower[j] > work.col_upper[j] + tol {
                    return Ok(infeasible_result(lp));
                }
                drop_row[i] = true;
                row_count[i] = 0;
                col_count[j] -= 1;
                actions.push(PresolveAction::SingletonRow {
                    row: i,
                    col: j,
                    coef: a,
                    tightened_lower,
                    tightened_upper,
                });
                changed = true;
            }
        }

        if !changed {
            debug!("presolve converged after {} passes", pass);
            break;
        }
    }

    let removed_rows = drop_row.iter().filter(|&&d| d).count();
    let removed_cols = drop_col.iter().filter(|&&d| d).count();
    if removed_rows == 0 && removed_cols == 0 {
        return Ok(PresolveResult {
            status: PresolveStatus::NotReduced,
            lp: work,
            postsolve: Postsolve::identity(lp),
        });
    }

    // Build the reduced model.
    work.a_matrix.delete_cols(&IndexCollection::Mask(&drop_col))?;
    work.a_matrix.delete_rows(&IndexCollection::Mask(&drop_row))?;
    let keep = |flags: &[bool], values: &[f64]| -> Vec<f64> {
        values
            .iter()
            .zip(flags)
            .filter(|(_, &d)| !d)
            .map(|(&v, _)| v)
            .collect()
    };
    work.col_cost = keep(&drop_col, &work.col_cost);
    work.col_lower = keep(&drop_col, &work.col_lower);
    work.col_upper = keep(&drop_col, &work.col_upper);
    work.row_lower = keep(&drop_row, &work.row_lower);
    work.row_upper = keep(&drop_row, &work.row_upper);
    if let Some(tags) = &work.integrality {
        work.integrality = Some(
            tags.iter()
                .zip(&drop_col)
                .filter(|(_, &d)| !d)
                .map(|(&t, _)| t)
                .collect(),
        );
    }
    work.num_col -= removed_cols;
    work.num_row -= removed_rows;

    let kept_cols: Vec<usize> = (0..lp.num_col).filter(|&j| !drop_col[j]).collect();
    let kept_rows: Vec<usize> = (0..lp.num_row).filter(|&i| !drop_row[i]).collect();
    let status = if work.num_col == 0 || work.num_row == 0 {
        PresolveStatus::ReducedToEmpty
    } else {
        PresolveStatus::Reduced
    };
    debug!(
        "presolve removed {} rows, {} cols ({:?})",
        removed_rows, removed_cols, status
    );
    Ok(PresolveResult {
        status,
        lp: work,
        postsolve: Postsolve::new(lp, kept_cols, kept_rows, actions),
    })
}

fn infeasible_result(lp: &Lp) -> PresolveResult {
    PresolveResult {
        status: PresolveStatus::Infeasible,
        lp: lp.clone(),
        postsolve: Postsolve::identity(lp),
    }
}

fn unbounded_result(lp: &Lp) -> PresolveResult {
    PresolveResult {
        status: PresolveStatus::Unbounded,
        lp: lp.clone(),
        postsolve: Postsolve::identity(lp),
    }
}
