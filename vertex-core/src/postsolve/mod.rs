//! Postsolve: map a reduced-space solution back to the original model.

use crate::problem::{Lp, SolveResult};
use crate::simplex::basis::{BasisStatus, SimplexBasis};

/// One recorded presolve reduction.
#[derive(Debug, Clone, Copy)]
pub enum PresolveAction {
    /// Row with no entries removed
    EmptyRow {
        /// Original row index
        row: usize,
    },
    /// Column with equal bounds substituted out
    FixedCol {
        /// Original column index
        col: usize,
        /// Fixed value
        value: f64,
    },
    /// Column with no entries fixed at its preferred bound
    EmptyCol {
        /// Original column index
        col: usize,
        /// Chosen value
        value: f64,
    },
    /// Singleton row folded into its column's bounds
    SingletonRow {
        /// Original row index
        row: usize,
        /// Original column index
        col: usize,
        /// Matrix coefficient of the single entry
        coef: f64,
        /// Whether the fold tightened the column's lower bound
        tightened_lower: bool,
        /// Whether the fold tightened the column's upper bound
        tightened_upper: bool,
    },
}

/// Inverse of the presolve transformation.
#[derive(Debug, Clone)]
pub struct Postsolve {
    orig_num_col: usize,
    orig_num_row: usize,
    kept_cols: Vec<usize>,
    kept_rows: Vec<usize>,
    actions: Vec<PresolveAction>,
}

impl Postsolve {
    /// Identity transformation (presolve removed nothing).
    pub fn identity(lp: &Lp) -> Self {
        Self {
            orig_num_col: lp.num_col,
            orig_num_row: lp.num_row,
            kept_cols: (0..lp.num_col).collect(),
            kept_rows: (0..lp.num_row).collect(),
            actions: Vec::new(),
        }
    }

    /// Record a reduction of `lp` keeping the named columns and rows.
    pub fn new(
        lp: &Lp,
        kept_cols: Vec<usize>,
        kept_rows: Vec<usize>,
        actions: Vec<PresolveAction>,
    ) -> Self {
        Self {
            orig_num_col: lp.num_col,
            orig_num_row: lp.num_row,
            kept_cols,
            kept_rows,
            actions,
        }
    }

    /// Whether this is the identity transformation.
    pub fn is_identity(&self) -> bool {
        self.actions.is_empty()
            && self.kept_cols.len() == self.orig_num_col
            && self.kept_rows.len() == self.orig_num_row
    }

    /// Lift a reduced-space solution into the original space.
    ///
    /// `lp` is the *original* model. Values of removed columns come from the
    /// recorded actions; row activities are recomputed from the original
    /// matrix; duals of folded singleton rows are transferred back from the
    /// column when the folded bound is active.
    pub fn restore(&self, lp: &Lp, reduced: &SolveResult) -> SolveResult {
        let n = self.orig_num_col;
        let m = self.orig_num_row;
        let mut out = SolveResult {
            status: reduced.status,
            col_value: vec![0.0; n],
            col_dual: vec![0.0; n],
            row_value: vec![0.0; m],
            row_dual: vec![0.0; m],
            basis: SimplexBasis {
                status: vec![BasisStatus::Lower; n + m],
                base_index: Vec::with_capacity(m),
            },
            obj_value: 0.0,
            info: reduced.info.clone(),
        };

        // Scatter the kept columns and rows.
        for (r, &j) in self.kept_cols.iter().enumerate() {
            out.col_value[j] = reduced.col_value[r];
            out.col_dual[j] = reduced.col_dual[r];
            out.basis.status[j] = reduced.basis.status[r];
        }
        let reduced_n = self.kept_cols.len();
        for (r, &i) in self.kept_rows.iter().enumerate() {
            out.row_dual[i] = reduced.row_dual[r];
            out.basis.status[n + i] = reduced.basis.status[reduced_n + r];
        }
        // Removed rows start with a basic logical.
        let mut kept_row = vec![false; m];
        for &i in &self.kept_rows {
            kept_row[i] = true;
        }
        for i in 0..m {
            if !kept_row[i] {
                out.basis.status[n + i] = BasisStatus::Basic;
            }
        }

        // Undo the value-determining reductions, newest first.
        for action in self.actions.iter().rev() {
            if let PresolveAction::FixedCol { col, value }
            | PresolveAction::EmptyCol { col, value } = *action
            {
                out.col_value[col] = value;
                out.basis.status[col] = if value == lp.col_lower[col] {
                    BasisStatus::Lower
                } else if value == lp.col_upper[col] {
                    BasisStatus::Upper
                } else {
                    BasisStatus::Zero
                };
            }
        }

        // Transfer duals of folded singleton rows: if the column rests on a
        // bound the row created, the constraint is active and the reduced
        // cost really belongs to the row dual.
        let reduced_dual = |out: &SolveResult, col: usize| -> f64 {
            let mut dual = lp.col_cost[col];
            for (&i, &a) in lp
                .a_matrix
                .col_indices(col)
                .iter()
                .zip(lp.a_matrix.col_values(col))
            {
                dual -= a * out.row_dual[i];
            }
            dual
        };
        for action in self.actions.iter().rev() {
            let PresolveAction::SingletonRow {
                row,
                col,
                coef,
                tightened_lower,
                tightened_upper,
            } = *action
            else {
                continue;
            };
            if out.basis.status[col].is_basic() {
                continue;
            }
            let value = out.col_value[col];
            let (implied_lo, implied_up) = if coef > 0.0 {
                (lp.row_lower[row] / coef, lp.row_upper[row] / coef)
            } else {
                (lp.row_upper[row] / coef, lp.row_lower[row] / coef)
            };
            let near = |a: f64, b: f64| (a - b).abs() <= 1e-9 * (1.0 + a.abs());
            let at_lower = tightened_lower && near(value, implied_lo);
            let at_upper = tightened_upper && near(value, implied_up);
            if !at_lower && !at_upper {
                continue;
            }
            let dual = reduced_dual(&out, col);
            if dual.abs() <= 1e-11 {
                continue;
            }
            out.row_dual[row] = dual / coef;
            out.col_dual[col] = 0.0;
            out.basis.status[col] = BasisStatus::Basic;
            // The logical takes the bound matching the active row side.
            out.basis.status[n + row] = if at_lower == (coef > 0.0) {
                // Row active at its lower bound: s = -row_lower.
                BasisStatus::Upper
            } else {
                BasisStatus::Lower
            };
        }

        // Duals of removed columns from the restored row duals.
        for action in &self.actions {
            if let PresolveAction::FixedCol { col, .. } | PresolveAction::EmptyCol { col, .. } =
                *action
            {
                if !out.basis.status[col].is_basic() {
                    out.col_dual[col] = reduced_dual(&out, col);
                }
            }
        }

        // Row activities from the original matrix.
        for j in 0..n {
            let v = out.col_value[j];
            if v == 0.0 {
                continue;
            }
            for (&i, &a) in lp
                .a_matrix
                .col_indices(j)
                .iter()
                .zip(lp.a_matrix.col_values(j))
            {
                out.row_value[i] += a * v;
            }
        }

        // Rebuild base_index from the statuses.
        for var in 0..n + m {
            if out.basis.status[var].is_basic() {
                out.basis.base_index.push(var);
            }
        }

        let mut obj = lp.offset;
        for j in 0..n {
            obj += lp.col_cost[j] * out.col_value[j];
        }
        out.obj_value = obj;
        out
    }
}
