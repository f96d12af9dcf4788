//! Matrix equilibration and scale bookkeeping.
//!
//! Ruiz-style equilibration iteratively balances row and column magnitudes
//! of the constraint matrix. The resulting `Scale` is handed to the NLA
//! layer, which factorizes the scaled basis and applies the factors at the
//! solve boundaries; the engine itself works in unscaled quantities.

use crate::linalg::sparse::SparseMatrix;
use crate::problem::Lp;

/// Row and column scaling factors for an LP.
#[derive(Debug, Clone)]
pub struct Scale {
    /// Column factors (length num_col)
    pub col: Vec<f64>,
    /// Row factors (length num_row)
    pub row: Vec<f64>,
    /// Objective scaling factor
    pub cost: f64,
}

impl Scale {
    /// Identity scaling.
    pub fn identity(num_col: usize, num_row: usize) -> Self {
        Self {
            col: vec![1.0; num_col],
            row: vec![1.0; num_row],
            cost: 1.0,
        }
    }

    /// Whether every factor is exactly one.
    pub fn is_identity(&self) -> bool {
        self.cost == 1.0
            && self.col.iter().all(|&s| s == 1.0)
            && self.row.iter().all(|&s| s == 1.0)
    }

    /// Scale factor of a variable: structural columns use the column factor,
    /// logicals the reciprocal row factor.
    pub fn var_factor(&self, var: usize) -> f64 {
        if var < self.col.len() {
            self.col[var]
        } else {
            1.0 / self.row[var - self.col.len()]
        }
    }

    /// Apply the scaling to an LP in place.
    ///
    /// Finite bounds and costs are multiplied by the factors; infinities are
    /// left untouched so that applying and removing a scale round-trips
    /// bitwise on the finite data.
    pub fn apply(&self, lp: &mut Lp) {
        lp.a_matrix.scale_rows(&self.row);
        lp.a_matrix.scale_cols(&self.col);
        for j in 0..lp.num_col {
            let s = self.col[j];
            lp.col_cost[j] *= s * self.cost;
            if lp.col_lower[j].is_finite() {
                lp.col_lower[j] /= s;
            }
            if lp.col_upper[j].is_finite() {
                lp.col_upper[j] /= s;
            }
        }
        for i in 0..lp.num_row {
            let s = self.row[i];
            if lp.row_lower[i].is_finite() {
                lp.row_lower[i] *= s;
            }
            if lp.row_upper[i].is_finite() {
                lp.row_upper[i] *= s;
            }
        }
    }

    /// Remove the scaling from an LP in place; inverse of [`Scale::apply`].
    pub fn remove(&self, lp: &mut Lp) {
        let inv_row: Vec<f64> = self.row.iter().map(|&s| 1.0 / s).collect();
        let inv_col: Vec<f64> = self.col.iter().map(|&s| 1.0 / s).collect();
        lp.a_matrix.scale_rows(&inv_row);
        lp.a_matrix.scale_cols(&inv_col);
        for j in 0..lp.num_col {
            let s = self.col[j];
            lp.col_cost[j] /= s * self.cost;
            if lp.col_lower[j].is_finite() {
                lp.col_lower[j] *= s;
            }
            if lp.col_upper[j].is_finite() {
                lp.col_upper[j] *= s;
            }
        }
        for i in 0..lp.num_row {
            let s = self.row[i];
            if lp.row_lower[i].is_finite() {
                lp.row_lower[i] /= s;
            }
            if lp.row_upper[i].is_finite() {
                lp.row_upper[i] /= s;
            }
        }
    }
}

/// Default number of equilibration sweeps.
pub const DEFAULT_SCALE_ITERS: usize = 6;

/// Compute equilibration factors for a constraint matrix.
///
/// Each sweep divides rows and columns by the square root of their maximum
/// absolute entry, accumulating the factors. The matrix itself is not
/// modified; the returned `Scale` is interpreted by the NLA layer.
pub fn equilibrate(a: &SparseMatrix, iters: usize) -> Scale {
    let m = a.num_row;
    let n = a.num_col;
    let mut scale = Scale::identity(n, m);
    if a.nnz() == 0 {
        return scale;
    }

    let mut work = a.clone();
    for _ in 0..iters {
        let mut row_max = vec![0.0f64; m];
        let mut col_max = vec![0.0f64; n];
        for j in 0..n {
            for k in work.start[j]..work.start[j + 1] {
                let v = work.value[k].abs();
                let i = work.index[k];
                if v > row_max[i] {
                    row_max[i] = v;
                }
                if v > col_max[j] {
                    col_max[j] = v;
                }
            }
        }
        // Factors are rounded to powers of two so scaling and unscaling are
        // exact in floating point.
        let pow2 = |v: f64| (-0.5 * v.log2()).round().exp2();
        let row_fac: Vec<f64> = row_max
            .iter()
            .map(|&v| if v > 0.0 { pow2(v) } else { 1.0 })
            .collect();
        let col_fac: Vec<f64> = col_max
            .iter()
            .map(|&v| if v > 0.0 { pow2(v) } else { 1.0 })
            .collect();
        work.scale_rows(&row_fac);
        work.scale_cols(&col_fac);
        for i in 0..m {
            scale.row[i] *= row_fac[i];
        }
        for j in 0..n {
            scale.col[j] *= col_fac[j];
        }

        // Converged once everything is within a factor of two of unit size.
        let spread = row_max
            .iter()
            .chain(col_max.iter())
            .filter(|&&v| v > 0.0)
            .fold(1.0f64, |acc, &v| acc.max(v.max(1.0 / v)));
        if spread < 2.0 {
            break;
        }
    }
    scale
}
