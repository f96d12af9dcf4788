//! Product-form basis updates.
//!
//! After a simplex pivot the new basis differs from the factorized one by a
//! rank-one change. Rather than refactorizing, the change is recorded as an
//! eta vector: the FTRAN-solved entering column together with its pivot row
//! and pivot value. FTRAN applies the accumulated etas after the triangular
//! solves, BTRAN applies them in reverse before.

use crate::linalg::hvector::HVector;

/// Outcome of appending one update to the eta file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Update recorded
    Ok,
    /// Pivot magnitude below the stability threshold
    Singular,
    /// The configured number of updates has been reached
    UpdateLimitReached,
    /// The eta column is too dense to be worth storing
    DensityTooHigh,
}

/// Eta columns may fill at most this fraction of the dimension.
const ETA_DENSITY_LIMIT: f64 = 0.3;

/// Accumulated product-form updates since the last refactorization.
#[derive(Debug, Clone, Default)]
pub struct ProductFormUpdate {
    num_row: usize,
    update_limit: usize,
    pivot_index: Vec<usize>,
    pivot_value: Vec<f64>,
    start: Vec<usize>,
    index: Vec<usize>,
    value: Vec<f64>,
    /// Work units spent applying etas since the last clear
    apply_tick: f64,
}

impl ProductFormUpdate {
    /// Create an empty update region for the given dimension.
    pub fn new(num_row: usize, update_limit: usize) -> Self {
        Self {
            num_row,
            update_limit,
            pivot_index: Vec::new(),
            pivot_value: Vec::new(),
            start: vec![0],
            index: Vec::new(),
            value: Vec::new(),
            apply_tick: 0.0,
        }
    }

    /// Number of recorded updates.
    pub fn update_count(&self) -> usize {
        self.pivot_index.len()
    }

    /// Drop every recorded update.
    pub fn clear(&mut self) {
        self.pivot_index.clear();
        self.pivot_value.clear();
        self.start.clear();
        self.start.push(0);
        self.index.clear();
        self.value.clear();
        self.apply_tick = 0.0;
    }

    /// Reset for a new dimension or limit, clearing all updates.
    pub fn setup(&mut self, num_row: usize, update_limit: usize) {
        self.num_row = num_row;
        self.update_limit = update_limit;
        self.clear();
    }

    /// Work units spent in [`ProductFormUpdate::ftran`] and
    /// [`ProductFormUpdate::btran`] since the last clear.
    pub fn apply_tick(&self) -> f64 {
        self.apply_tick
    }

    /// Whether another update region is compatible with this factorization
    /// generation (same dimension; used when reinstalling a frozen region).
    pub fn same_dimension(&self, other: &ProductFormUpdate) -> bool {
        self.num_row == other.num_row
    }

    /// Record the pivot from an FTRAN-solved entering column.
    ///
    /// `aq` is B^{-1} a_q including previously recorded etas; `row_out` is
    /// the leaving row. On anything but `Ok` nothing is recorded and the
    /// caller must refactorize.
    pub fn update(&mut self, aq: &HVector, row_out: usize, pivot_tol: f64) -> UpdateStatus {
        let pivot = aq.array[row_out];
        if pivot.abs() < pivot_tol {
            return UpdateStatus::Singular;
        }
        if self.update_count() >= self.update_limit {
            return UpdateStatus::UpdateLimitReached;
        }
        if self.num_row > 0 && aq.count as f64 > ETA_DENSITY_LIMIT * self.num_row as f64 {
            return UpdateStatus::DensityTooHigh;
        }
        for (i, v) in aq.iter() {
            if i != row_out && v != 0.0 {
                self.index.push(i);
                self.value.push(v);
            }
        }
        self.start.push(self.index.len());
        self.pivot_index.push(row_out);
        self.pivot_value.push(pivot);
        UpdateStatus::Ok
    }

    /// Apply the updates to an FTRAN result, oldest first.
    pub fn ftran(&mut self, rhs: &mut HVector) {
        for k in 0..self.update_count() {
            let p = self.pivot_index[k];
            let xp = rhs.array[p];
            if xp == 0.0 {
                continue;
            }
            let xp = xp / self.pivot_value[k];
            rhs.set(p, xp);
            for t in self.start[k]..self.start[k + 1] {
                rhs.add(self.index[t], -self.value[t] * xp);
            }
            self.apply_tick += (self.start[k + 1] - self.start[k]) as f64 + 1.0;
        }
    }

    /// Apply the updates to a BTRAN right-hand side, newest first.
    pub fn btran(&mut self, rhs: &mut HVector) {
        for k in (0..self.update_count()).rev() {
            let p = self.pivot_index[k];
            let mut acc = rhs.array[p];
            let mut any = acc != 0.0;
            for t in self.start[k]..self.start[k + 1] {
                let yi = rhs.array[self.index[t]];
                if yi != 0.0 {
                    acc -= self.value[t] * yi;
                    any = true;
                }
            }
            if any {
                rhs.set(p, acc / self.pivot_value[k]);
            }
            self.apply_tick += (self.start[k + 1] - self.start[k]) as f64 + 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(dim: usize, entries: &[(usize, f64)]) -> HVector {
        let mut v = HVector::new(dim);
        for &(i, x) in entries {
            v.set(i, x);
        }
        v
    }

    #[test]
    fn test_update_then_ftran_btran_inverse_pair() {
        // E has column 1 replaced by aq = (0.5, 2.0, 1.0).
        let mut pf = ProductFormUpdate::new(3, 10);
        let aq = vec_of(3, &[(0, 0.5), (1, 2.0), (2, 1.0)]);
        assert_eq!(pf.update(&aq, 1, 1e-10), UpdateStatus::Ok);

        // ftran solves E x = b.
        let mut x = vec_of(3, &[(0, 1.0), (1, 4.0), (2, 2.0)]);
        pf.ftran(&mut x);
        // x1 = 4/2 = 2; x0 = 1 - 0.5*2 = 0; x2 = 2 - 1*2 = 0.
        assert!((x.array[1] - 2.0).abs() < 1e-12);
        assert!(x.array[0].abs() < 1e-12);
        assert!(x.array[2].abs() < 1e-12);

        // btran solves E^T y = b: check E^T y recovers b.
        let mut y = vec_of(3, &[(0, 1.0), (1, 3.0), (2, -1.0)]);
        pf.btran(&mut y);
        // row 1 of E^T is aq, others unit: verify aq . y == 3.
        let dot = 0.5 * y.array[0] + 2.0 * y.array[1] + 1.0 * y.array[2];
        assert!((dot - 3.0).abs() < 1e-12);
        assert!((y.array[0] - 1.0).abs() < 1e-12);
        assert!((y.array[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_pivot_rejected() {
        let mut pf = ProductFormUpdate::new(2, 10);
        let aq = vec_of(2, &[(0, 1e-12), (1, 1.0)]);
        assert_eq!(pf.update(&aq, 0, 1e-10), UpdateStatus::Singular);
        assert_eq!(pf.update_count(), 0);
    }

    #[test]
    fn test_update_limit() {
        let mut pf = ProductFormUpdate::new(2, 1);
        let aq = vec_of(2, &[(0, 1.0)]);
        assert_eq!(pf.update(&aq, 0, 1e-10), UpdateStatus::Ok);
        assert_eq!(pf.update(&aq, 0, 1e-10), UpdateStatus::UpdateLimitReached);
    }

    #[test]
    fn test_density_refused() {
        let mut pf = ProductFormUpdate::new(10, 100);
        let entries: Vec<(usize, f64)> = (0..10).map(|i| (i, 1.0)).collect();
        let aq = vec_of(10, &entries);
        assert_eq!(pf.update(&aq, 0, 1e-10), UpdateStatus::DensityTooHigh);
    }
}
