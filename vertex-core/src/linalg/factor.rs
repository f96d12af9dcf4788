//! LU factorization of the basis matrix.
//!
//! The basis matrix B is factorized as a permuted product L U using
//! left-looking sparse elimination. Pivot selection is Markowitz-style:
//! columns are processed in order of increasing fill potential, and within a
//! column the pivot must pass a relative stability threshold, with ties
//! broken towards the row with the fewest basis-matrix entries.
//!
//! FTRAN solves B x = r and BTRAN solves B^T x = r. Both choose between a
//! hyper-sparse sweep (heap-ordered processing of the nonzero pattern) and a
//! dense sweep, driven by the caller's expected-density hint and the actual
//! right-hand side count. Product-form updates are applied by the NLA layer
//! on top of these solves, not here.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;

use crate::linalg::hvector::HVector;

/// Factorization errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorError {
    /// A column produced no acceptable pivot. The caller replaces the basic
    /// variable at `basis_position` with the logical of `repair_row` and
    /// retries.
    #[error("singular basis: position {basis_position} has no acceptable pivot")]
    Singular {
        /// Position in `base_index` of the offending column
        basis_position: usize,
        /// An unpivoted row whose logical can repair the basis
        repair_row: usize,
    },
}

/// Pivots smaller than this in absolute value are treated as zero.
const MIN_ABS_PIVOT: f64 = 1e-11;

/// Right-hand sides denser than this fraction take the dense sweep.
const SPARSE_SOLVE_DENSITY: f64 = 0.1;

/// LU factors of the current basis matrix.
///
/// All factor arrays live in pivot-position space: position `k` is the k-th
/// elimination step, `pos_to_row[k]` its original row and `pos_to_basis[k]`
/// its position in `base_index`. L is unit lower triangular (diagonal
/// implicit), U is upper triangular with pivots stored separately. Row-wise
/// copies of both factors serve the transposed solves.
#[derive(Debug, Clone, Default)]
pub struct Factor {
    num_row: usize,
    pivot_threshold: f64,

    l_start: Vec<usize>,
    l_index: Vec<usize>,
    l_value: Vec<f64>,
    lr_start: Vec<usize>,
    lr_index: Vec<usize>,
    lr_value: Vec<f64>,

    u_pivot: Vec<f64>,
    u_start: Vec<usize>,
    u_index: Vec<usize>,
    u_value: Vec<f64>,
    ur_start: Vec<usize>,
    ur_index: Vec<usize>,
    ur_value: Vec<f64>,

    pos_to_row: Vec<usize>,
    row_to_pos: Vec<usize>,
    pos_to_basis: Vec<usize>,
    basis_to_pos: Vec<usize>,

    build_tick: f64,
    valid: bool,
}

impl Factor {
    /// Create an empty factor for the given dimension.
    pub fn new(num_row: usize, pivot_threshold: f64) -> Self {
        Self {
            num_row,
            pivot_threshold: pivot_threshold.clamp(1e-4, 1.0),
            ..Default::default()
        }
    }

    /// Whether a successful factorization is installed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Dimension of the basis matrix.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Synthetic work units of the last build.
    pub fn build_tick(&self) -> f64 {
        self.build_tick
    }

    /// Current stability threshold.
    pub fn pivot_threshold(&self) -> f64 {
        self.pivot_threshold
    }

    /// Tighten or relax the stability threshold for the next build.
    pub fn set_pivot_threshold(&mut self, threshold: f64) {
        self.pivot_threshold = threshold.clamp(1e-4, 1.0);
    }

    /// Factorize the basis described by `get_col`.
    ///
    /// `get_col(c, &mut buf)` fills `buf` with the (row, value) entries of
    /// the basis column at position `c`. On singularity no factorization is
    /// installed and the error names the offending position and a repair row.
    pub fn invert<F>(&mut self, num_row: usize, get_col: F) -> Result<(), FactorError>
    where
        F: Fn(usize, &mut Vec<(usize, f64)>),
    {
        self.num_row = num_row;
        self.valid = false;
        self.build_tick = 0.0;
        let m = num_row;

        // Gather the basis matrix once so row counts and a column ordering
        // can be derived before elimination starts.
        let mut bc_start = Vec::with_capacity(m + 1);
        let mut bc_index = Vec::new();
        let mut bc_value = Vec::new();
        let mut row_count = vec![0usize; m];
        let mut buf: Vec<(usize, f64)> = Vec::new();
        bc_start.push(0);
        for c in 0..m {
            buf.clear();
            get_col(c, &mut buf);
            for &(i, v) in buf.iter() {
                debug_assert!(i < m);
                if v != 0.0 {
                    bc_index.push(i);
                    bc_value.push(v);
                    row_count[i] += 1;
                }
            }
            bc_start.push(bc_index.len());
        }

        // Process columns in order of ascending count: singleton (logical)
        // columns pivot first, the bump is eliminated last.
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by_key(|&c| (bc_start[c + 1] - bc_start[c], c));

        self.pos_to_row = vec![usize::MAX; m];
        self.row_to_pos = vec![usize::MAX; m];
        self.pos_to_basis = vec![usize::MAX; m];
        self.basis_to_pos = vec![usize::MAX; m];

        // L columns carry original row indices during the build; they are
        // remapped to positions once every row has a pivot.
        let mut l_start = Vec::with_capacity(m + 1);
        let mut l_index: Vec<usize> = Vec::new();
        let mut l_value: Vec<f64> = Vec::new();
        let mut u_start = Vec::with_capacity(m + 1);
        let mut u_index: Vec<usize> = Vec::new();
        let mut u_value: Vec<f64> = Vec::new();
        let mut u_pivot = vec![0.0; m];
        l_start.push(0);
        u_start.push(0);

        let mut work = vec![0.0f64; m];
        let mut touched: Vec<usize> = Vec::new();
        let mut in_heap = vec![false; m];
        let mut heap: BinaryHeap<Reverse<usize>> = BinaryHeap::new();

        for k in 0..m {
            let c = order[k];

            // Scatter column c.
            touched.clear();
            for t in bc_start[c]..bc_start[c + 1] {
                let i = bc_index[t];
                work[i] = bc_value[t];
                touched.push(i);
                let pos = self.row_to_pos[i];
                if pos != usize::MAX {
                    heap.push(Reverse(pos));
                    in_heap[pos] = true;
                }
            }

            // Sparse left-looking elimination: apply earlier L columns in
            // pivot order, discovering fill as it appears.
            while let Some(Reverse(t)) = heap.pop() {
                in_heap[t] = false;
                let wp = work[self.pos_to_row[t]];
                if wp == 0.0 {
                    continue;
                }
                self.build_tick += (l_start[t + 1] - l_start[t]) as f64 + 1.0;
                for e in l_start[t]..l_start[t + 1] {
                    let i = l_index[e];
                    if work[i] == 0.0 {
                        touched.push(i);
                    }
                    work[i] -= l_value[e] * wp;
                    let pos = self.row_to_pos[i];
                    if pos != usize::MAX && !in_heap[pos] && work[i] != 0.0 {
                        heap.push(Reverse(pos));
                        in_heap[pos] = true;
                    }
                }
            }

            // Split the worked column into its U part (pivoted rows) and the
            // pivot candidates (unpivoted rows).
            let mut max_abs = 0.0f64;
            for &i in touched.iter() {
                if self.row_to_pos[i] == usize::MAX {
                    max_abs = max_abs.max(work[i].abs());
                }
            }

            if max_abs < MIN_ABS_PIVOT {
                // Singular: clean up and report.
                for &i in touched.iter() {
                    work[i] = 0.0;
                }
                let repair_row = (0..m)
                    .find(|&i| self.row_to_pos[i] == usize::MAX)
                    .expect("a singular step leaves an unpivoted row");
                return Err(FactorError::Singular {
                    basis_position: c,
                    repair_row,
                });
            }

            let accept = self.pivot_threshold * max_abs;
            let mut pivot_row = usize::MAX;
            let mut pivot_count = usize::MAX;
            for &i in touched.iter() {
                if self.row_to_pos[i] != usize::MAX {
                    continue;
                }
                let a = work[i].abs();
                if a >= accept && (row_count[i] < pivot_count
                    || (row_count[i] == pivot_count && i < pivot_row))
                {
                    pivot_row = i;
                    pivot_count = row_count[i];
                }
            }
            debug_assert!(pivot_row != usize::MAX);
            let pivot = work[pivot_row];

            for &i in touched.iter() {
                let v = work[i];
                work[i] = 0.0;
                if v == 0.0 || i == pivot_row {
                    continue;
                }
                let pos = self.row_to_pos[i];
                if pos != usize::MAX {
                    u_index.push(pos);
                    u_value.push(v);
                } else {
                    l_index.push(i);
                    l_value.push(v / pivot);
                }
            }
            l_start.push(l_index.len());
            u_start.push(u_index.len());
            u_pivot[k] = pivot;
            self.build_tick += touched.len() as f64;

            self.pos_to_row[k] = pivot_row;
            self.row_to_pos[pivot_row] = k;
            self.pos_to_basis[k] = c;
            self.basis_to_pos[c] = k;
        }

        // Remap L rows from original indices to pivot positions.
        for e in 0..l_index.len() {
            l_index[e] = self.row_to_pos[l_index[e]];
        }

        self.l_start = l_start;
        self.l_index = l_index;
        self.l_value = l_value;
        self.u_start = u_start;
        self.u_index = u_index;
        self.u_value = u_value;
        self.u_pivot = u_pivot;
        self.build_row_copies();
        self.valid = true;
        Ok(())
    }

    /// Build the row-wise copies of L and U used by the transposed solves.
    fn build_row_copies(&mut self) {
        let m = self.num_row;
        let transpose = |start: &[usize], index: &[usize], value: &[f64]| {
            let nnz = index.len();
            let mut t_start = vec![0usize; m + 1];
            for &i in index {
                t_start[i + 1] += 1;
            }
            for i in 0..m {
                t_start[i + 1] += t_start[i];
            }
            let mut fill = t_start.clone();
            let mut t_index = vec![0usize; nnz];
            let mut t_value = vec![0.0; nnz];
            for k in 0..m {
                for e in start[k]..start[k + 1] {
                    let i = index[e];
                    let p = fill[i];
                    t_index[p] = k;
                    t_value[p] = value[e];
                    fill[i] += 1;
                }
            }
            (t_start, t_index, t_value)
        };
        let (ls, li, lv) = transpose(&self.l_start, &self.l_index, &self.l_value);
        self.lr_start = ls;
        self.lr_index = li;
        self.lr_value = lv;
        let (us, ui, uv) = transpose(&self.u_start, &self.u_index, &self.u_value);
        self.ur_start = us;
        self.ur_index = ui;
        self.ur_value = uv;
    }

    /// Solve B x = rhs in place.
    ///
    /// On input `rhs` is indexed by original row; on output it is indexed by
    /// basis position (entry `j` is the value of the j-th basic variable).
    pub fn ftran(&self, rhs: &mut HVector, expected_density: f64) -> f64 {
        debug_assert!(self.valid);
        let m = self.num_row;
        let mut z = vec![0.0f64; m];
        let mut pattern: Vec<usize> = Vec::with_capacity(rhs.count);
        for (i, v) in rhs.iter() {
            if v != 0.0 {
                let k = self.row_to_pos[i];
                z[k] = v;
                pattern.push(k);
            }
        }
        let sparse = self.prefer_sparse(pattern.len(), expected_density);
        let mut tick = 0.0;

        if sparse {
            // Forward L-solve over the discovered pattern.
            let mut heap: BinaryHeap<Reverse<usize>> = pattern.iter().map(|&k| Reverse(k)).collect();
            let mut seen = vec![false; m];
            for &k in &pattern {
                seen[k] = true;
            }
            pattern.clear();
            while let Some(Reverse(k)) = heap.pop() {
                pattern.push(k);
                let zk = z[k];
                if zk == 0.0 {
                    continue;
                }
                tick += (self.l_start[k + 1] - self.l_start[k]) as f64 + 1.0;
                for e in self.l_start[k]..self.l_start[k + 1] {
                    let i = self.l_index[e];
                    z[i] -= self.l_value[e] * zk;
                    if !seen[i] {
                        seen[i] = true;
                        heap.push(Reverse(i));
                    }
                }
            }
            // Backward U-solve, largest position first.
            let mut heap: BinaryHeap<usize> = pattern.iter().copied().collect();
            let mut seen = vec![false; m];
            for &k in &pattern {
                seen[k] = true;
            }
            pattern.clear();
            while let Some(k) = heap.pop() {
                if z[k] == 0.0 {
                    continue;
                }
                z[k] /= self.u_pivot[k];
                pattern.push(k);
                let zk = z[k];
                tick += (self.u_start[k + 1] - self.u_start[k]) as f64 + 1.0;
                for e in self.u_start[k]..self.u_start[k + 1] {
                    let i = self.u_index[e];
                    z[i] -= self.u_value[e] * zk;
                    if !seen[i] {
                        seen[i] = true;
                        heap.push(i);
                    }
                }
            }
            rhs.clear();
            for &k in &pattern {
                if z[k] != 0.0 {
                    rhs.set(self.pos_to_basis[k], z[k]);
                }
            }
        } else {
            for k in 0..m {
                let zk = z[k];
                if zk == 0.0 {
                    continue;
                }
                for e in self.l_start[k]..self.l_start[k + 1] {
                    z[self.l_index[e]] -= self.l_value[e] * zk;
                }
            }
            for k in (0..m).rev() {
                if z[k] == 0.0 {
                    continue;
                }
                z[k] /= self.u_pivot[k];
                let zk = z[k];
                for e in self.u_start[k]..self.u_start[k + 1] {
                    z[self.u_index[e]] -= self.u_value[e] * zk;
                }
            }
            tick += self.l_index.len() as f64 + self.u_index.len() as f64;
            rhs.clear();
            for (k, &zk) in z.iter().enumerate() {
                if zk != 0.0 {
                    rhs.set(self.pos_to_basis[k], zk);
                }
            }
        }
        tick
    }

    /// Solve B^T x = rhs in place.
    ///
    /// On input `rhs` is indexed by basis position; on output it is indexed
    /// by original row.
    pub fn btran(&self, rhs: &mut HVector, expected_density: f64) -> f64 {
        debug_assert!(self.valid);
        let m = self.num_row;
        let mut z = vec![0.0f64; m];
        let mut pattern: Vec<usize> = Vec::with_capacity(rhs.count);
        for (j, v) in rhs.iter() {
            if v != 0.0 {
                let k = self.basis_to_pos[j];
                z[k] = v;
                pattern.push(k);
            }
        }
        let sparse = self.prefer_sparse(pattern.len(), expected_density);
        let mut tick = 0.0;

        if sparse {
            // Forward U^T-solve via the row-wise copy of U.
            let mut heap: BinaryHeap<Reverse<usize>> = pattern.iter().map(|&k| Reverse(k)).collect();
            let mut seen = vec![false; m];
            for &k in &pattern {
                seen[k] = true;
            }
            pattern.clear();
            while let Some(Reverse(k)) = heap.pop() {
                if z[k] == 0.0 {
                    continue;
                }
                z[k] /= self.u_pivot[k];
                pattern.push(k);
                let zk = z[k];
                tick += (self.ur_start[k + 1] - self.ur_start[k]) as f64 + 1.0;
                for e in self.ur_start[k]..self.ur_start[k + 1] {
                    let i = self.ur_index[e];
                    z[i] -= self.ur_value[e] * zk;
                    if !seen[i] {
                        seen[i] = true;
                        heap.push(Reverse(i));
                    }
                }
            }
            // Backward L^T-solve via the row-wise copy of L.
            let mut heap: BinaryHeap<usize> = pattern.iter().copied().collect();
            let mut seen = vec![false; m];
            for &k in &pattern {
                seen[k] = true;
            }
            pattern.clear();
            while let Some(k) = heap.pop() {
                let zk = z[k];
                pattern.push(k);
                if zk == 0.0 {
                    continue;
                }
                tick += (self.lr_start[k + 1] - self.lr_start[k]) as f64 + 1.0;
                for e in self.lr_start[k]..self.lr_start[k + 1] {
                    let i = self.lr_index[e];
                    z[i] -= self.lr_value[e] * zk;
                    if !seen[i] {
                        seen[i] = true;
                        heap.push(i);
                    }
                }
            }
            rhs.clear();
            for &k in &pattern {
                if z[k] != 0.0 {
                    rhs.set(self.pos_to_row[k], z[k]);
                }
            }
        } else {
            for k in 0..m {
                if z[k] == 0.0 {
                    continue;
                }
                z[k] /= self.u_pivot[k];
                let zk = z[k];
                for e in self.ur_start[k]..self.ur_start[k + 1] {
                    z[self.ur_index[e]] -= self.ur_value[e] * zk;
                }
            }
            for k in (0..m).rev() {
                let zk = z[k];
                if zk == 0.0 {
                    continue;
                }
                for e in self.lr_start[k]..self.lr_start[k + 1] {
                    z[self.lr_index[e]] -= self.lr_value[e] * zk;
                }
            }
            tick += self.lr_index.len() as f64 + self.ur_index.len() as f64;
            rhs.clear();
            for (k, &zk) in z.iter().enumerate() {
                if zk != 0.0 {
                    rhs.set(self.pos_to_row[k], zk);
                }
            }
        }
        tick
    }

    fn prefer_sparse(&self, rhs_count: usize, expected_density: f64) -> bool {
        let m = self.num_row.max(1);
        expected_density < SPARSE_SOLVE_DENSITY
            && (rhs_count as f64) < SPARSE_SOLVE_DENSITY * m as f64
    }
}
