//! Dual ratio test (CHUZC).
//!
//! Given the pivotal row of the revised tableau, select the entering
//! variable with a two-pass Harris ratio test extended by bound flipping
//! (BFRT): a relaxed first pass collects candidates, a second pass absorbs
//! breakpoints into groups while flipped variables can still soak up the
//! primal step, and the final pivot is the largest-magnitude entry of the
//! furthest admissible group, with an anti-cycling permutation breaking
//! ties.
//!
//! `DualRow` holds only per-iteration data; the engine state it reads is
//! passed in as slices.

use std::collections::BinaryHeap;

use log::debug;

use crate::linalg::hvector::HVector;

/// Breakpoint groups stop growing once select-theta passes this.
const MAX_SELECT_THETA: f64 = 1e18;
const INITIAL_TOTAL_CHANGE: f64 = 1e-12;
const INITIAL_REMAIN_THETA: f64 = 1e100;

/// Candidate counts below this use the quadratic group scan.
const QUAD_SORT_LIMIT: usize = 100;

/// Why the ratio test failed to deliver a pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChuzcFailure {
    /// The breakpoint grouping made no progress (numerical stall)
    Stalled,
    /// The chosen pivot would create dual infeasibilities
    WouldCreateInfeasibility,
}

/// Heap entry ordering candidates by ratio, smallest first.
#[derive(Debug, Clone, Copy)]
struct RatioEntry {
    ratio: f64,
    pos: usize,
}

impl PartialEq for RatioEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ratio == other.ratio && self.pos == other.pos
    }
}
impl Eq for RatioEntry {}
impl PartialOrd for RatioEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RatioEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we pop smallest ratios first.
        other
            .ratio
            .total_cmp(&self.ratio)
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

/// Per-iteration ratio-test state.
#[derive(Debug, Default)]
pub struct DualRow {
    /// Packed pivotal row: variable indices
    pub pack_index: Vec<usize>,
    /// Packed pivotal row: values
    pub pack_value: Vec<f64>,

    /// Candidates as (variable, normalized alpha), prefix of length
    /// `work_count` is live
    pub work_data: Vec<(usize, f64)>,
    /// Live candidate count
    pub work_count: usize,
    /// Breakpoint group boundaries into `work_data`
    pub work_group: Vec<usize>,

    /// Primal step to absorb (leaving variable's infeasibility, signed)
    pub work_delta: f64,
    /// Relaxed minimal ratio from pass A; raw dual step after the pivot is
    /// chosen
    pub work_theta: f64,
    /// Chosen entering variable
    pub work_pivot: Option<usize>,
    /// Raw pivotal-row value of the entering variable
    pub work_alpha: f64,

    /// Bound flips to apply: (variable, signed value change)
    pub flips: Vec<(usize, f64)>,
}

impl DualRow {
    /// Reset for a new iteration.
    pub fn clear(&mut self) {
        self.pack_index.clear();
        self.pack_value.clear();
        self.work_data.clear();
        self.work_count = 0;
        self.work_group.clear();
        self.work_delta = 0.0;
        self.work_theta = 0.0;
        self.work_pivot = None;
        self.work_alpha = 0.0;
        self.flips.clear();
    }

    /// Pack a row segment; `offset` shifts indices (logicals live after the
    /// structural columns).
    pub fn make_pack(&mut self, row: &HVector, offset: usize) {
        for (i, v) in row.iter() {
            if v != 0.0 {
                self.pack_index.push(i + offset);
                self.pack_value.push(v);
            }
        }
    }

    /// Pass A: collect candidates whose dual may block the step.
    ///
    /// `ta` is the attractiveness threshold, decaying with the update count;
    /// `td` the dual feasibility tolerance. Sets `work_theta` to the relaxed
    /// minimal ratio.
    pub fn choose_possible(&mut self, nonbasic_move: &[i8], work_dual: &[f64], ta: f64, td: f64) {
        let move_out = if self.work_delta < 0.0 { -1.0 } else { 1.0 };
        self.work_theta = f64::INFINITY;
        self.work_count = 0;
        self.work_data.clear();
        for k in 0..self.pack_index.len() {
            let col = self.pack_index[k];
            let mv = nonbasic_move[col] as f64;
            let alpha = self.pack_value[k] * move_out * mv;
            if alpha > ta {
                self.work_data.push((col, alpha));
                self.work_count += 1;
                let relax = work_dual[col] * mv + td;
                if self.work_theta * alpha > relax {
                    self.work_theta = relax / alpha;
                }
            }
        }
    }

    /// Passes B and C: BFRT reduction, breakpoint grouping, final pivot.
    ///
    /// `force_quad` bypasses the heap strategy after a verification failure.
    pub fn choose_final(
        &mut self,
        nonbasic_move: &[i8],
        work_dual: &[f64],
        work_range: &[f64],
        permutation: &[usize],
        td: f64,
        force_quad: bool,
    ) -> Result<(), ChuzcFailure> {
        // 1. Reduce by large-step BFRT: only candidates tight within a
        // widened theta can matter.
        let full_count = self.work_count;
        self.work_count = 0;
        let total_delta = self.work_delta.abs();
        let mut total_change = 0.0;
        let mut select_theta = 10.0 * self.work_theta + 1e-7;
        loop {
            for i in self.work_count..full_count {
                let (col, alpha) = self.work_data[i];
                let tight = nonbasic_move[col] as f64 * work_dual[col];
                if alpha * select_theta >= tight {
                    self.work_data.swap(self.work_count, i);
                    self.work_count += 1;
                    total_change += work_range[col] * alpha;
                }
            }
            select_theta *= 10.0;
            if total_change >= total_delta || self.work_count == full_count {
                break;
            }
        }

        // 2. Partition into breakpoint groups.
        let use_quad = force_quad || self.work_count < QUAD_SORT_LIMIT;
        if use_quad {
            self.group_quad(nonbasic_move, work_dual, work_range, td)?;
        } else {
            self.group_heap(nonbasic_move, work_dual, work_range, td)?;
        }

        // 3. Final pivot: largest alpha in the furthest acceptable group.
        let (break_index, break_group) = self.choose_final_large_alpha(permutation);
        let Some(break_index) = break_index else {
            return Err(ChuzcFailure::Stalled);
        };

        let move_out = if self.work_delta < 0.0 { -1.0 } else { 1.0 };
        let pivot = self.work_data[break_index].0;
        // Stored alphas are normalized; fold the signs back to the raw row
        // value.
        self.work_alpha =
            self.work_data[break_index].1 * move_out * nonbasic_move[pivot] as f64;
        self.work_pivot = Some(pivot);
        if work_dual[pivot] * nonbasic_move[pivot] as f64 > 0.0 {
            self.work_theta = work_dual[pivot] / self.work_alpha;
        } else {
            self.work_theta = 0.0;
        }

        // 4. Flip everything in the groups strictly before the pivot group.
        self.flips.clear();
        if self.work_theta != 0.0 {
            for i in 0..self.work_group[break_group] {
                let col = self.work_data[i].0;
                let mv = nonbasic_move[col] as f64;
                self.flips.push((col, mv * work_range[col]));
            }
            // Access columns in index order when building the flip column.
            self.flips.sort_unstable_by_key(|&(col, _)| col);
        }

        // The chosen step must leave every candidate dual-feasible after
        // its flip; a violation here falls back to the quadratic strategy.
        if !use_quad {
            let num_bad = self.count_would_be_infeasibilities(nonbasic_move, work_dual, td);
            if num_bad > 0 {
                debug!(
                    "heap-based ratio test would create {} dual infeasibilities",
                    num_bad
                );
                return Err(ChuzcFailure::WouldCreateInfeasibility);
            }
        }
        Ok(())
    }

    /// Quadratic breakpoint grouping: repeated scans of the candidate list.
    fn group_quad(
        &mut self,
        nonbasic_move: &[i8],
        work_dual: &[f64],
        work_range: &[f64],
        td: f64,
    ) -> Result<(), ChuzcFailure> {
        let full_count = self.work_count;
        self.work_count = 0;
        let total_delta = self.work_delta.abs();
        let mut total_change = INITIAL_TOTAL_CHANGE;
        let mut select_theta = self.work_theta;
        self.work_group.clear();
        self.work_group.push(0);

        let mut prev_count = self.work_count;
        let mut prev_select = select_theta;
        let mut prev_remain = INITIAL_REMAIN_THETA;
        while select_theta < MAX_SELECT_THETA {
            let mut remain_theta = INITIAL_REMAIN_THETA;
            for i in self.work_count..full_count {
                let (col, value) = self.work_data[i];
                let dual = nonbasic_move[col] as f64 * work_dual[col];
                if dual <= select_theta * value {
                    self.work_data.swap(self.work_count, i);
                    self.work_count += 1;
                    total_change += value * work_range[col];
                } else if dual + td < remain_theta * value {
                    remain_theta = (dual + td) / value;
                }
            }
            self.work_group.push(self.work_count);
            select_theta = remain_theta;
            // No movement in a full pass means we would loop forever.
            if self.work_count == prev_count
                && prev_select == select_theta
                && prev_remain == remain_theta
            {
                return Err(ChuzcFailure::Stalled);
            }
            prev_count = self.work_count;
            prev_select = select_theta;
            prev_remain = remain_theta;
            if total_change >= total_delta || self.work_count == full_count {
                break;
            }
        }
        if self.work_group.len() <= 1 {
            return Err(ChuzcFailure::Stalled);
        }
        Ok(())
    }

    /// Heap-based breakpoint grouping: sort candidates by ratio once, then
    /// sweep. Produces the same groups as the quadratic scan modulo
    /// tie-breaks.
    fn group_heap(
        &mut self,
        nonbasic_move: &[i8],
        work_dual: &[f64],
        work_range: &[f64],
        td: f64,
    ) -> Result<(), ChuzcFailure> {
        let full_count = self.work_count;
        let total_delta = self.work_delta.abs();
        let mut total_change = INITIAL_TOTAL_CHANGE;
        let mut select_theta = self.work_theta;

        let mut heap: BinaryHeap<RatioEntry> = BinaryHeap::with_capacity(full_count);
        for i in 0..full_count {
            let (col, value) = self.work_data[i];
            let dual = nonbasic_move[col] as f64 * work_dual[col];
            let ratio = dual / value;
            if ratio < MAX_SELECT_THETA {
                heap.push(RatioEntry { ratio, pos: i });
            }
        }
        if heap.is_empty() {
            return Err(ChuzcFailure::Stalled);
        }

        let mut sorted: Vec<(usize, f64)> = Vec::with_capacity(heap.len());
        self.work_group.clear();
        self.work_group.push(0);
        let mut group_open = false;
        while let Some(RatioEntry { pos, .. }) = heap.pop() {
            let (col, value) = self.work_data[pos];
            let dual = nonbasic_move[col] as f64 * work_dual[col];
            if dual > select_theta * value {
                // Next breakpoint group starts here.
                if group_open {
                    self.work_group.push(sorted.len());
                }
                select_theta = (dual + td) / value;
                if total_change >= total_delta {
                    break;
                }
            }
            sorted.push((col, value));
            total_change += value * work_range[col];
            group_open = true;
        }
        if group_open && *self.work_group.last().expect("seeded with 0") != sorted.len() {
            self.work_group.push(sorted.len());
        }
        self.work_count = sorted.len();
        // Install the sorted order as the live candidate prefix.
        for (i, entry) in sorted.into_iter().enumerate() {
            self.work_data[i] = entry;
        }
        if self.work_group.len() <= 1 {
            return Err(ChuzcFailure::Stalled);
        }
        Ok(())
    }

    /// Scan groups from the furthest breakpoint back, returning the entry
    /// with the largest alpha in the first group whose best alpha is
    /// acceptable. Ties go to the smaller anti-cycling permutation value.
    fn choose_final_large_alpha(&self, permutation: &[usize]) -> (Option<usize>, usize) {
        let mut final_compare = 0.0f64;
        for i in 0..self.work_count {
            final_compare = final_compare.max(self.work_data[i].1);
        }
        let final_compare = (0.1 * final_compare).min(1.0);

        let count_group = self.work_group.len() - 1;
        for group in (0..count_group).rev() {
            let mut best: Option<usize> = None;
            let mut best_alpha = 0.0;
            for i in self.work_group[group]..self.work_group[group + 1] {
                let (col, alpha) = self.work_data[i];
                let replace = match best {
                    None => true,
                    Some(b) => {
                        alpha > best_alpha
                            || (alpha == best_alpha
                                && permutation[col] < permutation[self.work_data[b].0])
                    }
                };
                if replace {
                    best = Some(i);
                    best_alpha = alpha;
                }
            }
            if let Some(i) = best {
                if best_alpha > final_compare {
                    return (Some(i), group);
                }
            }
        }
        (None, 0)
    }

    /// Count candidates whose dual would go infeasible under the chosen
    /// step, after accounting for their flip.
    fn count_would_be_infeasibilities(
        &self,
        nonbasic_move: &[i8],
        work_dual: &[f64],
        td: f64,
    ) -> usize {
        let mut num_bad = 0;
        for k in 0..self.pack_index.len() {
            let col = self.pack_index[k];
            let mv = nonbasic_move[col] as f64;
            if mv == 0.0 {
                continue;
            }
            let new_dual = work_dual[col] - self.work_theta * self.pack_value[k];
            let flipped = self.flips.iter().any(|&(c, _)| c == col);
            let feasibility = if flipped { -mv * new_dual } else { mv * new_dual };
            if feasibility < -td {
                num_bad += 1;
            }
        }
        num_bad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_row(dim: usize, entries: &[(usize, f64)]) -> HVector {
        let mut v = HVector::new(dim);
        for &(i, x) in entries {
            v.set(i, x);
        }
        v
    }

    /// Build a row with two candidates where the ratio test must pick the
    /// variable with the smaller dual ratio.
    #[test]
    fn test_simple_ratio_selection() {
        let mut row = DualRow::default();
        // Variables 0 and 1 at lower bound (move +1), leaving at upper
        // (delta > 0, move_out +1).
        let nonbasic_move: Vec<i8> = vec![1, 1, 0];
        let work_dual = vec![2.0, 0.5, 0.0];
        let work_range = vec![1e4, 1e4, 0.0];
        let permutation = vec![0, 1, 2];

        row.clear();
        row.work_delta = 1.0;
        row.make_pack(&packed_row(3, &[(0, 1.0), (1, 1.0)]), 0);
        row.choose_possible(&nonbasic_move, &work_dual, 1e-9, 1e-7);
        assert_eq!(row.work_count, 2);
        // Relaxed min ratio comes from variable 1: (0.5 + td) / 1.
        assert!(row.work_theta < 0.6);

        row.choose_final(&nonbasic_move, &work_dual, &work_range, &permutation, 1e-7, false)
            .expect("pivot exists");
        assert_eq!(row.work_pivot, Some(1));
        assert!((row.work_alpha - 1.0).abs() < 1e-12);
        assert!((row.work_theta - 0.5).abs() < 1e-12);
        assert!(row.flips.is_empty());
    }

    /// A candidate with a small range before the pivot's breakpoint is
    /// flipped rather than entering.
    #[test]
    fn test_bound_flip_before_pivot() {
        let mut row = DualRow::default();
        let nonbasic_move: Vec<i8> = vec![1, 1];
        let work_dual = vec![0.01, 1.0];
        // Variable 0 reaches its breakpoint first but has range 0.5, which
        // cannot absorb the full delta of 2; it is flipped and variable 1
        // enters.
        let work_range = vec![0.5, 1e5];
        let permutation = vec![0, 1];

        row.clear();
        row.work_delta = 2.0;
        row.make_pack(&packed_row(2, &[(0, 1.0), (1, 1.0)]), 0);
        row.choose_possible(&nonbasic_move, &work_dual, 1e-9, 1e-7);
        row.choose_final(&nonbasic_move, &work_dual, &work_range, &permutation, 1e-7, false)
            .expect("pivot exists");

        assert_eq!(row.work_pivot, Some(1));
        assert_eq!(row.flips.len(), 1);
        assert_eq!(row.flips[0].0, 0);
        assert!((row.flips[0].1 - 0.5).abs() < 1e-12);
    }

    /// Quadratic and heap strategies agree on the pivot for a larger row.
    #[test]
    fn test_quad_and_heap_agree() {
        let n = 150;
        let nonbasic_move: Vec<i8> = vec![1; n];
        let work_dual: Vec<f64> = (0..n).map(|i| 0.1 + (i as f64) * 0.01).collect();
        let work_range: Vec<f64> = vec![0.01; n];
        let permutation: Vec<usize> = (0..n).collect();
        let entries: Vec<(usize, f64)> =
            (0..n).map(|i| (i, 0.5 + ((i * 7) % 13) as f64 * 0.1)).collect();

        let run = |force_quad: bool| {
            let mut row = DualRow::default();
            row.clear();
            row.work_delta = 0.5;
            row.make_pack(&packed_row(n, &entries), 0);
            row.choose_possible(&nonbasic_move, &work_dual, 1e-9, 1e-7);
            row.choose_final(
                &nonbasic_move,
                &work_dual,
                &work_range,
                &permutation,
                1e-7,
                force_quad,
            )
            .expect("pivot exists");
            (row.work_pivot, row.work_theta)
        };

        let (quad_pivot, quad_theta) = run(true);
        let (heap_pivot, heap_theta) = run(false);
        assert_eq!(quad_pivot, heap_pivot);
        assert!((quad_theta - heap_theta).abs() < 1e-10);
    }

    /// Degenerate step (zero theta) must not flip anything.
    #[test]
    fn test_degenerate_step_no_flips() {
        let mut row = DualRow::default();
        let nonbasic_move: Vec<i8> = vec![1, 1];
        let work_dual = vec![0.0, 1.0];
        let work_range = vec![1.0, 1.0];
        let permutation = vec![0, 1];

        row.clear();
        row.work_delta = 1.0;
        row.make_pack(&packed_row(2, &[(0, 2.0), (1, 0.5)]), 0);
        row.choose_possible(&nonbasic_move, &work_dual, 1e-9, 1e-7);
        row.choose_final(&nonbasic_move, &work_dual, &work_range, &permutation, 1e-7, false)
            .expect("pivot exists");
        // Variable 0 has zero dual: theta is zero, no flips recorded.
        assert_eq!(row.work_theta, 0.0);
        assert!(row.flips.is_empty());
    }
}
