//! Pseudocost bookkeeping for branching decisions.
//!
//! Per column, running averages of the objective gain per unit of
//! fractional change in each direction, together with inference and cutoff
//! statistics and their global averages. Columns with too few samples blend
//! their own average with the global one until `minreliable` samples have
//! accumulated.

/// Pseudocost statistics over all columns.
#[derive(Debug, Clone)]
pub struct Pseudocost {
    pseudocost_up: Vec<f64>,
    pseudocost_down: Vec<f64>,
    nsamples_up: Vec<u32>,
    nsamples_down: Vec<u32>,
    inferences_up: Vec<f64>,
    inferences_down: Vec<f64>,
    ninferences_up: Vec<u32>,
    ninferences_down: Vec<u32>,
    ncutoffs_up: Vec<u32>,
    ncutoffs_down: Vec<u32>,

    cost_total: f64,
    inferences_total: f64,
    nsamples_total: u64,
    ninferences_total: u64,
    ncutoffs_total: u64,
    minreliable: u32,
}

impl Pseudocost {
    /// Create empty statistics for `num_col` columns.
    pub fn new(num_col: usize, minreliable: u32) -> Self {
        Self {
            pseudocost_up: vec![0.0; num_col],
            pseudocost_down: vec![0.0; num_col],
            nsamples_up: vec![0; num_col],
            nsamples_down: vec![0; num_col],
            inferences_up: vec![0.0; num_col],
            inferences_down: vec![0.0; num_col],
            ninferences_up: vec![0; num_col],
            ninferences_down: vec![0; num_col],
            ncutoffs_up: vec![0; num_col],
            ncutoffs_down: vec![0; num_col],
            cost_total: 0.0,
            inferences_total: 0.0,
            nsamples_total: 0,
            ninferences_total: 0,
            ncutoffs_total: 0,
            minreliable,
        }
    }

    /// Samples recorded for a column over both directions.
    pub fn num_observations(&self, col: usize) -> u32 {
        self.nsamples_up[col] + self.nsamples_down[col]
    }

    /// Whether both directions have reached the reliability threshold.
    pub fn is_reliable(&self, col: usize) -> bool {
        self.nsamples_up[col].min(self.nsamples_down[col]) >= self.minreliable
    }

    /// Record an objective observation: branching moved the column by
    /// `delta` (signed, positive for the up branch) and the relaxation
    /// objective rose by `objdelta >= 0`.
    pub fn add_observation(&mut self, col: usize, delta: f64, objdelta: f64) {
        debug_assert!(delta != 0.0);
        debug_assert!(objdelta >= 0.0);
        let unit_gain = objdelta / delta.abs();
        if delta > 0.0 {
            self.nsamples_up[col] += 1;
            let d = unit_gain - self.pseudocost_up[col];
            self.pseudocost_up[col] += d / self.nsamples_up[col] as f64;
        } else {
            self.nsamples_down[col] += 1;
            let d = unit_gain - self.pseudocost_down[col];
            self.pseudocost_down[col] += d / self.nsamples_down[col] as f64;
        }
        self.nsamples_total += 1;
        let d = unit_gain - self.cost_total;
        self.cost_total += d / self.nsamples_total as f64;
    }

    /// Record that a branch in the given direction was cut off by bound.
    pub fn add_cutoff_observation(&mut self, col: usize, up_branch: bool) {
        self.ncutoffs_total += 1;
        if up_branch {
            self.ncutoffs_up[col] += 1;
        } else {
            self.ncutoffs_down[col] += 1;
        }
    }

    /// Record the number of bound tightenings a branch implied.
    pub fn add_inference_observation(&mut self, col: usize, ninferences: u32, up_branch: bool) {
        self.ninferences_total += 1;
        let d = ninferences as f64 - self.inferences_total;
        self.inferences_total += d / self.ninferences_total as f64;
        if up_branch {
            self.ninferences_up[col] += 1;
            let d = ninferences as f64 - self.inferences_up[col];
            self.inferences_up[col] += d / self.ninferences_up[col] as f64;
        } else {
            self.ninferences_down[col] += 1;
            let d = ninferences as f64 - self.inferences_down[col];
            self.inferences_down[col] += d / self.ninferences_down[col] as f64;
        }
    }

    /// Global average unit gain.
    pub fn avg_pseudocost(&self) -> f64 {
        self.cost_total
    }

    /// Estimated objective gain of the up branch of a column at `frac`,
    /// blending towards the global average while unreliable.
    pub fn pseudocost_up(&self, col: usize, frac: f64) -> f64 {
        let up = frac.ceil() - frac;
        let n = self.nsamples_up[col];
        let cost = if n < self.minreliable {
            let weight = if n == 0 {
                0.0
            } else {
                0.75 + 0.25 * n as f64 / self.minreliable as f64
            };
            weight * self.pseudocost_up[col] + (1.0 - weight) * self.cost_total
        } else {
            self.pseudocost_up[col]
        };
        up * cost
    }

    /// Estimated objective gain of the down branch.
    pub fn pseudocost_down(&self, col: usize, frac: f64) -> f64 {
        let down = frac - frac.floor();
        let n = self.nsamples_down[col];
        let cost = if n < self.minreliable {
            let weight = if n == 0 {
                0.0
            } else {
                0.75 + 0.25 * n as f64 / self.minreliable as f64
            };
            weight * self.pseudocost_down[col] + (1.0 - weight) * self.cost_total
        } else {
            self.pseudocost_down[col]
        };
        down * cost
    }

    /// Composite branching score of a column at fractional value `frac`.
    ///
    /// Geometric means of the up/down cost, cutoff-rate and inference
    /// statistics, each normalized by its global average and squashed by
    /// `map(s) = 1 - 1/(1+s)`; the cutoff and inference parts enter with a
    /// small weight.
    pub fn score(&self, col: usize, frac: f64) -> f64 {
        let up_cost = self.pseudocost_up(col, frac);
        let down_cost = self.pseudocost_down(col, frac);
        let cost_score = (up_cost * down_cost).sqrt() / self.cost_total.max(1e-6);

        let inference_score = (self.inferences_up[col] * self.inferences_down[col]).sqrt()
            / self.inferences_total.max(1e-6);

        let cutoff_rate_up = self.ncutoffs_up[col] as f64
            / (self.ncutoffs_up[col] + self.nsamples_up[col]).max(1) as f64;
        let cutoff_rate_down = self.ncutoffs_down[col] as f64
            / (self.ncutoffs_down[col] + self.nsamples_down[col]).max(1) as f64;
        let avg_cutoff_rate = self.ncutoffs_total as f64
            / (self.nsamples_total + self.ncutoffs_total).max(1) as f64;
        let cutoff_score = (cutoff_rate_up * cutoff_rate_down).sqrt() / avg_cutoff_rate.max(1e-6);

        let map = |s: f64| 1.0 - 1.0 / (1.0 + s);
        map(cost_score) + 1e-4 * (map(cutoff_score) + map(inference_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_running_average() {
        let mut pc = Pseudocost::new(2, 8);
        pc.add_observation(0, 0.5, 1.0); // up, unit gain 2
        pc.add_observation(0, 0.5, 2.0); // up, unit gain 4
        pc.add_observation(0, -0.5, 0.5); // down, unit gain 1

        assert_eq!(pc.nsamples_up[0], 2);
        assert_eq!(pc.nsamples_down[0], 1);
        assert!((pc.pseudocost_up[0] - 3.0).abs() < 1e-12);
        assert!((pc.pseudocost_down[0] - 1.0).abs() < 1e-12);
        // Global average over all three samples: (2 + 4 + 1) / 3.
        assert!((pc.avg_pseudocost() - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_reliability_blend() {
        let mut pc = Pseudocost::new(1, 8);
        // Unsampled column estimates from the global average alone.
        pc.add_observation(0, 0.5, 1.0);
        let up = pc.pseudocost_up(0, 0.5);
        // One up sample with minreliable 8: blend (0.75 + 0.25/8) of own
        // cost with the rest of the global average.
        let weight = 0.75 + 0.25 / 8.0;
        let expected = 0.5 * (weight * 2.0 + (1.0 - weight) * 2.0);
        assert!((up - expected).abs() < 1e-12);
        assert!(!pc.is_reliable(0));
    }

    #[test]
    fn test_score_prefers_higher_gains() {
        let mut pc = Pseudocost::new(2, 1);
        pc.add_observation(0, 0.5, 4.0);
        pc.add_observation(0, -0.5, 4.0);
        pc.add_observation(1, 0.5, 0.1);
        pc.add_observation(1, -0.5, 0.1);

        let s0 = pc.score(0, 0.5);
        let s1 = pc.score(1, 0.5);
        assert!(s0 > s1, "score(0)={} score(1)={}", s0, s1);
    }

    #[test]
    fn test_cutoff_and_inference_feed_score() {
        let mut pc = Pseudocost::new(1, 1);
        pc.add_observation(0, 0.5, 1.0);
        pc.add_observation(0, -0.5, 1.0);
        let base = pc.score(0, 0.5);
        pc.add_cutoff_observation(0, true);
        pc.add_cutoff_observation(0, false);
        pc.add_inference_observation(0, 3, true);
        pc.add_inference_observation(0, 2, false);
        let boosted = pc.score(0, 0.5);
        assert!(boosted > base);
    }
}
