//! Branching variable selection.

use super::node::{BoundChange, BranchOrigin};
use super::pseudocost::Pseudocost;
use crate::model::MipProblem;

/// A branching decision.
#[derive(Debug, Clone)]
pub struct BranchDecision {
    /// Column to branch on.
    pub col: usize,

    /// Current (fractional) value.
    pub value: f64,

    /// Bound change for the down branch (x <= floor(value)).
    pub down_branch: BoundChange,

    /// Bound change for the up branch (x >= ceil(value)).
    pub up_branch: BoundChange,

    /// Score of this decision (for logging).
    pub score: f64,
}

impl BranchDecision {
    /// Branch origins for the two children, for pseudocost updates.
    pub fn origins(&self, parent_obj: f64) -> (BranchOrigin, BranchOrigin) {
        let frac = self.value - self.value.floor();
        (
            BranchOrigin {
                col: self.col,
                delta: -frac,
                parent_obj,
            },
            BranchOrigin {
                col: self.col,
                delta: 1.0 - frac,
                parent_obj,
            },
        )
    }
}

/// Pseudocost branching selector.
pub struct BranchingSelector {
    /// Pseudocost statistics shared across the tree.
    pub pseudocost: Pseudocost,
}

impl BranchingSelector {
    /// Create a selector for `num_col` columns.
    pub fn new(num_col: usize, minreliable: u32) -> Self {
        Self {
            pseudocost: Pseudocost::new(num_col, minreliable),
        }
    }

    /// Select a branching column; `None` when `x` is integer feasible.
    ///
    /// Columns are ranked by the pseudocost score, with fractionality as
    /// the tie-break (which also drives the choice before any samples
    /// exist).
    pub fn select(
        &self,
        x: &[f64],
        bounds: (&[f64], &[f64]),
        prob: &MipProblem,
        tol: f64,
    ) -> Option<BranchDecision> {
        let fractional = prob.get_fractional_vars(x, tol);
        let (lower, upper) = bounds;

        let mut best: Option<(usize, f64, f64, f64)> = None;
        for (col, value, frac) in fractional {
            let score = self.pseudocost.score(col, value - value.floor());
            let better = match best {
                None => true,
                Some((_, _, best_score, best_frac)) => {
                    score > best_score + 1e-12
                        || ((score - best_score).abs() <= 1e-12 && frac > best_frac)
                }
            };
            if better {
                best = Some((col, value, score, frac));
            }
        }
        let (col, value, score, _) = best?;
        Some(BranchDecision {
            col,
            value,
            down_branch: BoundChange::down_branch(col, lower[col], value),
            up_branch: BoundChange::up_branch(col, upper[col], value),
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vertex_core::linalg::sparse::SparseMatrix;
    use vertex_core::{Lp, VarType};

    fn three_var_mip() -> MipProblem {
        let mut lp = Lp::new(3, 1);
        lp.col_cost = vec![1.0, 1.0, 1.0];
        lp.col_lower = vec![0.0; 3];
        lp.col_upper = vec![1.0, 1.0, f64::INFINITY];
        lp.row_upper = vec![2.0];
        lp.a_matrix = SparseMatrix::from_triplets(
            1,
            3,
            vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)],
        );
        lp.integrality = Some(vec![VarType::Integer, VarType::Integer, VarType::Continuous]);
        MipProblem::new(lp).unwrap()
    }

    #[test]
    fn test_most_fractional_before_samples() {
        let prob = three_var_mip();
        let selector = BranchingSelector::new(3, 8);

        // No pseudocost data: the more fractional column 1 wins.
        let x = vec![0.9, 0.5, 1.0];
        let d = selector
            .select(&x, (&prob.root_lb, &prob.root_ub), &prob, 1e-6)
            .expect("fractional vars exist");
        assert_eq!(d.col, 1);
        assert_eq!(d.down_branch.new_ub, 0.0);
        assert_eq!(d.up_branch.new_lb, 1.0);
    }

    #[test]
    fn test_integer_feasible_returns_none() {
        let prob = three_var_mip();
        let selector = BranchingSelector::new(3, 8);
        let x = vec![1.0, 0.0, 0.7];
        assert!(selector
            .select(&x, (&prob.root_lb, &prob.root_ub), &prob, 1e-6)
            .is_none());
    }

    #[test]
    fn test_pseudocost_drives_selection() {
        let prob = three_var_mip();
        let mut selector = BranchingSelector::new(3, 1);
        // Column 0 has much larger observed gains than column 1.
        selector.pseudocost.add_observation(0, 0.5, 5.0);
        selector.pseudocost.add_observation(0, -0.5, 5.0);
        selector.pseudocost.add_observation(1, 0.5, 0.01);
        selector.pseudocost.add_observation(1, -0.5, 0.01);

        let x = vec![0.4, 0.5, 0.0];
        let d = selector
            .select(&x, (&prob.root_lb, &prob.root_ub), &prob, 1e-6)
            .expect("fractional vars exist");
        assert_eq!(d.col, 0);
    }

    #[test]
    fn test_branch_origins() {
        let d = BranchDecision {
            col: 2,
            value: 3.25,
            down_branch: BoundChange::down_branch(2, 0.0, 3.25),
            up_branch: BoundChange::up_branch(2, 10.0, 3.25),
            score: 1.0,
        };
        let (down, up) = d.origins(7.5);
        assert!((down.delta + 0.25).abs() < 1e-12);
        assert!((up.delta - 0.75).abs() < 1e-12);
        assert_eq!(down.parent_obj, 7.5);
    }
}
