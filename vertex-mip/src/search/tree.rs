//! Branch-and-bound tree controller.

use std::time::Instant;

use log::info;

use super::{BranchDecision, BranchingSelector, NodeQueue, SearchNode};
use crate::model::{IncumbentTracker, MipSolution, MipStatus};
use crate::settings::MipSettings;

/// Branch-and-bound tree controller.
///
/// Manages the node queue, the incumbent, the pseudocost store and
/// termination; the driver supplies the LP relaxation solves.
pub struct BranchAndBound {
    queue: NodeQueue,

    /// Branching variable selector with the shared pseudocost store.
    pub branching: BranchingSelector,

    /// Incumbent solution tracker.
    pub incumbent: IncumbentTracker,

    next_node_id: u64,
    nodes_explored: u64,
    nodes_pruned: u64,
    simplex_iterations: u64,
    start_time: Instant,
    settings: MipSettings,
}

impl BranchAndBound {
    /// Create a controller for a model with `num_col` columns.
    pub fn new(settings: MipSettings, num_col: usize) -> Self {
        Self {
            queue: NodeQueue::new(settings.node_selection),
            branching: BranchingSelector::new(num_col, settings.minreliable),
            incumbent: IncumbentTracker::new(),
            next_node_id: 1, // 0 reserved for root
            nodes_explored: 0,
            nodes_pruned: 0,
            simplex_iterations: 0,
            start_time: Instant::now(),
            settings,
        }
    }

    /// Push the root node with its relaxation bound.
    pub fn initialize(&mut self, root_bound: f64) {
        self.start_time = Instant::now();
        let mut root = SearchNode::root();
        root.dual_bound = root_bound;
        self.queue.push(root);
    }

    /// Get the next node to process.
    pub fn next_node(&mut self) -> Option<SearchNode> {
        self.queue.pop()
    }

    /// Mark a node as explored, accounting its LP iterations.
    pub fn node_explored(&mut self, simplex_iterations: u64) {
        self.nodes_explored += 1;
        self.simplex_iterations += simplex_iterations;
    }

    /// Record that a node was pruned without branching.
    pub fn node_pruned(&mut self) {
        self.nodes_pruned += 1;
    }

    /// Create the two children of a branching decision and enqueue them,
    /// each warm-started from a frozen snapshot of the parent's basis.
    pub fn branch(
        &mut self,
        parent: &SearchNode,
        decision: &BranchDecision,
        parent_obj: f64,
        frozen: (Option<i32>, Option<i32>),
    ) {
        let (down_origin, up_origin) = decision.origins(parent_obj);
        let mut down = parent.child(self.next_node_id, decision.down_branch, down_origin);
        let mut up = parent.child(self.next_node_id + 1, decision.up_branch, up_origin);
        self.next_node_id += 2;
        down.dual_bound = parent_obj;
        up.dual_bound = parent_obj;
        down.frozen_basis = frozen.0;
        up.frozen_basis = frozen.1;
        self.queue.push(down);
        self.queue.push(up);
    }

    /// Update the incumbent; on improvement, prune dominated nodes.
    pub fn update_incumbent(&mut self, x: &[f64], obj: f64) -> bool {
        let improved = self.incumbent.update(x, obj);
        if improved {
            let pruned = self.queue.prune_by_bound(obj);
            self.nodes_pruned += pruned as u64;
            if self.settings.verbose {
                info!("new incumbent: obj={:.6e}, pruned {} nodes", obj, pruned);
            }
        }
        improved
    }

    /// Current relative optimality gap.
    pub fn gap(&self) -> f64 {
        self.incumbent.gap(self.best_bound())
    }

    /// Best dual bound over incumbent-free nodes (the proven lower bound).
    pub fn best_bound(&self) -> f64 {
        self.queue.best_bound().min(self.incumbent.obj_val)
    }

    /// Elapsed wall-clock time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Check termination. Returns the final status when done.
    pub fn check_termination(&self) -> Option<MipStatus> {
        if let Some(limit) = self.settings.time_limit_ms {
            if self.elapsed_ms() >= limit {
                return Some(MipStatus::TimeLimit);
            }
        }
        if self.nodes_explored >= self.settings.max_nodes {
            return Some(MipStatus::NodeLimit);
        }
        if self.incumbent.has_incumbent() {
            let gap = self.gap();
            if gap <= self.settings.mip_rel_gap
                || (self.incumbent.obj_val - self.queue.best_bound()).abs()
                    <= self.settings.gap_abs_tol
            {
                return Some(if self.queue.is_empty() {
                    MipStatus::Optimal
                } else {
                    MipStatus::GapLimit
                });
            }
        }
        if self.queue.is_empty() {
            return Some(if self.incumbent.has_incumbent() {
                MipStatus::Optimal
            } else {
                MipStatus::Infeasible
            });
        }
        None
    }

    /// Package the final solution.
    pub fn finalize(&self, status: MipStatus) -> MipSolution {
        MipSolution {
            status,
            x: self.incumbent.solution.clone().unwrap_or_default(),
            obj_val: self.incumbent.obj_val,
            bound: self.best_bound(),
            gap: self.gap(),
            nodes_explored: self.nodes_explored,
            solve_time_ms: self.elapsed_ms(),
            incumbent_updates: self.incumbent.update_count,
            simplex_iterations: self.simplex_iterations,
        }
    }

    /// Log progress (if verbose).
    pub fn log_progress(&self) {
        if !self.settings.verbose || self.nodes_explored % self.settings.log_freq.max(1) != 0 {
            return;
        }
        info!(
            "nodes: {} ({} open, {} pruned) | bound: {:.6e} | incumbent: {:.6e} | gap: {:.2}% | time: {:.1}s",
            self.nodes_explored,
            self.queue.len(),
            self.nodes_pruned,
            self.best_bound(),
            self.incumbent.obj_val,
            self.gap() * 100.0,
            self.elapsed_ms() as f64 / 1000.0,
        );
    }
}
