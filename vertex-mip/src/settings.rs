//! Configuration settings for the MIP solver.

use vertex_core::Options;

/// Node selection strategy for the B&B tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Always select the node with the best (lowest) dual bound.
    #[default]
    BestBound,

    /// Depth-first search (helps find feasible solutions quickly).
    DepthFirst,
}

/// MIP solver settings.
#[derive(Debug, Clone)]
pub struct MipSettings {
    // === Termination criteria ===
    /// Maximum number of nodes to explore.
    pub max_nodes: u64,

    /// Time limit in milliseconds (None = unlimited).
    pub time_limit_ms: Option<u64>,

    /// Relative optimality gap tolerance.
    /// Stop when (incumbent - bound) / |incumbent| <= mip_rel_gap.
    pub mip_rel_gap: f64,

    /// Absolute optimality gap tolerance.
    pub gap_abs_tol: f64,

    /// Integrality tolerance.
    /// A value counts as integer when |x - round(x)| <= integrality_tol.
    pub integrality_tol: f64,

    // === Search strategy ===
    /// Node selection strategy.
    pub node_selection: NodeSelection,

    /// Samples per direction before a column's pseudocosts count as
    /// reliable.
    pub minreliable: u32,

    // === Solver settings ===
    /// Settings for the node LP solves. Presolve is forced off; the node
    /// bound changes would invalidate the reductions.
    pub lp_options: Options,

    // === Output ===
    /// Print progress information.
    pub verbose: bool,

    /// Log frequency (print every N nodes).
    pub log_freq: u64,
}

impl Default for MipSettings {
    fn default() -> Self {
        let mut lp_options = Options::default();
        lp_options.presolve = false;

        Self {
            max_nodes: 1_000_000,
            time_limit_ms: None,
            mip_rel_gap: 1e-4,
            gap_abs_tol: 1e-6,
            integrality_tol: 1e-6,
            node_selection: NodeSelection::default(),
            minreliable: 8,
            lp_options,
            verbose: false,
            log_freq: 100,
        }
    }
}

impl MipSettings {
    /// Create settings with verbose output enabled.
    pub fn verbose() -> Self {
        let mut s = Self::default();
        s.verbose = true;
        s.log_freq = 1;
        s
    }

    /// Set the time limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_ms = Some((seconds * 1000.0) as u64);
        self
    }

    /// Set the maximum node count.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set the relative optimality gap tolerance.
    pub fn with_gap_tol(mut self, tol: f64) -> Self {
        self.mip_rel_gap = tol;
        self
    }
}
