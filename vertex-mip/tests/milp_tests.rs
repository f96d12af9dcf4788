//! End-to-end MILP tests for the branch-and-bound layer.

use vertex_core::linalg::sparse::SparseMatrix;
use vertex_core::{Lp, ObjSense, VarType};
use vertex_mip::{solve_mip, MipSettings, MipStatus, NodeSelection};

/// Knapsack with three binary items.
#[test]
fn test_knapsack_three_items() {
    let _ = env_logger::builder().is_test(true).try_init();
    // max 5a + 4b + 3c  s.t.  2a + 3b + c <= 4, a, b, c binary.
    let mut lp = Lp::new(3, 1);
    lp.sense = ObjSense::Maximize;
    lp.col_cost = vec![5.0, 4.0, 3.0];
    lp.col_lower = vec![0.0; 3];
    lp.col_upper = vec![1.0; 3];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![4.0];
    lp.a_matrix = SparseMatrix::from_triplets(1, 3, vec![(0, 0, 2.0), (0, 1, 3.0), (0, 2, 1.0)]);
    lp.integrality = Some(vec![VarType::Integer; 3]);

    let solution = solve_mip(&lp, &MipSettings::default()).expect("solve runs");
    assert!(solution.status.is_optimal(), "status {:?}", solution.status);
    assert!(
        (solution.obj_val - 8.0).abs() < 1e-6,
        "objective {}",
        solution.obj_val
    );
    // Items a and c fit together; adding b would exceed the capacity.
    assert!((solution.x[0] - 1.0).abs() < 1e-6);
    assert!(solution.x[1].abs() < 1e-6);
    assert!((solution.x[2] - 1.0).abs() < 1e-6);
    // The dual bound closes onto the incumbent.
    assert!((solution.bound - solution.obj_val).abs() < 1e-4 * (1.0 + solution.obj_val.abs()));
}

/// A pure continuous model passes through as a single relaxation solve.
#[test]
fn test_continuous_passthrough() {
    let mut lp = Lp::new(2, 1);
    lp.col_cost = vec![1.0, 1.0];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![10.0, 10.0];
    lp.row_lower = vec![1.5];
    lp.row_upper = vec![f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
    lp.integrality = Some(vec![VarType::Continuous, VarType::Continuous]);

    let solution = solve_mip(&lp, &MipSettings::default()).expect("solve runs");
    assert_eq!(solution.status, MipStatus::Optimal);
    assert!((solution.obj_val - 1.5).abs() < 1e-6);
    assert_eq!(solution.nodes_explored, 1);
}

/// Integer infeasibility detected by exhausting both branches.
#[test]
fn test_integer_infeasible() {
    // 2x = 1 with x integer in [0, 1]: relaxation feasible at 0.5 only.
    let mut lp = Lp::new(1, 1);
    lp.col_lower = vec![0.0];
    lp.col_upper = vec![1.0];
    lp.row_lower = vec![1.0];
    lp.row_upper = vec![1.0];
    lp.a_matrix = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 2.0)]);
    lp.integrality = Some(vec![VarType::Integer]);

    let solution = solve_mip(&lp, &MipSettings::default()).expect("solve runs");
    assert_eq!(solution.status, MipStatus::Infeasible);
}

/// Depth-first node selection reaches the same optimum as best-bound.
#[test]
fn test_node_selection_strategies_agree() {
    // max 6x + 5y  s.t.  3x + 4y <= 11, x, y integer in [0, 3].
    let mut lp = Lp::new(2, 1);
    lp.sense = ObjSense::Maximize;
    lp.col_cost = vec![6.0, 5.0];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![3.0, 3.0];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![11.0];
    lp.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 3.0), (0, 1, 4.0)]);
    lp.integrality = Some(vec![VarType::Integer, VarType::Integer]);

    let best_bound = solve_mip(&lp, &MipSettings::default()).expect("solve runs");
    let mut dfs_settings = MipSettings::default();
    dfs_settings.node_selection = NodeSelection::DepthFirst;
    let depth_first = solve_mip(&lp, &dfs_settings).expect("solve runs");

    assert!(best_bound.status.is_optimal());
    assert!(depth_first.status.is_optimal());
    assert!(
        (best_bound.obj_val - depth_first.obj_val).abs() < 1e-6,
        "best-bound {} vs depth-first {}",
        best_bound.obj_val,
        depth_first.obj_val
    );
    // Optimum: x = 3, y = 0 gives 18 (weight 9).
    assert!((best_bound.obj_val - 18.0).abs() < 1e-6);
}

/// Node limit returns the best incumbent found so far.
#[test]
fn test_node_limit_keeps_incumbent() {
    // A slightly larger knapsack so the search needs several nodes.
    let weights = [3.0, 5.0, 7.0, 4.0, 6.0];
    let values = [4.0, 6.0, 9.0, 5.0, 7.0];
    let mut lp = Lp::new(5, 1);
    lp.sense = ObjSense::Maximize;
    lp.col_cost = values.to_vec();
    lp.col_lower = vec![0.0; 5];
    lp.col_upper = vec![1.0; 5];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![12.0];
    lp.a_matrix = SparseMatrix::from_triplets(
        1,
        5,
        weights
            .iter()
            .enumerate()
            .map(|(j, &w)| (0, j, w))
            .collect::<Vec<_>>(),
    );
    lp.integrality = Some(vec![VarType::Integer; 5]);

    let full = solve_mip(&lp, &MipSettings::default()).expect("solve runs");
    assert!(full.status.is_optimal());

    let limited = solve_mip(&lp, &MipSettings::default().with_max_nodes(2)).expect("solve runs");
    if limited.status == MipStatus::NodeLimit {
        // Any incumbent reported must be integer feasible and no better
        // than the true optimum.
        if !limited.x.is_empty() {
            assert!(limited.obj_val <= full.obj_val + 1e-6);
        }
    } else {
        assert!(limited.status.is_optimal());
    }
}
