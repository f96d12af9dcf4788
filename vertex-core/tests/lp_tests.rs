//! End-to-end LP tests for the vertex solver.
//!
//! These drive the full pipeline: assess, presolve, scaling, dual simplex,
//! postsolve, plus the persistent solver's warm-start path and the solution
//! and basis file formats.

use std::io::Cursor;

use vertex_core::io::{read_basis, write_basis, write_solution_pretty};
use vertex_core::linalg::sparse::SparseMatrix;
use vertex_core::{solve, Lp, ModelStatus, ObjSense, Options, Solver};

/// min x s.t. 1 <= x <= 10.
#[test]
fn test_trivial_lp() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut lp = Lp::new(1, 1);
    lp.name = "trivial".to_string();
    lp.col_cost = vec![1.0];
    lp.col_lower = vec![1.0];
    lp.col_upper = vec![10.0];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![100.0];
    lp.a_matrix = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]);

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Optimal);
    assert!((result.col_value[0] - 1.0).abs() < 1e-7, "x = {}", result.col_value[0]);
    assert!((result.obj_value - 1.0).abs() < 1e-7, "obj = {}", result.obj_value);
}

/// x + y <= 1 and x + y >= 2 cannot both hold.
#[test]
fn test_two_row_infeasible() {
    let mut lp = Lp::new(2, 2);
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![f64::INFINITY, f64::INFINITY];
    lp.row_lower = vec![f64::NEG_INFINITY, 2.0];
    lp.row_upper = vec![1.0, f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(
        2,
        2,
        vec![(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0)],
    );

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Infeasible);
}

/// min -x with x >= 0 is unbounded below.
#[test]
fn test_unbounded() {
    let mut lp = Lp::new(1, 1);
    lp.col_cost = vec![-1.0];
    lp.col_lower = vec![0.0];
    lp.col_upper = vec![f64::INFINITY];
    lp.row_lower = vec![0.0];
    lp.row_upper = vec![f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]);

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Unbounded);
}

/// Strong duality on a boxed equality LP: the explicitly dualized model
/// attains the same optimal value.
#[test]
fn test_dualization() {
    // Primal: min x1 + 2 x2  s.t.  x1 + x2 = 1, 0 <= x <= 1.
    let mut primal = Lp::new(2, 1);
    primal.col_cost = vec![1.0, 2.0];
    primal.col_lower = vec![0.0, 0.0];
    primal.col_upper = vec![1.0, 1.0];
    primal.row_lower = vec![1.0];
    primal.row_upper = vec![1.0];
    primal.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);

    let primal_result = solve(&primal, &Options::default()).expect("primal solves");
    assert_eq!(primal_result.status, ModelStatus::Optimal);
    assert!((primal_result.obj_value - 1.0).abs() < 1e-8);

    // Dual: max b y + l zl - u zu  s.t.  A^T y + zl - zu = c, zl, zu >= 0,
    // written as a minimization of the negated objective.
    // Variables: y (free), zl1, zl2, zu1, zu2.
    let mut dual = Lp::new(5, 2);
    dual.col_cost = vec![-1.0, 0.0, 0.0, 1.0, 1.0];
    dual.col_lower = vec![f64::NEG_INFINITY, 0.0, 0.0, 0.0, 0.0];
    dual.col_upper = vec![f64::INFINITY; 5];
    dual.row_lower = vec![1.0, 2.0];
    dual.row_upper = vec![1.0, 2.0];
    dual.a_matrix = SparseMatrix::from_triplets(
        2,
        5,
        vec![
            (0, 0, 1.0),
            (1, 0, 1.0),
            (0, 1, 1.0),
            (1, 2, 1.0),
            (0, 3, -1.0),
            (1, 4, -1.0),
        ],
    );

    let dual_result = solve(&dual, &Options::default()).expect("dual solves");
    assert_eq!(dual_result.status, ModelStatus::Optimal);
    // Strong duality: the dual optimum (negated back) matches the primal.
    assert!(
        (-dual_result.obj_value - primal_result.obj_value).abs() < 1e-8,
        "primal {} vs dual {}",
        primal_result.obj_value,
        -dual_result.obj_value
    );
}

/// A degenerate transportation-style LP with equalities and ranged rows.
#[test]
fn test_ranged_rows() {
    // min x1 + x2 + x3
    // s.t. 1 <= x1 + x2 <= 2
    //      2 <= x2 + x3 <= 3
    //      x in [0, 2]^3
    let mut lp = Lp::new(3, 2);
    lp.col_cost = vec![1.0, 1.0, 1.0];
    lp.col_lower = vec![0.0; 3];
    lp.col_upper = vec![2.0; 3];
    lp.row_lower = vec![1.0, 2.0];
    lp.row_upper = vec![2.0, 3.0];
    lp.a_matrix = SparseMatrix::from_triplets(
        2,
        3,
        vec![(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0), (1, 2, 1.0)],
    );

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Optimal);
    // x2 = 2 covers both rows: objective 2.
    assert!((result.obj_value - 2.0).abs() < 1e-7, "obj = {}", result.obj_value);
    // Primal feasibility of the reported point.
    assert!(result.row_value[0] >= 1.0 - 1e-7 && result.row_value[0] <= 2.0 + 1e-7);
    assert!(result.row_value[1] >= 2.0 - 1e-7 && result.row_value[1] <= 3.0 + 1e-7);
}

/// Maximization with presolve-removable structure.
#[test]
fn test_maximize_with_fixed_column() {
    // max 3x + y with x fixed at 1, y in [0, 2], x + y <= 2.5.
    let mut lp = Lp::new(2, 1);
    lp.sense = ObjSense::Maximize;
    lp.col_cost = vec![3.0, 1.0];
    lp.col_lower = vec![1.0, 0.0];
    lp.col_upper = vec![1.0, 2.0];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![2.5];
    lp.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Optimal);
    assert!((result.col_value[0] - 1.0).abs() < 1e-9);
    assert!((result.col_value[1] - 1.5).abs() < 1e-7);
    assert!((result.obj_value - 4.5).abs() < 1e-7);
}

/// Solve, freeze, perturb a cost within the re-optimization tolerance,
/// unfreeze, re-solve: the basis survives and no refactorization happens.
#[test]
fn test_warm_start_after_cost_perturbation() {
    let mut lp = Lp::new(3, 2);
    lp.col_cost = vec![1.0, 2.0, 0.5];
    lp.col_lower = vec![0.0; 3];
    lp.col_upper = vec![4.0; 3];
    lp.row_lower = vec![2.0, 1.0];
    lp.row_upper = vec![f64::INFINITY, f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(
        2,
        3,
        vec![(0, 0, 1.0), (0, 1, 2.0), (1, 1, 1.0), (1, 2, 1.0)],
    );

    let mut solver = Solver::new(lp, Options::default()).expect("valid model");
    let first = solver.solve().expect("first solve");
    assert_eq!(first.status, ModelStatus::Optimal);

    let frozen = solver.freeze_basis();
    solver.set_col_cost(0, 1.0 + 1e-3).expect("in range");
    solver.unfreeze_basis(frozen).expect("valid handle");

    let inverts_before = solver.invert_count();
    let iterations_before = solver.iteration_count();
    let second = solver.solve().expect("second solve");
    assert_eq!(second.status, ModelStatus::Optimal);

    let extra_iterations = solver.iteration_count() - iterations_before;
    let extra_inverts = solver.invert_count() - inverts_before;
    assert!(
        extra_iterations <= 2,
        "warm start took {} iterations",
        extra_iterations
    );
    assert_eq!(extra_inverts, 0, "warm start refactorized");
    assert!((second.col_value[0] - first.col_value[0]).abs() < 1e-6);
}

/// Basis files round-trip through a real solve and reject wrong dimensions.
#[test]
fn test_basis_file_round_trip_after_solve() {
    let mut lp = Lp::new(2, 1);
    lp.col_cost = vec![1.0, 1.0];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![5.0, 5.0];
    lp.row_lower = vec![2.0];
    lp.row_upper = vec![f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);

    let result = solve(&lp, &Options::default()).expect("solve runs");
    assert_eq!(result.status, ModelStatus::Optimal);

    let mut buf = Vec::new();
    write_basis(&mut buf, &result.basis, lp.num_col, lp.num_row).expect("writes");
    let read = read_basis(&mut Cursor::new(&buf), lp.num_col, lp.num_row).expect("reads");
    assert_eq!(read.status, result.basis.status);

    let err = read_basis(&mut Cursor::new(&buf), lp.num_col + 1, lp.num_row);
    assert!(err.is_err(), "dimension mismatch accepted");

    // The pretty report renders without error.
    let mut pretty = Vec::new();
    write_solution_pretty(&mut pretty, &lp, &result).expect("writes");
    assert!(String::from_utf8(pretty).expect("utf8").contains("Optimal"));
}

/// Scaling off and on agree on the optimum.
#[test]
fn test_scaling_invariance() {
    let mut lp = Lp::new(2, 2);
    lp.col_cost = vec![1e3, 2e-3];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![f64::INFINITY, f64::INFINITY];
    lp.row_lower = vec![1.0, 1e3];
    lp.row_upper = vec![f64::INFINITY, f64::INFINITY];
    lp.a_matrix = SparseMatrix::from_triplets(
        2,
        2,
        vec![(0, 0, 1e-2), (0, 1, 1.0), (1, 0, 1e2), (1, 1, 1e3)],
    );

    let scaled = solve(&lp, &Options::default()).expect("scaled solve");
    let mut options = Options::default();
    options.scaling = false;
    let unscaled = solve(&lp, &options).expect("unscaled solve");

    assert_eq!(scaled.status, ModelStatus::Optimal);
    assert_eq!(unscaled.status, ModelStatus::Optimal);
    assert!(
        (scaled.obj_value - unscaled.obj_value).abs() <= 1e-6 * (1.0 + scaled.obj_value.abs()),
        "scaled {} vs unscaled {}",
        scaled.obj_value,
        unscaled.obj_value
    );
}

/// Time and iteration budgets return well-formed terminal states.
#[test]
fn test_iteration_budget() {
    let mut lp = Lp::new(4, 4);
    lp.col_cost = vec![1.0, 2.0, 3.0, 4.0];
    lp.col_lower = vec![0.0; 4];
    lp.col_upper = vec![10.0; 4];
    lp.row_lower = vec![1.0; 4];
    lp.row_upper = vec![f64::INFINITY; 4];
    lp.a_matrix = SparseMatrix::from_triplets(
        4,
        4,
        vec![
            (0, 0, 1.0),
            (0, 1, 1.0),
            (1, 1, 1.0),
            (1, 2, 1.0),
            (2, 2, 1.0),
            (2, 3, 1.0),
            (3, 3, 1.0),
            (3, 0, 1.0),
        ],
    );

    let mut options = Options::default().with_iteration_limit(1);
    options.presolve = false;
    let result = solve(&lp, &options).expect("solve runs");
    assert!(
        result.status == ModelStatus::ReachedIterationLimit
            || result.status == ModelStatus::Optimal,
        "unexpected status {}",
        result.status
    );
    // The partial solution is still well-formed.
    assert_eq!(result.col_value.len(), 4);
    assert_eq!(result.basis.base_index.len(), 4);
}
