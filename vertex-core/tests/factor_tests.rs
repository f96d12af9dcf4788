//! Factorization and update-path tests.
//!
//! These exercise the LU build, the triangular solves and the product-form
//! update region on structured bases, checking against residuals rather
//! than hand-computed factors.

use vertex_core::linalg::eta::UpdateStatus;
use vertex_core::linalg::factor::Factor;
use vertex_core::linalg::hvector::HVector;
use vertex_core::linalg::sparse::SparseMatrix;
use vertex_core::scaling::Scale;
use vertex_core::simplex::nla::Nla;

/// Build a sparse, diagonally dominant test matrix of dimension `m`.
fn test_matrix(m: usize) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0; m]; m];
    for i in 0..m {
        rows[i][i] = 4.0 + (i % 3) as f64;
        rows[i][(i + 1) % m] = -1.0;
        rows[(i + 2) % m][i] += 0.5;
    }
    rows
}

fn factorize_dense(rows: &[Vec<f64>]) -> Factor {
    let m = rows.len();
    let mut factor = Factor::new(m, 0.1);
    factor
        .invert(m, |c, buf| {
            for (i, row) in rows.iter().enumerate() {
                if row[c] != 0.0 {
                    buf.push((i, row[c]));
                }
            }
        })
        .expect("matrix is nonsingular");
    factor
}

fn residual_ftran(rows: &[Vec<f64>], factor: &Factor, b: &[f64]) -> f64 {
    let m = rows.len();
    let mut rhs = HVector::new(m);
    for (i, &v) in b.iter().enumerate() {
        if v != 0.0 {
            rhs.set(i, v);
        }
    }
    let _ = factor.ftran(&mut rhs, 1.0);
    // rhs is indexed by basis position == column here (identity ordering).
    let mut worst = 0.0f64;
    for i in 0..m {
        let ax: f64 = (0..m).map(|j| rows[i][j] * rhs.array[j]).sum();
        worst = worst.max((ax - b[i]).abs());
    }
    worst
}

#[test]
fn test_ftran_residual_structured() {
    let rows = test_matrix(12);
    let factor = factorize_dense(&rows);
    let b: Vec<f64> = (0..12).map(|i| (i as f64 * 0.37).sin()).collect();
    let res = residual_ftran(&rows, &factor, &b);
    assert!(res < 1e-9, "residual {}", res);
}

#[test]
fn test_btran_residual_structured() {
    let rows = test_matrix(9);
    let factor = factorize_dense(&rows);
    let m = 9;
    let mut rhs = HVector::new(m);
    rhs.set(3, 1.0);
    rhs.set(7, -2.0);
    let _ = factor.btran(&mut rhs, 1.0);
    // Verify B^T y = b.
    let mut worst = 0.0f64;
    for j in 0..m {
        let aty: f64 = (0..m).map(|i| rows[i][j] * rhs.array[i]).sum();
        let expected = match j {
            3 => 1.0,
            7 => -2.0,
            _ => 0.0,
        };
        worst = worst.max((aty - expected).abs());
    }
    assert!(worst < 1e-9, "residual {}", worst);
}

/// Product-form updates must agree with a fresh factorization of the
/// modified basis.
#[test]
fn test_update_agrees_with_refactor() {
    let m = 6;
    // Basis: identity logicals; replace position 2 by a structural column.
    let a = SparseMatrix::from_triplets(
        m,
        1,
        vec![(0, 0.5), (2, 2.0), (4, -1.0)]
            .into_iter()
            .map(|(i, v)| (i, 0, v))
            .collect::<Vec<_>>(),
    );
    let mut base_index: Vec<usize> = (1..=m).collect(); // logicals of LP with 1 col
    let mut nla = Nla::new(1, m, Scale::identity(1, m), 0.1, 16);
    nla.invert(&a, &base_index).expect("logical basis");

    // FTRAN the entering column and record the update.
    let mut aq = HVector::new(m);
    a.collect_col(&mut aq, 0, 1.0);
    nla.ftran(&mut aq, 0.5, &base_index);
    assert_eq!(nla.update(&aq, 2, 0, &base_index), UpdateStatus::Ok);
    base_index[2] = 0;

    // Solve through the update region.
    let mut via_update = HVector::new(m);
    via_update.set(2, 1.0);
    via_update.set(3, 0.5);
    nla.ftran(&mut via_update, 0.5, &base_index);

    // Fresh factorization of the updated basis.
    let mut fresh = Nla::new(1, m, Scale::identity(1, m), 0.1, 16);
    fresh.invert(&a, &base_index).expect("updated basis");
    let mut via_refactor = HVector::new(m);
    via_refactor.set(2, 1.0);
    via_refactor.set(3, 0.5);
    fresh.ftran(&mut via_refactor, 0.5, &base_index);

    for p in 0..m {
        assert!(
            (via_update.array[p] - via_refactor.array[p]).abs() < 1e-10,
            "position {}: {} vs {}",
            p,
            via_update.array[p],
            via_refactor.array[p]
        );
    }

    // Same through BTRAN.
    let mut bt_update = HVector::new(m);
    bt_update.set(2, 1.0);
    nla.btran(&mut bt_update, 0.5, &base_index);
    let mut bt_refactor = HVector::new(m);
    bt_refactor.set(2, 1.0);
    fresh.btran(&mut bt_refactor, 0.5, &base_index);
    for i in 0..m {
        assert!(
            (bt_update.array[i] - bt_refactor.array[i]).abs() < 1e-10,
            "row {}: {} vs {}",
            i,
            bt_update.array[i],
            bt_refactor.array[i]
        );
    }
}

/// The update limit forces a refactorization recommendation.
#[test]
fn test_update_limit_recommends_refactor() {
    let m = 4;
    let a = SparseMatrix::new(m, 0);
    let base_index: Vec<usize> = (0..m).collect();
    let mut nla = Nla::new(0, m, Scale::identity(0, m), 0.1, 2);
    nla.invert(&a, &base_index).expect("logical basis");
    assert!(!nla.refactor_recommended());

    let mut aq = HVector::new(m);
    aq.set(0, 1.5);
    assert_eq!(nla.update(&aq, 0, 0, &base_index), UpdateStatus::Ok);
    assert_eq!(nla.update(&aq, 0, 0, &base_index), UpdateStatus::Ok);
    assert!(nla.refactor_recommended());
    assert_eq!(
        nla.update(&aq, 0, 0, &base_index),
        UpdateStatus::UpdateLimitReached
    );
}

/// Singularity reporting: a repeated column cannot be factorized and the
/// repair row is actionable.
#[test]
fn test_singularity_repair_loop() {
    let m = 3;
    let rows: Vec<Vec<f64>> = vec![
        vec![1.0, 1.0, 0.0],
        vec![2.0, 2.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ];
    let mut factor = Factor::new(m, 0.1);
    let mut cols: Vec<Vec<(usize, f64)>> = (0..m)
        .map(|c| {
            (0..m)
                .filter(|&i| rows[i][c] != 0.0)
                .map(|i| (i, rows[i][c]))
                .collect()
        })
        .collect();

    // Repair loop: replace the singular column with the reported row's
    // logical until the build succeeds.
    let mut repairs = 0;
    loop {
        let result = factor.invert(m, |c, buf| buf.extend_from_slice(&cols[c]));
        match result {
            Ok(()) => break,
            Err(vertex_core::linalg::factor::FactorError::Singular {
                basis_position,
                repair_row,
            }) => {
                repairs += 1;
                assert!(repairs <= m, "repair loop did not terminate");
                cols[basis_position] = vec![(repair_row, 1.0)];
            }
        }
    }
    assert!(factor.is_valid());
    assert_eq!(repairs, 1);
}
