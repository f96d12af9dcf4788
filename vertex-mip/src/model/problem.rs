//! MIP problem representation.

use vertex_core::{Lp, VarType};

use crate::error::{MipError, MipResult};

/// Mixed-integer problem wrapper.
///
/// Extracts and organizes integrality information from an [`Lp`].
#[derive(Clone)]
pub struct MipProblem {
    /// Underlying LP (minimization; the driver folds the sense).
    pub lp: Lp,

    /// Indices of integer-constrained columns.
    pub integer_vars: Vec<usize>,

    /// Root lower bounds for all columns.
    pub root_lb: Vec<f64>,

    /// Root upper bounds for all columns.
    pub root_ub: Vec<f64>,
}

impl MipProblem {
    /// Create a `MipProblem` from an LP with integrality tags.
    pub fn new(lp: Lp) -> MipResult<Self> {
        let n = lp.num_col;
        let Some(tags) = lp.integrality.as_ref() else {
            return Err(MipError::InvalidProblem(
                "model has no integrality information".to_string(),
            ));
        };
        if tags.len() != n {
            return Err(MipError::InvalidProblem(format!(
                "integrality has length {}, expected {}",
                tags.len(),
                n
            )));
        }
        let integer_vars: Vec<usize> = tags
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == VarType::Integer)
            .map(|(j, _)| j)
            .collect();

        let root_lb = lp.col_lower.clone();
        let root_ub = lp.col_upper.clone();
        Ok(Self {
            lp,
            integer_vars,
            root_lb,
            root_ub,
        })
    }

    /// Number of columns.
    pub fn num_vars(&self) -> usize {
        self.lp.num_col
    }

    /// Number of integer-constrained columns.
    pub fn num_integers(&self) -> usize {
        self.integer_vars.len()
    }

    /// Distance of a value to the nearest integer.
    pub fn fractionality(&self, val: f64) -> f64 {
        (val - val.round()).abs()
    }

    /// Check integer feasibility of a point within tolerance.
    pub fn is_integer_feasible(&self, x: &[f64], tol: f64) -> bool {
        self.integer_vars
            .iter()
            .all(|&j| self.fractionality(x[j]) <= tol)
    }

    /// Round the integer columns of a point in place.
    pub fn round_integers(&self, x: &mut [f64]) {
        for &j in &self.integer_vars {
            x[j] = x[j].round();
        }
    }

    /// Fractional integer columns as (index, value, fractionality).
    pub fn get_fractional_vars(&self, x: &[f64], tol: f64) -> Vec<(usize, f64, f64)> {
        self.integer_vars
            .iter()
            .filter_map(|&j| {
                let frac = self.fractionality(x[j]);
                (frac > tol).then_some((j, x[j], frac))
            })
            .collect()
    }
}
