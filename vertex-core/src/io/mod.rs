//! Solution and basis files.
//!
//! Two solution formats: a human-readable listing and a machine format with
//! a fixed header. The basis file stores the integer status codes and is
//! rejected on any dimension mismatch with the host model.

use std::io::{BufRead, Write};

use crate::error::{SolverError, SolverResult};
use crate::problem::{Lp, SolveResult};
use crate::simplex::basis::{BasisStatus, SimplexBasis};

/// Version tag written into basis files.
pub const BASIS_FILE_VERSION: i32 = 1;

fn status_letters(status: BasisStatus) -> &'static str {
    match status {
        BasisStatus::Lower => "LB",
        BasisStatus::Basic => "BS",
        BasisStatus::Upper => "UB",
        BasisStatus::Zero => "FR",
        BasisStatus::Nonbasic => "NB",
    }
}

/// Write the human-readable solution listing.
pub fn write_solution_pretty(
    w: &mut impl Write,
    lp: &Lp,
    result: &SolveResult,
) -> SolverResult<()> {
    writeln!(w, "Model:  {}", lp.name)?;
    writeln!(w, "Status: {}", result.status)?;
    writeln!(w, "Objective: {:.15e}", result.obj_value)?;
    writeln!(w, "Columns")?;
    writeln!(w, "{:>8}  {:>2}  {:>15}  {:>15}", "Index", "St", "Value", "Dual")?;
    for j in 0..lp.num_col {
        writeln!(
            w,
            "{:>8}  {:>2}  {:>15.8e}  {:>15.8e}",
            j,
            status_letters(result.basis.status[j]),
            result.col_value[j],
            result.col_dual[j],
        )?;
    }
    writeln!(w, "Rows")?;
    writeln!(w, "{:>8}  {:>2}  {:>15}  {:>15}", "Index", "St", "Value", "Dual")?;
    for i in 0..lp.num_row {
        writeln!(
            w,
            "{:>8}  {:>2}  {:>15.8e}  {:>15.8e}",
            i,
            status_letters(result.basis.status[lp.num_col + i]),
            result.row_value[i],
            result.row_dual[i],
        )?;
    }
    Ok(())
}

/// Write the machine-readable solution format.
///
/// Header line `num_col num_row`, a `T`/`F` flag line for the presence of
/// primal values, duals and basis, then one line per column and per row
/// with value, dual and integer status.
pub fn write_solution_machine(
    w: &mut impl Write,
    lp: &Lp,
    result: &SolveResult,
) -> SolverResult<()> {
    writeln!(w, "{} {}", lp.num_col, lp.num_row)?;
    writeln!(w, "T T T")?;
    for j in 0..lp.num_col {
        writeln!(
            w,
            "{:.15e} {:.15e} {}",
            result.col_value[j],
            result.col_dual[j],
            result.basis.status[j].to_int(),
        )?;
    }
    for i in 0..lp.num_row {
        writeln!(
            w,
            "{:.15e} {:.15e} {}",
            result.row_value[i],
            result.row_dual[i],
            result.basis.status[lp.num_col + i].to_int(),
        )?;
    }
    Ok(())
}

/// Parsed machine-format solution.
#[derive(Debug, Clone, Default)]
pub struct MachineSolution {
    /// Column values
    pub col_value: Vec<f64>,
    /// Column duals
    pub col_dual: Vec<f64>,
    /// Row values
    pub row_value: Vec<f64>,
    /// Row duals
    pub row_dual: Vec<f64>,
    /// Basis over columns then rows
    pub basis: SimplexBasis,
}

/// Read the machine solution format back.
pub fn read_solution_machine(
    r: &mut impl BufRead,
    num_col: usize,
    num_row: usize,
) -> SolverResult<MachineSolution> {
    let mut lines = r.lines();
    let mut next_line = || -> SolverResult<String> {
        lines
            .next()
            .transpose()?
            .ok_or_else(|| SolverError::InvalidInput("solution file truncated".to_string()))
    };

    let header = next_line()?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| SolverError::InvalidInput("bad solution header".to_string()))?;
    if dims != [num_col, num_row] {
        return Err(SolverError::InvalidInput(format!(
            "solution file is for a {}x{} model",
            dims.first().copied().unwrap_or(0),
            dims.get(1).copied().unwrap_or(0),
        )));
    }
    let _flags = next_line()?;

    let mut solution = MachineSolution {
        basis: SimplexBasis {
            status: vec![BasisStatus::Nonbasic; num_col + num_row],
            base_index: Vec::new(),
        },
        ..Default::default()
    };
    for k in 0..num_col + num_row {
        let line = next_line()?;
        let mut tokens = line.split_whitespace();
        let value: f64 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| SolverError::InvalidInput("bad solution line".to_string()))?;
        let dual: f64 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| SolverError::InvalidInput("bad solution line".to_string()))?;
        let code: i32 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| SolverError::InvalidInput("bad solution line".to_string()))?;
        let status = BasisStatus::from_int(code)
            .ok_or_else(|| SolverError::InvalidInput(format!("bad status code {}", code)))?;
        solution.basis.status[k] = status;
        if status.is_basic() {
            solution.basis.base_index.push(k);
        }
        if k < num_col {
            solution.col_value.push(value);
            solution.col_dual.push(dual);
        } else {
            solution.row_value.push(value);
            solution.row_dual.push(dual);
        }
    }
    Ok(solution)
}

/// Write a basis file.
pub fn write_basis(
    w: &mut impl Write,
    basis: &SimplexBasis,
    num_col: usize,
    num_row: usize,
) -> SolverResult<()> {
    writeln!(w, "HiGHS Version {}", BASIS_FILE_VERSION)?;
    writeln!(w, "{} {}", num_col, num_row)?;
    let codes = |range: std::ops::Range<usize>| {
        range
            .map(|k| basis.status[k].to_int().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    writeln!(w, "{}", codes(0..num_col))?;
    writeln!(w, "{}", codes(num_col..num_col + num_row))?;
    Ok(())
}

/// Read a basis file, rejecting dimension mismatches with the host model.
pub fn read_basis(
    r: &mut impl BufRead,
    num_col: usize,
    num_row: usize,
) -> SolverResult<SimplexBasis> {
    let mut lines = r.lines();
    let mut next_line = || -> SolverResult<String> {
        lines
            .next()
            .transpose()?
            .ok_or_else(|| SolverError::BasisFile("file truncated".to_string()))
    };

    let version = next_line()?;
    if !version.starts_with("HiGHS Version") {
        return Err(SolverError::BasisFile("missing version header".to_string()));
    }
    let dims = next_line()?;
    let dims: Vec<usize> = dims
        .split_whitespace()
        .map(|t| t.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| SolverError::BasisFile("bad dimension line".to_string()))?;
    if dims != [num_col, num_row] {
        return Err(SolverError::BasisFile(format!(
            "basis is for a {}x{} model, host model is {}x{}",
            dims.first().copied().unwrap_or(0),
            dims.get(1).copied().unwrap_or(0),
            num_col,
            num_row,
        )));
    }

    let mut basis = SimplexBasis {
        status: Vec::with_capacity(num_col + num_row),
        base_index: Vec::new(),
    };
    for (line_no, expected) in [(num_col), (num_row)].into_iter().enumerate() {
        let line = next_line()?;
        let codes: Vec<i32> = line
            .split_whitespace()
            .map(|t| t.parse())
            .collect::<Result<_, _>>()
            .map_err(|_| SolverError::BasisFile("bad status code".to_string()))?;
        if codes.len() != expected {
            return Err(SolverError::BasisFile(format!(
                "status line {} has {} entries, expected {}",
                line_no + 3,
                codes.len(),
                expected,
            )));
        }
        for code in codes {
            let status = BasisStatus::from_int(code)
                .ok_or_else(|| SolverError::BasisFile(format!("bad status code {}", code)))?;
            basis.status.push(status);
        }
    }
    for (k, status) in basis.status.iter().enumerate() {
        if status.is_basic() {
            basis.base_index.push(k);
        }
    }
    Ok(basis)
}
