//! Dual simplex engine and its supporting layers.

pub mod basis;
pub mod dual_row;
pub mod engine;
pub mod nla;

pub use basis::{BasisStatus, SimplexBasis};
pub use engine::{DualSimplex, IterationOutcome, SimplexPhase};
pub use nla::{Nla, UnfreezeStatus, NO_LINK};
