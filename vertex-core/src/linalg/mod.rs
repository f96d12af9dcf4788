//! Sparse linear algebra: matrix kernel, work vectors, LU factorization and
//! product-form updates.

pub mod eta;
pub mod factor;
pub mod hvector;
pub mod sparse;

pub use eta::{ProductFormUpdate, UpdateStatus};
pub use factor::{Factor, FactorError};
pub use hvector::HVector;
pub use sparse::{IndexCollection, SparseMatrix};
