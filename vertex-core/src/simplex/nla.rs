//! Numerical linear algebra layer.
//!
//! `Nla` sits between the simplex engine and the factorization. It owns the
//! `Factor` and the product-form update region, applies the equilibration
//! factors at the solve boundaries (the engine works in unscaled
//! quantities, the factor in scaled ones), and provides frozen-basis
//! checkpoints: a snapshot of the basis status vector together with the
//! update region, restorable without refactorization while the underlying
//! factorization generation still matches.

use log::debug;

use crate::linalg::eta::{ProductFormUpdate, UpdateStatus};
use crate::linalg::factor::{Factor, FactorError};
use crate::linalg::hvector::HVector;
use crate::linalg::sparse::SparseMatrix;
use crate::scaling::Scale;
use crate::simplex::basis::SimplexBasis;

/// Arena link terminator for the frozen-basis list.
pub const NO_LINK: i32 = -1;

/// Absolute pivot tolerance for product-form updates.
const UPDATE_PIVOT_TOL: f64 = 1e-10;

/// Result of restoring a frozen basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfreezeStatus {
    /// Basis and update region reinstalled; solves remain valid
    InvertRestored,
    /// Basis restored, but the factorization has moved on: refactorize
    RequiresRefactor,
}

/// One frozen checkpoint.
#[derive(Debug, Clone, Default)]
struct FrozenSlot {
    valid: bool,
    prev: i32,
    next: i32,
    basis: SimplexBasis,
    update: ProductFormUpdate,
    generation: u64,
}

/// Factor wrapper with scaling and frozen-basis storage.
#[derive(Debug)]
pub struct Nla {
    num_col: usize,
    num_row: usize,
    scale: Scale,
    factor: Factor,
    update: ProductFormUpdate,
    update_limit: usize,
    /// Bumped on every successful invert; ties frozen update regions to the
    /// factorization they extend
    generation: u64,
    frozen: Vec<FrozenSlot>,
    first_frozen: i32,
    last_frozen: i32,
}

impl Nla {
    /// Create the layer for an LP of the given shape.
    pub fn new(
        num_col: usize,
        num_row: usize,
        scale: Scale,
        pivot_threshold: f64,
        update_limit: usize,
    ) -> Self {
        Self {
            num_col,
            num_row,
            scale,
            factor: Factor::new(num_row, pivot_threshold),
            update: ProductFormUpdate::new(num_row, update_limit),
            update_limit,
            generation: 0,
            frozen: Vec::new(),
            first_frozen: NO_LINK,
            last_frozen: NO_LINK,
        }
    }

    /// Whether a valid factorization is installed.
    pub fn has_invert(&self) -> bool {
        self.factor.is_valid()
    }

    /// Number of product-form updates since the last invert.
    pub fn update_count(&self) -> usize {
        self.update.update_count()
    }

    /// Scale factors in use.
    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    /// Factorize the basis selected by `base_index` from the scaled matrix.
    ///
    /// Clears the update region on success. The matrix itself is unscaled;
    /// scaling is applied while gathering columns.
    pub fn invert(
        &mut self,
        a_matrix: &SparseMatrix,
        base_index: &[usize],
    ) -> Result<(), FactorError> {
        debug_assert_eq!(base_index.len(), self.num_row);
        let num_col = self.num_col;
        let scale = &self.scale;
        let result = self.factor.invert(self.num_row, |c, buf| {
            let var = base_index[c];
            if var < num_col {
                let vf = scale.col[var];
                let indices = a_matrix.col_indices(var);
                let values = a_matrix.col_values(var);
                for (&i, &v) in indices.iter().zip(values) {
                    buf.push((i, v * scale.row[i] * vf));
                }
            } else {
                // Scaled logical columns are exactly unit vectors.
                buf.push((var - num_col, 1.0));
            }
        });
        if result.is_ok() {
            self.update.setup(self.num_row, self.update_limit);
            self.generation += 1;
        }
        result
    }

    /// Solve B x = rhs. Input is indexed by row, output by basis position.
    pub fn ftran(&mut self, rhs: &mut HVector, expected_density: f64, base_index: &[usize]) {
        for k in 0..rhs.count {
            let i = rhs.index[k];
            rhs.array[i] *= self.scale.row[i];
        }
        let _ = self.factor.ftran(rhs, expected_density);
        self.update.ftran(rhs);
        for k in 0..rhs.count {
            let p = rhs.index[k];
            rhs.array[p] *= self.scale.var_factor(base_index[p]);
        }
    }

    /// Solve B^T x = rhs. Input is indexed by basis position, output by row.
    pub fn btran(&mut self, rhs: &mut HVector, expected_density: f64, base_index: &[usize]) {
        for k in 0..rhs.count {
            let p = rhs.index[k];
            rhs.array[p] *= self.scale.var_factor(base_index[p]);
        }
        self.update.btran(rhs);
        let _ = self.factor.btran(rhs, expected_density);
        for k in 0..rhs.count {
            let i = rhs.index[k];
            rhs.array[i] *= self.scale.row[i];
        }
    }

    /// Record a basis change as a product-form update.
    ///
    /// `aq` is the engine's (unscaled) FTRAN of the entering column,
    /// `row_out` the leaving position, `var_in` the entering variable and
    /// `base_index` the basis *before* the pivot. Anything but `Ok` obliges
    /// the caller to refactorize.
    pub fn update(
        &mut self,
        aq: &HVector,
        row_out: usize,
        var_in: usize,
        base_index: &[usize],
    ) -> UpdateStatus {
        // Move the column into the factor's scaled space.
        let cq = self.scale.var_factor(var_in);
        let mut scaled = HVector::new(self.num_row);
        for (p, v) in aq.iter() {
            let s = cq / self.scale.var_factor(base_index[p]);
            scaled.set(p, v * s);
        }
        let status = self.update.update(&scaled, row_out, UPDATE_PIVOT_TOL);
        if status != UpdateStatus::Ok {
            debug!("product-form update refused: {:?}", status);
        }
        status
    }

    /// Whether accumulated update cost argues for a refactorization.
    ///
    /// True once the update passes have cost more than 1.5x the last build,
    /// or the update count has hit its limit.
    pub fn refactor_recommended(&self) -> bool {
        self.update.update_count() >= self.update_limit
            || self.update.apply_tick() > 1.5 * self.factor.build_tick().max(1.0)
    }

    /// Snapshot the basis and the current update region.
    ///
    /// Returns a handle for [`Nla::unfreeze`]. Slots are recycled from an
    /// arena; repeated freeze/unfreeze cycles do not allocate once warm.
    pub fn freeze(&mut self, basis: &SimplexBasis) -> i32 {
        let id = match self.frozen.iter().position(|s| !s.valid) {
            Some(free) => free as i32,
            None => {
                self.frozen.push(FrozenSlot::default());
                (self.frozen.len() - 1) as i32
            }
        };
        let slot = &mut self.frozen[id as usize];
        slot.valid = true;
        slot.basis = basis.clone();
        slot.update = self.update.clone();
        slot.generation = self.generation;
        slot.prev = self.last_frozen;
        slot.next = NO_LINK;
        if self.last_frozen != NO_LINK {
            self.frozen[self.last_frozen as usize].next = id;
        } else {
            self.first_frozen = id;
        }
        self.last_frozen = id;
        id
    }

    /// Restore a frozen basis into `basis`, reclaiming the slot.
    ///
    /// If the factorization generation still matches, the frozen update
    /// region is reinstalled and solves continue without a refactor;
    /// otherwise the caller must re-invert from the restored `base_index`.
    pub fn unfreeze(&mut self, id: i32, basis: &mut SimplexBasis) -> Option<UnfreezeStatus> {
        let idx = usize::try_from(id).ok()?;
        if idx >= self.frozen.len() || !self.frozen[idx].valid {
            return None;
        }
        // Unlink.
        let (prev, next) = (self.frozen[idx].prev, self.frozen[idx].next);
        if prev != NO_LINK {
            self.frozen[prev as usize].next = next;
        } else {
            self.first_frozen = next;
        }
        if next != NO_LINK {
            self.frozen[next as usize].prev = prev;
        } else {
            self.last_frozen = prev;
        }
        let slot = std::mem::take(&mut self.frozen[idx]);
        *basis = slot.basis;
        if slot.generation == self.generation && self.update.same_dimension(&slot.update) {
            self.update = slot.update;
            Some(UnfreezeStatus::InvertRestored)
        } else {
            Some(UnfreezeStatus::RequiresRefactor)
        }
    }

    /// Whether a frozen handle is still valid.
    pub fn frozen_id_valid(&self, id: i32) -> bool {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.frozen.get(idx))
            .map(|s| s.valid)
            .unwrap_or(false)
    }

    /// Whether any frozen checkpoints remain.
    pub fn has_frozen(&self) -> bool {
        self.first_frozen != NO_LINK
    }

    /// Drop every frozen checkpoint.
    pub fn clear_frozen(&mut self) {
        self.frozen.clear();
        self.first_frozen = NO_LINK;
        self.last_frozen = NO_LINK;
    }
}
