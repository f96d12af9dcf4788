//! Packed-sparse work vector.
//!
//! The simplex engine passes right-hand sides and solutions through the
//! factorization as `HVector`s: a dense value array of the full dimension
//! plus an explicit list of the nonzero positions. Solves can then walk only
//! the nonzeros when the vector is sparse, or sweep the dense array when it
//! is not, without changing representation.

/// Packed-sparse vector: dense values plus an index list of the nonzeros.
///
/// Invariant: every `i` with `array[i] != 0.0` appears in `index[..count]`.
/// The index list may carry stale entries whose value has become exactly
/// zero; consumers either tolerate them or call [`HVector::sanitize`].
#[derive(Debug, Clone, Default)]
pub struct HVector {
    /// Number of live entries in `index`
    pub count: usize,
    /// Positions of (potential) nonzeros, first `count` entries are live
    pub index: Vec<usize>,
    /// Dense value array, full dimension
    pub array: Vec<f64>,
}

impl HVector {
    /// Create a zero vector of the given dimension.
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            index: Vec::with_capacity(dim),
            array: vec![0.0; dim],
        }
    }

    /// Dimension of the dense array.
    pub fn dim(&self) -> usize {
        self.array.len()
    }

    /// Reset to zero, touching only the listed entries.
    pub fn clear(&mut self) {
        for k in 0..self.count {
            self.array[self.index[k]] = 0.0;
        }
        self.index.clear();
        self.count = 0;
    }

    /// Resize to a new dimension and reset to zero.
    pub fn setup(&mut self, dim: usize) {
        self.array.clear();
        self.array.resize(dim, 0.0);
        self.index.clear();
        self.count = 0;
    }

    /// Fraction of entries that are listed as nonzero.
    pub fn density(&self) -> f64 {
        if self.array.is_empty() {
            0.0
        } else {
            self.count as f64 / self.array.len() as f64
        }
    }

    /// Add `value` at position `i`, extending the index list if the slot
    /// was previously empty.
    pub fn add(&mut self, i: usize, value: f64) {
        if self.array[i] == 0.0 && value != 0.0 {
            self.push_index(i);
        }
        self.array[i] += value;
    }

    /// Set position `i` to `value`.
    pub fn set(&mut self, i: usize, value: f64) {
        if self.array[i] == 0.0 && value != 0.0 {
            self.push_index(i);
        }
        self.array[i] = value;
    }

    fn push_index(&mut self, i: usize) {
        if self.count < self.index.len() {
            self.index[self.count] = i;
        } else {
            self.index.push(i);
        }
        self.count += 1;
    }

    /// Drop entries with magnitude at most `tol`, zeroing their values.
    pub fn sanitize(&mut self, tol: f64) {
        let mut keep = 0;
        for k in 0..self.count {
            let i = self.index[k];
            if self.array[i].abs() > tol {
                self.index[keep] = i;
                keep += 1;
            } else {
                self.array[i] = 0.0;
            }
        }
        self.count = keep;
    }

    /// Rebuild the index list from the dense values.
    ///
    /// Used after operations that write the dense array directly.
    pub fn resparsify(&mut self) {
        self.index.clear();
        for (i, &v) in self.array.iter().enumerate() {
            if v != 0.0 {
                self.index.push(i);
            }
        }
        self.count = self.index.len();
    }

    /// Copy another vector's contents, preserving packing.
    pub fn copy_from(&mut self, other: &HVector) {
        self.clear();
        if self.array.len() != other.array.len() {
            self.array.resize(other.array.len(), 0.0);
        }
        for k in 0..other.count {
            let i = other.index[k];
            self.set(i, other.array[i]);
        }
    }

    /// Iterate over the live (index, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.index[..self.count].iter().map(|&i| (i, self.array[i]))
    }

    /// Euclidean norm over the live entries.
    pub fn norm2(&self) -> f64 {
        self.iter().map(|(_, v)| v * v).sum::<f64>().sqrt()
    }

    /// Infinity norm over the live entries.
    pub fn norm_inf(&self) -> f64 {
        self.iter().map(|(_, v)| v.abs()).fold(0.0, f64::max)
    }

    /// Check the packing invariant: every dense nonzero is listed.
    pub fn invariant_holds(&self) -> bool {
        let mut listed = vec![false; self.array.len()];
        for k in 0..self.count {
            listed[self.index[k]] = true;
        }
        self.array
            .iter()
            .enumerate()
            .all(|(i, &v)| v == 0.0 || listed[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_clear() {
        let mut v = HVector::new(5);
        v.add(2, 1.5);
        v.add(4, -2.0);
        v.add(2, 0.5);

        assert_eq!(v.count, 2);
        assert_eq!(v.array[2], 2.0);
        assert_eq!(v.array[4], -2.0);
        assert!(v.invariant_holds());

        v.clear();
        assert_eq!(v.count, 0);
        assert!(v.array.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_sanitize_drops_small_entries() {
        let mut v = HVector::new(4);
        v.add(0, 1.0);
        v.add(1, 1e-14);
        v.add(3, -0.5);

        v.sanitize(1e-12);

        assert_eq!(v.count, 2);
        assert_eq!(v.array[1], 0.0);
        assert!(v.invariant_holds());
    }

    #[test]
    fn test_resparsify() {
        let mut v = HVector::new(4);
        v.array[1] = 3.0;
        v.array[3] = -1.0;
        v.resparsify();

        assert_eq!(v.count, 2);
        assert_eq!(v.index[..2], [1, 3]);
        assert!(v.invariant_holds());
    }

    #[test]
    fn test_cancellation_leaves_stale_index() {
        let mut v = HVector::new(3);
        v.add(1, 2.0);
        v.add(1, -2.0);

        // Exact cancellation: index stays, value is zero.
        assert_eq!(v.count, 1);
        assert_eq!(v.array[1], 0.0);
        assert!(v.invariant_holds());

        v.sanitize(0.0);
        assert_eq!(v.count, 0);
    }
}
