//! Offset-encoded sparse distance matrices.
//!
//! A stored value is the true distance plus one. The implicit zero of the sparse storage is
//! reserved for "no edge", which keeps it distinct from a true distance of zero between two
//! identical sequences.

use std::{io, path::Path};

use sprs::{CsMat, TriMat};

pub type EncodedMatrix = CsMat<u32>;

#[inline]
pub const fn encode(distance: u32) -> u32 {
    distance + 1
}

#[inline]
pub const fn decode(value: u32) -> Option<u32> {
    value.checked_sub(1)
}

/// Builds a CSR matrix out of `(row, column, encoded value)` triplets.
///
/// Each coordinate must appear at most once and values must be non-zero.
pub fn from_triplets<I>(shape: (usize, usize), triplets: I) -> EncodedMatrix
where
    I: IntoIterator<Item = (usize, usize, u32)>,
{
    let mut matrix = TriMat::new(shape);
    for (row, col, value) in triplets {
        debug_assert_ne!(value, 0);
        matrix.add_triplet(row, col, value);
    }
    matrix.to_csr()
}

#[inline]
pub fn empty(shape: (usize, usize)) -> EncodedMatrix {
    CsMat::zero(shape)
}

pub trait EncodedMatrixExt {
    /// Encoded value at `(row, col)`, 0 when there is no edge.
    fn encoded(&self, row: usize, col: usize) -> u32;

    /// True distance at `(row, col)`, `None` when the pair is not connected.
    fn distance(&self, row: usize, col: usize) -> Option<u32>;

    /// All edges as `(row, col, true distance)`, in row-major order.
    fn true_distances(&self) -> Vec<(usize, usize, u32)>;

    fn transposed(&self) -> EncodedMatrix;

    fn is_symmetric(&self) -> bool;

    fn write_matrix_market(&self, path: &Path) -> io::Result<()>;
}

impl EncodedMatrixExt for EncodedMatrix {
    #[inline]
    fn encoded(&self, row: usize, col: usize) -> u32 {
        self.get(row, col).copied().unwrap_or(0)
    }

    #[inline]
    fn distance(&self, row: usize, col: usize) -> Option<u32> {
        decode(self.encoded(row, col))
    }

    fn true_distances(&self) -> Vec<(usize, usize, u32)> {
        let mut edges: Vec<_> = self
            .iter()
            .filter_map(|(&value, (row, col))| decode(value).map(|dist| (row, col, dist)))
            .collect();
        edges.sort_unstable_by_key(|&(row, col, _)| (row, col));
        edges
    }

    fn transposed(&self) -> EncodedMatrix {
        let (rows, cols) = self.shape();
        from_triplets(
            (cols, rows),
            self.iter().map(|(&value, (row, col))| (col, row, value)),
        )
    }

    fn is_symmetric(&self) -> bool {
        self.rows() == self.cols()
            && self
                .iter()
                .all(|(&value, (row, col))| self.get(col, row) == Some(&value))
    }

    fn write_matrix_market(&self, path: &Path) -> io::Result<()> {
        sprs::io::write_matrix_market(path, self)
    }
}
