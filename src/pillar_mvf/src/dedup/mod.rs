//! Unique cells and the point-to-cell inverse map.
//!
//! # Pipeline
//!
//! ```text
//! (batch, coords) → packed keys → radix sort → segments → CellIndex
//! ```
//!
//! Unique keys come out in lexicographic order of `(batch, c0, c1, c2)`.
//! The sorted point order and segment starts are kept as well, so each cell
//! owns a contiguous slice of point indices and reductions need no atomics.

pub mod keys;
pub mod radix_sort;
pub mod segments;

pub use keys::{pack_key, unpack_key, CellKey};
pub use radix_sort::{radix_sort_by_key, RadixSortResult};
pub use segments::{detect_segments, SegmentResult};

use rayon::prelude::*;
use tracing::debug;

use crate::error::{MvfError, Result};
use crate::grid::CellCoord;

/// Unique cells of a point set and the grouping of points into them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellIndex {
    /// Unique keys, sorted.
    keys: Vec<CellKey>,
    /// Cell of every point.
    inverse: Vec<u32>,
    /// Point indices grouped by cell.
    order: Vec<u32>,
    /// Start of each cell in `order`, plus a trailing sentinel.
    starts: Vec<u32>,
    /// Number of coordinate axes in the keys.
    axes: usize,
}

impl CellIndex {
    /// Deduplicate `(batch_ids[i], coords[i])` keys.
    ///
    /// Only the first `axes` coordinate columns take part in the key.
    pub fn build(batch_ids: &[u32], coords: &[CellCoord], axes: usize) -> Result<Self> {
        if batch_ids.len() != coords.len() {
            return Err(MvfError::ShapeMismatch(format!(
                "{} batch ids for {} cell coordinates",
                batch_ids.len(),
                coords.len()
            )));
        }
        if !(1..=3).contains(&axes) {
            return Err(MvfError::ShapeMismatch(format!(
                "cell keys carry 1 to 3 axes, got {axes}"
            )));
        }

        let packed: Vec<u64> = batch_ids
            .par_iter()
            .zip(coords.par_iter())
            .map(|(&batch, coord)| {
                let mut key = [batch, 0, 0, 0];
                key[1..=axes].copy_from_slice(&coord[..axes]);
                pack_key(&key)
            })
            .collect::<Result<_>>()?;

        let indices: Vec<u32> = (0..packed.len() as u32).collect();
        let sorted = radix_sort_by_key(&packed, &indices);
        let segments = detect_segments(&sorted.keys);

        let mut inverse = vec![0u32; packed.len()];
        for (&point, &segment) in sorted.values.iter().zip(&segments.segment_ids) {
            inverse[point as usize] = segment;
        }

        let keys: Vec<CellKey> = segments
            .segment_codes
            .iter()
            .map(|&code| unpack_key(code))
            .collect();

        debug!(points = packed.len(), cells = keys.len(), axes, "deduplicated cell keys");

        Ok(Self {
            keys,
            inverse,
            order: sorted.values,
            starts: segments.segment_starts,
            axes,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.keys.len()
    }

    pub fn num_points(&self) -> usize {
        self.inverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn axes(&self) -> usize {
        self.axes
    }

    /// Unique keys in lexicographic order.
    pub fn keys(&self) -> &[CellKey] {
        &self.keys
    }

    /// Cell index of every point.
    pub fn inverse(&self) -> &[u32] {
        &self.inverse
    }

    /// Point indices of one cell, in input order.
    pub fn members(&self, cell: usize) -> &[u32] {
        let start = self.starts[cell] as usize;
        let end = self.starts[cell + 1] as usize;
        &self.order[start..end]
    }

    /// Points per cell.
    pub fn cell_sizes(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.starts.windows(2).map(|w| (w[1] - w[0]) as usize)
    }

    /// Key of the cell that point `i` belongs to.
    pub fn key_of_point(&self, i: usize) -> &CellKey {
        &self.keys[self.inverse[i] as usize]
    }

    /// Relabel key columns, e.g. `[0, 2, 1]` for `(batch, c1, c0)`.
    ///
    /// Column 0 is the batch id and columns 1..=3 the cell axes. Grouping is
    /// unchanged; only the reported coordinates move.
    pub fn permuted<const N: usize>(&self, columns: [usize; N]) -> Vec<[u32; N]> {
        self.keys
            .iter()
            .map(|key| columns.map(|c| key[c]))
            .collect()
    }
}
