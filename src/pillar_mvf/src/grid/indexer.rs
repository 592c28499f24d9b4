//! Point to cell-coordinate binning.

use rayon::prelude::*;
use tracing::debug;

use super::types::{BinningPolicy, CellCoord, GridSpec};
use crate::dedup::keys::FIELD_BITS;
use crate::error::{MvfError, Result};
use crate::points::PointBatch;

/// Bins points into integer cell coordinates of one grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridIndexer {
    spec: GridSpec,
    active_axes: usize,
    policy: BinningPolicy,
}

/// Output of [`GridIndexer::index`].
#[derive(Debug, Clone)]
pub struct IndexResult {
    /// Points that received a cell, in input order.
    pub points: PointBatch,
    /// Cell coordinate of every surviving point.
    pub coords: Vec<CellCoord>,
    /// Per input point: whether it survived.
    pub valid: Vec<bool>,
    /// Grid extent at the time of indexing.
    pub extent: [u32; 3],
}

impl IndexResult {
    pub fn num_dropped(&self) -> usize {
        self.valid.len() - self.points.len()
    }
}

impl GridIndexer {
    /// `active_axes` is 2 for pillar-style binning and 3 for voxels.
    ///
    /// Every keyed axis must fit a cell key field.
    pub fn new(spec: GridSpec, active_axes: usize, policy: BinningPolicy) -> Result<Self> {
        if !(2..=3).contains(&active_axes) {
            return Err(MvfError::ShapeMismatch(format!(
                "grid indexer bins over 2 or 3 axes, got {active_axes}"
            )));
        }
        let max = 1u32 << FIELD_BITS;
        let extent = spec.extent();
        if let Some(axis) = (0..active_axes).find(|&a| extent[a] > max) {
            return Err(MvfError::ExtentTooLarge {
                axis,
                extent: extent[axis],
                max,
            });
        }
        Ok(Self {
            spec,
            active_axes,
            policy,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn active_axes(&self) -> usize {
        self.active_axes
    }

    pub fn policy(&self) -> BinningPolicy {
        self.policy
    }

    /// Cell coordinate of one position, or `None` when the policy drops it.
    #[inline]
    pub fn cell_of(&self, pos: &[f32; 3], extent: &[u32; 3]) -> Option<CellCoord> {
        let c = self.spec.continuous(pos);
        let mut coord = [0u32; 3];

        match self.policy {
            BinningPolicy::Discard => {
                for a in 0..self.active_axes {
                    if !(c[a] >= 0.0 && c[a] < extent[a] as f32) {
                        return None;
                    }
                    coord[a] = c[a] as u32;
                }
            }
            BinningPolicy::Clamp => {
                // every axis is clamped, keyed or not
                for a in 0..3 {
                    let hi = (extent[a] - 1) as f32;
                    coord[a] = c[a].clamp(0.0, hi) as u32;
                }
            }
        }

        Some(coord)
    }

    /// Bin every point; columns 1..4 of each row are the binned position.
    pub fn index(&self, points: &PointBatch) -> IndexResult {
        let extent = self.spec.extent();

        let cells: Vec<Option<CellCoord>> = (0..points.len())
            .into_par_iter()
            .map(|i| self.cell_of(&points.position(i), &extent))
            .collect();

        let valid: Vec<bool> = cells.iter().map(Option::is_some).collect();
        let coords: Vec<CellCoord> = cells.into_iter().flatten().collect();
        let kept = if coords.len() == points.len() {
            points.clone()
        } else {
            points.select(&valid)
        };

        debug!(
            policy = ?self.policy,
            input = points.len(),
            kept = kept.len(),
            ?extent,
            "indexed points"
        );

        IndexResult {
            points: kept,
            coords,
            valid,
            extent,
        }
    }
}
