//! Sparse cells and the refinement stage that turns them into dense grids.
//!
//! Sparse convolution is outside this crate. [`SparseBackbone`] is the seam
//! a real implementation plugs into; [`StridedDensify`] is a reference
//! backbone that max-pools cells by each stage stride and applies a
//! per-cell [`PointNet`] before densifying.

use std::fmt::Debug;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::debug;

use crate::dedup::CellIndex;
use crate::dense::DenseGrid;
use crate::error::MvfError;
use crate::features::Features;
use crate::nn::{NormStats, PointNet};
use crate::scatter::scatter_max;

/// Occupied cells of one 2D view, ready for a backbone.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseCells {
    /// One row per cell.
    pub features: Features,
    /// `(batch, row, col)` of every cell.
    pub coords: Vec<[u32; 3]>,
    /// `(rows, cols)`.
    pub extent: [u32; 2],
    pub batch_size: usize,
}

impl SparseCells {
    pub fn new(
        features: Features,
        coords: Vec<[u32; 3]>,
        extent: [u32; 2],
        batch_size: usize,
    ) -> crate::error::Result<Self> {
        if features.len() != coords.len() {
            return Err(MvfError::ShapeMismatch(format!(
                "{} cell rows for {} cell coordinates",
                features.len(),
                coords.len()
            )));
        }
        Ok(Self {
            features,
            coords,
            extent,
            batch_size,
        })
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.features.channels()
    }

    /// Divide coordinates by `stride` (floor), max-merging cells that land
    /// on the same coarse cell.
    ///
    /// The extent is rounded up, `ceil(extent / stride)`, so the last fine
    /// cell of a non-divisible extent still has a coarse cell.
    pub fn downsample(&self, stride: u32) -> crate::error::Result<Self> {
        if stride == 0 {
            return Err(MvfError::ZeroStride);
        }
        if stride == 1 {
            return Ok(self.clone());
        }

        let batch_ids: Vec<u32> = self.coords.iter().map(|c| c[0]).collect();
        let coarse: Vec<[u32; 3]> = self
            .coords
            .iter()
            .map(|c| [c[1] / stride, c[2] / stride, 0])
            .collect();
        let cells = CellIndex::build(&batch_ids, &coarse, 2)?;
        let features = scatter_max(&self.features, &cells)?;

        Ok(Self {
            features,
            coords: cells.permuted([0, 1, 2]),
            extent: self.extent.map(|e| e.div_ceil(stride)),
            batch_size: self.batch_size,
        })
    }

    pub fn densify(&self) -> crate::error::Result<DenseGrid> {
        DenseGrid::from_cells(&self.features, &self.coords, self.extent, self.batch_size)
    }
}

/// Refinement of sparse cells into a dense grid.
///
/// The output grid has `out_channels(in)` channels and spatial size
/// `ceil(extent / stride())`.
pub trait SparseBackbone: Debug + Send + Sync {
    /// Total downsampling factor.
    fn stride(&self) -> u32;

    /// Channels of the dense output for `in_channels` input channels.
    fn out_channels(&self, in_channels: usize) -> usize;

    fn refine(&self, cells: &SparseCells) -> Result<DenseGrid>;
}

/// Reference backbone: per stage, strided max-pool then a per-cell
/// [`PointNet`].
#[derive(Debug, Clone, PartialEq)]
pub struct StridedDensify {
    strides: Vec<u32>,
    stages: Vec<PointNet>,
}

impl StridedDensify {
    pub fn new(strides: Vec<u32>, stages: Vec<PointNet>) -> crate::error::Result<Self> {
        if strides.len() != stages.len() {
            return Err(MvfError::StrideMismatch {
                strides: strides.len(),
                expected: stages.len(),
            });
        }
        if strides.contains(&0) {
            return Err(MvfError::ZeroStride);
        }
        for pair in stages.windows(2) {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(MvfError::ChannelMismatch {
                    expected: pair[0].out_channels(),
                    actual: pair[1].in_channels(),
                });
            }
        }
        Ok(Self { strides, stages })
    }

    /// Randomly initialized stages `in_channels → num_filters[0] → …`.
    pub fn random<R: Rng + ?Sized>(
        in_channels: usize,
        strides: &[u32],
        num_filters: &[usize],
        rng: &mut R,
    ) -> crate::error::Result<Self> {
        if strides.len() != num_filters.len() {
            return Err(MvfError::StrideMismatch {
                strides: strides.len(),
                expected: num_filters.len(),
            });
        }
        let mut stages = Vec::with_capacity(num_filters.len());
        let mut width = in_channels;
        for &out in num_filters {
            stages.push(PointNet::random(width, out, rng)?);
            width = out;
        }
        Self::new(strides.to_vec(), stages)
    }

    pub fn with_stats(self, stats: NormStats) -> Self {
        Self {
            strides: self.strides,
            stages: self.stages.into_iter().map(|s| s.with_stats(stats)).collect(),
        }
    }

    pub fn strides(&self) -> &[u32] {
        &self.strides
    }
}

impl SparseBackbone for StridedDensify {
    fn stride(&self) -> u32 {
        self.strides.iter().product()
    }

    fn out_channels(&self, in_channels: usize) -> usize {
        self.stages.last().map_or(in_channels, PointNet::out_channels)
    }

    fn refine(&self, cells: &SparseCells) -> Result<DenseGrid> {
        let mut x = cells.clone();
        for (i, (&stride, stage)) in self.strides.iter().zip(&self.stages).enumerate() {
            x = x
                .downsample(stride)
                .with_context(|| format!("downsampling stage {i} by {stride}"))?;
            x.features = stage
                .forward(&x.features)
                .with_context(|| format!("stage {i} point net"))?;
            debug!(stage = i, stride, cells = x.len(), extent = ?x.extent, "backbone stage");
        }
        x.densify().context("densifying backbone output")
    }
}
