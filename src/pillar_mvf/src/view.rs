//! One branch of the multi-view fuser.
//!
//! A view runs the fused per-point features through its own PFN stack,
//! pools them onto its cells, refines the cells into a dense grid and
//! reads the grid back at every point with bilinear sampling.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backbone::{SparseBackbone, SparseCells};
use crate::decorate::{Binned, FeatureDecorator, ViewKind};
use crate::error::MvfError;
use crate::features::Features;
use crate::grid::GridSpec;
use crate::nn::PfnStack;

/// Which grid a view bins on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Clamped pillars over `(x, y)`.
    Pillar,
    /// Clamped cylinder cells over `(angle_deg, z)`.
    Cylinder,
}

impl ViewMode {
    pub fn kind(self) -> ViewKind {
        match self {
            ViewMode::Pillar => ViewKind::ClampedPillar,
            ViewMode::Cylinder => ViewKind::Cylinder,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SingleView {
    mode: ViewMode,
    decorator: FeatureDecorator,
    pfn: PfnStack,
    backbone: Arc<dyn SparseBackbone>,
}

impl SingleView {
    pub fn new(
        mode: ViewMode,
        spec: GridSpec,
        pfn: PfnStack,
        backbone: Arc<dyn SparseBackbone>,
    ) -> crate::error::Result<Self> {
        let stride = backbone.stride();
        if stride == 0 {
            return Err(MvfError::ZeroStride);
        }
        let extent = spec.extent();
        if extent[0] < stride || extent[1] < stride {
            return Err(MvfError::ShapeMismatch(format!(
                "{mode:?} grid {}x{} is smaller than the backbone stride {stride}",
                extent[0], extent[1]
            )));
        }
        Ok(Self {
            mode,
            decorator: FeatureDecorator::new(mode.kind(), spec)?,
            pfn,
            backbone,
        })
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn spec(&self) -> &GridSpec {
        self.decorator.spec()
    }

    /// Decorator producing the cells this view pools onto.
    pub fn decorator(&self) -> FeatureDecorator {
        self.decorator
    }

    pub fn stride(&self) -> u32 {
        self.backbone.stride()
    }

    pub fn in_channels(&self) -> usize {
        self.pfn.in_channels()
    }

    /// Channels of every per-point sample.
    pub fn out_channels(&self) -> usize {
        self.backbone.out_channels(self.pfn.out_channels())
    }

    /// Continuous position of every binned point in the downsampled frame,
    /// as `(x, y)` = `(axis 0, axis 1)`.
    pub fn sample_positions(&self, binned: &Binned) -> Vec<[f32; 2]> {
        let spec = self.spec();
        let min = spec.range_min();
        let cell = spec.cell_size();
        let stride = self.stride() as f32;
        (0..binned.points.len())
            .map(|i| {
                let p = binned.points.position(i);
                [
                    (p[0] - min[0]) / cell[0] / stride,
                    (p[1] - min[1]) / cell[1] / stride,
                ]
            })
            .collect()
    }

    /// Per-point samples of the refined grid.
    ///
    /// `features` holds one row per point of `binned`, in the same order.
    pub fn forward(&self, features: &Features, binned: &Binned) -> Result<Features> {
        if features.len() != binned.points.len() {
            anyhow::bail!(
                "{:?} view got {} feature rows for {} binned points",
                self.mode,
                features.len(),
                binned.points.len()
            );
        }

        let pooled = self
            .pfn
            .forward_cells(features, &binned.cells)
            .with_context(|| format!("{:?} view PFN stack", self.mode))?;
        let cells = SparseCells::new(
            pooled,
            binned.bev_coords(),
            binned.bev_extent(),
            binned.batch_size(),
        )?;
        let grid = self
            .backbone
            .refine(&cells)
            .with_context(|| format!("{:?} view backbone", self.mode))?;
        debug!(mode = ?self.mode, cells = cells.len(), shape = ?grid.shape(), "view refined");

        let batch_ids: Vec<u32> = (0..binned.points.len())
            .map(|i| binned.points.batch_id(i))
            .collect();
        let samples = grid
            .sample_bilinear(&batch_ids, &self.sample_positions(binned))
            .with_context(|| format!("{:?} view bilinear sampling", self.mode))?;
        Ok(samples)
    }
}
