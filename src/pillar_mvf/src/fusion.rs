//! Pillar + cylinder multi-view fusion.
//!
//! # Pipeline
//!
//! ```text
//! points ─ range filter ─┬─ clamped pillar decoration ──┐
//!                        └─ cylinder decoration ────────┴─ concat (per point)
//!                                                            │
//!           ┌──────────────────────┬─────────────────────────┤
//!      point net 1          pillar view sample      cylinder view sample
//!           └──────────────────────┴─────────────────────────┘
//!                                  │ concat
//!                            point net 2
//!                                  │ max per pillar
//!                       downsample by pillar stride
//!                                  │
//!                              dense grid
//! ```
//!
//! Both views see the same filtered points in the same order; the two
//! branches run concurrently.
//!
//! # Example
//!
//! ```ignore
//! use pillar_mvf::MultiViewFuser;
//!
//! let fuser = MultiViewFuser::builder()
//!     .num_input_features(4)
//!     .num_filters(vec![32, 32])
//!     .backbone(vec![2, 2], vec![32, 64])
//!     .out_channels(64)
//!     .build()?;
//!
//! let output = fuser.forward(&points)?;
//! println!("fused grid {:?}", output.grid.shape());
//! ```

use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use rand::prelude::*;
use tracing::debug;

use crate::backbone::{SparseCells, StridedDensify};
use crate::config::{GridSpecConfig, MvfConfig};
use crate::decorate::FeatureDecorator;
use crate::dense::DenseGrid;
use crate::features::Features;
use crate::grid::GridSpec;
use crate::nn::{NormStats, PfnStack, PointNet};
use crate::points::{filter_points, PointBatch, RangeFilter};
use crate::scatter::scatter_max;
use crate::view::{SingleView, ViewMode};

/// Result of [`MultiViewFuser::forward`].
#[derive(Debug, Clone)]
pub struct FusionOutput {
    /// `(batch, out_channels, ceil(rows / stride), ceil(cols / stride))`.
    pub grid: DenseGrid,
    /// The cells written into `grid`.
    pub cells: SparseCells,
    /// Points inside the pillar range.
    pub points_kept: usize,
    /// Points outside the pillar range on x or y.
    pub removed_by_xy: usize,
    /// Points inside x/y but outside z.
    pub removed_by_z: usize,
}

#[derive(Debug, Clone)]
pub struct MultiViewFuser {
    num_input_features: usize,
    range: RangeFilter,
    pillar_decorator: FeatureDecorator,
    cylinder_decorator: FeatureDecorator,
    pillar_view: SingleView,
    cylinder_view: SingleView,
    point_net1: PointNet,
    point_net2: PointNet,
}

impl MultiViewFuser {
    pub fn builder() -> MultiViewFuserBuilder {
        MultiViewFuserBuilder::new()
    }

    /// Build with randomly initialized weights seeded from `config.seed`.
    pub fn with_config(config: MvfConfig) -> Result<Self> {
        let validated = config.validate()?;
        let config = validated.config;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let fused_width = 2 * FeatureDecorator::output_channels(config.num_input_features);
        let view = &config.view;

        let mut make_view = |mode: ViewMode, spec: GridSpec| -> Result<SingleView> {
            let pfn = PfnStack::random(fused_width, &view.num_filters, &mut rng)?
                .with_stats(config.norm_stats);
            let backbone = StridedDensify::random(
                pfn.out_channels(),
                &view.ds_layer_strides,
                &view.ds_num_filters,
                &mut rng,
            )?
            .with_stats(config.norm_stats);
            Ok(SingleView::new(mode, spec, pfn, Arc::new(backbone))?)
        };
        let pillar_view = make_view(ViewMode::Pillar, validated.pillar)?;
        let cylinder_view = make_view(ViewMode::Cylinder, validated.cylinder)?;

        let sample_width = view.sample_channels();
        let point_net1 =
            PointNet::random(fused_width, sample_width, &mut rng)?.with_stats(config.norm_stats);
        let point_net2 = PointNet::random(
            sample_width + pillar_view.out_channels() + cylinder_view.out_channels(),
            config.out_channels,
            &mut rng,
        )?
        .with_stats(config.norm_stats);

        Self::from_parts(
            config.num_input_features,
            pillar_view,
            cylinder_view,
            point_net1,
            point_net2,
        )
    }

    /// Assemble a fuser from prebuilt views and point nets.
    ///
    /// The pillar view's range doubles as the outer range filter.
    pub fn from_parts(
        num_input_features: usize,
        pillar_view: SingleView,
        cylinder_view: SingleView,
        point_net1: PointNet,
        point_net2: PointNet,
    ) -> Result<Self> {
        ensure!(
            pillar_view.mode() == ViewMode::Pillar && cylinder_view.mode() == ViewMode::Cylinder,
            "expected a pillar view and a cylinder view, got {:?} and {:?}",
            pillar_view.mode(),
            cylinder_view.mode()
        );

        let fused_width = 2 * FeatureDecorator::output_channels(num_input_features);
        for (name, width) in [
            ("pillar view", pillar_view.in_channels()),
            ("cylinder view", cylinder_view.in_channels()),
            ("point net 1", point_net1.in_channels()),
        ] {
            ensure!(
                width == fused_width,
                "{name} takes {width} channels but decorated points have {fused_width}"
            );
        }
        let concat_width =
            point_net1.out_channels() + pillar_view.out_channels() + cylinder_view.out_channels();
        ensure!(
            point_net2.in_channels() == concat_width,
            "point net 2 takes {} channels, fused samples have {concat_width}",
            point_net2.in_channels()
        );

        let spec = pillar_view.spec();
        let range = RangeFilter::new(spec.range_min(), spec.range_max());
        Ok(Self {
            num_input_features,
            range,
            pillar_decorator: pillar_view.decorator(),
            cylinder_decorator: cylinder_view.decorator(),
            pillar_view,
            cylinder_view,
            point_net1,
            point_net2,
        })
    }

    pub fn num_input_features(&self) -> usize {
        self.num_input_features
    }

    pub fn out_channels(&self) -> usize {
        self.point_net2.out_channels()
    }

    /// Downsampling factor of the output grid relative to the pillar grid.
    pub fn stride(&self) -> u32 {
        self.pillar_view.stride()
    }

    pub fn forward(&self, points: &PointBatch) -> Result<FusionOutput> {
        if points.feature_width() != self.num_input_features {
            bail!(
                "fuser expects {} columns after the batch id, got {}",
                self.num_input_features,
                points.feature_width()
            );
        }

        let filtered = filter_points(points, &self.range);
        let kept = filtered.points;
        debug!(
            input = points.len(),
            kept = kept.len(),
            removed_by_xy = filtered.removed_by_xy,
            removed_by_z = filtered.removed_by_z,
            "range filter"
        );

        let (pillar, cylinder) = rayon::join(
            || self.pillar_decorator.decorate(&kept),
            || self.cylinder_decorator.decorate(&kept),
        );
        let pillar = pillar.context("pillar decoration")?;
        let cylinder = cylinder.context("cylinder decoration")?;
        debug_assert_eq!(pillar.features.len(), cylinder.features.len());

        let decorated = Features::concat(&[&pillar.features, &cylinder.features])?;

        let (pillar_samples, cylinder_samples) = rayon::join(
            || self.pillar_view.forward(&decorated, &pillar.binned),
            || self.cylinder_view.forward(&decorated, &cylinder.binned),
        );
        let pillar_samples = pillar_samples?;
        let cylinder_samples = cylinder_samples?;

        let shared = self.point_net1.forward(&decorated).context("point net 1")?;
        let fused = Features::concat(&[&shared, &pillar_samples, &cylinder_samples])?;
        let fused = self.point_net2.forward(&fused).context("point net 2")?;

        let pooled = scatter_max(&fused, &pillar.binned.cells)?;
        let full = SparseCells::new(
            pooled,
            pillar.binned.bev_coords(),
            pillar.binned.bev_extent(),
            pillar.binned.batch_size(),
        )?;
        let cells = full.downsample(self.stride())?;
        debug!(
            pillars = full.len(),
            cells = cells.len(),
            stride = self.stride(),
            "downsampled fused pillars"
        );

        let grid = cells.densify().context("densifying fused cells")?;
        debug!(cells = cells.len(), shape = ?grid.shape(), "fused grid");

        Ok(FusionOutput {
            grid,
            cells,
            points_kept: kept.len(),
            removed_by_xy: filtered.removed_by_xy,
            removed_by_z: filtered.removed_by_z,
        })
    }
}

/// Builder for [`MultiViewFuser`] with randomly initialized weights.
#[derive(Debug, Clone, Default)]
pub struct MultiViewFuserBuilder {
    config: MvfConfig,
}

impl MultiViewFuserBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MvfConfig::default(),
        }
    }

    /// Point columns after the batch id.
    pub fn num_input_features(mut self, n: usize) -> Self {
        self.config.num_input_features = n;
        self
    }

    /// Pillar grid range `[min_x, min_y, min_z, max_x, max_y, max_z]` and cell size.
    pub fn pillar_grid(mut self, range: [f32; 6], cell_size: [f32; 3]) -> Self {
        self.config.pillar = GridSpecConfig { range, cell_size };
        self
    }

    /// Cylinder grid range over `(angle_deg, z, radius)` and cell size.
    pub fn cylinder_grid(mut self, range: [f32; 6], cell_size: [f32; 3]) -> Self {
        self.config.cylinder = GridSpecConfig { range, cell_size };
        self
    }

    pub fn num_filters(mut self, num_filters: Vec<usize>) -> Self {
        self.config.view.num_filters = num_filters;
        self
    }

    /// Backbone stage strides and widths.
    pub fn backbone(mut self, strides: Vec<u32>, num_filters: Vec<usize>) -> Self {
        self.config.view.ds_layer_strides = strides;
        self.config.view.ds_num_filters = num_filters;
        self
    }

    pub fn out_channels(mut self, out_channels: usize) -> Self {
        self.config.out_channels = out_channels;
        self
    }

    pub fn norm_stats(mut self, stats: NormStats) -> Self {
        self.config.norm_stats = stats;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> Result<MultiViewFuser> {
        MultiViewFuser::with_config(self.config)
    }
}
