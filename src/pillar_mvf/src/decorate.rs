//! Per-point decoration with cell-relative offsets.
//!
//! Every view bins points into cells and then appends five values to the
//! raw features of each point:
//!
//! - `cluster` (3): position minus the mean position of the point's cell
//! - `center` (2): first two position axes minus the geometric center of the
//!   point's cell on those axes
//!
//! The cylinder view applies the same formulas to `(angle_deg, z, radius)`.

use rayon::prelude::*;
use tracing::debug;

use crate::dedup::CellIndex;
use crate::error::{MvfError, Result};
use crate::features::Features;
use crate::grid::{to_cylindrical, BinningPolicy, CellCoord, GridIndexer, GridSpec};
use crate::points::PointBatch;
use crate::scatter::{broadcast, scatter_mean};

/// Channels appended by decoration.
pub const DECORATION_CHANNELS: usize = 5;

/// Binning flavour of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// 2D pillar keys, points outside x/y are dropped.
    Pillar,
    /// 2D pillar keys, every axis clamped into the grid.
    ClampedPillar,
    /// 3D voxel keys, points outside x/y/z are dropped.
    Voxel,
    /// 2D `(angle, z)` keys over cylindrical coordinates, clamped.
    Cylinder,
}

impl ViewKind {
    pub fn policy(self) -> BinningPolicy {
        match self {
            ViewKind::Pillar | ViewKind::Voxel => BinningPolicy::Discard,
            ViewKind::ClampedPillar | ViewKind::Cylinder => BinningPolicy::Clamp,
        }
    }

    pub fn active_axes(self) -> usize {
        match self {
            ViewKind::Voxel => 3,
            _ => 2,
        }
    }
}

/// Points binned into the cells of one view.
#[derive(Debug, Clone)]
pub struct Binned {
    /// Surviving points in view layout; cylinder rows are
    /// `[b, angle_deg, z, radius, f...]`.
    pub points: PointBatch,
    /// Cell coordinate of every surviving point, in grid axis order.
    pub coords: Vec<CellCoord>,
    /// Unique cells and the point-to-cell map.
    pub cells: CellIndex,
    /// Grid extent in grid axis order.
    pub extent: [u32; 3],
    /// Per input point: whether it survived binning.
    pub valid: Vec<bool>,
}

impl Binned {
    /// Unique cells as `(batch, row, col)` = `(batch, c1, c0)`.
    pub fn bev_coords(&self) -> Vec<[u32; 3]> {
        self.cells.permuted([0, 2, 1])
    }

    /// Extent matching [`Binned::bev_coords`]: `(rows, cols)`.
    pub fn bev_extent(&self) -> [u32; 2] {
        [self.extent[1], self.extent[0]]
    }

    /// Unique cells as `(batch, c2, c1, c0)`, i.e. `(batch, z, y, x)`.
    pub fn voxel_coords(&self) -> Vec<[u32; 4]> {
        self.cells.permuted([0, 3, 2, 1])
    }

    /// Extent matching [`Binned::voxel_coords`].
    pub fn voxel_extent(&self) -> [u32; 3] {
        [self.extent[2], self.extent[1], self.extent[0]]
    }

    /// Number of dense batch slots.
    pub fn batch_size(&self) -> usize {
        self.points.batch_size()
    }
}

/// Output of [`FeatureDecorator::decorate`].
#[derive(Debug, Clone)]
pub struct Decorated {
    /// `[raw features without batch id, cluster (3), center (2)]` per point.
    pub features: Features,
    pub binned: Binned,
}

/// Bins points for one view and decorates them with cell offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureDecorator {
    kind: ViewKind,
    indexer: GridIndexer,
}

impl FeatureDecorator {
    pub fn new(kind: ViewKind, spec: GridSpec) -> Result<Self> {
        let indexer = GridIndexer::new(spec, kind.active_axes(), kind.policy())?;
        Ok(Self { kind, indexer })
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn spec(&self) -> &GridSpec {
        self.indexer.spec()
    }

    /// Decorated width for points with `feature_width` columns after the
    /// batch id.
    pub fn output_channels(feature_width: usize) -> usize {
        feature_width + DECORATION_CHANNELS
    }

    /// Bin points into unique cells without decorating them.
    pub fn bin(&self, points: &PointBatch) -> Result<Binned> {
        let view_points;
        let points = if self.kind == ViewKind::Cylinder {
            view_points = to_cylindrical(points);
            &view_points
        } else {
            points
        };

        let indexed = self.indexer.index(points);
        let batch_ids: Vec<u32> = (0..indexed.points.len())
            .map(|i| indexed.points.batch_id(i))
            .collect();
        let cells = CellIndex::build(&batch_ids, &indexed.coords, self.kind.active_axes())?;

        debug!(
            kind = ?self.kind,
            points = indexed.points.len(),
            dropped = indexed.num_dropped(),
            cells = cells.num_cells(),
            "binned points"
        );

        Ok(Binned {
            points: indexed.points,
            coords: indexed.coords,
            cells,
            extent: indexed.extent,
            valid: indexed.valid,
        })
    }

    /// Bin then decorate.
    pub fn decorate(&self, points: &PointBatch) -> Result<Decorated> {
        let binned = self.bin(points)?;
        let features = self.decorate_binned(&binned)?;
        Ok(Decorated { features, binned })
    }

    /// Decorate already binned points.
    pub fn decorate_binned(&self, binned: &Binned) -> Result<Features> {
        let points = &binned.points;
        if binned.coords.len() != points.len() {
            return Err(MvfError::ShapeMismatch(format!(
                "{} cell coordinates for {} points",
                binned.coords.len(),
                points.len()
            )));
        }

        let positions = Features::new(
            (0..points.len()).flat_map(|i| points.position(i)).collect(),
            3,
        )?;
        let cell_mean = broadcast(&scatter_mean(&positions, &binned.cells)?, &binned.cells)?;

        let spec = self.indexer.spec();
        let raw = points.feature_width();
        let channels = Self::output_channels(raw);
        let mut out = Features::zeros(points.len(), channels);

        out.as_mut_slice()
            .par_chunks_mut(channels)
            .enumerate()
            .for_each(|(i, row)| {
                let pos = positions.row(i);
                let mean = cell_mean.row(i);
                let coord = &binned.coords[i];

                row[..raw].copy_from_slice(points.features(i));
                for a in 0..3 {
                    row[raw + a] = pos[a] - mean[a];
                }
                for a in 0..2 {
                    row[raw + 3 + a] = pos[a] - spec.cell_center(a, coord[a]);
                }
            });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pillar_spec() -> GridSpec {
        GridSpec::new([0.0, 0.0, -2.0], [4.0, 4.0, 2.0], [1.0, 1.0, 4.0]).unwrap()
    }

    #[test]
    fn test_pillar_decoration_values() {
        let decorator = FeatureDecorator::new(ViewKind::Pillar, pillar_spec()).unwrap();
        let points = PointBatch::from_rows(&[
            [0.0, 1.2, 2.5, 0.0, 0.9],
            [0.0, 1.8, 2.1, 1.0, 0.1],
        ])
        .unwrap();

        let out = decorator.decorate(&points).unwrap();
        assert_eq!(out.features.channels(), FeatureDecorator::output_channels(4));
        assert_eq!(FeatureDecorator::output_channels(0), DECORATION_CHANNELS);
        assert_eq!(out.binned.cells.num_cells(), 1);

        let row = out.features.row(0);
        assert_eq!(&row[..4], &[1.2, 2.5, 0.0, 0.9]);
        // cell mean (1.5, 2.3, 0.5)
        assert_relative_eq!(row[4], -0.3, epsilon = 1e-6);
        assert_relative_eq!(row[5], 0.2, epsilon = 1e-6);
        assert_relative_eq!(row[6], -0.5, epsilon = 1e-6);
        // cell (1, 2) centered at (1.5, 2.5)
        assert_relative_eq!(row[7], -0.3, epsilon = 1e-6);
        assert_relative_eq!(row[8], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pillar_drops_out_of_range() {
        let decorator = FeatureDecorator::new(ViewKind::Pillar, pillar_spec()).unwrap();
        let points = PointBatch::from_rows(&[
            [0.0, 1.0, 1.0, 0.0],
            [0.0, 5.0, 1.0, 0.0],
            [1.0, 3.5, 0.5, 9.0],
        ])
        .unwrap();

        let out = decorator.decorate(&points).unwrap();
        assert_eq!(out.features.len(), 2);
        assert_eq!(out.binned.valid, vec![true, false, true]);
        assert_eq!(out.binned.bev_coords(), vec![[0, 1, 1], [1, 0, 3]]);
        assert_eq!(out.binned.bev_extent(), [4, 4]);
    }

    #[test]
    fn test_clamped_pillar_keeps_points() {
        let decorator = FeatureDecorator::new(ViewKind::ClampedPillar, pillar_spec()).unwrap();
        let points = PointBatch::from_rows(&[[0.0, 5.0, -1.0, 0.0], [0.0, 3.9, 0.1, 0.0]]).unwrap();

        let out = decorator.decorate(&points).unwrap();
        assert_eq!(out.features.len(), 2);
        assert_eq!(out.binned.cells.num_cells(), 1);
        assert_eq!(out.binned.bev_coords(), vec![[0, 0, 3]]);
        // center offset measured from the clamped cell
        assert_relative_eq!(out.features.row(0)[6], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_voxel_keys_and_extent() {
        let spec = GridSpec::new([0.0, 0.0, 0.0], [4.0, 2.0, 2.0], [1.0, 1.0, 1.0]).unwrap();
        let decorator = FeatureDecorator::new(ViewKind::Voxel, spec).unwrap();
        let points = PointBatch::from_rows(&[
            [0.0, 3.5, 1.5, 0.5],
            [0.0, 3.5, 1.5, 1.5],
            [0.0, 3.5, 1.5, 2.5],
        ])
        .unwrap();

        let binned = decorator.bin(&points).unwrap();
        assert_eq!(binned.points.len(), 2);
        assert_eq!(binned.voxel_coords(), vec![[0, 0, 1, 3], [0, 1, 1, 3]]);
        assert_eq!(binned.voxel_extent(), [2, 2, 4]);
    }

    #[test]
    fn test_cylinder_uses_angle_and_z() {
        let spec = GridSpec::new([-180.0, -2.0, 0.0], [180.0, 2.0, 10.0], [90.0, 1.0, 10.0])
            .unwrap();
        let decorator = FeatureDecorator::new(ViewKind::Cylinder, spec).unwrap();
        let points = PointBatch::from_rows(&[[0.0, 0.0, 2.0, 0.5, 7.0]]).unwrap();

        let out = decorator.decorate(&points).unwrap();
        let row = out.features.row(0);
        // cylinder layout: angle 90, z 0.5, radius 2
        assert_relative_eq!(row[0], 90.0, epsilon = 1e-5);
        assert_relative_eq!(row[1], 0.5);
        assert_relative_eq!(row[2], 2.0);
        assert_relative_eq!(row[3], 7.0);
        // angle cell 3 spans [90, 180), center 135; z cell 2 center 0.5
        assert_relative_eq!(row[7], -45.0, epsilon = 1e-4);
        assert_relative_eq!(row[8], 0.0, epsilon = 1e-6);
        assert_eq!(out.binned.bev_coords(), vec![[0, 2, 3]]);
        assert_eq!(out.binned.bev_extent(), [4, 4]);
    }

    #[test]
    fn test_decoration_is_deterministic() {
        let points = crate::test_utils::make_scene(2, 2000, 17);
        let spec = crate::test_utils::small_pillar_spec().unwrap();
        let decorator = FeatureDecorator::new(ViewKind::ClampedPillar, spec).unwrap();

        let a = decorator.decorate(&points).unwrap();
        let b = decorator.decorate(&points).unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.binned.cells, b.binned.cells);
    }

    #[test]
    fn test_cluster_offsets_sum_to_zero_per_cell() {
        let points = crate::test_utils::make_scene(1, 1500, 5);
        let spec = crate::test_utils::small_pillar_spec().unwrap();
        let decorator = FeatureDecorator::new(ViewKind::Pillar, spec).unwrap();
        let out = decorator.decorate(&points).unwrap();
        let raw = points.feature_width();

        for cell in 0..out.binned.cells.num_cells() {
            for a in 0..3 {
                let sum: f32 = out
                    .binned
                    .cells
                    .members(cell)
                    .iter()
                    .map(|&p| out.features.row(p as usize)[raw + a])
                    .sum();
                assert_relative_eq!(sum, 0.0, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_empty_points() {
        let decorator = FeatureDecorator::new(ViewKind::Pillar, pillar_spec()).unwrap();
        let out = decorator.decorate(&PointBatch::empty(5).unwrap()).unwrap();
        assert!(out.features.is_empty());
        assert_eq!(out.features.channels(), 9);
        assert!(out.binned.cells.is_empty());
    }
}
