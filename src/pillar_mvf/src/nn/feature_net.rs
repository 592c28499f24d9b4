//! Single-grid encoders: decorated pillars through a PFN stack, and
//! voxel means of raw features.

use rand::Rng;
use tracing::debug;

use super::{NormStats, PfnStack};
use crate::backbone::SparseCells;
use crate::decorate::{FeatureDecorator, ViewKind};
use crate::error::{MvfError, Result};
use crate::features::Features;
use crate::grid::GridSpec;
use crate::points::PointBatch;
use crate::scatter::scatter_mean;

fn check_width(points: &PointBatch, num_input_features: usize) -> Result<()> {
    if points.feature_width() != num_input_features {
        return Err(MvfError::ChannelMismatch {
            expected: num_input_features,
            actual: points.feature_width(),
        });
    }
    Ok(())
}

/// Pillar binning (points outside x/y dropped), decoration, PFN stack and a
/// per-pillar max.
#[derive(Debug, Clone, PartialEq)]
pub struct PillarFeatureNet {
    decorator: FeatureDecorator,
    pfn: PfnStack,
    num_input_features: usize,
}

impl PillarFeatureNet {
    /// `num_input_features` counts the columns after the batch id; the PFN
    /// stack must take that plus the five decoration channels.
    pub fn new(num_input_features: usize, spec: GridSpec, pfn: PfnStack) -> Result<Self> {
        let expected = FeatureDecorator::output_channels(num_input_features);
        if pfn.in_channels() != expected {
            return Err(MvfError::ChannelMismatch {
                expected,
                actual: pfn.in_channels(),
            });
        }
        Ok(Self {
            decorator: FeatureDecorator::new(ViewKind::Pillar, spec)?,
            pfn,
            num_input_features,
        })
    }

    pub fn random<R: Rng + ?Sized>(
        num_input_features: usize,
        num_filters: &[usize],
        spec: GridSpec,
        rng: &mut R,
    ) -> Result<Self> {
        let in_channels = FeatureDecorator::output_channels(num_input_features);
        Self::new(num_input_features, spec, PfnStack::random(in_channels, num_filters, rng)?)
    }

    pub fn with_stats(mut self, stats: NormStats) -> Self {
        self.pfn = self.pfn.with_stats(stats);
        self
    }

    pub fn out_channels(&self) -> usize {
        self.pfn.out_channels()
    }

    /// Per-pillar features with `(batch, y, x)` coordinates.
    pub fn forward(&self, points: &PointBatch) -> Result<SparseCells> {
        check_width(points, self.num_input_features)?;
        let decorated = self.decorator.decorate(points)?;
        let binned = &decorated.binned;

        let features = self.pfn.forward_cells(&decorated.features, &binned.cells)?;
        debug!(pillars = features.len(), channels = features.channels(), "pillar features");

        SparseCells::new(
            features,
            binned.bev_coords(),
            binned.bev_extent(),
            binned.batch_size(),
        )
    }
}

/// Occupied voxels with `(batch, z, y, x)` coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelCells {
    pub features: Features,
    pub coords: Vec<[u32; 4]>,
    /// `(nz, ny, nx)`.
    pub extent: [u32; 3],
    pub batch_size: usize,
}

/// Voxel binning (points outside x/y/z dropped) and the per-voxel mean of
/// raw features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelFeatureNet {
    decorator: FeatureDecorator,
}

impl VoxelFeatureNet {
    pub fn new(spec: GridSpec) -> Result<Self> {
        Ok(Self {
            decorator: FeatureDecorator::new(ViewKind::Voxel, spec)?,
        })
    }

    pub fn forward(&self, points: &PointBatch) -> Result<VoxelCells> {
        let binned = self.decorator.bin(points)?;
        let raw = Features::new(
            binned.points.rows().flat_map(|r| r[1..].iter().copied()).collect(),
            binned.points.feature_width(),
        )?;
        let features = scatter_mean(&raw, &binned.cells)?;
        debug!(voxels = features.len(), "voxel features");

        Ok(VoxelCells {
            features,
            coords: binned.voxel_coords(),
            extent: binned.voxel_extent(),
            batch_size: binned.batch_size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn test_pillar_feature_net_shapes() {
        let spec = crate::test_utils::small_pillar_spec().unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let net = PillarFeatureNet::random(4, &[16, 32], spec, &mut rng).unwrap();
        let points = crate::test_utils::make_scene(2, 800, 4);

        let cells = net.forward(&points).unwrap();
        assert_eq!(cells.extent, [32, 32]);
        assert_eq!(cells.batch_size, 2);
        assert_eq!(cells.channels(), 32);
        assert_eq!(cells.features.len(), cells.coords.len());
        assert!(cells.coords.iter().all(|c| c[1] < 32 && c[2] < 32));
        // pooled after ReLU
        assert!(cells.features.as_slice().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_pillar_feature_net_rejects_wrong_width() {
        let spec = crate::test_utils::small_pillar_spec().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let net = PillarFeatureNet::random(5, &[8], spec, &mut rng).unwrap();
        let points = crate::test_utils::make_scene(1, 10, 0);
        assert_eq!(
            net.forward(&points).unwrap_err(),
            MvfError::ChannelMismatch {
                expected: 5,
                actual: 4
            }
        );
    }

    #[test]
    fn test_pfn_input_width_is_checked() {
        let spec = crate::test_utils::small_pillar_spec().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let pfn = PfnStack::random(8, &[8], &mut rng).unwrap();
        assert!(PillarFeatureNet::new(4, spec, pfn).is_err());
    }

    #[test]
    fn test_voxel_mean() {
        let spec = GridSpec::new([0.0, 0.0, 0.0], [2.0, 2.0, 2.0], [1.0, 1.0, 1.0]).unwrap();
        let net = VoxelFeatureNet::new(spec).unwrap();
        let points = PointBatch::from_rows(&[
            [0.0, 0.2, 0.2, 1.2, 1.0],
            [0.0, 0.4, 0.6, 1.8, 3.0],
            [0.0, 1.5, 0.5, 0.5, 7.0],
            [0.0, 1.5, 0.5, 2.5, 7.0],
        ])
        .unwrap();

        let voxels = net.forward(&points).unwrap();
        assert_eq!(voxels.extent, [2, 2, 2]);
        // keys sort by (x, y, z): voxel (0, 0, 1) comes first
        assert_eq!(voxels.coords, vec![[0, 1, 0, 0], [0, 0, 0, 1]]);

        let row = voxels.features.row(0);
        assert_relative_eq!(row[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(row[1], 0.4, epsilon = 1e-6);
        assert_relative_eq!(row[2], 1.5, epsilon = 1e-6);
        assert_relative_eq!(row[3], 2.0, epsilon = 1e-6);
        assert_eq!(voxels.features.row(1), &[1.5, 0.5, 0.5, 7.0]);
    }
}
