//! Type definitions for grid binning.

use serde::{Deserialize, Serialize};

use crate::error::{MvfError, Result};

/// Immutable binning geometry for one view.
///
/// The three axes are interpreted by the view: `(x, y, z)` for pillar and
/// voxel views, `(angle_deg, z, radius)` for the cylinder view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    range_min: [f32; 3],
    range_max: [f32; 3],
    cell_size: [f32; 3],
}

impl GridSpec {
    /// Create a grid spec, failing fast on degenerate geometry.
    pub fn new(range_min: [f32; 3], range_max: [f32; 3], cell_size: [f32; 3]) -> Result<Self> {
        if cell_size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(MvfError::InvalidCellSize(cell_size));
        }
        let range_ok = (0..3).all(|a| {
            range_min[a].is_finite() && range_max[a].is_finite() && range_max[a] > range_min[a]
        });
        if !range_ok {
            return Err(MvfError::InvalidRange {
                min: range_min,
                max: range_max,
            });
        }

        let spec = Self {
            range_min,
            range_max,
            cell_size,
        };
        if let Some(axis) = spec.extent().iter().position(|&e| e == 0) {
            return Err(MvfError::EmptyExtent { axis });
        }
        Ok(spec)
    }

    /// Create from a `[min_x, min_y, min_z, max_x, max_y, max_z]` range.
    pub fn from_range(range: [f32; 6], cell_size: [f32; 3]) -> Result<Self> {
        Self::new(
            [range[0], range[1], range[2]],
            [range[3], range[4], range[5]],
            cell_size,
        )
    }

    pub fn range_min(&self) -> [f32; 3] {
        self.range_min
    }

    pub fn range_max(&self) -> [f32; 3] {
        self.range_max
    }

    pub fn cell_size(&self) -> [f32; 3] {
        self.cell_size
    }

    /// Number of cells per axis: `round((max - min) / cell_size)`, ties to even.
    pub fn extent(&self) -> [u32; 3] {
        std::array::from_fn(|a| {
            ((self.range_max[a] - self.range_min[a]) / self.cell_size[a]).round_ties_even() as u32
        })
    }

    /// Continuous cell coordinate of a position, `(pos - min) / cell_size`.
    #[inline]
    pub fn continuous(&self, pos: &[f32; 3]) -> [f32; 3] {
        std::array::from_fn(|a| (pos[a] - self.range_min[a]) / self.cell_size[a])
    }

    /// Geometric center of cell `coord` along `axis`.
    #[inline]
    pub fn cell_center(&self, axis: usize, coord: u32) -> f32 {
        coord as f32 * self.cell_size[axis] + self.cell_size[axis] / 2.0 + self.range_min[axis]
    }
}

/// What happens to points whose cell coordinate leaves `[0, extent)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningPolicy {
    /// Drop the point.
    Discard,
    /// Snap every axis into `[0, extent - 1]`; no point is dropped.
    Clamp,
}

/// Integer cell coordinate.
///
/// Under [`BinningPolicy::Discard`] axes a view does not bin on stay zero;
/// under [`BinningPolicy::Clamp`] all three axes carry the clamped value.
pub type CellCoord = [u32; 3];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pillar_spec() -> GridSpec {
        GridSpec::from_range([-54.0, -54.0, -5.0, 54.0, 54.0, 3.0], [0.075, 0.075, 8.0]).unwrap()
    }

    #[test]
    fn test_extent_rounds() {
        assert_eq!(pillar_spec().extent(), [1440, 1440, 1]);

        // 10 / 3 = 3.33 -> 3, 10 / 4 = 2.5 -> 2, 10 / 6 = 1.67 -> 2
        let spec = GridSpec::new([0.0; 3], [10.0, 10.0, 10.0], [3.0, 4.0, 6.0]).unwrap();
        assert_eq!(spec.extent(), [3, 2, 2]);
    }

    #[test]
    fn test_rejects_zero_cell_size() {
        let err = GridSpec::new([0.0; 3], [1.0; 3], [0.1, 0.0, 0.1]).unwrap_err();
        assert_eq!(err, MvfError::InvalidCellSize([0.1, 0.0, 0.1]));
    }

    #[test]
    fn test_rejects_negative_and_nan_cell_size() {
        assert!(GridSpec::new([0.0; 3], [1.0; 3], [-0.1, 0.1, 0.1]).is_err());
        assert!(GridSpec::new([0.0; 3], [1.0; 3], [f32::NAN, 0.1, 0.1]).is_err());
    }

    #[test]
    fn test_rejects_inverted_range() {
        let err = GridSpec::new([0.0, 0.0, 0.0], [1.0, -1.0, 1.0], [0.1; 3]).unwrap_err();
        assert!(matches!(err, MvfError::InvalidRange { .. }));
    }

    #[test]
    fn test_rejects_empty_extent() {
        // 1.0 / 4.0 rounds to zero cells on z
        let err = GridSpec::new([0.0; 3], [10.0, 10.0, 1.0], [1.0, 1.0, 4.0]).unwrap_err();
        assert_eq!(err, MvfError::EmptyExtent { axis: 2 });
    }

    #[test]
    fn test_cell_center() {
        let spec = pillar_spec();
        assert_relative_eq!(spec.cell_center(0, 0), -54.0 + 0.0375, epsilon = 1e-5);
        assert_relative_eq!(spec.cell_center(1, 10), -54.0 + 0.7875, epsilon = 1e-4);
    }

    #[test]
    fn test_continuous() {
        let spec = GridSpec::new([-1.0, -2.0, -3.0], [1.0, 2.0, 3.0], [0.5, 0.5, 1.0]).unwrap();
        assert_eq!(spec.continuous(&[0.0, 0.0, 0.0]), [2.0, 4.0, 3.0]);
    }
}
