//! Batched point storage.
//!
//! A [`PointBatch`] is a flat, row-major buffer where each row has the fixed
//! schema `[batch_id, x, y, z, feature...]`. Several point clouds are packed
//! into one buffer and told apart by the leading batch id.
//!
//! Rows are validated once at construction: every value must be finite and
//! the batch id must be a non-negative integer. Downstream reductions would
//! otherwise spread a single NaN over a whole cell.

mod filter;

pub use filter::{filter_points, FilterResult, RangeFilter};

use crate::error::{MvfError, Result};

/// Column of the batch id in every row.
pub const BATCH_COLUMN: usize = 0;
/// First column of the xyz position.
pub const POSITION_COLUMN: usize = 1;

/// Row-major batch of points sharing one row width.
#[derive(Debug, Clone, PartialEq)]
pub struct PointBatch {
    data: Vec<f32>,
    width: usize,
}

impl PointBatch {
    /// Smallest valid row: batch id plus xyz.
    pub const MIN_WIDTH: usize = 4;

    /// Build a batch from a flat buffer of `width`-sized rows.
    pub fn new(data: Vec<f32>, width: usize) -> Result<Self> {
        if width < Self::MIN_WIDTH {
            return Err(MvfError::PointWidth {
                width,
                min: Self::MIN_WIDTH,
            });
        }
        if data.len() % width != 0 {
            return Err(MvfError::RaggedPoints {
                len: data.len(),
                width,
            });
        }

        for (row, values) in data.chunks_exact(width).enumerate() {
            if let Some(column) = values.iter().position(|v| !v.is_finite()) {
                return Err(MvfError::NonFinitePoint { row, column });
            }
            let id = values[BATCH_COLUMN];
            if id < 0.0 || id.fract() != 0.0 || id > u16::MAX as f32 {
                return Err(MvfError::InvalidBatchId { row, value: id });
            }
        }

        Ok(Self { data, width })
    }

    /// Build a batch from fixed-size rows.
    pub fn from_rows<const W: usize>(rows: &[[f32; W]]) -> Result<Self> {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(data, W)
    }

    /// An empty batch with the given row width.
    pub fn empty(width: usize) -> Result<Self> {
        Self::new(Vec::new(), width)
    }

    /// Rows that were already validated by another batch.
    pub(crate) fn from_validated(data: Vec<f32>, width: usize) -> Self {
        debug_assert_eq!(data.len() % width, 0);
        Self { data, width }
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Full row width including the batch id.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Row width without the batch id (position plus auxiliary features).
    pub fn feature_width(&self) -> usize {
        self.width - 1
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.width)
    }

    pub fn batch_id(&self, i: usize) -> u32 {
        self.data[i * self.width + BATCH_COLUMN] as u32
    }

    pub fn position(&self, i: usize) -> [f32; 3] {
        let base = i * self.width + POSITION_COLUMN;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }

    /// Everything after the batch id.
    pub fn features(&self, i: usize) -> &[f32] {
        &self.row(i)[POSITION_COLUMN..]
    }

    /// Number of dense batch slots: largest batch id plus one.
    pub fn batch_size(&self) -> usize {
        self.rows()
            .map(|r| r[BATCH_COLUMN] as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Keep the rows whose mask entry is `true`, preserving order.
    pub fn select(&self, keep: &[bool]) -> Self {
        debug_assert_eq!(keep.len(), self.len());
        let kept = keep.iter().filter(|&&k| k).count();
        let mut data = Vec::with_capacity(kept * self.width);
        for (row, &k) in self.rows().zip(keep) {
            if k {
                data.extend_from_slice(row);
            }
        }
        Self::from_validated(data, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_batch_accessors() {
        let batch =
            PointBatch::from_rows(&[[0.0, 1.0, 2.0, 3.0, 0.5], [1.0, -1.0, -2.0, -3.0, 0.25]])
                .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.width(), 5);
        assert_eq!(batch.feature_width(), 4);
        assert_eq!(batch.batch_id(1), 1);
        assert_eq!(batch.position(0), [1.0, 2.0, 3.0]);
        assert_eq!(batch.features(1), &[-1.0, -2.0, -3.0, 0.25]);
        assert_eq!(batch.batch_size(), 2);
    }

    #[test]
    fn test_rejects_narrow_rows() {
        let err = PointBatch::new(vec![0.0; 6], 3).unwrap_err();
        assert_eq!(err, MvfError::PointWidth { width: 3, min: 4 });
    }

    #[test]
    fn test_rejects_ragged_buffer() {
        let err = PointBatch::new(vec![0.0; 7], 4).unwrap_err();
        assert_eq!(err, MvfError::RaggedPoints { len: 7, width: 4 });
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = PointBatch::from_rows(&[[0.0, 1.0, 2.0, 3.0], [0.0, f32::NAN, 0.0, 0.0]])
            .unwrap_err();
        assert_eq!(err, MvfError::NonFinitePoint { row: 1, column: 1 });
    }

    #[test]
    fn test_rejects_fractional_batch_id() {
        let err = PointBatch::from_rows(&[[0.5, 1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, MvfError::InvalidBatchId { row: 0, .. }));

        let err = PointBatch::from_rows(&[[-1.0, 1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, MvfError::InvalidBatchId { row: 0, .. }));
    }

    #[test]
    fn test_empty_batch() {
        let batch = PointBatch::empty(5).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.batch_size(), 0);
    }

    #[test]
    fn test_select_preserves_order() {
        let batch = PointBatch::from_rows(&[
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 3.0, 0.0, 0.0],
        ])
        .unwrap();

        let kept = batch.select(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.position(0)[0], 1.0);
        assert_eq!(kept.position(1)[0], 3.0);
    }
}
