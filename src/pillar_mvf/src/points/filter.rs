//! Outer range filter shared by all views.

use super::PointBatch;

/// Axis-aligned half-open box `[min, max)` in point coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeFilter {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl RangeFilter {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    #[inline]
    fn contains_axis(&self, p: &[f32; 3], axis: usize) -> bool {
        p[axis] >= self.min[axis] && p[axis] < self.max[axis]
    }
}

/// Result of the range filter.
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Surviving points, in input order.
    pub points: PointBatch,
    /// Input index of every surviving point.
    pub kept: Vec<usize>,
    /// Number of points outside the x/y bounds.
    pub removed_by_xy: usize,
    /// Number of points inside x/y but outside the z bounds.
    pub removed_by_z: usize,
}

/// Drop the points that fall outside `range`.
pub fn filter_points(points: &PointBatch, range: &RangeFilter) -> FilterResult {
    let input_count = points.len();

    let mut keep = vec![false; input_count];
    let mut kept = Vec::with_capacity(input_count);
    let mut removed_by_xy = 0usize;
    let mut removed_by_z = 0usize;

    for (i, flag) in keep.iter_mut().enumerate() {
        let p = points.position(i);

        if !range.contains_axis(&p, 0) || !range.contains_axis(&p, 1) {
            removed_by_xy += 1;
            continue;
        }

        if !range.contains_axis(&p, 2) {
            removed_by_z += 1;
            continue;
        }

        *flag = true;
        kept.push(i);
    }

    debug_assert_eq!(input_count, kept.len() + removed_by_xy + removed_by_z);

    FilterResult {
        points: points.select(&keep),
        kept,
        removed_by_xy,
        removed_by_z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> RangeFilter {
        RangeFilter::new([-10.0, -10.0, -2.0], [10.0, 10.0, 4.0])
    }

    #[test]
    fn test_filter_empty() {
        let points = PointBatch::empty(4).unwrap();
        let result = filter_points(&points, &range());
        assert!(result.points.is_empty());
        assert_eq!(result.removed_by_xy, 0);
        assert_eq!(result.removed_by_z, 0);
    }

    #[test]
    fn test_filter_xy() {
        let points = PointBatch::from_rows(&[
            [0.0, -11.0, 0.0, 0.0], // x too small
            [0.0, 5.0, 0.0, 0.0],   // pass
            [0.0, 0.0, 10.0, 0.0],  // y == max, half-open
        ])
        .unwrap();

        let result = filter_points(&points, &range());
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.kept, vec![1]);
        assert_eq!(result.removed_by_xy, 2);
    }

    #[test]
    fn test_filter_z() {
        let points = PointBatch::from_rows(&[
            [0.0, 1.0, 0.0, -5.0], // below min z
            [0.0, 1.0, 0.0, -2.0], // z == min, kept
            [0.0, 1.0, 0.0, 15.0], // above max z
        ])
        .unwrap();

        let result = filter_points(&points, &range());
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.removed_by_z, 2);
        assert_eq!(result.points.position(0), [1.0, 0.0, -2.0]);
    }

    #[test]
    fn test_filter_keeps_features_and_order() {
        let points = PointBatch::from_rows(&[
            [1.0, 1.0, 1.0, 1.0, 0.1],
            [0.0, 50.0, 1.0, 1.0, 0.2],
            [0.0, 2.0, 2.0, 2.0, 0.3],
        ])
        .unwrap();

        let result = filter_points(&points, &range());
        assert_eq!(result.kept, vec![0, 2]);
        assert_eq!(result.points.row(0), &[1.0, 1.0, 1.0, 1.0, 0.1]);
        assert_eq!(result.points.row(1), &[0.0, 2.0, 2.0, 2.0, 0.3]);
    }
}
