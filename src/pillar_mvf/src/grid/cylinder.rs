//! Cartesian to cylindrical point rows.

use rayon::prelude::*;

use crate::points::{PointBatch, POSITION_COLUMN};

/// Angle in degrees and radius of an `(x, y)` pair.
#[inline]
pub fn to_polar(x: f32, y: f32) -> (f32, f32) {
    (y.atan2(x).to_degrees(), x.hypot(y))
}

/// Rewrite every row `[b, x, y, z, f...]` as `[b, angle_deg, z, radius, f...]`.
///
/// The output keeps the row width and order, so point `i` of the result is
/// point `i` of the input.
pub fn to_cylindrical(points: &PointBatch) -> PointBatch {
    let width = points.width();
    let mut data = points.as_slice().to_vec();

    data.par_chunks_exact_mut(width).for_each(|row| {
        let x = row[POSITION_COLUMN];
        let y = row[POSITION_COLUMN + 1];
        let z = row[POSITION_COLUMN + 2];
        let (phi, rho) = to_polar(x, y);
        row[POSITION_COLUMN] = phi;
        row[POSITION_COLUMN + 1] = z;
        row[POSITION_COLUMN + 2] = rho;
    });

    PointBatch::from_validated(data, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_to_polar_quadrants() {
        let (phi, rho) = to_polar(1.0, 0.0);
        assert_relative_eq!(phi, 0.0);
        assert_relative_eq!(rho, 1.0);

        let (phi, rho) = to_polar(0.0, 2.0);
        assert_relative_eq!(phi, 90.0, epsilon = 1e-5);
        assert_relative_eq!(rho, 2.0);

        let (phi, _) = to_polar(-1.0, 0.0);
        assert_relative_eq!(phi, 180.0, epsilon = 1e-5);

        let (phi, rho) = to_polar(3.0, -3.0);
        assert_relative_eq!(phi, -45.0, epsilon = 1e-5);
        assert_relative_eq!(rho, 18.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_to_cylindrical_row_layout() {
        let points = PointBatch::from_rows(&[[1.0, 0.0, 4.0, -1.5, 0.7]]).unwrap();
        let cyl = to_cylindrical(&points);

        assert_eq!(cyl.width(), 5);
        assert_eq!(cyl.batch_id(0), 1);
        let row = cyl.row(0);
        assert_relative_eq!(row[1], 90.0, epsilon = 1e-5);
        assert_relative_eq!(row[2], -1.5);
        assert_relative_eq!(row[3], 4.0);
        assert_relative_eq!(row[4], 0.7);
    }
}
