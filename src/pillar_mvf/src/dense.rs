//! Dense `(batch, channel, height, width)` grids.
//!
//! Cells not written are zero. Sampling uses bilinear interpolation over
//! the four neighbouring pixels with indices clamped to the grid.

use rayon::prelude::*;
use tracing::debug;

use crate::error::{MvfError, Result};
use crate::features::Features;

#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrid {
    data: Vec<f32>,
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl DenseGrid {
    pub fn zeros(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            data: vec![0.0; batch * channels * height * width],
            batch,
            channels,
            height,
            width,
        }
    }

    /// Scatter cell rows to `(batch, row, col)` positions.
    ///
    /// Every coordinate must lie inside `batch_size × extent`. Two rows at
    /// the same position are merged by per-channel max.
    pub fn from_cells(
        features: &Features,
        coords: &[[u32; 3]],
        extent: [u32; 2],
        batch_size: usize,
    ) -> Result<Self> {
        if features.len() != coords.len() {
            return Err(MvfError::ShapeMismatch(format!(
                "{} cell rows for {} cell coordinates",
                features.len(),
                coords.len()
            )));
        }
        let [height, width] = extent.map(|e| e as usize);
        if let Some(c) = coords
            .iter()
            .find(|c| c[0] as usize >= batch_size || c[1] as usize >= height || c[2] as usize >= width)
        {
            return Err(MvfError::ShapeMismatch(format!(
                "cell {c:?} outside a {batch_size}x{height}x{width} grid"
            )));
        }

        let mut grid = Self::zeros(batch_size, features.channels(), height, width);
        let mut occupied = vec![false; batch_size * height * width];
        let mut merged = 0usize;
        for (row, c) in features.rows().zip(coords) {
            let (b, y, x) = (c[0] as usize, c[1] as usize, c[2] as usize);
            let slot = (b * height + y) * width + x;
            let first = !occupied[slot];
            occupied[slot] = true;
            merged += usize::from(!first);
            for (ch, &v) in row.iter().enumerate() {
                let i = grid.index(b, ch, y, x);
                grid.data[i] = if first { v } else { grid.data[i].max(v) };
            }
        }

        debug!(
            cells = coords.len(),
            merged,
            shape = ?grid.shape(),
            "densified cells"
        );
        Ok(grid)
    }

    /// `[batch, channels, height, width]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn index(&self, b: usize, c: usize, y: usize, x: usize) -> usize {
        ((b * self.channels + c) * self.height + y) * self.width + x
    }

    pub fn get(&self, b: usize, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(b, c, y, x)]
    }

    /// All channels at one pixel.
    pub fn pixel(&self, b: usize, y: usize, x: usize) -> Vec<f32> {
        (0..self.channels).map(|c| self.get(b, c, y, x)).collect()
    }

    /// Bilinear samples at continuous `(x, y)` positions, `x` along width.
    ///
    /// With `x0 = floor(x)`, `x1 = x0 + 1` (likewise for `y`), indices are
    /// clamped into the grid and the weights
    /// `(x1 - x)(y1 - y)`, `(x1 - x)(y - y0)`, `(x - x0)(y1 - y)`,
    /// `(x - x0)(y - y0)` are formed from the unclamped position and the
    /// clamped indices.
    pub fn sample_bilinear(&self, batch_ids: &[u32], positions: &[[f32; 2]]) -> Result<Features> {
        if batch_ids.len() != positions.len() {
            return Err(MvfError::ShapeMismatch(format!(
                "{} batch ids for {} sample positions",
                batch_ids.len(),
                positions.len()
            )));
        }
        if self.channels == 0 {
            return Err(MvfError::ShapeMismatch("cannot sample a grid without channels".into()));
        }
        if positions.is_empty() {
            return Ok(Features::zeros(0, self.channels));
        }
        if self.height == 0 || self.width == 0 {
            return Err(MvfError::ShapeMismatch(format!(
                "cannot sample an empty {}x{} grid",
                self.height, self.width
            )));
        }
        if let Some(&b) = batch_ids.iter().find(|&&b| b as usize >= self.batch) {
            return Err(MvfError::ShapeMismatch(format!(
                "batch id {b} outside a grid of {} batches",
                self.batch
            )));
        }

        let channels = self.channels;
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let mut out = Features::zeros(positions.len(), channels);

        out.as_mut_slice()
            .par_chunks_mut(channels)
            .zip(positions.par_iter().zip(batch_ids.par_iter()))
            .for_each(|(row, (&[x, y], &b))| {
                let b = b as usize;
                let fx = x.floor() as i64;
                let fy = y.floor() as i64;
                let x0 = fx.clamp(0, max_x);
                let x1 = (fx + 1).clamp(0, max_x);
                let y0 = fy.clamp(0, max_y);
                let y1 = (fy + 1).clamp(0, max_y);

                let wa = (x1 as f32 - x) * (y1 as f32 - y);
                let wb = (x1 as f32 - x) * (y - y0 as f32);
                let wc = (x - x0 as f32) * (y1 as f32 - y);
                let wd = (x - x0 as f32) * (y - y0 as f32);

                let (x0, x1, y0, y1) = (x0 as usize, x1 as usize, y0 as usize, y1 as usize);
                for (c, o) in row.iter_mut().enumerate() {
                    let ia = self.get(b, c, y0, x0);
                    let ib = self.get(b, c, y1, x0);
                    let ic = self.get(b, c, y0, x1);
                    let id = self.get(b, c, y1, x1);
                    *o = ia * wa + ib * wb + ic * wc + id * wd;
                }
            });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> DenseGrid {
        // one channel, value = 10 * y + x on a 3x4 grid
        let coords: Vec<[u32; 3]> = (0..3)
            .flat_map(|y| (0..4).map(move |x| [0, y, x]))
            .collect();
        let features =
            Features::new(coords.iter().map(|c| (10 * c[1] + c[2]) as f32).collect(), 1).unwrap();
        DenseGrid::from_cells(&features, &coords, [3, 4], 1).unwrap()
    }

    #[test]
    fn test_from_cells_places_rows() {
        let features = Features::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let grid = DenseGrid::from_cells(&features, &[[0, 1, 2], [1, 0, 0]], [2, 3], 2).unwrap();

        assert_eq!(grid.shape(), [2, 2, 2, 3]);
        assert_eq!(grid.pixel(0, 1, 2), vec![1.0, 2.0]);
        assert_eq!(grid.pixel(1, 0, 0), vec![3.0, 4.0]);
        assert_eq!(grid.pixel(0, 0, 0), vec![0.0, 0.0]);
        assert_eq!(grid.as_slice().iter().filter(|&&v| v != 0.0).count(), 4);
    }

    #[test]
    fn test_from_cells_merges_by_max() {
        let features = Features::from_rows(&[[-3.0], [-1.0], [-2.0]]).unwrap();
        let grid = DenseGrid::from_cells(&features, &[[0, 0, 0]; 3], [1, 1], 1).unwrap();
        assert_eq!(grid.get(0, 0, 0, 0), -1.0);
    }

    #[test]
    fn test_from_cells_rejects_out_of_bounds() {
        let features = Features::from_rows(&[[1.0]]).unwrap();
        assert!(DenseGrid::from_cells(&features, &[[0, 2, 0]], [2, 2], 1).is_err());
        assert!(DenseGrid::from_cells(&features, &[[1, 0, 0]], [2, 2], 1).is_err());
    }

    #[test]
    fn test_empty_cells_give_zero_grid() {
        let grid = DenseGrid::from_cells(&Features::zeros(0, 4), &[], [5, 6], 2).unwrap();
        assert_eq!(grid.shape(), [2, 4, 5, 6]);
        assert!(grid.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sample_at_integer_returns_corner() {
        let grid = ramp();
        let out = grid.sample_bilinear(&[0], &[[2.0, 1.0]]).unwrap();
        assert_eq!(out.row(0), &[12.0]);
    }

    #[test]
    fn test_sample_interpolates() {
        let grid = ramp();
        let out = grid.sample_bilinear(&[0, 0], &[[1.5, 0.5], [0.25, 1.0]]).unwrap();
        assert_relative_eq!(out.row(0)[0], 6.5, epsilon = 1e-5);
        assert_relative_eq!(out.row(1)[0], 10.25, epsilon = 1e-5);
    }

    #[test]
    fn test_sample_on_far_edge_uses_clamped_indices() {
        let grid = ramp();
        // x1 clamps onto x0 = 3, so both weights along x vanish
        let out = grid.sample_bilinear(&[0], &[[3.0, 0.0]]).unwrap();
        assert_eq!(out.row(0), &[0.0]);

        let out = grid.sample_bilinear(&[0], &[[2.0, 0.0]]).unwrap();
        assert_eq!(out.row(0), &[2.0]);
    }

    #[test]
    fn test_densify_then_sample_recovers_cells() {
        let features = Features::new(crate::test_utils::random_values(5, 3, 8), 3).unwrap();
        let coords = [[0, 0, 0], [0, 2, 3], [1, 1, 1], [1, 3, 2], [0, 3, 0]];
        // away from the far edges, where x1 / y1 would clamp onto x0 / y0
        let grid = DenseGrid::from_cells(&features, &coords, [5, 6], 2).unwrap();

        let batch_ids: Vec<u32> = coords.iter().map(|c| c[0]).collect();
        let positions: Vec<[f32; 2]> = coords.iter().map(|c| [c[2] as f32, c[1] as f32]).collect();
        let sampled = grid.sample_bilinear(&batch_ids, &positions).unwrap();
        assert_eq!(sampled, features);
    }

    #[test]
    fn test_sample_rejects_unknown_batch() {
        let grid = ramp();
        assert!(grid.sample_bilinear(&[1], &[[0.0, 0.0]]).is_err());
    }
}
