//! Row-major feature matrices.

use nalgebra::DMatrix;

use crate::error::{MvfError, Result};

/// `rows × channels` matrix of `f32`, one row per point or per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    data: Vec<f32>,
    channels: usize,
}

impl Features {
    pub fn new(data: Vec<f32>, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(MvfError::ShapeMismatch(
                "feature matrices need at least one channel".into(),
            ));
        }
        if data.len() % channels != 0 {
            return Err(MvfError::ShapeMismatch(format!(
                "{} values do not split into rows of {channels}",
                data.len()
            )));
        }
        Ok(Self { data, channels })
    }

    pub fn from_rows<const C: usize>(rows: &[[f32; C]]) -> Result<Self> {
        Self::new(rows.iter().flat_map(|r| r.iter().copied()).collect(), C)
    }

    pub fn zeros(rows: usize, channels: usize) -> Self {
        debug_assert!(channels > 0);
        Self {
            data: vec![0.0; rows * channels],
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.channels..(i + 1) * self.channels]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.channels)
    }

    /// Concatenate along channels; every part must have the same row count.
    pub fn concat(parts: &[&Features]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(MvfError::ShapeMismatch("nothing to concatenate".into()));
        };
        let rows = first.len();
        if let Some(bad) = parts.iter().find(|p| p.len() != rows) {
            return Err(MvfError::ShapeMismatch(format!(
                "cannot concatenate {} rows with {rows} rows",
                bad.len()
            )));
        }

        let channels: usize = parts.iter().map(|p| p.channels).sum();
        let mut data = Vec::with_capacity(rows * channels);
        for i in 0..rows {
            for part in parts {
                data.extend_from_slice(part.row(i));
            }
        }
        Ok(Self { data, channels })
    }

    /// Copy into a column-major nalgebra matrix.
    pub fn to_matrix(&self) -> DMatrix<f32> {
        DMatrix::from_row_slice(self.len(), self.channels, &self.data)
    }

    /// Copy out of an nalgebra matrix.
    pub fn from_matrix(m: &DMatrix<f32>) -> Result<Self> {
        let data = m.transpose().as_slice().to_vec();
        Self::new(data, m.ncols())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat() {
        let a = Features::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = Features::from_rows(&[[5.0], [6.0]]).unwrap();

        let c = Features::concat(&[&a, &b]).unwrap();
        assert_eq!(c.channels(), 3);
        assert_eq!(c.row(0), &[1.0, 2.0, 5.0]);
        assert_eq!(c.row(1), &[3.0, 4.0, 6.0]);
    }

    #[test]
    fn test_concat_row_mismatch() {
        let a = Features::from_rows(&[[1.0], [2.0]]).unwrap();
        let b = Features::from_rows(&[[1.0]]).unwrap();
        assert!(Features::concat(&[&a, &b]).is_err());
    }

    #[test]
    fn test_matrix_round_trip() {
        let a = Features::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let m = a.to_matrix();
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(Features::from_matrix(&m).unwrap(), a);
    }

    #[test]
    fn test_rejects_zero_channels() {
        assert!(Features::new(vec![], 0).is_err());
        assert!(Features::new(vec![1.0, 2.0, 3.0], 2).is_err());
    }
}
