//! Bias-free fully connected layer.

use nalgebra::DMatrix;
use rand::Rng;

use crate::error::{MvfError, Result};
use crate::features::Features;

/// `y = x · Wᵀ` with `W` stored as `out × in`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    weight: DMatrix<f32>,
}

impl Linear {
    /// Wrap externally supplied weights (`out × in`).
    pub fn from_weights(weight: DMatrix<f32>) -> Result<Self> {
        if weight.nrows() == 0 || weight.ncols() == 0 {
            return Err(MvfError::ShapeMismatch(format!(
                "linear weights must be non-empty, got {}x{}",
                weight.nrows(),
                weight.ncols()
            )));
        }
        Ok(Self { weight })
    }

    /// Weights from a row-major `out × in` buffer.
    pub fn from_row_major(in_channels: usize, out_channels: usize, values: &[f32]) -> Result<Self> {
        if values.len() != in_channels * out_channels {
            return Err(MvfError::ShapeMismatch(format!(
                "{} weights for a {out_channels}x{in_channels} layer",
                values.len()
            )));
        }
        Self::from_weights(DMatrix::from_row_slice(out_channels, in_channels, values))
    }

    /// Uniform init in `±1/sqrt(in)`.
    pub fn random<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, rng: &mut R) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(MvfError::EmptyChannelList);
        }
        let bound = 1.0 / (in_channels as f32).sqrt();
        let weight = DMatrix::from_fn(out_channels, in_channels, |_, _| rng.gen_range(-bound..bound));
        Ok(Self { weight })
    }

    pub fn in_channels(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    pub fn weight(&self) -> &DMatrix<f32> {
        &self.weight
    }

    pub fn forward(&self, input: &Features) -> Result<Features> {
        if input.channels() != self.in_channels() {
            return Err(MvfError::ChannelMismatch {
                expected: self.in_channels(),
                actual: input.channels(),
            });
        }
        let out = input.to_matrix() * self.weight.transpose();
        Features::from_matrix(&out)
    }
}
