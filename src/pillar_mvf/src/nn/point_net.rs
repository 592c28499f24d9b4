//! Shared per-point transform: linear → batch norm → ReLU.

use rand::Rng;

use super::{relu, BatchNorm1d, Linear, NormStats};
use crate::error::{MvfError, Result};
use crate::features::Features;

#[derive(Debug, Clone, PartialEq)]
pub struct PointNet {
    linear: Linear,
    norm: BatchNorm1d,
}

impl PointNet {
    pub fn new(linear: Linear, norm: BatchNorm1d) -> Result<Self> {
        if norm.channels() != linear.out_channels() {
            return Err(MvfError::ChannelMismatch {
                expected: linear.out_channels(),
                actual: norm.channels(),
            });
        }
        Ok(Self { linear, norm })
    }

    pub fn random<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, rng: &mut R) -> Result<Self> {
        let linear = Linear::random(in_channels, out_channels, rng)?;
        Self::new(linear, BatchNorm1d::new(out_channels))
    }

    pub fn with_stats(mut self, stats: NormStats) -> Self {
        self.norm = self.norm.with_stats(stats);
        self
    }

    pub fn in_channels(&self) -> usize {
        self.linear.in_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.linear.out_channels()
    }

    pub fn forward(&self, input: &Features) -> Result<Features> {
        let mut x = self.norm.forward(&self.linear.forward(input)?)?;
        relu(&mut x);
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn test_output_is_non_negative() {
        let net = PointNet::random(6, 4, &mut StdRng::seed_from_u64(2)).unwrap();
        let x = Features::new(crate::test_utils::random_values(100, 6, 3), 6).unwrap();

        let y = net.forward(&x).unwrap();
        assert_eq!(y.len(), 100);
        assert_eq!(y.channels(), 4);
        assert!(y.as_slice().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_identity_weights() {
        let linear = Linear::from_row_major(2, 2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let norm = BatchNorm1d::from_params(vec![1.0; 2], vec![0.0; 2], vec![0.0; 2], vec![1.0; 2])
            .unwrap()
            .with_stats(NormStats::Running);
        let net = PointNet::new(linear, norm).unwrap();

        let x = Features::from_rows(&[[2.0, -3.0]]).unwrap();
        let y = net.forward(&x).unwrap();
        let scale = 1.0 / (1.0f32 + 1e-3).sqrt();
        assert_eq!(y.row(0), &[2.0 * scale, 0.0]);
    }

    #[test]
    fn test_norm_width_must_match() {
        let linear = Linear::from_row_major(2, 3, &[0.0; 6]).unwrap();
        assert!(PointNet::new(linear, BatchNorm1d::new(2)).is_err());
    }
}
