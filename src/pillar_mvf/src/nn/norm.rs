//! Per-channel batch normalization.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MvfError, Result};
use crate::features::Features;

/// Epsilon added to the variance before the square root.
pub const BATCH_NORM_EPS: f32 = 1e-3;

/// Where normalization statistics come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormStats {
    /// Mean and biased variance of the current rows.
    #[default]
    Batch,
    /// Stored running mean and variance.
    Running,
}

/// `y = (x - mean) / sqrt(var + eps) * gamma + beta`, per channel.
///
/// Statistics span all rows of the pass (every point of every cell).
/// Running statistics are never updated here.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm1d {
    gamma: Vec<f32>,
    beta: Vec<f32>,
    running_mean: Vec<f32>,
    running_var: Vec<f32>,
    eps: f32,
    stats: NormStats,
}

impl BatchNorm1d {
    /// Identity affine, zero mean, unit variance.
    pub fn new(channels: usize) -> Self {
        Self {
            gamma: vec![1.0; channels],
            beta: vec![0.0; channels],
            running_mean: vec![0.0; channels],
            running_var: vec![1.0; channels],
            eps: BATCH_NORM_EPS,
            stats: NormStats::Batch,
        }
    }

    /// Externally supplied affine and running statistics.
    pub fn from_params(
        gamma: Vec<f32>,
        beta: Vec<f32>,
        running_mean: Vec<f32>,
        running_var: Vec<f32>,
    ) -> Result<Self> {
        let channels = gamma.len();
        for (name, len) in [
            ("beta", beta.len()),
            ("running_mean", running_mean.len()),
            ("running_var", running_var.len()),
        ] {
            if len != channels {
                return Err(MvfError::ShapeMismatch(format!(
                    "batch norm {name} has {len} channels, gamma has {channels}"
                )));
            }
        }
        Ok(Self {
            gamma,
            beta,
            running_mean,
            running_var,
            eps: BATCH_NORM_EPS,
            stats: NormStats::Batch,
        })
    }

    pub fn with_stats(mut self, stats: NormStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn stats(&self) -> NormStats {
        self.stats
    }

    /// Per-channel mean and biased variance over all rows.
    pub fn batch_statistics(input: &Features) -> (Vec<f32>, Vec<f32>) {
        let channels = input.channels();
        let n = input.len();
        if n == 0 {
            return (vec![0.0; channels], vec![0.0; channels]);
        }

        let mean: Vec<f64> = column_sums(input, |_, v| v as f64)
            .into_iter()
            .map(|s| s / n as f64)
            .collect();
        let var = column_sums(input, |c, v| {
            let d = v as f64 - mean[c];
            d * d
        });

        (
            mean.iter().map(|&m| m as f32).collect(),
            var.iter().map(|&s| (s / n as f64) as f32).collect(),
        )
    }

    pub fn forward(&self, input: &Features) -> Result<Features> {
        let channels = self.channels();
        if input.channels() != channels {
            return Err(MvfError::ChannelMismatch {
                expected: channels,
                actual: input.channels(),
            });
        }

        let (mean, var) = match self.stats {
            NormStats::Batch => Self::batch_statistics(input),
            NormStats::Running => (self.running_mean.clone(), self.running_var.clone()),
        };
        let scale: Vec<f32> = var
            .iter()
            .zip(&self.gamma)
            .map(|(v, g)| g / (v + self.eps).sqrt())
            .collect();

        let mut out = input.clone();
        out.as_mut_slice().par_chunks_mut(channels).for_each(|row| {
            for (c, x) in row.iter_mut().enumerate() {
                *x = (*x - mean[c]) * scale[c] + self.beta[c];
            }
        });
        Ok(out)
    }
}

/// Rows summed by one task in [`column_sums`].
const ROWS_PER_TASK: usize = 4096;

/// `Σ_rows f(channel, value)` per channel, accumulated in f64.
///
/// Partial sums cover fixed row blocks and are combined in block order, so
/// the result does not depend on how rayon schedules the blocks.
fn column_sums(input: &Features, f: impl Fn(usize, f32) -> f64 + Sync) -> Vec<f64> {
    let channels = input.channels();
    let partials: Vec<Vec<f64>> = input
        .as_slice()
        .par_chunks(channels * ROWS_PER_TASK)
        .map(|block| {
            let mut acc = vec![0.0f64; channels];
            for row in block.chunks_exact(channels) {
                for (c, &v) in row.iter().enumerate() {
                    acc[c] += f(c, v);
                }
            }
            acc
        })
        .collect();

    let mut sums = vec![0.0f64; channels];
    for partial in partials {
        sums.iter_mut().zip(partial).for_each(|(s, p)| *s += p);
    }
    sums
}
