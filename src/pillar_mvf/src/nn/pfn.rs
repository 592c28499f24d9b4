//! Pillar feature net layers.
//!
//! Each non-final layer produces `out / 2` channels per point, max-pools
//! them per cell and appends the pooled vector back to every point, so the
//! layer emits `out` channels. The final layer emits only the pooled vector.

use rand::Rng;
use tracing::trace;

use super::{relu, BatchNorm1d, Linear, NormStats};
use crate::dedup::CellIndex;
use crate::error::{MvfError, Result};
use crate::features::Features;
use crate::scatter::{broadcast, scatter_max};

#[derive(Debug, Clone, PartialEq)]
pub struct PfnLayer {
    linear: Linear,
    norm: BatchNorm1d,
    last: bool,
}

impl PfnLayer {
    /// Assemble a layer from its parts; `linear` already has the halved
    /// width for non-final layers.
    pub fn new(linear: Linear, norm: BatchNorm1d, last: bool) -> Result<Self> {
        if norm.channels() != linear.out_channels() {
            return Err(MvfError::ChannelMismatch {
                expected: linear.out_channels(),
                actual: norm.channels(),
            });
        }
        Ok(Self { linear, norm, last })
    }

    pub fn random<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        last: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let units = if last {
            out_channels
        } else {
            if out_channels % 2 != 0 {
                return Err(MvfError::OddChannels(out_channels));
            }
            out_channels / 2
        };
        Self::new(Linear::random(in_channels, units, rng)?, BatchNorm1d::new(units), last)
    }

    pub fn with_stats(mut self, stats: NormStats) -> Self {
        self.norm = self.norm.with_stats(stats);
        self
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn in_channels(&self) -> usize {
        self.linear.in_channels()
    }

    /// Channels per point after this layer.
    pub fn out_channels(&self) -> usize {
        if self.last {
            self.linear.out_channels()
        } else {
            self.linear.out_channels() * 2
        }
    }

    pub fn forward(&self, input: &Features, cells: &CellIndex) -> Result<Features> {
        let mut x = self.norm.forward(&self.linear.forward(input)?)?;
        relu(&mut x);

        let x_max = broadcast(&scatter_max(&x, cells)?, cells)?;
        if self.last {
            Ok(x_max)
        } else {
            Features::concat(&[&x, &x_max])
        }
    }
}

/// Chain of [`PfnLayer`]s, the last one marked final.
#[derive(Debug, Clone, PartialEq)]
pub struct PfnStack {
    layers: Vec<PfnLayer>,
}

impl PfnStack {
    pub fn new(layers: Vec<PfnLayer>) -> Result<Self> {
        let Some(last) = layers.last() else {
            return Err(MvfError::EmptyChannelList);
        };
        if !last.is_last() || layers[..layers.len() - 1].iter().any(PfnLayer::is_last) {
            return Err(MvfError::ShapeMismatch(
                "only the final PFN layer may be marked last".into(),
            ));
        }
        for pair in layers.windows(2) {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(MvfError::ChannelMismatch {
                    expected: pair[0].out_channels(),
                    actual: pair[1].in_channels(),
                });
            }
        }
        Ok(Self { layers })
    }

    /// Randomly initialized stack `in_channels → filters[0] → … → filters[n-1]`.
    pub fn random<R: Rng + ?Sized>(in_channels: usize, filters: &[usize], rng: &mut R) -> Result<Self> {
        if filters.is_empty() {
            return Err(MvfError::EmptyChannelList);
        }
        let mut layers = Vec::with_capacity(filters.len());
        let mut width = in_channels;
        for (i, &out) in filters.iter().enumerate() {
            let layer = PfnLayer::random(width, out, i + 1 == filters.len(), rng)?;
            width = layer.out_channels();
            layers.push(layer);
        }
        Self::new(layers)
    }

    pub fn with_stats(self, stats: NormStats) -> Self {
        Self {
            layers: self.layers.into_iter().map(|l| l.with_stats(stats)).collect(),
        }
    }

    pub fn layers(&self) -> &[PfnLayer] {
        &self.layers
    }

    pub fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    pub fn out_channels(&self) -> usize {
        self.layers[self.layers.len() - 1].out_channels()
    }

    /// Per-point output of the final layer.
    pub fn forward(&self, input: &Features, cells: &CellIndex) -> Result<Features> {
        let mut x = self.layers[0].forward(input, cells)?;
        trace!(layer = 0, rows = x.len(), channels = x.channels(), "pfn layer");
        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            x = layer.forward(&x, cells)?;
            trace!(layer = i, rows = x.len(), channels = x.channels(), "pfn layer");
        }
        Ok(x)
    }

    /// One row per cell: the stack output max-pooled per cell.
    pub fn forward_cells(&self, input: &Features, cells: &CellIndex) -> Result<Features> {
        scatter_max(&self.forward(input, cells)?, cells)
    }
}
