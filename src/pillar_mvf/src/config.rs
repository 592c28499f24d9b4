//! Serializable configuration.
//!
//! Configs are plain data; [`MvfConfig::validate`] checks them and converts
//! the grids into [`GridSpec`]s before anything is built.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::decorate::{FeatureDecorator, ViewKind};
use crate::grid::GridSpec;
use crate::nn::NormStats;

/// Grid geometry as it appears in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpecConfig {
    /// `[min0, min1, min2, max0, max1, max2]`.
    pub range: [f32; 6],
    pub cell_size: [f32; 3],
}

impl GridSpecConfig {
    pub fn to_spec(&self) -> crate::error::Result<GridSpec> {
        GridSpec::from_range(self.range, self.cell_size)
    }
}

/// Layer widths shared by the pillar and cylinder views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// PFN stack widths; every entry but the last must be even.
    pub num_filters: Vec<usize>,
    /// Backbone stage strides.
    pub ds_layer_strides: Vec<u32>,
    /// Backbone stage widths, one per stride.
    pub ds_num_filters: Vec<usize>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            num_filters: vec![64, 64],
            ds_layer_strides: vec![1, 2, 2],
            ds_num_filters: vec![64, 128, 128],
        }
    }
}

impl ViewConfig {
    /// Product of the stage strides.
    pub fn ds_rate(&self) -> u32 {
        self.ds_layer_strides.iter().product()
    }

    /// Width of every per-point view sample.
    pub fn sample_channels(&self) -> usize {
        self.ds_num_filters
            .last()
            .copied()
            .or_else(|| self.num_filters.last().copied())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MvfConfig {
    /// Point columns after the batch id (x, y, z and extra features).
    pub num_input_features: usize,
    /// Pillar grid over `(x, y, z)`; its range is also the outer filter.
    pub pillar: GridSpecConfig,
    /// Cylinder grid over `(angle_deg, z, radius)`.
    pub cylinder: GridSpecConfig,
    pub view: ViewConfig,
    /// Width of the fused output.
    pub out_channels: usize,
    pub norm_stats: NormStats,
    /// Seed for randomly initialized weights.
    pub seed: u64,
}

impl Default for MvfConfig {
    fn default() -> Self {
        Self {
            num_input_features: 5,
            pillar: GridSpecConfig {
                range: [-54.0, -54.0, -5.0, 54.0, 54.0, 3.0],
                cell_size: [0.075, 0.075, 0.2],
            },
            cylinder: GridSpecConfig {
                range: [-180.0, -5.0, 0.0, 180.0, 3.0, 76.4],
                cell_size: [1.0, 0.1, 76.4],
            },
            view: ViewConfig::default(),
            out_channels: 128,
            norm_stats: NormStats::Batch,
            seed: 0,
        }
    }
}

/// Checked configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub config: MvfConfig,
    pub pillar: GridSpec,
    pub cylinder: GridSpec,
}

impl MvfConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parsing fuser config")
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing fuser config")
    }

    pub fn validate(&self) -> Result<ValidatedConfig> {
        let pillar = self.pillar.to_spec().context("pillar grid")?;
        let cylinder = self.cylinder.to_spec().context("cylinder grid")?;

        ensure!(
            self.num_input_features >= 3,
            "points need at least x, y, z after the batch id, got {} columns",
            self.num_input_features
        );
        ensure!(!self.view.num_filters.is_empty(), "PFN filter list is empty");
        if let Some(odd) = self.view.num_filters[..self.view.num_filters.len() - 1]
            .iter()
            .find(|&&f| f % 2 != 0)
        {
            anyhow::bail!("non-final PFN width {odd} is odd");
        }
        ensure!(
            self.view.ds_layer_strides.len() == self.view.ds_num_filters.len(),
            "{} backbone strides for {} backbone widths",
            self.view.ds_layer_strides.len(),
            self.view.ds_num_filters.len()
        );
        ensure!(
            !self.view.ds_layer_strides.contains(&0),
            "backbone strides must be positive"
        );
        ensure!(self.out_channels > 0, "output width must be positive");

        FeatureDecorator::new(ViewKind::ClampedPillar, pillar).context("pillar grid")?;
        FeatureDecorator::new(ViewKind::Cylinder, cylinder).context("cylinder grid")?;

        let rate = self.view.ds_rate();
        for (name, spec) in [("pillar", &pillar), ("cylinder", &cylinder)] {
            let e = spec.extent();
            ensure!(
                e[0] >= rate && e[1] >= rate,
                "{name} grid {}x{} is smaller than the downsampling rate {rate}",
                e[0],
                e[1]
            );
        }

        Ok(ValidatedConfig {
            config: self.clone(),
            pillar,
            cylinder,
        })
    }
}
