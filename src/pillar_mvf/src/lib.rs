//! Dynamic point cloud binning and multi-view feature fusion.
//!
//! This library turns batched point clouds into per-cell features on
//! pillar, voxel and cylinder grids, and fuses a pillar view with a
//! cylinder view into one bird's-eye-view grid.
//!
//! # Architecture
//!
//! The pipeline is split into stages:
//! - Stage 1: Range filtering and grid indexing of every point
//! - Stage 2: Cell deduplication (packed keys, radix sort, segments)
//! - Stage 3: Point decoration (cluster offset, cell-center offset)
//! - Stage 4: Scatter reduction and the PFN stack
//! - Stage 5: Multi-view fusion with bilinear resampling
//!
//! Every stage works on sorted segments, so reductions need no atomics and
//! results do not depend on thread scheduling.
//!
//! # Usage
//!
//! ```ignore
//! use pillar_mvf::{MultiViewFuser, PointBatch};
//!
//! // Rows are [batch_id, x, y, z, intensity, time]
//! let points = PointBatch::new(load_sweeps(), 6)?;
//!
//! let fuser = MultiViewFuser::builder()
//!     .num_input_features(5)
//!     .seed(42)
//!     .build()?;
//!
//! let output = fuser.forward(&points)?;
//! println!("grid {:?}, {} cells", output.grid.shape(), output.cells.len());
//! ```

pub mod backbone;
pub mod config;
pub mod decorate;
pub mod dedup;
pub mod dense;
pub mod error;
pub mod features;
pub mod fusion;
pub mod grid;
pub mod nn;
pub mod points;
pub mod scatter;
pub mod test_utils;
pub mod view;

pub use dedup::CellIndex;
pub use decorate::{Binned, Decorated, FeatureDecorator, ViewKind, DECORATION_CHANNELS};
pub use error::{MvfError, Result};
pub use features::Features;
pub use grid::{BinningPolicy, GridIndexer, GridSpec};
pub use nn::{
    BatchNorm1d, Linear, NormStats, PfnLayer, PfnStack, PillarFeatureNet, PointNet, VoxelCells,
    VoxelFeatureNet,
};
pub use points::{filter_points, FilterResult, PointBatch, RangeFilter};
pub use scatter::{broadcast, scatter_max, scatter_mean, scatter_reduce, ReduceMode};

// High-level API (recommended for most users)
pub use config::{GridSpecConfig, MvfConfig, ValidatedConfig, ViewConfig};
pub use fusion::{FusionOutput, MultiViewFuser, MultiViewFuserBuilder};

// Dense grids and the backbone seam
pub use backbone::{SparseBackbone, SparseCells, StridedDensify};
pub use dense::DenseGrid;
pub use view::{SingleView, ViewMode};
