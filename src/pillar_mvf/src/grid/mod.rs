//! Grid geometry and point binning.
//!
//! A [`GridSpec`] fixes the range and cell size of one view. A
//! [`GridIndexer`] turns point positions into integer cell coordinates under
//! one of two [`BinningPolicy`] values:
//!
//! - `Discard`: rectangular pillar and voxel binning. Points outside
//!   `[0, extent)` on an active axis are removed.
//! - `Clamp`: cylinder binning and the clamped pillar variant. Every point
//!   is kept and snapped into the boundary cell.
//!
//! Cylinder views bin rows produced by [`to_cylindrical`], whose position
//! columns are `(angle_deg, z, radius)`.

pub mod cylinder;
pub mod indexer;
pub mod types;

pub use cylinder::{to_cylindrical, to_polar};
pub use indexer::{GridIndexer, IndexResult};
pub use types::{BinningPolicy, CellCoord, GridSpec};
