//! Per-point layers and the encoders built from them.
//!
//! Parameters are read-only during a forward pass. Layers are built either
//! from externally supplied weights or from a seeded RNG.

pub mod feature_net;
pub mod linear;
pub mod norm;
pub mod pfn;
pub mod point_net;

pub use feature_net::{PillarFeatureNet, VoxelCells, VoxelFeatureNet};
pub use linear::Linear;
pub use norm::{BatchNorm1d, NormStats, BATCH_NORM_EPS};
pub use pfn::{PfnLayer, PfnStack};
pub use point_net::PointNet;

use rayon::prelude::*;

use crate::features::Features;

/// In-place `max(x, 0)`.
pub fn relu(x: &mut Features) {
    x.as_mut_slice().par_iter_mut().for_each(|v| *v = v.max(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let mut x = Features::from_rows(&[[-1.0, 0.0, 2.5]]).unwrap();
        relu(&mut x);
        assert_eq!(x.row(0), &[0.0, 0.0, 2.5]);
    }
}
