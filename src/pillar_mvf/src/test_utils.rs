//! Synthetic point clouds for tests and demos.
//!
//! Scenes are a noisy ground plane plus a few compact object clusters,
//! roughly what a lidar sweep looks like after ego-motion compensation.
//! All generators are seeded so results are reproducible.

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::error::Result;
use crate::grid::GridSpec;
use crate::points::PointBatch;

/// Half-width of the area scenes are drawn from, in meters.
pub const SCENE_HALF_WIDTH: f32 = 9.0;

/// Pillar grid covering ±8 m at 0.5 m, a single z slab over [-3, 3).
pub fn small_pillar_spec() -> Result<GridSpec> {
    GridSpec::new([-8.0, -8.0, -3.0], [8.0, 8.0, 3.0], [0.5, 0.5, 6.0])
}

/// Cylinder grid with 10° angle cells and 0.25 m height cells.
pub fn small_cylinder_spec() -> Result<GridSpec> {
    GridSpec::new([-180.0, -3.0, 0.0], [180.0, 3.0, 12.0], [10.0, 0.25, 12.0])
}

/// Generate one scene with `points_per_batch` rows per batch id.
///
/// Rows are `[batch_id, x, y, z, intensity]`. Roughly a tenth of the
/// points lie outside [`small_pillar_spec`] on x or y so range handling is
/// exercised.
pub fn make_scene(num_batches: usize, points_per_batch: usize, seed: u64) -> PointBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = |std: f32, rng: &mut StdRng| std * rng.sample::<f32, _>(StandardNormal);

    let mut data = Vec::with_capacity(num_batches * points_per_batch * 5);
    for b in 0..num_batches {
        let centers: Vec<[f32; 3]> = (0..4)
            .map(|_| {
                [
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-1.0..1.0),
                ]
            })
            .collect();

        for i in 0..points_per_batch {
            let (x, y, z) = if i % 3 == 0 {
                let c = centers[rng.gen_range(0..centers.len())];
                (
                    c[0] + noise(0.3, &mut rng),
                    c[1] + noise(0.3, &mut rng),
                    c[2] + noise(0.3, &mut rng),
                )
            } else {
                (
                    rng.gen_range(-SCENE_HALF_WIDTH..SCENE_HALF_WIDTH),
                    rng.gen_range(-SCENE_HALF_WIDTH..SCENE_HALF_WIDTH),
                    -1.5 + noise(0.05, &mut rng),
                )
            };
            let intensity = rng.gen_range(0.0..1.0);
            data.extend_from_slice(&[b as f32, x, y, z, intensity]);
        }
    }

    PointBatch::from_validated(data, 5)
}

/// Uniform random values in `[-1, 1)`, `rows × channels`, row-major.
pub fn random_values(rows: usize, channels: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * channels).map(|_| rng.gen_range(-1.0..1.0)).collect()
}
