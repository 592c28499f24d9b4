//! Grouped reduction of per-point features into per-cell features.
//!
//! Every cell owns a contiguous run of point indices in [`CellIndex`], so
//! each output row is produced by exactly one task and no atomics are
//! needed. Cells are never empty, which is why the mean needs no guard.

use rayon::prelude::*;

use crate::dedup::CellIndex;
use crate::error::{MvfError, Result};
use crate::features::Features;

/// Per-cell combine applied independently to each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceMode {
    Mean,
    Max,
}

fn check_rows(features: &Features, cells: &CellIndex) -> Result<()> {
    if features.len() != cells.num_points() {
        return Err(MvfError::ShapeMismatch(format!(
            "{} feature rows for {} indexed points",
            features.len(),
            cells.num_points()
        )));
    }
    Ok(())
}

/// Reduce point rows into one row per cell.
pub fn scatter_reduce(features: &Features, cells: &CellIndex, mode: ReduceMode) -> Result<Features> {
    check_rows(features, cells)?;
    let channels = features.channels();
    let mut out = Features::zeros(cells.num_cells(), channels);

    match mode {
        ReduceMode::Mean => {
            // f64 accumulation avoids precision loss on large cells
            out.as_mut_slice()
                .par_chunks_mut(channels)
                .enumerate()
                .for_each_init(
                    || vec![0.0f64; channels],
                    |sums, (cell, row)| {
                        sums.iter_mut().for_each(|s| *s = 0.0);
                        let members = cells.members(cell);
                        for &p in members {
                            for (s, &v) in sums.iter_mut().zip(features.row(p as usize)) {
                                *s += v as f64;
                            }
                        }
                        let n = members.len() as f64;
                        for (o, s) in row.iter_mut().zip(sums.iter()) {
                            *o = (s / n) as f32;
                        }
                    },
                );
        }
        ReduceMode::Max => {
            out.as_mut_slice()
                .par_chunks_mut(channels)
                .enumerate()
                .for_each(|(cell, row)| {
                    row.fill(f32::NEG_INFINITY);
                    for &p in cells.members(cell) {
                        for (o, &v) in row.iter_mut().zip(features.row(p as usize)) {
                            *o = o.max(v);
                        }
                    }
                });
        }
    }

    Ok(out)
}

pub fn scatter_mean(features: &Features, cells: &CellIndex) -> Result<Features> {
    scatter_reduce(features, cells, ReduceMode::Mean)
}

pub fn scatter_max(features: &Features, cells: &CellIndex) -> Result<Features> {
    scatter_reduce(features, cells, ReduceMode::Max)
}

/// Copy each cell row back to every point of that cell.
pub fn broadcast(reduced: &Features, cells: &CellIndex) -> Result<Features> {
    if reduced.len() != cells.num_cells() {
        return Err(MvfError::ShapeMismatch(format!(
            "{} reduced rows for {} cells",
            reduced.len(),
            cells.num_cells()
        )));
    }

    let channels = reduced.channels();
    let mut out = Features::zeros(cells.num_points(), channels);
    out.as_mut_slice()
        .par_chunks_mut(channels)
        .zip(cells.inverse().par_iter())
        .for_each(|(row, &cell)| row.copy_from_slice(reduced.row(cell as usize)));
    Ok(out)
}
