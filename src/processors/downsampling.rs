//! Spatial binning downsamplers.
//!
//! Both strategies partition space into cubic voxels of edge `resolution`:
//!
//! - [`voxelgrid_sampling`] keeps the first-seen point of each occupied voxel.
//!   Deterministic, bounds density at one point per voxel, but aliases when
//!   scan structure lines up with voxel faces.
//! - [`randomgrid_sampling`] keeps a random subset of each voxel sized so that
//!   roughly `rate * n` points survive overall. Less aliasing and better
//!   preserved density ratios, reproducible only for a fixed generator state.
//!
//! Both keep surviving points in input order, so a time-sorted input stays
//! time-sorted.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector4;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::DownsampleMode;
use crate::core::frame::PointSet;
use crate::core::transforms::{voxel_key, VoxelKey};

/// Rates at or above this keep every point without touching the generator.
pub const KEEP_ALL_RATE: f64 = 0.99;

/// Group point indices by voxel, voxels in first-seen order.
///
/// Indices inside each voxel are ascending. The first-seen ordering makes any
/// per-voxel random draw consume the generator in a reproducible order.
pub fn bin_points(points: &[Vector4<f64>], resolution: f64) -> Vec<Vec<usize>> {
    debug_assert!(resolution > 0.0, "resolution must be positive");
    let inv_resolution = 1.0 / resolution;

    let mut slots: HashMap<VoxelKey, usize> = HashMap::with_capacity(points.len());
    let mut voxels: Vec<Vec<usize>> = Vec::new();

    for (i, p) in points.iter().enumerate() {
        let key = voxel_key(p, inv_resolution);
        let slot = *slots.entry(key).or_insert_with(|| {
            voxels.push(Vec::new());
            voxels.len() - 1
        });
        voxels[slot].push(i);
    }

    voxels
}

/// Keep the first-seen point of every occupied voxel.
///
/// Running it again on its own output at the same resolution is a no-op,
/// since every survivor already sits alone in its voxel.
pub fn voxelgrid_sampling(set: PointSet, resolution: f64) -> PointSet {
    debug_assert!(resolution > 0.0, "resolution must be positive");
    if set.is_empty() {
        return set;
    }

    let inv_resolution = 1.0 / resolution;
    let mut occupied: HashSet<VoxelKey> = HashSet::with_capacity(set.len());
    let kept: Vec<usize> = set
        .points
        .iter()
        .enumerate()
        .filter(|(_, p)| occupied.insert(voxel_key(p, inv_resolution)))
        .map(|(i, _)| i)
        .collect();

    if kept.len() == set.len() {
        return set;
    }
    set.select(&kept)
}

/// Keep a random subset of every occupied voxel.
///
/// Each voxel keeps at most `ceil(rate * n / voxels)` points, drawn uniformly
/// without replacement; smaller voxels are kept whole. With
/// `rate >= KEEP_ALL_RATE` the input is returned unchanged and `rng` is not
/// advanced.
pub fn randomgrid_sampling<R: Rng + ?Sized>(
    set: PointSet,
    resolution: f64,
    rate: f64,
    rng: &mut R,
) -> PointSet {
    if set.is_empty() || rate >= KEEP_ALL_RATE {
        return set;
    }

    let voxels = bin_points(&set.points, resolution);
    let quota = ((rate * set.len() as f64) / voxels.len() as f64).ceil() as usize;
    let quota = quota.max(1);

    let mut kept = Vec::with_capacity((quota * voxels.len()).min(set.len()));
    for mut voxel in voxels {
        if voxel.len() <= quota {
            kept.extend_from_slice(&voxel);
        } else {
            let (chosen, _) = voxel.partial_shuffle(rng, quota);
            kept.extend_from_slice(chosen);
        }
    }

    // Restore input order
    kept.sort_unstable();
    set.select(&kept)
}

/// Dispatch to the downsampler selected by `mode`.
///
/// `rng` is only consulted by [`DownsampleMode::RandomGrid`].
pub fn downsample<R: Rng + ?Sized>(
    set: PointSet,
    mode: DownsampleMode,
    resolution: f64,
    rate: f64,
    rng: &mut R,
) -> PointSet {
    match mode {
        DownsampleMode::VoxelGrid => voxelgrid_sampling(set, resolution),
        DownsampleMode::RandomGrid => randomgrid_sampling(set, resolution, rate, rng),
    }
}
