//! The scan preprocessor: sort, range filter, downsample, neighbor search.
//!
//! # Example
//!
//! ```
//! use nalgebra::Vector4;
//! use scan_preprocess::{CloudPreprocessor, PreprocessorParams};
//!
//! let params = PreprocessorParams {
//!     distance_near_thresh: 0.5,
//!     downsample_resolution: 0.1,
//!     k_correspondences: 2,
//!     ..Default::default()
//! };
//! let mut preprocessor = CloudPreprocessor::new(params).unwrap();
//!
//! let times = vec![0.02, 0.0, 0.01];
//! let points = vec![
//!     Vector4::new(3.0, 0.0, 0.0, 1.0),
//!     Vector4::new(1.0, 0.0, 0.0, 1.0),
//!     Vector4::new(2.0, 0.0, 0.0, 1.0),
//! ];
//! let frame = preprocessor.preprocess(100.0, &times, &points).unwrap();
//! assert_eq!(frame.times, vec![0.0, 0.01, 0.02]);
//! assert_eq!(frame.neighbors[0], vec![1, 2]);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use nalgebra::Vector4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::ThreadPool;
use thiserror::Error;

use crate::config::{ConfigError, PreprocessorConfig, PreprocessorParams, DEFAULT_SEED};
use crate::core::frame::{PointSet, PreprocessedFrame, RawScan};
use crate::processors::{downsampling, filtering::RangeFilter, neighbors, sorting};

/// Errors that abort a preprocessing call.
///
/// Empty output is never an error; it comes back as an empty frame.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("times and points differ in length: {times} times, {points} points")]
    LengthMismatch { times: usize, points: usize },
}

/// Point counts after each stage of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreprocessStats {
    pub input: usize,
    pub filtered: usize,
    pub downsampled: usize,
    /// Wall-clock time spent in the call
    pub elapsed: Duration,
}

impl PreprocessStats {
    /// Fraction of input points that survived to the output.
    pub fn retention(&self) -> f64 {
        if self.input == 0 {
            0.0
        } else {
            self.downsampled as f64 / self.input as f64
        }
    }
}

/// Runs the preprocessing pipeline over raw scans.
///
/// Owns a copy of its parameters and a seeded generator for random grid
/// downsampling. [`preprocess`](Self::preprocess) takes `&mut self` because it
/// advances that generator; to share one instance across threads use
/// [`preprocess_with_rng`](Self::preprocess_with_rng) with a generator per
/// thread, or give each thread its own instance via [`fork`](Self::fork).
pub struct CloudPreprocessor {
    params: PreprocessorParams,
    range_filter: RangeFilter,
    rng: StdRng,
    pool: Option<Arc<ThreadPool>>,
}

impl CloudPreprocessor {
    /// Create a preprocessor seeded with [`DEFAULT_SEED`].
    pub fn new(params: PreprocessorParams) -> Result<Self, ConfigError> {
        Self::with_seed(params, DEFAULT_SEED)
    }

    /// Create a preprocessor with an explicit generator seed.
    pub fn with_seed(params: PreprocessorParams, seed: u64) -> Result<Self, ConfigError> {
        params.validate()?;
        let range_filter = RangeFilter::new(
            &params.t_lidar_offset,
            params.distance_near_thresh,
            params.distance_far_thresh,
        );
        Ok(Self {
            params,
            range_filter,
            rng: StdRng::seed_from_u64(seed),
            pool: None,
        })
    }

    /// Create a preprocessor from an on-disk configuration.
    ///
    /// `num_threads > 1` gives the neighbor search its own rayon pool.
    pub fn from_config(config: &PreprocessorConfig) -> Result<Self, ConfigError> {
        let mut preprocessor = Self::with_seed(config.params()?, config.seed)?;
        if config.num_threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .thread_name(|i| format!("scan-neighbors-{i}"))
                .build()
                .map_err(|e| ConfigError::ThreadPool(e.to_string()))?;
            preprocessor.pool = Some(Arc::new(pool));
        }
        Ok(preprocessor)
    }

    /// Get the parameter set.
    pub fn params(&self) -> &PreprocessorParams {
        &self.params
    }

    /// Derive an independent preprocessor for another thread.
    ///
    /// The child's seed is drawn from this instance's generator, so a fixed
    /// parent seed and fork order give reproducible children. Forking advances
    /// the parent generator by one draw. The neighbor thread pool is shared.
    pub fn fork(&mut self) -> Self {
        let seed: u64 = self.rng.gen();
        Self {
            params: self.params.clone(),
            range_filter: self.range_filter,
            rng: StdRng::seed_from_u64(seed),
            pool: self.pool.clone(),
        }
    }

    /// Preprocess a raw scan.
    ///
    /// # Arguments
    ///
    /// * `stamp` - Absolute scan timestamp
    /// * `times` - Per-point time offsets relative to `stamp`
    /// * `points` - Homogeneous points, index-aligned with `times`
    ///
    /// # Errors
    ///
    /// Returns [`PreprocessError::LengthMismatch`] if `times` and `points`
    /// differ in length. Nothing is computed and the generator is untouched.
    pub fn preprocess(
        &mut self,
        stamp: f64,
        times: &[f64],
        points: &[Vector4<f64>],
    ) -> Result<PreprocessedFrame, PreprocessError> {
        self.preprocess_with_stats(stamp, times, points).map(|(frame, _)| frame)
    }

    /// Preprocess a [`RawScan`].
    pub fn preprocess_scan(&mut self, scan: &RawScan) -> Result<PreprocessedFrame, PreprocessError> {
        self.preprocess(scan.stamp, &scan.times, &scan.points)
    }

    /// Like [`preprocess`](Self::preprocess), also returning stage counts.
    pub fn preprocess_with_stats(
        &mut self,
        stamp: f64,
        times: &[f64],
        points: &[Vector4<f64>],
    ) -> Result<(PreprocessedFrame, PreprocessStats), PreprocessError> {
        let Self {
            params,
            range_filter,
            rng,
            pool,
        } = self;
        run_pipeline(params, range_filter, pool.as_deref(), stamp, times, points, rng)
    }

    /// Preprocess using a caller-owned generator.
    ///
    /// Takes `&self`, so one instance can serve several threads as long as
    /// each supplies its own `rng`. The generator is only advanced under
    /// random grid downsampling.
    pub fn preprocess_with_rng<R: Rng + ?Sized>(
        &self,
        stamp: f64,
        times: &[f64],
        points: &[Vector4<f64>],
        rng: &mut R,
    ) -> Result<PreprocessedFrame, PreprocessError> {
        run_pipeline(
            &self.params,
            &self.range_filter,
            self.pool.as_deref(),
            stamp,
            times,
            points,
            rng,
        )
        .map(|(frame, _)| frame)
    }
}

fn run_pipeline<R: Rng + ?Sized>(
    params: &PreprocessorParams,
    range_filter: &RangeFilter,
    pool: Option<&ThreadPool>,
    stamp: f64,
    times: &[f64],
    points: &[Vector4<f64>],
    rng: &mut R,
) -> Result<(PreprocessedFrame, PreprocessStats), PreprocessError> {
    if times.len() != points.len() {
        return Err(PreprocessError::LengthMismatch {
            times: times.len(),
            points: points.len(),
        });
    }

    let start = Instant::now();
    let input = points.len();

    let sorted = sorting::sort_by_time(PointSet::from_slices(times, points));
    let filtered = range_filter.apply(sorted);
    let filtered_count = filtered.len();

    let downsampled = downsampling::downsample(
        filtered,
        params.downsample_mode,
        params.downsample_resolution,
        params.downsample_rate,
        rng,
    );
    let downsampled_count = downsampled.len();

    let k = params.k_correspondences;
    let neighbor_table = match pool {
        Some(pool) => pool.install(|| neighbors::par_find_neighbors(&downsampled.points, k)),
        None => neighbors::find_neighbors(&downsampled.points, k),
    };

    let stats = PreprocessStats {
        input,
        filtered: filtered_count,
        downsampled: downsampled_count,
        elapsed: start.elapsed(),
    };

    debug!(
        "scan {:.6}: {} points -> {} in range -> {} downsampled ({:?})",
        stamp, input, filtered_count, downsampled_count, params.downsample_mode
    );
    if downsampled_count == 0 && input > 0 {
        debug!("scan {:.6}: no points survived preprocessing", stamp);
    }
    trace!(
        "scan {:.6}: k={} retention={:.3} in {:.2?}",
        stamp,
        k,
        stats.retention(),
        stats.elapsed
    );

    let frame = PreprocessedFrame::new(stamp, downsampled, neighbor_table, k);
    Ok((frame, stats))
}
