//! Point containers threaded through the preprocessing pipeline.

use std::sync::Arc;

use nalgebra::Vector4;

/// Homogeneous points `(x, y, z, 1)` as produced by the sensor driver.
pub type Points = Vec<Vector4<f64>>;

/// Raw scan as delivered by a sensor driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScan {
    /// Absolute scan timestamp in seconds.
    pub stamp: f64,
    /// Per-point time offsets relative to `stamp`.
    pub times: Vec<f64>,
    /// Homogeneous points, index-aligned with `times`.
    pub points: Points,
}

impl RawScan {
    pub fn new(stamp: f64, times: Vec<f64>, points: Points) -> Self {
        Self {
            stamp,
            times,
            points,
        }
    }

    /// Returns the number of points in the scan.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Index-aligned points and times, the working representation of every stage.
///
/// Stages may reorder, drop or replace entries but always move a point and
/// its time together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    pub times: Vec<f64>,
    pub points: Points,
}

impl PointSet {
    /// Creates a point set from index-aligned parts.
    pub fn new(times: Vec<f64>, points: Points) -> Self {
        debug_assert_eq!(
            times.len(),
            points.len(),
            "times and points must have same length"
        );
        Self { times, points }
    }

    /// Creates a new empty point set with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            points: Vec::with_capacity(capacity),
        }
    }

    /// Copies `times` and `points` out of borrowed slices.
    pub fn from_slices(times: &[f64], points: &[Vector4<f64>]) -> Self {
        Self::new(times.to_vec(), points.to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Adds a point and its time.
    #[inline]
    pub fn push(&mut self, time: f64, point: Vector4<f64>) {
        self.times.push(time);
        self.points.push(point);
    }

    /// Gathers the entries at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut selected = Self::with_capacity(indices.len());
        for &i in indices {
            selected.push(self.times[i], self.points[i]);
        }
        selected
    }

    /// Iterates over `(time, point)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Vector4<f64>)> + '_ {
        self.times.iter().copied().zip(self.points.iter())
    }
}

/// Shared handle for callers that hand one frame to several consumers.
pub type SharedFrame = Arc<PreprocessedFrame>;

/// Result of preprocessing one scan.
///
/// `times`, `points` and `neighbors` always have the same length. Entry `i` of
/// `neighbors` lists indices into `points` of the nearest neighbors of
/// `points[i]`, closest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessedFrame {
    /// Absolute scan timestamp in seconds.
    pub stamp: f64,
    /// Per-point time offsets, non-decreasing.
    pub times: Vec<f64>,
    pub points: Points,
    pub neighbors: Vec<Vec<usize>>,
    /// Requested neighbor count; lists are shorter only when the frame has
    /// at most `k_neighbors` points.
    pub k_neighbors: usize,
}

impl PreprocessedFrame {
    /// Assembles a frame from the final point set and its neighbor table.
    pub fn new(stamp: f64, set: PointSet, neighbors: Vec<Vec<usize>>, k_neighbors: usize) -> Self {
        debug_assert_eq!(set.len(), neighbors.len());
        Self {
            stamp,
            times: set.times,
            points: set.points,
            neighbors,
            k_neighbors,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Neighbor indices of point `i`.
    #[inline]
    pub fn neighbors_of(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Time span between the first and last surviving point.
    pub fn duration(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Absolute timestamp of point `i`.
    #[inline]
    pub fn point_stamp(&self, i: usize) -> f64 {
        self.stamp + self.times[i]
    }

    /// Moves the frame behind an `Arc` for shared ownership.
    pub fn into_shared(self) -> SharedFrame {
        Arc::new(self)
    }
}
