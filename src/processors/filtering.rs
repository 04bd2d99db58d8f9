//! Range-based rejection of scan points.
//!
//! Near returns are usually the sensor housing or the ego vehicle; far returns
//! are sparse and inaccurate. Both are dropped before downsampling.

use nalgebra::{Isometry3, Vector4};

use crate::core::frame::PointSet;
use crate::core::transforms::Calibration;

/// Inclusive range band applied after the calibration transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeFilter {
    calibration: Calibration,
    near: f64,
    far: f64,
}

impl RangeFilter {
    /// Create a filter keeping points whose calibrated range is in `[near, far]`.
    pub fn new(t_lidar_offset: &Isometry3<f64>, near: f64, far: f64) -> Self {
        Self {
            calibration: Calibration::new(t_lidar_offset),
            near,
            far,
        }
    }

    /// Calibrated range of a homogeneous point.
    #[inline]
    pub fn range(&self, point: &Vector4<f64>) -> f64 {
        self.calibration.range(point)
    }

    /// True if `point` lies inside the accepted band.
    ///
    /// Non-finite ranges are always rejected.
    #[inline]
    pub fn accepts(&self, point: &Vector4<f64>) -> bool {
        let r = self.range(point);
        r.is_finite() && self.near <= r && r <= self.far
    }

    /// Drop every point outside the band, keeping survivor order.
    ///
    /// Points stay in the sensor frame; the calibration only decides which
    /// points survive.
    pub fn apply(&self, set: PointSet) -> PointSet {
        if set.points.iter().all(|p| self.accepts(p)) {
            return set;
        }

        let mut filtered = PointSet::with_capacity(set.len());
        for (t, p) in set.iter() {
            if self.accepts(p) {
                filtered.push(t, *p);
            }
        }
        filtered
    }
}

/// Convenience wrapper around [`RangeFilter::apply`].
pub fn distance_filter(
    set: PointSet,
    t_lidar_offset: &Isometry3<f64>,
    near: f64,
    far: f64,
) -> PointSet {
    RangeFilter::new(t_lidar_offset, near, far).apply(set)
}
