//! Geometric helpers shared by the pipeline stages.
//!
//! Range computation under the calibration transform, voxel keys for spatial
//! binning, and squared distances used by the neighbor search.

use nalgebra::{Isometry3, Matrix4, Vector4};

/// Voxel coordinates of a point under a given resolution.
pub type VoxelKey = (i64, i64, i64);

/// Largest per-axis voxel index that is still an exact integer in `f64`.
///
/// Configuration rejects resolutions whose cells past the far threshold would
/// exceed it. Beyond this index neighboring cells start to share keys.
pub const MAX_VOXEL_INDEX: f64 = 4_503_599_627_370_496.0; // 2^52

/// Precomputed calibration transform for repeated range queries.
///
/// Holds the 4x4 homogeneous matrix of the sensor-to-reference isometry so
/// each point costs a single matrix-vector product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    matrix: Matrix4<f64>,
}

impl Calibration {
    pub fn new(t_lidar_offset: &Isometry3<f64>) -> Self {
        Self {
            matrix: t_lidar_offset.to_homogeneous(),
        }
    }

    /// Applies the transform to a homogeneous point.
    #[inline]
    pub fn apply(&self, point: &Vector4<f64>) -> Vector4<f64> {
        self.matrix * point
    }

    /// Euclidean norm of the transformed point's `xyz` part.
    ///
    /// Non-finite coordinates yield a non-finite range.
    #[inline]
    pub fn range(&self, point: &Vector4<f64>) -> f64 {
        self.apply(point).xyz().norm()
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(&Isometry3::identity())
    }
}

/// Voxel containing `point` for cells of edge `1 / inv_resolution`.
///
/// Uses `floor` so negative coordinates fall into the cell below zero rather
/// than sharing cell 0 with small positive ones. Indices past
/// [`MAX_VOXEL_INDEX`] lose precision and saturate at the `i64` limits, which
/// only happens with an unbounded far threshold.
#[inline]
pub fn voxel_key(point: &Vector4<f64>, inv_resolution: f64) -> VoxelKey {
    (
        (point.x * inv_resolution).floor() as i64,
        (point.y * inv_resolution).floor() as i64,
        (point.z * inv_resolution).floor() as i64,
    )
}

/// `[x, y, z]` coordinates of homogeneous points, as the KD-tree stores them.
pub fn to_coords(points: &[Vector4<f64>]) -> Vec<[f64; 3]> {
    points.iter().map(|p| [p.x, p.y, p.z]).collect()
}

/// Squared Euclidean distance between two `[x, y, z]` coordinates.
///
/// Summed axis by axis in the same order as `kiddo::SquaredEuclidean` so that
/// distances recomputed here compare exactly against tree query results.
#[inline]
pub fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    #[test]
    fn test_identity_range() {
        let calib = Calibration::default();
        let p = Vector4::new(3.0, 4.0, 0.0, 1.0);
        assert_relative_eq!(calib.range(&p), 5.0);
    }

    #[test]
    fn test_range_uses_translation() {
        let iso = Isometry3::from_parts(
            Translation3::new(-3.0, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let calib = Calibration::new(&iso);
        let p = Vector4::new(3.0, 4.0, 0.0, 1.0);
        assert_relative_eq!(calib.range(&p), 4.0);
    }

    #[test]
    fn test_rotation_preserves_range() {
        let iso = Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7),
        );
        let calib = Calibration::new(&iso);
        let p = Vector4::new(1.0, 2.0, 2.0, 1.0);
        assert_relative_eq!(calib.range(&p), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_range() {
        let calib = Calibration::default();
        let p = Vector4::new(f64::NAN, 0.0, 0.0, 1.0);
        assert!(!calib.range(&p).is_finite());
    }

    #[test]
    fn test_voxel_key_floors_negative() {
        let inv = 1.0 / 0.5;
        assert_eq!(voxel_key(&Vector4::new(0.1, 0.6, -0.1, 1.0), inv), (0, 1, -1));
        assert_eq!(voxel_key(&Vector4::new(-0.5, -0.51, 1.0, 1.0), inv), (-1, -2, 2));
    }

    #[test]
    fn test_keys_stay_distinct_up_to_max_index() {
        // 16384 * 2^38 == 2^52
        let inv = MAX_VOXEL_INDEX / 16384.0;
        let a = voxel_key(&Vector4::new(8192.0, 0.0, 0.0, 1.0), inv);
        let b = voxel_key(&Vector4::new(16384.0, 0.0, 0.0, 1.0), inv);
        let c = voxel_key(&Vector4::new(-16384.0, 0.0, 0.0, 1.0), inv);
        assert_ne!(a, b);
        assert_eq!(b.0, MAX_VOXEL_INDEX as i64);
        assert_eq!(c.0, -(MAX_VOXEL_INDEX as i64));
    }

    #[test]
    fn test_to_coords() {
        let points = vec![Vector4::new(1.0, 2.0, 3.0, 1.0), Vector4::new(-4.0, 0.5, 0.0, 1.0)];
        assert_eq!(to_coords(&points), vec![[1.0, 2.0, 3.0], [-4.0, 0.5, 0.0]]);
    }

    #[test]
    fn test_squared_distance() {
        assert_eq!(squared_distance(&[0.0, 0.0, 0.0], &[1.0, 2.0, 2.0]), 9.0);
    }
}
