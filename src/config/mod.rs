//! Configuration types for the scan preprocessor.
//!
//! [`PreprocessorConfig`] is the serde/YAML representation that the CLI and
//! other callers load from disk. [`PreprocessorParams`] is the validated,
//! in-memory parameter set a [`CloudPreprocessor`](crate::CloudPreprocessor)
//! copies at construction and reads for the rest of its lifetime.

use std::path::Path;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::transforms::MAX_VOXEL_INDEX;

/// Seed used when none is configured (the classic Mersenne Twister default).
pub const DEFAULT_SEED: u64 = 5489;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("downsample_resolution must be positive, got {0}")]
    NonPositiveResolution(f64),

    #[error("distance_near_thresh must be non-negative, got {0}")]
    NegativeNearThreshold(f64),

    #[error("distance_far_thresh must be positive, got {0}")]
    NonPositiveFarThreshold(f64),

    #[error("distance_near_thresh ({near}) must be below distance_far_thresh ({far})")]
    InvertedRange { near: f64, far: f64 },

    #[error(
        "downsample_resolution {resolution} is too fine for points up to {extent} from the \
         sensor; voxel indices would exceed 2^52"
    )]
    ResolutionTooFine { resolution: f64, extent: f64 },

    #[error("downsample_rate must lie in (0, 1] for random grid downsampling, got {0}")]
    RateOutOfRange(f64),

    #[error("T_lidar_offset contains non-finite values")]
    NonFiniteCalibration,

    #[error("T_lidar_offset rotation quaternion has zero norm")]
    DegenerateRotation,

    #[error("failed to build neighbor search thread pool: {0}")]
    ThreadPool(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Spatial binning strategy used by the downsampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownsampleMode {
    /// Keep the first-seen point of every occupied voxel.
    #[default]
    VoxelGrid,
    /// Keep a random subset of every occupied voxel, governed by `downsample_rate`.
    RandomGrid,
}

impl DownsampleMode {
    /// Maps the legacy `use_random_grid_downsampling` flag onto a mode.
    pub fn from_random_flag(use_random_grid_downsampling: bool) -> Self {
        if use_random_grid_downsampling {
            Self::RandomGrid
        } else {
            Self::VoxelGrid
        }
    }

    #[inline]
    pub fn is_random(self) -> bool {
        matches!(self, Self::RandomGrid)
    }
}

/// Rigid sensor-to-reference transform as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Translation `[x, y, z]` in meters
    #[serde(default)]
    pub translation: [f64; 3],

    /// Rotation quaternion `[qx, qy, qz, qw]`
    #[serde(default = "default_rotation")]
    pub rotation: [f64; 4],
}

fn default_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: default_rotation(),
        }
    }
}

impl CalibrationConfig {
    /// Convert to an isometry, normalizing the quaternion.
    pub fn to_isometry(&self) -> Result<Isometry3<f64>, ConfigError> {
        if !self
            .translation
            .iter()
            .chain(self.rotation.iter())
            .all(|v| v.is_finite())
        {
            return Err(ConfigError::NonFiniteCalibration);
        }

        let [qx, qy, qz, qw] = self.rotation;
        let quaternion = Quaternion::new(qw, qx, qy, qz);
        if quaternion.norm() <= f64::EPSILON {
            return Err(ConfigError::DegenerateRotation);
        }

        let [x, y, z] = self.translation;
        Ok(Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_quaternion(quaternion),
        ))
    }

    /// Inverse of [`to_isometry`](Self::to_isometry).
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let t = iso.translation.vector;
        let q = iso.rotation.quaternion();
        Self {
            translation: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

/// Validated parameter set consumed by the preprocessing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorParams {
    /// Sensor frame to reference frame transform applied before the range test
    pub t_lidar_offset: Isometry3<f64>,
    pub downsample_mode: DownsampleMode,
    /// Minimum accepted range (inclusive)
    pub distance_near_thresh: f64,
    /// Maximum accepted range (inclusive)
    pub distance_far_thresh: f64,
    /// Voxel edge length shared by both downsampling modes
    pub downsample_resolution: f64,
    /// Fraction of points retained by random grid downsampling
    pub downsample_rate: f64,
    /// Number of neighbors per point; zero disables the neighbor search
    pub k_correspondences: usize,
}

impl Default for PreprocessorParams {
    fn default() -> Self {
        Self {
            t_lidar_offset: Isometry3::identity(),
            downsample_mode: DownsampleMode::VoxelGrid,
            distance_near_thresh: default_distance_near_thresh(),
            distance_far_thresh: default_distance_far_thresh(),
            downsample_resolution: default_downsample_resolution(),
            downsample_rate: default_downsample_rate(),
            k_correspondences: default_k_correspondences(),
        }
    }
}

impl PreprocessorParams {
    /// Reject values for which the pipeline stages are ill-defined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.t_lidar_offset.translation.vector;
        let q = self.t_lidar_offset.rotation.quaternion().coords;
        if !t.iter().chain(q.iter()).all(|v| v.is_finite()) {
            return Err(ConfigError::NonFiniteCalibration);
        }

        // Negated comparisons so that NaN fails every check.
        if !(self.downsample_resolution > 0.0) {
            return Err(ConfigError::NonPositiveResolution(self.downsample_resolution));
        }
        if !(self.distance_near_thresh >= 0.0) {
            return Err(ConfigError::NegativeNearThreshold(self.distance_near_thresh));
        }
        if !(self.distance_far_thresh > 0.0) {
            return Err(ConfigError::NonPositiveFarThreshold(self.distance_far_thresh));
        }
        if self.distance_near_thresh >= self.distance_far_thresh {
            return Err(ConfigError::InvertedRange {
                near: self.distance_near_thresh,
                far: self.distance_far_thresh,
            });
        }

        // Survivors satisfy |p| <= far + |t|, so this bounds every voxel index.
        // An infinite far threshold leaves coordinates unbounded.
        let extent = self.distance_far_thresh + t.norm();
        if extent.is_finite() && extent / self.downsample_resolution > MAX_VOXEL_INDEX {
            return Err(ConfigError::ResolutionTooFine {
                resolution: self.downsample_resolution,
                extent,
            });
        }

        if self.downsample_mode.is_random()
            && !(self.downsample_rate > 0.0 && self.downsample_rate <= 1.0)
        {
            return Err(ConfigError::RateOutOfRange(self.downsample_rate));
        }

        Ok(())
    }
}

fn default_distance_near_thresh() -> f64 {
    1.0
}

fn default_distance_far_thresh() -> f64 {
    100.0
}

fn default_downsample_resolution() -> f64 {
    0.15
}

fn default_downsample_rate() -> f64 {
    0.3
}

fn default_k_correspondences() -> usize {
    10
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_num_threads() -> usize {
    1
}

/// On-disk preprocessor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Sensor-to-reference calibration
    #[serde(default, rename = "T_lidar_offset")]
    pub t_lidar_offset: CalibrationConfig,

    /// Downsampling strategy (`voxel_grid` or `random_grid`)
    #[serde(default)]
    pub downsample_mode: DownsampleMode,

    #[serde(default = "default_distance_near_thresh")]
    pub distance_near_thresh: f64,

    #[serde(default = "default_distance_far_thresh")]
    pub distance_far_thresh: f64,

    #[serde(default = "default_downsample_resolution")]
    pub downsample_resolution: f64,

    #[serde(default = "default_downsample_rate")]
    pub downsample_rate: f64,

    #[serde(default = "default_k_correspondences")]
    pub k_correspondences: usize,

    /// Seed of the random grid generator
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Worker threads for the neighbor search (1 = run on the calling thread)
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            t_lidar_offset: CalibrationConfig::default(),
            downsample_mode: DownsampleMode::default(),
            distance_near_thresh: default_distance_near_thresh(),
            distance_far_thresh: default_distance_far_thresh(),
            downsample_resolution: default_downsample_resolution(),
            downsample_rate: default_downsample_rate(),
            k_correspondences: default_k_correspondences(),
            seed: default_seed(),
            num_threads: default_num_threads(),
        }
    }
}

impl PreprocessorConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PreprocessorConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build and validate the parameter set described by this config.
    pub fn params(&self) -> Result<PreprocessorParams, ConfigError> {
        let params = PreprocessorParams {
            t_lidar_offset: self.t_lidar_offset.to_isometry()?,
            downsample_mode: self.downsample_mode,
            distance_near_thresh: self.distance_near_thresh,
            distance_far_thresh: self.distance_far_thresh,
            downsample_resolution: self.downsample_resolution,
            downsample_rate: self.downsample_rate,
            k_correspondences: self.k_correspondences,
        };
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_default_config() {
        let config = PreprocessorConfig::default();
        assert_eq!(config.downsample_mode, DownsampleMode::VoxelGrid);
        assert_eq!(config.k_correspondences, 10);
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.num_threads, 1);
        assert!(config.params().is_ok());
    }

    #[test]
    fn test_default_params_match_default_config() {
        let params = PreprocessorConfig::default().params().unwrap();
        assert_eq!(params, PreprocessorParams::default());
    }

    #[test]
    fn test_rejects_non_positive_resolution() {
        for resolution in [0.0, -0.5, f64::NAN] {
            let params = PreprocessorParams {
                downsample_resolution: resolution,
                ..Default::default()
            };
            assert!(matches!(
                params.validate(),
                Err(ConfigError::NonPositiveResolution(_))
            ));
        }
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let params = PreprocessorParams {
            distance_near_thresh: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NegativeNearThreshold(_))
        ));

        let params = PreprocessorParams {
            distance_near_thresh: 0.0,
            distance_far_thresh: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NonPositiveFarThreshold(_))
        ));

        let params = PreprocessorParams {
            distance_near_thresh: 5.0,
            distance_far_thresh: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_rate_checked_only_for_random_grid() {
        let voxel = PreprocessorParams {
            downsample_rate: 0.0,
            ..Default::default()
        };
        assert!(voxel.validate().is_ok());

        let random = PreprocessorParams {
            downsample_mode: DownsampleMode::RandomGrid,
            downsample_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            random.validate(),
            Err(ConfigError::RateOutOfRange(_))
        ));

        let random = PreprocessorParams {
            downsample_mode: DownsampleMode::RandomGrid,
            downsample_rate: 1.0,
            ..Default::default()
        };
        assert!(random.validate().is_ok());
    }

    #[test]
    fn test_rejects_resolution_too_fine_for_far_threshold() {
        let params = PreprocessorParams {
            distance_far_thresh: 2e4,
            downsample_resolution: 1e-15,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::ResolutionTooFine { .. })
        ));

        // Translation widens the reachable extent
        let params = PreprocessorParams {
            t_lidar_offset: Isometry3::translation(1e3, 0.0, 0.0),
            distance_far_thresh: 100.0,
            downsample_resolution: 1001.0 / MAX_VOXEL_INDEX,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::ResolutionTooFine { .. })
        ));

        let fine = PreprocessorParams {
            downsample_resolution: 1e-6,
            ..Default::default()
        };
        assert!(fine.validate().is_ok());
    }

    #[test]
    fn test_infinite_far_threshold_is_allowed() {
        let params = PreprocessorParams {
            distance_far_thresh: f64::INFINITY,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_calibration_to_isometry() {
        // 90 degrees about z
        let half = std::f64::consts::FRAC_PI_4;
        let calib = CalibrationConfig {
            translation: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, half.sin(), half.cos()],
        };
        let iso = calib.to_isometry().unwrap();
        let p = iso * Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(p.coords, Vector3::new(1.0, 3.0, 3.0), epsilon = 1e-12);

        let back = CalibrationConfig::from_isometry(&iso);
        assert_relative_eq!(back.translation[0], 1.0);
        assert_relative_eq!(back.rotation[3], half.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_calibration_rejects_degenerate_rotation() {
        let calib = CalibrationConfig {
            translation: [0.0; 3],
            rotation: [0.0; 4],
        };
        assert!(matches!(
            calib.to_isometry(),
            Err(ConfigError::DegenerateRotation)
        ));

        let calib = CalibrationConfig {
            translation: [f64::NAN, 0.0, 0.0],
            rotation: default_rotation(),
        };
        assert!(matches!(
            calib.to_isometry(),
            Err(ConfigError::NonFiniteCalibration)
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocess.yaml");

        let config = PreprocessorConfig {
            downsample_mode: DownsampleMode::RandomGrid,
            downsample_rate: 0.5,
            k_correspondences: 8,
            seed: 42,
            ..Default::default()
        };
        config.to_yaml(&path).unwrap();

        let loaded = PreprocessorConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let yaml = "downsample_mode: random_grid\nk_correspondences: 4\n";
        let config: PreprocessorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.downsample_mode, DownsampleMode::RandomGrid);
        assert_eq!(config.k_correspondences, 4);
        assert_eq!(config.distance_far_thresh, 100.0);
        assert_eq!(config.t_lidar_offset, CalibrationConfig::default());
    }

    #[test]
    fn test_mode_from_random_flag() {
        assert_eq!(DownsampleMode::from_random_flag(true), DownsampleMode::RandomGrid);
        assert_eq!(DownsampleMode::from_random_flag(false), DownsampleMode::VoxelGrid);
    }
}
