//! Range sensor scan preprocessing for scan matching front ends.
//!
//! This crate turns one raw scan (points plus per-point time offsets) into a
//! frame ready for registration:
//! - Temporal sorting of out-of-order sensor output
//! - Range filtering under a sensor-to-reference calibration
//! - Voxel grid or random grid downsampling
//! - k-nearest-neighbor tables over the surviving points (KD-tree, optionally
//!   parallel)
//!
//! # Example
//!
//! ```no_run
//! use scan_preprocess::{core::loaders::load_scan_csv, CloudPreprocessor, PreprocessorConfig};
//!
//! let config = PreprocessorConfig::from_yaml("preprocess.yaml").unwrap();
//! let mut preprocessor = CloudPreprocessor::from_config(&config).unwrap();
//!
//! let scan = load_scan_csv("scan.csv", 0.0).unwrap();
//! let frame = preprocessor.preprocess_scan(&scan).unwrap();
//! println!("{} points, {} neighbors each", frame.len(), frame.k_neighbors);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod preprocessor;
pub mod processors;

pub use config::{CalibrationConfig, ConfigError, DownsampleMode, PreprocessorConfig, PreprocessorParams};
pub use core::{PointSet, PreprocessedFrame, RawScan, SharedFrame};
pub use preprocessor::{CloudPreprocessor, PreprocessError, PreprocessStats};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
