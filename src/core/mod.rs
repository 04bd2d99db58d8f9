//! Core data types, geometry helpers and I/O operations.

pub mod frame;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use frame::{PointSet, Points, PreprocessedFrame, RawScan, SharedFrame};
pub use loaders::{find_scan_files, load_scan_csv, LoaderError};
pub use transforms::{Calibration, VoxelKey};
pub use writers::{write_frame_csv, WriteError};
