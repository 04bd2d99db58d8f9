//! Pipeline stages.
//!
//! Each stage consumes and produces a [`PointSet`](crate::core::PointSet), so
//! they compose in any order without adapters. The preprocessor runs them as
//! sort, filter, downsample, then neighbor search.

pub mod downsampling;
pub mod filtering;
pub mod neighbors;
pub mod sorting;

// Re-export key types for convenience
pub use downsampling::{bin_points, downsample, randomgrid_sampling, voxelgrid_sampling};
pub use filtering::{distance_filter, RangeFilter};
pub use neighbors::{find_neighbors, par_find_neighbors};
pub use sorting::{is_time_sorted, sort_by_time, time_order};
