//! k-nearest-neighbor tables for downsampled scans.
//!
//! This module builds a `kiddo` KD-tree over the final points and, for each
//! point, lists the indices of its `k` nearest other points. Downstream
//! registration uses these lists to estimate per-point covariances/normals.
//!
//! # Algorithm
//!
//! 1. **Build KD-tree**: O(n log n) construction using kiddo's `ImmutableKdTree`,
//!    which handles coplanar scans and repeated returns
//! 2. **k+1 query**: the nearest `k + 1` points bound the k-th neighbor distance
//!    (the query point itself is one of them)
//! 3. **Tie completion**: a radius query at that bound collects every point at
//!    the same distance, so the index tie-break is exact rather than whatever
//!    order the tree happened to return
//! 4. **Ranking**: candidates sorted by `(distance, index)`, self removed,
//!    truncated to `k`
//!
//! Queries are independent; [`par_find_neighbors`] runs them with rayon and
//! produces exactly the same table as [`find_neighbors`].

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Vector4;
use rayon::prelude::*;

use crate::core::transforms::{squared_distance, to_coords};

/// Relative slack on the radius query so points exactly at the bound are
/// never lost to rounding inside the tree.
const RADIUS_SLACK: f64 = 1e-9;

/// Neighbor indices of `coords[i]`, closest first, ties by index.
fn query_neighbors(
    tree: &ImmutableKdTree<f64, 3>,
    coords: &[[f64; 3]],
    i: usize,
    k: usize,
) -> Vec<usize> {
    let query = &coords[i];
    let Some(wanted) = NonZeroUsize::new((k + 1).min(coords.len())) else {
        return Vec::new();
    };

    let bound = tree
        .nearest_n::<SquaredEuclidean>(query, wanted)
        .iter()
        .map(|nn| nn.distance)
        .fold(0.0f64, f64::max);
    let radius = bound * (1.0 + RADIUS_SLACK) + f64::MIN_POSITIVE;

    let mut candidates: Vec<(f64, usize)> = tree
        .within::<SquaredEuclidean>(query, radius)
        .iter()
        .map(|nn| nn.item as usize)
        .filter(|&j| j != i)
        .map(|j| (squared_distance(query, &coords[j]), j))
        .collect();

    candidates.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates.truncate(k);
    candidates.into_iter().map(|(_, j)| j).collect()
}

/// Trivial tables that need no tree: empty input, `k == 0`, or one point.
fn trivial_table(n: usize, k: usize) -> Option<Vec<Vec<usize>>> {
    if n == 0 {
        return Some(Vec::new());
    }
    if k == 0 || n == 1 {
        return Some(vec![Vec::new(); n]);
    }
    None
}

/// Find the `k` nearest neighbors of every point.
///
/// # Arguments
///
/// * `points` - Finite homogeneous points; only `x`, `y`, `z` are used
/// * `k` - Neighbors per point; `0` returns `n` empty lists without a tree
///
/// # Returns
///
/// One list per point, closest first, never containing the point's own
/// index. With fewer than `k + 1` points each list holds the `n - 1` others.
///
/// # Example
///
/// ```
/// use nalgebra::Vector4;
/// use scan_preprocess::processors::neighbors::find_neighbors;
///
/// let points = vec![
///     Vector4::new(0.0, 0.0, 0.0, 1.0),
///     Vector4::new(1.0, 0.0, 0.0, 1.0),
///     Vector4::new(5.0, 0.0, 0.0, 1.0),
/// ];
/// let table = find_neighbors(&points, 1);
/// assert_eq!(table, vec![vec![1], vec![0], vec![1]]);
/// ```
pub fn find_neighbors(points: &[Vector4<f64>], k: usize) -> Vec<Vec<usize>> {
    if let Some(table) = trivial_table(points.len(), k) {
        return table;
    }

    let coords = to_coords(points);
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&coords);

    (0..coords.len())
        .map(|i| query_neighbors(&tree, &coords, i, k))
        .collect()
}

/// Parallel variant of [`find_neighbors`] running queries on the current
/// rayon pool.
pub fn par_find_neighbors(points: &[Vector4<f64>], k: usize) -> Vec<Vec<usize>> {
    if let Some(table) = trivial_table(points.len(), k) {
        return table;
    }

    let coords = to_coords(points);
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&coords);

    (0..coords.len())
        .into_par_iter()
        .map(|i| query_neighbors(&tree, &coords, i, k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn point(x: f64, y: f64, z: f64) -> Vector4<f64> {
        Vector4::new(x, y, z, 1.0)
    }

    fn random_points(n: usize, seed: u64) -> Vec<Vector4<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                point(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-2.0..2.0),
                )
            })
            .collect()
    }

    /// O(n^2) reference with the same (distance, index) ordering.
    fn brute_force(points: &[Vector4<f64>], k: usize) -> Vec<Vec<usize>> {
        let coords = to_coords(points);
        (0..coords.len())
            .map(|i| {
                let mut others: Vec<(f64, usize)> = (0..coords.len())
                    .filter(|&j| j != i)
                    .map(|j| (squared_distance(&coords[i], &coords[j]), j))
                    .collect();
                others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                others.truncate(k);
                others.into_iter().map(|(_, j)| j).collect()
            })
            .collect()
    }

    #[test]
    fn test_matches_brute_force() {
        let points = random_points(400, 17);
        for k in [1, 5, 10] {
            assert_eq!(find_neighbors(&points, k), brute_force(&points, k));
        }
    }

    #[test]
    fn test_exact_k_and_no_self() {
        let points = random_points(200, 3);
        let k = 8;
        let table = find_neighbors(&points, k);
        let coords = to_coords(&points);

        assert_eq!(table.len(), points.len());
        for (i, neighbors) in table.iter().enumerate() {
            assert_eq!(neighbors.len(), k);
            assert!(!neighbors.contains(&i));

            // No excluded point is closer than the farthest returned neighbor
            let farthest = neighbors
                .iter()
                .map(|&j| squared_distance(&coords[i], &coords[j]))
                .fold(0.0f64, f64::max);
            for j in (0..points.len()).filter(|j| *j != i && !neighbors.contains(j)) {
                assert!(squared_distance(&coords[i], &coords[j]) >= farthest);
            }
        }
    }

    #[test]
    fn test_ties_broken_by_index() {
        // Regular grid: many equidistant neighbors
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                points.push(point(x as f64, y as f64, 0.0));
            }
        }
        let table = find_neighbors(&points, 2);

        // Center (2,2) is index 12; its four unit-distance neighbors are
        // 7, 11, 13, 17, so the two lowest indices win
        assert_eq!(table[12], vec![7, 11]);
        assert_eq!(table, brute_force(&points, 2));
    }

    #[test]
    fn test_duplicate_points() {
        let points = vec![
            point(1.0, 1.0, 1.0),
            point(1.0, 1.0, 1.0),
            point(1.0, 1.0, 1.0),
            point(2.0, 1.0, 1.0),
        ];
        let table = find_neighbors(&points, 2);
        assert_eq!(table[0], vec![1, 2]);
        assert_eq!(table[2], vec![0, 1]);
        assert_eq!(table[3], vec![0, 1]);
    }

    #[test]
    fn test_coplanar_cloud() {
        // Flat ground: every z is exactly 0.0, far more points than one bucket
        let mut rng = StdRng::seed_from_u64(41);
        let points: Vec<_> = (0..20_000)
            .map(|_| point(rng.gen_range(-30.0..30.0), rng.gen_range(-30.0..30.0), 0.0))
            .collect();
        let table = find_neighbors(&points, 10);

        assert_eq!(table.len(), points.len());
        assert!(table.iter().all(|n| n.len() == 10));
        assert!(table.iter().enumerate().all(|(i, n)| !n.contains(&i)));
        assert_eq!(par_find_neighbors(&points, 10), table);
    }

    #[test]
    fn test_two_valued_axis() {
        // x alternates between two values, so most splits see equal keys
        let points: Vec<_> = (0..20_000)
            .map(|i| point((i % 2) as f64, (i / 2) as f64 * 2.0, 0.5))
            .collect();
        let table = find_neighbors(&points, 3);
        assert_eq!(table.len(), points.len());

        // Opposite column at distance 1, then the two rows above and below
        // in the same column tie at distance 2
        assert_eq!(table[100], vec![101, 98, 102]);
        assert_eq!(table[101], vec![100, 99, 103]);
    }

    #[test]
    fn test_many_duplicate_points() {
        let points = vec![point(4.0, -2.0, 1.5); 300];
        let table = find_neighbors(&points, 5);

        // All distances tie at zero, so the lowest other indices win
        assert_eq!(table[0], vec![1, 2, 3, 4, 5]);
        assert_eq!(table[2], vec![0, 1, 3, 4, 5]);
        assert_eq!(table[299], vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fewer_points_than_k() {
        let points = vec![point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0), point(3.0, 0.0, 0.0)];
        let table = find_neighbors(&points, 10);
        assert_eq!(table, vec![vec![1, 2], vec![0, 2], vec![1, 0]]);
    }

    #[test]
    fn test_trivial_inputs() {
        assert!(find_neighbors(&[], 5).is_empty());
        assert_eq!(find_neighbors(&[point(1.0, 2.0, 3.0)], 5), vec![Vec::<usize>::new()]);

        let points = random_points(10, 1);
        let table = find_neighbors(&points, 0);
        assert_eq!(table.len(), 10);
        assert!(table.iter().all(|n| n.is_empty()));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let points = random_points(1000, 23);
        assert_eq!(par_find_neighbors(&points, 10), find_neighbors(&points, 10));
    }
}
