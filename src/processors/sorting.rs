//! Temporal ordering of raw scan points.
//!
//! Sensor drivers may emit points out of acquisition order (multi-return or
//! multi-channel interleaving). Downstream motion compensation needs
//! non-decreasing per-point time offsets, so the pipeline reorders first.

use crate::core::frame::PointSet;

/// Returns true if `times` is non-decreasing under `f64::total_cmp`.
pub fn is_time_sorted(times: &[f64]) -> bool {
    times
        .windows(2)
        .all(|w| w[0].total_cmp(&w[1]).is_le())
}

/// Permutation that sorts `times` ascending, stable for equal values.
///
/// Uses the IEEE total order, so positive NaN offsets sort after every
/// finite offset instead of panicking.
pub fn time_order(times: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..times.len()).collect();
    // sort_by is stable, so ties keep input order
    indices.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
    indices
}

/// Reorder a point set by ascending time.
///
/// Ties keep their original relative order. Already sorted input is returned
/// unchanged without building a permutation.
///
/// # Example
///
/// ```
/// use nalgebra::Vector4;
/// use scan_preprocess::core::PointSet;
/// use scan_preprocess::processors::sorting::sort_by_time;
///
/// let set = PointSet::new(
///     vec![0.2, 0.0],
///     vec![Vector4::new(2.0, 0.0, 0.0, 1.0), Vector4::new(1.0, 0.0, 0.0, 1.0)],
/// );
/// let sorted = sort_by_time(set);
/// assert_eq!(sorted.times, vec![0.0, 0.2]);
/// assert_eq!(sorted.points[0].x, 1.0);
/// ```
pub fn sort_by_time(set: PointSet) -> PointSet {
    if is_time_sorted(&set.times) {
        return set;
    }

    let order = time_order(&set.times);
    set.select(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector4;

    fn indexed_set(times: &[f64]) -> PointSet {
        // Encode the original index in x so permutations are observable
        let points = (0..times.len())
            .map(|i| Vector4::new(i as f64, 0.0, 0.0, 1.0))
            .collect();
        PointSet::new(times.to_vec(), points)
    }

    #[test]
    fn test_sort_reorders_pairs_together() {
        let set = indexed_set(&[0.3, 0.0, 0.1, 0.2, 0.4]);
        let sorted = sort_by_time(set);

        assert_eq!(sorted.times, vec![0.0, 0.1, 0.2, 0.3, 0.4]);
        let origin: Vec<f64> = sorted.points.iter().map(|p| p.x).collect();
        assert_eq!(origin, vec![1.0, 2.0, 3.0, 0.0, 4.0]);
    }

    #[test]
    fn test_sort_is_stable() {
        let set = indexed_set(&[0.1, 0.0, 0.1, 0.0, 0.1]);
        let sorted = sort_by_time(set);

        let origin: Vec<f64> = sorted.points.iter().map(|p| p.x).collect();
        assert_eq!(origin, vec![1.0, 3.0, 0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_sort_preserves_multiset() {
        let times = [0.9, 0.1, 0.5, 0.5, 0.0, 0.7, 0.2];
        let set = indexed_set(&times);
        let original: Vec<(f64, f64)> = set.iter().map(|(t, p)| (t, p.x)).collect();

        let sorted = sort_by_time(set);
        assert!(is_time_sorted(&sorted.times));

        let mut before = original.clone();
        let mut after: Vec<(f64, f64)> = sorted.iter().map(|(t, p)| (t, p.x)).collect();
        before.sort_by(|a, b| a.1.total_cmp(&b.1));
        after.sort_by(|a, b| a.1.total_cmp(&b.1));
        assert_eq!(before, after);
    }

    #[test]
    fn test_sort_empty() {
        let sorted = sort_by_time(PointSet::default());
        assert!(sorted.is_empty());
    }

    #[test]
    fn test_sorted_input_untouched() {
        let set = indexed_set(&[0.0, 0.0, 0.1, 0.2]);
        let sorted = sort_by_time(set.clone());
        assert_eq!(sorted, set);
    }

    #[test]
    fn test_nan_sorts_last() {
        let set = indexed_set(&[f64::NAN, 0.2, 0.1]);
        let sorted = sort_by_time(set);

        assert_eq!(sorted.times[0], 0.1);
        assert_eq!(sorted.times[1], 0.2);
        assert!(sorted.times[2].is_nan());
        assert_eq!(sorted.points[2].x, 0.0);
    }

    #[test]
    fn test_time_order() {
        assert_eq!(time_order(&[2.0, 0.0, 1.0]), vec![1, 2, 0]);
        assert!(time_order(&[]).is_empty());
    }
}
