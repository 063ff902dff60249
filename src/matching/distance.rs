use std::cmp::Ordering;

use crate::matching::{DatasetFeatures, FeatureMatrix, MatchError, MatchResult, Result};

/// Population standard deviation of the element-wise difference between
/// two feature matrices, collapsed to one scalar.
///
/// This is the documented similarity proxy, preserved as-is: timing
/// misalignment and coefficient magnitude both feed the same statistic,
/// and no time alignment is attempted. Matrices must have identical
/// shape; anything else is a `ShapeMismatch` error rather than a
/// truncated or padded guess. Recordings captured through the fixed
/// listen window share a shape in steady state.
pub fn distance(a: &FeatureMatrix, b: &FeatureMatrix) -> Result<f32> {
    if a.dim() != b.dim() {
        return Err(MatchError::ShapeMismatch {
            left: a.dim(),
            right: b.dim(),
        });
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let count = a.len() as f64;
    let mut sum = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (*x - *y) as f64;
    }
    let mean = sum / count;

    let mut variance = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let diff = (*x - *y) as f64 - mean;
        variance += diff * diff;
    }
    Ok((variance / count).sqrt() as f32)
}

/// Compute the distance from `query` to every dataset sample and return
/// all (label, distance) pairs sorted ascending.
///
/// The sort is stable, so equal distances keep first-seen dataset order
/// and results stay deterministic. A label appears once per recorded
/// sample. The first entry is the caller's "best match".
pub fn rank_against_dataset(
    query: &FeatureMatrix,
    dataset: &DatasetFeatures,
) -> Result<Vec<MatchResult>> {
    let mut results = Vec::with_capacity(dataset.len());
    for (label, features) in dataset.entries() {
        let value = distance(query, features)?;
        results.push(MatchResult {
            label: label.to_string(),
            distance: value,
        });
    }
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
    });
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::{distance, rank_against_dataset};
    use crate::matching::{DatasetFeatures, MatchError};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn self_distance_is_zero() {
        let a = array![[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = array![[1.0_f32, -2.0], [0.5, 3.0]];
        let b = array![[0.0_f32, 1.0], [2.5, -1.0]];
        let forward = distance(&a, &b).unwrap();
        let backward = distance(&b, &a).unwrap();
        assert_abs_diff_eq!(forward, backward, epsilon = 1e-6);
    }

    #[test]
    fn matches_population_stddev_by_hand() {
        // difference is [1, -1, 3, -3]; mean 0; variance (1+1+9+9)/4 = 5
        let a = array![[2.0_f32, 1.0], [5.0, 0.0]];
        let b = array![[1.0_f32, 2.0], [2.0, 3.0]];
        assert_abs_diff_eq!(distance(&a, &b).unwrap(), 5.0_f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn constant_offset_has_zero_spread() {
        let a = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let b = array![[3.0_f32, 4.0], [5.0, 6.0]];
        assert_abs_diff_eq!(distance(&a, &b).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn shape_mismatch_is_refused() {
        let a = Array2::<f32>::zeros((2, 3));
        let b = Array2::<f32>::zeros((2, 4));
        let err = distance(&a, &b).unwrap_err();
        assert!(matches!(err, MatchError::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_matrices_are_identical() {
        let a = Array2::<f32>::zeros((0, 0));
        assert_eq!(distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn ranking_is_ascending_with_stable_ties() {
        let query = array![[0.0_f32, 0.0]];
        let mut dataset = DatasetFeatures::default();
        // spreads: "far" 2.0, "near" 0.5, "mid" 1.0, "near-tie" 0.5
        dataset.push("far", array![[2.0_f32, -2.0]]);
        dataset.push("near", array![[0.5_f32, -0.5]]);
        dataset.push("mid", array![[1.0_f32, -1.0]]);
        dataset.push("near-tie", array![[-0.5_f32, 0.5]]);

        let ranked = rank_against_dataset(&query, &dataset).unwrap();
        let labels: Vec<&str> = ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["near", "near-tie", "mid", "far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn ranking_propagates_shape_mismatch() {
        let query = Array2::<f32>::zeros((1, 2));
        let mut dataset = DatasetFeatures::default();
        dataset.push("bad", Array2::<f32>::zeros((1, 3)));
        assert!(rank_against_dataset(&query, &dataset).is_err());
    }
}
