//! Distances and cluster quality measures

use crate::error::{EngineError, EngineResult};
use ndarray::{Array2, ArrayView1};
use std::collections::BTreeSet;

/// Calculate Euclidean distance between two points
pub fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    squared_euclidean_distance(point1, point2).sqrt()
}

pub fn squared_euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
}

/// Calculate Manhattan (L1) distance between two points
pub fn manhattan_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).abs())
        .sum::<f64>()
}

/// Compute within-cluster sum of squares (inertia)
pub fn compute_inertia(features: &Array2<f64>, labels: &[usize], centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            inertia += squared_euclidean_distance(&features.row(i), &centroids.row(cluster));
        }
    }

    inertia
}

/// Davies–Bouldin index of a labelling against its representative points.
///
/// Representatives may be centroids or medoid rows; only their positions matter.
/// Lower is better. Fewer than two distinct labels yields exactly `0.0`.
///
/// # Arguments
/// * `features` - Points that were clustered, one per row
/// * `labels` - Cluster index of every row
/// * `representatives` - One row per cluster index
pub fn davies_bouldin_index(
    features: &Array2<f64>,
    labels: &[usize],
    representatives: &Array2<f64>,
) -> EngineResult<f64> {
    check_labelling(features, labels, representatives)?;

    let present: Vec<usize> = labels
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if present.len() < 2 {
        return Ok(0.0);
    }

    // Mean distance from members to their representative
    let mut scatter = vec![0.0; representatives.nrows()];
    let mut counts = vec![0usize; representatives.nrows()];
    for (i, &cluster) in labels.iter().enumerate() {
        scatter[cluster] += euclidean_distance(&features.row(i), &representatives.row(cluster));
        counts[cluster] += 1;
    }
    for (s, &count) in scatter.iter_mut().zip(&counts) {
        if count > 0 {
            *s /= count as f64;
        }
    }

    let mut total = 0.0;
    for &i in &present {
        let mut max_ratio = 0.0_f64;
        for &j in &present {
            if i == j {
                continue;
            }
            let separation =
                euclidean_distance(&representatives.row(i), &representatives.row(j));
            if separation > 0.0 {
                max_ratio = max_ratio.max((scatter[i] + scatter[j]) / separation);
            }
        }
        total += max_ratio;
    }

    Ok(total / present.len() as f64)
}

fn check_labelling(
    features: &Array2<f64>,
    labels: &[usize],
    representatives: &Array2<f64>,
) -> EngineResult<()> {
    if labels.len() != features.nrows() {
        return Err(EngineError::ShapeMismatch {
            expected: format!("{} labels", features.nrows()),
            actual: format!("{} labels", labels.len()),
        });
    }
    if representatives.ncols() != features.ncols() {
        return Err(EngineError::ShapeMismatch {
            expected: format!("representatives with {} columns", features.ncols()),
            actual: format!("{} columns", representatives.ncols()),
        });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= representatives.nrows()) {
        return Err(EngineError::ShapeMismatch {
            expected: format!("labels below {}", representatives.nrows()),
            actual: format!("label {bad}"),
        });
    }
    Ok(())
}
