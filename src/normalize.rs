//! Feature extraction and z-score normalization

use crate::aggregate::AggregatedBucket;
use crate::error::{EngineError, EngineResult};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Guard added to every standard deviation before dividing
pub const NORMALIZATION_EPSILON: f64 = 1e-8;

/// Number of clustering features: (quantity, monetary total)
pub const N_FEATURES: usize = 2;

/// Fitted per-column scaling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    /// Population standard deviations (before the epsilon guard)
    pub stds: Array1<f64>,
}

impl StandardScaler {
    /// Learn column means and standard deviations
    pub fn fit(matrix: &Array2<f64>) -> EngineResult<Self> {
        let means = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| EngineError::config("cannot normalize an empty feature matrix"))?;
        let stds = matrix.std_axis(Axis(0), 0.0);
        Ok(Self { means, stds })
    }

    /// Map raw rows into the normalized space
    pub fn transform(&self, matrix: &Array2<f64>) -> EngineResult<Array2<f64>> {
        self.check_columns(matrix)?;
        let denom = self.stds.mapv(|s| s + NORMALIZATION_EPSILON);
        Ok((matrix - &self.means) / &denom)
    }

    /// Map normalized rows (e.g. centroids) back to original units
    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> EngineResult<Array2<f64>> {
        self.check_columns(matrix)?;
        let scale = self.stds.mapv(|s| s + NORMALIZATION_EPSILON);
        Ok(matrix * &scale + &self.means)
    }

    fn check_columns(&self, matrix: &Array2<f64>) -> EngineResult<()> {
        if matrix.ncols() != self.means.len() {
            return Err(EngineError::ShapeMismatch {
                expected: format!("{} columns", self.means.len()),
                actual: format!("{} columns", matrix.ncols()),
            });
        }
        Ok(())
    }
}

/// Raw and normalized features for one clustering run
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Raw (quantity, monetary) rows, one per bucket, in bucket order
    pub raw: Array2<f64>,
    /// Z-scored copy of `raw`
    pub features: Array2<f64>,
    /// Parameters needed to undo the normalization
    pub scaler: StandardScaler,
}

impl FeatureSet {
    /// Build the feature table from aggregated buckets and normalize it
    pub fn from_buckets(buckets: &[AggregatedBucket]) -> EngineResult<Self> {
        normalize(&feature_matrix(buckets))
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    /// Scale a single new (quantity, monetary) observation
    pub fn scale_new_data(&self, values: &[f64; N_FEATURES]) -> EngineResult<Array1<f64>> {
        let input = Array2::from_shape_vec((1, N_FEATURES), values.to_vec()).map_err(|e| {
            EngineError::ShapeMismatch {
                expected: format!("1x{N_FEATURES}"),
                actual: e.to_string(),
            }
        })?;
        let scaled = self.scaler.transform(&input)?;
        Ok(scaled.row(0).to_owned())
    }
}

/// One (quantity, monetary) row per bucket, preserving bucket order
pub fn feature_matrix(buckets: &[AggregatedBucket]) -> Array2<f64> {
    let mut matrix = Array2::zeros((buckets.len(), N_FEATURES));
    for (mut row, bucket) in matrix.outer_iter_mut().zip(buckets) {
        row[0] = bucket.quantity as f64;
        row[1] = bucket.monetary;
    }
    matrix
}

/// Z-score every column: `(x - mean) / (std + 1e-8)`.
///
/// A constant column maps to zeros rather than NaN.
pub fn normalize(matrix: &Array2<f64>) -> EngineResult<FeatureSet> {
    if matrix.nrows() == 0 {
        return Err(EngineError::config("cannot normalize an empty feature matrix"));
    }
    let scaler = StandardScaler::fit(matrix)?;
    let features = scaler.transform(matrix)?;

    Ok(FeatureSet {
        raw: matrix.clone(),
        features,
        scaler,
    })
}
