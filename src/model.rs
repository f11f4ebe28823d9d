//! Shared partition types used by both clustering algorithms

use crate::error::{EngineError, EngineResult};
use crate::kmeans::KMeans;
use crate::kmedoids::KMedoids;
use crate::metrics::davies_bouldin_index;
use crate::normalize::{FeatureSet, N_FEATURES};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which partitioner produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    KMeans,
    KMedoids,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::KMeans => write!(f, "K-Means"),
            Algorithm::KMedoids => write!(f, "K-Medoids"),
        }
    }
}

/// Why the iteration loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Representatives stopped moving (within tolerance for centroids)
    Converged,
    /// A full swap pass found no cheaper medoid set
    NoImprovement,
    /// Every point is already a medoid; there is nothing to swap
    NoCandidates,
    /// The configured iteration cap was reached
    MaxIterations,
}

/// Diagnostic snapshot of one iteration.
///
/// Iteration 0 holds the seeded representatives before any assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Representative positions used for this iteration's assignment
    pub representatives: Vec<Vec<f64>>,
    /// Row indices of the medoids (K-Medoids only)
    pub medoid_indices: Option<Vec<usize>>,
    /// Distance from every point to every representative
    pub distances: Option<Vec<Vec<f64>>>,
    pub labels: Option<Vec<usize>>,
    /// Inertia or medoid cost under this assignment
    pub cost: Option<f64>,
}

impl IterationRecord {
    pub(crate) fn seeded(representatives: &Array2<f64>, medoid_indices: Option<&[usize]>) -> Self {
        Self {
            iteration: 0,
            representatives: to_rows(representatives),
            medoid_indices: medoid_indices.map(<[usize]>::to_vec),
            distances: None,
            labels: None,
            cost: None,
        }
    }
}

pub(crate) fn to_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

/// A fitted partition: labels plus one representative point per cluster
pub trait Partition {
    fn algorithm(&self) -> Algorithm;

    fn n_clusters(&self) -> usize;

    /// Cluster index (0..k) of every training row
    fn labels(&self) -> &[usize];

    /// Centroids or medoid rows, in normalized space
    fn representatives(&self) -> &Array2<f64>;

    /// Training-row indices of the representatives, when they are actual points
    fn medoid_indices(&self) -> Option<&[usize]> {
        None
    }

    /// Inertia for centroids, total L1 cost for medoids
    fn cost(&self) -> f64;

    /// Iterations actually run
    fn n_iter(&self) -> usize;

    /// Configured iteration cap
    fn max_iterations(&self) -> usize;

    fn stop_reason(&self) -> StopReason;

    /// Iteration trace, present only when history recording was requested
    fn history(&self) -> Option<&[IterationRecord]>;

    /// Assign new normalized rows to the nearest stored representative
    fn predict(&self, features: &Array2<f64>) -> EngineResult<Vec<usize>>;

    /// Number of training rows per cluster
    fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &label in self.labels() {
            if label < sizes.len() {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Davies–Bouldin index of this partition over the rows it was fitted on
    fn quality(&self, features: &Array2<f64>) -> EngineResult<f64> {
        davies_bouldin_index(features, self.labels(), self.representatives())
    }
}

/// Hyperparameters shared by both partitioners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParams {
    pub n_clusters: usize,
    pub max_iterations: usize,
    /// Centroid-movement tolerance (K-Means only)
    pub tolerance: f64,
    pub seed: u64,
    pub record_history: bool,
}

impl FitParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: crate::kmeans::DEFAULT_MAX_ITERATIONS,
            tolerance: crate::kmeans::DEFAULT_TOLERANCE,
            seed: crate::kmeans::DEFAULT_SEED,
            record_history: false,
        }
    }

    pub fn with_k(self, n_clusters: usize) -> Self {
        Self { n_clusters, ..self }
    }
}

/// Fit the requested algorithm and return it behind the common interface
pub fn fit_partition(
    algorithm: Algorithm,
    features: &Array2<f64>,
    params: &FitParams,
) -> EngineResult<Box<dyn Partition>> {
    let model: Box<dyn Partition> = match algorithm {
        Algorithm::KMeans => Box::new(
            KMeans::new(params.n_clusters)
                .with_max_iterations(params.max_iterations)
                .with_tolerance(params.tolerance)
                .with_seed(params.seed)
                .with_history(params.record_history)
                .fit(features)?,
        ),
        Algorithm::KMedoids => Box::new(
            KMedoids::new(params.n_clusters)
                .with_max_iterations(params.max_iterations)
                .with_seed(params.seed)
                .with_history(params.record_history)
                .fit(features)?,
        ),
    };
    Ok(model)
}

/// Predict the cluster of a raw (quantity, monetary) observation
///
/// # Arguments
/// * `model` - Fitted partition
/// * `feature_set` - Features the model was fitted on (for the scaler)
/// * `values` - New raw values [quantity, monetary]
pub fn predict_cluster(
    model: &dyn Partition,
    feature_set: &FeatureSet,
    values: &[f64; N_FEATURES],
) -> EngineResult<usize> {
    let scaled: Array1<f64> = feature_set.scale_new_data(values)?;
    let row = scaled.insert_axis(ndarray::Axis(0));
    model
        .predict(&row)?
        .first()
        .copied()
        .ok_or_else(|| EngineError::config("prediction produced no label"))
}

pub(crate) fn check_feature_width(
    features: &Array2<f64>,
    representatives: &Array2<f64>,
) -> EngineResult<()> {
    if features.ncols() != representatives.ncols() {
        return Err(EngineError::ShapeMismatch {
            expected: format!("{} feature columns", representatives.ncols()),
            actual: format!("{} columns", features.ncols()),
        });
    }
    Ok(())
}
