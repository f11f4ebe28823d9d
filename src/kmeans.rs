//! K-Means clustering with seeded k-means++ initialization

use crate::error::{validate_k, EngineError, EngineResult};
use crate::metrics::{compute_inertia, euclidean_distance, squared_euclidean_distance};
use crate::model::{
    check_feature_width, to_rows, Algorithm, IterationRecord, Partition, StopReason,
};
use log::{debug, warn};
use ndarray::{Array2, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_SEED: u64 = 42;

/// K-Means parameters.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use tierforge::kmeans::KMeans;
/// use tierforge::model::Partition;
///
/// let data = array![[1.0, 2.0], [1.2, 1.9], [8.0, 8.0], [8.2, 8.1]];
/// let model = KMeans::new(2).with_seed(7).fit(&data).unwrap();
/// assert_eq!(model.labels().len(), 4);
/// assert_eq!(model.labels()[0], model.labels()[1]);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
    record_history: bool,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            seed: DEFAULT_SEED,
            record_history: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Stop once no centroid coordinate moves by this much or more
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Keep a snapshot of every iteration (memory grows with n × k × iterations)
    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    /// Fit centroids to normalized features
    pub fn fit(&self, features: &Array2<f64>) -> EngineResult<KMeansModel> {
        validate_k(self.n_clusters, features.nrows())?;
        if self.max_iterations == 0 {
            return Err(EngineError::config("max_iterations must be at least 1"));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(EngineError::config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = init_plus_plus(features, self.n_clusters, &mut rng);

        let mut history = self
            .record_history
            .then(|| vec![IterationRecord::seeded(&centroids, None)]);

        let mut n_iter = self.max_iterations;
        let mut stop_reason = StopReason::MaxIterations;

        for iteration in 0..self.max_iterations {
            let labels = assign_labels(features, &centroids);
            let updated = update_centroids(features, &labels, &centroids);
            let shift = max_shift(&centroids, &updated);

            if let Some(history) = history.as_mut() {
                history.push(IterationRecord {
                    iteration: iteration + 1,
                    representatives: to_rows(&centroids),
                    medoid_indices: None,
                    distances: Some(distance_table(features, &centroids)),
                    cost: Some(compute_inertia(features, &labels, &centroids)),
                    labels: Some(labels),
                });
            }

            centroids = updated;
            debug!("k-means iteration {}: max centroid shift {:.3e}", iteration + 1, shift);

            if shift < self.tolerance {
                n_iter = iteration + 1;
                stop_reason = StopReason::Converged;
                break;
            }
        }

        // Final assignment against the final centroids
        let labels = assign_labels(features, &centroids);
        let inertia = compute_inertia(features, &labels, &centroids);
        debug!(
            "k-means k={} finished after {} iteration(s) ({:?}), inertia {:.4}",
            self.n_clusters, n_iter, stop_reason, inertia
        );

        Ok(KMeansModel {
            n_clusters: self.n_clusters,
            labels,
            centroids,
            inertia,
            n_iter,
            max_iterations: self.max_iterations,
            stop_reason,
            history,
        })
    }
}

/// Fitted K-Means partition
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Vec<usize>,
    /// Cluster centroids in normalized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    pub n_iter: usize,
    pub max_iterations: usize,
    pub stop_reason: StopReason,
    pub history: Option<Vec<IterationRecord>>,
}

impl KMeansModel {
    /// Predict cluster for one normalized point
    pub fn predict_point(&self, point: &ArrayView1<f64>) -> EngineResult<usize> {
        if point.len() != self.centroids.ncols() {
            return Err(EngineError::ShapeMismatch {
                expected: format!("{} features", self.centroids.ncols()),
                actual: format!("{} features", point.len()),
            });
        }
        Ok(nearest_centroid(point, &self.centroids).0)
    }
}

impl Partition for KMeansModel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::KMeans
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn representatives(&self) -> &Array2<f64> {
        &self.centroids
    }

    fn cost(&self) -> f64 {
        self.inertia
    }

    fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    fn history(&self) -> Option<&[IterationRecord]> {
        self.history.as_deref()
    }

    fn predict(&self, features: &Array2<f64>) -> EngineResult<Vec<usize>> {
        check_feature_width(features, &self.centroids)?;
        Ok(assign_labels(features, &self.centroids))
    }
}

/// Fit K-Means with explicit parameters
///
/// # Arguments
/// * `features` - Normalized feature matrix
/// * `n_clusters` - Number of clusters
/// * `max_iterations` - Iteration cap
/// * `tolerance` - Convergence tolerance on centroid movement
/// * `seed` - Seed for the initialization generator
pub fn fit_kmeans(
    features: &Array2<f64>,
    n_clusters: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
) -> EngineResult<KMeansModel> {
    KMeans::new(n_clusters)
        .with_max_iterations(max_iterations)
        .with_tolerance(tolerance)
        .with_seed(seed)
        .fit(features)
}

/// k-means++ seeding: first centroid uniform, the rest weighted by squared
/// distance to the nearest centroid chosen so far.
fn init_plus_plus(features: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = features.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut min_sq: Vec<f64> = features
        .outer_iter()
        .map(|row| squared_euclidean_distance(&row, &features.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let next = match WeightedIndex::new(&min_sq) {
            Ok(weights) => weights.sample(rng),
            Err(_) => {
                // Remaining points all coincide with a chosen centroid
                warn!("k-means++ weights are all zero; picking a remaining point uniformly");
                let remaining: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
                remaining[rng.gen_range(0..remaining.len())]
            }
        };
        chosen.push(next);

        let newest = features.row(next);
        for (d, row) in min_sq.iter_mut().zip(features.outer_iter()) {
            *d = d.min(squared_euclidean_distance(&row, &newest));
        }
    }

    let mut centroids = Array2::zeros((k, features.ncols()));
    for (mut centroid, &idx) in centroids.outer_iter_mut().zip(&chosen) {
        centroid.assign(&features.row(idx));
    }
    centroids
}

fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = euclidean_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    (closest_cluster, min_distance)
}

fn assign_labels(features: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    features
        .outer_iter()
        .map(|row| nearest_centroid(&row, centroids).0)
        .collect()
}

fn distance_table(features: &Array2<f64>, centroids: &Array2<f64>) -> Vec<Vec<f64>> {
    features
        .outer_iter()
        .map(|row| {
            centroids
                .outer_iter()
                .map(|c| euclidean_distance(&row, &c))
                .collect()
        })
        .collect()
}

/// Mean of each cluster's members; a cluster left empty keeps its previous centroid.
pub(crate) fn update_centroids(
    features: &Array2<f64>,
    labels: &[usize],
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (row, &label) in features.outer_iter().zip(labels) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (cluster, &count) in counts.iter().enumerate() {
        if count == 0 {
            debug!("cluster {} is empty; keeping its previous centroid", cluster);
            sums.row_mut(cluster).assign(&previous.row(cluster));
        } else {
            sums.row_mut(cluster).mapv_inplace(|v| v / count as f64);
        }
    }
    sums
}

fn max_shift(old: &Array2<f64>, new: &Array2<f64>) -> f64 {
    old.iter()
        .zip(new.iter())
        .fold(0.0, |acc, (a, b)| acc.max((a - b).abs()))
}
