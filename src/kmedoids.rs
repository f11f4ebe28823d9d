//! K-Medoids clustering by greedy swap search over a cached L1 distance matrix

use crate::error::{validate_k, EngineError, EngineResult};
use crate::metrics::manhattan_distance;
use crate::model::{
    check_feature_width, to_rows, Algorithm, IterationRecord, Partition, StopReason,
};
use log::debug;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Upper bound on swap candidates sampled per iteration
pub const MAX_SWAP_CANDIDATES: usize = 10;

/// K-Medoids parameters.
///
/// Medoids are seeded deterministically (most central point, then repeatedly
/// the point farthest from its nearest medoid). The seed drives only the
/// sampling of swap candidates.
#[derive(Debug, Clone)]
pub struct KMedoids {
    n_clusters: usize,
    max_iterations: usize,
    seed: u64,
    record_history: bool,
}

impl KMedoids {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: crate::kmeans::DEFAULT_SEED,
            record_history: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    /// Fit medoids to normalized features
    pub fn fit(&self, features: &Array2<f64>) -> EngineResult<KMedoidsModel> {
        validate_k(self.n_clusters, features.nrows())?;
        if self.max_iterations == 0 {
            return Err(EngineError::config("max_iterations must be at least 1"));
        }

        let n_samples = features.nrows();
        let distances = pairwise_manhattan(features);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut medoids = init_medoids(&distances, self.n_clusters);

        let mut history = self.record_history.then(|| {
            vec![IterationRecord::seeded(
                &select_rows(features, &medoids),
                Some(medoids.as_slice()),
            )]
        });

        let mut previous: Option<Vec<usize>> = None;
        let mut finished: Option<(usize, StopReason)> = None;

        for iteration in 0..self.max_iterations {
            let (labels, current_cost) = assign(&distances, &medoids);

            if let Some(history) = history.as_mut() {
                history.push(IterationRecord {
                    iteration: iteration + 1,
                    representatives: to_rows(&select_rows(features, &medoids)),
                    medoid_indices: Some(medoids.clone()),
                    distances: Some(distance_rows(&distances, &medoids)),
                    labels: Some(labels),
                    cost: Some(current_cost),
                });
            }

            if previous.as_ref() == Some(&medoids) {
                finished = Some((iteration, StopReason::Converged));
                break;
            }
            previous = Some(medoids.clone());

            let non_medoids: Vec<usize> = (0..n_samples).filter(|i| !medoids.contains(i)).collect();
            if non_medoids.is_empty() {
                finished = Some((iteration + 1, StopReason::NoCandidates));
                break;
            }

            let budget = non_medoids.len().min(MAX_SWAP_CANDIDATES.min(n_samples / 5));
            let candidates: Vec<usize> = non_medoids
                .choose_multiple(&mut rng, budget)
                .copied()
                .collect();

            if !try_first_improving_swap(&distances, &mut medoids, &candidates, current_cost) {
                finished = Some((iteration + 1, StopReason::NoImprovement));
                break;
            }
        }

        let (n_iter, stop_reason) =
            finished.unwrap_or((self.max_iterations, StopReason::MaxIterations));
        let (labels, cost) = assign(&distances, &medoids);
        debug!(
            "k-medoids k={} finished after {} iteration(s) ({:?}), cost {:.4}",
            self.n_clusters, n_iter, stop_reason, cost
        );

        Ok(KMedoidsModel {
            n_clusters: self.n_clusters,
            labels,
            medoids: select_rows(features, &medoids),
            medoid_indices: medoids,
            cost,
            n_iter,
            max_iterations: self.max_iterations,
            stop_reason,
            history,
        })
    }
}

/// Fitted K-Medoids partition
#[derive(Debug, Clone)]
pub struct KMedoidsModel {
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Vec<usize>,
    /// Medoid rows in normalized space
    pub medoids: Array2<f64>,
    /// Training-row index of each medoid, in cluster order
    pub medoid_indices: Vec<usize>,
    /// Sum of L1 distances from every point to its medoid
    pub cost: f64,
    pub n_iter: usize,
    pub max_iterations: usize,
    pub stop_reason: StopReason,
    pub history: Option<Vec<IterationRecord>>,
}

impl Partition for KMedoidsModel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::KMedoids
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    fn labels(&self) -> &[usize] {
        &self.labels
    }

    fn representatives(&self) -> &Array2<f64> {
        &self.medoids
    }

    fn medoid_indices(&self) -> Option<&[usize]> {
        Some(&self.medoid_indices)
    }

    fn cost(&self) -> f64 {
        self.cost
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
        check_feature_width(features, &self.medoids)?;
        let labels = features
            .outer_iter()
            .map(|row| {
                let mut best = (0, f64::INFINITY);
                for (cluster, medoid) in self.medoids.outer_iter().enumerate() {
                    let d = manhattan_distance(&row, &medoid);
                    if d < best.1 {
                        best = (cluster, d);
                    }
                }
                best.0
            })
            .collect();
        Ok(labels)
    }
}

/// Fit K-Medoids with explicit parameters
pub fn fit_kmedoids(
    features: &Array2<f64>,
    n_clusters: usize,
    max_iterations: usize,
    seed: u64,
) -> EngineResult<KMedoidsModel> {
    KMedoids::new(n_clusters)
        .with_max_iterations(max_iterations)
        .with_seed(seed)
        .fit(features)
}

/// Symmetric matrix of L1 distances between all rows
pub fn pairwise_manhattan(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows();
    let mut matrix = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = manhattan_distance(&features.row(i), &features.row(j));
            matrix[[i, j]] = d;
            matrix[[j, i]] = d;
        }
    }
    matrix
}

/// First medoid minimizes total distance to all points; each further medoid is
/// the non-medoid farthest from its nearest medoid. Ties go to the lower index.
fn init_medoids(distances: &Array2<f64>, k: usize) -> Vec<usize> {
    let n = distances.nrows();
    let totals = distances.sum_axis(Axis(1));

    let mut first = 0;
    for (i, &total) in totals.iter().enumerate() {
        if total < totals[first] {
            first = i;
        }
    }

    let mut medoids = vec![first];
    let mut nearest: Vec<f64> = distances.row(first).to_vec();

    while medoids.len() < k {
        let mut next: Option<usize> = None;
        for i in (0..n).filter(|i| !medoids.contains(i)) {
            if next.map_or(true, |best| nearest[i] > nearest[best]) {
                next = Some(i);
            }
        }
        // k <= n guarantees a remaining point
        let Some(next) = next else { break };

        medoids.push(next);
        for (d, &to_new) in nearest.iter_mut().zip(distances.row(next)) {
            *d = d.min(to_new);
        }
    }

    medoids
}

/// Nearest-medoid labels and the total assignment cost
fn assign(distances: &Array2<f64>, medoids: &[usize]) -> (Vec<usize>, f64) {
    let mut labels = Vec::with_capacity(distances.nrows());
    let mut cost = 0.0;

    for row in distances.outer_iter() {
        let mut best = (0, f64::INFINITY);
        for (cluster, &m) in medoids.iter().enumerate() {
            if row[m] < best.1 {
                best = (cluster, row[m]);
            }
        }
        labels.push(best.0);
        cost += best.1;
    }

    (labels, cost)
}

fn total_cost(distances: &Array2<f64>, medoids: &[usize]) -> f64 {
    distances
        .outer_iter()
        .map(|row| medoids.iter().map(|&m| row[m]).fold(f64::INFINITY, f64::min))
        .sum()
}

/// Try each candidate in each medoid slot and keep the first strictly cheaper set.
fn try_first_improving_swap(
    distances: &Array2<f64>,
    medoids: &mut [usize],
    candidates: &[usize],
    current_cost: f64,
) -> bool {
    for &candidate in candidates {
        for slot in 0..medoids.len() {
            let old = medoids[slot];
            medoids[slot] = candidate;
            let trial = total_cost(distances, medoids);
            if trial < current_cost {
                debug!(
                    "swap medoid {} -> {} lowers cost {:.4} -> {:.4}",
                    old, candidate, current_cost, trial
                );
                return true;
            }
            medoids[slot] = old;
        }
    }
    false
}

fn select_rows(features: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    features.select(Axis(0), indices)
}

fn distance_rows(distances: &Array2<f64>, medoids: &[usize]) -> Vec<Vec<f64>> {
    distances
        .outer_iter()
        .map(|row| medoids.iter().map(|&m| row[m]).collect())
        .collect()
}
