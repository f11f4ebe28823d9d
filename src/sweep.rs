//! Elbow sweep: cost and Davies–Bouldin curves across a range of k

use crate::error::{EngineError, EngineResult};
use crate::model::{fit_partition, Algorithm, FitParams};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub const MIN_SWEEP_K: usize = 2;
pub const MAX_SWEEP_K: usize = 20;

/// One k of a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub k: usize,
    /// Inertia for K-Means, total L1 cost for K-Medoids
    pub cost: f64,
    pub dbi: f64,
    pub n_iter: usize,
}

/// Curves for both partitioners over the same k range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub k_min: usize,
    pub k_max: usize,
    pub n_samples: usize,
    pub kmeans: Vec<SweepPoint>,
    pub kmedoids: Vec<SweepPoint>,
}

impl SweepReport {
    pub fn points(&self, algorithm: Algorithm) -> &[SweepPoint] {
        match algorithm {
            Algorithm::KMeans => &self.kmeans,
            Algorithm::KMedoids => &self.kmedoids,
        }
    }

    /// The k with the lowest DBI; earliest k wins a tie
    pub fn best_k(&self, algorithm: Algorithm) -> Option<usize> {
        self.points(algorithm)
            .iter()
            .min_by(|a, b| a.dbi.total_cmp(&b.dbi).then(a.k.cmp(&b.k)))
            .map(|p| p.k)
    }
}

/// Check a sweep range before any fitting starts
pub fn validate_sweep_range(k_min: usize, k_max: usize, n_samples: usize) -> EngineResult<()> {
    if k_min < MIN_SWEEP_K {
        return Err(EngineError::config(format!(
            "k_min must be at least {MIN_SWEEP_K}, got {k_min}"
        )));
    }
    if k_max < k_min {
        return Err(EngineError::config(format!(
            "k_max ({k_max}) must not be less than k_min ({k_min})"
        )));
    }
    if k_max > MAX_SWEEP_K {
        return Err(EngineError::config(format!(
            "k_max must be at most {MAX_SWEEP_K}, got {k_max}"
        )));
    }
    if k_max > n_samples {
        return Err(EngineError::config(format!(
            "k_max ({k_max}) exceeds the number of samples ({n_samples})"
        )));
    }
    Ok(())
}

/// Sweep both partitioners over `k_min..=k_max` with default settings
pub fn sweep(features: &Array2<f64>, k_min: usize, k_max: usize) -> EngineResult<SweepReport> {
    sweep_with(features, k_min, k_max, &FitParams::new(k_min))
}

/// Sweep both partitioners; every k shares the seed, tolerance and cap in `params`.
///
/// `params.n_clusters` is ignored and history is never recorded.
pub fn sweep_with(
    features: &Array2<f64>,
    k_min: usize,
    k_max: usize,
    params: &FitParams,
) -> EngineResult<SweepReport> {
    validate_sweep_range(k_min, k_max, features.nrows())?;
    info!(
        "Sweeping k = {}..={} over {} samples",
        k_min,
        k_max,
        features.nrows()
    );

    Ok(SweepReport {
        k_min,
        k_max,
        n_samples: features.nrows(),
        kmeans: sweep_algorithm(features, Algorithm::KMeans, k_min, k_max, params)?,
        kmedoids: sweep_algorithm(features, Algorithm::KMedoids, k_min, k_max, params)?,
    })
}

fn sweep_algorithm(
    features: &Array2<f64>,
    algorithm: Algorithm,
    k_min: usize,
    k_max: usize,
    params: &FitParams,
) -> EngineResult<Vec<SweepPoint>> {
    let mut points = Vec::with_capacity(k_max - k_min + 1);
    for k in k_min..=k_max {
        let params = FitParams {
            record_history: false,
            ..params.with_k(k)
        };
        let model = fit_partition(algorithm, features, &params)?;
        let point = SweepPoint {
            k,
            cost: model.cost(),
            dbi: model.quality(features)?,
            n_iter: model.n_iter(),
        };
        debug!(
            "{} k={}: cost={:.4}, dbi={:.4}, iterations={}",
            algorithm, k, point.cost, point.dbi, point.n_iter
        );
        points.push(point);
    }
    Ok(points)
}
