//! Conversion of raw cluster labels into business tiers

use crate::aggregate::AggregatedBucket;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Business sales tier, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    LowSeller,
    Medium,
    TopSeller,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::TopSeller, Tier::Medium, Tier::LowSeller];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::TopSeller => write!(f, "Top Seller"),
            Tier::Medium => write!(f, "Medium"),
            Tier::LowSeller => write!(f, "Low Seller"),
        }
    }
}

/// Composite-score weights and percentile cut points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileParams {
    /// Weight of min-max normalized quantity
    pub quantity_weight: f64,
    /// Weight of min-max normalized monetary total
    pub monetary_weight: f64,
    /// Scores below this percentile are Low Seller
    pub lower_percentile: f64,
    /// Scores at or above this percentile are Top Seller
    pub upper_percentile: f64,
}

impl Default for PercentileParams {
    fn default() -> Self {
        Self {
            quantity_weight: 0.6,
            monetary_weight: 0.4,
            lower_percentile: 0.30,
            upper_percentile: 0.70,
        }
    }
}

impl PercentileParams {
    pub fn validate(&self) -> EngineResult<()> {
        let weights = [self.quantity_weight, self.monetary_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0
        {
            return Err(EngineError::config(format!(
                "composite weights must be non-negative and not both zero, got {} and {}",
                self.quantity_weight, self.monetary_weight
            )));
        }
        let (lo, hi) = (self.lower_percentile, self.upper_percentile);
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(EngineError::config(format!(
                "percentiles must satisfy 0 <= lower <= upper <= 1, got {lo} and {hi}"
            )));
        }
        Ok(())
    }
}

/// How raw partitions are turned into tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TierPolicy {
    /// Rank clusters by summed quantity: lowest Low Seller, highest Top Seller
    RankByVolume,
    /// Percentile bands of a weighted quantity/monetary score, independent of the labels
    Percentile(PercentileParams),
}

impl Default for TierPolicy {
    fn default() -> Self {
        TierPolicy::Percentile(PercentileParams::default())
    }
}

impl TierPolicy {
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            TierPolicy::RankByVolume => Ok(()),
            TierPolicy::Percentile(params) => params.validate(),
        }
    }
}

impl fmt::Display for TierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierPolicy::RankByVolume => write!(f, "rank-by-volume"),
            TierPolicy::Percentile(p) => write!(
                f,
                "percentile (P{:.0}/P{:.0})",
                p.lower_percentile * 100.0,
                p.upper_percentile * 100.0
            ),
        }
    }
}

/// Tier of one bucket and the number that put it there
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub tier: Tier,
    /// Cluster quantity total (rank policy) or composite score (percentile policy)
    pub basis: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub top_seller: usize,
    pub medium: usize,
    pub low_seller: usize,
}

/// Tiers for every bucket, tagged with the policy that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierOutcome {
    pub policy: TierPolicy,
    pub assignments: Vec<TierAssignment>,
    /// (lower, upper) score thresholds, percentile policy only
    pub thresholds: Option<(f64, f64)>,
}

impl TierOutcome {
    pub fn counts(&self) -> TierCounts {
        let mut counts = TierCounts::default();
        for a in &self.assignments {
            match a.tier {
                Tier::TopSeller => counts.top_seller += 1,
                Tier::Medium => counts.medium += 1,
                Tier::LowSeller => counts.low_seller += 1,
            }
        }
        counts
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.assignments.iter().map(|a| a.tier).collect()
    }
}

/// Assign a tier to every bucket.
///
/// # Arguments
/// * `buckets` - Aggregated buckets, in feature-matrix order
/// * `labels` - Cluster label of each bucket
/// * `policy` - Strategy used to derive tiers
pub fn assign_tiers(
    buckets: &[AggregatedBucket],
    labels: &[usize],
    policy: &TierPolicy,
) -> EngineResult<TierOutcome> {
    if buckets.len() != labels.len() {
        return Err(EngineError::ShapeMismatch {
            expected: format!("{} labels", buckets.len()),
            actual: format!("{} labels", labels.len()),
        });
    }

    match policy {
        TierPolicy::RankByVolume => Ok(TierOutcome {
            policy: *policy,
            assignments: rank_by_volume(buckets, labels),
            thresholds: None,
        }),
        TierPolicy::Percentile(params) => {
            params.validate()?;
            let scores = composite_scores(buckets, params);
            let (assignments, thresholds) = percentile_bands(&scores, params);
            Ok(TierOutcome {
                policy: *policy,
                assignments,
                thresholds: Some(thresholds),
            })
        }
    }
}

fn rank_by_volume(buckets: &[AggregatedBucket], labels: &[usize]) -> Vec<TierAssignment> {
    let mut totals: BTreeMap<usize, u64> = BTreeMap::new();
    for (bucket, &label) in buckets.iter().zip(labels) {
        let total = totals.entry(label).or_insert(0);
        *total = total.saturating_add(bucket.quantity);
    }

    // Ties on volume fall back to cluster id so the order never depends on map iteration
    let mut ranked: Vec<(usize, u64)> = totals.into_iter().collect();
    ranked.sort_by_key(|&(cluster, total)| (total, cluster));

    let last = ranked.len().saturating_sub(1);
    let tier_of: BTreeMap<usize, (Tier, u64)> = ranked
        .iter()
        .enumerate()
        .map(|(rank, &(cluster, total))| {
            let tier = if ranked.len() == 1 {
                Tier::Medium
            } else if rank == 0 {
                Tier::LowSeller
            } else if rank == last {
                Tier::TopSeller
            } else {
                Tier::Medium
            };
            (cluster, (tier, total))
        })
        .collect();

    labels
        .iter()
        .map(|label| {
            let (tier, total) = tier_of[label];
            TierAssignment {
                tier,
                basis: total as f64,
            }
        })
        .collect()
}

/// Weighted blend of min-max normalized quantity and monetary totals
pub fn composite_scores(buckets: &[AggregatedBucket], params: &PercentileParams) -> Vec<f64> {
    let quantities: Vec<f64> = buckets.iter().map(|b| b.quantity as f64).collect();
    let monetary: Vec<f64> = buckets.iter().map(|b| b.monetary).collect();
    let q_norm = min_max(&quantities);
    let m_norm = min_max(&monetary);

    q_norm
        .iter()
        .zip(&m_norm)
        .map(|(q, m)| params.quantity_weight * q + params.monetary_weight * m)
        .collect()
}

fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values
        .iter()
        .map(|v| (v - min) / (max - min + 1e-8))
        .collect()
}

fn percentile_bands(
    scores: &[f64],
    params: &PercentileParams,
) -> (Vec<TierAssignment>, (f64, f64)) {
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let lower = quantile(&sorted, params.lower_percentile);
    let upper = quantile(&sorted, params.upper_percentile);

    let assignments = scores
        .iter()
        .map(|&score| {
            let tier = if score >= upper {
                Tier::TopSeller
            } else if score >= lower {
                Tier::Medium
            } else {
                Tier::LowSeller
            };
            TierAssignment { tier, basis: score }
        })
        .collect();

    (assignments, (lower, upper))
}

/// Linearly interpolated quantile of an ascending slice; `NaN` when empty
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = position.floor() as usize;
            let hi = position.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (position - lo as f64)
        }
    }
}
