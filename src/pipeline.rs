//! End-to-end clustering run: aggregate, normalize, partition, score and tier

use crate::aggregate::{
    aggregate, split_by_category_type, AggregatedBucket, CategoryType, DEFAULT_BUCKET_WIDTH,
};
use crate::data::{summarize_records, RecordSummary, SalesRecord};
use crate::error::{validate_k, EngineError, EngineResult};
use crate::kmeans::{DEFAULT_MAX_ITERATIONS, DEFAULT_SEED, DEFAULT_TOLERANCE};
use crate::metrics::euclidean_distance;
use crate::model::{
    fit_partition, to_rows, Algorithm, FitParams, IterationRecord, Partition, StopReason,
};
use crate::normalize::FeatureSet;
use crate::tier::{assign_tiers, Tier, TierCounts, TierOutcome, TierPolicy};
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;

/// Whether buckets are clustered together or once per category type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    #[default]
    Combined,
    ByCategoryType,
}

impl fmt::Display for Segmentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segmentation::Combined => write!(f, "combined"),
            Segmentation::ByCategoryType => write!(f, "by category type"),
        }
    }
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub n_clusters: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    pub tier_policy: TierPolicy,
    pub bucket_width: u64,
    pub segmentation: Segmentation,
    /// Keep per-iteration snapshots in the report
    pub record_history: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            seed: DEFAULT_SEED,
            tier_policy: TierPolicy::default(),
            bucket_width: DEFAULT_BUCKET_WIDTH,
            segmentation: Segmentation::Combined,
            record_history: false,
        }
    }
}

impl PipelineConfig {
    pub fn fit_params(&self) -> FitParams {
        FitParams {
            n_clusters: self.n_clusters,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            seed: self.seed,
            record_history: self.record_history,
        }
    }
}

/// Per-bucket outcome handed to the persistence and reporting layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketResult {
    pub category: String,
    pub size_range: String,
    pub category_type: CategoryType,
    pub quantity: u64,
    pub monetary: f64,
    pub n_records: usize,
    pub cluster_id: usize,
    pub tier: Tier,
    /// Cluster volume (rank policy) or composite score (percentile policy)
    pub tier_basis: f64,
    /// Euclidean distance to the cluster representative, in normalized space
    pub distance_to_representative: f64,
    /// True when this bucket is its cluster's medoid
    pub is_representative: bool,
    pub avg_price_per_unit: f64,
    pub performance_score: Option<f64>,
    /// Composite score as a percentage of the mean score
    pub relative_performance: Option<f64>,
}

/// Size and totals of one raw cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub quantity: u64,
    pub monetary: f64,
    /// Centroid or medoid in original (quantity, monetary) units
    pub representative: Vec<f64>,
}

/// Result of clustering one set of buckets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    /// `None` for a combined run
    pub category_type: Option<CategoryType>,
    pub algorithm: Algorithm,
    pub n_clusters: usize,
    pub n_samples: usize,
    pub n_iter: usize,
    pub max_iterations: usize,
    pub stop_reason: StopReason,
    /// Inertia (K-Means) or total L1 cost (K-Medoids)
    pub cost: f64,
    pub dbi: f64,
    pub tier_policy: TierPolicy,
    pub thresholds: Option<(f64, f64)>,
    pub tier_counts: TierCounts,
    pub clusters: Vec<ClusterSummary>,
    pub buckets: Vec<BucketResult>,
    pub history: Option<Vec<IterationRecord>>,
}

impl SegmentReport {
    pub fn label(&self) -> String {
        match self.category_type {
            Some(kind) => kind.to_string(),
            None => "All".to_string(),
        }
    }
}

/// Everything produced by one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub algorithm: Algorithm,
    pub config: PipelineConfig,
    pub records: RecordSummary,
    pub n_buckets: usize,
    /// Records excluded for an unparsable size
    pub dropped_records: usize,
    pub segments: Vec<SegmentReport>,
}

/// Run the full pipeline for one algorithm.
///
/// Every segment is checked against `k` before any fitting starts.
///
/// # Arguments
/// * `records` - Raw sales rows
/// * `algorithm` - Partitioner to use
/// * `config` - Run settings
pub fn run_pipeline(
    records: &[SalesRecord],
    algorithm: Algorithm,
    config: &PipelineConfig,
) -> EngineResult<RunReport> {
    config.tier_policy.validate()?;
    let outcome = aggregate(records, config.bucket_width)?;
    if outcome.buckets.is_empty() {
        return Err(EngineError::config(format!(
            "none of the {} record(s) has a parsable size",
            records.len()
        )));
    }

    let segments: Vec<(Option<CategoryType>, Vec<AggregatedBucket>)> = match config.segmentation {
        Segmentation::Combined => vec![(None, outcome.buckets.clone())],
        Segmentation::ByCategoryType => split_by_category_type(&outcome.buckets)
            .into_iter()
            .map(|(kind, buckets)| (Some(kind), buckets))
            .collect(),
    };
    for (_, buckets) in &segments {
        validate_k(config.n_clusters, buckets.len())?;
    }

    info!(
        "{}: {} bucket(s) from {} record(s), {} dropped, segmentation {}",
        algorithm,
        outcome.buckets.len(),
        records.len(),
        outcome.dropped_count(),
        config.segmentation
    );

    let reports = segments
        .iter()
        .map(|(kind, buckets)| cluster_buckets(buckets, *kind, algorithm, config))
        .collect::<EngineResult<Vec<_>>>()?;

    Ok(RunReport {
        generated_at: Utc::now(),
        algorithm,
        config: config.clone(),
        records: summarize_records(records),
        n_buckets: outcome.buckets.len(),
        dropped_records: outcome.dropped_count(),
        segments: reports,
    })
}

/// Normalize, partition, score and tier one group of buckets
pub fn cluster_buckets(
    buckets: &[AggregatedBucket],
    category_type: Option<CategoryType>,
    algorithm: Algorithm,
    config: &PipelineConfig,
) -> EngineResult<SegmentReport> {
    let feature_set = FeatureSet::from_buckets(buckets)?;
    let model = fit_partition(algorithm, &feature_set.features, &config.fit_params())?;
    let dbi = model.quality(&feature_set.features)?;
    let tiers = assign_tiers(buckets, model.labels(), &config.tier_policy)?;

    info!(
        "{} [{}] k={}: {} iteration(s) ({:?}), cost {:.4}, DBI {:.4}",
        algorithm,
        category_type.map_or_else(|| "All".to_string(), |k| k.to_string()),
        model.n_clusters(),
        model.n_iter(),
        model.stop_reason(),
        model.cost(),
        dbi
    );

    Ok(SegmentReport {
        category_type,
        algorithm,
        n_clusters: model.n_clusters(),
        n_samples: feature_set.n_samples(),
        n_iter: model.n_iter(),
        max_iterations: model.max_iterations(),
        stop_reason: model.stop_reason(),
        cost: model.cost(),
        dbi,
        tier_policy: tiers.policy,
        thresholds: tiers.thresholds,
        tier_counts: tiers.counts(),
        clusters: cluster_summaries(buckets, model.as_ref(), &feature_set)?,
        buckets: bucket_results(buckets, model.as_ref(), &feature_set, &tiers),
        history: model.history().map(<[IterationRecord]>::to_vec),
    })
}

fn cluster_summaries(
    buckets: &[AggregatedBucket],
    model: &dyn Partition,
    feature_set: &FeatureSet,
) -> EngineResult<Vec<ClusterSummary>> {
    let representatives = to_rows(&feature_set.scaler.inverse_transform(model.representatives())?);
    let sizes = model.cluster_sizes();

    Ok(representatives
        .into_iter()
        .enumerate()
        .map(|(cluster_id, representative)| {
            let members = buckets
                .iter()
                .zip(model.labels())
                .filter(|(_, &label)| label == cluster_id)
                .map(|(bucket, _)| bucket);
            let (quantity, monetary) = members.fold((0u64, 0.0), |(q, m), b| {
                (q.saturating_add(b.quantity), m + b.monetary)
            });
            ClusterSummary {
                cluster_id,
                size: sizes[cluster_id],
                quantity,
                monetary,
                representative,
            }
        })
        .collect())
}

fn bucket_results(
    buckets: &[AggregatedBucket],
    model: &dyn Partition,
    feature_set: &FeatureSet,
    tiers: &TierOutcome,
) -> Vec<BucketResult> {
    let is_percentile = matches!(tiers.policy, TierPolicy::Percentile(_));
    let mean_score = if is_percentile && !tiers.assignments.is_empty() {
        tiers.assignments.iter().map(|a| a.basis).sum::<f64>() / tiers.assignments.len() as f64
    } else {
        0.0
    };
    let medoids = model.medoid_indices().unwrap_or(&[]);
    let representatives = model.representatives();

    buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| {
            let cluster_id = model.labels()[i];
            let assignment = tiers.assignments[i];
            let (performance_score, relative_performance) = if is_percentile {
                let relative = if mean_score > 0.0 {
                    assignment.basis / mean_score * 100.0
                } else {
                    100.0
                };
                (Some(assignment.basis), Some(relative))
            } else {
                (None, None)
            };

            BucketResult {
                category: bucket.key.category.clone(),
                size_range: bucket.key.size_range.clone(),
                category_type: bucket.category_type(),
                quantity: bucket.quantity,
                monetary: bucket.monetary,
                n_records: bucket.record_indices.len(),
                cluster_id,
                tier: assignment.tier,
                tier_basis: assignment.basis,
                distance_to_representative: euclidean_distance(
                    &feature_set.features.row(i),
                    &representatives.row(cluster_id),
                ),
                is_representative: medoids.get(cluster_id) == Some(&i),
                avg_price_per_unit: bucket.avg_price_per_unit(),
                performance_score,
                relative_performance,
            }
        })
        .collect()
}

/// Serialize any report as pretty-printed JSON
pub fn write_json<T: Serialize>(value: &T, path: &str) -> crate::Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON to {}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<SalesRecord> {
        vec![
            SalesRecord::new("Standard", "10 cm", 120, 1_200_000.0),
            SalesRecord::new("Standard", "12 cm", 80, 800_000.0),
            SalesRecord::new("Standard", "22 cm", 15, 300_000.0),
            SalesRecord::new("Standard", "31 cm", 3, 90_000.0),
            SalesRecord::new("Custom", "10 cm", 40, 600_000.0),
            SalesRecord::new("Custom", "17 cm", 8, 160_000.0),
            SalesRecord::new("Custom", "25 cm", 2, 70_000.0),
            SalesRecord::new("Custom", "44 cm", 1, 50_000.0),
            SalesRecord::new("Custom", "big", 5, 10_000.0),
        ]
    }

    #[test]
    fn test_combined_run() {
        let records = sample_records();
        let report = run_pipeline(&records, Algorithm::KMeans, &PipelineConfig::default()).unwrap();

        assert_eq!(report.dropped_records, 1);
        assert_eq!(report.n_buckets, 7);
        assert_eq!(report.records.n_records, 9);
        assert_eq!(report.segments.len(), 1);

        let segment = &report.segments[0];
        assert_eq!(segment.label(), "All");
        assert_eq!(segment.buckets.len(), 7);
        assert_eq!(segment.clusters.len(), 3);
        assert_eq!(segment.clusters.iter().map(|c| c.size).sum::<usize>(), 7);
        assert!(segment.dbi >= 0.0);
        assert!(segment.n_iter <= segment.max_iterations);
        assert!(segment.history.is_none());

        let counts = segment.tier_counts;
        assert_eq!(counts.top_seller + counts.medium + counts.low_seller, 7);
        assert!(segment.buckets.iter().all(|b| b.performance_score.is_some()));
        assert!(segment.buckets.iter().all(|b| !b.is_representative));
    }

    #[test]
    fn test_cluster_totals_match_buckets() {
        let records = sample_records();
        let report =
            run_pipeline(&records, Algorithm::KMedoids, &PipelineConfig::default()).unwrap();
        let segment = &report.segments[0];

        let total: u64 = segment.clusters.iter().map(|c| c.quantity).sum();
        assert_eq!(total, segment.buckets.iter().map(|b| b.quantity).sum::<u64>());

        // Each medoid bucket sits exactly on its representative
        let medoids: Vec<&BucketResult> =
            segment.buckets.iter().filter(|b| b.is_representative).collect();
        assert_eq!(medoids.len(), 3);
        for bucket in medoids {
            assert!(bucket.distance_to_representative.abs() < 1e-12);
            let cluster = &segment.clusters[bucket.cluster_id];
            assert!((cluster.representative[0] - bucket.quantity as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn test_segmented_run() {
        let records = sample_records();
        let config = PipelineConfig {
            n_clusters: 2,
            segmentation: Segmentation::ByCategoryType,
            tier_policy: TierPolicy::RankByVolume,
            ..PipelineConfig::default()
        };
        let report = run_pipeline(&records, Algorithm::KMeans, &config).unwrap();

        let labels: Vec<String> = report.segments.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Standard", "Non-Standard"]);
        let sizes: Vec<usize> = report.segments.iter().map(|s| s.n_samples).collect();
        assert_eq!(sizes, vec![3, 4]);
        for segment in &report.segments {
            assert!(segment
                .buckets
                .iter()
                .all(|b| Some(b.category_type) == segment.category_type));
            assert!(segment.buckets.iter().all(|b| b.performance_score.is_none()));
        }
    }

    #[test]
    fn test_segment_smaller_than_k_fails_fast() {
        let records = vec![
            SalesRecord::new("Standard", "10", 5, 50.0),
            SalesRecord::new("Custom", "10", 5, 50.0),
            SalesRecord::new("Custom", "20", 5, 50.0),
            SalesRecord::new("Custom", "30", 5, 50.0),
        ];
        let config = PipelineConfig {
            segmentation: Segmentation::ByCategoryType,
            ..PipelineConfig::default()
        };
        let err = run_pipeline(&records, Algorithm::KMeans, &config).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_history_is_opt_in() {
        let records = sample_records();
        let config = PipelineConfig {
            record_history: true,
            ..PipelineConfig::default()
        };
        let report = run_pipeline(&records, Algorithm::KMedoids, &config).unwrap();
        let history = report.segments[0].history.as_ref().unwrap();
        assert_eq!(history[0].iteration, 0);
        assert!(history[0].labels.is_none());
        assert!(history[1].labels.is_some());
    }

    #[test]
    fn test_run_is_deterministic() {
        let records = sample_records();
        let config = PipelineConfig::default();
        let a = run_pipeline(&records, Algorithm::KMedoids, &config).unwrap();
        let b = run_pipeline(&records, Algorithm::KMedoids, &config).unwrap();
        assert_eq!(a.segments, b.segments);
    }

    #[test]
    fn test_write_json() {
        let records = sample_records();
        let report = run_pipeline(&records, Algorithm::KMeans, &PipelineConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report, path.to_str().unwrap()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["algorithm"], "KMeans");
        assert_eq!(value["config"]["tier_policy"]["policy"], "percentile");
        assert_eq!(value["segments"][0]["buckets"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_all_records_dropped_is_rejected() {
        let records = vec![
            SalesRecord::new("Standard", "big", 10, 100_000.0),
            SalesRecord::new("Custom", "huge", 4, 80_000.0),
        ];

        for segmentation in [Segmentation::Combined, Segmentation::ByCategoryType] {
            let config = PipelineConfig {
                segmentation,
                ..PipelineConfig::default()
            };
            for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
                let result = run_pipeline(&records, algorithm, &config);
                assert!(
                    matches!(result, Err(EngineError::InvalidConfiguration(_))),
                    "{segmentation:?} {algorithm:?}"
                );
            }
        }
    }
}
