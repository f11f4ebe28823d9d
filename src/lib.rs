//! TierForge: clustering engine that sorts aggregated sales buckets into business tiers
//!
//! Sales records are grouped into (category, size-range) buckets, normalized, and
//! partitioned with K-Means or K-Medoids. Partitions are scored with the
//! Davies–Bouldin index and converted into Top Seller / Medium / Low Seller tiers.

pub mod aggregate;
pub mod cli;
pub mod data;
pub mod error;
pub mod kmeans;
pub mod kmedoids;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod sweep;
pub mod tier;
pub mod viz;

// Re-export public items for easier access
pub use aggregate::{aggregate, AggregatedBucket, AggregationOutcome, BucketKey, CategoryType};
pub use cli::Args;
pub use data::{load_sales_records, SalesRecord};
pub use error::{EngineError, EngineResult};
pub use kmeans::{fit_kmeans, KMeans, KMeansModel};
pub use kmedoids::{fit_kmedoids, KMedoids, KMedoidsModel};
pub use metrics::davies_bouldin_index;
pub use model::{fit_partition, predict_cluster, Algorithm, FitParams, Partition, StopReason};
pub use normalize::{normalize, FeatureSet};
pub use pipeline::{run_pipeline, PipelineConfig, RunReport, SegmentReport, Segmentation};
pub use sweep::{sweep, sweep_with, SweepReport};
pub use tier::{assign_tiers, Tier, TierPolicy};
pub use viz::create_tier_scatter;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
