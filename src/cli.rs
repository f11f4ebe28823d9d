//! Command-line interface definitions and argument parsing

use crate::model::Algorithm;
use crate::pipeline::{PipelineConfig, Segmentation};
use crate::tier::{PercentileParams, TierPolicy};
use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmChoice {
    Kmeans,
    Kmedoids,
    Both,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyChoice {
    /// Rank clusters by summed quantity
    Rank,
    /// P30/P70 bands of a 0.6 quantity / 0.4 monetary composite score
    Percentile,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentChoice {
    /// Cluster all buckets together
    Combined,
    /// Cluster Standard and Non-Standard categories separately
    CategoryType,
}

/// Sales tier clustering CLI using K-Means and K-Medoids on aggregated sales buckets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV (or JSON) file of sales records
    #[arg(short, long, default_value = "sales.csv")]
    pub input: String,

    /// Clustering algorithm to run
    #[arg(short, long, value_enum, default_value_t = AlgorithmChoice::Both)]
    pub algorithm: AlgorithmChoice,

    /// Number of clusters
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Output path for the visualization plot
    #[arg(short, long, default_value = "tiers.png")]
    pub output: String,

    /// Write the full run report as JSON to this path
    #[arg(long)]
    pub report: Option<String>,

    /// Prediction mode: provide quantity,monetary as comma-separated string
    /// Example: --predict "40,600000" for Quantity=40, Monetary=600000
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Sweep mode: run both algorithms for every k in KMIN,KMAX and draw an elbow chart
    #[arg(long)]
    pub sweep: Option<String>,

    /// Maximum iterations for either algorithm
    #[arg(long, default_value = "100")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Random seed for initialization and swap sampling
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// How clusters are turned into tiers
    #[arg(long, value_enum, default_value_t = PolicyChoice::Percentile)]
    pub tier_policy: PolicyChoice,

    /// Width of each size range
    #[arg(long, default_value = "5")]
    pub bucket_width: u64,

    /// Cluster all buckets together or per category type
    #[arg(long, value_enum, default_value_t = SegmentChoice::Combined)]
    pub segment: SegmentChoice,

    /// Record every iteration in the JSON report
    #[arg(long)]
    pub trace: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Algorithms selected by `--algorithm`
    pub fn algorithms(&self) -> Vec<Algorithm> {
        match self.algorithm {
            AlgorithmChoice::Kmeans => vec![Algorithm::KMeans],
            AlgorithmChoice::Kmedoids => vec![Algorithm::KMedoids],
            AlgorithmChoice::Both => vec![Algorithm::KMeans, Algorithm::KMedoids],
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            n_clusters: self.clusters,
            max_iterations: self.max_iters,
            tolerance: self.tolerance,
            seed: self.seed,
            tier_policy: match self.tier_policy {
                PolicyChoice::Rank => TierPolicy::RankByVolume,
                PolicyChoice::Percentile => TierPolicy::Percentile(PercentileParams::default()),
            },
            bucket_width: self.bucket_width,
            segmentation: match self.segment {
                SegmentChoice::Combined => Segmentation::Combined,
                SegmentChoice::CategoryType => Segmentation::ByCategoryType,
            },
            record_history: self.trace,
        }
    }

    /// Parse the sweep range
    /// Expected format: "kmin,kmax"
    pub fn parse_sweep_range(&self) -> crate::Result<Option<(usize, usize)>> {
        let Some(ref sweep_str) = self.sweep else {
            return Ok(None);
        };
        let parts: Vec<&str> = sweep_str.split(',').collect();
        if parts.len() != 2 {
            anyhow::bail!("Sweep range must be in format 'kmin,kmax'");
        }

        let k_min: usize = parts[0]
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid kmin value: {}", parts[0]))?;
        let k_max: usize = parts[1]
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid kmax value: {}", parts[1]))?;

        Ok(Some((k_min, k_max)))
    }

    /// Parse quantity and monetary values from the predict string
    /// Expected format: "quantity,monetary"
    pub fn parse_predict_values(&self) -> crate::Result<Option<[f64; 2]>> {
        if let Some(ref predict_str) = self.predict {
            let parts: Vec<&str> = predict_str.split(',').collect();
            if parts.len() != 2 {
                anyhow::bail!("Predict values must be in format 'quantity,monetary'");
            }

            let quantity: f64 = parts[0]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid quantity value: {}", parts[0]))?;
            let monetary: f64 = parts[1]
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid monetary value: {}", parts[1]))?;

            Ok(Some([quantity, monetary]))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args() -> Args {
        Args::parse_from(["tierforge", "--input", "test.csv"])
    }

    #[test]
    fn test_defaults_match_pipeline_defaults() {
        let args = test_args();
        assert_eq!(args.pipeline_config(), PipelineConfig::default());
        assert_eq!(args.algorithms(), vec![Algorithm::KMeans, Algorithm::KMedoids]);
    }

    #[test]
    fn test_pipeline_config_from_flags() {
        let args = Args::parse_from([
            "tierforge",
            "-a",
            "kmedoids",
            "-k",
            "4",
            "--tier-policy",
            "rank",
            "--segment",
            "category-type",
            "--seed",
            "7",
            "--trace",
        ]);
        let config = args.pipeline_config();
        assert_eq!(args.algorithms(), vec![Algorithm::KMedoids]);
        assert_eq!(config.n_clusters, 4);
        assert_eq!(config.seed, 7);
        assert_eq!(config.tier_policy, TierPolicy::RankByVolume);
        assert_eq!(config.segmentation, Segmentation::ByCategoryType);
        assert!(config.record_history);
    }

    #[test]
    fn test_parse_sweep_range() {
        let mut args = test_args();
        assert_eq!(args.parse_sweep_range().unwrap(), None);

        args.sweep = Some("2, 8".to_string());
        assert_eq!(args.parse_sweep_range().unwrap(), Some((2, 8)));

        args.sweep = Some("2".to_string());
        assert!(args.parse_sweep_range().is_err());

        args.sweep = Some("two,8".to_string());
        assert!(args.parse_sweep_range().is_err());
    }

    #[test]
    fn test_parse_predict_values() {
        let mut args = test_args();
        args.predict = Some("40,600000.5".to_string());

        let result = args.parse_predict_values().unwrap();
        assert_eq!(result, Some([40.0, 600000.5]));

        args.predict = None;
        let result = args.parse_predict_values().unwrap();
        assert_eq!(result, None);

        args.predict = Some("invalid".to_string());
        assert!(args.parse_predict_values().is_err());
    }
}
