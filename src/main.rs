//! TierForge: sales tier clustering CLI
//!
//! This is the main entrypoint that orchestrates record loading, aggregation,
//! clustering, tier assignment, visualization, sweeps and prediction.

#[macro_use]
extern crate log;

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tierforge::aggregate::aggregate;
use tierforge::pipeline::write_json;
use tierforge::{
    fit_partition, load_sales_records, predict_cluster, run_pipeline, sweep_with, viz, Algorithm,
    Args, FeatureSet, RunReport,
};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .init();

    info!("starting");
    debug!("params: {:#?}", args);

    if let Some(values) = args.parse_predict_values()? {
        run_prediction_mode(&args, values)?;
    } else if let Some((k_min, k_max)) = args.parse_sweep_range()? {
        run_sweep_mode(&args, k_min, k_max)?;
    } else {
        run_full_pipeline(&args)?;
    }

    info!("finished");
    Ok(())
}

/// Fit the combined buckets and predict the cluster of one new observation
fn run_prediction_mode(args: &Args, values: [f64; 2]) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!("Input values: Quantity={}, Monetary={}", values[0], values[1]);

    let start_time = Instant::now();
    let config = args.pipeline_config();

    info!("Loading training data from: {}", args.input);
    let records = load_sales_records(&args.input)?;
    let outcome = aggregate(&records, config.bucket_width)?;
    let feature_set = FeatureSet::from_buckets(&outcome.buckets)?;
    info!(
        "Loaded {} records into {} buckets",
        records.len(),
        feature_set.n_samples()
    );

    for algorithm in args.algorithms() {
        let model = fit_partition(algorithm, &feature_set.features, &config.fit_params())?;
        let cluster = predict_cluster(model.as_ref(), &feature_set, &values)?;

        let cluster_sizes = model.cluster_sizes();
        let percentage =
            (cluster_sizes[cluster] as f64 / feature_set.n_samples() as f64) * 100.0;
        let representative = feature_set
            .scaler
            .inverse_transform(model.representatives())?;

        println!("\n✓ {} predicted cluster: {}", algorithm, cluster);
        println!(
            "  Size: {} buckets ({:.1}% of total)",
            cluster_sizes[cluster], percentage
        );
        println!(
            "  Representative: Quantity={:.1}, Monetary={:.2}",
            representative[[cluster, 0]],
            representative[[cluster, 1]]
        );
    }

    println!(
        "\n  Processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Run both algorithms across a range of k and draw the elbow chart
fn run_sweep_mode(args: &Args, k_min: usize, k_max: usize) -> Result<()> {
    println!("=== Sweep k = {}..={} ===\n", k_min, k_max);

    let start_time = Instant::now();
    let config = args.pipeline_config();

    let records = load_sales_records(&args.input)?;
    let outcome = aggregate(&records, config.bucket_width)?;
    let feature_set = FeatureSet::from_buckets(&outcome.buckets)?;
    println!(
        "✓ Data loaded: {} records, {} buckets ({} dropped)",
        records.len(),
        feature_set.n_samples(),
        outcome.dropped_count()
    );

    let report = sweep_with(&feature_set.features, k_min, k_max, &config.fit_params())?;
    viz::print_sweep_summary(&report);
    viz::create_elbow_chart(&report, &args.output)?;

    if let Some(ref path) = args.report {
        write_json(&report, path)?;
        println!("Sweep report saved to: {}", path);
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Run full clustering pipeline
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Full Clustering Pipeline ===\n");

    let start_time = Instant::now();
    let config = args.pipeline_config();

    // Step 1: Load records
    info!("Input file: {}", args.input);
    let data_start = Instant::now();
    let records = load_sales_records(&args.input)?;
    println!("✓ Data loaded: {} records", records.len());
    debug!("Loading time: {:.2}s", data_start.elapsed().as_secs_f64());

    // Step 2: Cluster and tier with each algorithm
    let algorithms = args.algorithms();
    let mut reports: Vec<RunReport> = Vec::with_capacity(algorithms.len());
    for algorithm in algorithms.iter().copied() {
        let model_start = Instant::now();
        let report = run_pipeline(&records, algorithm, &config)?;
        println!(
            "✓ {} fitted: {} buckets, {} record(s) dropped",
            algorithm, report.n_buckets, report.dropped_records
        );
        debug!("Fitting time: {:.2}s", model_start.elapsed().as_secs_f64());

        // Step 3: Charts and statistics
        let plot_path = if algorithms.len() > 1 {
            viz::suffixed_path(&args.output, algorithm_slug(algorithm))
        } else {
            args.output.clone()
        };
        viz::generate_visualization_report(&report, &plot_path)?;
        reports.push(report);
    }

    if let Some(ref path) = args.report {
        write_json(&reports, path)?;
        println!("\nRun report saved to: {}", path);
    }

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn algorithm_slug(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::KMeans => "kmeans",
        Algorithm::KMedoids => "kmedoids",
    }
}
