//! Visualization functions using Plotters for tier and sweep reports

use crate::model::Algorithm;
use crate::pipeline::{RunReport, SegmentReport};
use crate::sweep::{SweepPoint, SweepReport};
use crate::tier::Tier;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::borrow::Cow;
use std::path::Path;

/// Color of each tier in every chart
fn tier_color(tier: Tier) -> RGBColor {
    match tier {
        Tier::TopSeller => RGBColor(46, 139, 87),
        Tier::Medium => RGBColor(65, 105, 225),
        Tier::LowSeller => RGBColor(220, 20, 60),
    }
}

fn algorithm_color(algorithm: Algorithm) -> RGBColor {
    match algorithm {
        Algorithm::KMeans => RED,
        Algorithm::KMedoids => BLUE,
    }
}

/// Padded axis range; a single value still gets a visible span
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if max > min { (max - min) * 0.05 } else { max.abs().max(1.0) * 0.5 };
    (min - pad, max + pad)
}

/// Create scatter plot of buckets colored by tier
///
/// # Arguments
/// * `segment` - Clustered segment to draw
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
///
/// # Returns
/// * Result indicating success or failure
pub fn create_tier_scatter(
    segment: &SegmentReport,
    output_path: &str,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    let default_title = format!(
        "{} Tiers ({}): Quantity vs Monetary",
        segment.algorithm,
        segment.label()
    );
    let title = plot_title.unwrap_or(&default_title);

    let (x_min, x_max) = padded_range(
        segment
            .buckets
            .iter()
            .map(|b| b.quantity as f64)
            .chain(segment.clusters.iter().map(|c| c.representative[0])),
    );
    let (y_min, y_max) = padded_range(
        segment
            .buckets
            .iter()
            .map(|b| b.monetary)
            .chain(segment.clusters.iter().map(|c| c.representative[1])),
    );

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Quantity sold")
        .y_desc("Monetary total")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for tier in Tier::ALL {
        let color = tier_color(tier);
        let points: Vec<(f64, f64)> = segment
            .buckets
            .iter()
            .filter(|b| b.tier == tier)
            .map(|b| (b.quantity as f64, b.monetary))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 5, color.filled())))?
            .label(tier.to_string())
            .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
    }

    // Representatives as black squares tagged with their cluster id
    chart
        .draw_series(segment.clusters.iter().map(|c| {
            EmptyElement::at((c.representative[0], c.representative[1]))
                + Rectangle::new([(-5, -5), (5, 5)], BLACK.filled())
                + Text::new(format!("C{}", c.cluster_id), (8, -14), ("sans-serif", 14))
        }))?
        .label(match segment.algorithm {
            Algorithm::KMeans => "Centroid",
            Algorithm::KMedoids => "Medoid",
        })
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLACK.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    println!("Tier scatter saved to: {}", output_path);

    Ok(())
}

fn tier_axis_label(x: &f64) -> String {
    let rounded = x.round();
    if (x - rounded).abs() > 1e-6 {
        return String::new();
    }
    match rounded as i64 {
        0 => Tier::TopSeller.to_string(),
        1 => Tier::Medium.to_string(),
        2 => Tier::LowSeller.to_string(),
        _ => String::new(),
    }
}

/// Create a bar chart of bucket counts per tier
pub fn create_tier_size_chart(segment: &SegmentReport, output_path: &str) -> crate::Result<()> {
    let counts = segment.tier_counts;
    let sizes = [counts.top_seller, counts.medium, counts.low_seller];
    let max_size = sizes.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Tier Sizes ({})", segment.label()), ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..2.5f64, 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_labels(7)
        .x_label_formatter(&tier_axis_label)
        .y_desc("Number of buckets")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (position, (tier, &size)) in Tier::ALL.iter().zip(sizes.iter()).enumerate() {
        let x = position as f64;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.4, 0.0), (x + 0.4, size as f64)],
            tier_color(*tier).filled(),
        )))?;
    }

    root.present()?;
    println!("Tier size chart saved to: {}", output_path);

    Ok(())
}

fn draw_curve_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    sweep: &SweepReport,
    title: &str,
    metric: fn(&SweepPoint) -> f64,
) -> crate::Result<()> {
    let (_, y_max) = padded_range(sweep.kmeans.iter().chain(&sweep.kmedoids).map(metric));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (sweep.k_min as f64 - 0.5)..(sweep.k_max as f64 + 0.5),
            0f64..y_max.max(1e-9),
        )?;

    chart
        .configure_mesh()
        .x_desc("k")
        .y_desc(title)
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
        let color = algorithm_color(algorithm);
        let points: Vec<(f64, f64)> = sweep
            .points(algorithm)
            .iter()
            .map(|p| (p.k as f64, metric(p)))
            .collect();

        chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))?
            .label(algorithm.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

/// Elbow chart: cost and Davies–Bouldin index against k for both algorithms
pub fn create_elbow_chart(sweep: &SweepReport, output_path: &str) -> crate::Result<()> {
    let root = BitMapBackend::new(output_path, (1200, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let panels = root.split_evenly((1, 2));
    draw_curve_panel(&panels[0], sweep, "Cost (inertia / L1)", |p| p.cost)?;
    draw_curve_panel(&panels[1], sweep, "Davies-Bouldin index", |p| p.dbi)?;

    root.present()?;
    println!("Elbow chart saved to: {}", output_path);

    Ok(())
}

/// Print segment statistics to console
pub fn print_segment_statistics(segment: &SegmentReport) {
    println!("\n=== {} Statistics ({}) ===", segment.algorithm, segment.label());
    println!("Number of clusters: {}", segment.n_clusters);
    println!("Total buckets: {}", segment.n_samples);
    println!(
        "Iterations: {} of {} ({:?})",
        segment.n_iter, segment.max_iterations, segment.stop_reason
    );
    match segment.algorithm {
        Algorithm::KMeans => {
            println!("Within-cluster sum of squares (Inertia): {:.4}", segment.cost)
        }
        Algorithm::KMedoids => println!("Total L1 cost: {:.4}", segment.cost),
    }
    println!("Davies-Bouldin index: {:.4}", segment.dbi);

    println!("\nClusters (original units):");
    println!("  Cluster | Buckets | Quantity | Monetary       | Representative");
    println!("  --------|---------|----------|----------------|---------------");
    for cluster in &segment.clusters {
        println!(
            "  {:7} | {:7} | {:8} | {:14.2} | ({:.1}, {:.1})",
            cluster.cluster_id,
            cluster.size,
            cluster.quantity,
            cluster.monetary,
            cluster.representative[0],
            cluster.representative[1]
        );
    }

    let total = segment.n_samples.max(1) as f64;
    let counts = segment.tier_counts;
    println!("\nTiers ({}):", segment.tier_policy);
    for (tier, count) in [
        (Tier::TopSeller, counts.top_seller),
        (Tier::Medium, counts.medium),
        (Tier::LowSeller, counts.low_seller),
    ] {
        println!(
            "  {:10}: {} buckets ({:.1}%)",
            tier.to_string(),
            count,
            count as f64 / total * 100.0
        );
    }
    if let Some((lower, upper)) = segment.thresholds {
        println!("  Score thresholds: low < {:.4} <= medium < {:.4} <= top", lower, upper);
    }
}

/// Print the sweep curves to console
pub fn print_sweep_summary(sweep: &SweepReport) {
    println!(
        "\n=== Sweep k = {}..={} ({} samples) ===",
        sweep.k_min, sweep.k_max, sweep.n_samples
    );
    for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
        println!("\n{}:", algorithm);
        println!("  k  | Cost         | DBI     | Iterations");
        println!("  ---|--------------|---------|-----------");
        for p in sweep.points(algorithm) {
            println!("  {:2} | {:12.4} | {:7.4} | {}", p.k, p.cost, p.dbi, p.n_iter);
        }
        if let Some(k) = sweep.best_k(algorithm) {
            println!("  Lowest DBI at k = {}", k);
        }
    }
}

/// Insert `_{suffix}` between a file's stem and its extension.
///
/// Paths without an extension get `.png`.
pub fn suffixed_path(path: &str, suffix: &str) -> String {
    let path = Path::new(path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or(Cow::Borrowed("png"));
    path.with_file_name(format!("{}_{}.{}", stem, suffix, extension))
        .to_string_lossy()
        .into_owned()
}

/// Draw scatter and tier-size charts for every segment and print their statistics.
///
/// With several segments, each chart path gets the segment name as a suffix.
pub fn generate_visualization_report(
    report: &RunReport,
    base_output_path: &str,
) -> crate::Result<()> {
    let single = report.segments.len() == 1;
    for segment in &report.segments {
        let plot_path = if single {
            base_output_path.to_string()
        } else {
            let suffix = segment.label().to_lowercase().replace(' ', "_");
            suffixed_path(base_output_path, &suffix)
        };
        create_tier_scatter(segment, &plot_path, None)?;

        let size_chart_path = suffixed_path(&plot_path, "sizes");
        create_tier_size_chart(segment, &size_chart_path)?;

        print_segment_statistics(segment);
    }

    Ok(())
}
