//! Integration tests for TierForge

use std::io::Write;
use tempfile::NamedTempFile;
use tierforge::{
    aggregate, fit_partition, load_sales_records, predict_cluster, run_pipeline, sweep,
    Algorithm, EngineError, FeatureSet, FitParams, PipelineConfig, SalesRecord, Segmentation,
    Tier, TierPolicy,
};

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Kategori,Size,Jumlah_Terjual,Harga_Satuan,Total_Harga,Nama_Penjual,Kota_Tujuan"
    )
    .unwrap();

    // Standard tumblers, heavy volume in the small sizes
    writeln!(file, "Standard,10 cm,120,\"10.000\",\"1.200.000\",Andi,Bandung").unwrap();
    writeln!(file, "Standard,11 cm,60,\"10.000\",\"600.000\",Budi,Jakarta").unwrap();
    writeln!(file, "Standard,16 cm,45,\"12.000\",\"540.000\",Andi,Jakarta").unwrap();
    writeln!(file, "Standard,23 cm,9,\"15.000\",\"135.000\",Citra,Surabaya").unwrap();

    // Custom orders, fewer units at higher prices
    writeln!(file, "Custom,10 cm,30,\"25.000\",\"750.000\",Dewi,Bandung").unwrap();
    writeln!(file, "Custom,18cm,12,\"30.000\",\"360.000\",Andi,Medan").unwrap();
    writeln!(file, "Custom,27 cm,3,\"40.000\",\"120.000\",Budi,Bandung").unwrap();
    writeln!(file, "Custom,41 cm,1,\"60.000\",\"60.000\",Citra,Jakarta").unwrap();

    // Size that cannot be bucketed
    writeln!(file, "Custom,jumbo,5,\"50.000\",\"250.000\",Dewi,Medan").unwrap();

    file
}

fn volume_records(quantities: &[u64]) -> Vec<SalesRecord> {
    quantities
        .iter()
        .enumerate()
        .map(|(i, &q)| {
            let category = format!("{}", (b'A' + i as u8) as char);
            SalesRecord::new(&category, "10 cm", q, q as f64 * 1000.0)
        })
        .collect()
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let file_path = test_file.path().to_str().unwrap();

    let records = load_sales_records(file_path).unwrap();
    assert_eq!(records.len(), 9);

    for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
        let report = run_pipeline(&records, algorithm, &PipelineConfig::default()).unwrap();

        assert_eq!(report.algorithm, algorithm);
        assert_eq!(report.dropped_records, 1);
        assert_eq!(report.n_buckets, 7);
        assert_eq!(report.records.n_sellers, 4);
        assert_eq!(report.records.n_destinations, 4);

        let segment = &report.segments[0];
        assert_eq!(segment.n_clusters, 3);
        assert_eq!(segment.buckets.len(), 7);
        assert!(segment.buckets.iter().all(|b| b.cluster_id < 3));
        assert!(segment.dbi.is_finite() && segment.dbi >= 0.0);
        assert!(segment.cost.is_finite() && segment.cost >= 0.0);

        // The biggest bucket is always a top seller under the percentile policy
        let biggest = segment
            .buckets
            .iter()
            .max_by_key(|b| b.quantity)
            .unwrap();
        assert_eq!(biggest.category, "Standard");
        assert_eq!(biggest.size_range, "10-14 cm");
        assert_eq!(biggest.quantity, 180);
        assert_eq!(biggest.tier, Tier::TopSeller);
    }
}

#[test]
fn test_rank_by_volume_example() {
    let records = volume_records(&[5, 5, 100, 1, 1]);
    let config = PipelineConfig {
        tier_policy: TierPolicy::RankByVolume,
        ..PipelineConfig::default()
    };

    for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
        let first = run_pipeline(&records, algorithm, &config).unwrap();
        let second = run_pipeline(&records, algorithm, &config).unwrap();
        assert_eq!(first.segments, second.segments);

        let tiers: Vec<Tier> = first.segments[0].buckets.iter().map(|b| b.tier).collect();
        assert_eq!(tiers[2], Tier::TopSeller);
        assert_eq!(tiers[3], Tier::LowSeller);
        assert_eq!(tiers[4], Tier::LowSeller);
        assert_eq!(tiers[0], tiers[1]);
    }
}

#[test]
fn test_unparsable_size_is_dropped() {
    let mut records = volume_records(&[4, 8, 15, 16]);
    let before = aggregate(&records, 5).unwrap();

    records.push(SalesRecord::new("A", "notanumber", 99, 99_000.0));
    let after = aggregate(&records, 5).unwrap();

    assert_eq!(after.dropped_count(), before.dropped_count() + 1);
    assert_eq!(after.dropped, vec![4]);
    assert_eq!(after.buckets, before.buckets);
    assert!(after
        .buckets
        .iter()
        .all(|b| !b.record_indices.contains(&4)));
}

#[test]
fn test_prediction() {
    let test_file = create_test_csv();
    let records = load_sales_records(test_file.path().to_str().unwrap()).unwrap();
    let outcome = aggregate(&records, 5).unwrap();
    let feature_set = FeatureSet::from_buckets(&outcome.buckets).unwrap();

    for algorithm in [Algorithm::KMeans, Algorithm::KMedoids] {
        let model = fit_partition(algorithm, &feature_set.features, &FitParams::new(3)).unwrap();

        // A bucket's own raw values land in the bucket's cluster
        let raw = feature_set.raw.row(0);
        let cluster = predict_cluster(model.as_ref(), &feature_set, &[raw[0], raw[1]]).unwrap();
        assert!(cluster < 3);
        assert_eq!(
            model.predict(&feature_set.features).unwrap(),
            model.labels().to_vec()
        );
    }
}

#[test]
fn test_error_handling_invalid_clusters() {
    let records = volume_records(&[1, 2, 3]);

    let too_many = PipelineConfig {
        n_clusters: 4,
        ..PipelineConfig::default()
    };
    let result = run_pipeline(&records, Algorithm::KMeans, &too_many);
    assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));

    let zero = PipelineConfig {
        n_clusters: 0,
        ..PipelineConfig::default()
    };
    assert!(run_pipeline(&records, Algorithm::KMedoids, &zero).is_err());

    assert!(run_pipeline(&[], Algorithm::KMeans, &PipelineConfig::default()).is_err());
}

#[test]
fn test_segmented_pipeline() {
    let test_file = create_test_csv();
    let records = load_sales_records(test_file.path().to_str().unwrap()).unwrap();
    let config = PipelineConfig {
        segmentation: Segmentation::ByCategoryType,
        ..PipelineConfig::default()
    };

    let report = run_pipeline(&records, Algorithm::KMedoids, &config).unwrap();
    assert_eq!(report.segments.len(), 2);
    let total: usize = report.segments.iter().map(|s| s.n_samples).sum();
    assert_eq!(total, report.n_buckets);
}

#[test]
fn test_sweep_is_reproducible() {
    let test_file = create_test_csv();
    let records = load_sales_records(test_file.path().to_str().unwrap()).unwrap();
    let outcome = aggregate(&records, 5).unwrap();
    let feature_set = FeatureSet::from_buckets(&outcome.buckets).unwrap();

    let first = sweep(&feature_set.features, 2, 5).unwrap();
    let second = sweep(&feature_set.features, 2, 5).unwrap();

    for (a, b) in first.kmeans.iter().zip(&second.kmeans) {
        assert_eq!(a.dbi, b.dbi);
    }
    for (a, b) in first.kmedoids.iter().zip(&second.kmedoids) {
        assert_eq!(a.dbi, b.dbi);
    }
    assert_eq!(first, second);

    assert!(sweep(&feature_set.features, 2, 8).is_err());
}
