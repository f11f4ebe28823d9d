//! Bucketing of raw sales rows into (category, size-range) groups

use crate::data::SalesRecord;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Width of a size range in the unit of the size field (cm)
pub const DEFAULT_BUCKET_WIDTH: u64 = 5;

/// Grouping key of an aggregated bucket.
///
/// Ordered by category, then by the numeric start of the range, so bucket
/// order depends only on the keys present and never on input row order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub category: String,
    pub range_start: u64,
    /// Display form, e.g. `"10-14 cm"`
    pub size_range: String,
}

impl BucketKey {
    pub fn new(category: &str, range_start: u64, bucket_width: u64) -> Self {
        Self {
            category: category.to_string(),
            range_start,
            size_range: size_range_label(range_start, bucket_width),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.size_range)
    }
}

/// Broad product family used when clustering each family on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoryType {
    Standard,
    NonStandard,
}

impl CategoryType {
    pub fn of(category: &str) -> Self {
        match category.trim().to_lowercase().as_str() {
            "standard" | "standar" => CategoryType::Standard,
            _ => CategoryType::NonStandard,
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryType::Standard => write!(f, "Standard"),
            CategoryType::NonStandard => write!(f, "Non-Standard"),
        }
    }
}

/// Summed sales for one (category, size-range) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBucket {
    pub key: BucketKey,
    /// Total units sold
    pub quantity: u64,
    /// Total monetary value
    pub monetary: f64,
    /// Indices of the input records folded into this bucket
    pub record_indices: Vec<usize>,
}

impl AggregatedBucket {
    pub fn category_type(&self) -> CategoryType {
        CategoryType::of(&self.key.category)
    }

    pub fn avg_price_per_unit(&self) -> f64 {
        self.monetary / (self.quantity as f64 + 1e-8)
    }
}

/// Buckets plus the records that could not be placed in one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutcome {
    pub buckets: Vec<AggregatedBucket>,
    /// Indices of records whose size could not be parsed
    pub dropped: Vec<usize>,
}

impl AggregationOutcome {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Extract the integer magnitude from a size descriptor (`"12"`, `"12 cm"`, `"12cm"`)
pub fn parse_size(size: &str) -> Option<u64> {
    let lower = size.trim().to_ascii_lowercase();
    let number = lower.strip_suffix("cm").unwrap_or(&lower);
    number.trim().parse().ok()
}

/// Lower and upper bound (inclusive) of the range a size falls into.
///
/// `None` when the size does not parse or its range end does not fit in a `u64`.
pub fn size_range(size: &str, bucket_width: u64) -> Option<(u64, u64)> {
    if bucket_width == 0 {
        return None;
    }
    let value = parse_size(size)?;
    let start = (value / bucket_width) * bucket_width;
    let end = start.checked_add(bucket_width - 1)?;
    Some((start, end))
}

pub fn size_range_label(range_start: u64, bucket_width: u64) -> String {
    format!(
        "{}-{} cm",
        range_start,
        range_start.saturating_add(bucket_width.saturating_sub(1))
    )
}

/// Group records by category and size range, summing quantity and monetary totals.
///
/// # Arguments
/// * `records` - Raw sales rows
/// * `bucket_width` - Width of each size range (5 in production)
///
/// # Returns
/// * Buckets in key order, and the indices of records dropped for an unparsable size
pub fn aggregate(records: &[SalesRecord], bucket_width: u64) -> EngineResult<AggregationOutcome> {
    if records.is_empty() {
        return Err(EngineError::config("no sales records to aggregate"));
    }
    if bucket_width == 0 {
        return Err(EngineError::config("bucket width must be positive"));
    }

    let mut groups: BTreeMap<BucketKey, AggregatedBucket> = BTreeMap::new();
    let mut dropped = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let Some((start, _)) = size_range(&record.size, bucket_width) else {
            dropped.push(idx);
            continue;
        };

        let key = BucketKey::new(&record.category, start, bucket_width);
        let bucket = groups
            .entry(key.clone())
            .or_insert_with(|| AggregatedBucket {
                key,
                quantity: 0,
                monetary: 0.0,
                record_indices: Vec::new(),
            });
        bucket.quantity = bucket.quantity.saturating_add(record.quantity);
        bucket.monetary += record.total_price;
        bucket.record_indices.push(idx);
    }

    if !dropped.is_empty() {
        log::warn!(
            "{} record(s) dropped with an unparsable size",
            dropped.len()
        );
    }

    Ok(AggregationOutcome {
        buckets: groups.into_values().collect(),
        dropped,
    })
}

/// Partition buckets by category type, Standard first, omitting empty groups
pub fn split_by_category_type(
    buckets: &[AggregatedBucket],
) -> Vec<(CategoryType, Vec<AggregatedBucket>)> {
    [CategoryType::Standard, CategoryType::NonStandard]
        .into_iter()
        .map(|kind| {
            let members: Vec<AggregatedBucket> = buckets
                .iter()
                .filter(|b| b.category_type() == kind)
                .cloned()
                .collect();
            (kind, members)
        })
        .filter(|(_, members)| !members.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("12"), Some(12));
        assert_eq!(parse_size("12 cm"), Some(12));
        assert_eq!(parse_size(" 7cm "), Some(7));
        assert_eq!(parse_size("30 CM"), Some(30));
        assert_eq!(parse_size("notanumber"), None);
        assert_eq!(parse_size("12.5 cm"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("cm"), None);
    }

    #[test]
    fn test_size_range() {
        assert_eq!(size_range("0", 5), Some((0, 4)));
        assert_eq!(size_range("4 cm", 5), Some((0, 4)));
        assert_eq!(size_range("5 cm", 5), Some((5, 9)));
        assert_eq!(size_range("23", 5), Some((20, 24)));
        assert_eq!(size_range("23", 10), Some((20, 29)));
        assert_eq!(size_range("x", 5), None);
        assert_eq!(size_range("3", 0), None);
        assert_eq!(size_range_label(20, 5), "20-24 cm");
    }

    #[test]
    fn test_aggregate_sums_and_orders() {
        let records = vec![
            SalesRecord::new("Standard", "12 cm", 3, 300.0),
            SalesRecord::new("Custom", "31 cm", 1, 500.0),
            SalesRecord::new("Standard", "14 cm", 2, 200.0),
            SalesRecord::new("Standard", "5 cm", 4, 100.0),
        ];

        let outcome = aggregate(&records, DEFAULT_BUCKET_WIDTH).unwrap();
        assert_eq!(outcome.dropped_count(), 0);

        let keys: Vec<String> = outcome.buckets.iter().map(|b| b.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["Custom 30-34 cm", "Standard 5-9 cm", "Standard 10-14 cm"]
        );

        let merged = &outcome.buckets[2];
        assert_eq!(merged.quantity, 5);
        assert_eq!(merged.monetary, 500.0);
        assert_eq!(merged.record_indices, vec![0, 2]);
    }

    #[test]
    fn test_aggregate_drops_unparsable_size() {
        let mut records = vec![
            SalesRecord::new("Standard", "12 cm", 3, 300.0),
            SalesRecord::new("Standard", "13 cm", 2, 200.0),
        ];
        let before = aggregate(&records, 5).unwrap();

        records.push(SalesRecord::new("Standard", "notanumber", 99, 9_900.0));
        let after = aggregate(&records, 5).unwrap();

        assert_eq!(after.dropped_count(), before.dropped_count() + 1);
        assert_eq!(after.dropped, vec![2]);
        assert_eq!(after.buckets, before.buckets);
        assert!(after
            .buckets
            .iter()
            .all(|b| !b.record_indices.contains(&2)));
    }

    #[test]
    fn test_aggregate_order_is_independent_of_row_order() {
        let records = vec![
            SalesRecord::new("B", "1", 1, 10.0),
            SalesRecord::new("A", "7", 2, 20.0),
            SalesRecord::new("A", "2", 3, 30.0),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let a = aggregate(&records, 5).unwrap();
        let b = aggregate(&reversed, 5).unwrap();
        let keys_a: Vec<_> = a.buckets.iter().map(|b| b.key.clone()).collect();
        let keys_b: Vec<_> = b.buckets.iter().map(|b| b.key.clone()).collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn test_aggregate_rejects_empty_input() {
        assert!(matches!(
            aggregate(&[], 5),
            Err(EngineError::InvalidConfiguration(_))
        ));
        let records = vec![SalesRecord::new("A", "1", 1, 1.0)];
        assert!(aggregate(&records, 0).is_err());
    }

    #[test]
    fn test_split_by_category_type() {
        let records = vec![
            SalesRecord::new("standar", "12", 3, 300.0),
            SalesRecord::new("Custom", "12", 1, 500.0),
            SalesRecord::new("Standard", "20", 2, 200.0),
        ];
        let outcome = aggregate(&records, 5).unwrap();
        let groups = split_by_category_type(&outcome.buckets);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, CategoryType::Standard);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, CategoryType::NonStandard);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn test_size_range_overflow_is_dropped() {
        assert_eq!(size_range("18446744073709551615", 5), None);
        assert_eq!(size_range("18446744073709551614 cm", 1), Some((u64::MAX - 1, u64::MAX - 1)));

        let records = vec![
            SalesRecord::new("A", "18446744073709551615", 1, 1.0),
            SalesRecord::new("A", "10 cm", 2, 20.0),
        ];
        let outcome = aggregate(&records, 5).unwrap();
        assert_eq!(outcome.dropped, vec![0]);
        assert_eq!(outcome.buckets.len(), 1);
    }

    #[test]
    fn test_quantity_sum_saturates() {
        let records = vec![
            SalesRecord::new("A", "10", u64::MAX, 1.0),
            SalesRecord::new("A", "11", 1, 1.0),
        ];
        let outcome = aggregate(&records, 5).unwrap();
        assert_eq!(outcome.buckets[0].quantity, u64::MAX);
        assert_eq!(outcome.buckets[0].record_indices, vec![0, 1]);
    }
}
