//! Sales record ingestion using Polars

use anyhow::{anyhow, bail, Context};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// One raw sales row as supplied by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    /// Product category (e.g. "Standard", "Custom")
    pub category: String,
    /// Free-text size descriptor such as "12 cm"
    pub size: String,
    /// Units sold
    pub quantity: u64,
    /// Price per unit
    #[serde(default)]
    pub unit_price: f64,
    /// Monetary total of the sale
    pub total_price: f64,
    /// Seller name
    #[serde(default)]
    pub seller: String,
    /// Destination city
    #[serde(default)]
    pub destination: String,
}

impl SalesRecord {
    /// Convenience constructor for the fields the engine actually clusters on
    pub fn new(category: &str, size: &str, quantity: u64, total_price: f64) -> Self {
        Self {
            category: category.to_string(),
            size: size.to_string(),
            quantity,
            unit_price: if quantity > 0 {
                total_price / quantity as f64
            } else {
                0.0
            },
            total_price,
            seller: String::new(),
            destination: String::new(),
        }
    }
}

/// Distinct-value counts over the raw input, reported alongside each run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub n_records: usize,
    pub n_categories: usize,
    pub n_sizes: usize,
    pub n_sellers: usize,
    pub n_destinations: usize,
}

/// Count distinct categories, sizes, sellers and destinations
pub fn summarize_records(records: &[SalesRecord]) -> RecordSummary {
    RecordSummary {
        n_records: records.len(),
        n_categories: count_distinct(records.iter().map(|r| r.category.as_str())),
        n_sizes: count_distinct(records.iter().map(|r| r.size.as_str())),
        n_sellers: count_distinct(records.iter().map(|r| r.seller.as_str())),
        n_destinations: count_distinct(records.iter().map(|r| r.destination.as_str())),
    }
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Load sales records from a CSV file, or from a JSON array when the path ends in `.json`
///
/// # Arguments
/// * `file_path` - Path to the input file
///
/// # Returns
/// * All rows whose numeric fields could be read; malformed rows are skipped with a warning
pub fn load_sales_records(file_path: &str) -> crate::Result<Vec<SalesRecord>> {
    let path = Path::new(file_path);
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let records = if is_json {
        load_json(path)?
    } else {
        load_csv(path)?
    };

    if records.is_empty() {
        bail!("No valid sales records found in {}", path.display());
    }
    Ok(records)
}

fn load_json(path: &Path) -> crate::Result<Vec<SalesRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    let records: Vec<SalesRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Unable to parse sales records from {}", path.display()))?;
    Ok(records)
}

fn load_csv(path: &Path) -> crate::Result<Vec<SalesRecord>> {
    // Every column is read as text; numbers use locale-specific separators.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Unable to read CSV {}", path.display()))?;

    if df.height() == 0 {
        bail!("No rows found in {}", path.display());
    }

    let category = text_column(&df, &["Kategori", "category"])?;
    let size = text_column(&df, &["Size", "size"])?;
    let quantity = text_column(&df, &["Jumlah_Terjual", "quantity"])?;
    let total_price = text_column(&df, &["Total_Harga", "total_price"])?;
    let unit_price = optional_text_column(&df, &["Harga_Satuan", "unit_price"])?;
    let seller = optional_text_column(&df, &["Nama_Penjual", "seller"])?;
    let destination = optional_text_column(&df, &["Kota_Tujuan", "destination"])?;

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for row in 0..df.height() {
        let parsed = parse_quantity(quantity[row].as_deref()).and_then(|qty| {
            let total = parse_amount(total_price[row].as_deref())?;
            let unit = parse_amount(unit_price[row].as_deref())?;
            Ok((qty, total, unit))
        });

        match parsed {
            Ok((quantity, total_price, unit_price)) => records.push(SalesRecord {
                category: category[row].clone().unwrap_or_default(),
                size: size[row].clone().unwrap_or_default(),
                quantity,
                unit_price,
                total_price,
                seller: seller[row].clone().unwrap_or_default(),
                destination: destination[row].clone().unwrap_or_default(),
            }),
            Err(e) => {
                skipped += 1;
                log::warn!("skipping row {}: {}", row + 1, e);
            }
        }
    }

    if skipped > 0 {
        log::warn!("{} of {} rows skipped during ingestion", skipped, df.height());
    }
    Ok(records)
}

fn text_column(df: &DataFrame, names: &[&str]) -> crate::Result<Vec<Option<String>>> {
    let name = names
        .iter()
        .find(|name| df.get_column_index(name).is_some())
        .ok_or_else(|| anyhow!("Missing column: expected one of {:?}", names))?;

    let values = df
        .column(name)?
        .str()?
        .into_iter()
        .map(|value| value.map(|s| s.trim().to_string()))
        .collect();
    Ok(values)
}

fn optional_text_column(df: &DataFrame, names: &[&str]) -> crate::Result<Vec<Option<String>>> {
    if names.iter().any(|name| df.get_column_index(name).is_some()) {
        text_column(df, names)
    } else {
        Ok(vec![None; df.height()])
    }
}

/// Parse a unit count; blank cells count as zero
pub fn parse_quantity(value: Option<&str>) -> crate::Result<u64> {
    let amount = parse_amount(value)?;
    if amount.fract() != 0.0 {
        bail!("Quantity must be a whole number: {:?}", value);
    }
    // 2^64 is the first f64 that no longer fits
    if amount >= u64::MAX as f64 {
        bail!("Quantity out of range: {:?}", value);
    }
    Ok(amount as u64)
}

/// Parse a monetary amount written like `"Rp 1.250.000"` or `"1250000"`
///
/// `.` is a thousands separator and `,` the decimal mark. Blank cells count as zero.
pub fn parse_amount(value: Option<&str>) -> crate::Result<f64> {
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(0.0),
        Some(raw) => raw,
    };

    let cleaned: String = raw
        .trim_start_matches("Rp")
        .trim_start_matches("rp")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let amount: f64 = cleaned
        .parse()
        .map_err(|_| anyhow!("Invalid amount: {}", raw))?;
    if !amount.is_finite() || amount < 0.0 {
        bail!("Amount must be a non-negative number: {}", raw);
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Kategori,Size,Jumlah_Terjual,Harga_Satuan,Total_Harga,Nama_Penjual,Kota_Tujuan"
        )
        .unwrap();
        writeln!(file, "Standard,12 cm,10,\"15.000\",\"150.000\",Andi,Bandung").unwrap();
        writeln!(file, "Standard,13 cm,4,\"15.000\",\"60.000\",Budi,Jakarta").unwrap();
        writeln!(file, "Custom,30cm,2,\"50.000\",\"100.000\",Andi,Surabaya").unwrap();
        writeln!(file, "Custom,besar,1,\"70.000\",\"70.000\",Citra,Bandung").unwrap();
        writeln!(file, "Custom,22 cm,abc,\"70.000\",\"70.000\",Citra,Bandung").unwrap();
        file
    }

    #[test]
    fn test_load_csv_records() {
        let test_file = create_test_csv();
        let file_path = test_file.path().to_str().unwrap();

        let records = load_sales_records(file_path).unwrap();

        // The row with a non-numeric quantity is skipped, the unparsable size is kept
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].category, "Standard");
        assert_eq!(records[0].size, "12 cm");
        assert_eq!(records[0].quantity, 10);
        assert_eq!(records[0].total_price, 150_000.0);
        assert_eq!(records[3].size, "besar");
    }

    #[test]
    fn test_load_json_records() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let records = vec![
            SalesRecord::new("Standard", "10 cm", 3, 30_000.0),
            SalesRecord::new("Custom", "20 cm", 1, 25_000.0),
        ];
        write!(file, "{}", serde_json::to_string(&records).unwrap()).unwrap();

        let loaded = load_sales_records(file.path().to_str().unwrap()).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_missing_required_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Kategori,Jumlah_Terjual,Total_Harga").unwrap();
        writeln!(file, "Standard,1,1000").unwrap();

        let result = load_sales_records(file.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(Some("Rp 1.250.000")).unwrap(), 1_250_000.0);
        assert_eq!(parse_amount(Some("2500")).unwrap(), 2500.0);
        assert_eq!(parse_amount(Some("12,5")).unwrap(), 12.5);
        assert_eq!(parse_amount(Some("")).unwrap(), 0.0);
        assert_eq!(parse_amount(None).unwrap(), 0.0);
        assert!(parse_amount(Some("lots")).is_err());
        assert!(parse_amount(Some("-5")).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(Some("7")).unwrap(), 7);
        assert_eq!(parse_quantity(None).unwrap(), 0);
        assert!(parse_quantity(Some("1,5")).is_err());
        assert!(parse_quantity(Some("99999999999999999999999")).is_err());
        assert!(parse_quantity(Some("18446744073709551616")).is_err());
        assert_eq!(parse_quantity(Some("4294967296")).unwrap(), 4_294_967_296);
    }

    #[test]
    fn test_summarize_records() {
        let mut a = SalesRecord::new("Standard", "10 cm", 3, 30_000.0);
        a.seller = "Andi".to_string();
        let mut b = SalesRecord::new("Standard", "11 cm", 1, 10_000.0);
        b.seller = "Andi".to_string();
        b.destination = "Bandung".to_string();
        let c = SalesRecord::new("Custom", "10 cm", 2, 20_000.0);

        let summary = summarize_records(&[a, b, c]);
        assert_eq!(summary.n_records, 3);
        assert_eq!(summary.n_categories, 2);
        assert_eq!(summary.n_sizes, 2);
        assert_eq!(summary.n_sellers, 1);
        assert_eq!(summary.n_destinations, 1);
    }
}
