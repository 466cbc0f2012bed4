//! Canonical tables - typed, immutable datasets loaded once per session.
//!
//! Every CSV is validated against its required header set and parsed into
//! row structs here. Downstream code never looks columns up by name.
//! Dates are normalised to `NaiveDate` (unparseable values become `None`)
//! and months to the single [`Month`] key type, whatever their spelling in
//! the source file.

use crate::error::{AnalystError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Calendar month, 1 to 12.
///
/// This is the only month representation used as a join key. Coupon months
/// and sales-derived months both pass through it, so a `"03"` in one file and
/// a `3` derived from a date in another always compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Month(u32);

impl Month {
    pub fn new(number: u32) -> Option<Self> {
        (1..=12).contains(&number).then_some(Month(number))
    }

    pub fn of(date: NaiveDate) -> Self {
        Month(date.month())
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// Accepts `3`, `03`, `3.0`, `Mar`, `march` (case-insensitive).
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(n) = trimmed.parse::<u32>() {
            return Month::new(n);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.fract() == 0.0 && f >= 1.0 && f <= 12.0 {
                return Month::new(f as u32);
            }
            return None;
        }
        let lower = trimmed.to_lowercase();
        MONTH_NAMES
            .iter()
            .position(|name| *name == lower || (lower.len() == 3 && name.starts_with(&lower)))
            .and_then(|idx| Month::new(idx as u32 + 1))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Parse a date cell. Returns `None` for blank or unrecognised input.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// One transaction from the sales fact table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRow {
    pub customer_id: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub product_sku: Option<String>,
    pub category: Option<String>,
    pub quantity: f64,
    pub avg_price: f64,
    pub delivery_charges: Option<f64>,
    pub coupon_status: Option<String>,
}

impl SalesRow {
    pub fn year(&self) -> Option<i32> {
        self.transaction_date.map(|d| d.year())
    }

    pub fn month(&self) -> Option<Month> {
        self.transaction_date.map(Month::of)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponRow {
    pub month: Month,
    pub category: Option<String>,
    pub coupon_code: Option<String>,
    pub discount_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketingRow {
    pub date: Option<NaiveDate>,
    pub offline_spend: Option<f64>,
    pub online_spend: Option<f64>,
}

impl MarketingRow {
    /// Offline plus online; a blank side counts as zero.
    pub fn total_spend(&self) -> f64 {
        self.offline_spend.unwrap_or(0.0) + self.online_spend.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxRow {
    pub category: Option<String>,
    pub gst: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSalesRecord {
    #[serde(rename = "CustomerID")]
    customer_id: Option<String>,
    #[serde(rename = "Transaction_ID")]
    transaction_id: Option<String>,
    #[serde(rename = "Transaction_Date")]
    transaction_date: Option<String>,
    #[serde(rename = "Product_SKU")]
    product_sku: Option<String>,
    #[serde(rename = "Product_Category")]
    category: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "Avg_Price")]
    avg_price: f64,
    #[serde(rename = "Delivery_Charges")]
    delivery_charges: Option<f64>,
    #[serde(rename = "Coupon_Status")]
    coupon_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCouponRecord {
    #[serde(rename = "Month")]
    month: String,
    #[serde(rename = "Product_Category")]
    category: Option<String>,
    #[serde(rename = "Coupon_Code")]
    coupon_code: Option<String>,
    #[serde(rename = "Discount_pct")]
    discount_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMarketingRecord {
    #[serde(rename = "Date")]
    date: Option<String>,
    #[serde(rename = "Offline_Spend")]
    offline_spend: Option<f64>,
    #[serde(rename = "Online_Spend")]
    online_spend: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTaxRecord {
    #[serde(rename = "Product_Category")]
    category: Option<String>,
    #[serde(rename = "GST")]
    gst: Option<f64>,
}

fn read_records<R: Read, T: DeserializeOwned>(
    dataset: Dataset,
    reader: R,
) -> Result<Vec<T>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let missing: Vec<&str> = dataset
        .required_columns()
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect();
    if !missing.is_empty() {
        return Err(AnalystError::Ingestion(format!(
            "{} is missing required column(s): {}",
            dataset,
            missing.join(", ")
        )));
    }

    let mut records = Vec::new();
    for (line_num, result) in csv_reader.deserialize().enumerate() {
        let record: T = result.map_err(|e| {
            AnalystError::Ingestion(format!(
                "{} parse error at line {}: {}",
                dataset,
                line_num + 2,
                e
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_sales<R: Read>(reader: R) -> Result<Vec<SalesRow>> {
    let raw: Vec<RawSalesRecord> = read_records(Dataset::Sales, reader)?;
    let mut undated = 0usize;
    let rows: Vec<SalesRow> = raw
        .into_iter()
        .map(|r| {
            let transaction_date = r.transaction_date.as_deref().and_then(parse_date);
            if transaction_date.is_none() {
                undated += 1;
            }
            SalesRow {
                customer_id: clean_text(r.customer_id),
                transaction_id: clean_text(r.transaction_id),
                transaction_date,
                product_sku: clean_text(r.product_sku),
                category: clean_text(r.category),
                quantity: r.quantity,
                avg_price: r.avg_price,
                delivery_charges: r.delivery_charges,
                coupon_status: clean_text(r.coupon_status),
            }
        })
        .collect();
    if undated > 0 {
        warn!("{} sales row(s) have no parseable transaction date; kept with null year/month", undated);
    }
    Ok(rows)
}

pub fn load_coupons<R: Read>(reader: R) -> Result<Vec<CouponRow>> {
    let raw: Vec<RawCouponRecord> = read_records(Dataset::Coupons, reader)?;
    raw.into_iter()
        .enumerate()
        .map(|(idx, r)| -> Result<CouponRow> {
            let month = Month::parse(&r.month).ok_or_else(|| {
                AnalystError::Ingestion(format!(
                    "{} line {}: unrecognised month '{}'",
                    Dataset::Coupons,
                    idx + 2,
                    r.month
                ))
            })?;
            Ok(CouponRow {
                month,
                category: clean_text(r.category),
                coupon_code: clean_text(r.coupon_code),
                discount_pct: r.discount_pct,
            })
        })
        .collect()
}

pub fn load_marketing<R: Read>(reader: R) -> Result<Vec<MarketingRow>> {
    let raw: Vec<RawMarketingRecord> = read_records(Dataset::Marketing, reader)?;
    Ok(raw
        .into_iter()
        .map(|r| MarketingRow {
            date: r.date.as_deref().and_then(parse_date),
            offline_spend: r.offline_spend,
            online_spend: r.online_spend,
        })
        .collect())
}

pub fn load_tax<R: Read>(reader: R) -> Result<Vec<TaxRow>> {
    let raw: Vec<RawTaxRecord> = read_records(Dataset::Tax, reader)?;
    Ok(raw
        .into_iter()
        .map(|r| TaxRow {
            category: clean_text(r.category),
            gst: r.gst,
        })
        .collect())
}

/// The source datasets, with their on-disk file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Sales,
    Coupons,
    Marketing,
    Tax,
    Customers,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Sales,
        Dataset::Coupons,
        Dataset::Marketing,
        Dataset::Customers,
        Dataset::Tax,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::Sales => "Online_Sales.csv",
            Dataset::Coupons => "Discount_Coupon.csv",
            Dataset::Marketing => "Marketing_Spend.csv",
            Dataset::Tax => "Tax_amount.csv",
            Dataset::Customers => "CustomersData.csv",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Sales => "Online Sales",
            Dataset::Coupons => "Discount Coupon",
            Dataset::Marketing => "Marketing Spend",
            Dataset::Tax => "Tax Amount",
            Dataset::Customers => "Customer Data",
        }
    }

    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Dataset::Sales => &["Transaction_Date", "Product_Category", "Quantity", "Avg_Price"],
            Dataset::Coupons => &["Month", "Product_Category", "Discount_pct"],
            Dataset::Marketing => &["Date", "Offline_Spend", "Online_Spend"],
            Dataset::Tax => &["Product_Category", "GST"],
            Dataset::Customers => &["CustomerID"],
        }
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "sales" | "online_sales" => Ok(Dataset::Sales),
            "coupons" | "discount_coupon" | "discounts" => Ok(Dataset::Coupons),
            "marketing" | "marketing_spend" => Ok(Dataset::Marketing),
            "tax" | "tax_amount" => Ok(Dataset::Tax),
            "customers" | "customer_data" => Ok(Dataset::Customers),
            other => Err(format!(
                "unknown dataset '{}' (expected one of: sales, coupons, marketing, tax, customers)",
                other
            )),
        }
    }
}

/// All canonical tables for one session. Never mutated after loading.
#[derive(Debug, Clone, Default)]
pub struct CanonicalTables {
    pub sales: Vec<SalesRow>,
    pub coupons: Vec<CouponRow>,
    pub marketing: Vec<MarketingRow>,
    pub tax: Vec<TaxRow>,
}

impl CanonicalTables {
    /// Load the four joined datasets from `dir`; any failure aborts the
    /// session. Customer data is preview-only and never read here.
    pub fn load(dir: &Path) -> Result<Self> {
        info!("Loading canonical tables from {}", dir.display());

        let sales = load_sales(open_dataset(dir, Dataset::Sales)?)?;
        let coupons = load_coupons(open_dataset(dir, Dataset::Coupons)?)?;
        let marketing = load_marketing(open_dataset(dir, Dataset::Marketing)?)?;
        let tax = load_tax(open_dataset(dir, Dataset::Tax)?)?;

        info!(
            "Loaded {} sales, {} coupon, {} marketing, {} tax rows",
            sales.len(),
            coupons.len(),
            marketing.len(),
            tax.len()
        );

        Ok(Self {
            sales,
            coupons,
            marketing,
            tax,
        })
    }
}

fn open_dataset(dir: &Path, dataset: Dataset) -> Result<File> {
    let path = dataset.path_in(dir);
    File::open(&path).map_err(|e| {
        AnalystError::Ingestion(format!("cannot open {} ({}): {}", dataset, path.display(), e))
    })
}

/// Shape and leading rows of a raw dataset file.
pub struct DatasetPreview {
    pub dataset: Dataset,
    pub rows: usize,
    pub columns: usize,
    pub head: DataFrame,
}

impl fmt::Display for DatasetPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} - {} rows x {} columns", self.dataset, self.rows, self.columns)?;
        write!(f, "{}", self.head)
    }
}

/// Read a dataset as-is (no typing or normalisation) for display.
pub fn preview_dataset(dir: &Path, dataset: Dataset, rows: usize) -> Result<DatasetPreview> {
    let path = dataset.path_in(dir);
    if !path.exists() {
        return Err(AnalystError::Ingestion(format!(
            "{} not found at {}",
            dataset,
            path.display()
        )));
    }

    let df = LazyCsvReader::new(&path)
        .with_has_header(true)
        .finish()?
        .collect()?;

    Ok(DatasetPreview {
        dataset,
        rows: df.height(),
        columns: df.width(),
        head: df.head(Some(rows)),
    })
}
