//! Analysis registry - one pure aggregation per analytical intent.
//!
//! Null year, month and category values form their own groups.

use crate::enrich::{EnrichedRow, EnrichedTable};
use crate::error::Result;
use crate::intent::Intent;
use crate::tables::Month;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Upper bound on rows a [`ResultPreview`] may carry.
pub const MAX_PREVIEW_ROWS: usize = 8;

/// The intents that have an aggregation behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analysis {
    SalesTrend,
    UnderperformingProducts,
    DiscountVsRevenue,
}

impl Analysis {
    pub const ALL: [Analysis; 3] = [
        Analysis::SalesTrend,
        Analysis::UnderperformingProducts,
        Analysis::DiscountVsRevenue,
    ];

    pub fn intent(self) -> Intent {
        match self {
            Analysis::SalesTrend => Intent::SalesTrend,
            Analysis::UnderperformingProducts => Intent::UnderperformingProducts,
            Analysis::DiscountVsRevenue => Intent::DiscountVsRevenue,
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.intent().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesTrendRow {
    pub year: Option<i32>,
    pub month: Option<Month>,
    pub category: Option<String>,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPerformanceRow {
    pub category: Option<String>,
    pub total_revenue: f64,
    pub avg_discount: f64,
    pub total_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountRevenueRow {
    pub category: Option<String>,
    pub avg_discount_pct: f64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analysis", content = "rows", rename_all = "snake_case")]
pub enum AnalysisResult {
    SalesTrend(Vec<SalesTrendRow>),
    UnderperformingProducts(Vec<CategoryPerformanceRow>),
    DiscountVsRevenue(Vec<DiscountRevenueRow>),
}

/// Dispatch `analysis` over the enriched table.
pub fn run(analysis: Analysis, table: &EnrichedTable) -> AnalysisResult {
    match analysis {
        Analysis::SalesTrend => AnalysisResult::SalesTrend(sales_trend(table.rows())),
        Analysis::UnderperformingProducts => {
            AnalysisResult::UnderperformingProducts(underperforming_products(table.rows()))
        }
        Analysis::DiscountVsRevenue => {
            AnalysisResult::DiscountVsRevenue(discount_vs_revenue(table.rows()))
        }
    }
}

#[derive(Debug, Default)]
struct CategoryTotals {
    revenue: f64,
    discount_sum: f64,
    quantity: f64,
    rows: usize,
}

impl CategoryTotals {
    fn add(&mut self, row: &EnrichedRow) {
        self.revenue += row.revenue;
        self.discount_sum += row.discount_pct;
        self.quantity += row.quantity;
        self.rows += 1;
    }

    fn mean_discount(&self) -> f64 {
        self.discount_sum / self.rows as f64
    }
}

/// Group rows by `key`, folding each into an accumulator. Groups come back in
/// the order their first row was seen.
fn group_in_order<K, A>(
    rows: &[EnrichedRow],
    key: impl Fn(&EnrichedRow) -> K,
    mut fold: impl FnMut(&mut A, &EnrichedRow),
) -> Vec<(K, A)>
where
    K: Eq + Hash + Clone,
    A: Default,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, A)> = Vec::new();
    for row in rows {
        let k = key(row);
        let slot = match index.get(&k) {
            Some(&slot) => slot,
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, A::default()));
                groups.len() - 1
            }
        };
        fold(&mut groups[slot].1, row);
    }
    groups
}

pub fn sales_trend(rows: &[EnrichedRow]) -> Vec<SalesTrendRow> {
    group_in_order(
        rows,
        |r| (r.year, r.month, r.category.clone()),
        |revenue: &mut f64, r| *revenue += r.revenue,
    )
    .into_iter()
    .map(|((year, month, category), revenue)| SalesTrendRow {
        year,
        month,
        category,
        revenue,
    })
    .collect()
}

/// Lowest total revenue first; ties keep first-seen order.
pub fn underperforming_products(rows: &[EnrichedRow]) -> Vec<CategoryPerformanceRow> {
    let mut out: Vec<CategoryPerformanceRow> =
        group_in_order(rows, |r| r.category.clone(), |acc: &mut CategoryTotals, r| acc.add(r))
            .into_iter()
            .map(|(category, totals)| CategoryPerformanceRow {
                category,
                total_revenue: totals.revenue,
                avg_discount: totals.mean_discount(),
                total_quantity: totals.quantity,
            })
            .collect();
    out.sort_by(|a, b| a.total_revenue.total_cmp(&b.total_revenue));
    out
}

/// Ordered by category name, null category last.
pub fn discount_vs_revenue(rows: &[EnrichedRow]) -> Vec<DiscountRevenueRow> {
    let mut out: Vec<DiscountRevenueRow> =
        group_in_order(rows, |r| r.category.clone(), |acc: &mut CategoryTotals, r| acc.add(r))
            .into_iter()
            .map(|(category, totals)| DiscountRevenueRow {
                category,
                avg_discount_pct: totals.mean_discount(),
                total_revenue: totals.revenue,
            })
            .collect();
    out.sort_by(|a, b| match (&a.category, &b.category) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    out
}

impl AnalysisResult {
    pub fn analysis(&self) -> Analysis {
        match self {
            AnalysisResult::SalesTrend(_) => Analysis::SalesTrend,
            AnalysisResult::UnderperformingProducts(_) => Analysis::UnderperformingProducts,
            AnalysisResult::DiscountVsRevenue(_) => Analysis::DiscountVsRevenue,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnalysisResult::SalesTrend(rows) => rows.len(),
            AnalysisResult::UnderperformingProducts(rows) => rows.len(),
            AnalysisResult::DiscountVsRevenue(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render as a polars frame using the dataset's column naming.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let df = match self {
            AnalysisResult::SalesTrend(rows) => DataFrame::new(vec![
                Series::new("Year", rows.iter().map(|r| r.year).collect::<Vec<_>>()),
                Series::new(
                    "Month",
                    rows.iter().map(|r| r.month.map(Month::number)).collect::<Vec<_>>(),
                ),
                Series::new("Product_Category", category_column(rows.iter().map(|r| &r.category))),
                Series::new("Revenue", rows.iter().map(|r| r.revenue).collect::<Vec<_>>()),
            ])?,
            AnalysisResult::UnderperformingProducts(rows) => DataFrame::new(vec![
                Series::new("Product_Category", category_column(rows.iter().map(|r| &r.category))),
                Series::new("total_revenue", rows.iter().map(|r| r.total_revenue).collect::<Vec<_>>()),
                Series::new("avg_discount", rows.iter().map(|r| r.avg_discount).collect::<Vec<_>>()),
                Series::new("total_quantity", rows.iter().map(|r| r.total_quantity).collect::<Vec<_>>()),
            ])?,
            AnalysisResult::DiscountVsRevenue(rows) => DataFrame::new(vec![
                Series::new("Product_Category", category_column(rows.iter().map(|r| &r.category))),
                Series::new("avg_discount_pct", rows.iter().map(|r| r.avg_discount_pct).collect::<Vec<_>>()),
                Series::new("total_revenue", rows.iter().map(|r| r.total_revenue).collect::<Vec<_>>()),
            ])?,
        };
        Ok(df)
    }

    /// The first `rows` rows as a frame, for display.
    pub fn head_frame(&self, rows: usize) -> Result<DataFrame> {
        Ok(self.to_frame()?.head(Some(rows)))
    }

    /// Bounded preview for the narrative prompt; `rows` is clamped to
    /// `1..=MAX_PREVIEW_ROWS`.
    pub fn preview(&self, rows: usize) -> Result<ResultPreview> {
        let limit = rows.clamp(1, MAX_PREVIEW_ROWS);
        let head = self.head_frame(limit)?;
        Ok(ResultPreview {
            analysis: self.analysis(),
            rows_shown: head.height(),
            total_rows: self.len(),
            table: head.to_string(),
        })
    }
}

fn category_column<'a>(categories: impl Iterator<Item = &'a Option<String>>) -> Vec<Option<&'a str>> {
    categories.map(|c| c.as_deref()).collect()
}

/// A rendered, size-bounded slice of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPreview {
    analysis: Analysis,
    rows_shown: usize,
    total_rows: usize,
    table: String,
}

impl ResultPreview {
    pub fn analysis(&self) -> Analysis {
        self.analysis
    }

    pub fn rows_shown(&self) -> usize {
        self.rows_shown
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for ResultPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table)
    }
}
