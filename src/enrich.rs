//! Enrichment pipeline - joins the sales fact table against the lookups.
//!
//! Default policy when a key has no match:
//! - GST: [`DEFAULT_GST_PCT`]
//! - Discount: [`DEFAULT_DISCOUNT_PCT`]
//! - Marketing spend: stays `None` (distinct from a recorded zero spend).

use crate::error::Result;
use crate::lookup::Lookups;
use crate::tables::{CanonicalTables, Month, SalesRow};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_GST_PCT: f64 = 0.0;
pub const DEFAULT_DISCOUNT_PCT: f64 = 0.0;
pub const NO_COUPON: &str = "No Coupon";

/// A sales row with derived and looked-up columns attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub customer_id: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub quantity: f64,
    pub avg_price: f64,
    pub coupon_status: String,
    pub year: Option<i32>,
    pub month: Option<Month>,
    pub revenue: f64,
    pub gst_pct: f64,
    pub discount_pct: f64,
    pub marketing_spend: Option<f64>,
}

/// How many rows fell back to a default during enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub rows: usize,
    pub undated: usize,
    pub gst_defaulted: usize,
    pub discount_defaulted: usize,
    pub marketing_missing: usize,
}

/// The enriched fact table. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedTable {
    rows: Vec<EnrichedRow>,
    stats: EnrichmentStats,
}

impl EnrichedTable {
    pub fn rows(&self) -> &[EnrichedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stats(&self) -> &EnrichmentStats {
        &self.stats
    }
}

/// Build the lookups from `tables` and enrich the sales rows.
pub fn enrich(tables: &CanonicalTables) -> Result<EnrichedTable> {
    let lookups = Lookups::build(tables)?;
    Ok(enrich_with(&tables.sales, &lookups))
}

/// Pure join of `sales` against prebuilt lookups.
pub fn enrich_with(sales: &[SalesRow], lookups: &Lookups) -> EnrichedTable {
    let mut stats = EnrichmentStats {
        rows: sales.len(),
        ..Default::default()
    };

    let rows: Vec<EnrichedRow> = sales
        .iter()
        .map(|sale| {
            let year = sale.year();
            let month = sale.month();
            let category = sale.category.as_deref();

            if year.is_none() {
                stats.undated += 1;
            }

            let gst_pct = lookups.gst_pct(category).unwrap_or_else(|| {
                stats.gst_defaulted += 1;
                DEFAULT_GST_PCT
            });
            let discount_pct = lookups.discount_pct(month, category).unwrap_or_else(|| {
                stats.discount_defaulted += 1;
                DEFAULT_DISCOUNT_PCT
            });
            let marketing_spend = lookups.marketing_spend(year, month);
            if marketing_spend.is_none() {
                stats.marketing_missing += 1;
            }

            EnrichedRow {
                customer_id: sale.customer_id.clone(),
                transaction_id: sale.transaction_id.clone(),
                transaction_date: sale.transaction_date,
                category: sale.category.clone(),
                quantity: sale.quantity,
                avg_price: sale.avg_price,
                coupon_status: sale
                    .coupon_status
                    .clone()
                    .unwrap_or_else(|| NO_COUPON.to_string()),
                year,
                month,
                revenue: sale.quantity * sale.avg_price,
                gst_pct,
                discount_pct,
                marketing_spend,
            }
        })
        .collect();

    info!(
        "Enriched {} sales rows ({} undated, {} without GST rate, {} without discount, {} without marketing spend)",
        stats.rows, stats.undated, stats.gst_defaulted, stats.discount_defaulted, stats.marketing_missing
    );
    if stats.rows > 0 && stats.discount_defaulted == stats.rows {
        warn!("No sales row matched a discount entry; check coupon months and categories");
    }

    EnrichedTable { rows, stats }
}
