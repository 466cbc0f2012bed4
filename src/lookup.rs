//! Keyed lookups derived from the canonical tables.
//!
//! Lookups return `Option` and never apply defaults themselves; the
//! enrichment step resolves each miss with its own explicit policy.

use crate::error::{AnalystError, Result};
use crate::tables::{CanonicalTables, CouponRow, MarketingRow, Month, TaxRow};
use chrono::Datelike;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookups {
    tax: HashMap<String, f64>,
    /// Month first so a sale probes with its borrowed category.
    discount: HashMap<Month, HashMap<String, f64>>,
    marketing: HashMap<(i32, Month), f64>,
}

impl Lookups {
    pub fn build(tables: &CanonicalTables) -> Result<Self> {
        let lookups = Self {
            tax: build_tax(&tables.tax)?,
            discount: build_discount(&tables.coupons)?,
            marketing: build_marketing(&tables.marketing),
        };
        info!(
            "Built lookups: {} tax categories, {} discount keys, {} marketing periods",
            lookups.tax.len(),
            lookups.discount.values().map(HashMap::len).sum::<usize>(),
            lookups.marketing.len()
        );
        Ok(lookups)
    }

    pub fn gst_pct(&self, category: Option<&str>) -> Option<f64> {
        self.tax.get(category?).copied()
    }

    pub fn discount_pct(&self, month: Option<Month>, category: Option<&str>) -> Option<f64> {
        self.discount.get(&month?)?.get(category?).copied()
    }

    pub fn marketing_spend(&self, year: Option<i32>, month: Option<Month>) -> Option<f64> {
        self.marketing.get(&(year?, month?)).copied()
    }
}

/// Insert a keyed value; identical repeats are fine, conflicting ones are not.
fn insert_unique<K>(map: &mut HashMap<K, f64>, key: K, value: f64, what: &str) -> Result<()>
where
    K: Eq + Hash + std::fmt::Debug,
{
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
        Entry::Occupied(existing) if *existing.get() == value => Ok(()),
        Entry::Occupied(existing) => Err(AnalystError::Ingestion(format!(
            "conflicting {} for {:?}: {} vs {}",
            what,
            existing.key(),
            existing.get(),
            value
        ))),
    }
}

fn build_tax(rows: &[TaxRow]) -> Result<HashMap<String, f64>> {
    let mut tax = HashMap::new();
    for row in rows {
        let Some(category) = &row.category else {
            warn!("Skipping tax row without a product category");
            continue;
        };
        // Blank GST cell means no tax.
        insert_unique(&mut tax, category.clone(), row.gst.unwrap_or(0.0), "GST rate")?;
    }
    Ok(tax)
}

fn build_discount(rows: &[CouponRow]) -> Result<HashMap<Month, HashMap<String, f64>>> {
    let mut discount: HashMap<Month, HashMap<String, f64>> = HashMap::new();
    for row in rows {
        let Some(category) = &row.category else {
            warn!("Skipping coupon row for month {} without a product category", row.month);
            continue;
        };
        insert_unique(
            discount.entry(row.month).or_default(),
            category.clone(),
            row.discount_pct.unwrap_or(0.0),
            &format!("month {} discount", row.month),
        )?;
    }
    Ok(discount)
}

fn build_marketing(rows: &[MarketingRow]) -> HashMap<(i32, Month), f64> {
    let mut marketing = HashMap::new();
    let mut undated = 0usize;
    for row in rows {
        let Some(date) = row.date else {
            undated += 1;
            continue;
        };
        *marketing.entry((date.year(), Month::of(date))).or_insert(0.0) += row.total_spend();
    }
    if undated > 0 {
        warn!("{} marketing row(s) have no parseable date and were left out of the spend lookup", undated);
    }
    marketing
}
