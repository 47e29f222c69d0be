//! Stock alerts derived from stock and minimum stock.
//!
//! Alerts are never stored: every refresh classifies the whole active catalog
//! again, so the same products always give the same alert list.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::Sku;

/// Declared most to least severe; alert lists sort in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity { OutOfStock, Critical, Warning }

impl Severity {
    /// `None` means the product is healthy.
    pub fn classify(stock: u32, min_stock: u32) -> Option<Severity> {
        if stock == 0 {
            Some(Severity::OutOfStock)
        } else if u64::from(stock) * 2 <= u64::from(min_stock) {
            // stock <= min_stock * 0.5 without floating point
            Some(Severity::Critical)
        } else if stock <= min_stock {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Self::OutOfStock => "out_of_stock", Self::Critical => "critical", Self::Warning => "warning" }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub stock: u32,
    pub min_stock: u32,
    pub severity: Severity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub out_of_stock: usize,
    pub critical: usize,
    pub warning: usize,
}

impl AlertCounts {
    pub fn total(&self) -> usize { self.out_of_stock + self.critical + self.warning }
}

pub fn derive_alerts(products: &[Product]) -> Vec<StockAlert> {
    let mut alerts: Vec<StockAlert> = products
        .iter()
        .filter(|p| p.is_active)
        .filter_map(|p| {
            Severity::classify(p.stock, p.min_stock).map(|severity| StockAlert {
                product_id: p.id, sku: p.sku.clone(), name: p.name.clone(),
                stock: p.stock, min_stock: p.min_stock, severity,
            })
        })
        .collect();
    alerts.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.name.cmp(&b.name)).then_with(|| a.sku.cmp(&b.sku)));
    alerts
}

pub fn count(alerts: &[StockAlert]) -> AlertCounts {
    alerts.iter().fold(AlertCounts::default(), |mut acc, a| {
        match a.severity {
            Severity::OutOfStock => acc.out_of_stock += 1,
            Severity::Critical => acc.critical += 1,
            Severity::Warning => acc.warning += 1,
        }
        acc
    })
}
