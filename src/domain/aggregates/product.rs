//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::value_objects::{Money, Sku};

/// A catalog product as stored in the `products` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    pub cost: Money,
    pub stock: u32,
    pub min_stock: u32,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub is_active: bool,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_value(&self) -> Money { self.price * self.stock }
    pub fn cost_value(&self) -> Money { self.cost * self.stock }
    pub fn margin(&self) -> Money { self.price - self.cost }

    /// Best-effort local stock change, never below zero.
    pub fn adjust_stock(&mut self, delta: i64) {
        let next = i64::from(self.stock).saturating_add(delta).clamp(0, i64::from(u32::MAX));
        self.stock = next as u32;
    }

    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.sku.as_str().to_lowercase().contains(&needle)
    }

    /// Form prefilled with the current values, for partial edits.
    pub fn to_input(&self) -> ProductInput {
        ProductInput {
            sku: self.sku.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            cost: self.cost,
            stock: self.stock,
            min_stock: self.min_stock,
            category_id: self.category_id,
            is_active: self.is_active,
            sizes: self.sizes.clone(),
            colors: self.colors.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// Create/update form for a product. Stock and minimum stock are unsigned, so
/// negative quantities never get past deserialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductInput {
    pub sku: Sku,
    #[validate(length(min = 1, max = 120, message = "name is required (max 120 characters)"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Money,
    #[validate(custom = "non_negative")]
    pub cost: Money,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub min_stock: u32,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn default_active() -> bool { true }

pub(crate) fn non_negative(value: &Money) -> Result<(), ValidationError> {
    if value.is_negative() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must be zero or greater".into());
        return Err(err);
    }
    Ok(())
}

impl ProductInput {
    pub fn new(sku: Sku, name: impl Into<String>, price: Money, cost: Money) -> Self {
        Self {
            sku, name: name.into(), description: None, price, cost, stock: 0, min_stock: 0,
            category_id: None, is_active: true, sizes: vec![], colors: vec![], image_url: None,
        }
    }

    pub fn with_stock(mut self, stock: u32, min_stock: u32) -> Self {
        self.stock = stock;
        self.min_stock = min_stock;
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Trims free text and drops empty size/color entries before sending.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.description = self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        self.sizes = clean_list(self.sizes);
        self.colors = clean_list(self.colors);
        self
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values.into_iter().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        if !out.contains(&v) { out.push(v); }
    }
    out
}

/// Splits "S, M ,L" into its entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    clean_list(raw.split(',').map(str::to_string).collect())
}

#[cfg(test)]
pub(crate) fn sample(sku: &str, stock: u32, min_stock: u32) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(), sku: Sku::new(sku).unwrap(), name: format!("Product {sku}"), description: None,
        price: Money::cents(1000), cost: Money::cents(600), stock, min_stock, category_id: None,
        is_active: true, sizes: vec![], colors: vec![], image_url: None, created_at: now, updated_at: now,
    }
}
