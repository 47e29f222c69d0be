//! Purchase Aggregate
//!
//! Purchases go `pending -> received` exactly once. Receipt is the only point
//! where their quantities reach stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::product::non_negative;
use crate::domain::value_objects::{Money, Sku, TaxRate, Totals};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus { #[default] Pending, Received }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub supplier_name: String,
    #[serde(default)] pub supplier_contact: Option<String>,
    #[serde(default)] pub notes: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub status: PurchaseStatus,
    #[serde(default)] pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "purchase_items")]
    pub items: Vec<PurchaseItem>,
}

impl Purchase {
    pub fn is_received(&self) -> bool { self.status == PurchaseStatus::Received }
    pub fn unit_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
}

/// Fields for a product that does not exist yet; it is created on receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewProductFields {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub sku: Sku,
    #[validate(custom = "non_negative")]
    pub price: Money,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub min_stock: u32,
}

/// A purchase line references an existing product or carries a new one, never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseItem {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub new_product: Option<NewProductFields>,
    pub quantity: u32,
    pub unit_cost: Money,
    pub line_total: Money,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PurchaseTarget<'a> {
    Existing(Uuid),
    New(&'a NewProductFields),
}

impl PurchaseItem {
    pub fn existing(product_id: Uuid, quantity: u32, unit_cost: Money) -> Self {
        Self { id: None, product_id: Some(product_id), new_product: None, quantity, unit_cost, line_total: unit_cost * quantity }
    }

    pub fn new_product(fields: NewProductFields, quantity: u32, unit_cost: Money) -> Self {
        Self { id: None, product_id: None, new_product: Some(fields), quantity, unit_cost, line_total: unit_cost * quantity }
    }

    pub fn target(&self) -> Option<PurchaseTarget<'_>> {
        match (&self.product_id, &self.new_product) {
            (Some(id), None) => Some(PurchaseTarget::Existing(*id)),
            (None, Some(fields)) => Some(PurchaseTarget::New(fields)),
            _ => None,
        }
    }
}

/// Purchase order form as submitted by the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct PurchaseInput {
    #[validate(length(min = 1, max = 120, message = "supplier is required"))]
    pub supplier_name: String,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub supplier_contact: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<PurchaseLineInput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLineInput {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub new_product: Option<NewProductFields>,
    pub quantity: u32,
    pub unit_cost: Money,
}

/// The `p_purchase` argument of the `create_purchase` remote procedure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseHeader {
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub purchase: PurchaseHeader,
    pub items: Vec<PurchaseItem>,
}

impl NewPurchase {
    /// Checks each line and computes totals. Field-level rules are checked by
    /// `PurchaseInput::validate` first.
    pub fn build(input: PurchaseInput, rate: TaxRate) -> Result<Self, PurchaseError> {
        let mut items = Vec::with_capacity(input.items.len());
        for (idx, line) in input.items.into_iter().enumerate() {
            let line_no = idx + 1;
            if line.quantity == 0 { return Err(PurchaseError::InvalidLine { line: line_no, reason: "quantity must be at least 1" }); }
            if line.unit_cost.is_negative() { return Err(PurchaseError::InvalidLine { line: line_no, reason: "unit cost must be zero or greater" }); }
            if line.unit_cost.checked_mul(line.quantity).is_none() { return Err(PurchaseError::InvalidLine { line: line_no, reason: "amount is too large" }); }
            let item = match (line.product_id, line.new_product) {
                (Some(id), None) => PurchaseItem::existing(id, line.quantity, line.unit_cost),
                (None, Some(fields)) => {
                    if fields.validate().is_err() {
                        return Err(PurchaseError::InvalidLine { line: line_no, reason: "new product needs a name and a non-negative price" });
                    }
                    PurchaseItem::new_product(fields, line.quantity, line.unit_cost)
                }
                _ => return Err(PurchaseError::InvalidLine { line: line_no, reason: "choose an existing product or describe a new one" }),
            };
            items.push(item);
        }
        if items.is_empty() { return Err(PurchaseError::NoItems); }
        let totals = Totals::checked_from_lines(items.iter().map(|i| i.line_total), rate).ok_or(PurchaseError::AmountTooLarge)?;
        Ok(Self {
            purchase: PurchaseHeader {
                supplier_name: input.supplier_name.trim().to_string(),
                supplier_contact: input.supplier_contact.filter(|c| !c.trim().is_empty()),
                notes: input.notes.filter(|n| !n.trim().is_empty()),
                subtotal: totals.subtotal, tax: totals.tax, total: totals.total,
            },
            items,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseError {
    NoItems,
    InvalidLine { line: usize, reason: &'static str },
    AmountTooLarge,
}
impl std::error::Error for PurchaseError {}
impl std::fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::InvalidLine { line, reason } => write!(f, "Line {line}: {reason}"),
            Self::AmountTooLarge => write!(f, "Purchase total is too large"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(sku: &str) -> NewProductFields {
        NewProductFields { name: "Linen shirt".into(), sku: Sku::new(sku).unwrap(), price: Money::cents(4500), category_id: None, min_stock: 3 }
    }

    #[test]
    fn test_build_purchase() {
        let input = PurchaseInput {
            supplier_name: " Textiles SA ".into(), supplier_contact: None, notes: Some("".into()),
            items: vec![
                PurchaseLineInput { product_id: Some(Uuid::new_v4()), new_product: None, quantity: 10, unit_cost: Money::cents(250) },
                PurchaseLineInput { product_id: None, new_product: Some(fields("LIN-01")), quantity: 4, unit_cost: Money::cents(2000) },
            ],
        };
        let p = NewPurchase::build(input, TaxRate::STANDARD).unwrap();
        assert_eq!(p.purchase.supplier_name, "Textiles SA");
        assert_eq!(p.purchase.notes, None);
        assert_eq!(p.purchase.subtotal, Money::cents(10500));
        assert_eq!(p.purchase.tax, Money::cents(1680));
        assert_eq!(p.purchase.total, Money::cents(12180));
        assert!(matches!(p.items[1].target(), Some(PurchaseTarget::New(_))));
    }

    #[test]
    fn test_line_must_pick_one_target() {
        let both = PurchaseInput {
            supplier_name: "S".into(), supplier_contact: None, notes: None,
            items: vec![PurchaseLineInput { product_id: Some(Uuid::new_v4()), new_product: Some(fields("X")), quantity: 1, unit_cost: Money::cents(1) }],
        };
        assert!(matches!(NewPurchase::build(both, TaxRate::STANDARD), Err(PurchaseError::InvalidLine { line: 1, .. })));
        let zero = PurchaseInput {
            supplier_name: "S".into(), supplier_contact: None, notes: None,
            items: vec![PurchaseLineInput { product_id: Some(Uuid::new_v4()), new_product: None, quantity: 0, unit_cost: Money::cents(1) }],
        };
        assert!(NewPurchase::build(zero, TaxRate::STANDARD).is_err());
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let line = |unit_cost| PurchaseLineInput { product_id: Some(Uuid::new_v4()), new_product: None, quantity: 2, unit_cost };
        let input = |items| PurchaseInput { supplier_name: "S".into(), supplier_contact: None, notes: None, items };
        let huge = Money::new(rust_decimal::Decimal::MAX);
        assert_eq!(
            NewPurchase::build(input(vec![line(Money::cents(1)), line(huge)]), TaxRate::STANDARD),
            Err(PurchaseError::InvalidLine { line: 2, reason: "amount is too large" })
        );
        let half = Money::new(rust_decimal::Decimal::MAX / rust_decimal::Decimal::from(4));
        assert_eq!(NewPurchase::build(input(vec![line(half), line(half)]), TaxRate::STANDARD), Err(PurchaseError::AmountTooLarge));
    }

    #[test]
    fn test_input_validation() {
        let input = PurchaseInput { supplier_name: String::new(), supplier_contact: None, notes: None, items: vec![] };
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("supplier_name"));
        assert!(errors.field_errors().contains_key("items"));
    }
}
