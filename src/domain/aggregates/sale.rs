//! Sale Aggregate
//!
//! A sale is recorded once, by a single remote procedure that also decrements
//! stock for every line. After that only its status changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::cart::{Cart, CartItem};
use crate::domain::value_objects::{Money, TaxRate, Totals};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Cash, Card, Transfer }

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self { Self::Cash => "Cash", Self::Card => "Card", Self::Transfer => "Transfer" }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus { #[default] Completed, Cancelled }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub sale_number: String,
    #[serde(default)] pub customer_name: Option<String>,
    #[serde(default)] pub customer_email: Option<String>,
    #[serde(default)] pub customer_phone: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: SaleStatus,
    #[serde(default)] pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "sale_items")]
    pub items: Vec<SaleItem>,
}

impl Sale {
    pub fn totals(&self) -> Totals { Totals { subtotal: self.subtotal, tax: self.tax, total: self.total } }
    pub fn unit_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub product_id: Uuid,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    #[serde(default)] pub size: Option<String>,
    #[serde(default)] pub color: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Customer {
    #[validate(length(max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

impl Customer {
    fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self { name: clean(self.name), email: clean(self.email), phone: clean(self.phone) }
    }
}

/// The `p_sale` argument of the `create_sale` remote procedure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaleHeader {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// One entry of the `p_items` argument of `create_sale`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Everything the server needs to record a sale and decrement stock in one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    pub sale: SaleHeader,
    pub items: Vec<NewSaleItem>,
}

impl NewSale {
    pub fn from_cart(cart: &Cart, rate: TaxRate, customer: Customer, payment_method: PaymentMethod, notes: Option<String>) -> Result<Self, SaleError> {
        if cart.is_empty() { return Err(SaleError::NoItems); }
        let totals = Totals::checked_from_lines(cart.items().iter().map(CartItem::line_total), rate).ok_or(SaleError::AmountTooLarge)?;
        let customer = customer.normalized();
        let items = cart.items().iter().map(|i| NewSaleItem {
            product_id: i.product_id, quantity: i.quantity, unit_price: i.unit_price,
            line_total: i.line_total(), size: i.size.clone(), color: i.color.clone(),
        }).collect();
        Ok(Self {
            sale: SaleHeader {
                customer_name: customer.name, customer_email: customer.email, customer_phone: customer.phone,
                subtotal: totals.subtotal, tax: totals.tax, total: totals.total, payment_method,
                notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            },
            items,
        })
    }

    pub fn totals(&self) -> Totals { Totals { subtotal: self.sale.subtotal, tax: self.sale.tax, total: self.sale.total } }
}

#[derive(Debug, Clone, PartialEq)] pub enum SaleError { NoItems, AmountTooLarge }
impl std::error::Error for SaleError {}
impl std::fmt::Display for SaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Cart is empty"),
            Self::AmountTooLarge => write!(f, "Amount is too large"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::{sample, Product};

    #[test]
    fn test_new_sale_from_cart() {
        let a = Product { price: Money::cents(1000), ..sample("A", 5, 1) };
        let b = Product { price: Money::cents(500), ..sample("B", 5, 1) };
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&a, 2, Some("M".into()), None)).unwrap();
        cart.add_item(CartItem::from_product(&b, 1, None, Some("Red".into()))).unwrap();
        let customer = Customer { name: Some("  Ana ".into()), email: Some(" ".into()), phone: None };
        let sale = NewSale::from_cart(&cart, TaxRate::STANDARD, customer, PaymentMethod::Card, None).unwrap();
        assert_eq!(sale.items.len(), 2);
        assert_eq!(sale.items[0].line_total, Money::cents(2000));
        assert_eq!(sale.sale.customer_name.as_deref(), Some("Ana"));
        assert_eq!(sale.sale.customer_email, None);
        let totals = sale.totals();
        assert_eq!((totals.subtotal, totals.tax, totals.total), (Money::cents(2500), Money::cents(400), Money::cents(2900)));
        assert!(totals.is_consistent());
    }

    #[test]
    fn test_empty_cart_is_not_a_sale() {
        let err = NewSale::from_cart(&Cart::new(), TaxRate::STANDARD, Customer::default(), PaymentMethod::Cash, None).unwrap_err();
        assert_eq!(err, SaleError::NoItems);
    }

    #[test]
    fn test_total_that_does_not_fit_is_rejected() {
        let p = Product { price: Money::new(rust_decimal::Decimal::MAX - rust_decimal::Decimal::ONE), ..sample("A", 5, 1) };
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&p, 1, None, None)).unwrap();
        let err = NewSale::from_cart(&cart, TaxRate::STANDARD, Customer::default(), PaymentMethod::Cash, None).unwrap_err();
        assert_eq!(err, SaleError::AmountTooLarge);
    }

    #[test]
    fn test_sale_row_with_embedded_items() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(), "sale_number": "V-000001", "subtotal": 25, "tax": "4.00", "total": 29.0,
            "payment_method": "transfer", "status": "completed", "created_at": "2024-03-01T10:00:00Z",
            "sale_items": [{ "product_id": Uuid::new_v4(), "quantity": 2, "unit_price": 10, "line_total": 20 }]
        });
        let sale: Sale = serde_json::from_value(json).unwrap();
        assert_eq!(sale.payment_method, PaymentMethod::Transfer);
        assert_eq!(sale.items.len(), 1);
        assert!(sale.totals().is_consistent());
        assert_eq!(sale.unit_count(), 2);
    }
}
