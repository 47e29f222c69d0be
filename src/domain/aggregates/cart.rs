//! Cart Aggregate

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, Sku, TaxRate, Totals};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

/// One cart line. `available` is the stock the product had when it was last
/// fetched, so it may be stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub available: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: u32, size: Option<String>, color: Option<String>) -> Self {
        Self {
            product_id: product.id, sku: product.sku.clone(), name: product.name.clone(), quantity,
            unit_price: product.price, available: product.stock, size, color,
        }
    }
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
    fn same_line(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id && self.size == other.size && self.color == other.color
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn unit_count(&self) -> u32 { self.items.iter().fold(0, |n, i| n.saturating_add(i.quantity)) }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }
    pub fn totals(&self, rate: TaxRate) -> Totals { Totals::from_lines(self.items.iter().map(CartItem::line_total), rate) }

    /// Units of `product_id` across every size/color line.
    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items.iter().filter(|i| i.product_id == product_id).fold(0, |n, i| n.saturating_add(i.quantity))
    }

    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        let requested = self.quantity_of(item.product_id).checked_add(item.quantity);
        let available = item.available;
        match requested {
            Some(requested) if requested <= available => {}
            _ => return Err(CartError::InsufficientStock { sku: item.sku.clone(), requested: requested.unwrap_or(u32::MAX), available }),
        }
        let mut next = self.clone();
        let product_id = item.product_id;
        if let Some(existing) = next.items.iter_mut().find(|i| i.same_line(&item)) {
            existing.quantity += item.quantity;
            existing.unit_price = item.unit_price;
        } else {
            next.items.push(item);
        }
        next.refresh_available(product_id, available);
        next.check_amounts()?;
        *self = next;
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: Uuid, size: Option<&str>, color: Option<&str>, quantity: u32) -> Result<(), CartError> {
        let idx = self.position(product_id, size, color).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 {
            self.items.remove(idx);
            return Ok(());
        }
        let others = self.quantity_of(product_id).saturating_sub(self.items[idx].quantity);
        let item = &self.items[idx];
        match others.checked_add(quantity) {
            Some(requested) if requested <= item.available => {}
            requested => return Err(CartError::InsufficientStock { sku: item.sku.clone(), requested: requested.unwrap_or(u32::MAX), available: item.available }),
        }
        let mut next = self.clone();
        next.items[idx].quantity = quantity;
        next.check_amounts()?;
        *self = next;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid, size: Option<&str>, color: Option<&str>) -> Result<(), CartError> {
        let idx = self.position(product_id, size, color).ok_or(CartError::ItemNotFound)?;
        self.items.remove(idx);
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }

    /// Re-reads prices and stock from a fresh product list. Lines are kept even
    /// when they now exceed stock; checkout reports them.
    pub fn reprice(&mut self, products: &[Product]) {
        for item in &mut self.items {
            if let Some(p) = products.iter().find(|p| p.id == item.product_id) {
                item.unit_price = p.price;
                item.available = p.stock;
                item.name = p.name.clone();
            }
        }
    }

    /// First line whose product quantity exceeds the known stock.
    pub fn first_shortage(&self) -> Option<CartError> {
        self.items.iter().find_map(|i| {
            let requested = self.quantity_of(i.product_id);
            (requested > i.available).then(|| CartError::InsufficientStock { sku: i.sku.clone(), requested, available: i.available })
        })
    }

    fn position(&self, product_id: Uuid, size: Option<&str>, color: Option<&str>) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product_id && i.size.as_deref() == size && i.color.as_deref() == color)
    }

    // every line total and the subtotal must fit in a Money
    fn check_amounts(&self) -> Result<(), CartError> {
        self.items.iter()
            .try_fold(Money::ZERO, |acc, i| i.unit_price.checked_mul(i.quantity).and_then(|line| acc.checked_add(line)))
            .map(|_| ())
            .ok_or(CartError::AmountTooLarge)
    }

    fn refresh_available(&mut self, product_id: Uuid, available: u32) {
        for i in self.items.iter_mut().filter(|i| i.product_id == product_id) { i.available = available; }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartError {
    ItemNotFound,
    InvalidQuantity,
    InsufficientStock { sku: Sku, requested: u32, available: u32 },
    AmountTooLarge,
}
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::InsufficientStock { sku, requested, available } => write!(f, "Only {available} of {sku} in stock ({requested} requested)"),
            Self::AmountTooLarge => write!(f, "Amount is too large"),
        }
    }
}
