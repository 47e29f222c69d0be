//! Domain events
use crate::domain::alerts::AlertCounts;
use crate::domain::value_objects::{Money, Sku};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Sale(SaleEvent),
    Purchase(PurchaseEvent),
    Inventory(InventoryEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: Sku },
    Updated { product_id: Uuid, sku: Sku },
    Deactivated { product_id: Uuid },
    Imported { created: usize, updated: usize, failed: usize },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SaleEvent {
    Completed { sale_id: Uuid, sale_number: String, total: Money, units: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PurchaseEvent {
    Created { purchase_id: Uuid, total: Money },
    Received { purchase_id: Uuid, units: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    AlertsChanged { counts: AlertCounts },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(_) => "pos.products",
            Self::Sale(_) => "pos.sales",
            Self::Purchase(_) => "pos.purchases",
            Self::Inventory(_) => "pos.inventory",
        }
    }
}
