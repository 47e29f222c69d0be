//! Cart and sale submission.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use super::{AlertService, Context};
use crate::domain::aggregates::{Cart, CartItem, Customer, NewSale, PaymentMethod, Product, Sale};
use crate::domain::events::{DomainEvent, SaleEvent};
use crate::domain::value_objects::Totals;
use crate::store::Action;
use crate::{PosError, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

fn one() -> u32 { 1 }

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub customer: Customer,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: usize,
    pub unit_count: u32,
    pub totals: Totals,
}

#[derive(Clone)]
pub struct CheckoutService {
    ctx: Context,
    alerts: AlertService,
    // held from the cart snapshot until the cart is cleared
    submitting: Arc<Mutex<()>>,
}

impl CheckoutService {
    pub fn new(ctx: Context, alerts: AlertService) -> Self { Self { ctx, alerts, submitting: Arc::new(Mutex::new(())) } }

    pub fn cart(&self) -> CartView {
        self.ctx.store.select(|s| CartView {
            items: s.cart.items().to_vec(),
            item_count: s.cart.item_count(),
            unit_count: s.cart.unit_count(),
            totals: s.cart.totals(self.ctx.tax_rate),
        })
    }

    pub async fn add_to_cart(&self, req: AddToCart) -> Result<CartView> {
        let product = self.known_product(req.product_id).await?;
        if !product.is_active { return self.ctx.fail(PosError::InactiveProduct(product.sku)); }
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let item = CartItem::from_product(&product, req.quantity, clean(req.size), clean(req.color));
        self.ctx.track(self.ctx.store.dispatch(Action::CartItemAdded(item)))?;
        Ok(self.cart())
    }

    /// A quantity of zero removes the line.
    pub fn set_quantity(&self, product_id: Uuid, size: Option<String>, color: Option<String>, quantity: u32) -> Result<CartView> {
        self.ctx.track(self.ctx.store.dispatch(Action::CartQuantitySet { product_id, size, color, quantity }))?;
        Ok(self.cart())
    }

    pub fn remove(&self, product_id: Uuid, size: Option<String>, color: Option<String>) -> Result<CartView> {
        self.ctx.track(self.ctx.store.dispatch(Action::CartItemRemoved { product_id, size, color }))?;
        Ok(self.cart())
    }

    pub fn clear(&self) -> Result<CartView> {
        self.ctx.store.dispatch(Action::CartCleared)?;
        Ok(self.cart())
    }

    /// Records the cart as one sale through a single remote call. On failure
    /// the cart and the product cache are left as they were. A second call
    /// made while one is in flight waits for it and then finds the cart empty.
    pub async fn complete_sale(&self, req: CheckoutRequest) -> Result<Sale> {
        let _submitting = self.submitting.lock().await;
        let (cart, products) = self.ctx.store.select(|s| (s.cart.clone(), s.products.items().to_vec()));
        if cart.is_empty() { return self.ctx.fail(PosError::EmptyCart); }
        if let Err(e) = req.customer.validate() { return self.ctx.fail(e); }
        self.check_against(&cart, &products)?;

        let new_sale = NewSale::from_cart(&cart, self.ctx.tax_rate, req.customer, req.payment_method, req.notes)?;
        let sale = {
            let _loading = self.ctx.loading("checkout");
            match self.ctx.backend.create_sale(&new_sale).await {
                Ok(sale) => sale,
                Err(e) => {
                    tracing::warn!(error = %e, lines = new_sale.items.len(), "Sale rejected");
                    return self.ctx.fail(e);
                }
            }
        };

        // the server already changed stock; these are local hints until the next fetch
        let adjustments = new_sale.items.iter().map(|i| Action::StockAdjusted { product_id: i.product_id, delta: -i64::from(i.quantity) });
        self.ctx.dispatch_all(adjustments.chain([Action::ProductsInvalidated, Action::SalesInvalidated, Action::CartCleared]));
        self.alerts.recompute().await;

        tracing::info!(sale_id = %sale.id, sale_number = %sale.sale_number, total = %sale.total, "Sale completed");
        self.ctx.succeed(format!("Sale {} completed", sale.sale_number));
        self.ctx.publisher.publish(DomainEvent::Sale(SaleEvent::Completed {
            sale_id: sale.id,
            sale_number: sale.sale_number.clone(),
            total: sale.total,
            units: new_sale.items.iter().map(|i| i.quantity).sum(),
        })).await;
        Ok(sale)
    }

    /// Re-checks the cart against the cached products. The cache can be stale;
    /// the backend makes the final call.
    fn check_against(&self, cart: &Cart, products: &[Product]) -> Result<()> {
        if let Some(p) = cart.items().iter().find_map(|i| products.iter().find(|p| p.id == i.product_id && !p.is_active)) {
            return self.ctx.fail(PosError::InactiveProduct(p.sku.clone()));
        }
        let mut current = cart.clone();
        current.reprice(products);
        match current.first_shortage() {
            Some(shortage) => self.ctx.fail(shortage),
            None => Ok(()),
        }
    }

    async fn known_product(&self, id: Uuid) -> Result<Product> {
        if let Some(p) = self.ctx.store.select(|s| s.products.items().iter().find(|p| p.id == id).cloned()) {
            return Ok(p);
        }
        match self.ctx.track(self.ctx.backend.get_product(id).await)? {
            Some(p) => Ok(p),
            None => self.ctx.fail(PosError::NotFound("Product")),
        }
    }
}
