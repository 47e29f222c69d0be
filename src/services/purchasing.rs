//! Purchase orders and receipt.

use uuid::Uuid;
use validator::Validate;

use super::{AlertService, Context};
use crate::domain::aggregates::{NewPurchase, Purchase, PurchaseInput, PurchaseTarget};
use crate::domain::events::{DomainEvent, PurchaseEvent};
use crate::store::Action;
use crate::{PosError, Result};

#[derive(Clone)]
pub struct PurchasingService {
    ctx: Context,
    alerts: AlertService,
}

impl PurchasingService {
    pub fn new(ctx: Context, alerts: AlertService) -> Self { Self { ctx, alerts } }

    pub async fn purchases(&self) -> Result<Vec<Purchase>> {
        if let Some(purchases) = self.ctx.store.select(|s| s.purchases.is_fresh().then(|| s.purchases.items().to_vec())) {
            return Ok(purchases);
        }
        let _loading = self.ctx.loading("purchases");
        let purchases = self.ctx.track(self.ctx.backend.list_purchases().await)?;
        self.ctx.store.dispatch(Action::PurchasesLoaded(purchases.clone()))?;
        Ok(purchases)
    }

    pub async fn purchase(&self, id: Uuid) -> Result<Purchase> {
        match self.ctx.track(self.ctx.backend.get_purchase(id).await)? {
            Some(purchase) => Ok(purchase),
            None => self.ctx.fail(PosError::NotFound("Purchase")),
        }
    }

    pub async fn create(&self, input: PurchaseInput) -> Result<Purchase> {
        if let Err(e) = input.validate() { return self.ctx.fail(e); }
        let new_purchase = match NewPurchase::build(input, self.ctx.tax_rate) {
            Ok(p) => p,
            Err(e) => return self.ctx.fail(e),
        };
        let purchase = self.ctx.track(self.ctx.backend.create_purchase(&new_purchase).await)?;
        self.ctx.store.dispatch(Action::PurchasesInvalidated)?;
        tracing::info!(purchase_id = %purchase.id, supplier = %purchase.supplier_name, total = %purchase.total, "Purchase created");
        self.ctx.succeed(format!("Purchase from {} created", purchase.supplier_name));
        self.ctx.publisher.publish(DomainEvent::Purchase(PurchaseEvent::Created { purchase_id: purchase.id, total: purchase.total })).await;
        Ok(purchase)
    }

    /// Marks the purchase received and adds its quantities to stock, once.
    /// Status change and stock increase happen in one remote call.
    pub async fn receive(&self, id: Uuid) -> Result<Purchase> {
        let current = self.purchase(id).await?;
        if current.is_received() { return self.ctx.fail(PosError::PurchaseAlreadyReceived); }
        let purchase = match self.ctx.backend.receive_purchase(id).await {
            Ok(p) => p,
            Err(PosError::Remote { status: 409, message }) if message.contains("already received") => {
                return self.ctx.fail(PosError::PurchaseAlreadyReceived);
            }
            Err(e) => return self.ctx.fail(e),
        };

        let hints = current.items.iter().filter_map(|item| match item.target() {
            Some(PurchaseTarget::Existing(product_id)) => Some(Action::StockAdjusted { product_id, delta: i64::from(item.quantity) }),
            _ => None,
        });
        self.ctx.dispatch_all(hints.chain([Action::ProductsInvalidated, Action::PurchasesInvalidated]));
        // the receipt is done; a failed alert refresh only leaves alerts stale
        if let Err(e) = self.alerts.refresh().await {
            tracing::warn!(error = %e, "Alert refresh after receipt failed");
        }

        tracing::info!(purchase_id = %id, units = purchase.unit_count(), "Purchase received");
        self.ctx.succeed(format!("Purchase from {} received", purchase.supplier_name));
        self.ctx.publisher.publish(DomainEvent::Purchase(PurchaseEvent::Received { purchase_id: id, units: purchase.unit_count() })).await;
        Ok(purchase)
    }
}
