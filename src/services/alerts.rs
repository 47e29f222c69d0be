//! Stock alert monitor.
//!
//! Alerts are recomputed from the whole product list on every refresh. The
//! watcher refreshes after each product-table change and applies the result
//! only while its token is live.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::domain::alerts::{count, derive_alerts, AlertCounts, StockAlert};
use crate::domain::events::{DomainEvent, InventoryEvent};
use crate::realtime::ChangeFeed;
use crate::store::Action;
use crate::Result;

const RESUBSCRIBE_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AlertService {
    ctx: Context,
}

impl AlertService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Cached alerts, computed on first use.
    pub async fn alerts(&self) -> Result<Vec<StockAlert>> {
        if let Some(alerts) = self.ctx.store.select(|s| s.alerts.is_fresh().then(|| s.alerts.items().to_vec())) {
            return Ok(alerts);
        }
        self.refresh().await
    }

    pub fn counts(&self) -> AlertCounts {
        self.ctx.store.select(|s| count(s.alerts.items()))
    }

    /// Refetches products and recomputes every alert.
    pub async fn refresh(&self) -> Result<Vec<StockAlert>> {
        let _loading = self.ctx.loading("alerts");
        let products = self.ctx.track(self.ctx.backend.list_products().await)?;
        self.ctx.store.dispatch(Action::ProductsLoaded(products))?;
        Ok(self.recompute().await)
    }

    /// Recomputes alerts from the cached products without a remote call.
    pub async fn recompute(&self) -> Vec<StockAlert> {
        let alerts = self.ctx.store.select(|s| derive_alerts(s.products.items()));
        self.apply(alerts.clone()).await;
        alerts
    }

    async fn apply(&self, alerts: Vec<StockAlert>) {
        let before = self.counts();
        let after = count(&alerts);
        self.ctx.dispatch_all([Action::AlertsComputed(alerts)]);
        if before != after {
            tracing::info!(out_of_stock = after.out_of_stock, critical = after.critical, warning = after.warning, "Stock alerts changed");
            self.ctx.publisher.publish(DomainEvent::Inventory(InventoryEvent::AlertsChanged { counts: after })).await;
        }
    }

    /// Refreshes alerts on every product change until `cancel` fires. Failed
    /// refreshes are logged and skipped; an ended feed is subscribed again.
    pub fn watch(&self, feed: Arc<dyn ChangeFeed>, cancel: CancellationToken) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            while !cancel.is_cancelled() {
                match feed.subscribe("products") {
                    Ok(mut subscription) => {
                        loop {
                            let event = tokio::select! {
                                _ = cancel.cancelled() => break,
                                event = subscription.next() => event,
                            };
                            let Some(event) = event else { break };
                            tracing::debug!(kind = ?event.kind, record_id = ?event.record_id, "Product change received");
                            match service.ctx.backend.list_products().await {
                                // a refresh finishing after cancellation is dropped
                                Ok(_) if cancel.is_cancelled() => break,
                                Ok(products) => {
                                    service.ctx.dispatch_all([Action::ProductsLoaded(products)]);
                                    service.recompute().await;
                                }
                                Err(e) => tracing::warn!(error = %e, "Alert refresh after product change failed"),
                            }
                        }
                        subscription.cancel();
                    }
                    Err(e) => tracing::warn!(error = %e, "Cannot subscribe to product changes"),
                }
                if cancel.is_cancelled() { break; }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RESUBSCRIBE_AFTER) => tracing::debug!("Resubscribing to product changes"),
                }
            }
            tracing::debug!("Alert watcher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProductInput;
    use crate::domain::alerts::Severity;
    use crate::domain::value_objects::{Money, Sku};
    use crate::services::testing::context;
    use crate::store::NotificationLevel;

    async fn product(ctx: &Context, sku: &str, stock: u32, min: u32) -> uuid::Uuid {
        let input = ProductInput::new(Sku::new(sku).unwrap(), sku, Money::cents(100), Money::cents(50)).with_stock(stock, min);
        ctx.backend.insert_product(&input).await.unwrap().id
    }

    #[tokio::test]
    async fn test_refresh_classifies_products() {
        let (_, ctx) = context();
        product(&ctx, "A", 0, 5).await;
        product(&ctx, "B", 3, 10).await;
        product(&ctx, "C", 8, 10).await;
        product(&ctx, "D", 50, 10).await;
        let alerts = AlertService::new(ctx).refresh().await.unwrap();
        let severities: Vec<_> = alerts.iter().map(|a| (a.sku.as_str().to_string(), a.severity)).collect();
        assert_eq!(severities, vec![
            ("A".to_string(), Severity::OutOfStock),
            ("B".to_string(), Severity::Critical),
            ("C".to_string(), Severity::Warning),
        ]);
    }

    #[tokio::test]
    async fn test_watch_follows_changes_until_cancelled() {
        let (backend, ctx) = context();
        let id = product(&ctx, "A", 20, 5).await;
        let service = AlertService::new(ctx.clone());
        assert!(service.refresh().await.unwrap().is_empty());

        let cancel = CancellationToken::new();
        let handle = service.watch(backend.clone(), cancel.clone());
        tokio::task::yield_now().await;
        backend.external_stock_change(id, 0).unwrap();
        for _ in 0..50 {
            if service.counts().out_of_stock == 1 { break; }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.counts().out_of_stock, 1);

        cancel.cancel();
        handle.await.unwrap();
        backend.external_stock_change(id, 30).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.counts().out_of_stock, 1);
    }

    #[tokio::test]
    async fn test_failed_watch_refresh_is_not_reported() {
        let (backend, ctx) = context();
        let id = product(&ctx, "A", 20, 5).await;
        let service = AlertService::new(ctx.clone());
        let cancel = CancellationToken::new();
        let handle = service.watch(backend.clone(), cancel.clone());
        tokio::task::yield_now().await;
        backend.fail_next("list_products", "timeout");
        backend.external_stock_change(id, 0).unwrap();
        for _ in 0..50 {
            if backend.calls().contains(&"list_products") { break; }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(ctx.store.select(|s| s.notifications.iter().all(|n| n.level != NotificationLevel::Error)));
    }
}
