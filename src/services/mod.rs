//! Workflows and read-through queries.
//!
//! Each service makes one remote call per user action, then updates the store:
//! cache loads or invalidations plus a notification. A failed call leaves the
//! store as it was, apart from an error notification.

use std::sync::Arc;

use crate::backend::Backend;
use crate::domain::value_objects::TaxRate;
use crate::publisher::EventPublisher;
use crate::store::{Action, NotificationLevel, Store};
use crate::{PosError, Result};

pub mod alerts;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod import;
pub mod purchasing;
pub mod reports;

pub use alerts::AlertService;
pub use auth::AuthService;
pub use catalog::{CatalogService, ProductQuery};
pub use checkout::{AddToCart, CartView, CheckoutRequest, CheckoutService};
pub use import::ImportService;
pub use purchasing::PurchasingService;
pub use reports::ReportService;

/// Shared handles every service works with.
#[derive(Clone)]
pub struct Context {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<Store>,
    pub publisher: EventPublisher,
    pub tax_rate: TaxRate,
}

impl Context {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<Store>, publisher: EventPublisher, tax_rate: TaxRate) -> Self {
        Self { backend, store, publisher, tax_rate }
    }

    /// Records `err` as an error notification and returns it.
    pub(crate) fn fail<T>(&self, err: impl Into<PosError>) -> Result<T> {
        let err = err.into();
        self.store.notify(NotificationLevel::Error, err.to_string());
        Err(err)
    }

    pub(crate) fn track<T>(&self, result: Result<T>) -> Result<T> {
        result.or_else(|e| self.fail(e))
    }

    pub(crate) fn succeed(&self, message: impl Into<String>) {
        self.store.notify(NotificationLevel::Success, message);
    }

    pub(crate) fn dispatch_all(&self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            if let Err(e) = self.store.dispatch(action) {
                tracing::warn!(error = %e, "Store rejected follow-up action");
            }
        }
    }

    /// Marks `key` as loading until the returned guard is dropped.
    pub(crate) fn loading(&self, key: &'static str) -> Loading<'_> {
        let _ = self.store.dispatch(Action::LoadingStarted(key.to_string()));
        Loading { store: &self.store, key }
    }
}

pub(crate) struct Loading<'a> {
    store: &'a Store,
    key: &'static str,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let _ = self.store.dispatch(Action::LoadingFinished(self.key.to_string()));
    }
}

/// All services, wired to one backend and one store.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub purchasing: PurchasingService,
    pub alerts: AlertService,
    pub reports: ReportService,
    pub import: ImportService,
}

impl Services {
    pub fn new(ctx: Context) -> Self {
        let catalog = CatalogService::new(ctx.clone());
        let alerts = AlertService::new(ctx.clone());
        Self {
            auth: AuthService::new(ctx.clone()),
            checkout: CheckoutService::new(ctx.clone(), alerts.clone()),
            purchasing: PurchasingService::new(ctx.clone(), alerts.clone()),
            reports: ReportService::new(ctx.clone(), catalog.clone()),
            import: ImportService::new(ctx),
            catalog,
            alerts,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::domain::session::Role;

    pub const EMAIL: &str = "caja@tienda.mx";
    pub const PASSWORD: &str = "secreto1";

    pub fn context() -> (Arc<MemoryBackend>, Context) { context_with(MemoryBackend::new()) }

    pub fn context_with(backend: MemoryBackend) -> (Arc<MemoryBackend>, Context) {
        let backend = Arc::new(backend.with_user(EMAIL, PASSWORD, Role::Admin));
        let ctx = Context::new(backend.clone(), Arc::new(Store::new()), EventPublisher::disabled(), TaxRate::STANDARD);
        (backend, ctx)
    }

    pub fn last_notification(ctx: &Context) -> Option<(NotificationLevel, String)> {
        ctx.store.select(|s| s.notifications.last().map(|n| (n.level, n.message.clone())))
    }
}
