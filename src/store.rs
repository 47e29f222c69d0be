//! Application state container.
//!
//! Everything the UI used to keep in global state lives here: the session, the
//! cart, loading flags, notifications and cached query results. State only
//! changes through [`Store::dispatch`]; the lock is never held across an await.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, Category, Product, Purchase, Sale};
use crate::domain::alerts::StockAlert;
use crate::domain::session::{Profile, Session};
use crate::Result;

const MAX_NOTIFICATIONS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel { Success, Error, Info, Warning }

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    #[default]
    Empty,
    Fresh,
    /// Holds data that a mutation has made outdated; the next read refetches.
    Stale,
}

/// Cached result of one list query. Loads replace the whole list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryCache<T> {
    items: Vec<T>,
    status: CacheStatus,
    fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self { Self { items: Vec::new(), status: CacheStatus::Empty, fetched_at: None } }
}

impl<T> QueryCache<T> {
    pub fn items(&self) -> &[T] { &self.items }
    pub fn status(&self) -> CacheStatus { self.status }
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> { self.fetched_at }
    pub fn is_fresh(&self) -> bool { self.status == CacheStatus::Fresh }

    fn load(&mut self, items: Vec<T>) {
        self.items = items;
        self.status = CacheStatus::Fresh;
        self.fetched_at = Some(Utc::now());
    }

    fn invalidate(&mut self) {
        if self.status == CacheStatus::Fresh { self.status = CacheStatus::Stale; }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct State {
    #[serde(skip)]
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub cart: Cart,
    pub notifications: Vec<Notification>,
    pub loading: BTreeSet<String>,
    pub products: QueryCache<Product>,
    pub categories: QueryCache<Category>,
    pub sales: QueryCache<Sale>,
    pub purchases: QueryCache<Purchase>,
    pub alerts: QueryCache<StockAlert>,
}

impl State {
    pub fn is_signed_in(&self) -> bool { self.session.is_some() }
    pub fn is_loading(&self, key: &str) -> bool { self.loading.contains(key) }
}

/// Every state transition the application performs.
#[derive(Clone, Debug)]
pub enum Action {
    SessionStarted { session: Session, profile: Option<Profile> },
    SessionEnded,

    CartItemAdded(CartItem),
    CartQuantitySet { product_id: Uuid, size: Option<String>, color: Option<String>, quantity: u32 },
    CartItemRemoved { product_id: Uuid, size: Option<String>, color: Option<String> },
    CartCleared,
    CartRepriced,

    ProductsLoaded(Vec<Product>),
    ProductsInvalidated,
    /// Optimistic local change after a confirmed sale or receipt.
    StockAdjusted { product_id: Uuid, delta: i64 },
    CategoriesLoaded(Vec<Category>),
    CategoriesInvalidated,
    SalesLoaded(Vec<Sale>),
    SalesInvalidated,
    PurchasesLoaded(Vec<Purchase>),
    PurchasesInvalidated,
    AlertsComputed(Vec<StockAlert>),

    Notify { level: NotificationLevel, message: String },
    NotificationDismissed(Uuid),
    LoadingStarted(String),
    LoadingFinished(String),
}

#[derive(Default)]
pub struct Store {
    state: RwLock<State>,
}

impl Store {
    pub fn new() -> Self { Self::default() }

    /// Applies one action. A rejected action leaves the state unchanged.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        let mut state = self.write();
        match action {
            Action::SessionStarted { session, profile } => {
                state.session = Some(session);
                state.profile = profile;
            }
            Action::SessionEnded => {
                let notifications = std::mem::take(&mut state.notifications);
                *state = State { notifications, ..State::default() };
            }
            Action::CartItemAdded(item) => state.cart.add_item(item)?,
            Action::CartQuantitySet { product_id, size, color, quantity } => {
                state.cart.update_quantity(product_id, size.as_deref(), color.as_deref(), quantity)?
            }
            Action::CartItemRemoved { product_id, size, color } => {
                state.cart.remove_item(product_id, size.as_deref(), color.as_deref())?
            }
            Action::CartCleared => state.cart.clear(),
            Action::CartRepriced => {
                let State { cart, products, .. } = &mut *state;
                cart.reprice(products.items());
            }
            Action::ProductsLoaded(items) => state.products.load(items),
            Action::ProductsInvalidated => state.products.invalidate(),
            Action::StockAdjusted { product_id, delta } => {
                if let Some(p) = state.products.items.iter_mut().find(|p| p.id == product_id) {
                    p.adjust_stock(delta);
                }
            }
            Action::CategoriesLoaded(items) => state.categories.load(items),
            Action::CategoriesInvalidated => state.categories.invalidate(),
            Action::SalesLoaded(items) => state.sales.load(items),
            Action::SalesInvalidated => state.sales.invalidate(),
            Action::PurchasesLoaded(items) => state.purchases.load(items),
            Action::PurchasesInvalidated => state.purchases.invalidate(),
            Action::AlertsComputed(items) => state.alerts.load(items),
            Action::Notify { level, message } => {
                state.notifications.push(Notification { id: Uuid::new_v4(), level, message, created_at: Utc::now() });
                let overflow = state.notifications.len().saturating_sub(MAX_NOTIFICATIONS);
                state.notifications.drain(..overflow);
            }
            Action::NotificationDismissed(id) => state.notifications.retain(|n| n.id != id),
            Action::LoadingStarted(key) => { state.loading.insert(key); }
            Action::LoadingFinished(key) => { state.loading.remove(&key); }
        }
        Ok(())
    }

    pub fn select<R>(&self, f: impl FnOnce(&State) -> R) -> R { f(&self.read()) }

    pub fn snapshot(&self) -> State { self.read().clone() }

    /// Token of the current session while it has not expired.
    pub fn access_token(&self) -> Option<String> {
        self.select(|s| s.session.as_ref().filter(|session| !session.is_expired(Utc::now())).map(|session| session.access_token.clone()))
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        // Notify never fails
        let _ = self.dispatch(Action::Notify { level, message: message.into() });
    }

    fn read(&self) -> RwLockReadGuard<'_, State> { self.state.read().unwrap_or_else(|e| e.into_inner()) }
    fn write(&self) -> RwLockWriteGuard<'_, State> { self.state.write().unwrap_or_else(|e| e.into_inner()) }
}
