//! Hosted backend contract.
//!
//! Table reads and writes, the remote procedures that own the atomic stock
//! changes, auth and file storage. Every method is a single remote attempt; no
//! method retries.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::{Category, CategoryInput, NewPurchase, NewSale, Product, ProductInput, Purchase, Sale};
use crate::domain::reports::{DashboardStats, DateRange, SalesTrend};
use crate::domain::session::{Credentials, Profile, Session};
use crate::domain::value_objects::Sku;
use crate::Result;

pub mod memory;
pub mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

#[async_trait]
pub trait Backend: Send + Sync {
    // auth
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session>;
    async fn sign_out(&self) -> Result<()>;
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    // products
    async fn list_products(&self) -> Result<Vec<Product>>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>>;
    async fn insert_product(&self, input: &ProductInput) -> Result<Product>;
    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Product>;
    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Product>;

    // categories
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn insert_category(&self, input: &CategoryInput) -> Result<Category>;
    async fn update_category(&self, id: Uuid, input: &CategoryInput) -> Result<Category>;
    /// Rejected by the backend while any product references the category.
    async fn delete_category(&self, id: Uuid) -> Result<()>;
    async fn count_products_in_category(&self, id: Uuid) -> Result<u64>;

    // sales
    async fn list_sales(&self, range: Option<DateRange>) -> Result<Vec<Sale>>;
    /// `create_sale`: records the sale and decrements stock for every line, or does nothing.
    async fn create_sale(&self, sale: &NewSale) -> Result<Sale>;

    // purchases
    async fn list_purchases(&self) -> Result<Vec<Purchase>>;
    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>>;
    /// `create_purchase`: header and lines in one call.
    async fn create_purchase(&self, purchase: &NewPurchase) -> Result<Purchase>;
    /// `receive_purchase`: status change and stock increase in one call. Fails
    /// when the purchase is not pending.
    async fn receive_purchase(&self, id: Uuid) -> Result<Purchase>;

    // reporting
    async fn dashboard_stats(&self) -> Result<DashboardStats>;
    async fn sales_trend(&self, range: DateRange) -> Result<SalesTrend>;

    // storage
    /// Uploads an object and returns its stored key.
    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
    fn public_url(&self, path: &str) -> String;
}
