//! HTTP client for the hosted backend (REST tables, RPC, auth, storage).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::Backend;
use crate::domain::aggregates::{Category, CategoryInput, NewPurchase, NewSale, Product, ProductInput, Purchase, Sale};
use crate::domain::reports::{DashboardStats, DateRange, SalesTrend};
use crate::domain::session::{Credentials, Profile, Session, TokenGrant};
use crate::domain::value_objects::Sku;
use crate::{PosError, Result};

const SALE_SELECT: &str = "*,sale_items(*)";
const PURCHASE_SELECT: &str = "*,purchase_items(*)";

/// Client for the hosted backend. Requests carry the anonymous key until a
/// user signs in, then the user's access token.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    access_token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct IdRow {
    #[allow(dead_code)]
    id: Uuid,
}

#[derive(Deserialize)]
struct StoredObject {
    #[serde(rename = "Key")]
    key: String,
}

/// Error bodies differ between the REST, auth and storage endpoints.
#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.message.or(self.error_description).or(self.msg).or(self.error).or(self.details)
    }
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            bucket: bucket.into(),
            access_token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    pub fn anon_key(&self) -> &str { &self.anon_key }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn table_url(&self, table: &str) -> String { format!("{}/rest/v1/{}", self.base_url, table) }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        self.client.request(method, url).header("apikey", &self.anon_key).bearer_auth(token)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        let req = self.request(method.clone(), &self.table_url(table));
        if method == Method::GET { req } else { req.header("Prefer", "return=representation") }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        Self::decode(resp).await
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<()> {
        let resp = req.send().await?;
        if !resp.status().is_success() { return Err(Self::remote_error(resp).await); }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        if !resp.status().is_success() { return Err(Self::remote_error(resp).await); }
        Ok(resp.json::<T>().await?)
    }

    async fn remote_error(resp: Response) -> PosError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(ErrorBody::into_message)
            .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        debug!(status = status.as_u16(), %message, "Backend call failed");
        PosError::remote(status.as_u16(), message)
    }

    async fn rpc<A: Serialize + ?Sized, T: DeserializeOwned>(&self, name: &str, args: &A) -> Result<T> {
        debug!(procedure = name, "Calling remote procedure");
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, name);
        self.send(self.request(Method::POST, &url).json(args)).await
    }

    fn first<T>(rows: Vec<T>, entity: &'static str) -> Result<T> {
        rows.into_iter().next().ok_or(PosError::NotFound(entity))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let req = self.client.post(&url).query(&[("grant_type", "password")]).header("apikey", &self.anon_key)
            .json(&json!({ "email": credentials.email, "password": credentials.password }));
        let grant: TokenGrant = self.send(req).await?;
        let session = grant.into_session(Utc::now());
        self.set_access_token(Some(session.access_token.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(token) = self.access_token() else { return Ok(()) };
        self.set_access_token(None);
        let url = format!("{}/auth/v1/logout", self.base_url);
        self.send_empty(self.client.post(&url).header("apikey", &self.anon_key).bearer_auth(token)).await
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let req = self.table(Method::GET, "profiles").query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))]);
        let rows: Vec<Profile> = self.send(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.send(self.table(Method::GET, "products").query(&[("select", "*"), ("order", "name.asc")])).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let req = self.table(Method::GET, "products").query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<Product> = self.send(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        let req = self.table(Method::GET, "products")
            .query(&[("select", "*".to_string()), ("sku", format!("eq.{sku}")), ("limit", "1".to_string())]);
        let rows: Vec<Product> = self.send(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_product(&self, input: &ProductInput) -> Result<Product> {
        let rows: Vec<Product> = self.send(self.table(Method::POST, "products").json(input)).await?;
        Self::first(rows, "Product")
    }

    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Product> {
        let req = self.table(Method::PATCH, "products").query(&[("id", format!("eq.{id}"))]).json(input);
        Self::first(self.send(req).await?, "Product")
    }

    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Product> {
        let req = self.table(Method::PATCH, "products").query(&[("id", format!("eq.{id}"))]).json(&json!({ "is_active": active }));
        Self::first(self.send(req).await?, "Product")
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.send(self.table(Method::GET, "categories").query(&[("select", "*"), ("order", "name.asc")])).await
    }

    async fn insert_category(&self, input: &CategoryInput) -> Result<Category> {
        Self::first(self.send(self.table(Method::POST, "categories").json(input)).await?, "Category")
    }

    async fn update_category(&self, id: Uuid, input: &CategoryInput) -> Result<Category> {
        let req = self.table(Method::PATCH, "categories").query(&[("id", format!("eq.{id}"))]).json(input);
        Self::first(self.send(req).await?, "Category")
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        let req = self.table(Method::DELETE, "categories").query(&[("id", format!("eq.{id}"))]);
        let rows: Vec<Category> = self.send(req).await?;
        Self::first(rows, "Category").map(|_| ())
    }

    async fn count_products_in_category(&self, id: Uuid) -> Result<u64> {
        let req = self.table(Method::GET, "products").query(&[("select", "id".to_string()), ("category_id", format!("eq.{id}"))]);
        let rows: Vec<IdRow> = self.send(req).await?;
        Ok(rows.len() as u64)
    }

    async fn list_sales(&self, range: Option<DateRange>) -> Result<Vec<Sale>> {
        let mut query = vec![("select", SALE_SELECT.to_string()), ("order", "created_at.desc".to_string())];
        if let Some(range) = range {
            query.push(("created_at", format!("gte.{}", range.start.to_rfc3339())));
            query.push(("created_at", format!("lt.{}", range.end.to_rfc3339())));
        }
        self.send(self.table(Method::GET, "sales").query(&query)).await
    }

    async fn create_sale(&self, sale: &NewSale) -> Result<Sale> {
        self.rpc("create_sale", &json!({ "p_sale": sale.sale, "p_items": sale.items })).await
    }

    async fn list_purchases(&self) -> Result<Vec<Purchase>> {
        self.send(self.table(Method::GET, "purchases").query(&[("select", PURCHASE_SELECT), ("order", "created_at.desc")])).await
    }

    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>> {
        let req = self.table(Method::GET, "purchases").query(&[("select", PURCHASE_SELECT.to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<Purchase> = self.send(req).await?;
        Ok(rows.into_iter().next())
    }

    async fn create_purchase(&self, purchase: &NewPurchase) -> Result<Purchase> {
        self.rpc("create_purchase", &json!({ "p_purchase": purchase.purchase, "p_items": purchase.items })).await
    }

    async fn receive_purchase(&self, id: Uuid) -> Result<Purchase> {
        self.rpc("receive_purchase", &json!({ "p_purchase_id": id })).await
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.rpc("get_dashboard_stats", &json!({})).await
    }

    async fn sales_trend(&self, range: DateRange) -> Result<SalesTrend> {
        self.rpc("get_sales_trend", &json!({ "p_start": range.start, "p_end": range.end })).await
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        debug!(%path, size = bytes.len(), "Uploading object");
        let req = self.request(Method::POST, &url).header("Content-Type", content_type).header("x-upsert", "true").body(bytes);
        let stored: StoredObject = self.send(req).await?;
        Ok(stored.key)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}
