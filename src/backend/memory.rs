//! In-process backend.
//!
//! Holds every table behind one mutex, so each remote procedure below applies
//! completely or not at all, the way the hosted procedures do. Used by the
//! tests and by `POS_BACKEND=memory`.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::Backend;
use crate::domain::aggregates::{
    Category, CategoryInput, NewPurchase, NewSale, Product, ProductInput, Purchase, PurchaseStatus, PurchaseTarget, Sale,
    SaleItem, SaleStatus,
};
use crate::domain::alerts::{count, derive_alerts};
use crate::domain::reports::{trend_of, DashboardStats, DateRange, InventorySummary, SalesTrend};
use crate::domain::session::{AuthUser, Credentials, Profile, Role, Session};
use crate::domain::value_objects::Sku;
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, Subscription};
use crate::{PosError, Result};

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    categories: Vec<Category>,
    sales: Vec<Sale>,
    purchases: Vec<Purchase>,
    profiles: Vec<Profile>,
    users: HashMap<String, (String, Uuid)>,
    objects: HashMap<String, Vec<u8>>,
    sale_seq: u64,
}

pub struct MemoryBackend {
    tables: Mutex<Tables>,
    bucket: String,
    changes: broadcast::Sender<ChangeEvent>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<&'static str, PosError>>,
    latency: Option<std::time::Duration>,
}

impl Default for MemoryBackend {
    fn default() -> Self { Self::new() }
}

fn conflict(message: impl Into<String>) -> PosError { PosError::remote(409, message) }
fn bad_request(message: impl Into<String>) -> PosError { PosError::remote(400, message) }

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            tables: Mutex::new(Tables::default()),
            bucket: crate::config::DEFAULT_BUCKET.to_string(),
            changes,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            latency: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Delays the sale and receipt procedures as a network round trip would.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_user(self, email: &str, password: &str, role: Role) -> Self {
        let id = Uuid::new_v4();
        {
            let mut t = self.lock();
            t.users.insert(email.to_lowercase(), (password.to_string(), id));
            t.profiles.push(Profile { id, full_name: None, role });
        }
        self
    }

    /// Names of the backend operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Makes the next call to `operation` fail with a 400 carrying `message`.
    pub fn fail_next(&self, operation: &'static str, message: impl Into<String>) {
        self.fail_next_with(operation, bad_request(message));
    }

    pub fn fail_next_with(&self, operation: &'static str, error: PosError) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).insert(operation, error);
    }

    /// Applies a change made outside this service, as another terminal would.
    pub fn external_stock_change(&self, id: Uuid, stock: u32) -> Result<()> {
        {
            let mut t = self.lock();
            let product = t.products.iter_mut().find(|p| p.id == id).ok_or(PosError::NotFound("Product"))?;
            product.stock = stock;
            product.updated_at = Utc::now();
        }
        self.notify(ChangeKind::Update, id);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(operation);
        match self.failures.lock().unwrap_or_else(|e| e.into_inner()).remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn notify(&self, kind: ChangeKind, id: Uuid) {
        // no receivers is fine
        let _ = self.changes.send(ChangeEvent { table: "products".into(), kind, record_id: Some(id) });
    }

    fn check_category(t: &Tables, category_id: Option<Uuid>) -> Result<()> {
        match category_id {
            Some(id) if !t.categories.iter().any(|c| c.id == id) => {
                Err(conflict("insert or update on table \"products\" violates foreign key constraint \"products_category_id_fkey\""))
            }
            _ => Ok(()),
        }
    }

    fn check_sku(t: &Tables, sku: &Sku, except: Option<Uuid>) -> Result<()> {
        if t.products.iter().any(|p| &p.sku == sku && Some(p.id) != except) {
            return Err(conflict(format!("duplicate key value violates unique constraint \"products_sku_key\" ({sku})")));
        }
        Ok(())
    }

    fn write_product(product: &mut Product, input: &ProductInput) {
        product.sku = input.sku.clone();
        product.name = input.name.clone();
        product.description = input.description.clone();
        product.price = input.price;
        product.cost = input.cost;
        product.stock = input.stock;
        product.min_stock = input.min_stock;
        product.category_id = input.category_id;
        product.is_active = input.is_active;
        product.sizes = input.sizes.clone();
        product.colors = input.colors.clone();
        if input.image_url.is_some() { product.image_url = input.image_url.clone(); }
        product.updated_at = Utc::now();
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session> {
        self.enter("sign_in")?;
        let t = self.lock();
        match t.users.get(&credentials.email.to_lowercase()) {
            Some((password, id)) if *password == credentials.password => Ok(Session {
                access_token: format!("memory-{}", Uuid::new_v4()),
                refresh_token: Uuid::new_v4().to_string(),
                expires_at: Utc::now() + Duration::hours(1),
                user: AuthUser { id: *id, email: Some(credentials.email.clone()) },
            }),
            _ => Err(bad_request("Invalid login credentials")),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.enter("sign_out")
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.enter("profile")?;
        Ok(self.lock().profiles.iter().find(|p| p.id == user_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.enter("list_products")?;
        let mut products = self.lock().products.clone();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        self.enter("get_product")?;
        Ok(self.lock().products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_product_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        self.enter("find_product_by_sku")?;
        Ok(self.lock().products.iter().find(|p| &p.sku == sku).cloned())
    }

    async fn insert_product(&self, input: &ProductInput) -> Result<Product> {
        self.enter("insert_product")?;
        let product = {
            let mut t = self.lock();
            Self::check_sku(&t, &input.sku, None)?;
            Self::check_category(&t, input.category_id)?;
            let now = Utc::now();
            let mut product = Product {
                id: Uuid::now_v7(), sku: input.sku.clone(), name: String::new(), description: None,
                price: input.price, cost: input.cost, stock: 0, min_stock: 0, category_id: None, is_active: true,
                sizes: vec![], colors: vec![], image_url: None, created_at: now, updated_at: now,
            };
            Self::write_product(&mut product, input);
            t.products.push(product.clone());
            product
        };
        self.notify(ChangeKind::Insert, product.id);
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<Product> {
        self.enter("update_product")?;
        let product = {
            let mut t = self.lock();
            Self::check_sku(&t, &input.sku, Some(id))?;
            Self::check_category(&t, input.category_id)?;
            let product = t.products.iter_mut().find(|p| p.id == id).ok_or(PosError::NotFound("Product"))?;
            Self::write_product(product, input);
            product.clone()
        };
        self.notify(ChangeKind::Update, id);
        Ok(product)
    }

    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Product> {
        self.enter("set_product_active")?;
        let product = {
            let mut t = self.lock();
            let product = t.products.iter_mut().find(|p| p.id == id).ok_or(PosError::NotFound("Product"))?;
            product.is_active = active;
            product.updated_at = Utc::now();
            product.clone()
        };
        self.notify(ChangeKind::Update, id);
        Ok(product)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.enter("list_categories")?;
        let mut categories = self.lock().categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_category(&self, input: &CategoryInput) -> Result<Category> {
        self.enter("insert_category")?;
        let mut t = self.lock();
        if t.categories.iter().any(|c| c.name.eq_ignore_ascii_case(&input.name)) {
            return Err(conflict("duplicate key value violates unique constraint \"categories_name_key\""));
        }
        let category = Category { id: Uuid::now_v7(), name: input.name.clone(), description: input.description.clone(), created_at: Utc::now() };
        t.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, input: &CategoryInput) -> Result<Category> {
        self.enter("update_category")?;
        let mut t = self.lock();
        if t.categories.iter().any(|c| c.id != id && c.name.eq_ignore_ascii_case(&input.name)) {
            return Err(conflict("duplicate key value violates unique constraint \"categories_name_key\""));
        }
        let category = t.categories.iter_mut().find(|c| c.id == id).ok_or(PosError::NotFound("Category"))?;
        category.name = input.name.clone();
        category.description = input.description.clone();
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<()> {
        self.enter("delete_category")?;
        let mut t = self.lock();
        if t.products.iter().any(|p| p.category_id == Some(id)) {
            return Err(conflict("update or delete on table \"categories\" violates foreign key constraint \"products_category_id_fkey\""));
        }
        let before = t.categories.len();
        t.categories.retain(|c| c.id != id);
        if t.categories.len() == before { return Err(PosError::NotFound("Category")); }
        Ok(())
    }

    async fn count_products_in_category(&self, id: Uuid) -> Result<u64> {
        self.enter("count_products_in_category")?;
        Ok(self.lock().products.iter().filter(|p| p.category_id == Some(id)).count() as u64)
    }

    async fn list_sales(&self, range: Option<DateRange>) -> Result<Vec<Sale>> {
        self.enter("list_sales")?;
        let mut sales: Vec<Sale> = self.lock().sales.iter().filter(|s| range.map_or(true, |r| r.contains(s.created_at))).cloned().collect();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sales)
    }

    async fn create_sale(&self, new_sale: &NewSale) -> Result<Sale> {
        self.enter("create_sale")?;
        self.round_trip().await;
        if new_sale.items.is_empty() { return Err(bad_request("sale has no items")); }
        if !new_sale.totals().is_consistent() { return Err(bad_request("total does not equal subtotal plus tax")); }
        let (sale, touched) = {
            let mut t = self.lock();
            // check every line before touching stock
            let mut wanted: HashMap<Uuid, u32> = HashMap::new();
            for item in &new_sale.items {
                if item.quantity == 0 { return Err(bad_request("quantity must be positive")); }
                let total = wanted.entry(item.product_id).or_default();
                *total = total.checked_add(item.quantity).ok_or_else(|| bad_request("quantity out of range"))?;
            }
            for (id, qty) in &wanted {
                let product = t.products.iter().find(|p| p.id == *id).ok_or_else(|| bad_request(format!("product {id} does not exist")))?;
                if product.stock < *qty {
                    return Err(bad_request(format!("Insufficient stock for {} (available {}, requested {qty})", product.sku, product.stock)));
                }
            }
            let now = Utc::now();
            for product in t.products.iter_mut() {
                if let Some(qty) = wanted.get(&product.id) {
                    product.stock -= qty;
                    product.updated_at = now;
                }
            }
            t.sale_seq += 1;
            let items = new_sale.items.iter().map(|i| SaleItem {
                id: Some(Uuid::new_v4()), product_id: i.product_id,
                product_name: t.products.iter().find(|p| p.id == i.product_id).map(|p| p.name.clone()),
                quantity: i.quantity, unit_price: i.unit_price, line_total: i.line_total, size: i.size.clone(), color: i.color.clone(),
            }).collect();
            let h = &new_sale.sale;
            let sale = Sale {
                id: Uuid::now_v7(), sale_number: format!("V-{:06}", t.sale_seq),
                customer_name: h.customer_name.clone(), customer_email: h.customer_email.clone(), customer_phone: h.customer_phone.clone(),
                subtotal: h.subtotal, tax: h.tax, total: h.total, payment_method: h.payment_method, status: SaleStatus::Completed,
                notes: h.notes.clone(), created_at: now, items,
            };
            t.sales.push(sale.clone());
            (sale, wanted.into_keys().collect::<Vec<_>>())
        };
        for id in touched { self.notify(ChangeKind::Update, id); }
        Ok(sale)
    }

    async fn list_purchases(&self) -> Result<Vec<Purchase>> {
        self.enter("list_purchases")?;
        let mut purchases = self.lock().purchases.clone();
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(purchases)
    }

    async fn get_purchase(&self, id: Uuid) -> Result<Option<Purchase>> {
        self.enter("get_purchase")?;
        Ok(self.lock().purchases.iter().find(|p| p.id == id).cloned())
    }

    async fn create_purchase(&self, new_purchase: &NewPurchase) -> Result<Purchase> {
        self.enter("create_purchase")?;
        let mut t = self.lock();
        for item in &new_purchase.items {
            match item.target() {
                Some(PurchaseTarget::Existing(id)) if !t.products.iter().any(|p| p.id == id) => {
                    return Err(bad_request(format!("product {id} does not exist")));
                }
                None => return Err(bad_request("purchase line needs a product")),
                _ => {}
            }
        }
        let h = &new_purchase.purchase;
        let purchase = Purchase {
            id: Uuid::now_v7(), supplier_name: h.supplier_name.clone(), supplier_contact: h.supplier_contact.clone(),
            notes: h.notes.clone(), subtotal: h.subtotal, tax: h.tax, total: h.total, status: PurchaseStatus::Pending,
            received_at: None, created_at: Utc::now(),
            items: new_purchase.items.iter().cloned().map(|mut i| { i.id = Some(Uuid::new_v4()); i }).collect(),
        };
        t.purchases.push(purchase.clone());
        Ok(purchase)
    }

    async fn receive_purchase(&self, id: Uuid) -> Result<Purchase> {
        self.enter("receive_purchase")?;
        self.round_trip().await;
        let (purchase, touched) = {
            let mut t = self.lock();
            let idx = t.purchases.iter().position(|p| p.id == id).ok_or(PosError::NotFound("Purchase"))?;
            if t.purchases[idx].is_received() { return Err(conflict("purchase already received")); }
            let items = t.purchases[idx].items.clone();
            // validate before applying anything
            let mut new_skus = HashSet::new();
            for item in &items {
                match item.target() {
                    Some(PurchaseTarget::Existing(pid)) if !t.products.iter().any(|p| p.id == pid) => {
                        return Err(bad_request(format!("product {pid} does not exist")));
                    }
                    Some(PurchaseTarget::New(fields)) => {
                        if !new_skus.insert(fields.sku.clone()) || t.products.iter().any(|p| p.sku == fields.sku) {
                            return Err(conflict(format!("duplicate key value violates unique constraint \"products_sku_key\" ({})", fields.sku)));
                        }
                    }
                    None => return Err(bad_request("purchase line needs a product")),
                    _ => {}
                }
            }
            let now = Utc::now();
            let mut touched = Vec::with_capacity(items.len());
            for item in &items {
                match item.target() {
                    Some(PurchaseTarget::Existing(pid)) => {
                        if let Some(p) = t.products.iter_mut().find(|p| p.id == pid) {
                            p.stock = p.stock.saturating_add(item.quantity);
                            p.cost = item.unit_cost;
                            p.updated_at = now;
                            touched.push((ChangeKind::Update, pid));
                        }
                    }
                    Some(PurchaseTarget::New(fields)) => {
                        let product = Product {
                            id: Uuid::now_v7(), sku: fields.sku.clone(), name: fields.name.clone(), description: None,
                            price: fields.price, cost: item.unit_cost, stock: item.quantity, min_stock: fields.min_stock,
                            category_id: fields.category_id, is_active: true, sizes: vec![], colors: vec![], image_url: None,
                            created_at: now, updated_at: now,
                        };
                        touched.push((ChangeKind::Insert, product.id));
                        t.products.push(product);
                    }
                    None => {}
                }
            }
            let purchase = &mut t.purchases[idx];
            purchase.status = PurchaseStatus::Received;
            purchase.received_at = Some(now);
            (purchase.clone(), touched)
        };
        for (kind, pid) in touched { self.notify(kind, pid); }
        Ok(purchase)
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.enter("dashboard_stats")?;
        let t = self.lock();
        let today = Utc::now().date_naive();
        let completed = || t.sales.iter().filter(|s| s.status == SaleStatus::Completed);
        let todays: Vec<&Sale> = completed().filter(|s| s.created_at.date_naive() == today).collect();
        let months: Vec<&Sale> = completed()
            .filter(|s| s.created_at.year() == today.year() && s.created_at.month() == today.month())
            .collect();
        let counts = count(&derive_alerts(&t.products));
        Ok(DashboardStats {
            today_sales_total: todays.iter().map(|s| s.total).sum(),
            today_sales_count: todays.len() as u64,
            month_sales_total: months.iter().map(|s| s.total).sum(),
            month_sales_count: months.len() as u64,
            total_products: t.products.iter().filter(|p| p.is_active).count() as u64,
            low_stock_count: (counts.critical + counts.warning) as u64,
            out_of_stock_count: counts.out_of_stock as u64,
            inventory_value: InventorySummary::of(&t.products).stock_value,
        })
    }

    async fn sales_trend(&self, range: DateRange) -> Result<SalesTrend> {
        self.enter("sales_trend")?;
        Ok(trend_of(&self.lock().sales, range))
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        self.enter("upload_object")?;
        let key = format!("{}/{}", self.bucket, path);
        self.lock().objects.insert(key.clone(), bytes);
        Ok(key)
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, table: &str) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel();
        let cancel = subscription.token();
        let mut rx = self.changes.subscribe();
        let table = table.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = rx.recv() => match change {
                        Ok(event) if event.table == table => {
                            if tx.send(event).await.is_err() { break; }
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, CartItem, Customer, NewProductFields, PaymentMethod, PurchaseInput, PurchaseLineInput};
    use crate::domain::value_objects::{Money, TaxRate};

    async fn seeded(backend: &MemoryBackend, sku: &str, stock: u32) -> Product {
        backend.insert_product(&ProductInput::new(Sku::new(sku).unwrap(), sku, Money::cents(1000), Money::cents(500)).with_stock(stock, 2)).await.unwrap()
    }

    fn sale_of(lines: &[(&Product, u32)]) -> NewSale {
        let mut cart = Cart::new();
        for (p, q) in lines { cart.add_item(CartItem::from_product(p, *q, None, None)).unwrap(); }
        NewSale::from_cart(&cart, TaxRate::STANDARD, Customer::default(), PaymentMethod::Cash, None).unwrap()
    }

    #[tokio::test]
    async fn test_sale_is_all_or_nothing() {
        let backend = MemoryBackend::new();
        let a = seeded(&backend, "A", 5).await;
        let mut b = seeded(&backend, "B", 1).await;
        let mut sale = sale_of(&[(&a, 2), (&b, 1)]);
        // another terminal sold the last B in the meantime
        backend.external_stock_change(b.id, 0).unwrap();
        assert!(backend.create_sale(&sale).await.is_err());
        assert_eq!(backend.get_product(a.id).await.unwrap().unwrap().stock, 5);

        b = backend.get_product(b.id).await.unwrap().unwrap();
        backend.external_stock_change(b.id, 1).unwrap();
        sale.sale.notes = Some("retry".into());
        let done = backend.create_sale(&sale).await.unwrap();
        assert_eq!(done.sale_number, "V-000001");
        assert_eq!(backend.get_product(a.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(backend.get_product(b.id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_sale_quantity_overflow_is_rejected() {
        let backend = MemoryBackend::new();
        let a = seeded(&backend, "A", 5).await;
        let mut sale = sale_of(&[(&a, 1)]);
        let mut line = sale.items[0].clone();
        line.quantity = u32::MAX;
        sale.items.push(line);
        let err = backend.create_sale(&sale).await.unwrap_err();
        assert!(matches!(err, PosError::Remote { status: 400, .. }));
        assert_eq!(backend.get_product(a.id).await.unwrap().unwrap().stock, 5);
        assert!(backend.list_sales(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_applies_once() {
        let backend = MemoryBackend::new();
        let a = seeded(&backend, "A", 1).await;
        let input = PurchaseInput {
            supplier_name: "Proveedor".into(), supplier_contact: None, notes: None,
            items: vec![
                PurchaseLineInput { product_id: Some(a.id), new_product: None, quantity: 10, unit_cost: Money::cents(450) },
                PurchaseLineInput {
                    product_id: None, quantity: 3, unit_cost: Money::cents(900),
                    new_product: Some(NewProductFields { name: "Scarf".into(), sku: Sku::new("SCF-1").unwrap(), price: Money::cents(1500), category_id: None, min_stock: 1 }),
                },
            ],
        };
        let purchase = backend.create_purchase(&NewPurchase::build(input, TaxRate::STANDARD).unwrap()).await.unwrap();
        assert_eq!(backend.get_product(a.id).await.unwrap().unwrap().stock, 1);
        backend.receive_purchase(purchase.id).await.unwrap();
        let err = backend.receive_purchase(purchase.id).await.unwrap_err();
        assert!(matches!(err, PosError::Remote { status: 409, .. }));
        assert_eq!(backend.get_product(a.id).await.unwrap().unwrap().stock, 11);
        let scarf = backend.find_product_by_sku(&Sku::new("scf-1").unwrap()).await.unwrap().unwrap();
        assert_eq!(scarf.stock, 3);
    }

    #[tokio::test]
    async fn test_category_in_use_cannot_be_deleted() {
        let backend = MemoryBackend::new();
        let cat = backend.insert_category(&CategoryInput::new("Jeans")).await.unwrap();
        let p = backend.insert_product(&ProductInput::new(Sku::new("J1").unwrap(), "J", Money::cents(1), Money::cents(1)).with_category(cat.id)).await.unwrap();
        assert!(backend.delete_category(cat.id).await.is_err());
        assert_eq!(backend.list_categories().await.unwrap().len(), 1);
        assert_eq!(backend.get_product(p.id).await.unwrap().unwrap().category_id, Some(cat.id));
    }

    #[tokio::test]
    async fn test_feed_forwards_product_changes() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe("products").unwrap();
        let p = seeded(&backend, "A", 1).await;
        let event = sub.next().await.unwrap();
        assert_eq!((event.kind, event.record_id), (ChangeKind::Insert, Some(p.id)));
    }

    #[tokio::test]
    async fn test_sign_in_and_injected_failure() {
        let backend = MemoryBackend::new().with_user("caja@tienda.mx", "secreto", Role::Seller);
        let ok = backend.sign_in(&Credentials { email: "Caja@tienda.mx".into(), password: "secreto".into() }).await.unwrap();
        assert_eq!(backend.profile(ok.user.id).await.unwrap().unwrap().role, Role::Seller);
        assert!(backend.sign_in(&Credentials { email: "caja@tienda.mx".into(), password: "nope".into() }).await.is_err());
        backend.fail_next("list_products", "network down");
        assert!(backend.list_products().await.is_err());
        assert!(backend.list_products().await.is_ok());
    }
}
