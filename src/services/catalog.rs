//! Products and categories.

use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::Context;
use crate::domain::aggregates::{Category, CategoryInput, Product, ProductInput};
use crate::domain::alerts::Severity;
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::store::Action;
use crate::{PosError, Result};

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
];

/// Client-side product filters.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub low_stock: bool,
}

impl ProductQuery {
    pub fn apply(&self, products: &[Product]) -> Vec<Product> {
        products
            .iter()
            .filter(|p| self.search.as_deref().map_or(true, |s| p.matches(s)))
            .filter(|p| self.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| !self.active_only || p.is_active)
            .filter(|p| !self.low_stock || Severity::classify(p.stock, p.min_stock).is_some())
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct CatalogService {
    ctx: Context,
}

impl CatalogService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    /// Cached product list, fetched when empty or stale.
    pub async fn products(&self) -> Result<Vec<Product>> {
        if let Some(products) = self.ctx.store.select(|s| s.products.is_fresh().then(|| s.products.items().to_vec())) {
            return Ok(products);
        }
        self.refresh_products().await
    }

    pub async fn refresh_products(&self) -> Result<Vec<Product>> {
        let _loading = self.ctx.loading("products");
        let products = self.ctx.track(self.ctx.backend.list_products().await)?;
        tracing::debug!(count = products.len(), "Products loaded");
        self.ctx.store.dispatch(Action::ProductsLoaded(products.clone()))?;
        Ok(products)
    }

    pub async fn search(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        Ok(query.apply(&self.products().await?))
    }

    pub async fn product(&self, id: Uuid) -> Result<Product> {
        let found = self.ctx.track(self.ctx.backend.get_product(id).await)?;
        found.map_or_else(|| self.ctx.fail(PosError::NotFound("Product")), Ok)
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        let input = input.normalized();
        if let Err(e) = input.validate() { return self.ctx.fail(e); }
        if self.ctx.track(self.ctx.backend.find_product_by_sku(&input.sku).await)?.is_some() {
            return self.ctx.fail(PosError::SkuConflict(input.sku));
        }
        let product = self.ctx.track(self.ctx.backend.insert_product(&input).await)?;
        self.ctx.store.dispatch(Action::ProductsInvalidated)?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
        self.ctx.succeed(format!("Product {} created", product.name));
        self.ctx.publisher.publish(DomainEvent::Product(ProductEvent::Created { product_id: product.id, sku: product.sku.clone() })).await;
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, input: ProductInput) -> Result<Product> {
        let input = input.normalized();
        if let Err(e) = input.validate() { return self.ctx.fail(e); }
        if let Some(other) = self.ctx.track(self.ctx.backend.find_product_by_sku(&input.sku).await)? {
            if other.id != id { return self.ctx.fail(PosError::SkuConflict(input.sku)); }
        }
        let product = self.ctx.track(self.ctx.backend.update_product(id, &input).await)?;
        self.ctx.store.dispatch(Action::ProductsInvalidated)?;
        tracing::info!(product_id = %id, sku = %product.sku, "Product updated");
        self.ctx.succeed(format!("Product {} updated", product.name));
        self.ctx.publisher.publish(DomainEvent::Product(ProductEvent::Updated { product_id: id, sku: product.sku.clone() })).await;
        Ok(product)
    }

    /// Soft delete: the product stays referenced by past sales.
    pub async fn deactivate(&self, id: Uuid) -> Result<Product> {
        let product = self.ctx.track(self.ctx.backend.set_product_active(id, false).await)?;
        self.ctx.store.dispatch(Action::ProductsInvalidated)?;
        tracing::info!(product_id = %id, "Product deactivated");
        self.ctx.succeed(format!("Product {} deactivated", product.name));
        self.ctx.publisher.publish(DomainEvent::Product(ProductEvent::Deactivated { product_id: id })).await;
        Ok(product)
    }

    pub async fn reactivate(&self, id: Uuid) -> Result<Product> {
        let product = self.ctx.track(self.ctx.backend.set_product_active(id, true).await)?;
        self.ctx.store.dispatch(Action::ProductsInvalidated)?;
        self.ctx.succeed(format!("Product {} reactivated", product.name));
        self.ctx.publisher.publish(DomainEvent::Product(ProductEvent::Updated { product_id: id, sku: product.sku.clone() })).await;
        Ok(product)
    }

    /// Stores the image under `products/` and points the product at its public URL.
    pub async fn upload_image(&self, id: Uuid, file_name: &str, bytes: Vec<u8>) -> Result<Product> {
        let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
        let Some((ext, content_type)) = IMAGE_TYPES.iter().find(|(e, _)| *e == ext) else {
            let mut errors = ValidationErrors::new();
            let mut err = ValidationError::new("image_type");
            err.message = Some("use a jpg, png, webp or gif image".into());
            errors.add("image", err);
            return self.ctx.fail(errors);
        };
        let product = self.product(id).await?;
        let path = format!("products/{}.{}", Uuid::now_v7(), ext);
        let key = self.ctx.track(self.ctx.backend.upload_object(&path, bytes, content_type).await)?;
        tracing::debug!(%key, "Image stored");
        let input = ProductInput { image_url: Some(self.ctx.backend.public_url(&path)), ..product.to_input() };
        let product = self.ctx.track(self.ctx.backend.update_product(id, &input).await)?;
        self.ctx.store.dispatch(Action::ProductsInvalidated)?;
        self.ctx.succeed("Image uploaded");
        Ok(product)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        if let Some(categories) = self.ctx.store.select(|s| s.categories.is_fresh().then(|| s.categories.items().to_vec())) {
            return Ok(categories);
        }
        self.refresh_categories().await
    }

    pub async fn refresh_categories(&self) -> Result<Vec<Category>> {
        let _loading = self.ctx.loading("categories");
        let categories = self.ctx.track(self.ctx.backend.list_categories().await)?;
        self.ctx.store.dispatch(Action::CategoriesLoaded(categories.clone()))?;
        Ok(categories)
    }

    pub async fn create_category(&self, input: CategoryInput) -> Result<Category> {
        let input = input.normalized();
        if let Err(e) = input.validate() { return self.ctx.fail(e); }
        let category = self.ctx.track(self.ctx.backend.insert_category(&input).await)?;
        self.ctx.store.dispatch(Action::CategoriesInvalidated)?;
        tracing::info!(category_id = %category.id, "Category created");
        self.ctx.succeed(format!("Category {} created", category.name));
        Ok(category)
    }

    pub async fn update_category(&self, id: Uuid, input: CategoryInput) -> Result<Category> {
        let input = input.normalized();
        if let Err(e) = input.validate() { return self.ctx.fail(e); }
        let category = self.ctx.track(self.ctx.backend.update_category(id, &input).await)?;
        self.ctx.store.dispatch(Action::CategoriesInvalidated)?;
        self.ctx.succeed(format!("Category {} updated", category.name));
        Ok(category)
    }

    /// Refused while any product, active or not, still uses the category.
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        let products = self.ctx.track(self.ctx.backend.count_products_in_category(id).await)?;
        if products > 0 { return self.ctx.fail(PosError::CategoryInUse { products }); }
        self.ctx.track(self.ctx.backend.delete_category(id).await)?;
        self.ctx.store.dispatch(Action::CategoriesInvalidated)?;
        tracing::info!(category_id = %id, "Category deleted");
        self.ctx.succeed("Category deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::sample;
    use crate::domain::value_objects::{Money, Sku};
    use crate::services::testing::context;
    use crate::store::CacheStatus;

    fn input(sku: &str) -> ProductInput {
        ProductInput::new(Sku::new(sku).unwrap(), format!("  Shirt {sku} "), Money::cents(2500), Money::cents(1200)).with_stock(4, 2)
    }

    #[tokio::test]
    async fn test_products_read_through_cache() {
        let (backend, ctx) = context();
        let catalog = CatalogService::new(ctx.clone());
        catalog.create_product(input("A")).await.unwrap();
        assert_eq!(catalog.products().await.unwrap().len(), 1);
        assert_eq!(catalog.products().await.unwrap().len(), 1);
        assert_eq!(backend.calls().iter().filter(|c| **c == "list_products").count(), 1);
        catalog.create_product(input("B")).await.unwrap();
        assert_eq!(ctx.store.select(|s| s.products.status()), CacheStatus::Stale);
        assert_eq!(catalog.products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicate_sku() {
        let (_, ctx) = context();
        let catalog = CatalogService::new(ctx);
        let created = catalog.create_product(input("sh-1")).await.unwrap();
        assert_eq!(created.name, "Shirt sh-1");
        assert_eq!(created.sku.as_str(), "SH-1");
        let err = catalog.create_product(input("SH-1")).await.unwrap_err();
        assert!(matches!(err, PosError::SkuConflict(_)));
        let mut other = catalog.create_product(input("SH-2")).await.unwrap().to_input();
        other.sku = Sku::new("SH-1").unwrap();
        assert!(matches!(catalog.update_product(created.id, other).await, Err(PosError::SkuConflict(_))));
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected_locally() {
        let (backend, ctx) = context();
        let catalog = CatalogService::new(ctx);
        let mut bad = input("X");
        bad.price = Money::cents(-1);
        assert!(matches!(catalog.create_product(bad).await, Err(PosError::Validation(_))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_category_in_use_is_kept() {
        let (_, ctx) = context();
        let catalog = CatalogService::new(ctx);
        let jeans = catalog.create_category(CategoryInput::new("Jeans")).await.unwrap();
        catalog.create_product(input("J-1").with_category(jeans.id)).await.unwrap();
        let err = catalog.delete_category(jeans.id).await.unwrap_err();
        assert!(matches!(err, PosError::CategoryInUse { products: 1 }));
        assert_eq!(catalog.refresh_categories().await.unwrap().len(), 1);

        let empty = catalog.create_category(CategoryInput::new("Hats")).await.unwrap();
        catalog.delete_category(empty.id).await.unwrap();
        assert_eq!(catalog.categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_image_sets_public_url() {
        let (_, ctx) = context();
        let catalog = CatalogService::new(ctx);
        let p = catalog.create_product(input("IMG")).await.unwrap();
        let updated = catalog.upload_image(p.id, "photo.PNG", vec![1, 2, 3]).await.unwrap();
        let url = updated.image_url.unwrap();
        assert!(url.starts_with("memory://product-images/products/"));
        assert!(url.ends_with(".png"));
        assert!(matches!(catalog.upload_image(p.id, "notes.txt", vec![]).await, Err(PosError::Validation(_))));
    }

    #[test]
    fn test_query_filters() {
        let cat = Uuid::new_v4();
        let a = Product { category_id: Some(cat), ..sample("TEE-1", 1, 5) };
        let b = Product { is_active: false, ..sample("TEE-2", 10, 5) };
        let c = sample("CAP-1", 10, 5);
        let all = vec![a.clone(), b.clone(), c];
        let q = |f: fn(&mut ProductQuery)| { let mut q = ProductQuery::default(); f(&mut q); q.apply(&all).len() };
        assert_eq!(q(|q| q.search = Some("tee".into())), 2);
        assert_eq!(q(|q| q.category_id = None), 3);
        assert_eq!(q(|q| q.active_only = true), 2);
        assert_eq!(q(|q| q.low_stock = true), 1);
        assert_eq!(ProductQuery { category_id: Some(cat), ..Default::default() }.apply(&all), vec![a]);
    }
}
