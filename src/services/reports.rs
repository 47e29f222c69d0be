//! Dashboard figures, summaries and spreadsheet exports.

use chrono::Utc;
use validator::{ValidationError, ValidationErrors};

use super::{CatalogService, Context};
use crate::domain::aggregates::Sale;
use crate::domain::reports::{DashboardStats, DateRange, InventorySummary, SalesSummary, SalesTrend};
use crate::spreadsheet::{export, ExportKind};
use crate::store::Action;
use crate::Result;

/// A finished export: file name plus workbook bytes.
#[derive(Clone, Debug)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct ReportService {
    ctx: Context,
    catalog: CatalogService,
}

impl ReportService {
    pub fn new(ctx: Context, catalog: CatalogService) -> Self { Self { ctx, catalog } }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let _loading = self.ctx.loading("dashboard");
        self.ctx.track(self.ctx.backend.dashboard_stats().await)
    }

    pub async fn trend(&self, range: DateRange) -> Result<SalesTrend> {
        self.check_range(&range)?;
        self.ctx.track(self.ctx.backend.sales_trend(range).await)
    }

    /// Without a range the cached list of all sales is used.
    pub async fn sales(&self, range: Option<DateRange>) -> Result<Vec<Sale>> {
        if let Some(range) = range {
            self.check_range(&range)?;
            return self.ctx.track(self.ctx.backend.list_sales(Some(range)).await);
        }
        if let Some(sales) = self.ctx.store.select(|s| s.sales.is_fresh().then(|| s.sales.items().to_vec())) {
            return Ok(sales);
        }
        let _loading = self.ctx.loading("sales");
        let sales = self.ctx.track(self.ctx.backend.list_sales(None).await)?;
        self.ctx.store.dispatch(Action::SalesLoaded(sales.clone()))?;
        Ok(sales)
    }

    pub async fn sales_summary(&self, range: Option<DateRange>) -> Result<SalesSummary> {
        Ok(SalesSummary::of(&self.sales(range).await?))
    }

    pub async fn inventory_summary(&self) -> Result<InventorySummary> {
        Ok(InventorySummary::of(&self.catalog.products().await?))
    }

    /// Builds the workbook from freshly fetched rows.
    pub async fn export(&self, kind: ExportKind, range: Option<DateRange>) -> Result<ExportFile> {
        let _loading = self.ctx.loading("export");
        let bytes = match kind {
            ExportKind::Sales => {
                let sales = match range {
                    Some(_) => self.sales(range).await?,
                    None => self.ctx.track(self.ctx.backend.list_sales(None).await)?,
                };
                self.ctx.track(export::sales(&sales))?
            }
            ExportKind::Products => {
                let (products, categories) = (self.catalog.refresh_products().await?, self.catalog.refresh_categories().await?);
                self.ctx.track(export::products(&products, &categories))?
            }
            ExportKind::Inventory => {
                let (products, categories) = (self.catalog.refresh_products().await?, self.catalog.refresh_categories().await?);
                self.ctx.track(export::inventory(&products, &categories))?
            }
            ExportKind::Categories => {
                let (products, categories) = (self.catalog.refresh_products().await?, self.catalog.refresh_categories().await?);
                self.ctx.track(export::categories(&categories, &products))?
            }
        };
        tracing::info!(kind = kind.as_str(), bytes = bytes.len(), "Export built");
        Ok(ExportFile { file_name: kind.file_name(Utc::now()), bytes })
    }

    fn check_range(&self, range: &DateRange) -> Result<()> {
        if range.end > range.start { return Ok(()); }
        let mut errors = ValidationErrors::new();
        let mut err = ValidationError::new("range");
        err.message = Some("end must be after start".into());
        errors.add("end", err);
        self.ctx.fail(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::domain::aggregates::{Cart, CartItem, Customer, NewSale, PaymentMethod, ProductInput};
    use crate::domain::value_objects::{Money, Sku, TaxRate};
    use crate::services::testing::context;
    use crate::PosError;
    use calamine::{open_workbook_auto_from_rs, Reader};
    use chrono::Duration;
    use std::io::Cursor;
    use std::sync::Arc;

    fn reports() -> (Arc<MemoryBackend>, ReportService) {
        let (backend, ctx) = context();
        (backend, ReportService::new(ctx.clone(), CatalogService::new(ctx)))
    }

    async fn sell(backend: &MemoryBackend, sku: &str, quantity: u32) {
        let p = backend.insert_product(&ProductInput::new(Sku::new(sku).unwrap(), sku, Money::cents(1000), Money::cents(400)).with_stock(10, 2)).await.unwrap();
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&p, quantity, None, None)).unwrap();
        let sale = NewSale::from_cart(&cart, TaxRate::STANDARD, Customer::default(), PaymentMethod::Cash, None).unwrap();
        backend.create_sale(&sale).await.unwrap();
    }

    #[tokio::test]
    async fn test_summaries() {
        let (backend, reports) = reports();
        sell(&backend, "A", 2).await;
        sell(&backend, "B", 1).await;
        let summary = reports.sales_summary(None).await.unwrap();
        assert_eq!((summary.count, summary.units, summary.total), (2, 3, Money::cents(3480)));
        assert_eq!(summary.top_products[0].quantity, 2);

        let inventory = reports.inventory_summary().await.unwrap();
        assert_eq!((inventory.product_count, inventory.units), (2, 17));

        let stats = reports.dashboard().await.unwrap();
        assert_eq!(stats.today_sales_count, 2);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected_locally() {
        let (backend, reports) = reports();
        let now = Utc::now();
        let range = DateRange { start: now, end: now - Duration::days(1) };
        assert!(matches!(reports.trend(range).await, Err(PosError::Validation(_))));
        assert!(!backend.calls().contains(&"sales_trend"));
    }

    #[tokio::test]
    async fn test_trend_covers_requested_period() {
        let (backend, reports) = reports();
        sell(&backend, "A", 1).await;
        let now = Utc::now();
        let trend = reports.trend(DateRange { start: now - Duration::days(7), end: now + Duration::minutes(1) }).await.unwrap();
        assert_eq!(trend.current_total, Money::cents(1160));
        assert_eq!(trend.change_pct, None);
    }

    #[tokio::test]
    async fn test_export_reads_current_data() {
        let (backend, reports) = reports();
        sell(&backend, "A", 1).await;
        let file = reports.export(ExportKind::Inventory, None).await.unwrap();
        assert!(file.file_name.starts_with("inventory-") && file.file_name.ends_with(".xlsx"));
        let mut wb = open_workbook_auto_from_rs(Cursor::new(file.bytes)).unwrap();
        let range = wb.worksheet_range("Inventory").unwrap();
        assert_eq!(range.get_value((1, 3)), Some(&calamine::Data::Float(9.0)));
    }
}
