//! Bulk product import from a spreadsheet.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::Context;
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::spreadsheet::{parse_products, ImportReport, RowError};
use crate::store::{Action, NotificationLevel};
use crate::Result;

#[derive(Clone)]
pub struct ImportService {
    ctx: Context,
    // one import at a time per process; other processes are last-write-wins
    lock: Arc<Mutex<()>>,
}

impl ImportService {
    pub fn new(ctx: Context) -> Self { Self { ctx, lock: Arc::new(Mutex::new(())) } }

    /// Creates or updates one product per valid row, matched by SKU. A bad
    /// row is reported and skipped; missing required columns abort the whole
    /// file before anything is written.
    pub async fn import_products(&self, bytes: &[u8]) -> Result<ImportReport> {
        let _guard = self.lock.lock().await;
        let _loading = self.ctx.loading("import");
        let categories = self.ctx.track(self.ctx.backend.list_categories().await)?;
        let parsed = match parse_products(bytes, &categories) {
            Ok(parsed) => parsed,
            Err(e) => return self.ctx.fail(e),
        };

        let mut report = ImportReport { errors: parsed.errors, ..Default::default() };
        for row in parsed.rows {
            // looked up right before the write so a concurrent create is seen
            let written = match self.ctx.backend.find_product_by_sku(&row.input.sku).await {
                Ok(Some(existing)) => {
                    let input = parsed.columns.merge(&existing, row.input);
                    self.ctx.backend.update_product(existing.id, &input).await.map(|_| false)
                }
                Ok(None) => self.ctx.backend.insert_product(&row.input).await.map(|_| true),
                Err(e) => Err(e),
            };
            match written {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    tracing::debug!(row = row.row, error = %e, "Import row rejected");
                    report.errors.push(RowError { row: row.row, message: e.to_string() });
                }
            }
        }
        report.errors.sort_by_key(|e| e.row);

        if report.created + report.updated > 0 {
            self.ctx.dispatch_all([Action::ProductsInvalidated]);
        }
        tracing::info!(created = report.created, updated = report.updated, failed = report.errors.len(), "Products imported");
        let summary = format!("Imported {} new and {} updated products", report.created, report.updated);
        if report.errors.is_empty() {
            self.ctx.succeed(summary);
        } else {
            self.ctx.store.notify(NotificationLevel::Warning, format!("{summary}; {} rows failed", report.errors.len()));
        }
        self.ctx.publisher.publish(DomainEvent::Product(ProductEvent::Imported {
            created: report.created,
            updated: report.updated,
            failed: report.errors.len(),
        })).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::domain::aggregates::ProductInput;
    use crate::domain::value_objects::{Money, Sku};
    use crate::services::testing::{context, last_notification};
    use crate::spreadsheet::import::tests::{header, workbook, Cell::*};
    use crate::PosError;

    #[tokio::test]
    async fn test_valid_rows_apply_and_bad_rows_are_reported() {
        let (backend, ctx) = context();
        let mut existing = ProductInput::new(Sku::new("TEE-1").unwrap(), "Old tee", Money::cents(100), Money::cents(50)).with_stock(1, 1);
        existing.colors = vec!["Red".into()];
        backend.insert_product(&existing).await.unwrap();

        let bytes = workbook(&[
            header(),
            vec![T("Tee"), T("tee-1"), N(150.0), N(60.0), N(8.0), N(2.0), Blank, T("S,M"), T("yes")],
            vec![T("Cap"), T("CAP-1"), N(90.0), N(40.0), N(5.0), N(1.0)],
            vec![T("No price"), T("CAP-2"), T("abc"), N(40.0), N(5.0), N(1.0)],
        ]);
        let import = ImportService::new(ctx.clone());
        let report = import.import_products(&bytes).await.unwrap();
        assert_eq!((report.created, report.updated), (1, 1));
        assert_eq!(report.errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![4]);

        let tee = backend.find_product_by_sku(&Sku::new("TEE-1").unwrap()).await.unwrap().unwrap();
        assert_eq!((tee.name.as_str(), tee.stock, tee.price), ("Tee", 8, Money::cents(15000)));
        assert_eq!(tee.sizes, vec!["S", "M"]);
        // no Colors column in the sheet
        assert_eq!(tee.colors, vec!["Red"]);
        assert_eq!(last_notification(&ctx).map(|n| n.0), Some(NotificationLevel::Warning));
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_row_error() {
        let (backend, ctx) = context();
        backend.fail_next("insert_product", "duplicate key value");
        let bytes = workbook(&[
            header(),
            vec![T("Cap"), T("CAP-1"), N(90.0), N(40.0), N(5.0), N(1.0)],
            vec![T("Hat"), T("HAT-1"), N(90.0), N(40.0), N(5.0), N(1.0)],
        ]);
        let report = ImportService::new(ctx).import_products(&bytes).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.errors, vec![RowError { row: 2, message: "duplicate key value".into() }]);
    }

    #[tokio::test]
    async fn test_missing_columns_write_nothing() {
        let (backend, ctx) = context();
        let bytes = workbook(&[vec![T("Name"), T("SKU")], vec![T("Cap"), T("CAP-1")]]);
        let err = ImportService::new(ctx.clone()).import_products(&bytes).await.unwrap_err();
        assert!(matches!(err, PosError::MissingColumns(ref cols) if cols.len() == 4));
        assert!(!backend.calls().contains(&"insert_product"));
        assert_eq!(last_notification(&ctx).map(|n| n.0), Some(NotificationLevel::Error));
    }
}
