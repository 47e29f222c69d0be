//! Report workbooks. Derived columns are computed from the rows passed in,
//! at export time.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::{Category, Product, Sale};
use crate::domain::alerts::{count, derive_alerts, Severity};
use crate::domain::reports::{InventorySummary, ProductFigures, SalesSummary};
use crate::domain::value_objects::Money;
use crate::{PosError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind { Sales, Products, Inventory, Categories }

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Products => "products",
            Self::Inventory => "inventory",
            Self::Categories => "categories",
        }
    }

    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}.xlsx", self.as_str(), at.format("%Y%m%d-%H%M"))
    }
}

impl FromStr for ExportKind {
    type Err = PosError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sales" => Ok(Self::Sales),
            "products" => Ok(Self::Products),
            "inventory" => Ok(Self::Inventory),
            "categories" => Ok(Self::Categories),
            _ => Err(PosError::NotFound("Export")),
        }
    }
}

struct Styles {
    header: Format,
    money: Format,
    percent: Format,
}

impl Styles {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            money: Format::new().set_num_format("#,##0.00"),
            percent: Format::new().set_num_format("0.00"),
        }
    }
}

/// Adds a named sheet with a bold, frozen header row.
fn sheet<'a>(workbook: &'a mut Workbook, name: &str, titles: &[&str], styles: &Styles) -> Result<&'a mut Worksheet> {
    let ws = workbook.add_worksheet();
    ws.set_name(name)?;
    for (col, title) in titles.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *title, &styles.header)?;
        ws.set_column_width(col as u16, title.len().max(12) as f64)?;
    }
    ws.set_freeze_panes(1, 0)?;
    Ok(ws)
}

fn money(ws: &mut Worksheet, row: u32, col: u16, value: Money, styles: &Styles) -> Result<()> {
    ws.write_number_with_format(row, col, value.to_f64(), &styles.money)?;
    Ok(())
}

fn opt(ws: &mut Worksheet, row: u32, col: u16, value: Option<&str>) -> Result<()> {
    if let Some(v) = value { ws.write_string(row, col, v)?; }
    Ok(())
}

fn date(at: DateTime<Utc>) -> String { at.format("%Y-%m-%d %H:%M").to_string() }

fn category_names(categories: &[Category]) -> HashMap<Uuid, &str> {
    categories.iter().map(|c| (c.id, c.name.as_str())).collect()
}

pub fn sales(sales: &[Sale]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();

    let ws = sheet(&mut workbook, "Sales", &[
        "Sale Number", "Date", "Customer", "Email", "Phone", "Payment Method", "Status", "Items", "Subtotal", "Tax", "Total", "Notes",
    ], &styles)?;
    for (i, sale) in sales.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 0, &sale.sale_number)?;
        ws.write_string(row, 1, date(sale.created_at))?;
        opt(ws, row, 2, sale.customer_name.as_deref())?;
        opt(ws, row, 3, sale.customer_email.as_deref())?;
        opt(ws, row, 4, sale.customer_phone.as_deref())?;
        ws.write_string(row, 5, sale.payment_method.label())?;
        ws.write_string(row, 6, format!("{:?}", sale.status))?;
        ws.write_number(row, 7, sale.unit_count())?;
        money(ws, row, 8, sale.subtotal, &styles)?;
        money(ws, row, 9, sale.tax, &styles)?;
        money(ws, row, 10, sale.total, &styles)?;
        opt(ws, row, 11, sale.notes.as_deref())?;
    }

    let ws = sheet(&mut workbook, "Sale Items", &[
        "Sale Number", "Date", "Product", "Size", "Color", "Quantity", "Unit Price", "Line Total",
    ], &styles)?;
    let lines = sales.iter().flat_map(|s| s.items.iter().map(move |i| (s, i)));
    for (i, (sale, item)) in lines.enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 0, &sale.sale_number)?;
        ws.write_string(row, 1, date(sale.created_at))?;
        ws.write_string(row, 2, item.product_name.clone().unwrap_or_else(|| item.product_id.to_string()))?;
        opt(ws, row, 3, item.size.as_deref())?;
        opt(ws, row, 4, item.color.as_deref())?;
        ws.write_number(row, 5, item.quantity)?;
        money(ws, row, 6, item.unit_price, &styles)?;
        money(ws, row, 7, item.line_total, &styles)?;
    }

    let summary = SalesSummary::of(sales);
    let ws = sheet(&mut workbook, "Summary", &["Metric", "Value"], &styles)?;
    ws.write_string(1, 0, "Sales")?;
    ws.write_number(1, 1, summary.count as f64)?;
    ws.write_string(2, 0, "Units")?;
    ws.write_number(2, 1, summary.units)?;
    let totals = [("Subtotal", summary.subtotal), ("Tax", summary.tax), ("Total", summary.total), ("Average Ticket", summary.average_ticket)];
    let mut row = 3;
    for (label, value) in totals {
        ws.write_string(row, 0, label)?;
        money(ws, row, 1, value, &styles)?;
        row += 1;
    }
    row += 1;
    ws.write_string_with_format(row, 0, "Payment Method", &styles.header)?;
    ws.write_string_with_format(row, 1, "Total", &styles.header)?;
    for (method, total) in &summary.by_payment {
        row += 1;
        ws.write_string(row, 0, method.label())?;
        money(ws, row, 1, *total, &styles)?;
    }
    row += 2;
    for (col, title) in ["Top Product", "Quantity", "Revenue"].iter().enumerate() {
        ws.write_string_with_format(row, col as u16, *title, &styles.header)?;
    }
    for top in &summary.top_products {
        row += 1;
        ws.write_string(row, 0, &top.name)?;
        ws.write_number(row, 1, top.quantity)?;
        money(ws, row, 2, top.revenue, &styles)?;
    }

    Ok(workbook.save_to_buffer()?)
}

pub fn products(products: &[Product], categories: &[Category]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let names = category_names(categories);
    let mut workbook = Workbook::new();
    let ws = sheet(&mut workbook, "Products", &[
        "SKU", "Name", "Category", "Description", "Price", "Cost", "Stock", "Minimum Stock",
        "Stock Value", "Margin", "Margin %", "Sizes", "Colors", "Active",
    ], &styles)?;
    for (i, p) in products.iter().enumerate() {
        let row = i as u32 + 1;
        let figures = ProductFigures::of(p);
        ws.write_string(row, 0, p.sku.as_str())?;
        ws.write_string(row, 1, &p.name)?;
        opt(ws, row, 2, p.category_id.and_then(|id| names.get(&id).copied()))?;
        opt(ws, row, 3, p.description.as_deref())?;
        money(ws, row, 4, p.price, &styles)?;
        money(ws, row, 5, p.cost, &styles)?;
        ws.write_number(row, 6, p.stock)?;
        ws.write_number(row, 7, p.min_stock)?;
        money(ws, row, 8, figures.stock_value, &styles)?;
        money(ws, row, 9, figures.margin, &styles)?;
        ws.write_number_with_format(row, 10, figures.margin_pct.to_f64().unwrap_or_default(), &styles.percent)?;
        ws.write_string(row, 11, p.sizes.join(", "))?;
        ws.write_string(row, 12, p.colors.join(", "))?;
        ws.write_string(row, 13, if p.is_active { "Yes" } else { "No" })?;
    }
    Ok(workbook.save_to_buffer()?)
}

/// Active products only, with their alert status.
pub fn inventory(products: &[Product], categories: &[Category]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let names = category_names(categories);
    let mut workbook = Workbook::new();
    let ws = sheet(&mut workbook, "Inventory", &[
        "SKU", "Name", "Category", "Stock", "Minimum Stock", "Status", "Stock Value", "Cost Value",
    ], &styles)?;
    for (i, p) in products.iter().filter(|p| p.is_active).enumerate() {
        let row = i as u32 + 1;
        let status = Severity::classify(p.stock, p.min_stock).map_or("ok", |s| s.as_str());
        ws.write_string(row, 0, p.sku.as_str())?;
        ws.write_string(row, 1, &p.name)?;
        opt(ws, row, 2, p.category_id.and_then(|id| names.get(&id).copied()))?;
        ws.write_number(row, 3, p.stock)?;
        ws.write_number(row, 4, p.min_stock)?;
        ws.write_string(row, 5, status)?;
        money(ws, row, 6, p.stock_value(), &styles)?;
        money(ws, row, 7, p.cost_value(), &styles)?;
    }

    let summary = InventorySummary::of(products);
    let alerts = count(&derive_alerts(products));
    let ws = sheet(&mut workbook, "Summary", &["Metric", "Value"], &styles)?;
    let counts = [
        ("Products", summary.product_count as f64),
        ("Units", summary.units as f64),
        ("Out of Stock", alerts.out_of_stock as f64),
        ("Critical", alerts.critical as f64),
        ("Warning", alerts.warning as f64),
    ];
    let mut row = 1;
    for (label, value) in counts {
        ws.write_string(row, 0, label)?;
        ws.write_number(row, 1, value)?;
        row += 1;
    }
    for (label, value) in [("Stock Value", summary.stock_value), ("Cost Value", summary.cost_value), ("Potential Margin", summary.potential_margin)] {
        ws.write_string(row, 0, label)?;
        money(ws, row, 1, value, &styles)?;
        row += 1;
    }
    Ok(workbook.save_to_buffer()?)
}

pub fn categories(categories: &[Category], products: &[Product]) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    let ws = sheet(&mut workbook, "Categories", &["Name", "Description", "Products", "Units", "Stock Value"], &styles)?;
    for (i, c) in categories.iter().enumerate() {
        let row = i as u32 + 1;
        let members: Vec<&Product> = products.iter().filter(|p| p.category_id == Some(c.id)).collect();
        ws.write_string(row, 0, &c.name)?;
        opt(ws, row, 1, c.description.as_deref())?;
        ws.write_number(row, 2, members.len() as f64)?;
        ws.write_number(row, 3, members.iter().map(|p| f64::from(p.stock)).sum::<f64>())?;
        money(ws, row, 4, members.iter().map(|p| p.stock_value()).sum(), &styles)?;
    }
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::sample;
    use crate::domain::aggregates::{PaymentMethod, SaleItem, SaleStatus};
    use calamine::{open_workbook_auto_from_rs, Data, Reader};
    use std::io::Cursor;

    fn read(bytes: Vec<u8>) -> calamine::Sheets<Cursor<Vec<u8>>> {
        open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap()
    }

    fn sale(number: &str, product: &Product, quantity: u32) -> Sale {
        let line = product.price * quantity;
        let tax = crate::domain::value_objects::TaxRate::STANDARD.tax_on(line);
        Sale {
            id: Uuid::new_v4(), sale_number: number.into(), customer_name: Some("Ana".into()), customer_email: None, customer_phone: None,
            subtotal: line, tax, total: line + tax, payment_method: PaymentMethod::Card, status: SaleStatus::Completed, notes: None,
            created_at: Utc::now(),
            items: vec![SaleItem {
                id: None, product_id: product.id, product_name: Some(product.name.clone()), quantity,
                unit_price: product.price, line_total: line, size: Some("M".into()), color: None,
            }],
        }
    }

    #[test]
    fn test_sales_workbook_sheets() {
        let p = sample("TEE", 10, 2);
        let mut wb = read(sales(&[sale("V-000001", &p, 2), sale("V-000002", &p, 1)]).unwrap());
        assert_eq!(wb.sheet_names(), vec!["Sales", "Sale Items", "Summary"]);
        let items = wb.worksheet_range("Sale Items").unwrap();
        assert_eq!(items.height(), 3);
        assert_eq!(items.get_value((1, 5)), Some(&Data::Float(2.0)));
        let summary = wb.worksheet_range("Summary").unwrap();
        // total row: 3 units at 10.00 plus 16% tax
        assert_eq!(summary.get_value((5, 1)), Some(&Data::Float(34.8)));
    }

    #[test]
    fn test_product_figures_are_recomputed() {
        let cat = Category { id: Uuid::new_v4(), name: "Tops".into(), description: None, created_at: Utc::now() };
        let p = Product { category_id: Some(cat.id), ..sample("TEE", 4, 2) };
        let mut wb = read(products(&[p], &[cat]).unwrap());
        let range = wb.worksheet_range("Products").unwrap();
        assert_eq!(range.get_value((1, 2)), Some(&Data::String("Tops".into())));
        assert_eq!(range.get_value((1, 8)), Some(&Data::Float(40.0)));
        assert_eq!(range.get_value((1, 9)), Some(&Data::Float(4.0)));
        assert_eq!(range.get_value((1, 10)), Some(&Data::Float(40.0)));
    }

    #[test]
    fn test_inventory_skips_inactive_products() {
        let low = sample("LOW", 1, 4);
        let gone = Product { is_active: false, ..sample("OLD", 0, 4) };
        let mut wb = read(inventory(&[low, gone], &[]).unwrap());
        assert_eq!(wb.sheet_names(), vec!["Inventory", "Summary"]);
        let range = wb.worksheet_range("Inventory").unwrap();
        assert_eq!(range.height(), 2);
        assert_eq!(range.get_value((1, 5)), Some(&Data::String("critical".into())));
    }

    #[test]
    fn test_export_kind_from_path() {
        assert_eq!("inventory".parse::<ExportKind>().unwrap(), ExportKind::Inventory);
        assert!("orders".parse::<ExportKind>().is_err());
        assert!(ExportKind::Sales.file_name(Utc::now()).starts_with("sales-"));
    }
}
