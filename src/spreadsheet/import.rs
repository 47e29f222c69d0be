//! Product import parsing.
//!
//! Reads the first worksheet. Row 1 holds the headers, matched without regard
//! to case. Every data row is checked on its own: a bad row becomes a
//! [`RowError`] carrying its spreadsheet row number and the rest go on.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Cursor;
use std::str::FromStr;
use validator::Validate;

use crate::domain::aggregates::category::find_by_name;
use crate::domain::aggregates::product::parse_list;
use crate::domain::aggregates::{Category, Product, ProductInput};
use crate::domain::value_objects::{Money, Sku};
use crate::{PosError, Result};

const REQUIRED: [(&str, &[&str]); 6] = [
    ("Name", &["name"]),
    ("SKU", &["sku"]),
    ("Price", &["price"]),
    ("Cost", &["cost"]),
    ("Stock", &["stock"]),
    ("Minimum Stock", &["minimum stock", "min stock", "min_stock"]),
];

/// Which optional columns the sheet carries. Columns it lacks never
/// overwrite existing product values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptionalColumns {
    pub description: bool,
    pub category: bool,
    pub sizes: bool,
    pub colors: bool,
    pub active: bool,
}

impl OptionalColumns {
    pub fn merge(&self, existing: &Product, mut input: ProductInput) -> ProductInput {
        if !self.description { input.description = existing.description.clone(); }
        if !self.category { input.category_id = existing.category_id; }
        if !self.sizes { input.sizes = existing.sizes.clone(); }
        if !self.colors { input.colors = existing.colors.clone(); }
        if !self.active { input.is_active = existing.is_active; }
        input.image_url = existing.image_url.clone();
        input
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportRow {
    pub row: u32,
    pub input: ProductInput,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: u32,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedImport {
    pub rows: Vec<ImportRow>,
    pub errors: Vec<RowError>,
    pub columns: OptionalColumns,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<RowError>,
}

struct Header {
    name: usize,
    sku: usize,
    price: usize,
    cost: usize,
    stock: usize,
    min_stock: usize,
    description: Option<usize>,
    category: Option<usize>,
    sizes: Option<usize>,
    colors: Option<usize>,
    active: Option<usize>,
}

impl Header {
    fn locate(cells: &[Data]) -> Result<Self> {
        let titles: Vec<String> = cells.iter().map(|c| c.to_string().trim().to_lowercase()).collect();
        let find = |aliases: &[&str]| titles.iter().position(|t| aliases.contains(&t.as_str()));
        let missing: Vec<String> = REQUIRED.iter().filter(|(_, aliases)| find(aliases).is_none()).map(|(name, _)| name.to_string()).collect();
        if !missing.is_empty() { return Err(PosError::MissingColumns(missing)); }
        let required = |i: usize| find(REQUIRED[i].1).unwrap_or_default();
        Ok(Self {
            name: required(0),
            sku: required(1),
            price: required(2),
            cost: required(3),
            stock: required(4),
            min_stock: required(5),
            description: find(&["description"]),
            category: find(&["category"]),
            sizes: find(&["sizes", "size"]),
            colors: find(&["colors", "colours", "color"]),
            active: find(&["active"]),
        })
    }

    fn columns(&self) -> OptionalColumns {
        OptionalColumns {
            description: self.description.is_some(),
            category: self.category.is_some(),
            sizes: self.sizes.is_some(),
            colors: self.colors.is_some(),
            active: self.active.is_some(),
        }
    }

    fn read(&self, cells: &[Data], categories: &[Category]) -> std::result::Result<ProductInput, String> {
        let cell = |i: usize| cells.get(i);
        let optional = |i: Option<usize>| i.and_then(|i| text(cells.get(i)));

        let name = text(cell(self.name)).ok_or("Name is required")?;
        let sku = Sku::new(text(cell(self.sku)).unwrap_or_default()).map_err(|e| e.to_string())?;
        let category_id = match optional(self.category) {
            Some(label) => Some(find_by_name(categories, &label).ok_or_else(|| format!("Unknown category {label:?}"))?.id),
            None => None,
        };
        let input = ProductInput {
            sku,
            name,
            description: optional(self.description),
            price: money(cell(self.price), "Price")?,
            cost: money(cell(self.cost), "Cost")?,
            stock: count(cell(self.stock), "Stock")?,
            min_stock: count(cell(self.min_stock), "Minimum Stock")?,
            category_id,
            is_active: flag(self.active.and_then(|i| cells.get(i)))?,
            sizes: optional(self.sizes).map(|s| parse_list(&s)).unwrap_or_default(),
            colors: optional(self.colors).map(|s| parse_list(&s)).unwrap_or_default(),
            image_url: None,
        }
        .normalized();
        input.validate().map_err(|e| e.to_string())?;
        Ok(input)
    }
}

/// Parses the product sheet. Fails as a whole only when the workbook cannot
/// be read or a required column is missing.
pub fn parse_products(bytes: &[u8], categories: &[Category]) -> Result<ParsedImport> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PosError::Spreadsheet("workbook has no worksheets".into()))??;
    let first_row = range.start().map(|(row, _)| row).unwrap_or_default();
    let mut rows = range.rows();
    let header = match rows.next() {
        Some(cells) => Header::locate(cells)?,
        None => return Err(PosError::MissingColumns(REQUIRED.iter().map(|(name, _)| name.to_string()).collect())),
    };

    let mut parsed = ParsedImport { rows: Vec::new(), errors: Vec::new(), columns: header.columns() };
    for (idx, cells) in rows.enumerate() {
        // 1-based, and the header takes the first row
        let row = first_row + idx as u32 + 2;
        if cells.iter().all(is_blank) { continue; }
        match header.read(cells, categories) {
            Ok(input) => parsed.rows.push(ImportRow { row, input }),
            Err(message) => parsed.errors.push(RowError { row, message }),
        }
    }
    tracing::debug!(rows = parsed.rows.len(), errors = parsed.errors.len(), "Product sheet parsed");
    Ok(parsed)
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text(cell: Option<&Data>) -> Option<String> {
    match cell? {
        Data::Empty => None,
        // numeric SKUs come back as floats
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        other => Some(other.to_string().trim().to_string()).filter(|s| !s.is_empty()),
    }
}

fn money(cell: Option<&Data>, column: &str) -> std::result::Result<Money, String> {
    let amount = match cell {
        Some(Data::Float(f)) => Decimal::from_f64(*f),
        Some(Data::Int(i)) => Some(Decimal::from(*i)),
        Some(Data::String(s)) => Decimal::from_str(&s.trim().trim_start_matches('$').replace(',', "")).ok(),
        _ => None,
    }
    .ok_or_else(|| format!("{column} must be a number"))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("{column} must be zero or greater"));
    }
    Ok(Money::new(amount).round())
}

fn count(cell: Option<&Data>, column: &str) -> std::result::Result<u32, String> {
    let invalid = || format!("{column} must be a whole number, zero or greater");
    match cell {
        Some(Data::Float(f)) if f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX) => Ok(*f as u32),
        Some(Data::Int(i)) => u32::try_from(*i).map_err(|_| invalid()),
        Some(Data::String(s)) => s.trim().parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn flag(cell: Option<&Data>) -> std::result::Result<bool, String> {
    match cell {
        None | Some(Data::Empty) => Ok(true),
        Some(Data::Bool(b)) => Ok(*b),
        Some(Data::Int(i)) => Ok(*i != 0),
        Some(Data::Float(f)) => Ok(*f != 0.0),
        Some(other) => match other.to_string().trim().to_lowercase().as_str() {
            "" | "yes" | "y" | "true" | "1" | "si" | "sí" | "active" => Ok(true),
            "no" | "n" | "false" | "0" | "inactive" => Ok(false),
            value => Err(format!("Active must be yes or no, got {value:?}")),
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use rust_xlsxwriter::Workbook;
    use uuid::Uuid;

    pub enum Cell { T(&'static str), N(f64), Blank }
    use Cell::{Blank, N, T};

    pub fn workbook(rows: &[Vec<Cell>]) -> Vec<u8> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    T(s) => { ws.write_string(r as u32, c as u16, *s).unwrap(); }
                    N(n) => { ws.write_number(r as u32, c as u16, *n).unwrap(); }
                    Blank => {}
                }
            }
        }
        wb.save_to_buffer().unwrap()
    }

    pub fn header() -> Vec<Cell> {
        vec![T("Name"), T("SKU"), T("Price"), T("Cost"), T("Stock"), T("Minimum Stock"), T("Category"), T("Sizes"), T("Active")]
    }

    fn jeans() -> Category {
        Category { id: Uuid::new_v4(), name: "Jeans".into(), description: None, created_at: Utc::now() }
    }

    #[test]
    fn test_rows_are_checked_independently() {
        let bytes = workbook(&[
            header(),
            vec![T("Slim jean"), T("jn-01"), N(499.9), N(250.0), N(12.0), N(3.0), T("jeans"), T("28, 30,32"), T("yes")],
            vec![T("Bad price"), T("JN-02"), N(-1.0), N(1.0), N(1.0), N(1.0)],
            vec![],
            vec![T("Ghost"), T("JN-03"), N(10.0), N(5.0), N(1.0), N(1.0), T("Hats")],
            vec![T("Numeric sku"), N(1001.0), T("$1,200.50"), N(900.0), T("4"), N(0.0), Blank, Blank, T("no")],
            vec![T("Half unit"), T("JN-05"), N(10.0), N(5.0), N(1.5), N(1.0)],
        ]);
        let parsed = parse_products(&bytes, &[jeans()]).unwrap();
        assert_eq!(parsed.rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![2, 6]);
        assert_eq!(parsed.errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![3, 5, 7]);
        assert_eq!(parsed.errors[0].message, "Price must be zero or greater");
        assert!(parsed.errors[1].message.contains("Hats"));

        let slim = &parsed.rows[0].input;
        assert_eq!(slim.sku.as_str(), "JN-01");
        assert_eq!(slim.price, Money::cents(49990));
        assert_eq!(slim.sizes, vec!["28", "30", "32"]);
        assert!(slim.category_id.is_some() && slim.is_active);

        let numeric = &parsed.rows[1].input;
        assert_eq!((numeric.sku.as_str(), numeric.price, numeric.stock, numeric.is_active), ("1001", Money::cents(120050), 4, false));
        assert_eq!(parsed.columns, OptionalColumns { description: false, category: true, sizes: true, colors: false, active: true });
    }

    #[test]
    fn test_missing_required_columns_abort() {
        let bytes = workbook(&[vec![T("name"), T("SKU"), T("PRICE"), T("Stock")], vec![T("x"), T("y"), N(1.0), N(1.0)]]);
        match parse_products(&bytes, &[]) {
            Err(PosError::MissingColumns(cols)) => assert_eq!(cols, vec!["Cost", "Minimum Stock"]),
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_file() {
        assert!(matches!(parse_products(b"not a workbook", &[]), Err(PosError::Spreadsheet(_))));
    }
}
