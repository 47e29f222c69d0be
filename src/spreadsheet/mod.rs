//! Spreadsheet import (`.xlsx`/`.xls`) and report export (`.xlsx`).

use crate::PosError;

pub mod export;
pub mod import;

pub use export::ExportKind;
pub use import::{parse_products, ImportReport, ImportRow, OptionalColumns, ParsedImport, RowError};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

impl From<calamine::Error> for PosError {
    fn from(err: calamine::Error) -> Self { PosError::Spreadsheet(err.to_string()) }
}

impl From<rust_xlsxwriter::XlsxError> for PosError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self { PosError::Spreadsheet(err.to_string()) }
}
