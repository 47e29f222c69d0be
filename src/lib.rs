//! OpenSASE Point of Sale
//!
//! Self-hosted point of sale and inventory for small retail stores, backed by a
//! hosted database that owns persistence and the atomic stock procedures.
//!
//! ## Features
//! - Product catalog and categories
//! - Cart and checkout (one atomic remote call per sale)
//! - Purchase orders with single-shot receipt
//! - Stock alerts refreshed from a realtime change feed
//! - Spreadsheet import and report export
//! - Session handling against the hosted auth service

use thiserror::Error;

pub mod api;
pub mod backend;
pub mod config;
pub mod domain;
pub mod publisher;
pub mod realtime;
pub mod services;
pub mod spreadsheet;
pub mod store;

use domain::aggregates::{CartError, PurchaseError, SaleError};
use domain::value_objects::{Sku, SkuError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum PosError {
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid SKU: {0}")]
    InvalidSku(#[from] SkuError),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Only {available} of {sku} in stock ({requested} requested)")]
    InsufficientStock { sku: Sku, requested: u32, available: u32 },

    #[error("Amount is too large")]
    AmountTooLarge,

    #[error("Product {0} is inactive")]
    InactiveProduct(Sku),

    #[error("{0}")]
    InvalidPurchase(#[from] PurchaseError),

    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not signed in")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Category is used by {products} product(s)")]
    CategoryInUse { products: u64 },

    #[error("Purchase was already received")]
    PurchaseAlreadyReceived,

    #[error("SKU {0} already exists")]
    SkuConflict(Sku),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Realtime error: {0}")]
    Realtime(String),
}

pub type Result<T> = std::result::Result<T, PosError>;

/// Coarse classification used by the HTTP layer and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Remote,
    Conflict,
    NotFound,
    Unauthorized,
    Import,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Remote => "remote_error",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Import => "import_error",
            Self::Internal => "internal_error",
        }
    }
}

impl PosError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidSku(_) | Self::EmptyCart | Self::InvalidQuantity
            | Self::InsufficientStock { .. } | Self::AmountTooLarge | Self::InactiveProduct(_) | Self::InvalidPurchase(_) => ErrorKind::Validation,
            Self::Remote { status: 401 | 403, .. } | Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Remote { status: 404, .. } | Self::NotFound(_) => ErrorKind::NotFound,
            Self::Remote { status: 409, .. } | Self::CategoryInUse { .. } | Self::PurchaseAlreadyReceived | Self::SkuConflict(_) => ErrorKind::Conflict,
            Self::Remote { .. } | Self::Transport(_) => ErrorKind::Remote,
            Self::MissingColumns(_) | Self::Spreadsheet(_) => ErrorKind::Import,
            Self::Config(_) | Self::Realtime(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote { status, message: message.into() }
    }
}

impl From<CartError> for PosError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound => PosError::NotFound("Cart item"),
            CartError::InvalidQuantity => PosError::InvalidQuantity,
            CartError::InsufficientStock { sku, requested, available } => PosError::InsufficientStock { sku, requested, available },
            CartError::AmountTooLarge => PosError::AmountTooLarge,
        }
    }
}

impl From<SaleError> for PosError {
    fn from(err: SaleError) -> Self {
        match err {
            SaleError::NoItems => PosError::EmptyCart,
            SaleError::AmountTooLarge => PosError::AmountTooLarge,
        }
    }
}
