//! Aggregates module
pub mod product;
pub mod category;
pub mod cart;
pub mod sale;
pub mod purchase;

pub use product::{Product, ProductInput};
pub use category::{Category, CategoryInput};
pub use cart::{Cart, CartError, CartItem};
pub use sale::{Customer, NewSale, NewSaleItem, PaymentMethod, Sale, SaleError, SaleHeader, SaleItem, SaleStatus};
pub use purchase::{NewProductFields, NewPurchase, Purchase, PurchaseError, PurchaseInput, PurchaseItem, PurchaseLineInput, PurchaseStatus, PurchaseTarget};
