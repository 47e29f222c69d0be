//! Point-of-sale domain: catalog, cart, sales, purchases and derived figures.
pub mod aggregates;
pub mod alerts;
pub mod events;
pub mod reports;
pub mod session;
pub mod value_objects;
