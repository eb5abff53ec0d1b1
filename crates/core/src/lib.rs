//! Shared configuration, error taxonomy and backend domain model for the shopping assistant.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::cart::{Cart, CartItemId, CartItemRecord, CartLine};
pub use domain::product::{Product, ProductDetail, ProductDetailRecord, ProductId, Review};
pub use errors::{ErrorCategory, InterfaceError};
