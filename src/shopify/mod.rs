pub mod client;
pub mod models;
pub mod pagination;

pub use client::{CatalogClient, CatalogError};
pub use models::{Product, ProductFieldsPatch, ShopInfo};
