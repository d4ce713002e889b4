//! Catalog domain module: finished products, raw materials and the bills of
//! materials linking them.

pub mod bom;
pub mod catalog;

pub use bom::{BomLine, active_lines};
pub use catalog::{Material, Product, ProductStatus};
