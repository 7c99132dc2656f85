// src/lib.rs

//! Shipper's Letter of Instruction builder: parses commercial invoices,
//! aggregates line items by schedule code and origin, and fills an SLI
//! workbook from product master data.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod layout;
pub mod master;
pub mod pdf_extract;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod sheet;
pub mod store;
pub mod weights;

pub use error::{SliError, SliResult};
pub use pipeline::{GeneratedDocument, Pipeline};
