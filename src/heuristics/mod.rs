// src/heuristics/mod.rs

pub mod code;
mod line_items;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

pub use code::normalize;

/// A single commercial-invoice line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub quantity: u32,
    /// Normalized master-data lookup key.
    pub product_code: String,
    /// Two-letter country of origin.
    pub origin_country: String,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
    pub description: String,
    /// Harmonized schedule code, `####.##.####`.
    pub schedule_code: String,
}

/// Extract line items from one invoice's raw text.
///
/// Never fails: text without a recognizable item section yields an empty list.
pub fn parse_invoice(text: &str) -> Vec<LineItem> {
    line_items::parse(text)
}
