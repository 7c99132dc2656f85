// src/master.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-product packaging and weight reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Weight of one unit, in the unit family named by `unit_of_measure`.
    pub unit_weight: f64,
    /// Shipping weight of one full carton, in pounds.
    pub carton_weight: f64,
    pub units_per_carton: u32,
    pub unit_of_measure: String,
}

impl ProductRecord {
    /// A record that cannot be used for gross weight without dividing by zero.
    pub fn is_degenerate(&self) -> bool {
        self.units_per_carton == 0
    }
}

/// Snapshot of master data for the codes of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct ProductMaster {
    records: HashMap<String, ProductRecord>,
}

impl ProductMaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<&ProductRecord> {
        self.records.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.records.contains_key(code)
    }

    pub fn insert(&mut self, code: impl Into<String>, record: ProductRecord) {
        self.records.insert(code.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(String, ProductRecord)> for ProductMaster {
    fn from_iter<I: IntoIterator<Item = (String, ProductRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
