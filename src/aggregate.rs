// src/aggregate.rs

use crate::heuristics::LineItem;
use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Schedule code used for items that arrived without one.
pub const UNKNOWN_SCHEDULE: &str = "UNKNOWN";

/// Line items summed across every invoice of a run. Shape matches
/// [`LineItem`]; `quantity` and `total_price` are totals.
pub type MergedItem = LineItem;

/// Identity of "the same product" across invoices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub product_code: String,
    pub origin_country: String,
    /// Unit price rounded to 4 places, rendered at fixed scale.
    pub unit_price: String,
    pub schedule_code: String,
    pub description: String,
}

impl MergeKey {
    pub fn of(item: &LineItem) -> Self {
        Self {
            product_code: item.product_code.clone(),
            origin_country: item.origin_country.clone(),
            unit_price: item.unit_price.round(4).with_scale(4).to_string(),
            schedule_code: item.schedule_code.clone(),
            description: item.description.clone(),
        }
    }
}

/// Domestic vs. foreign origin. Orders `Us` before `NonUs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OriginBucket {
    Us,
    NonUs,
}

impl OriginBucket {
    pub fn of(origin_country: &str) -> Self {
        if origin_country == "US" {
            Self::Us
        } else {
            Self::NonUs
        }
    }

    /// Declaration flag: `D`omestic or `F`oreign.
    pub fn customs_flag(self) -> char {
        match self {
            Self::Us => 'D',
            Self::NonUs => 'F',
        }
    }
}

impl fmt::Display for OriginBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Us => f.write_str("US"),
            Self::NonUs => f.write_str("Non-US"),
        }
    }
}

/// A customs-reportable bucket.
///
/// Field order gives the declaration order: every US group before any
/// non-US group, then schedule code ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub bucket: OriginBucket,
    pub schedule_code: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.schedule_code, self.bucket)
    }
}

pub type Groups = BTreeMap<GroupKey, Vec<MergedItem>>;

/// Merge same-product items across all invoices, keeping first-seen order.
///
/// The first contributor supplies the descriptive fields; later ones only add
/// to `quantity` and `total_price`.
pub fn merge(item_lists: &[Vec<LineItem>]) -> Vec<MergedItem> {
    let mut merged: IndexMap<MergeKey, MergedItem> = IndexMap::new();
    let mut seen = 0usize;

    for item in item_lists.iter().flatten() {
        seen += 1;
        merged
            .entry(MergeKey::of(item))
            .and_modify(|acc| {
                acc.quantity = match acc.quantity.checked_add(item.quantity) {
                    Some(quantity) => quantity,
                    None => {
                        warn!(
                            product_code = %item.product_code,
                            held = acc.quantity,
                            adding = item.quantity,
                            "Merged quantity overflows; clamping to u32::MAX"
                        );
                        u32::MAX
                    }
                };
                acc.total_price += &item.total_price;
            })
            .or_insert_with(|| item.clone());
    }

    info!(
        invoices = item_lists.len(),
        line_items = seen,
        merged = merged.len(),
        "Merged line items"
    );
    merged.into_values().collect()
}

/// Bucket merged items by schedule code and origin. Never drops an item.
pub fn group(merged: &[MergedItem]) -> Groups {
    let mut groups = Groups::new();

    for item in merged {
        let schedule_code = if item.schedule_code.is_empty() {
            UNKNOWN_SCHEDULE.to_string()
        } else {
            item.schedule_code.clone()
        };
        let key = GroupKey {
            bucket: OriginBucket::of(&item.origin_country),
            schedule_code,
        };
        groups.entry(key).or_default().push(item.clone());
    }

    info!(groups = groups.len(), "Grouped merged items");
    groups
}

/// Total declared value across a set of items.
pub fn total_value<'a>(items: impl IntoIterator<Item = &'a MergedItem>) -> BigDecimal {
    items
        .into_iter()
        .fold(BigDecimal::from(0), |acc, item| acc + &item.total_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn item(code: &str, origin: &str, qty: u32, unit: &str, total: &str, schedule: &str) -> LineItem {
        LineItem {
            quantity: qty,
            product_code: code.to_string(),
            origin_country: origin.to_string(),
            unit_price: BigDecimal::from_str(unit).unwrap(),
            total_price: BigDecimal::from_str(total).unwrap(),
            description: format!("Part {code}"),
            schedule_code: schedule.to_string(),
        }
    }

    #[test]
    fn identical_keys_sum_quantity_and_total() {
        let lists = vec![
            vec![item("10689", "TW", 5, "2.99", "14.95", "3926.90.9990")],
            vec![item("10689", "TW", 7, "2.99", "20.93", "3926.90.9990")],
        ];
        let merged = merge(&lists);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 12);
        assert_eq!(merged[0].total_price, BigDecimal::from_str("35.88").unwrap());
    }

    #[test]
    fn overflowing_quantity_clamps() {
        let lists = vec![
            vec![item("9", "US", u32::MAX, "0.01", "1.00", "1111.11.1111")],
            vec![item("9", "US", 1, "0.01", "0.01", "1111.11.1111")],
        ];
        let merged = merge(&lists);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, u32::MAX);
        assert_eq!(merged[0].total_price, BigDecimal::from_str("1.01").unwrap());
    }

    #[test]
    fn unit_price_compared_at_four_places() {
        let lists = vec![vec![
            item("1", "US", 1, "2.5", "2.5", "1111.11.1111"),
            item("1", "US", 1, "2.50000", "2.5", "1111.11.1111"),
            item("1", "US", 1, "2.50001", "2.5", "1111.11.1111"),
            item("1", "US", 1, "2.5001", "2.5", "1111.11.1111"),
        ]];
        let merged = merge(&lists);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity, 3);
        assert_eq!(merged[1].quantity, 1);
    }

    #[test]
    fn first_seen_order_and_descriptive_fields_win() {
        let mut later = item("A", "US", 2, "1.00", "2.00", "1111.11.1111");
        later.description = "Part A".to_string();
        let lists = vec![
            vec![item("B", "CN", 1, "1.00", "1.00", "2222.22.2222")],
            vec![item("A", "US", 1, "1.00", "1.00", "1111.11.1111"), later],
        ];
        let merged = merge(&lists);

        let codes: Vec<_> = merged.iter().map(|m| m.product_code.as_str()).collect();
        assert_eq!(codes, ["B", "A"]);
        assert_eq!(merged[1].quantity, 3);
    }

    #[test]
    fn different_descriptions_stay_separate() {
        let mut other = item("A", "US", 1, "1.00", "1.00", "1111.11.1111");
        other.description = "Part A, blue".to_string();
        let lists = vec![vec![item("A", "US", 1, "1.00", "1.00", "1111.11.1111"), other]];
        assert_eq!(merge(&lists).len(), 2);
    }

    #[test]
    fn groups_by_schedule_and_origin_bucket() {
        let merged = vec![
            item("1", "US", 1, "1.00", "1.00", "8481.80.9050"),
            item("2", "CN", 1, "1.00", "1.00", "8481.80.9050"),
            item("3", "TW", 1, "1.00", "1.00", "8481.80.9050"),
            item("4", "US", 1, "1.00", "1.00", "3926.90.9990"),
            item("5", "MX", 1, "1.00", "1.00", ""),
        ];
        let groups = group(&merged);

        let keys: Vec<String> = groups.keys().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            [
                "3926.90.9990/US",
                "8481.80.9050/US",
                "8481.80.9050/Non-US",
                "UNKNOWN/Non-US",
            ]
        );
        let foreign = GroupKey {
            bucket: OriginBucket::NonUs,
            schedule_code: "8481.80.9050".to_string(),
        };
        assert_eq!(groups[&foreign].len(), 2);
    }

    #[test]
    fn customs_flags() {
        assert_eq!(OriginBucket::of("US").customs_flag(), 'D');
        assert_eq!(OriginBucket::of("us").customs_flag(), 'F');
        assert_eq!(OriginBucket::of("CA").customs_flag(), 'F');
    }

    fn arb_item() -> impl Strategy<Value = LineItem> {
        (
            prop::sample::select(vec!["10689", "40858", "210013-010", "777"]),
            prop::sample::select(vec!["US", "TW", "CN"]),
            1u32..500,
            prop::sample::select(vec!["1.00", "2.99", "12.50"]),
            prop::sample::select(vec!["3926.90.9990", "8481.80.9050", ""]),
        )
            .prop_map(|(code, origin, qty, price, schedule)| {
                item(code, origin, qty, price, price, schedule)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Grouping neither drops nor duplicates merged items.
        #[test]
        fn grouping_is_complete(lists in prop::collection::vec(prop::collection::vec(arb_item(), 0..12), 0..4)) {
            let merged = merge(&lists);
            let groups = group(&merged);
            let grouped: usize = groups.values().map(Vec::len).sum();
            prop_assert_eq!(grouped, merged.len());
        }

        /// Merging preserves total quantity and total value.
        #[test]
        fn merge_preserves_totals(lists in prop::collection::vec(prop::collection::vec(arb_item(), 0..12), 0..4)) {
            let merged = merge(&lists);
            let qty_in: u64 = lists.iter().flatten().map(|i| u64::from(i.quantity)).sum();
            let qty_out: u64 = merged.iter().map(|i| u64::from(i.quantity)).sum();
            prop_assert_eq!(qty_in, qty_out);
            prop_assert_eq!(total_value(lists.iter().flatten()), total_value(&merged));
        }
    }
}
