// src/weights.rs

use crate::aggregate::{GroupKey, Groups, MergedItem};
use crate::error::{SliError, SliResult};
use crate::master::ProductMaster;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Pounds to kilograms, as used on the declaration.
pub const LB_TO_KG: f64 = 0.454;

/// Net-quantity rule selected by a product's unit of measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UnitFamily {
    Kg,
    Dozen,
    SquareMeter,
    Count,
}

impl UnitFamily {
    /// Case-insensitive, whitespace-insensitive. Unknown units count pieces.
    pub fn parse(unit_of_measure: &str) -> Self {
        let uom: String = unit_of_measure
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match uom.as_str() {
            "kg" | "kgs" | "x" => Self::Kg,
            "doz" | "dz" => Self::Dozen,
            "m2" => Self::SquareMeter,
            _ => Self::Count,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::Dozen => "doz",
            Self::SquareMeter => "m2",
            Self::Count => "no",
        }
    }

    /// Net contribution of `quantity` units weighing `unit_weight` each.
    pub fn net(self, quantity: u32, unit_weight: f64) -> f64 {
        let quantity = f64::from(quantity);
        match self {
            Self::Kg => quantity * unit_weight * LB_TO_KG,
            Self::Dozen => quantity / 12.0,
            Self::SquareMeter => quantity * unit_weight,
            Self::Count => quantity,
        }
    }
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Totals for one schedule/origin group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotals {
    pub net: f64,
    pub gross_kg: f64,
    pub value: BigDecimal,
    pub unit: UnitFamily,
}

/// Data-quality findings that do not stop the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CalcWarning {
    /// `units_per_carton == 0`: the item's gross weight was left out.
    DegenerateRecord { product_code: String },
    /// The group's net total adds up different unit families.
    MixedUnits {
        group: String,
        families: Vec<UnitFamily>,
    },
}

impl fmt::Display for CalcWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegenerateRecord { product_code } => write!(
                f,
                "{product_code}: units per carton is 0, gross weight excluded"
            ),
            Self::MixedUnits { group, families } => {
                let labels: Vec<&str> = families.iter().map(|u| u.label()).collect();
                write!(f, "{group}: mixes unit families {}", labels.join("/"))
            }
        }
    }
}

/// One declaration line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityRow {
    /// `D` for US origin, `F` otherwise.
    pub customs_flag: char,
    pub schedule_code: String,
    /// Net quantity in `unit_label` units (kilograms for weight-based goods).
    pub net_weight: f64,
    pub unit_label: String,
    pub gross_weight_kg: f64,
    pub total_value: BigDecimal,
}

/// Net weight, gross weight and value of one group.
///
/// Every item's product code must be present in `master`; the missing-data
/// gate runs before this. The unit label is the last item's family.
pub fn compute(
    group: &str,
    items: &[MergedItem],
    master: &ProductMaster,
    warnings: &mut Vec<CalcWarning>,
) -> SliResult<GroupTotals> {
    let mut net = 0.0;
    let mut gross_kg = 0.0;
    let mut value = BigDecimal::from(0);
    let mut unit = UnitFamily::Count;
    let mut families = BTreeSet::new();

    for item in items {
        let Some(record) = master.get(&item.product_code) else {
            return Err(SliError::MissingMasterData {
                codes: BTreeSet::from([item.product_code.clone()]),
            });
        };

        unit = UnitFamily::parse(&record.unit_of_measure);
        families.insert(unit);
        net += unit.net(item.quantity, record.unit_weight);

        if record.is_degenerate() {
            warn!(product_code = %item.product_code, "units_per_carton is 0; skipping gross weight");
            warnings.push(CalcWarning::DegenerateRecord {
                product_code: item.product_code.clone(),
            });
        } else {
            let cartons = f64::from(item.quantity) / f64::from(record.units_per_carton);
            gross_kg += cartons * record.carton_weight * LB_TO_KG;
        }

        value += &item.total_price;
    }

    if families.len() > 1 {
        warn!(group = %group, last = %unit, "Group mixes unit families; label uses last item");
        warnings.push(CalcWarning::MixedUnits {
            group: group.to_string(),
            families: families.into_iter().collect(),
        });
    }

    Ok(GroupTotals {
        net,
        gross_kg,
        value,
        unit,
    })
}

/// Declaration rows for every group, US groups first, each by schedule code.
pub fn commodity_rows(
    groups: &Groups,
    master: &ProductMaster,
) -> SliResult<(Vec<CommodityRow>, Vec<CalcWarning>)> {
    let mut warnings = Vec::new();
    let mut rows = Vec::with_capacity(groups.len());

    for (key, items) in groups {
        let totals = compute(&key.to_string(), items, master, &mut warnings)?;
        rows.push(to_row(key, totals));
    }

    info!(rows = rows.len(), warnings = warnings.len(), "Computed commodity rows");
    Ok((rows, warnings))
}

fn to_row(key: &GroupKey, totals: GroupTotals) -> CommodityRow {
    CommodityRow {
        customs_flag: key.bucket.customs_flag(),
        schedule_code: key.schedule_code.clone(),
        net_weight: totals.net,
        unit_label: totals.unit.label().to_string(),
        gross_weight_kg: totals.gross_kg,
        total_value: totals.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::group;
    use crate::heuristics::LineItem;
    use crate::master::ProductRecord;
    use std::str::FromStr;

    fn item(code: &str, origin: &str, qty: u32, total: &str, schedule: &str) -> MergedItem {
        LineItem {
            quantity: qty,
            product_code: code.to_string(),
            origin_country: origin.to_string(),
            unit_price: BigDecimal::from(1),
            total_price: BigDecimal::from_str(total).unwrap(),
            description: code.to_string(),
            schedule_code: schedule.to_string(),
        }
    }

    fn record(unit_weight: f64, carton_weight: f64, per_carton: u32, uom: &str) -> ProductRecord {
        ProductRecord {
            unit_weight,
            carton_weight,
            units_per_carton: per_carton,
            unit_of_measure: uom.to_string(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn unit_of_measure_is_normalized() {
        assert_eq!(UnitFamily::parse("KG "), UnitFamily::parse("kg"));
        assert_eq!(UnitFamily::parse(" Kgs"), UnitFamily::Kg);
        assert_eq!(UnitFamily::parse("X"), UnitFamily::Kg);
        assert_eq!(UnitFamily::parse("DZ"), UnitFamily::Dozen);
        assert_eq!(UnitFamily::parse("m 2"), UnitFamily::SquareMeter);
        assert_eq!(UnitFamily::parse("pcs"), UnitFamily::Count);
        assert_eq!(UnitFamily::parse(""), UnitFamily::Count);
    }

    #[test]
    fn net_rules_per_family() {
        assert!(close(UnitFamily::Kg.net(10, 2.0), 10.0 * 2.0 * 0.454));
        assert!(close(UnitFamily::Dozen.net(24, 9.0), 2.0));
        assert!(close(UnitFamily::SquareMeter.net(3, 1.5), 4.5));
        assert!(close(UnitFamily::Count.net(7, 99.0), 7.0));
    }

    #[test]
    fn mixed_case_uom_gives_same_net() {
        let items = vec![item("A", "US", 10, "10.00", "1111.11.1111")];
        let mut upper = ProductMaster::new();
        upper.insert("A", record(2.0, 20.0, 5, "KG "));
        let mut lower = ProductMaster::new();
        lower.insert("A", record(2.0, 20.0, 5, "kg"));

        let mut warnings = Vec::new();
        let a = compute("g", &items, &upper, &mut warnings).unwrap();
        let b = compute("g", &items, &lower, &mut warnings).unwrap();
        assert!(close(a.net, b.net));
        assert_eq!(a.unit, UnitFamily::Kg);
        assert!(warnings.is_empty());
    }

    #[test]
    fn gross_value_and_net_accumulate_independently() {
        let items = vec![
            item("A", "US", 10, "10.00", "1111.11.1111"),
            item("B", "US", 24, "5.50", "1111.11.1111"),
        ];
        let mut master = ProductMaster::new();
        master.insert("A", record(1.0, 20.0, 5, "no"));
        master.insert("B", record(1.0, 12.0, 12, "ea"));

        let mut warnings = Vec::new();
        let totals = compute("g", &items, &master, &mut warnings).unwrap();

        assert!(close(totals.net, 34.0));
        // (10/5)*20*0.454 + (24/12)*12*0.454
        assert!(close(totals.gross_kg, 2.0 * 20.0 * 0.454 + 2.0 * 12.0 * 0.454));
        assert_eq!(totals.value, BigDecimal::from_str("15.50").unwrap());
        assert_eq!(totals.unit.label(), "no");
    }

    #[test]
    fn zero_units_per_carton_skips_gross_and_warns() {
        let items = vec![
            item("A", "US", 10, "1.00", "1111.11.1111"),
            item("B", "US", 10, "1.00", "1111.11.1111"),
        ];
        let mut master = ProductMaster::new();
        master.insert("A", record(1.0, 20.0, 0, "no"));
        master.insert("B", record(1.0, 10.0, 10, "no"));

        let mut warnings = Vec::new();
        let totals = compute("g", &items, &master, &mut warnings).unwrap();

        assert!(close(totals.gross_kg, 10.0 * 0.454));
        assert_eq!(
            warnings,
            vec![CalcWarning::DegenerateRecord {
                product_code: "A".to_string()
            }]
        );
    }

    #[test]
    fn mixed_units_warn_and_label_last() {
        let items = vec![
            item("A", "CN", 10, "1.00", "1111.11.1111"),
            item("B", "CN", 12, "1.00", "1111.11.1111"),
        ];
        let mut master = ProductMaster::new();
        master.insert("A", record(1.0, 1.0, 1, "kg"));
        master.insert("B", record(1.0, 1.0, 1, "doz"));

        let mut warnings = Vec::new();
        let totals = compute("1111.11.1111/Non-US", &items, &master, &mut warnings).unwrap();

        assert_eq!(totals.unit, UnitFamily::Dozen);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].to_string(),
            "1111.11.1111/Non-US: mixes unit families kg/doz"
        );
    }

    #[test]
    fn unknown_product_is_reported_not_panicked() {
        let items = vec![item("ZZZ", "US", 1, "1.00", "1111.11.1111")];
        let err = compute("g", &items, &ProductMaster::new(), &mut Vec::new()).unwrap_err();
        assert!(err.missing_codes().is_some_and(|c| c.contains("ZZZ")));
    }

    #[test]
    fn rows_are_domestic_first_then_by_schedule() {
        let merged = vec![
            item("A", "CN", 1, "1.00", "1111.11.1111"),
            item("B", "US", 1, "2.00", "9999.99.9999"),
            item("C", "US", 1, "3.00", "2222.22.2222"),
            item("D", "TW", 1, "4.00", "0000.00.0001"),
        ];
        let mut master = ProductMaster::new();
        for code in ["A", "B", "C", "D"] {
            master.insert(code, record(1.0, 1.0, 1, "no"));
        }

        let (rows, warnings) = commodity_rows(&group(&merged), &master).unwrap();
        let order: Vec<(char, &str)> = rows
            .iter()
            .map(|r| (r.customs_flag, r.schedule_code.as_str()))
            .collect();

        assert!(warnings.is_empty());
        assert_eq!(
            order,
            [
                ('D', "2222.22.2222"),
                ('D', "9999.99.9999"),
                ('F', "0000.00.0001"),
                ('F', "1111.11.1111"),
            ]
        );
        assert_eq!(rows[0].total_value, BigDecimal::from(3));
    }
}
