// src/layout/header.rs

use crate::sheet::{CellRef, CellValue, SheetOps};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A sender or receiver address as entered for the shipment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Party {
    pub name: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub tax_id: String,
}

impl Party {
    /// Printable lines with blank optional lines removed, so the block
    /// closes up instead of leaving gaps.
    pub fn lines(&self) -> Vec<String> {
        let city_line = {
            let state_zip = join_nonblank(&[&self.state, &self.postal_code], " ");
            join_nonblank(&[&self.city, &state_zip], ", ")
        };
        let tax_id = if self.tax_id.trim().is_empty() {
            String::new()
        } else {
            format!("Tax ID: {}", self.tax_id.trim())
        };

        [
            self.name.trim().to_string(),
            self.address_line1.trim().to_string(),
            self.address_line2.trim().to_string(),
            city_line,
            self.country.trim().to_string(),
            tax_id,
        ]
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect()
    }
}

fn join_nonblank(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Shipment metadata written into the fixed header cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderData {
    pub exporter: Party,
    pub consignee: Party,
    pub invoice_number: String,
    /// Defaults to today's date when absent.
    pub ship_date: Option<String>,
    pub carrier: String,
    pub tracking_number: String,
    pub reference: String,
    pub incoterms: String,
    pub origin_state: String,
    pub destination_country: String,
    pub special_instructions: String,
}

/// Vertical run of cells an address is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBlock {
    pub first: CellRef,
    pub lines: u32,
}

impl AddressBlock {
    pub fn last_row(&self) -> u32 {
        self.first.row + self.lines.saturating_sub(1)
    }
}

/// Template positions of every header field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderCells {
    pub exporter: AddressBlock,
    pub consignee: AddressBlock,
    pub invoice_number: CellRef,
    pub ship_date: CellRef,
    pub carrier: CellRef,
    pub tracking_number: CellRef,
    pub reference: CellRef,
    pub incoterms: CellRef,
    pub origin_state: CellRef,
    pub destination_country: CellRef,
    pub special_instructions: CellRef,
}

impl HeaderCells {
    /// Single-cell fields, for layout validation.
    pub fn fields(&self) -> [CellRef; 9] {
        [
            self.invoice_number,
            self.ship_date,
            self.carrier,
            self.tracking_number,
            self.reference,
            self.incoterms,
            self.origin_state,
            self.destination_country,
            self.special_instructions,
        ]
    }
}

pub fn write_header<S: SheetOps>(sheet: &mut S, cells: &HeaderCells, data: &HeaderData, today: &str) {
    write_address(sheet, "exporter", cells.exporter, &data.exporter);
    write_address(sheet, "consignee", cells.consignee, &data.consignee);

    let ship_date = data
        .ship_date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(today);

    let fields = [
        (cells.invoice_number, data.invoice_number.as_str()),
        (cells.ship_date, ship_date),
        (cells.carrier, data.carrier.as_str()),
        (cells.tracking_number, data.tracking_number.as_str()),
        (cells.reference, data.reference.as_str()),
        (cells.incoterms, data.incoterms.as_str()),
        (cells.origin_state, data.origin_state.as_str()),
        (cells.destination_country, data.destination_country.as_str()),
        (cells.special_instructions, data.special_instructions.as_str()),
    ];
    for (at, text) in fields {
        sheet.set_value(at, CellValue::text(text.trim()));
    }
}

fn write_address<S: SheetOps>(sheet: &mut S, which: &str, block: AddressBlock, party: &Party) {
    let lines = party.lines();
    if lines.len() > block.lines as usize {
        warn!(
            party = which,
            lines = lines.len(),
            room = block.lines,
            "Address has more lines than the template block; truncating"
        );
    }

    for i in 0..block.lines {
        let value = lines
            .get(i as usize)
            .map_or(CellValue::Empty, |line| CellValue::text(line.as_str()));
        sheet.set_value(block.first.down(i), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Sheet;

    fn party() -> Party {
        Party {
            name: "Acme Tools Inc".into(),
            address_line1: "100 Main St".into(),
            address_line2: "  ".into(),
            city: "Dayton".into(),
            state: "OH".into(),
            postal_code: "45402".into(),
            country: "US".into(),
            tax_id: String::new(),
        }
    }

    #[test]
    fn blank_optional_lines_collapse() {
        assert_eq!(
            party().lines(),
            ["Acme Tools Inc", "100 Main St", "Dayton, OH 45402", "US"]
        );

        let sparse = Party {
            name: "Buyer GmbH".into(),
            city: "Berlin".into(),
            ..Party::default()
        };
        assert_eq!(sparse.lines(), ["Buyer GmbH", "Berlin"]);
    }

    #[test]
    fn address_block_shifts_lines_up_and_clears_rest() {
        let mut sheet = Sheet::new("t");
        let block = AddressBlock {
            first: CellRef::new(3, 0),
            lines: 6,
        };
        for i in 0..6 {
            sheet.set_value(block.first.down(i), CellValue::text("stale"));
        }

        write_address(&mut sheet, "exporter", block, &party());

        let texts: Vec<String> = (0..6)
            .map(|i| sheet.value(block.first.down(i)).map(CellValue::as_text).unwrap_or_default())
            .collect();
        assert_eq!(
            texts,
            ["Acme Tools Inc", "100 Main St", "Dayton, OH 45402", "US", "", ""]
        );
    }

    #[test]
    fn ship_date_falls_back_to_today() {
        let mut sheet = Sheet::new("t");
        let at = |row| CellRef::new(row, 1);
        let cells = HeaderCells {
            exporter: AddressBlock { first: at(20), lines: 2 },
            consignee: AddressBlock { first: at(30), lines: 2 },
            invoice_number: at(0),
            ship_date: at(1),
            carrier: at(2),
            tracking_number: at(3),
            reference: at(4),
            incoterms: at(5),
            origin_state: at(6),
            destination_country: at(7),
            special_instructions: at(8),
        };
        let data = HeaderData {
            invoice_number: "INV-1".into(),
            ..HeaderData::default()
        };

        write_header(&mut sheet, &cells, &data, "2026-10-18");

        assert_eq!(sheet.value(at(0)), Some(&CellValue::text("INV-1")));
        assert_eq!(sheet.value(at(1)), Some(&CellValue::text("2026-10-18")));
    }
}
