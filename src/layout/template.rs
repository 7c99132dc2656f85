// src/layout/template.rs

use super::header::{AddressBlock, HeaderCells};
use super::{CommodityColumns, FilingCells, LayoutGeometry, TemplateLayout};
use crate::error::{SliError, SliResult};
use crate::sheet::{
    CellRange, CellRef, CellValue, Font, HAlign, Sheet, SheetOps, Style, StyleId, TextRun,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// A template sheet plus the positions the renderer fills in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub sheet: Sheet,
    pub layout: TemplateLayout,
}

impl Template {
    /// Load a JSON template and check its layout.
    pub fn load(path: impl AsRef<Path>) -> SliResult<Self> {
        let content = fs::read_to_string(&path)?;
        let template: Self = serde_json::from_str(&content).map_err(|e| {
            SliError::layout(format!("template {}: {e}", path.as_ref().display()))
        })?;
        template.layout.validate(&template.sheet)?;
        info!(path = %path.as_ref().display(), "Loaded SLI template");
        Ok(template)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SliResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The stock SLI form: header blocks on top, one commodity row at 20,
    /// footer (filing boxes, instructions, signature, declaration) 21-28.
    pub fn builtin() -> Self {
        let mut b = Builder::new("SLI");
        let st = Styles::register(&mut b.sheet);

        for (col, width) in [
            (0, 34.0),
            (1, 48.0),
            (2, 40.0),
            (3, 56.0),
            (4, 34.0),
            (5, 48.0),
            (6, 30.0),
            (7, 48.0),
            (8, 30.0),
            (9, 62.0),
            (10, 48.0),
            (11, 48.0),
        ] {
            b.sheet.column_widths.insert(col, width);
        }

        // Title
        b.sheet.row_heights.insert(0, 24.0);
        b.span(0, 0, 11, st.title);
        b.sheet.set_rich_text(
            CellRange::single(CellRef::new(0, 0)),
            vec![
                TextRun::new("SHIPPER'S LETTER OF INSTRUCTION", Font::sized(14.0).bold()),
                TextRun::new("  (export declaration data)", Font::sized(9.0)),
            ],
        );

        // Exporter block and shipment details
        b.label(2, 0, 5, "1. U.S. PRINCIPAL PARTY IN INTEREST (USPPI)", st.label);
        b.label(2, 7, 8, "Invoice No.", st.label);
        b.span(2, 9, 11, st.value);
        for row in 3..=8 {
            b.span(row, 0, 5, st.value);
        }
        let details = [
            "Ship Date",
            "Carrier",
            "AWB / Tracking No.",
            "Reference",
            "Incoterms",
            "State of Origin",
        ];
        for (i, text) in details.into_iter().enumerate() {
            let row = 3 + i as u32;
            b.label(row, 7, 8, text, st.label);
            b.span(row, 9, 11, st.value);
        }

        // Consignee block
        b.label(10, 0, 5, "2. ULTIMATE CONSIGNEE", st.label);
        b.label(10, 7, 8, "Country of Ultimate Destination", st.label);
        b.span(10, 9, 11, st.value);
        for row in 11..=16 {
            b.span(row, 0, 5, st.value);
        }

        // Commodity header and the anchor row
        b.sheet.row_heights.insert(18, 30.0);
        b.label(18, 0, 0, "D/F", st.column_head);
        b.label(18, 1, 2, "Schedule B Number", st.column_head);
        b.label(18, 3, 3, "Quantity", st.column_head);
        b.label(18, 4, 4, "Unit", st.column_head);
        b.label(18, 5, 6, "Shipping Weight (kg)", st.column_head);
        b.label(18, 7, 8, "Value (USD)", st.column_head);
        b.label(18, 9, 9, "Export Info Code", st.column_head);
        b.label(18, 10, 10, "ECCN", st.column_head);
        b.label(18, 11, 11, "License", st.column_head);

        b.span(19, 0, 0, st.centered);
        b.span(19, 1, 2, st.centered);
        b.span(19, 3, 3, st.number);
        b.span(19, 4, 4, st.centered);
        b.span(19, 5, 6, st.number);
        b.span(19, 7, 8, st.number);
        b.span(19, 9, 9, st.centered);
        b.span(19, 10, 10, st.centered);
        b.span(19, 11, 11, st.centered);

        // Footer
        b.sheet.row_heights.insert(20, 6.0);
        b.span(20, 0, 0, st.plain);
        b.label(21, 0, 3, "Electronic export filing required", st.label);
        b.label(21, 4, 4, "Yes", st.plain);
        b.span(21, 5, 5, st.check);
        b.label(21, 6, 6, "No", st.plain);
        b.span(21, 7, 7, st.check);
        b.label(22, 0, 11, "Special Instructions", st.label);
        b.area(23, 24, 0, 11, st.wrapped);
        b.label(25, 0, 5, "Signature of USPPI or Authorized Agent", st.label);
        b.label(25, 7, 8, "Date", st.label);
        b.span(26, 0, 5, st.value);
        b.span(26, 7, 8, st.value);
        b.sheet.row_heights.insert(26, 28.0);

        b.sheet.row_heights.insert(27, 36.0);
        b.span(27, 0, 11, st.wrapped);
        b.sheet.set_rich_text(
            CellRange::single(CellRef::new(27, 0)),
            vec![
                TextRun::new("Declaration: ", Font::sized(8.0).bold()),
                TextRun::new(
                    "The USPPI authorizes the forwarder named above to act as agent for \
                     export control and customs purposes. The information on this form is \
                     true and correct.",
                    Font::sized(7.0),
                ),
            ],
        );

        let layout = TemplateLayout {
            geometry: LayoutGeometry {
                anchor_row: 19,
                footer_start: 20,
                footer_end: 27,
            },
            columns: CommodityColumns {
                customs_flag: 0,
                schedule_code: 1,
                net_weight: 3,
                unit_label: 4,
                gross_weight: 5,
                value: 7,
                export_code: 9,
                eccn: 10,
                license: 11,
            },
            header: HeaderCells {
                exporter: AddressBlock {
                    first: CellRef::new(3, 0),
                    lines: 6,
                },
                consignee: AddressBlock {
                    first: CellRef::new(11, 0),
                    lines: 6,
                },
                invoice_number: CellRef::new(2, 9),
                ship_date: CellRef::new(3, 9),
                carrier: CellRef::new(4, 9),
                tracking_number: CellRef::new(5, 9),
                reference: CellRef::new(6, 9),
                incoterms: CellRef::new(7, 9),
                origin_state: CellRef::new(8, 9),
                destination_country: CellRef::new(10, 9),
                special_instructions: CellRef::new(23, 0),
            },
            filing: FilingCells {
                required: CellRef::new(21, 5),
                not_required: CellRef::new(21, 7),
                mark: "X".to_string(),
            },
        };

        Self {
            sheet: b.sheet,
            layout,
        }
    }
}

struct Styles {
    title: StyleId,
    label: StyleId,
    column_head: StyleId,
    value: StyleId,
    centered: StyleId,
    number: StyleId,
    check: StyleId,
    plain: StyleId,
    wrapped: StyleId,
}

impl Styles {
    fn register(sheet: &mut Sheet) -> Self {
        let arial = |size: f64| Font {
            name: Some("Arial".to_string()),
            size: Some(size),
            ..Font::default()
        };

        Self {
            title: sheet.add_style(Style {
                font: arial(14.0).bold(),
                align: Some(HAlign::Center),
                ..Style::default()
            }),
            label: sheet.add_style(Style {
                font: arial(8.0).bold(),
                border: true,
                fill: Some("#D9D9D9".to_string()),
                ..Style::default()
            }),
            column_head: sheet.add_style(Style {
                font: arial(8.0).bold(),
                border: true,
                align: Some(HAlign::Center),
                wrap: true,
                fill: Some("#D9D9D9".to_string()),
                ..Style::default()
            }),
            value: sheet.add_style(Style {
                font: arial(9.0),
                border: true,
                align: Some(HAlign::Left),
                ..Style::default()
            }),
            centered: sheet.add_style(Style {
                font: arial(9.0),
                border: true,
                align: Some(HAlign::Center),
                ..Style::default()
            }),
            number: sheet.add_style(Style {
                font: arial(9.0),
                border: true,
                align: Some(HAlign::Right),
                number_format: Some("#,##0.00".to_string()),
                ..Style::default()
            }),
            check: sheet.add_style(Style {
                font: arial(10.0).bold(),
                border: true,
                align: Some(HAlign::Center),
                ..Style::default()
            }),
            plain: sheet.add_style(Style {
                font: arial(8.0),
                ..Style::default()
            }),
            wrapped: sheet.add_style(Style {
                font: arial(8.0),
                border: true,
                wrap: true,
                ..Style::default()
            }),
        }
    }
}

/// Shorthand for laying out the stock template.
struct Builder {
    sheet: Sheet,
}

impl Builder {
    fn new(name: &str) -> Self {
        Self {
            sheet: Sheet::new(name),
        }
    }

    /// Style columns `c0..=c1` of `row`, merging them when wider than one.
    fn span(&mut self, row: u32, c0: u32, c1: u32, style: StyleId) {
        self.area(row, row, c0, c1, style);
    }

    fn area(&mut self, r0: u32, r1: u32, c0: u32, c1: u32, style: StyleId) {
        let range = CellRange::new(CellRef::new(r0, c0), CellRef::new(r1, c1));
        for at in range.cells() {
            self.sheet.set_style(at, Some(style));
        }
        if range.width() > 1 || range.height() > 1 {
            self.sheet.merges.push(range);
        }
    }

    fn label(&mut self, row: u32, c0: u32, c1: u32, text: &str, style: StyleId) {
        self.span(row, c0, c1, style);
        self.sheet.set_value(CellRef::new(row, c0), CellValue::text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_layout_is_valid() {
        let template = Template::builtin();
        template.layout.validate(&template.sheet).unwrap();
        assert_eq!(template.sheet.last_row(), Some(template.layout.geometry.footer_end));
    }

    #[test]
    fn builtin_merges_do_not_overlap() {
        let merges = Template::builtin().sheet.merges();
        for (i, a) in merges.iter().enumerate() {
            for b in &merges[i + 1..] {
                assert!(!a.intersects(b), "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn template_round_trips_through_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sli.json");
        let template = Template::builtin();

        template.save(&path).unwrap();
        let loaded = Template::load(&path).unwrap();
        assert_eq!(loaded, template);
    }

    #[test]
    fn loading_rejects_broken_geometry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        let mut template = Template::builtin();
        template.layout.geometry.footer_start += 1;
        template.save(&path).unwrap();

        assert!(Template::load(&path).is_err());
    }

    #[test]
    fn loading_rejects_out_of_range_cell_reference() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.json");
        let json = serde_json::to_string(&Template::builtin())
            .unwrap()
            .replacen("\"A4\"", "\"AAAAAAAAAAAA4\"", 1);
        assert!(json.contains("AAAAAAAAAAAA4"));
        fs::write(&path, json).unwrap();

        let err = Template::load(&path).unwrap_err();
        assert!(matches!(err, SliError::TemplateLayout(_)), "{err}");
    }
}
