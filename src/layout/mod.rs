// src/layout/mod.rs

//! Fills the SLI template: header fields, one commodity row per group, and
//! the footer pushed down to make room.
//!
//! All row arithmetic lives in [`LayoutGeometry`] / [`Expansion`]; a
//! template redesign only changes the numbers in [`template`].

pub mod header;
pub mod template;

use crate::error::{SliError, SliResult};
use crate::sheet::{Cell, CellRange, CellRef, CellValue, Sheet, SheetOps};
use crate::weights::CommodityRow;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use header::{AddressBlock, HeaderCells, HeaderData, Party};
pub use template::Template;

/// Row positions of the growable commodity block and the footer below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutGeometry {
    /// The single commodity row the template ships with.
    pub anchor_row: u32,
    /// First footer row; always `anchor_row + 1`.
    pub footer_start: u32,
    /// Last footer row, inclusive.
    pub footer_end: u32,
}

impl LayoutGeometry {
    pub fn validate(&self) -> SliResult<()> {
        if self.footer_start != self.anchor_row + 1 {
            return Err(SliError::layout(format!(
                "footer must start directly below the anchor row (anchor {}, footer {})",
                self.anchor_row + 1,
                self.footer_start + 1
            )));
        }
        if self.footer_end < self.footer_start {
            return Err(SliError::layout("footer ends before it starts"));
        }
        Ok(())
    }

    /// Plan the growth for `row_count` commodity rows.
    pub fn expand(&self, row_count: usize) -> Expansion {
        let offset = u32::try_from(row_count.saturating_sub(1)).unwrap_or(u32::MAX);
        Expansion {
            geometry: *self,
            offset,
        }
    }

    pub fn footer_rows(&self) -> impl DoubleEndedIterator<Item = u32> {
        self.footer_start..=self.footer_end
    }
}

/// A geometry grown by `offset` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub geometry: LayoutGeometry,
    pub offset: u32,
}

impl Expansion {
    /// Where a template row ends up: footer rows move down by `offset`,
    /// everything above the footer stays put.
    pub fn shift(&self, row: u32) -> u32 {
        if row >= self.geometry.footer_start {
            row + self.offset
        } else {
            row
        }
    }

    pub fn shift_cell(&self, at: CellRef) -> CellRef {
        CellRef::new(self.shift(at.row), at.col)
    }

    /// Sheet row of the `index`-th commodity row.
    pub fn commodity_row(&self, index: usize) -> u32 {
        self.geometry.anchor_row + index as u32
    }
}

/// Zero-based columns of the commodity row. Merged columns name their
/// top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityColumns {
    pub customs_flag: u32,
    pub schedule_code: u32,
    pub net_weight: u32,
    pub unit_label: u32,
    pub gross_weight: u32,
    pub value: u32,
    pub export_code: u32,
    pub eccn: u32,
    pub license: u32,
}

impl CommodityColumns {
    fn all(&self) -> [u32; 9] {
        [
            self.customs_flag,
            self.schedule_code,
            self.net_weight,
            self.unit_label,
            self.gross_weight,
            self.value,
            self.export_code,
            self.eccn,
            self.license,
        ]
    }
}

/// The two footer boxes recording whether electronic export filing applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingCells {
    pub required: CellRef,
    pub not_required: CellRef,
    pub mark: String,
}

/// Per-row constants and the filing threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RowConstants {
    pub export_information_code: String,
    pub eccn: String,
    pub license_designation: String,
    /// Rows valued above this require additional filing.
    pub value_threshold: BigDecimal,
}

/// Where everything goes in a template sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub geometry: LayoutGeometry,
    pub columns: CommodityColumns,
    pub header: HeaderCells,
    pub filing: FilingCells,
}

impl TemplateLayout {
    /// Check the layout against the sheet it will be applied to.
    pub fn validate<S: SheetOps>(&self, sheet: &S) -> SliResult<()> {
        let g = self.geometry;
        g.validate()?;

        if sheet.row_cells(g.anchor_row).is_empty() {
            return Err(SliError::layout(format!(
                "anchor row {} has no cells",
                g.anchor_row + 1
            )));
        }
        for col in self.columns.all() {
            let at = CellRef::new(g.anchor_row, col);
            if sheet.merges().iter().any(|m| m.contains(at) && m.first != at) {
                return Err(SliError::layout(format!(
                    "commodity column {at} is inside a merged region"
                )));
            }
        }
        if !g.footer_rows().any(|row| !sheet.row_cells(row).is_empty()) {
            return Err(SliError::layout("footer rows have no cells"));
        }
        // Growth rewrites the rows under the footer, so nothing may live there.
        if let Some(last) = sheet.last_row().filter(|&row| row > g.footer_end) {
            return Err(SliError::layout(format!(
                "row {} is below the footer (last footer row {})",
                last + 1,
                g.footer_end + 1
            )));
        }

        for merge in sheet.merges() {
            let touches_footer = merge.last.row >= g.footer_start && merge.first.row <= g.footer_end;
            if touches_footer && !merge.within_rows(g.footer_start, g.footer_end) {
                return Err(SliError::layout(format!(
                    "merge {merge} straddles the footer boundary"
                )));
            }
            if merge.first.row <= g.anchor_row && merge.last.row >= g.anchor_row && merge.height() > 1 {
                return Err(SliError::layout(format!(
                    "merge {merge} spans more than the anchor row"
                )));
            }
        }

        for at in self.header.fields() {
            if at.row == g.anchor_row {
                return Err(SliError::layout(format!("header cell {at} is in the commodity row")));
            }
        }
        for block in [self.header.exporter, self.header.consignee] {
            if block.last_row() >= g.anchor_row {
                return Err(SliError::layout(format!(
                    "address block at {} runs into the commodity block",
                    block.first
                )));
            }
        }
        for at in [self.filing.required, self.filing.not_required] {
            if !(g.footer_start..=g.footer_end).contains(&at.row) {
                return Err(SliError::layout(format!("filing cell {at} is outside the footer")));
            }
        }
        Ok(())
    }
}

/// Footer contents captured before the commodity rows overwrite them.
struct FooterSnapshot {
    rows: Vec<(u32, Vec<(u32, Cell)>, Option<f64>)>,
    merges: Vec<CellRange>,
}

impl FooterSnapshot {
    fn take<S: SheetOps>(sheet: &S, geometry: &LayoutGeometry) -> Self {
        let rows = geometry
            .footer_rows()
            .map(|row| (row, sheet.row_cells(row), sheet.row_height(row)))
            .collect();
        let merges = sheet
            .merges()
            .into_iter()
            .filter(|m| m.within_rows(geometry.footer_start, geometry.footer_end))
            .collect();
        Self { rows, merges }
    }

    /// Lift the footer out of its template position.
    fn detach<S: SheetOps>(&self, sheet: &mut S) {
        for merge in &self.merges {
            sheet.unmerge(*merge);
        }
        for (row, _, _) in &self.rows {
            sheet.clear_row(*row);
        }
    }

    /// Write the footer back at its shifted position, bottom row first.
    fn attach<S: SheetOps>(&self, sheet: &mut S, expansion: &Expansion) -> SliResult<()> {
        let moved: Vec<CellRange> = self
            .merges
            .iter()
            .map(|m| m.map_rows(|row| expansion.shift(row)))
            .collect();
        for merge in &moved {
            let removed = sheet.unmerge(*merge);
            if removed > 0 {
                debug!(range = %merge, removed, "Cleared conflicting merges at footer destination");
            }
        }

        for (row, cells, height) in self.rows.iter().rev() {
            let dest = expansion.shift(*row);
            sheet.clear_row(dest);
            for (col, cell) in cells {
                let at = CellRef::new(dest, *col);
                sheet.set_value(at, cell.value.clone());
                sheet.set_style(at, cell.style);
            }
            sheet.set_row_height(dest, *height);
        }

        for merge in moved {
            sheet.merge(merge)?;
        }
        Ok(())
    }
}

/// Write header fields and commodity rows into `sheet`, growing the footer.
///
/// `today` fills the ship date when the header leaves it blank.
pub fn render_into<S: SheetOps>(
    sheet: &mut S,
    layout: &TemplateLayout,
    rows: &[CommodityRow],
    header: &HeaderData,
    constants: &RowConstants,
    today: &str,
) -> SliResult<Expansion> {
    layout.validate(sheet)?;
    header::write_header(sheet, &layout.header, header, today);

    let expansion = layout.geometry.expand(rows.len());
    let footer = FooterSnapshot::take(sheet, &layout.geometry);
    if expansion.offset > 0 {
        footer.detach(sheet);
    }

    write_commodity_rows(sheet, layout, &expansion, rows, constants)?;

    if expansion.offset > 0 {
        footer.attach(sheet, &expansion)?;
    }

    let filing_required = rows.iter().any(|r| r.total_value > constants.value_threshold);
    let (marked, cleared) = if filing_required {
        (layout.filing.required, layout.filing.not_required)
    } else {
        (layout.filing.not_required, layout.filing.required)
    };
    sheet.set_value(expansion.shift_cell(marked), CellValue::text(layout.filing.mark.as_str()));
    sheet.set_value(expansion.shift_cell(cleared), CellValue::Empty);

    info!(
        rows = rows.len(),
        offset = expansion.offset,
        filing_required,
        "Rendered SLI layout"
    );
    Ok(expansion)
}

/// Render onto a copy of the template sheet.
pub fn render(
    rows: &[CommodityRow],
    header: &HeaderData,
    template: &Template,
    constants: &RowConstants,
    today: &str,
) -> SliResult<Sheet> {
    let mut sheet = template.sheet.clone();
    render_into(&mut sheet, &template.layout, rows, header, constants, today)?;
    Ok(sheet)
}

fn write_commodity_rows<S: SheetOps>(
    sheet: &mut S,
    layout: &TemplateLayout,
    expansion: &Expansion,
    rows: &[CommodityRow],
    constants: &RowConstants,
) -> SliResult<()> {
    let anchor = layout.geometry.anchor_row;
    let anchor_cells = sheet.row_cells(anchor);
    let last_col = anchor_cells.iter().map(|(col, _)| *col).max().unwrap_or(0);
    let anchor_span = CellRange::row_span(anchor, 0, last_col);
    let anchor_merges: Vec<CellRange> = sheet
        .merges()
        .into_iter()
        .filter(|m| m.within_rows(anchor, anchor))
        .collect();
    let anchor_height = sheet.row_height(anchor);

    let cols = layout.columns;
    for (index, row) in rows.iter().enumerate() {
        let r = expansion.commodity_row(index);
        if index > 0 {
            sheet.unmerge(CellRange::row_span(r, 0, last_col));
            sheet.copy_style(anchor_span, CellRange::row_span(r, 0, last_col));
            for merge in &anchor_merges {
                sheet.merge(merge.map_rows(|_| r))?;
            }
            sheet.set_row_height(r, anchor_height);
        }

        let at = |col| CellRef::new(r, col);
        sheet.set_value(at(cols.customs_flag), CellValue::text(row.customs_flag.to_string()));
        sheet.set_value(at(cols.schedule_code), CellValue::text(row.schedule_code.as_str()));
        sheet.set_value(at(cols.net_weight), CellValue::Number(row.net_weight));
        sheet.set_value(at(cols.unit_label), CellValue::text(row.unit_label.as_str()));
        sheet.set_value(at(cols.gross_weight), CellValue::Number(row.gross_weight_kg));
        sheet.set_value(
            at(cols.value),
            value_cell(&row.total_value),
        );
        sheet.set_value(
            at(cols.export_code),
            CellValue::text(constants.export_information_code.as_str()),
        );
        sheet.set_value(at(cols.eccn), CellValue::text(constants.eccn.as_str()));
        sheet.set_value(
            at(cols.license),
            CellValue::text(constants.license_designation.as_str()),
        );
    }
    Ok(())
}

/// A number cell when the value fits an f64, otherwise the exact decimal as text.
fn value_cell(value: &BigDecimal) -> CellValue {
    match value.to_f64().filter(|v| v.is_finite()) {
        Some(v) => CellValue::Number(v),
        None => {
            warn!(%value, "Value does not fit a number cell; writing it as text");
            CellValue::text(value.to_string())
        }
    }
}
