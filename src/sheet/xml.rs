// src/sheet/xml.rs

//! SpreadsheetML 2003 writer. A single XML file Excel and LibreOffice open
//! directly, with styles, merges, row heights, and rich text intact.

use super::{Cell, CellRef, CellValue, Font, HAlign, Sheet, Style, TextRun};
use crate::error::{SliError, SliResult};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeSet;
use std::io::Write;

pub const MIME_TYPE: &str = "application/vnd.ms-excel";

const NS_SPREADSHEET: &str = "urn:schemas-microsoft-com:office:spreadsheet";
const NS_HTML: &str = "http://www.w3.org/TR/REC-html40";

type Attrs<'a> = Vec<(&'a str, String)>;

pub fn write_workbook(sheet: &Sheet) -> SliResult<Vec<u8>> {
    let mut w = Writer::new(Vec::new());

    emit(&mut w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.get_mut().write_all(b"\n<?mso-application progid=\"Excel.Sheet\"?>")?;

    let root: Attrs = vec![
        ("xmlns", NS_SPREADSHEET.to_string()),
        ("xmlns:o", "urn:schemas-microsoft-com:office:office".to_string()),
        ("xmlns:x", "urn:schemas-microsoft-com:office:excel".to_string()),
        ("xmlns:ss", NS_SPREADSHEET.to_string()),
        ("xmlns:html", NS_HTML.to_string()),
    ];
    open(&mut w, "Workbook", &root)?;

    open(&mut w, "Styles", &[])?;
    for (id, style) in sheet.styles.iter().enumerate() {
        write_style(&mut w, id, style)?;
    }
    close(&mut w, "Styles")?;

    let name = if sheet.name.is_empty() { "Sheet1" } else { &sheet.name };
    open(&mut w, "Worksheet", &[("ss:Name", name.to_string())])?;
    open(&mut w, "Table", &[])?;

    for (col, width) in &sheet.column_widths {
        empty(
            &mut w,
            "Column",
            &[("ss:Index", (col + 1).to_string()), ("ss:Width", width.to_string())],
        )?;
    }

    for row in rows_to_write(sheet) {
        write_row(&mut w, sheet, row)?;
    }

    close(&mut w, "Table")?;
    close(&mut w, "Worksheet")?;
    close(&mut w, "Workbook")?;

    Ok(w.into_inner())
}

fn rows_to_write(sheet: &Sheet) -> BTreeSet<u32> {
    sheet
        .cells
        .keys()
        .map(|c| c.row)
        .chain(sheet.merges.iter().map(|m| m.first.row))
        .chain(sheet.row_heights.keys().copied())
        .collect()
}

fn write_row(w: &mut Writer<Vec<u8>>, sheet: &Sheet, row: u32) -> SliResult<()> {
    let mut attrs: Attrs = vec![("ss:Index", (row + 1).to_string())];
    if let Some(height) = sheet.row_heights.get(&row) {
        attrs.push(("ss:AutoFitHeight", "0".to_string()));
        attrs.push(("ss:Height", height.to_string()));
    }

    let mut cols: BTreeSet<u32> = sheet
        .cells
        .range(CellRef::new(row, 0)..=CellRef::new(row, u32::MAX))
        .map(|(at, _)| at.col)
        .collect();
    cols.extend(sheet.merges.iter().filter(|m| m.first.row == row).map(|m| m.first.col));

    if cols.is_empty() {
        return empty(w, "Row", &attrs);
    }

    open(w, "Row", &attrs)?;
    for col in cols {
        let at = CellRef::new(row, col);
        if sheet.is_covered(at) {
            continue;
        }
        write_cell(w, sheet, at, sheet.cell(at))?;
    }
    close(w, "Row")
}

fn write_cell(w: &mut Writer<Vec<u8>>, sheet: &Sheet, at: CellRef, cell: Option<&Cell>) -> SliResult<()> {
    let mut attrs: Attrs = vec![("ss:Index", (at.col + 1).to_string())];
    if let Some(merge) = sheet.merge_at(at) {
        if merge.width() > 1 {
            attrs.push(("ss:MergeAcross", (merge.width() - 1).to_string()));
        }
        if merge.height() > 1 {
            attrs.push(("ss:MergeDown", (merge.height() - 1).to_string()));
        }
    }
    if let Some(style) = cell.and_then(|c| c.style) {
        attrs.push(("ss:StyleID", style_id(style)));
    }

    let value = cell.map(|c| &c.value).filter(|v| !v.is_empty());
    let Some(value) = value else {
        return empty(w, "Cell", &attrs);
    };

    open(w, "Cell", &attrs)?;
    match value {
        CellValue::Text(s) => text_element(w, "Data", &[("ss:Type", "String".to_string())], s)?,
        CellValue::Number(n) => {
            text_element(w, "Data", &[("ss:Type", "Number".to_string())], &n.to_string())?
        }
        CellValue::Rich(runs) => write_rich(w, runs)?,
        CellValue::Empty => {}
    }
    close(w, "Cell")
}

fn write_rich(w: &mut Writer<Vec<u8>>, runs: &[TextRun]) -> SliResult<()> {
    let attrs: Attrs = vec![("ss:Type", "String".to_string()), ("xmlns", NS_HTML.to_string())];
    open(w, "ss:Data", &attrs)?;
    for run in runs {
        let font_attrs = html_font_attrs(&run.font);
        open(w, "Font", &font_attrs)?;
        if run.font.bold {
            open(w, "B", &[])?;
        }
        if run.font.italic {
            open(w, "I", &[])?;
        }
        emit(w, Event::Text(BytesText::new(&run.text)))?;
        if run.font.italic {
            close(w, "I")?;
        }
        if run.font.bold {
            close(w, "B")?;
        }
        close(w, "Font")?;
    }
    close(w, "ss:Data")
}

fn html_font_attrs(font: &Font) -> Attrs<'static> {
    let mut attrs = Attrs::new();
    if let Some(name) = &font.name {
        attrs.push(("html:Face", name.clone()));
    }
    if let Some(size) = font.size {
        attrs.push(("html:Size", size.to_string()));
    }
    attrs
}

fn write_style(w: &mut Writer<Vec<u8>>, id: usize, style: &Style) -> SliResult<()> {
    open(w, "Style", &[("ss:ID", style_id(id))])?;

    let mut align: Attrs = vec![("ss:Vertical", "Center".to_string())];
    if let Some(h) = style.align {
        let h = match h {
            HAlign::Left => "Left",
            HAlign::Center => "Center",
            HAlign::Right => "Right",
        };
        align.push(("ss:Horizontal", h.to_string()));
    }
    if style.wrap {
        align.push(("ss:WrapText", "1".to_string()));
    }
    empty(w, "Alignment", &align)?;

    if style.border {
        open(w, "Borders", &[])?;
        for position in ["Bottom", "Left", "Right", "Top"] {
            empty(
                w,
                "Border",
                &[
                    ("ss:Position", position.to_string()),
                    ("ss:LineStyle", "Continuous".to_string()),
                    ("ss:Weight", "1".to_string()),
                ],
            )?;
        }
        close(w, "Borders")?;
    }

    let mut font: Attrs = Vec::new();
    if let Some(name) = &style.font.name {
        font.push(("ss:FontName", name.clone()));
    }
    if let Some(size) = style.font.size {
        font.push(("ss:Size", size.to_string()));
    }
    if style.font.bold {
        font.push(("ss:Bold", "1".to_string()));
    }
    if style.font.italic {
        font.push(("ss:Italic", "1".to_string()));
    }
    if !font.is_empty() {
        empty(w, "Font", &font)?;
    }

    if let Some(fill) = &style.fill {
        empty(
            w,
            "Interior",
            &[("ss:Color", fill.clone()), ("ss:Pattern", "Solid".to_string())],
        )?;
    }
    if let Some(format) = &style.number_format {
        empty(w, "NumberFormat", &[("ss:Format", format.clone())])?;
    }

    close(w, "Style")
}

fn style_id(id: usize) -> String {
    format!("s{id}")
}

fn start<'a>(name: &'a str, attrs: &'a [(&'a str, String)]) -> BytesStart<'a> {
    BytesStart::new(name).with_attributes(attrs.iter().map(|(k, v)| (*k, v.as_str())))
}

fn open(w: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, String)]) -> SliResult<()> {
    emit(w, Event::Start(start(name, attrs)))
}

fn empty(w: &mut Writer<Vec<u8>>, name: &str, attrs: &[(&str, String)]) -> SliResult<()> {
    emit(w, Event::Empty(start(name, attrs)))
}

fn close(w: &mut Writer<Vec<u8>>, name: &str) -> SliResult<()> {
    emit(w, Event::End(BytesEnd::new(name)))
}

fn text_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    attrs: &[(&str, String)],
    text: &str,
) -> SliResult<()> {
    open(w, name, attrs)?;
    emit(w, Event::Text(BytesText::new(text)))?;
    close(w, name)
}

fn emit(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> SliResult<()> {
    w.write_event(event)
        .map_err(|e| SliError::Io(std::io::Error::other(e.to_string())))
}
