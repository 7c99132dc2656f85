// src/sheet/mod.rs

//! Minimal spreadsheet model used to fill the SLI template.
//!
//! [`SheetOps`] is the capability the layout code needs from a document
//! engine. [`Sheet`] is the in-memory implementation, serialized to
//! SpreadsheetML by [`xml`].

pub mod xml;

use crate::error::{SliError, SliResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Zero-based cell coordinate. Ordered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Same column, `rows` further down.
    pub const fn down(self, rows: u32) -> Self {
        Self::new(self.row + rows, self.col)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(char::from(b'A' + rem as u8));
            n = (n - 1) / 26;
        }
        let col: String = letters.into_iter().rev().collect();
        write!(f, "{col}{}", self.row + 1)
    }
}

impl FromStr for CellRef {
    type Err = SliError;

    /// Parses A1 notation (`B12`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SliError::layout(format!("bad cell reference '{s}'")))?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SliError::layout(format!("bad cell reference '{s}'")));
        }

        let col = letters
            .chars()
            .try_fold(0u32, |acc, c| {
                acc.checked_mul(26)?
                    .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
            })
            .ok_or_else(|| SliError::layout(format!("bad cell reference '{s}': column out of range")))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| SliError::layout(format!("bad cell reference '{s}'")))?;
        if row == 0 {
            return Err(SliError::layout(format!("bad cell reference '{s}'")));
        }
        Ok(Self::new(row - 1, col - 1))
    }
}

impl TryFrom<String> for CellRef {
    type Error = SliError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}

/// Inclusive rectangular range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRange {
    pub first: CellRef,
    pub last: CellRef,
}

impl CellRange {
    pub fn new(first: CellRef, last: CellRef) -> Self {
        Self {
            first: CellRef::new(first.row.min(last.row), first.col.min(last.col)),
            last: CellRef::new(first.row.max(last.row), first.col.max(last.col)),
        }
    }

    pub fn single(at: CellRef) -> Self {
        Self::new(at, at)
    }

    /// Columns `first_col..=last_col` of one row.
    pub fn row_span(row: u32, first_col: u32, last_col: u32) -> Self {
        Self::new(CellRef::new(row, first_col), CellRef::new(row, last_col))
    }

    pub fn contains(&self, at: CellRef) -> bool {
        (self.first.row..=self.last.row).contains(&at.row)
            && (self.first.col..=self.last.col).contains(&at.col)
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.first.row <= other.last.row
            && other.first.row <= self.last.row
            && self.first.col <= other.last.col
            && other.first.col <= self.last.col
    }

    /// True when the range lies entirely within rows `first..=last`.
    pub fn within_rows(&self, first: u32, last: u32) -> bool {
        self.first.row >= first && self.last.row <= last
    }

    pub fn height(&self) -> u32 {
        self.last.row - self.first.row + 1
    }

    pub fn width(&self) -> u32 {
        self.last.col - self.first.col + 1
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.first.row..=self.last.row)
            .flat_map(move |row| (self.first.col..=self.last.col).map(move |col| CellRef::new(row, col)))
    }

    /// The same shape with each row mapped through `f`.
    pub fn map_rows(&self, f: impl Fn(u32) -> u32) -> Self {
        Self::new(
            CellRef::new(f(self.first.row), self.first.col),
            CellRef::new(f(self.last.row), self.last.col),
        )
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.last)
    }
}

impl FromStr for CellRange {
    type Err = SliError;

    /// `A1:L1`, or a single cell `B3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(a.parse()?, b.parse()?)),
            None => Ok(Self::single(s.parse()?)),
        }
    }
}

impl TryFrom<String> for CellRange {
    type Error = SliError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellRange> for String {
    fn from(value: CellRange) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Font {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
}

impl Font {
    pub fn sized(size: f64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

/// A run of text sharing one font, for mixed-font labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub font: Font,
}

impl TextRun {
    pub fn new(text: impl Into<String>, font: Font) -> Self {
        Self {
            text: text.into(),
            font,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Rich(Vec<TextRun>),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) => false,
            Self::Rich(runs) => runs.iter().all(|r| r.text.is_empty()),
        }
    }

    /// Plain-text rendering, mostly for tests and logs.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Rich(runs) => runs.iter().map(|r| r.text.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub font: Font,
    pub border: bool,
    pub align: Option<HAlign>,
    pub wrap: bool,
    pub number_format: Option<String>,
    /// Background colour, `#RRGGBB`.
    pub fill: Option<String>,
}

pub type StyleId = usize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,
    #[serde(default)]
    pub style: Option<StyleId>,
}

/// Document operations the layout code relies on.
pub trait SheetOps {
    fn value(&self, at: CellRef) -> Option<&CellValue>;
    fn set_value(&mut self, at: CellRef, value: CellValue);
    /// Write mixed-font text into the top-left cell of `range`.
    fn set_rich_text(&mut self, range: CellRange, runs: Vec<TextRun>);
    fn style(&self, at: CellRef) -> Option<StyleId>;
    fn set_style(&mut self, at: CellRef, style: Option<StyleId>);
    /// Copy styles cell-for-cell, tiling `from` over `to`.
    fn copy_style(&mut self, from: CellRange, to: CellRange);
    /// Fails if `range` overlaps an existing merge.
    fn merge(&mut self, range: CellRange) -> SliResult<()>;
    /// Remove every merge intersecting `range`; returns how many.
    fn unmerge(&mut self, range: CellRange) -> usize;
    fn merges(&self) -> Vec<CellRange>;
    fn row_height(&self, row: u32) -> Option<f64>;
    fn set_row_height(&mut self, row: u32, height: Option<f64>);
    /// Cells of one row as `(col, cell)`, left to right.
    fn row_cells(&self, row: u32) -> Vec<(u32, Cell)>;
    fn clear_row(&mut self, row: u32);
    /// Highest row holding a cell, merge, or row height.
    fn last_row(&self) -> Option<u32>;
    fn to_bytes(&self) -> SliResult<Vec<u8>>;
}

/// In-memory worksheet with a style table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sheet {
    pub name: String,
    pub styles: Vec<Style>,
    pub cells: BTreeMap<CellRef, Cell>,
    pub merges: Vec<CellRange>,
    pub row_heights: BTreeMap<u32, f64>,
    pub column_widths: BTreeMap<u32, f64>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Register a style and return its id.
    pub fn add_style(&mut self, style: Style) -> StyleId {
        self.styles.push(style);
        self.styles.len() - 1
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    /// Merge whose top-left cell is `at`.
    pub fn merge_at(&self, at: CellRef) -> Option<CellRange> {
        self.merges.iter().copied().find(|m| m.first == at)
    }

    /// True if `at` lies inside a merge but is not its top-left cell.
    pub fn is_covered(&self, at: CellRef) -> bool {
        self.merges.iter().any(|m| m.contains(at) && m.first != at)
    }

    fn cell_mut(&mut self, at: CellRef) -> &mut Cell {
        self.cells.entry(at).or_default()
    }
}

impl SheetOps for Sheet {
    fn value(&self, at: CellRef) -> Option<&CellValue> {
        self.cells.get(&at).map(|c| &c.value)
    }

    fn set_value(&mut self, at: CellRef, value: CellValue) {
        self.cell_mut(at).value = value;
    }

    fn set_rich_text(&mut self, range: CellRange, runs: Vec<TextRun>) {
        self.cell_mut(range.first).value = CellValue::Rich(runs);
    }

    fn style(&self, at: CellRef) -> Option<StyleId> {
        self.cells.get(&at).and_then(|c| c.style)
    }

    fn set_style(&mut self, at: CellRef, style: Option<StyleId>) {
        self.cell_mut(at).style = style;
    }

    fn copy_style(&mut self, from: CellRange, to: CellRange) {
        let targets: Vec<CellRef> = to.cells().collect();
        for target in targets {
            let source = CellRef::new(
                from.first.row + (target.row - to.first.row) % from.height(),
                from.first.col + (target.col - to.first.col) % from.width(),
            );
            let style = self.style(source);
            self.set_style(target, style);
        }
    }

    fn merge(&mut self, range: CellRange) -> SliResult<()> {
        if let Some(existing) = self.merges.iter().find(|m| m.intersects(&range)) {
            return Err(SliError::layout(format!(
                "merge {range} overlaps existing merge {existing}"
            )));
        }
        self.merges.push(range);
        Ok(())
    }

    fn unmerge(&mut self, range: CellRange) -> usize {
        let before = self.merges.len();
        self.merges.retain(|m| !m.intersects(&range));
        before - self.merges.len()
    }

    fn merges(&self) -> Vec<CellRange> {
        self.merges.clone()
    }

    fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    fn set_row_height(&mut self, row: u32, height: Option<f64>) {
        match height {
            Some(h) => self.row_heights.insert(row, h),
            None => self.row_heights.remove(&row),
        };
    }

    fn row_cells(&self, row: u32) -> Vec<(u32, Cell)> {
        self.cells
            .range(CellRef::new(row, 0)..=CellRef::new(row, u32::MAX))
            .map(|(at, cell)| (at.col, cell.clone()))
            .collect()
    }

    fn clear_row(&mut self, row: u32) {
        self.cells.retain(|at, _| at.row != row);
        self.row_heights.remove(&row);
    }

    fn last_row(&self) -> Option<u32> {
        let cells = self.cells.keys().map(|c| c.row).max();
        let merges = self.merges.iter().map(|m| m.last.row).max();
        let heights = self.row_heights.keys().copied().max();
        [cells, merges, heights].into_iter().flatten().max()
    }

    fn to_bytes(&self) -> SliResult<Vec<u8>> {
        xml::write_workbook(self)
    }
}
