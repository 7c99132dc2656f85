// src/heuristics/line_items.rs

use super::{LineItem, code};
use bigdecimal::BigDecimal;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Column header preceding the line-item table.
static SECTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)total value").expect("valid section start pattern"));

/// Footer that closes the line-item table on multi-page invoices.
static SECTION_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invoice line").expect("valid section end pattern"));

/// One line item in the whitespace-collapsed token stream:
/// `<qty> EA <code> <CC> <unit price> <total price> <description> <####.##.####>`
static LINE_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d+) EA (\S+) ([A-Z]{2}) (\d[\d,]*\.\d+) (\d[\d,]*\.\d+) (.+?) ?(\d{4}\.\d{2}\.\d{4})\b",
    )
    .expect("valid line item pattern")
});

pub(super) fn parse(text: &str) -> Vec<LineItem> {
    let Some(section) = item_section(text) else {
        warn!("No 'Total Value' section found; invoice yields no items");
        return Vec::new();
    };

    let stream = section.split_whitespace().collect::<Vec<_>>().join(" ");

    let items: Vec<LineItem> = LINE_ITEM
        .captures_iter(&stream)
        .filter_map(|cap| {
            let item = to_line_item(&cap);
            if item.is_none() {
                debug!(raw = &cap[0], "Dropping line item with unparseable numbers");
            }
            item
        })
        .collect();

    debug!(items = items.len(), "Parsed invoice section");
    items
}

/// The slice between the line after the "Total Value" header and the first
/// "Invoice Line" footer (or end of text).
fn item_section(text: &str) -> Option<&str> {
    let anchor = SECTION_START.find(text)?;
    let newline = text[anchor.end()..].find('\n')?;
    let start = anchor.end() + newline + 1;

    let rest = &text[start..];
    let end = SECTION_END.find(rest).map_or(rest.len(), |m| m.start());
    Some(&rest[..end])
}

fn to_line_item(cap: &regex::Captures<'_>) -> Option<LineItem> {
    Some(LineItem {
        quantity: cap[1].parse().ok()?,
        product_code: code::normalize(&cap[2]),
        origin_country: cap[3].to_string(),
        unit_price: parse_amount(&cap[4])?,
        total_price: parse_amount(&cap[5])?,
        description: clean_description(&cap[6]),
        schedule_code: cap[7].to_string(),
    })
}

fn parse_amount(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(&raw.replace(',', "")).ok()
}

/// Drop the dangling " -" separator the invoice layout puts before the
/// schedule code.
fn clean_description(raw: &str) -> String {
    let trimmed = raw.trim_end();
    trimmed
        .strip_suffix('-')
        .map_or(trimmed, str::trim_end)
        .to_string()
}
