// src/resolver.rs

use crate::aggregate::MergedItem;
use crate::error::{SliError, SliResult};
use crate::master::ProductMaster;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Every distinct product code referenced by `merged`.
pub fn referenced_codes(merged: &[MergedItem]) -> BTreeSet<String> {
    merged.iter().map(|m| m.product_code.clone()).collect()
}

/// Referenced product codes with no master-data record.
pub fn find_missing(merged: &[MergedItem], master: &ProductMaster) -> BTreeSet<String> {
    referenced_codes(merged)
        .into_iter()
        .filter(|code| !master.contains(code))
        .collect()
}

/// Referenced product codes whose record cannot produce a gross weight.
pub fn find_degenerate(merged: &[MergedItem], master: &ProductMaster) -> BTreeSet<String> {
    referenced_codes(merged)
        .into_iter()
        .filter(|code| master.get(code).is_some_and(|r| r.is_degenerate()))
        .collect()
}

/// The master-data gate: nothing downstream runs while codes are missing.
pub fn ensure_complete(merged: &[MergedItem], master: &ProductMaster) -> SliResult<()> {
    let missing = find_missing(merged, master);
    if missing.is_empty() {
        info!(codes = master.len(), "Master data complete");
        return Ok(());
    }

    warn!(
        missing = missing.len(),
        codes = ?missing,
        "Master data incomplete; enter the records and resume"
    );
    Err(SliError::MissingMasterData { codes: missing })
}
