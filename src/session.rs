// src/session.rs

use crate::error::{SliError, SliResult};
use crate::heuristics::LineItem;
use crate::store::SliStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// Parse output of one `generate` call, kept so a run blocked on master data
/// can resume without re-reading the invoices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRun {
    /// Source files, in the order they were parsed.
    pub sources: Vec<String>,
    /// One item list per source.
    pub item_lists: Vec<Vec<LineItem>>,
}

impl CachedRun {
    pub fn item_count(&self) -> usize {
        self.item_lists.iter().map(Vec::len).sum()
    }
}

/// Default session key: SHA-256 of the sorted source paths, so the same set
/// of invoices maps to the same session regardless of argument order.
pub fn session_key<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

pub fn save(store: &SliStore, key: &str, run: &CachedRun) -> SliResult<()> {
    let payload = serde_json::to_string(run)?;
    store.save_session(key, &payload)?;
    Ok(())
}

pub fn load(store: &SliStore, key: &str) -> SliResult<CachedRun> {
    let payload = store
        .load_session(key)?
        .ok_or_else(|| SliError::SessionNotFound(key.to_string()))?;
    let run: CachedRun = serde_json::from_str(&payload)?;
    info!(session = %key, sources = run.sources.len(), items = run.item_count(), "Loaded cached run");
    Ok(run)
}
