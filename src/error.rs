// src/error.rs

use std::collections::BTreeSet;
use thiserror::Error;

/// Result type used across the pipeline.
pub type SliResult<T> = Result<T, SliError>;

/// Failures the caller has to act on.
///
/// Parse problems are not represented here: an unreadable invoice section
/// simply yields fewer (or zero) line items.
#[derive(Debug, Error)]
pub enum SliError {
    /// Product codes referenced by the invoices have no master-data record.
    /// Enter the records, then resume the session.
    #[error("missing master data for {} product code(s): {}", codes.len(), join(codes))]
    MissingMasterData { codes: BTreeSet<String> },

    /// The document template does not have the expected anchor/footer layout.
    #[error("template layout error: {0}")]
    TemplateLayout(String),

    /// `resume` was called for a session with no cached parse result.
    #[error("no cached run for session {0}")]
    SessionNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SliError {
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::TemplateLayout(msg.into())
    }

    /// The codes needing manual resolution, if this is the master-data gate.
    pub fn missing_codes(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::MissingMasterData { codes } => Some(codes),
            _ => None,
        }
    }
}

fn join(codes: &BTreeSet<String>) -> String {
    codes.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_master_data_lists_codes() {
        let codes: BTreeSet<String> = ["10689", "40858"].iter().map(|s| s.to_string()).collect();
        let err = SliError::MissingMasterData { codes };
        assert_eq!(
            err.to_string(),
            "missing master data for 2 product code(s): 10689, 40858"
        );
        assert_eq!(err.missing_codes().map(|c| c.len()), Some(2));
        assert!(SliError::layout("x").missing_codes().is_none());
    }
}
