// src/config.rs

use crate::error::{SliError, SliResult};
use crate::layout::{HeaderData, RowConstants};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,
    /// JSON template; the built-in SLI template is used when unset.
    pub template_path: Option<String>,
    pub output_dir: String,
    pub document: DocumentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "data/sli.db".to_string(),
            template_path: None,
            output_dir: "out".to_string(),
            document: DocumentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub filename: String,
    /// Whole dollars; a row valued above this requires export filing.
    pub value_threshold: u64,
    pub export_information_code: String,
    pub eccn: String,
    pub license_designation: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            filename: "shippers_letter_of_instruction.xml".to_string(),
            value_threshold: 2500,
            export_information_code: "OS".to_string(),
            eccn: "EAR99".to_string(),
            license_designation: "NLR".to_string(),
        }
    }
}

impl DocumentConfig {
    pub fn row_constants(&self) -> RowConstants {
        RowConstants {
            export_information_code: self.export_information_code.clone(),
            eccn: self.eccn.clone(),
            license_designation: self.license_designation.clone(),
            value_threshold: BigDecimal::from(self.value_threshold),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> SliResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SliError::Config(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> SliResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

/// Read the per-run shipment header.
pub fn load_header(path: impl AsRef<Path>) -> SliResult<HeaderData> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| SliError::Config(format!("header: {e}")))
}
