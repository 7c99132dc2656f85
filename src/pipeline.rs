// src/pipeline.rs

//! Invoice files in, finished SLI workbook out.
//!
//! `generate` parses and caches the per-invoice item lists before touching
//! master data, so a run stopped by missing records can `resume` from the
//! cache once they are entered.

use crate::aggregate;
use crate::config::{Config, DocumentConfig};
use crate::error::SliResult;
use crate::heuristics::{self, LineItem};
use crate::layout::{self, HeaderData, Template};
use crate::pdf_extract;
use crate::resolver;
use crate::session::{self, CachedRun};
use crate::sheet::{SheetOps, xml};
use crate::store::SliStore;
use crate::weights::{self, CalcWarning};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, info_span, warn};

/// The rendered workbook and the data-quality findings behind it.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub warnings: Vec<CalcWarning>,
}

impl GeneratedDocument {
    /// Write the workbook into `dir`, creating it if needed.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> SliResult<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), bytes = self.bytes.len(), "Document written");
        Ok(path)
    }
}

pub struct Pipeline {
    store: SliStore,
    template: Template,
    document: DocumentConfig,
}

impl Pipeline {
    pub fn new(store: SliStore, template: Template, document: DocumentConfig) -> Self {
        Self {
            store,
            template,
            document,
        }
    }

    /// Open the store and template named by `cfg`.
    pub fn from_config(cfg: &Config) -> SliResult<Self> {
        if let Some(parent) = Path::new(&cfg.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let store = SliStore::new(&cfg.db_path)?;
        let template = match &cfg.template_path {
            Some(path) => Template::load(path)?,
            None => Template::builtin(),
        };
        Ok(Self::new(store, template, cfg.document.clone()))
    }

    pub fn store(&self) -> &SliStore {
        &self.store
    }

    /// Parse every source, in order. A source with no recognizable item
    /// section contributes an empty list.
    pub fn parse_sources<P: AsRef<Path>>(&self, paths: &[P]) -> SliResult<Vec<Vec<LineItem>>> {
        let mut item_lists = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let span = info_span!(
                "source",
                path = %path.display(),
                image_ratio = tracing::field::Empty
            );
            let _guard = span.enter();

            let source = pdf_extract::text_of(path)?;
            if let Some(scan) = source.scan {
                span.record("image_ratio", scan.ratio());
            }
            let items = heuristics::parse_invoice(&source.text);
            if items.is_empty() {
                warn!("No line items found");
            } else {
                info!(items = items.len(), "Parsed invoice");
            }
            item_lists.push(items);
        }
        Ok(item_lists)
    }

    /// Parse `paths`, cache the result under `session_key`, and build the
    /// document. The cache is written even when master data is missing.
    pub fn generate<P: AsRef<Path>>(
        &self,
        paths: &[P],
        session_key: &str,
        header: &HeaderData,
        today: &str,
    ) -> SliResult<GeneratedDocument> {
        let run = CachedRun {
            sources: paths
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect(),
            item_lists: self.parse_sources(paths)?,
        };
        session::save(&self.store, session_key, &run)?;
        self.build(&run.item_lists, header, today)
    }

    /// Rebuild from the cached parse of `session_key` against current master data.
    pub fn resume(
        &self,
        session_key: &str,
        header: &HeaderData,
        today: &str,
    ) -> SliResult<GeneratedDocument> {
        let run = session::load(&self.store, session_key)?;
        self.build(&run.item_lists, header, today)
    }

    /// Forget the cached parse. Returns whether one existed.
    pub fn reset(&self, session_key: &str) -> SliResult<bool> {
        Ok(self.store.clear_session(session_key)?)
    }

    fn build(
        &self,
        item_lists: &[Vec<LineItem>],
        header: &HeaderData,
        today: &str,
    ) -> SliResult<GeneratedDocument> {
        let merged = aggregate::merge(item_lists);
        let master = self.store.lookup(&resolver::referenced_codes(&merged))?;
        resolver::ensure_complete(&merged, &master)?;

        let degenerate = resolver::find_degenerate(&merged, &master);
        if !degenerate.is_empty() {
            self.store.flag_for_correction(&degenerate)?;
        }

        let groups = aggregate::group(&merged);
        let (rows, warnings) = weights::commodity_rows(&groups, &master)?;

        let constants = self.document.row_constants();
        let sheet = layout::render(&rows, header, &self.template, &constants, today)?;
        let bytes = sheet.to_bytes()?;

        info!(
            merged = merged.len(),
            groups = groups.len(),
            warnings = warnings.len(),
            bytes = bytes.len(),
            "SLI generated"
        );
        Ok(GeneratedDocument {
            filename: self.document.filename.clone(),
            mime_type: xml::MIME_TYPE,
            bytes,
            warnings,
        })
    }
}

/// Today's UTC date as `YYYY-MM-DD`, the ship date fallback.
pub fn today_utc() -> String {
    OffsetDateTime::now_utc().date().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SliError;
    use crate::master::ProductRecord;
    use std::io::Write;

    const INVOICE: &str = "\
Commercial Invoice
Qty UOM Item Origin Unit Price Total Value
10 EA 40858-M40858 US 2.50 25.00 Hex bolt 7318.15.2095
4 EA 210013-010-M210013010 CN 100.00 400.00 Gear set- 8483.40.5010
Invoice Line Summary
";

    fn pipeline() -> Pipeline {
        Pipeline::new(
            SliStore::in_memory().unwrap(),
            Template::builtin(),
            DocumentConfig::default(),
        )
    }

    fn invoice_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(INVOICE.as_bytes()).unwrap();
        file
    }

    fn record(units_per_carton: u32) -> ProductRecord {
        ProductRecord {
            unit_weight: 0.5,
            carton_weight: 20.0,
            units_per_carton,
            unit_of_measure: "kg".into(),
        }
    }

    #[test]
    fn parse_sources_keeps_source_order() {
        let p = pipeline();
        let file = invoice_file();
        let lists = p.parse_sources(&[file.path(), file.path()]).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0], lists[1]);
        assert_eq!(lists[0].len(), 2);
    }

    #[test]
    fn generate_reports_missing_codes_then_resume_succeeds() {
        let p = pipeline();
        let file = invoice_file();
        let header = HeaderData::default();

        let err = p
            .generate(&[file.path()], "s1", &header, "2026-10-18")
            .unwrap_err();
        let missing: Vec<&str> = err
            .missing_codes()
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(missing, ["210013-010", "40858"]);

        p.store().upsert("40858", &record(10)).unwrap();
        p.store().upsert("210013-010", &record(0)).unwrap();

        let doc = p.resume("s1", &header, "2026-10-18").unwrap();
        assert_eq!(doc.filename, "shippers_letter_of_instruction.xml");
        assert_eq!(doc.mime_type, "application/vnd.ms-excel");
        assert!(doc.warnings.contains(&CalcWarning::DegenerateRecord {
            product_code: "210013-010".into()
        }));

        let flagged = p.store().flagged_products().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].code, "210013-010");

        let xml = String::from_utf8(doc.bytes).unwrap();
        assert!(xml.contains("7318.15.2095"));
        assert!(xml.contains("8483.40.5010"));
        assert!(xml.contains("2026-10-18"));
    }

    #[test]
    fn reset_drops_the_session() {
        let p = pipeline();
        let file = invoice_file();
        let _ = p.generate(&[file.path()], "s2", &HeaderData::default(), "2026-10-18");

        assert!(p.reset("s2").unwrap());
        let err = p.resume("s2", &HeaderData::default(), "2026-10-18").unwrap_err();
        assert!(matches!(err, SliError::SessionNotFound(_)));
    }

    #[test]
    fn document_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let doc = GeneratedDocument {
            filename: "sli.xml".into(),
            mime_type: xml::MIME_TYPE,
            bytes: b"<x/>".to_vec(),
            warnings: Vec::new(),
        };
        let path = doc.write_to(dir.path().join("nested")).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"<x/>");
    }

    #[test]
    fn today_is_iso_formatted() {
        let today = today_utc();
        assert_eq!(today.len(), 10);
        assert_eq!(&today[4..5], "-");
    }
}
