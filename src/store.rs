// src/store.rs

use crate::master::{ProductMaster, ProductRecord};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// SQLite-backed product master plus the per-session parse cache.
pub struct SliStore {
    conn: Connection,
}

/// One row of the `products` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub code: String,
    pub record: ProductRecord,
    pub needs_correction: bool,
    pub updated_at: String,
}

impl SliStore {
    /// Open (or create) the store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        // Concurrent `master set` calls from other processes wait instead of failing.
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS products (
                code TEXT PRIMARY KEY,
                unit_weight REAL NOT NULL,
                carton_weight REAL NOT NULL,
                units_per_carton INTEGER NOT NULL,
                unit_of_measure TEXT NOT NULL,
                needs_correction INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_products_needs_correction ON products(needs_correction)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Fetch the records for `codes`. Codes without a row are simply absent
    /// from the result.
    pub fn lookup(&self, codes: &BTreeSet<String>) -> SqliteResult<ProductMaster> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT unit_weight, carton_weight, units_per_carton, unit_of_measure
             FROM products
             WHERE code = ?1",
        )?;

        let mut master = ProductMaster::new();
        for code in codes {
            let record = stmt
                .query_row(params![code], Self::row_to_record)
                .optional()?;
            if let Some(record) = record {
                master.insert(code.clone(), record);
            }
        }
        info!(requested = codes.len(), found = master.len(), "Master data lookup");
        Ok(master)
    }

    /// Insert or replace the record for `code`. Clears any correction flag.
    pub fn upsert(&self, code: &str, record: &ProductRecord) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO products
                (code, unit_weight, carton_weight, units_per_carton, unit_of_measure, needs_correction)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT(code) DO UPDATE SET
                unit_weight = excluded.unit_weight,
                carton_weight = excluded.carton_weight,
                units_per_carton = excluded.units_per_carton,
                unit_of_measure = excluded.unit_of_measure,
                needs_correction = 0,
                updated_at = CURRENT_TIMESTAMP",
            params![
                code,
                record.unit_weight,
                record.carton_weight,
                record.units_per_carton,
                record.unit_of_measure,
            ],
        )?;
        info!(code = %code, uom = %record.unit_of_measure, "Product stored");
        Ok(())
    }

    /// Mark records that need manual correction. Returns how many rows matched.
    pub fn flag_for_correction(&self, codes: &BTreeSet<String>) -> SqliteResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE products SET needs_correction = 1 WHERE code = ?1")?;
        let mut flagged = 0;
        for code in codes {
            flagged += stmt.execute(params![code])?;
        }
        if flagged > 0 {
            warn!(flagged, codes = ?codes, "Products flagged for correction");
        }
        Ok(flagged)
    }

    pub fn list_products(&self) -> SqliteResult<Vec<StoredProduct>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, unit_weight, carton_weight, units_per_carton, unit_of_measure, needs_correction, updated_at
             FROM products
             ORDER BY code",
        )?;
        let rows = stmt.query_map([], Self::row_to_product)?;
        rows.collect()
    }

    pub fn flagged_products(&self) -> SqliteResult<Vec<StoredProduct>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, unit_weight, carton_weight, units_per_carton, unit_of_measure, needs_correction, updated_at
             FROM products
             WHERE needs_correction = 1
             ORDER BY code",
        )?;
        let rows = stmt.query_map([], Self::row_to_product)?;
        rows.collect()
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRecord> {
        Ok(ProductRecord {
            unit_weight: row.get(0)?,
            carton_weight: row.get(1)?,
            units_per_carton: row.get(2)?,
            unit_of_measure: row.get(3)?,
        })
    }

    /// Helper: map the 7-column product projection to `StoredProduct`.
    fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredProduct> {
        Ok(StoredProduct {
            code: row.get(0)?,
            record: ProductRecord {
                unit_weight: row.get(1)?,
                carton_weight: row.get(2)?,
                units_per_carton: row.get(3)?,
                unit_of_measure: row.get(4)?,
            },
            needs_correction: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Replace the cached payload for `key`.
    pub fn save_session(&self, key: &str, payload: &str) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (session_key, payload)
             VALUES (?1, ?2)
             ON CONFLICT(session_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = CURRENT_TIMESTAMP",
            params![key, payload],
        )?;
        info!(session = %key, bytes = payload.len(), "Session cached");
        Ok(())
    }

    pub fn load_session(&self, key: &str) -> SqliteResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT payload FROM sessions WHERE session_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    /// Drop the cached payload. Returns whether a session existed.
    pub fn clear_session(&self, key: &str) -> SqliteResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM sessions WHERE session_key = ?1", params![key])?;
        info!(session = %key, removed, "Session cleared");
        Ok(removed > 0)
    }

    /// (products, flagged products, cached sessions)
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let products: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;

        let flagged: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE needs_correction = 1",
            [],
            |row| row.get(0),
        )?;

        let sessions: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        Ok((products, flagged, sessions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(units_per_carton: u32) -> ProductRecord {
        ProductRecord {
            unit_weight: 0.25,
            carton_weight: 12.0,
            units_per_carton,
            unit_of_measure: "KG".into(),
        }
    }

    fn codes(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn lookup_omits_absent_codes() {
        let store = SliStore::in_memory().unwrap();
        store.upsert("ABC-1", &record(24)).unwrap();

        let master = store.lookup(&codes(&["ABC-1", "NOPE"])).unwrap();
        assert_eq!(master.len(), 1);
        assert_eq!(master.get("ABC-1"), Some(&record(24)));
        assert!(!master.contains("NOPE"));
    }

    #[test]
    fn upsert_is_idempotent_and_clears_flag() {
        let store = SliStore::in_memory().unwrap();
        store.upsert("ABC-1", &record(0)).unwrap();
        assert_eq!(store.flag_for_correction(&codes(&["ABC-1", "NOPE"])).unwrap(), 1);
        assert_eq!(store.flagged_products().unwrap().len(), 1);

        store.upsert("ABC-1", &record(24)).unwrap();
        store.upsert("ABC-1", &record(24)).unwrap();

        let all = store.list_products().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.units_per_carton, 24);
        assert!(!all[0].needs_correction);
        assert!(store.flagged_products().unwrap().is_empty());
    }

    #[test]
    fn session_cache_overwrites_and_clears() {
        let store = SliStore::in_memory().unwrap();
        assert_eq!(store.load_session("k").unwrap(), None);

        store.save_session("k", "[1]").unwrap();
        store.save_session("k", "[2]").unwrap();
        assert_eq!(store.load_session("k").unwrap().as_deref(), Some("[2]"));
        assert_eq!(store.get_counts().unwrap(), (0, 0, 1));

        assert!(store.clear_session("k").unwrap());
        assert!(!store.clear_session("k").unwrap());
        assert_eq!(store.load_session("k").unwrap(), None);
    }
}
