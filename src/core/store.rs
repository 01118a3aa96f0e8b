//! SQLite-backed traceability store
//!
//! The store owns one connection. Nothing holds a transaction across calls:
//! every unit of work runs inside [`Store::write`] or [`Store::read`], which
//! open a transaction, run the closure and commit. An error from the closure
//! drops the transaction, which rolls it back, so half-written records are
//! never visible.
//!
//! - Writes take SQLite's writer lock up front (`BEGIN IMMEDIATE`), which
//!   serializes check-then-insert sequences across connections.
//! - Reads run in a deferred transaction, so every query inside one read sees
//!   the same snapshot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::error::TraceError;

/// Current schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Default wait for a competing writer before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS units (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        unit_type TEXT NOT NULL,
        manufacturer TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'produced',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS equipment (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        location TEXT
    );

    CREATE TABLE IF NOT EXISTS identities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        unit_id INTEGER NOT NULL UNIQUE REFERENCES units(id),
        token TEXT NOT NULL UNIQUE,
        integrity_hash TEXT NOT NULL,
        location TEXT NOT NULL,
        status TEXT NOT NULL,
        created_by INTEGER REFERENCES users(id),
        created_at TEXT NOT NULL,
        last_updated TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS production_steps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        unit_id INTEGER NOT NULL REFERENCES units(id),
        process_step TEXT NOT NULL,
        equipment_id INTEGER REFERENCES equipment(id),
        operator_id INTEGER REFERENCES users(id),
        start_time TEXT NOT NULL,
        end_time TEXT,
        parameters TEXT NOT NULL DEFAULT '{}',
        notes TEXT,
        status TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_steps_unit_order
        ON production_steps(unit_id, start_time, id);

    CREATE TABLE IF NOT EXISTS quality_decisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        unit_id INTEGER NOT NULL REFERENCES units(id),
        inspector_id INTEGER NOT NULL REFERENCES users(id),
        check_type TEXT NOT NULL,
        check_items TEXT NOT NULL,
        pass_status INTEGER NOT NULL,
        comments TEXT,
        evidence TEXT NOT NULL DEFAULT '[]',
        checked_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_decisions_unit_order
        ON quality_decisions(unit_id, checked_at, id);

    -- History is append-only
    CREATE TRIGGER IF NOT EXISTS production_steps_no_delete
        BEFORE DELETE ON production_steps
        BEGIN SELECT RAISE(ABORT, 'production steps are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS production_steps_fixed_fields
        BEFORE UPDATE OF unit_id, process_step, equipment_id, operator_id, start_time, parameters
        ON production_steps
        BEGIN SELECT RAISE(ABORT, 'recorded production step fields are immutable'); END;

    CREATE TRIGGER IF NOT EXISTS production_steps_end_time_fixed
        BEFORE UPDATE OF end_time ON production_steps
        WHEN OLD.end_time IS NOT NULL
            AND (NEW.end_time IS NULL OR NEW.end_time <> OLD.end_time)
        BEGIN SELECT RAISE(ABORT, 'recorded end time is immutable'); END;

    CREATE TRIGGER IF NOT EXISTS production_steps_final
        BEFORE UPDATE ON production_steps
        WHEN OLD.status IN ('completed', 'failed')
        BEGIN SELECT RAISE(ABORT, 'finalized production step is immutable'); END;

    CREATE TRIGGER IF NOT EXISTS quality_decisions_no_delete
        BEFORE DELETE ON quality_decisions
        BEGIN SELECT RAISE(ABORT, 'quality decisions are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS quality_decisions_fixed_fields
        BEFORE UPDATE OF unit_id, inspector_id, check_type, check_items, pass_status, checked_at
        ON quality_decisions
        BEGIN SELECT RAISE(ABORT, 'recorded quality decision fields are immutable'); END;

    CREATE TRIGGER IF NOT EXISTS identities_fixed_token
        BEFORE UPDATE OF unit_id, token, integrity_hash ON identities
        BEGIN SELECT RAISE(ABORT, 'identity tokens are immutable'); END;
"#;

/// The traceability store backed by SQLite
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create a store at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, TraceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        // WAL lets readers keep their snapshot while a writer commits
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let mut store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a private in-memory store (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, TraceError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn, path: None };
        store.init_schema()?;
        Ok(store)
    }

    /// Database file backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&mut self) -> Result<(), TraceError> {
        // Must be set outside a transaction to take effect
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA)?;

        let current: Option<i32> =
            tx.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;

        match current {
            None => {
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )?;
            }
            Some(v) if v < SCHEMA_VERSION => {
                // No migrations yet beyond v1; the CREATE IF NOT EXISTS batch
                // above brings older files forward.
                tx.execute("UPDATE schema_version SET version = ?1", [SCHEMA_VERSION])?;
            }
            Some(_) => {}
        }
        tx.commit()?;
        Ok(())
    }

    /// Run `f` inside an immediate (writer-locked) transaction
    ///
    /// Commits when `f` succeeds; rolls back when it fails.
    pub fn write<T, F>(&mut self, f: F) -> Result<T, TraceError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, TraceError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside a deferred read transaction (one consistent snapshot)
    pub fn read<T, F>(&mut self, f: F) -> Result<T, TraceError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, TraceError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Direct access for ad-hoc queries outside the operation surface
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
