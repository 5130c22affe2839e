//! SQLite-backed tick store
//!
//! - Creates the `ticks` table on open
//! - WAL mode for file databases
//! - One transaction per batch with a cached prepared statement

use super::{PersistenceSink, SinkError};
use crate::core::{Symbol, Tick};
use crate::log_sink;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tracing::Level;

const SCHEMA_SQL: &str =
    "CREATE TABLE IF NOT EXISTS ticks (symbol VARCHAR(10), price DOUBLE, timestamp BIGINT)";

const FILE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
"#;

const INSERT_SQL: &str = "INSERT INTO ticks (symbol, price, timestamp) VALUES (?1, ?2, ?3)";

/// Tick sink writing to a SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) a database file and bootstrap the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // guarded by our own Mutex

        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(FILE_PRAGMAS)?;
        conn.execute_batch(SCHEMA_SQL)?;

        log_sink!(Level::INFO, path = %path.display(), "sqlite tick store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of persisted ticks
    pub fn count(&self) -> Result<u64, SinkError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ticks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All persisted ticks in insertion order
    pub fn load_all(&self) -> Result<Vec<Tick>, SinkError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT symbol, price, timestamp FROM ticks ORDER BY rowid")?;

        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            let symbol: Symbol = raw
                .parse()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
            Ok(Tick::new(symbol, row.get(1)?, row.get(2)?))
        })?;

        let ticks = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(ticks)
    }
}

impl PersistenceSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError> {
        if ticks.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for tick in ticks {
                stmt.execute(params![tick.symbol().as_str(), tick.price(), tick.timestamp()])?;
            }
        }
        tx.commit()?;

        log_sink!(Level::TRACE, rows = ticks.len(), "batch committed");
        Ok(())
    }
}
