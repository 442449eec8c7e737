use crate::infrastructure::error::EngineError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), EngineError> {
    let connection = Connection::open(path)?;
    // journal_mode reports the resulting mode as a row, so it cannot go
    // through execute_batch.
    connection.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
