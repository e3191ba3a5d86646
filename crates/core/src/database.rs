//! SQLite connection setup and schema migrations.

use std::path::Path;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::{CarePlanError, CarePlanResult};

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../migrations/001_initial.sql"))];

/// Open a SQLite connection to the given path and run migrations.
pub fn open_database(path: &Path) -> CarePlanResult<Connection> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    register_functions(&conn)?;
    run_migrations(&conn)?;
    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory_database() -> CarePlanResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    register_functions(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> CarePlanResult<()> {
    // Cascade and protect rules on orders depend on foreign keys being enforced.
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Registers `fold_case(text)`, Unicode lower-casing with [`str::to_lowercase`].
///
/// SQLite's built-in `lower()` folds ASCII only; repository queries compare `fold_case(col)`
/// against parameters folded in Rust.
fn register_functions(conn: &Connection) -> CarePlanResult<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> CarePlanResult<()> {
    let current_version = current_schema_version(conn);

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| CarePlanError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet).
pub fn current_schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })
    .ok()
    .flatten()
    .unwrap_or(0)
}
