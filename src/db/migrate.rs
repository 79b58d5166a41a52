use crate::ui::messages::success;
use rusqlite::{Connection, OptionalExtension, Result};

/// Ensure that the `log` table exists. It also records applied migrations.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn migration_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

fn mark_applied(conn: &Connection, version: &str, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [version, message],
    )?;
    Ok(())
}

/// Create the `shifts` and `time_blocks` tables.
fn create_shift_tables(conn: &Connection) -> Result<()> {
    let version = "20250301_0001_create_shift_tables";
    if migration_applied(conn, version)? {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS shifts (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            date         TEXT NOT NULL,
            clock_in     TEXT,
            clock_out    TEXT,
            total_hours  REAL,
            status       TEXT NOT NULL DEFAULT 'in_progress'
                         CHECK(status IN ('in_progress','pending','approved','rejected','paid')),
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS time_blocks (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            shift_id     INTEGER NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
            position     INTEGER NOT NULL,
            start_time   TEXT NOT NULL,
            end_time     TEXT NOT NULL,
            tasks        TEXT NOT NULL DEFAULT '',
            is_break     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_shifts_status ON shifts(status);
        CREATE INDEX IF NOT EXISTS idx_blocks_shift_pos ON time_blocks(shift_id, position);
        "#,
    )?;

    mark_applied(conn, version, "Created shifts and time_blocks tables")?;
    success(format!("Migration applied: {}", version));
    Ok(())
}

/// Public entry point: run all pending migrations.
///
/// Invoked by db::initialize::init_db() and by the SQLite store on open.
pub fn run_pending_migrations(conn: &Connection) -> Result<()> {
    ensure_log_table(conn)?;
    create_shift_tables(conn)?;
    Ok(())
}
