use crate::errors::AppError;
use crate::models::shift::{NewBlock, Shift, ShiftStatus, StoredBlock};
use chrono::{Local, NaiveDate, NaiveTime};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

fn conversion_error(err: AppError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_db_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| conversion_error(AppError::InvalidTime(s.to_string())))
}

fn parse_opt_db_time(s: Option<String>) -> Result<Option<NaiveTime>> {
    s.map(|v| parse_db_time(&v)).transpose()
}

fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

pub fn map_block_row(row: &Row) -> Result<StoredBlock> {
    let start_str: String = row.get("start_time")?;
    let end_str: String = row.get("end_time")?;

    Ok(StoredBlock {
        id: row.get("id")?,
        start: parse_db_time(&start_str)?,
        end: parse_db_time(&end_str)?,
        tasks: row.get("tasks")?,
        is_break: row.get::<_, i32>("is_break")? == 1,
    })
}

/// Map a `shifts` row; blocks are loaded separately.
pub fn map_shift_row(row: &Row) -> Result<Shift> {
    let date_str: String = row.get("date")?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| conversion_error(AppError::InvalidDate(date_str.clone())))?;

    let status_str: String = row.get("status")?;
    let status = ShiftStatus::from_db_str(&status_str).ok_or_else(|| {
        conversion_error(AppError::Other(format!("Invalid shift status: {}", status_str)))
    })?;

    Ok(Shift {
        id: row.get("id")?,
        date,
        clock_in: parse_opt_db_time(row.get("clock_in")?)?,
        clock_out: parse_opt_db_time(row.get("clock_out")?)?,
        total_hours: row.get("total_hours")?,
        blocks: Vec::new(),
        status,
    })
}

pub fn insert_shift(conn: &Connection, date: &NaiveDate) -> Result<i64> {
    conn.execute(
        "INSERT INTO shifts (date, status, created_at) VALUES (?1, ?2, ?3)",
        params![
            date.format("%Y-%m-%d").to_string(),
            ShiftStatus::InProgress.to_db_str(),
            Local::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn shift_status(conn: &Connection, shift_id: i64) -> Result<Option<ShiftStatus>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM shifts WHERE id = ?1",
            [shift_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| ShiftStatus::from_db_str(&s)))
}

pub fn insert_block(conn: &Connection, shift_id: i64, block: &NewBlock) -> Result<i64> {
    let position: i64 = conn.query_row(
        "SELECT IFNULL(MAX(position), 0) + 1 FROM time_blocks WHERE shift_id = ?1",
        [shift_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO time_blocks (shift_id, position, start_time, end_time, tasks, is_break)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            shift_id,
            position,
            fmt_time(block.start),
            fmt_time(block.end),
            block.tasks,
            if block.is_break { 1 } else { 0 },
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_blocks(conn: &Connection, shift_id: i64) -> Result<usize> {
    conn.execute("DELETE FROM time_blocks WHERE shift_id = ?1", [shift_id])
}

pub fn load_blocks(conn: &Connection, shift_id: i64) -> Result<Vec<StoredBlock>> {
    let mut stmt = conn.prepare(
        "SELECT id, start_time, end_time, tasks, is_break FROM time_blocks
         WHERE shift_id = ?1
         ORDER BY position ASC",
    )?;

    let rows = stmt.query_map([shift_id], map_block_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn load_shift(conn: &Connection, shift_id: i64) -> Result<Option<Shift>> {
    let shift = conn
        .query_row(
            "SELECT * FROM shifts WHERE id = ?1",
            [shift_id],
            map_shift_row,
        )
        .optional()?;

    match shift {
        Some(mut s) => {
            s.blocks = load_blocks(conn, s.id)?;
            Ok(Some(s))
        }
        None => Ok(None),
    }
}

pub fn latest_open_shift_id(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM shifts WHERE status = ?1 ORDER BY id DESC LIMIT 1",
        [ShiftStatus::InProgress.to_db_str()],
        |row| row.get(0),
    )
    .optional()
}

pub fn close_shift(
    conn: &Connection,
    shift_id: i64,
    clock_in: NaiveTime,
    clock_out: NaiveTime,
    total_hours: f64,
) -> Result<usize> {
    conn.execute(
        "UPDATE shifts
         SET clock_in = ?1, clock_out = ?2, total_hours = ?3, status = ?4
         WHERE id = ?5",
        params![
            fmt_time(clock_in),
            fmt_time(clock_out),
            total_hours,
            ShiftStatus::Pending.to_db_str(),
            shift_id,
        ],
    )
}

pub fn delete_shift(conn: &Connection, shift_id: i64) -> Result<usize> {
    delete_blocks(conn, shift_id)?;
    conn.execute("DELETE FROM shifts WHERE id = ?1", [shift_id])
}

pub fn list_shifts(conn: &Connection) -> Result<Vec<Shift>> {
    let mut stmt = conn.prepare("SELECT * FROM shifts ORDER BY date ASC, id ASC")?;
    let rows = stmt.query_map([], map_shift_row)?;

    let mut out = Vec::new();
    for r in rows {
        let mut s = r?;
        s.blocks = load_blocks(conn, s.id)?;
        out.push(s);
    }
    Ok(out)
}
