//! SQLite-backed `ShiftStore`.

use super::{HOURS_TOLERANCE, ShiftStore};
use crate::core::calculator::totals::stored_total_hours;
use crate::db::initialize::init_db;
use crate::db::log;
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::{AppResult, StoreError, StoreResult};
use crate::models::shift::{NewBlock, Shift, ShiftStatus};
use crate::utils::time::{format_hours, format_time};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Mutex;

pub struct SqliteShiftStore {
    pool: Mutex<DbPool>,
}

impl SqliteShiftStore {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &str) -> AppResult<Self> {
        let pool = DbPool::new(path)?;
        init_db(&pool.conn)?;
        Ok(Self {
            pool: Mutex::new(pool),
        })
    }

    pub fn in_memory() -> AppResult<Self> {
        let pool = DbPool::in_memory()?;
        init_db(&pool.conn)?;
        Ok(Self {
            pool: Mutex::new(pool),
        })
    }

    fn with_pool<T>(&self, func: impl FnOnce(&mut DbPool) -> StoreResult<T>) -> StoreResult<T> {
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| StoreError::Network("database lock poisoned".into()))?;
        func(&mut pool)
    }
}

/// Audit log writes never fail the operation they describe.
fn audit(pool: &DbPool, operation: &str, target: &str, message: &str) {
    if let Err(e) = log::audit(&pool.conn, operation, target, message) {
        crate::ui::messages::warning(format!("Failed to write internal log: {}", e));
    }
}

fn require_in_progress(pool: &DbPool, shift_id: i64) -> StoreResult<()> {
    match queries::shift_status(&pool.conn, shift_id)? {
        Some(ShiftStatus::InProgress) => Ok(()),
        _ => Err(StoreError::NotFound(shift_id)),
    }
}

#[async_trait]
impl ShiftStore for SqliteShiftStore {
    async fn open(&self, date: NaiveDate, start: NaiveTime) -> StoreResult<i64> {
        self.with_pool(|pool| {
            let id = queries::insert_shift(&pool.conn, &date)?;
            audit(
                pool,
                "open",
                &format!("shift {}", id),
                &format!("Shift opened on {} at {}", date, format_time(start)),
            );
            Ok(id)
        })
    }

    async fn append_block(&self, shift_id: i64, block: &NewBlock) -> StoreResult<i64> {
        self.with_pool(|pool| {
            require_in_progress(pool, shift_id)?;
            let id = queries::insert_block(&pool.conn, shift_id, block)?;
            audit(
                pool,
                "append",
                &format!("shift {}", shift_id),
                &format!(
                    "Block {}-{} saved{}",
                    format_time(block.start),
                    format_time(block.end),
                    if block.is_break { " (break)" } else { "" }
                ),
            );
            Ok(id)
        })
    }

    async fn replace_blocks(&self, shift_id: i64, blocks: &[NewBlock]) -> StoreResult<Vec<i64>> {
        self.with_pool(|pool| {
            require_in_progress(pool, shift_id)?;

            let tx = pool.conn.transaction()?;
            queries::delete_blocks(&tx, shift_id)?;
            let mut ids = Vec::with_capacity(blocks.len());
            for b in blocks {
                ids.push(queries::insert_block(&tx, shift_id, b)?);
            }
            tx.commit()?;

            audit(
                pool,
                "replace",
                &format!("shift {}", shift_id),
                &format!("Block list replaced ({} blocks)", blocks.len()),
            );
            Ok(ids)
        })
    }

    async fn close(
        &self,
        shift_id: i64,
        clock_in: NaiveTime,
        clock_out: NaiveTime,
        total_hours: f64,
    ) -> StoreResult<Shift> {
        self.with_pool(|pool| {
            require_in_progress(pool, shift_id)?;

            let blocks = queries::load_blocks(&pool.conn, shift_id)?;
            let stored = stored_total_hours(&blocks);
            if (stored - total_hours).abs() > HOURS_TOLERANCE {
                return Err(StoreError::Validation(format!(
                    "Reported {} h but the saved blocks add up to {} h",
                    format_hours(total_hours),
                    format_hours(stored)
                )));
            }

            queries::close_shift(&pool.conn, shift_id, clock_in, clock_out, total_hours)?;
            audit(
                pool,
                "close",
                &format!("shift {}", shift_id),
                &format!(
                    "Shift closed {}-{} ({} h), pending approval",
                    format_time(clock_in),
                    format_time(clock_out),
                    format_hours(total_hours)
                ),
            );

            queries::load_shift(&pool.conn, shift_id)?.ok_or(StoreError::NotFound(shift_id))
        })
    }

    async fn discard(&self, shift_id: i64) -> StoreResult<()> {
        self.with_pool(|pool| {
            require_in_progress(pool, shift_id)?;
            queries::delete_shift(&pool.conn, shift_id)?;
            audit(
                pool,
                "discard",
                &format!("shift {}", shift_id),
                "In-progress shift discarded",
            );
            Ok(())
        })
    }

    async fn get_open_shift(&self) -> StoreResult<Option<Shift>> {
        self.with_pool(|pool| match queries::latest_open_shift_id(&pool.conn)? {
            Some(id) => Ok(queries::load_shift(&pool.conn, id)?),
            None => Ok(None),
        })
    }

    async fn list_shifts(&self) -> StoreResult<Vec<Shift>> {
        self.with_pool(|pool| Ok(queries::list_shifts(&pool.conn)?))
    }
}
