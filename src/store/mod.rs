//! Persistence collaborator of the engine.
//!
//! The engine only pushes to the store; it reads back from it at start-up to
//! recover an unfinished shift.

pub mod memory;
pub mod sqlite;

use crate::errors::StoreResult;
use crate::models::shift::{NewBlock, Shift};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

#[async_trait]
pub trait ShiftStore: Send + Sync {
    /// Create an in-progress shift. Returns its id.
    async fn open(&self, date: NaiveDate, start: NaiveTime) -> StoreResult<i64>;

    /// Persist one block at the end of the shift. Returns the block id.
    async fn append_block(&self, shift_id: i64, block: &NewBlock) -> StoreResult<i64>;

    /// Overwrite all blocks of an in-progress shift. Returns the new block ids in order.
    async fn replace_blocks(&self, shift_id: i64, blocks: &[NewBlock]) -> StoreResult<Vec<i64>>;

    /// Finalize the shift and submit it for approval.
    async fn close(
        &self,
        shift_id: i64,
        clock_in: NaiveTime,
        clock_out: NaiveTime,
        total_hours: f64,
    ) -> StoreResult<Shift>;

    /// Delete an in-progress shift and its blocks.
    async fn discard(&self, shift_id: i64) -> StoreResult<()>;

    async fn get_open_shift(&self) -> StoreResult<Option<Shift>>;

    async fn list_shifts(&self) -> StoreResult<Vec<Shift>>;
}

/// Largest difference tolerated between reported and stored hours.
pub const HOURS_TOLERANCE: f64 = 0.01;
