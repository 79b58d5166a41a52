use crate::utils::time::{MINUTES_PER_DAY, minute_of_day, offset_from};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    InProgress,
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl ShiftStatus {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ShiftStatus::InProgress => "in_progress",
            ShiftStatus::Pending => "pending",
            ShiftStatus::Approved => "approved",
            ShiftStatus::Rejected => "rejected",
            ShiftStatus::Paid => "paid",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(ShiftStatus::InProgress),
            "pending" => Some(ShiftStatus::Pending),
            "approved" => Some(ShiftStatus::Approved),
            "rejected" => Some(ShiftStatus::Rejected),
            "paid" => Some(ShiftStatus::Paid),
            _ => None,
        }
    }
}

/// Block payload sent to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBlock {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub tasks: String,
    pub is_break: bool,
}

/// Block as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredBlock {
    pub id: i64,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub tasks: String,
    pub is_break: bool,
}

impl StoredBlock {
    pub fn from_new(id: i64, b: &NewBlock) -> Self {
        Self {
            id,
            start: b.start,
            end: b.end,
            tasks: b.tasks.clone(),
            is_break: b.is_break,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shift {
    pub id: i64,
    pub date: NaiveDate,
    pub clock_in: Option<NaiveTime>,
    pub clock_out: Option<NaiveTime>,
    pub total_hours: Option<f64>,
    pub blocks: Vec<StoredBlock>,
    pub status: ShiftStatus,
}

impl Shift {
    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Stored blocks in time order.
    ///
    /// Stored position follows the order saves completed, which can differ
    /// from the order the blocks were worked. The dial starts at the block
    /// that follows the longest stretch with no block start, so a shift
    /// running past midnight keeps its evening blocks first.
    pub fn chronological_blocks(&self) -> Vec<StoredBlock> {
        let mut blocks = self.blocks.clone();
        blocks.sort_by_key(|b| minute_of_day(b.start));
        let n = blocks.len();
        let anchor = (0..n)
            .max_by_key(|&i| match offset_from(blocks[i].start, blocks[(i + 1) % n].start) {
                0 if n == 1 => MINUTES_PER_DAY,
                o => o,
            })
            .map(|i| blocks[(i + 1) % n].start);
        if let Some(anchor) = anchor {
            blocks.sort_by_key(|b| offset_from(anchor, b.start));
        }
        blocks
    }

    /// First block start and last block end, in time order.
    pub fn block_bounds(&self) -> Option<(NaiveTime, NaiveTime)> {
        let blocks = self.chronological_blocks();
        let first = blocks.first()?;
        let last = blocks.last()?;
        Some((first.start, last.end))
    }
}
