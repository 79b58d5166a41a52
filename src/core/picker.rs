//! Selectable time values for block pickers.
//!
//! Ranges are enforced by only offering in-range choices; the engine runs the
//! same checks again before it mutates anything.

use crate::core::calculator::gaps::GapDescriptor;
use crate::core::sequence::validate_span;
use crate::errors::{AppError, AppResult};
use crate::models::time_block::TimeBlock;
use crate::utils::time::{
    MAX_BLOCK_MINUTES, MIN_BLOCK_MINUTES, add_minutes, format_time, offset_from,
};
use chrono::NaiveTime;

pub const STEP_MINUTES: i64 = 15;

const HALF_DAY: i64 = 12 * 60;

/// Times `from_off..=to_off` minutes after `anchor`, every 15 minutes.
fn grid(anchor: NaiveTime, from_off: i64, to_off: i64) -> Vec<NaiveTime> {
    let mut out = Vec::new();
    let mut off = from_off;
    while off <= to_off {
        out.push(add_minutes(anchor, off));
        off += STEP_MINUTES;
    }
    out
}

/// `t` lies before `limit` (within half a day).
fn is_before(t: NaiveTime, limit: NaiveTime) -> bool {
    let behind = offset_from(t, limit);
    behind > 0 && behind <= HALF_DAY
}

/// Limits for editing the block at a given list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditBounds {
    /// End of the nearest earlier block; `None` for the first block.
    pub earliest_start: Option<NaiveTime>,
    /// End of the last recorded block; `None` when editing the last one.
    pub latest_end: Option<NaiveTime>,
}

impl EditBounds {
    pub fn for_index(blocks: &[TimeBlock], index: usize) -> Self {
        let earliest_start = blocks
            .get(..index)
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|b| b.occupies_time())
            .and_then(|b| b.end);

        let latest_end = blocks
            .get(index + 1..)
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|b| b.occupies_time())
            .and_then(|b| b.end);

        Self {
            earliest_start,
            latest_end,
        }
    }

    pub fn check(&self, start: NaiveTime, end: NaiveTime) -> AppResult<()> {
        validate_span(Some(start), Some(end))?;

        if let Some(min) = self.earliest_start
            && is_before(start, min)
        {
            return Err(AppError::Validation(format!(
                "Start cannot be earlier than {}, the end of the previous block.",
                format_time(min)
            )));
        }

        if let Some(max) = self.latest_end
            && offset_from(start, end) > offset_from(start, max)
        {
            return Err(AppError::Validation(format!(
                "End cannot be later than {}, the end of the last block.",
                format_time(max)
            )));
        }
        Ok(())
    }

    pub fn start_choices(&self, end: NaiveTime) -> Vec<NaiveTime> {
        grid(end, -MAX_BLOCK_MINUTES, -MIN_BLOCK_MINUTES)
            .into_iter()
            .filter(|s| self.check(*s, end).is_ok())
            .collect()
    }

    pub fn end_choices(&self, start: NaiveTime) -> Vec<NaiveTime> {
        grid(start, MIN_BLOCK_MINUTES, MAX_BLOCK_MINUTES)
            .into_iter()
            .filter(|e| self.check(start, *e).is_ok())
            .collect()
    }
}

/// Ends a fill block may take; it always starts at the gap start.
pub fn fill_end_choices(gap: &GapDescriptor) -> Vec<NaiveTime> {
    let limit = gap.minutes().min(MAX_BLOCK_MINUTES);
    let mut out = grid(gap.start, MIN_BLOCK_MINUTES, limit);
    if gap.minutes() <= MAX_BLOCK_MINUTES
        && gap.minutes() >= MIN_BLOCK_MINUTES
        && !out.contains(&gap.end)
    {
        out.push(gap.end);
    }
    out
}

pub fn check_fill(gap: &GapDescriptor, end: NaiveTime) -> AppResult<()> {
    validate_span(Some(gap.start), Some(end))?;
    if offset_from(gap.start, end) > gap.minutes() {
        return Err(AppError::Validation(format!(
            "The block cannot go past {}, where the gap ends.",
            format_time(gap.end)
        )));
    }
    Ok(())
}

pub fn current_end_choices(start: NaiveTime) -> Vec<NaiveTime> {
    grid(start, MIN_BLOCK_MINUTES, MAX_BLOCK_MINUTES)
}
