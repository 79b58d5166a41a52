//! Hour totals. Each block is rounded to the quarter hour on its own, the
//! running sum is kept as a float, and only the final sum is rounded again.

use crate::models::shift::StoredBlock;
use crate::models::time_block::TimeBlock;
use crate::utils::time::{duration_hours, round_quarter};

/// Total hours of the completed blocks plus the current block when it is
/// fully specified. Placeholders do not count.
pub fn total_hours(completed: &[TimeBlock], current: Option<&TimeBlock>) -> f64 {
    let mut total = 0.0;

    for b in completed.iter().filter(|b| b.is_real()) {
        total += b.hours();
    }

    if let Some(cur) = current.filter(|c| c.is_real() && c.is_complete()) {
        total += cur.hours();
    }

    round_quarter(total)
}

/// Same two-stage rounding applied to persisted blocks.
pub fn stored_total_hours(blocks: &[StoredBlock]) -> f64 {
    let total: f64 = blocks
        .iter()
        .filter_map(|b| duration_hours(Some(b.start), Some(b.end)))
        .sum();
    round_quarter(total)
}
