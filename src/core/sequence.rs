//! In-memory block list of the shift being built: the completed blocks plus
//! the one open "current" block.

use crate::core::calculator::gaps::has_discontinuity;
use crate::core::calculator::totals;
use crate::errors::{AppError, AppResult};
use crate::models::shift::{NewBlock, StoredBlock};
use crate::models::time_block::{BlockId, BlockMarker, TimeBlock};
use crate::utils::time::{
    MAX_BLOCK_MINUTES, add_minutes, elapsed_minutes, is_duration_valid, offset_from,
};
use chrono::NaiveTime;

/// Length of a break inserted with `insert_break`.
pub const BREAK_MINUTES: i64 = 15;

/// Offsets beyond this many minutes are read as "earlier", not "later".
const HALF_DAY: i64 = 12 * 60;

/// Exact copy of the list state, used for cancel and undo.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSnapshot {
    pub completed: Vec<TimeBlock>,
    pub current: Option<TimeBlock>,
}

/// Result of undoing an append after its save failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// The block went back into the current block.
    Restored,
    /// Other work was recorded after it; it stays and is retried on clock out.
    KeptUnsaved,
    /// The block no longer exists locally.
    Missing,
}

/// Shared duration rule for new, edited and fill blocks.
pub fn validate_span(start: Option<NaiveTime>, end: Option<NaiveTime>) -> AppResult<()> {
    let start = start.ok_or_else(|| AppError::Validation("Please select a start time.".into()))?;
    let end = end.ok_or_else(|| AppError::Validation("Please select an end time.".into()))?;

    if start == end {
        return Err(AppError::Validation(
            "Start and end time cannot be the same.".into(),
        ));
    }

    if is_duration_valid(start, end) {
        return Ok(());
    }
    if elapsed_minutes(start, end) > MAX_BLOCK_MINUTES {
        return Err(AppError::Validation(
            "A time block cannot be longer than 2 hours.".into(),
        ));
    }
    Err(AppError::Validation(
        "A time block must be at least 15 minutes long.".into(),
    ))
}

pub fn validate_tasks(tasks: &str, is_break: bool) -> AppResult<()> {
    if !is_break && tasks.trim().is_empty() {
        return Err(AppError::Validation(
            "Please describe at least one task.".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSequence {
    completed: Vec<TimeBlock>,
    current: Option<TimeBlock>,
    next_id: BlockId,
}

impl Default for BlockSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockSequence {
    pub fn new() -> Self {
        Self {
            completed: Vec::new(),
            current: None,
            next_id: 1,
        }
    }

    /// Build a list from blocks the store already holds; store ids become local ids.
    pub fn rehydrate(stored: &[StoredBlock]) -> Self {
        let completed: Vec<TimeBlock> = stored
            .iter()
            .map(|b| TimeBlock {
                id: b.id as BlockId,
                server_id: Some(b.id),
                start: Some(b.start),
                end: Some(b.end),
                tasks: b.tasks.clone(),
                is_break: b.is_break,
                marker: BlockMarker::Real,
            })
            .collect();

        let next_id = completed.iter().map(|b| b.id).max().unwrap_or(0) + 1;
        let mut seq = Self {
            completed,
            current: None,
            next_id,
        };
        let start = seq.frontier();
        let id = seq.alloc_id();
        seq.current = Some(TimeBlock::open(id, start));
        seq
    }

    pub fn alloc_id(&mut self) -> BlockId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn completed(&self) -> &[TimeBlock] {
        &self.completed
    }

    pub(crate) fn completed_mut(&mut self) -> &mut Vec<TimeBlock> {
        &mut self.completed
    }

    pub fn current(&self) -> Option<&TimeBlock> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.current.as_ref().is_none_or(|c| !c.has_content())
    }

    pub fn index_of(&self, id: BlockId) -> Option<usize> {
        self.completed.iter().position(|b| b.id == id)
    }

    /// End of the last block that occupies time.
    pub fn frontier(&self) -> Option<NaiveTime> {
        self.completed
            .iter()
            .rev()
            .find(|b| b.occupies_time())
            .and_then(|b| b.end)
    }

    pub fn first_start(&self) -> Option<NaiveTime> {
        self.completed
            .iter()
            .find(|b| b.occupies_time())
            .and_then(|b| b.start)
    }

    /// Open the first current block of the shift.
    pub fn clock_in(&mut self, start: NaiveTime) -> AppResult<()> {
        if !self.completed.is_empty() {
            return Err(AppError::StateConflict(
                "The shift is already running.".into(),
            ));
        }
        self.current_or_open().start = Some(start);
        Ok(())
    }

    fn current_or_open(&mut self) -> &mut TimeBlock {
        let start = self.frontier();
        let next_id = self.next_id;
        let cur = self
            .current
            .get_or_insert_with(|| TimeBlock::open(next_id, start));
        if cur.id == next_id {
            self.next_id += 1;
        }
        cur
    }

    pub fn set_current_start(&mut self, start: NaiveTime) -> AppResult<()> {
        if let Some(last_end) = self.frontier() {
            let behind = offset_from(start, last_end);
            if behind > 0 && behind <= HALF_DAY {
                return Err(AppError::Validation(
                    "Start cannot be earlier than the end of the previous block.".into(),
                ));
            }
        }
        let cur = self.current_or_open();
        cur.start = Some(start);
        if let Some(end) = cur.end
            && end == start
        {
            cur.end = None;
        }
        Ok(())
    }

    pub fn set_current_end(&mut self, end: NaiveTime) -> AppResult<()> {
        let cur = self.current_or_open();
        validate_span(cur.start, Some(end))?;
        cur.end = Some(end);
        Ok(())
    }

    pub fn add_current_task(&mut self, entry: &str) {
        self.current_or_open().push_task(entry);
    }

    /// Move the current block into the completed list and open the next one
    /// where it ended. Returns the id of the completed block.
    pub fn append_current_as_completed(&mut self) -> AppResult<BlockId> {
        let Some(cur) = self.current.as_ref() else {
            return Err(AppError::Validation("Please select a start time.".into()));
        };
        validate_span(cur.start, cur.end)?;
        validate_tasks(&cur.tasks, cur.is_break)?;

        let Some(mut done) = self.current.take() else {
            return Err(AppError::Validation("Please select a start time.".into()));
        };
        done.server_id = None;
        let done_id = done.id;
        let next_start = done.end;
        self.completed.push(done);

        let id = self.alloc_id();
        self.current = Some(TimeBlock::open(id, next_start));
        Ok(done_id)
    }

    /// Record a 15 minute break and push any partially entered current block
    /// to start right after it.
    pub fn insert_break(&mut self) -> AppResult<BlockId> {
        let prev_end = self.frontier();
        let cur_start = self.current.as_ref().and_then(|c| c.start);

        let start = match (prev_end, cur_start) {
            (Some(p), Some(c)) if offset_from(p, c) <= HALF_DAY => c,
            (Some(p), _) => p,
            (None, Some(c)) => c,
            (None, None) => {
                return Err(AppError::Validation("Please select a start time.".into()));
            }
        };
        let end = add_minutes(start, BREAK_MINUTES);

        let id = self.alloc_id();
        self.completed.push(TimeBlock::break_block(id, start, end));

        let cur = self.current_or_open();
        let kept_minutes = match (cur.start, cur.end) {
            (Some(s), Some(e)) => Some(elapsed_minutes(s, e)),
            _ => None,
        };
        cur.start = Some(end);
        cur.end = kept_minutes.map(|m| add_minutes(end, m));

        Ok(id)
    }

    /// Hours of real completed blocks plus a fully specified current block.
    pub fn total_hours(&self) -> f64 {
        totals::total_hours(&self.completed, self.current.as_ref())
    }

    pub fn has_unfilled_gaps(&self) -> bool {
        if has_discontinuity(&self.completed) {
            return true;
        }
        match (self.frontier(), self.current.as_ref().and_then(|c| c.start)) {
            (Some(end), Some(start)) => end != start,
            _ => false,
        }
    }

    /// Keep the current block attached to the end of the completed list.
    pub(crate) fn realign_current(&mut self, fallback: Option<NaiveTime>) {
        let start = self.frontier().or(fallback);
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        if cur.start == start {
            return;
        }
        let kept_minutes = match (cur.start, cur.end) {
            (Some(s), Some(e)) => Some(elapsed_minutes(s, e)),
            _ => None,
        };
        cur.start = start;
        cur.end = match (start, kept_minutes) {
            (Some(s), Some(m)) => Some(add_minutes(s, m)),
            _ => None,
        };
    }

    /// Record the store id of a saved block. No-op if the block is gone.
    pub fn annotate_server_id(&mut self, id: BlockId, server_id: i64) -> bool {
        match self.completed.iter_mut().find(|b| b.id == id) {
            Some(b) => {
                b.server_id = Some(server_id);
                true
            }
            None => false,
        }
    }

    /// Undo the append of block `id` after its save failed.
    pub fn rollback_append(&mut self, id: BlockId) -> Rollback {
        let Some(idx) = self.index_of(id) else {
            return Rollback::Missing;
        };

        let is_last = idx + 1 == self.completed.len();
        let current_untouched = self
            .current
            .as_ref()
            .is_none_or(|c| c.tasks.trim().is_empty() && c.end.is_none());

        if !(is_last && current_untouched) {
            return Rollback::KeptUnsaved;
        }

        let mut block = self.completed.remove(idx);
        block.server_id = None;
        self.current = Some(block);
        Rollback::Restored
    }

    /// Completed blocks the store has not acknowledged yet.
    pub fn unsaved_blocks(&self) -> Vec<(BlockId, NewBlock)> {
        self.completed
            .iter()
            .filter(|b| b.is_real() && b.server_id.is_none())
            .filter_map(|b| b.to_new_block().map(|nb| (b.id, nb)))
            .collect()
    }

    /// Store payloads of every real completed block, in list order.
    pub fn payloads(&self) -> Vec<(BlockId, NewBlock)> {
        self.completed
            .iter()
            .filter(|b| b.is_real())
            .filter_map(|b| b.to_new_block().map(|nb| (b.id, nb)))
            .collect()
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            completed: self.completed.clone(),
            current: self.current.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: SequenceSnapshot) {
        self.completed = snapshot.completed;
        self.current = snapshot.current;
    }

    pub fn clear(&mut self) {
        self.completed.clear();
        self.current = None;
    }
}
