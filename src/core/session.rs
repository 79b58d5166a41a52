//! Edit / delete session for the shift being built.
//!
//! `Session` owns the block list and the edit state machine:
//!
//! - `Idle`: nothing in progress.
//! - `Editing`: a past block is open for editing; an editing placeholder keeps
//!   its slot so that no other block moves while the edit is open.
//! - `GapOpen`: a gap placeholder sits in the list waiting to be filled or
//!   undone.
//!
//! Every operation validates first and only then mutates; none of them do I/O.

use crate::core::calculator::gaps::{
    GapDescriptor, Reconciliation, gap_at, has_discontinuity, reconcile, refresh_gaps,
};
use crate::core::clock::Clock;
use crate::core::picker::{EditBounds, check_fill};
use crate::core::sequence::{BlockSequence, Rollback, SequenceSnapshot, validate_tasks};
use crate::errors::{AppError, AppResult};
use crate::models::shift::Shift;
use crate::models::time_block::{BlockId, BlockMarker, TimeBlock};
use crate::utils::time::round_to_quarter;
use chrono::NaiveTime;

#[derive(Debug, Clone, PartialEq)]
pub enum EditState {
    Idle,
    Editing {
        original_index: usize,
        original: TimeBlock,
    },
    GapOpen {
        gap: GapDescriptor,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    seq: BlockSequence,
    state: EditState,
    /// List as it was when the open gap was created.
    undo: Option<SequenceSnapshot>,
    /// Local edits the store has not seen yet.
    diverged: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            seq: BlockSequence::new(),
            state: EditState::Idle,
            undo: None,
            diverged: false,
        }
    }

    /// Continue a shift the store already holds. Blocks are taken in time
    /// order; if that differs from the stored order the session starts out
    /// diverged so clock-out rewrites the stored list.
    pub fn resume(shift: &Shift) -> Self {
        let blocks = shift.chronological_blocks();
        let mut session = Self {
            seq: BlockSequence::rehydrate(&blocks),
            state: EditState::Idle,
            undo: None,
            diverged: blocks != shift.blocks,
        };
        session.refresh_gap_state(None);
        session
    }

    // ---------------------------
    // Read accessors
    // ---------------------------

    pub fn sequence(&self) -> &BlockSequence {
        &self.seq
    }

    pub fn completed_blocks(&self) -> &[TimeBlock] {
        self.seq.completed()
    }

    pub fn current_block(&self) -> Option<&TimeBlock> {
        self.seq.current()
    }

    pub fn editing_state(&self) -> &EditState {
        &self.state
    }

    pub fn gap_descriptor(&self) -> Option<&GapDescriptor> {
        match &self.state {
            EditState::GapOpen { gap } => Some(gap),
            _ => None,
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.seq.total_hours()
    }

    pub fn has_unfilled_gaps(&self) -> bool {
        self.seq.has_unfilled_gaps()
    }

    /// Gaps between completed blocks only, ignoring the current block.
    pub fn has_gaps_in_completed(&self) -> bool {
        has_discontinuity(self.seq.completed())
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.state, EditState::GapOpen { .. }) && self.undo.is_some()
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, EditState::Editing { .. })
    }

    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    pub fn mark_synced(&mut self) {
        self.diverged = false;
    }

    /// The store's block order no longer matches the local list.
    pub fn mark_diverged(&mut self) {
        self.diverged = true;
    }

    /// Limits for the block currently being edited.
    pub fn edit_bounds(&self) -> Option<EditBounds> {
        let EditState::Editing { original, .. } = &self.state else {
            return None;
        };
        let idx = self.seq.index_of(original.id)?;
        Some(EditBounds::for_index(self.seq.completed(), idx))
    }

    // ---------------------------
    // Current block
    // ---------------------------

    /// Open the shift at the clock's time. Returns the chosen start.
    pub fn clock_in(&mut self, clock: &dyn Clock, round: bool) -> AppResult<NaiveTime> {
        let now = clock.now();
        let start = if round { round_to_quarter(now) } else { now };
        self.seq.clock_in(start)?;
        Ok(start)
    }

    pub fn set_current_start(&mut self, start: NaiveTime) -> AppResult<()> {
        self.seq.set_current_start(start)
    }

    pub fn set_current_end(&mut self, end: NaiveTime) -> AppResult<()> {
        self.seq.set_current_end(end)
    }

    pub fn add_task(&mut self, entry: &str) {
        self.seq.add_current_task(entry);
    }

    fn ensure_not_editing(&self) -> AppResult<()> {
        if self.is_editing() {
            return Err(AppError::StateConflict(
                "Save or cancel the block being edited first.".into(),
            ));
        }
        Ok(())
    }

    /// Complete the current block. Returns its local id for the auto-save.
    pub fn append_current(&mut self) -> AppResult<BlockId> {
        self.ensure_not_editing()?;
        let id = self.seq.append_current_as_completed()?;
        self.refresh_gap_state(None);
        Ok(id)
    }

    pub fn insert_break(&mut self) -> AppResult<BlockId> {
        self.ensure_not_editing()?;
        let id = self.seq.insert_break()?;
        self.refresh_gap_state(None);
        Ok(id)
    }

    // ---------------------------
    // Edit
    // ---------------------------

    /// Open the block at `index` for editing. Returns its pre-edit copy.
    pub fn begin_edit(&mut self, index: usize) -> AppResult<TimeBlock> {
        self.ensure_not_editing()?;

        let block = self
            .seq
            .completed()
            .get(index)
            .ok_or(AppError::InvalidBlock(index + 1))?;
        if !block.is_real() {
            return Err(AppError::Validation(
                "Only recorded blocks can be edited.".into(),
            ));
        }

        let original = block.clone();
        self.seq.completed_mut()[index] = original.editing_placeholder();
        self.state = EditState::Editing {
            original_index: index,
            original: original.clone(),
        };
        Ok(original)
    }

    /// Apply new times (and optionally new task text) to the block being edited.
    pub fn save_edit(
        &mut self,
        start: NaiveTime,
        end: NaiveTime,
        tasks: Option<&str>,
    ) -> AppResult<Reconciliation> {
        let EditState::Editing { original, .. } = &self.state else {
            return Err(AppError::StateConflict("No block is being edited.".into()));
        };
        let original = original.clone();
        let idx = self
            .seq
            .index_of(original.id)
            .ok_or_else(|| AppError::Other("editing placeholder missing".into()))?;

        EditBounds::for_index(self.seq.completed(), idx).check(start, end)?;

        let tasks = match tasks {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => original.tasks.clone(),
        };
        validate_tasks(&tasks, original.is_break)?;

        if self.undo.is_none() {
            let mut before = self.seq.snapshot();
            before.completed[idx] = original.clone();
            self.undo = Some(before);
        }

        self.seq.completed_mut().remove(idx);
        let edited = TimeBlock {
            start: Some(start),
            end: Some(end),
            tasks,
            marker: BlockMarker::Real,
            ..original
        };
        let gap_id = self.seq.alloc_id();
        let rec = reconcile(self.seq.completed_mut(), edited, idx, gap_id);
        self.seq.realign_current(None);
        self.diverged = true;

        self.refresh_gap_state(rec.gap.as_ref().map(|g| g.placeholder_id));
        Ok(rec)
    }

    /// Drop the edit and put the original block back in its slot.
    pub fn cancel_edit(&mut self) -> AppResult<()> {
        let EditState::Editing { original, .. } = &self.state else {
            return Err(AppError::StateConflict("No block is being edited.".into()));
        };
        let original = original.clone();
        let idx = self
            .seq
            .index_of(original.id)
            .ok_or_else(|| AppError::Other("editing placeholder missing".into()))?;

        self.seq.completed_mut()[idx] = original;
        self.refresh_gap_state(None);
        Ok(())
    }

    // ---------------------------
    // Delete
    // ---------------------------

    pub fn delete_block(&mut self, index: usize) -> AppResult<Option<GapDescriptor>> {
        match self.state {
            EditState::Idle => {}
            EditState::Editing { .. } => {
                return Err(AppError::StateConflict(
                    "Save or cancel the block being edited first.".into(),
                ));
            }
            EditState::GapOpen { .. } => {
                return Err(AppError::StateConflict(
                    "Fill or undo the open gap first.".into(),
                ));
            }
        }

        let block = self
            .seq
            .completed()
            .get(index)
            .ok_or(AppError::InvalidBlock(index + 1))?;
        if !block.is_real() {
            return Err(AppError::Validation(
                "Only recorded blocks can be deleted.".into(),
            ));
        }

        let before = self.seq.snapshot();
        let removed = self.seq.completed_mut().remove(index);
        self.diverged = true;

        let blocks = self.seq.completed();
        let pred_end = blocks[..index]
            .iter()
            .rev()
            .find(|b| b.occupies_time())
            .and_then(|b| b.end);
        let succ_start = blocks[index..]
            .iter()
            .find(|b| b.occupies_time())
            .and_then(|b| b.start);

        let mut preferred = None;
        match (pred_end, succ_start) {
            (Some(p), Some(n)) if p != n => {
                let gap_id = self.seq.alloc_id();
                self.seq
                    .completed_mut()
                    .insert(index, TimeBlock::gap_placeholder(gap_id, p, n));
                self.undo = Some(before);
                preferred = Some(gap_id);
            }
            (_, None) => self.seq.realign_current(removed.start),
            _ => {}
        }

        self.refresh_gap_state(preferred);
        Ok(self.gap_descriptor().cloned())
    }

    // ---------------------------
    // Gap
    // ---------------------------

    /// Insert a block from the gap start to `end`. A shorter block leaves the
    /// rest of the gap open.
    pub fn fill_gap(
        &mut self,
        end: NaiveTime,
        tasks: &str,
        is_break: bool,
    ) -> AppResult<Reconciliation> {
        let EditState::GapOpen { gap } = &self.state else {
            return Err(AppError::StateConflict("There is no open gap to fill.".into()));
        };
        let gap = gap.clone();

        check_fill(&gap, end)?;
        validate_tasks(tasks, is_break)?;

        let idx = self
            .seq
            .index_of(gap.placeholder_id)
            .unwrap_or(gap.gap_index);
        if self.seq.completed().get(idx).is_some_and(|b| b.is_gap()) {
            self.seq.completed_mut().remove(idx);
        }

        let id = self.seq.alloc_id();
        let block = if is_break {
            TimeBlock::break_block(id, gap.start, end)
        } else {
            TimeBlock::work(id, gap.start, end, tasks.trim())
        };
        let gap_id = self.seq.alloc_id();
        let rec = reconcile(self.seq.completed_mut(), block, idx, gap_id);
        self.diverged = true;

        self.refresh_gap_state(rec.gap.as_ref().map(|g| g.placeholder_id));
        Ok(rec)
    }

    /// Gap dialog dismissed without a fill: the gap stays open as it was.
    pub fn close_gap_modal(&mut self) -> Option<GapDescriptor> {
        let EditState::GapOpen { gap } = &self.state else {
            return None;
        };
        let fresh = gap_at(self.seq.completed(), gap.placeholder_id).unwrap_or_else(|| gap.clone());
        self.state = EditState::GapOpen { gap: fresh.clone() };
        Some(fresh)
    }

    /// Restore the list as it was before the open gap was created.
    pub fn undo(&mut self) -> AppResult<()> {
        if !matches!(self.state, EditState::GapOpen { .. }) {
            return Err(AppError::StateConflict("Nothing to undo.".into()));
        }
        let snapshot = self
            .undo
            .take()
            .ok_or_else(|| AppError::StateConflict("Nothing to undo.".into()))?;
        self.seq.restore(snapshot);
        self.refresh_gap_state(None);
        Ok(())
    }

    // ---------------------------
    // Save results
    // ---------------------------

    /// Record the store id of block `id` wherever a copy of it lives.
    pub fn annotate_saved(&mut self, id: BlockId, server_id: i64) -> bool {
        let applied = self.seq.annotate_server_id(id, server_id);

        if let EditState::Editing { original, .. } = &mut self.state
            && original.id == id
        {
            original.server_id = Some(server_id);
        }
        if let Some(snap) = self.undo.as_mut() {
            for b in snap.completed.iter_mut().filter(|b| b.id == id) {
                b.server_id = Some(server_id);
            }
        }
        applied
    }

    /// Undo the optimistic append of block `id` after its save failed.
    pub fn rollback_failed_append(&mut self, id: BlockId) -> Rollback {
        if let EditState::Editing { original, .. } = &self.state
            && original.id == id
        {
            self.diverged = true;
            return Rollback::KeptUnsaved;
        }
        let outcome = self.seq.rollback_append(id);
        match outcome {
            Rollback::Restored if !self.is_editing() => self.refresh_gap_state(None),
            Rollback::KeptUnsaved => self.diverged = true,
            _ => {}
        }
        outcome
    }

    pub fn reset(&mut self) {
        self.seq.clear();
        self.state = EditState::Idle;
        self.undo = None;
        self.diverged = false;
    }

    /// Re-derive the gap state from the list after any mutation.
    fn refresh_gap_state(&mut self, preferred: Option<BlockId>) {
        let gap_id = self.seq.alloc_id();
        let first = refresh_gaps(self.seq.completed_mut(), gap_id);
        let gap = preferred
            .and_then(|id| gap_at(self.seq.completed(), id))
            .or(first);

        match gap {
            Some(gap) => self.state = EditState::GapOpen { gap },
            None => {
                self.state = EditState::Idle;
                self.undo = None;
            }
        }
    }
}
