//! In-process `ShiftStore` with fault injection, used by the engine tests and
//! for dry runs.

use super::{HOURS_TOLERANCE, ShiftStore};
use crate::core::calculator::totals::stored_total_hours;
use crate::errors::{StoreError, StoreResult};
use crate::models::shift::{NewBlock, Shift, ShiftStatus, StoredBlock};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    shifts: Vec<Shift>,
    next_shift_id: i64,
    next_block_id: i64,
    /// Scripted outcome of upcoming `append_block` calls; `None` succeeds.
    append_faults: VecDeque<Option<StoreError>>,
    /// Delays applied to upcoming `append_block` calls, in call order.
    append_delays: VecDeque<Duration>,
    fail_open: Option<StoreError>,
    fail_close: Option<StoreError>,
    fail_discard: Option<StoreError>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryShiftStore {
    state: Mutex<State>,
}

impl InMemoryShiftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Network("store lock poisoned".into()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Make the next `count` appends fail with `error`.
    pub fn fail_next_appends(&self, count: usize, error: StoreError) {
        self.with_state(|s| {
            for _ in 0..count {
                s.append_faults.push_back(Some(error.clone()));
            }
        });
    }

    /// Let the next append succeed (used to interleave with failures).
    pub fn pass_next_append(&self) {
        self.with_state(|s| s.append_faults.push_back(None));
    }

    /// Delay upcoming appends, one entry per call.
    pub fn delay_next_appends(&self, delays: &[Duration]) {
        self.with_state(|s| s.append_delays.extend(delays.iter().copied()));
    }

    pub fn fail_open(&self, error: StoreError) {
        self.with_state(|s| s.fail_open = Some(error));
    }

    pub fn fail_close(&self, error: StoreError) {
        self.with_state(|s| s.fail_close = Some(error));
    }

    pub fn fail_discard(&self, error: StoreError) {
        self.with_state(|s| s.fail_discard = Some(error));
    }

    /// Names of the store operations called so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn shift(&self, shift_id: i64) -> Option<Shift> {
        self.with_state(|s| s.shifts.iter().find(|sh| sh.id == shift_id).cloned())
    }

    pub fn shift_count(&self) -> usize {
        self.with_state(|s| s.shifts.len())
    }

    /// Put an in-progress shift with the given blocks in the store.
    pub fn seed_open_shift(&self, date: NaiveDate, blocks: &[NewBlock]) -> i64 {
        self.with_state(|s| {
            s.next_shift_id += 1;
            let id = s.next_shift_id;
            let mut stored = Vec::with_capacity(blocks.len());
            for b in blocks {
                s.next_block_id += 1;
                stored.push(StoredBlock::from_new(s.next_block_id, b));
            }
            s.shifts.push(Shift {
                id,
                date,
                clock_in: None,
                clock_out: None,
                total_hours: None,
                blocks: stored,
                status: ShiftStatus::InProgress,
            });
            id
        })
    }
}

fn open_shift_mut(state: &mut State, shift_id: i64) -> StoreResult<&mut Shift> {
    state
        .shifts
        .iter_mut()
        .find(|s| s.id == shift_id && s.status == ShiftStatus::InProgress)
        .ok_or(StoreError::NotFound(shift_id))
}

#[async_trait]
impl ShiftStore for InMemoryShiftStore {
    async fn open(&self, date: NaiveDate, _start: NaiveTime) -> StoreResult<i64> {
        let mut s = self.lock()?;
        s.calls.push("open".into());
        if let Some(e) = s.fail_open.take() {
            return Err(e);
        }
        s.next_shift_id += 1;
        let id = s.next_shift_id;
        s.shifts.push(Shift {
            id,
            date,
            clock_in: None,
            clock_out: None,
            total_hours: None,
            blocks: Vec::new(),
            status: ShiftStatus::InProgress,
        });
        Ok(id)
    }

    async fn append_block(&self, shift_id: i64, block: &NewBlock) -> StoreResult<i64> {
        // Claimed in call order, before any delay.
        let (delay, fault) = {
            let mut s = self.lock()?;
            s.calls.push("append_block".into());
            (s.append_delays.pop_front(), s.append_faults.pop_front().flatten())
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(e) = fault {
            return Err(e);
        }

        let mut s = self.lock()?;
        s.next_block_id += 1;
        let id = s.next_block_id;
        open_shift_mut(&mut s, shift_id)?
            .blocks
            .push(StoredBlock::from_new(id, block));
        Ok(id)
    }

    async fn replace_blocks(&self, shift_id: i64, blocks: &[NewBlock]) -> StoreResult<Vec<i64>> {
        let mut s = self.lock()?;
        s.calls.push("replace_blocks".into());
        open_shift_mut(&mut s, shift_id)?;

        let mut stored = Vec::with_capacity(blocks.len());
        for b in blocks {
            s.next_block_id += 1;
            stored.push(StoredBlock::from_new(s.next_block_id, b));
        }
        let ids = stored.iter().map(|b| b.id).collect();
        open_shift_mut(&mut s, shift_id)?.blocks = stored;
        Ok(ids)
    }

    async fn close(
        &self,
        shift_id: i64,
        clock_in: NaiveTime,
        clock_out: NaiveTime,
        total_hours: f64,
    ) -> StoreResult<Shift> {
        let mut s = self.lock()?;
        s.calls.push("close".into());
        if let Some(e) = s.fail_close.take() {
            return Err(e);
        }
        let shift = open_shift_mut(&mut s, shift_id)?;

        let stored = stored_total_hours(&shift.blocks);
        if (stored - total_hours).abs() > HOURS_TOLERANCE {
            return Err(StoreError::Validation(format!(
                "Reported {:.2} h but the saved blocks add up to {:.2} h",
                total_hours, stored
            )));
        }

        shift.clock_in = Some(clock_in);
        shift.clock_out = Some(clock_out);
        shift.total_hours = Some(total_hours);
        shift.status = ShiftStatus::Pending;
        Ok(shift.clone())
    }

    async fn discard(&self, shift_id: i64) -> StoreResult<()> {
        let mut s = self.lock()?;
        s.calls.push("discard".into());
        if let Some(e) = s.fail_discard.take() {
            return Err(e);
        }
        open_shift_mut(&mut s, shift_id)?;
        s.shifts.retain(|sh| sh.id != shift_id);
        Ok(())
    }

    async fn get_open_shift(&self) -> StoreResult<Option<Shift>> {
        let s = self.lock()?;
        Ok(s.shifts
            .iter()
            .rev()
            .find(|sh| sh.status == ShiftStatus::InProgress)
            .cloned())
    }

    async fn list_shifts(&self) -> StoreResult<Vec<Shift>> {
        let s = self.lock()?;
        Ok(s.shifts.clone())
    }
}
