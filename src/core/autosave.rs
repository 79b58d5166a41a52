//! Background persistence of completed blocks.
//!
//! Each completed block is pushed to the store by a detached task. Results
//! come back as [`SaveMessage`]s on a channel and are applied to the session
//! by the caller, between user actions, so the block list is only ever
//! touched from one place. A result is matched to its block by local id; a
//! result for a block that no longer exists is dropped.

use crate::core::sequence::Rollback;
use crate::core::session::Session;
use crate::errors::{AppError, AppResult, StoreError, StoreResult};
use crate::models::shift::Shift;
use crate::models::time_block::BlockId;
use crate::store::ShiftStore;
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Default time the `saved` / `error` indicator stays up before going idle.
pub const DEFAULT_INDICATOR_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error(String),
}

impl SaveStatus {
    pub fn label(&self) -> String {
        match self {
            SaveStatus::Idle => String::new(),
            SaveStatus::Saving => "saving…".to_string(),
            SaveStatus::Saved => "saved".to_string(),
            SaveStatus::Error(e) => format!("save failed: {}", e),
        }
    }
}

/// Result of a background task, delivered to the owner of the session.
#[derive(Debug)]
pub enum SaveMessage {
    Appended { local_id: BlockId, server_id: i64 },
    Failed { local_id: BlockId, error: StoreError },
    ResetStatus { generation: u64 },
}

/// What applying a [`SaveMessage`] did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent {
    Saved { local_id: BlockId, server_id: i64 },
    /// The block was deleted locally before its save completed.
    Stale { local_id: BlockId },
    RolledBack {
        local_id: BlockId,
        error: StoreError,
        outcome: Rollback,
    },
    StatusReset,
    Ignored,
}

pub struct AutoSaver<S: ShiftStore + 'static> {
    store: Arc<S>,
    date: NaiveDate,
    /// Set by the first successful `open`; concurrent first saves share it.
    shift_id: Arc<OnceCell<i64>>,
    tx: UnboundedSender<SaveMessage>,
    rx: UnboundedReceiver<SaveMessage>,
    in_flight: usize,
    status: SaveStatus,
    generation: u64,
    indicator_delay: Duration,
}

impl<S: ShiftStore + 'static> AutoSaver<S> {
    pub fn new(store: Arc<S>, date: NaiveDate) -> Self {
        Self::with_shift(store, date, OnceCell::new())
    }

    /// Continue saving into a shift the store already holds.
    pub fn resume(store: Arc<S>, shift: &Shift) -> Self {
        Self::with_shift(store, shift.date, OnceCell::new_with(Some(shift.id)))
    }

    fn with_shift(store: Arc<S>, date: NaiveDate, cell: OnceCell<i64>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            store,
            date,
            shift_id: Arc::new(cell),
            tx,
            rx,
            in_flight: 0,
            status: SaveStatus::Idle,
            generation: 0,
            indicator_delay: DEFAULT_INDICATOR_DELAY,
        }
    }

    pub fn with_indicator_delay(mut self, delay: Duration) -> Self {
        self.indicator_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn shift_id(&self) -> Option<i64> {
        self.shift_id.get().copied()
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Start saving block `local_id` in the background. Returns at once.
    pub fn queue_append(&mut self, session: &Session, local_id: BlockId) -> AppResult<()> {
        let block = session
            .completed_blocks()
            .iter()
            .find(|b| b.id == local_id)
            .ok_or_else(|| AppError::Other(format!("block {} is not in the list", local_id)))?;
        let payload = block
            .to_new_block()
            .ok_or_else(|| AppError::Validation("Please select an end time.".into()))?;
        let start = session.sequence().first_start().unwrap_or(payload.start);

        let store = Arc::clone(&self.store);
        let cell = Arc::clone(&self.shift_id);
        let tx = self.tx.clone();
        let date = self.date;

        self.in_flight += 1;
        self.status = SaveStatus::Saving;

        tokio::spawn(async move {
            let result: StoreResult<i64> = async {
                let shift_id = *cell.get_or_try_init(|| store.open(date, start)).await?;
                store.append_block(shift_id, &payload).await
            }
            .await;

            let msg = match result {
                Ok(server_id) => SaveMessage::Appended {
                    local_id,
                    server_id,
                },
                Err(error) => SaveMessage::Failed { local_id, error },
            };
            // The receiver is gone only when the tracker has shut down.
            let _ = tx.send(msg);
        });
        Ok(())
    }

    /// Apply one background result to the session.
    pub fn apply(&mut self, msg: SaveMessage, session: &mut Session) -> SaveEvent {
        match msg {
            SaveMessage::Appended {
                local_id,
                server_id,
            } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let applied = session.annotate_saved(local_id, server_id);

                // An earlier block still unsaved means the store now holds
                // them out of order.
                if applied && earlier_unsaved(session, local_id) {
                    session.mark_diverged();
                }

                if self.in_flight == 0 {
                    self.status = SaveStatus::Saved;
                    self.schedule_reset();
                }

                if applied {
                    SaveEvent::Saved {
                        local_id,
                        server_id,
                    }
                } else {
                    SaveEvent::Stale { local_id }
                }
            }
            SaveMessage::Failed { local_id, error } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                let outcome = session.rollback_failed_append(local_id);
                self.status = SaveStatus::Error(error.to_string());
                self.schedule_reset();
                SaveEvent::RolledBack {
                    local_id,
                    error,
                    outcome,
                }
            }
            SaveMessage::ResetStatus { generation } => {
                if generation == self.generation && self.in_flight == 0 {
                    self.status = SaveStatus::Idle;
                    SaveEvent::StatusReset
                } else {
                    SaveEvent::Ignored
                }
            }
        }
    }

    /// Apply a result if one is ready, without waiting.
    pub fn try_apply(&mut self, session: &mut Session) -> Option<SaveEvent> {
        let msg = self.rx.try_recv().ok()?;
        Some(self.apply(msg, session))
    }

    /// Wait for the next background result. Never resolves to `None` while
    /// the saver is alive, since it holds a sender itself.
    pub async fn recv(&mut self) -> Option<SaveMessage> {
        self.rx.recv().await
    }

    /// Wait until every queued save has reported back and apply the results.
    pub async fn drain(&mut self, session: &mut Session) -> Vec<SaveEvent> {
        let mut events = Vec::new();
        while self.in_flight > 0 {
            let Some(msg) = self.rx.recv().await else {
                break;
            };
            events.push(self.apply(msg, session));
        }
        events
    }

    fn schedule_reset(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let delay = self.indicator_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SaveMessage::ResetStatus { generation });
        });
    }

    async fn ensure_shift(&self, start: NaiveTime) -> AppResult<i64> {
        let id = *self
            .shift_id
            .get_or_try_init(|| self.store.open(self.date, start))
            .await?;
        Ok(id)
    }

    /// Clock out: flush what is unsaved and submit the shift for approval.
    ///
    /// On failure the session is left as it was (apart from the flushed
    /// current block) so the user can try again.
    pub async fn complete_shift(&mut self, session: &mut Session) -> AppResult<Shift> {
        self.drain(session).await;

        if session.is_editing() {
            return Err(AppError::StateConflict(
                "Save or cancel the block being edited first.".into(),
            ));
        }
        if session.current_block().is_some_and(|c| c.is_complete()) {
            session.append_current()?;
        }
        if session.has_gaps_in_completed() {
            return Err(AppError::Validation(
                "Fill or undo the gaps between blocks before clocking out.".into(),
            ));
        }

        let (clock_in, clock_out) = match (
            session.sequence().first_start(),
            session.sequence().frontier(),
        ) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(AppError::Validation(
                    "Record at least one block before clocking out.".into(),
                ));
            }
        };

        let shift_id = self.ensure_shift(clock_in).await?;

        if session.is_diverged() {
            let payloads = session.sequence().payloads();
            let blocks: Vec<_> = payloads.iter().map(|(_, b)| b.clone()).collect();
            let ids = self.store.replace_blocks(shift_id, &blocks).await?;
            for ((local_id, _), server_id) in payloads.iter().zip(ids) {
                session.annotate_saved(*local_id, server_id);
            }
            session.mark_synced();
        } else {
            for (local_id, block) in session.sequence().unsaved_blocks() {
                let server_id = self.store.append_block(shift_id, &block).await?;
                session.annotate_saved(local_id, server_id);
            }
        }

        let shift = self
            .store
            .close(shift_id, clock_in, clock_out, session.total_hours())
            .await?;

        session.reset();
        self.shift_id = Arc::new(OnceCell::new());
        self.status = SaveStatus::Idle;
        Ok(shift)
    }

    /// Throw the shift away. Local state is cleared even when the store
    /// call fails; the error is still returned so it can be shown.
    pub async fn discard_shift(&mut self, session: &mut Session) -> AppResult<()> {
        self.drain(session).await;

        let result = match self.shift_id() {
            Some(id) => self.store.discard(id).await.map_err(AppError::from),
            None => Ok(()),
        };

        session.reset();
        self.shift_id = Arc::new(OnceCell::new());
        self.status = SaveStatus::Idle;
        result
    }
}

fn earlier_unsaved(session: &Session, local_id: BlockId) -> bool {
    session
        .completed_blocks()
        .iter()
        .take_while(|b| b.id != local_id)
        .any(|b| b.is_real() && b.server_id.is_none())
}
