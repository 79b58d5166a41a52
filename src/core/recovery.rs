//! Start-up check for a shift left open by an earlier run.

use crate::core::session::Session;
use crate::errors::{AppError, AppResult};
use crate::models::shift::Shift;
use crate::store::ShiftStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Resume,
    CloseOut,
    Discard,
}

impl RecoveryChoice {
    pub fn from_input(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "r" | "resume" => Some(RecoveryChoice::Resume),
            "c" | "close" => Some(RecoveryChoice::CloseOut),
            "d" | "discard" => Some(RecoveryChoice::Discard),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// Keep working on the shift; the session is rebuilt from the stored blocks.
    Resumed(Session, Shift),
    Closed(Shift),
    Discarded,
}

pub async fn find_open_shift<S: ShiftStore + ?Sized>(store: &S) -> AppResult<Option<Shift>> {
    Ok(store.get_open_shift().await?)
}

/// Act on the user's choice for an open shift.
///
/// Closing out uses the first stored start and the last stored end as clock
/// in and clock out; a shift with no blocks cannot be closed.
pub async fn resolve<S: ShiftStore + ?Sized>(
    store: &S,
    shift: Shift,
    choice: RecoveryChoice,
) -> AppResult<RecoveryOutcome> {
    match choice {
        RecoveryChoice::Resume => {
            let session = Session::resume(&shift);
            Ok(RecoveryOutcome::Resumed(session, shift))
        }
        RecoveryChoice::CloseOut => {
            let (clock_in, clock_out) = shift.block_bounds().ok_or_else(|| {
                AppError::Validation(
                    "The open shift has no saved blocks; resume or discard it.".into(),
                )
            })?;
            let total = crate::core::calculator::totals::stored_total_hours(&shift.blocks);
            let closed = store.close(shift.id, clock_in, clock_out, total).await?;
            Ok(RecoveryOutcome::Closed(closed))
        }
        RecoveryChoice::Discard => {
            store.discard(shift.id).await?;
            Ok(RecoveryOutcome::Discarded)
        }
    }
}
