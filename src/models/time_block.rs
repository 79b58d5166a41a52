use super::shift::NewBlock;
use crate::utils::time::{duration_hours, format_opt_time};
use chrono::NaiveTime;
use serde::Serialize;

/// Local identifier of a block, unique within the working set of a shift.
pub type BlockId = u64;

/// Joins the individual task entries of a block.
pub const TASK_SEPARATOR: &str = " • ";

/// Synthetic task label carried by break blocks.
pub const BREAK_LABEL: &str = "Break";

/// Transient role of an entry in the block list. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockMarker {
    /// A block of recorded time.
    Real,
    /// Holds the list position of a block that is being edited.
    EditingPlaceholder,
    /// Marks missing time between two real blocks, awaiting a fill.
    GapPlaceholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBlock {
    pub id: BlockId,
    pub server_id: Option<i64>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub tasks: String,
    pub is_break: bool,
    pub marker: BlockMarker,
}

impl TimeBlock {
    /// Empty open block, as used for the current block of a shift.
    pub fn open(id: BlockId, start: Option<NaiveTime>) -> Self {
        Self {
            id,
            server_id: None,
            start,
            end: None,
            tasks: String::new(),
            is_break: false,
            marker: BlockMarker::Real,
        }
    }

    pub fn work(id: BlockId, start: NaiveTime, end: NaiveTime, tasks: &str) -> Self {
        Self {
            id,
            server_id: None,
            start: Some(start),
            end: Some(end),
            tasks: tasks.to_string(),
            is_break: false,
            marker: BlockMarker::Real,
        }
    }

    pub fn break_block(id: BlockId, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            is_break: true,
            ..Self::work(id, start, end, BREAK_LABEL)
        }
    }

    /// Zero-duration marker spanning the missing time `start..end`.
    pub fn gap_placeholder(id: BlockId, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            marker: BlockMarker::GapPlaceholder,
            ..Self::work(id, start, end, "")
        }
    }

    /// Stand-in that keeps this block's slot while it is edited elsewhere.
    pub fn editing_placeholder(&self) -> Self {
        Self {
            marker: BlockMarker::EditingPlaceholder,
            ..self.clone()
        }
    }

    pub fn is_real(&self) -> bool {
        self.marker == BlockMarker::Real
    }

    pub fn is_gap(&self) -> bool {
        self.marker == BlockMarker::GapPlaceholder
    }

    pub fn is_editing_placeholder(&self) -> bool {
        self.marker == BlockMarker::EditingPlaceholder
    }

    /// Occupies time on the timeline (real blocks and blocks being edited).
    pub fn occupies_time(&self) -> bool {
        !self.is_gap()
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn span(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((self.start?, self.end?))
    }

    /// Quarter-hour rounded hours, zero while incomplete.
    pub fn hours(&self) -> f64 {
        duration_hours(self.start, self.end).unwrap_or(0.0)
    }

    pub fn task_entries(&self) -> Vec<&str> {
        self.tasks
            .split(TASK_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn push_task(&mut self, entry: &str) {
        let entry = entry.trim();
        if entry.is_empty() {
            return;
        }
        if self.tasks.trim().is_empty() {
            self.tasks = entry.to_string();
        } else {
            self.tasks = format!("{}{}{}", self.tasks, TASK_SEPARATOR, entry);
        }
    }

    pub fn has_content(&self) -> bool {
        !self.tasks.trim().is_empty() || self.end.is_some()
    }

    /// Wire payload for the store; `None` until both endpoints are known.
    pub fn to_new_block(&self) -> Option<NewBlock> {
        let (start, end) = self.span()?;
        Some(NewBlock {
            start,
            end,
            tasks: self.tasks.clone(),
            is_break: self.is_break,
        })
    }

    pub fn label(&self) -> String {
        format!(
            "{}-{}",
            format_opt_time(self.start),
            format_opt_time(self.end)
        )
    }
}
