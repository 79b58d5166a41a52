//! Gap and overlap resolution.
//!
//! After a block is edited, filled in or deleted, its neighbours must be
//! brought back in line: successors swallowed by the new span are removed,
//! a partially covered successor is trimmed, and missing time is marked with
//! a gap placeholder so the list keeps its order while the gap is open.
//!
//! Times are compared as minute offsets from the edited block's start so that
//! shifts crossing midnight order correctly.

use crate::models::time_block::{BlockId, TimeBlock};
use crate::utils::time::{MINUTES_PER_DAY, elapsed_minutes, offset_from};
use chrono::NaiveTime;

/// Missing time between two real blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct GapDescriptor {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// List position of the gap placeholder, where a fill block goes.
    pub gap_index: usize,
    pub placeholder_id: BlockId,
    /// The block list without the placeholder.
    pub pending_blocks: Vec<TimeBlock>,
}

impl GapDescriptor {
    pub fn minutes(&self) -> i64 {
        elapsed_minutes(self.start, self.end)
    }
}

/// What `reconcile` did to the neighbours of the inserted block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Successors fully covered by the inserted block.
    pub removed: Vec<BlockId>,
    /// Successor whose start was trimmed to the inserted block's end.
    pub clamped: Option<BlockId>,
    pub gap: Option<GapDescriptor>,
}

impl Reconciliation {
    pub fn overlapped(&self) -> bool {
        !self.removed.is_empty() || self.clamped.is_some()
    }
}

fn end_offset(anchor: NaiveTime, t: NaiveTime) -> i64 {
    match offset_from(anchor, t) {
        0 => MINUTES_PER_DAY,
        o => o,
    }
}

/// Insert `edited` at `insert_index` and reconcile it against what follows.
///
/// A stale gap placeholder right after the insertion point is dropped, since
/// its bounds no longer hold. `gap_id` is used if a new placeholder is needed.
pub fn reconcile(
    blocks: &mut Vec<TimeBlock>,
    edited: TimeBlock,
    insert_index: usize,
    gap_id: BlockId,
) -> Reconciliation {
    let idx = insert_index.min(blocks.len());
    let mut out = Reconciliation::default();

    let Some((anchor, edited_end)) = edited.span() else {
        blocks.insert(idx, edited);
        return out;
    };
    let edited_off = elapsed_minutes(anchor, edited_end);
    blocks.insert(idx, edited);

    let next = idx + 1;

    // Overlap: consume successors until one reaches past the new end.
    while next < blocks.len() {
        if blocks[next].is_gap() {
            blocks.remove(next);
            continue;
        }
        let Some((s, e)) = blocks[next].span() else {
            break;
        };
        if offset_from(anchor, s) >= edited_off {
            break;
        }
        if end_offset(anchor, e) <= edited_off {
            out.removed.push(blocks.remove(next).id);
            continue;
        }
        blocks[next].start = Some(edited_end);
        out.clamped = Some(blocks[next].id);
        break;
    }

    // Gap: the successor starts after the new end.
    if let Some(succ_start) = blocks.get(next).and_then(|b| b.start)
        && offset_from(anchor, succ_start) > edited_off
    {
        let pending_blocks = blocks.clone();
        blocks.insert(next, TimeBlock::gap_placeholder(gap_id, edited_end, succ_start));
        out.gap = Some(GapDescriptor {
            start: edited_end,
            end: succ_start,
            gap_index: next,
            placeholder_id: gap_id,
            pending_blocks,
        });
    }

    out
}

fn prev_end(blocks: &[TimeBlock], idx: usize) -> Option<NaiveTime> {
    blocks[..idx]
        .iter()
        .rev()
        .find(|b| b.occupies_time())
        .and_then(|b| b.end)
}

fn next_start(blocks: &[TimeBlock], idx: usize) -> Option<NaiveTime> {
    blocks
        .get(idx + 1..)?
        .iter()
        .find(|b| b.occupies_time())
        .and_then(|b| b.start)
}

/// Position of the first block that does not start where its predecessor ended.
fn first_discontinuity(blocks: &[TimeBlock]) -> Option<usize> {
    let mut last_end: Option<NaiveTime> = None;
    for (i, b) in blocks.iter().enumerate() {
        if !b.occupies_time() {
            continue;
        }
        if let (Some(prev), Some(start)) = (last_end, b.start)
            && prev != start
        {
            return Some(i);
        }
        last_end = b.end;
    }
    None
}

fn describe(blocks: &[TimeBlock], gap_index: usize) -> Option<GapDescriptor> {
    let gap = blocks.get(gap_index).filter(|b| b.is_gap())?;
    let (start, end) = gap.span()?;
    Some(GapDescriptor {
        start,
        end,
        gap_index,
        placeholder_id: gap.id,
        pending_blocks: blocks.iter().filter(|b| !b.is_gap()).cloned().collect(),
    })
}

/// Descriptor for the first gap placeholder in the list.
pub fn active_gap(blocks: &[TimeBlock]) -> Option<GapDescriptor> {
    let idx = blocks.iter().position(|b| b.is_gap())?;
    describe(blocks, idx)
}

/// Descriptor for the placeholder `placeholder_id`, if it is still in the list.
pub fn gap_at(blocks: &[TimeBlock], placeholder_id: BlockId) -> Option<GapDescriptor> {
    let idx = blocks
        .iter()
        .position(|b| b.is_gap() && b.id == placeholder_id)?;
    describe(blocks, idx)
}

/// Bring gap placeholders back in line with their neighbours.
///
/// Placeholders whose neighbours now touch are dropped and the others are
/// re-bounded. If no placeholder is left but two neighbours still do not
/// touch, a placeholder is opened at the first such spot using `gap_id`.
/// Returns the active gap, if any.
pub fn refresh_gaps(blocks: &mut Vec<TimeBlock>, gap_id: BlockId) -> Option<GapDescriptor> {
    let mut i = 0;
    while i < blocks.len() {
        if !blocks[i].is_gap() {
            i += 1;
            continue;
        }
        let duplicate = i > 0 && blocks[i - 1].is_gap();
        match (prev_end(blocks, i), next_start(blocks, i)) {
            (Some(p), Some(n)) if p != n && !duplicate => {
                blocks[i].start = Some(p);
                blocks[i].end = Some(n);
                i += 1;
            }
            _ => {
                blocks.remove(i);
            }
        }
    }

    if !blocks.iter().any(|b| b.is_gap())
        && let Some(pos) = first_discontinuity(blocks)
        && let (Some(p), Some(n)) = (prev_end(blocks, pos), blocks[pos].start)
    {
        blocks.insert(pos, TimeBlock::gap_placeholder(gap_id, p, n));
    }

    active_gap(blocks)
}

/// True if a gap placeholder is present or two neighbouring blocks do not touch.
pub fn has_discontinuity(blocks: &[TimeBlock]) -> bool {
    blocks.iter().any(|b| b.is_gap()) || first_discontinuity(blocks).is_some()
}
