use rshiftlog::core::sequence::{BlockSequence, validate_span};
use rshiftlog::errors::AppError;
use rshiftlog::models::shift::StoredBlock;
use rshiftlog::models::time_block::{BREAK_LABEL, TimeBlock};

mod common;
use common::t;

fn record(seq: &mut BlockSequence, start: Option<&str>, end: &str, task: &str) {
    if let Some(s) = start {
        seq.set_current_start(t(s)).unwrap();
    }
    seq.set_current_end(t(end)).unwrap();
    seq.add_current_task(task);
    seq.append_current_as_completed().unwrap();
}

fn validation_message(err: AppError) -> String {
    match err {
        AppError::Validation(m) => m,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn append_opens_next_block_at_previous_end() {
    let mut seq = BlockSequence::new();
    record(&mut seq, Some("08:00"), "10:00", "A");

    seq.set_current_end(t("11:30")).unwrap();
    seq.add_current_task("B");
    seq.append_current_as_completed().unwrap();

    let done = seq.completed();
    assert_eq!(done.len(), 2);
    assert_eq!(done[0].tasks, "A");
    assert_eq!(done[1].tasks, "B");
    assert_eq!(done[1].start, Some(t("10:00")));

    let cur = seq.current().unwrap();
    assert_eq!(cur.start, Some(t("11:30")));
    assert_eq!(cur.end, None);
    assert!(cur.tasks.is_empty());

    assert_eq!(seq.total_hours(), 3.5);
    assert!(!seq.has_unfilled_gaps());
}

#[test]
fn tasks_are_joined_with_the_separator() {
    let mut seq = BlockSequence::new();
    seq.set_current_start(t("08:00")).unwrap();
    seq.add_current_task("Emails");
    seq.add_current_task("  ");
    seq.add_current_task("Standup");

    let cur = seq.current().unwrap();
    assert_eq!(cur.tasks, "Emails • Standup");
    assert_eq!(cur.task_entries(), vec!["Emails", "Standup"]);
}

#[test]
fn append_rejects_invalid_blocks() {
    let mut seq = BlockSequence::new();
    let err = seq.append_current_as_completed().unwrap_err();
    assert_eq!(validation_message(err), "Please select a start time.");

    seq.set_current_start(t("08:00")).unwrap();
    let err = seq.append_current_as_completed().unwrap_err();
    assert_eq!(validation_message(err), "Please select an end time.");

    let err = seq.set_current_end(t("08:00")).unwrap_err();
    assert_eq!(
        validation_message(err),
        "Start and end time cannot be the same."
    );

    let err = seq.set_current_end(t("10:30")).unwrap_err();
    assert_eq!(
        validation_message(err),
        "A time block cannot be longer than 2 hours."
    );

    let err = seq.set_current_end(t("08:10")).unwrap_err();
    assert_eq!(
        validation_message(err),
        "A time block must be at least 15 minutes long."
    );

    seq.set_current_end(t("09:00")).unwrap();
    let err = seq.append_current_as_completed().unwrap_err();
    assert_eq!(validation_message(err), "Please describe at least one task.");
    assert!(seq.completed().is_empty());
}

#[test]
fn validate_span_accepts_midnight_crossing() {
    assert!(validate_span(Some(t("23:30")), Some(t("00:30"))).is_ok());
}

#[test]
fn start_cannot_move_before_previous_end() {
    let mut seq = BlockSequence::new();
    record(&mut seq, Some("08:00"), "09:00", "A");

    assert!(seq.set_current_start(t("08:45")).is_err());
    // later is fine, it leaves a gap
    seq.set_current_start(t("09:30")).unwrap();
    assert!(seq.has_unfilled_gaps());
}

#[test]
fn break_pushes_partial_current_block_back() {
    let mut seq = BlockSequence::new();
    record(&mut seq, Some("08:00"), "09:00", "A");
    seq.set_current_end(t("10:00")).unwrap();
    seq.add_current_task("B");

    seq.insert_break().unwrap();

    let brk = &seq.completed()[1];
    assert!(brk.is_break);
    assert_eq!(brk.tasks, BREAK_LABEL);
    assert_eq!(brk.span(), Some((t("09:00"), t("09:15"))));

    let cur = seq.current().unwrap();
    assert_eq!(cur.start, Some(t("09:15")));
    assert_eq!(cur.end, Some(t("10:15")));
    assert_eq!(cur.tasks, "B");
}

#[test]
fn break_without_current_end_keeps_end_open() {
    let mut seq = BlockSequence::new();
    seq.clock_in(t("08:00")).unwrap();
    seq.insert_break().unwrap();

    assert_eq!(seq.completed()[0].span(), Some((t("08:00"), t("08:15"))));
    let cur = seq.current().unwrap();
    assert_eq!(cur.start, Some(t("08:15")));
    assert_eq!(cur.end, None);
}

#[test]
fn totals_round_each_block_then_the_sum() {
    let mut seq = BlockSequence::new();
    // 50 min -> 0.75, 50 min -> 0.75, 20 min -> 0.25
    record(&mut seq, Some("08:00"), "08:50", "A");
    record(&mut seq, None, "09:40", "B");
    record(&mut seq, None, "10:00", "C");
    assert_eq!(seq.total_hours(), 1.75);
}

#[test]
fn totals_include_a_complete_current_block_only() {
    let mut seq = BlockSequence::new();
    record(&mut seq, Some("08:00"), "09:00", "A");
    assert_eq!(seq.total_hours(), 1.0);

    seq.set_current_end(t("09:30")).unwrap();
    assert_eq!(seq.total_hours(), 1.5);
}

#[test]
fn totals_skip_placeholders() {
    let real = TimeBlock::work(1, t("08:00"), t("09:00"), "A");
    let editing = TimeBlock::work(2, t("09:00"), t("10:00"), "B").editing_placeholder();
    let gap = TimeBlock::gap_placeholder(3, t("10:00"), t("10:30"));
    let total = rshiftlog::core::calculator::totals::total_hours(&[real, editing, gap], None);
    assert_eq!(total, 1.0);
}

#[test]
fn rehydrate_uses_store_ids_and_opens_at_frontier() {
    let stored = vec![
        StoredBlock {
            id: 41,
            start: t("08:00"),
            end: t("09:00"),
            tasks: "A".into(),
            is_break: false,
        },
        StoredBlock {
            id: 42,
            start: t("09:00"),
            end: t("09:15"),
            tasks: BREAK_LABEL.into(),
            is_break: true,
        },
    ];
    let mut seq = BlockSequence::rehydrate(&stored);

    let ids: Vec<_> = seq.completed().iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![41, 42]);
    assert!(seq.completed().iter().all(|b| b.server_id.is_some()));
    assert!(seq.unsaved_blocks().is_empty());
    assert_eq!(seq.current().unwrap().start, Some(t("09:15")));
    assert!(seq.alloc_id() > 42);
}

#[test]
fn clock_in_twice_is_a_conflict() {
    let mut seq = BlockSequence::new();
    record(&mut seq, Some("08:00"), "09:00", "A");
    assert!(matches!(
        seq.clock_in(t("10:00")),
        Err(AppError::StateConflict(_))
    ));
}
