use rshiftlog::core::autosave::{AutoSaver, SaveEvent, SaveStatus};
use rshiftlog::core::clock::FixedClock;
use rshiftlog::core::recovery::{self, RecoveryChoice, RecoveryOutcome};
use rshiftlog::core::sequence::Rollback;
use rshiftlog::core::session::Session;
use rshiftlog::errors::{AppError, StoreError};
use rshiftlog::models::shift::ShiftStatus;
use rshiftlog::store::ShiftStore;
use rshiftlog::store::memory::InMemoryShiftStore;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{d, t, work};

fn clock() -> FixedClock {
    FixedClock::new(d("2025-03-03"), t("08:00"))
}

fn saver(store: &Arc<InMemoryShiftStore>) -> AutoSaver<InMemoryShiftStore> {
    AutoSaver::new(Arc::clone(store), d("2025-03-03")).with_indicator_delay(Duration::from_millis(5))
}

/// Complete the current block at `end` and queue its save.
fn complete(session: &mut Session, saver: &mut AutoSaver<InMemoryShiftStore>, end: &str, task: &str) {
    session.set_current_end(t(end)).unwrap();
    session.add_task(task);
    let id = session.append_current().unwrap();
    saver.queue_append(session, id).unwrap();
}

#[tokio::test]
async fn first_save_opens_shift_then_appends() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    assert_eq!(saver.status(), &SaveStatus::Saving);

    let events = saver.drain(&mut session).await;

    assert!(matches!(events.as_slice(), [SaveEvent::Saved { .. }]));
    assert_eq!(saver.status(), &SaveStatus::Saved);
    assert_eq!(store.calls(), vec!["open", "append_block"]);
    assert!(session.completed_blocks()[0].server_id.is_some());
    assert!(saver.shift_id().is_some());
}

#[tokio::test]
async fn concurrent_first_saves_open_once() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    complete(&mut session, &mut saver, "11:00", "C");
    saver.drain(&mut session).await;

    let opens = store.calls().iter().filter(|c| *c == "open").count();
    assert_eq!(opens, 1);
    assert_eq!(store.shift_count(), 1);
    assert!(session.completed_blocks().iter().all(|b| b.server_id.is_some()));
}

#[tokio::test]
async fn status_returns_to_idle_after_delay() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    saver.drain(&mut session).await;
    assert_eq!(saver.status(), &SaveStatus::Saved);

    let msg = saver.recv().await.unwrap();
    assert_eq!(saver.apply(msg, &mut session), SaveEvent::StatusReset);
    assert_eq!(saver.status(), &SaveStatus::Idle);
}

#[tokio::test]
async fn failed_append_rolls_block_back_into_current() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.fail_next_appends(1, StoreError::Network("offline".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    let events = saver.drain(&mut session).await;

    assert!(matches!(
        events.as_slice(),
        [SaveEvent::RolledBack {
            outcome: Rollback::Restored,
            ..
        }]
    ));
    assert!(matches!(saver.status(), SaveStatus::Error(_)));
    assert!(session.completed_blocks().is_empty());
    let cur = session.current_block().unwrap();
    assert_eq!(cur.span(), Some((t("08:00"), t("09:00"))));
    assert_eq!(cur.tasks, "A");

    // retry succeeds
    let id = session.append_current().unwrap();
    saver.queue_append(&session, id).unwrap();
    saver.drain(&mut session).await;
    assert_eq!(session.completed_blocks().len(), 1);
    assert!(session.completed_blocks()[0].server_id.is_some());
}

#[tokio::test]
async fn only_the_failing_save_is_rolled_back() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.pass_next_append();
    store.fail_next_appends(1, StoreError::Network("offline".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    saver.drain(&mut session).await;

    assert_eq!(session.completed_blocks().len(), 1);
    assert!(session.completed_blocks()[0].server_id.is_some());
    assert_eq!(session.current_block().unwrap().tasks, "B");

    // the indicator reset is still sleeping
    assert!(saver.try_apply(&mut session).is_none());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(saver.try_apply(&mut session), Some(SaveEvent::StatusReset));
    assert_eq!(saver.status(), &SaveStatus::Idle);
}

#[tokio::test]
async fn failed_append_behind_newer_block_is_kept_and_flushed_at_clock_out() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.fail_next_appends(1, StoreError::Network("offline".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    let events = saver.drain(&mut session).await;

    assert!(events.iter().any(|e| matches!(
        e,
        SaveEvent::RolledBack {
            outcome: Rollback::KeptUnsaved,
            ..
        }
    )));
    assert_eq!(session.completed_blocks().len(), 2);
    assert!(session.completed_blocks()[0].server_id.is_none());

    let shift = saver.complete_shift(&mut session).await.unwrap();
    assert_eq!(shift.blocks.len(), 2);
    assert_eq!(shift.blocks[0].start, t("08:00"));
    assert_eq!(shift.total_hours, Some(2.0));
    assert!(store.calls().contains(&"replace_blocks".to_string()));
}

#[tokio::test]
async fn out_of_order_saves_annotate_their_own_blocks() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.delay_next_appends(&[Duration::from_millis(40)]);
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    let events = saver.drain(&mut session).await;

    let saved: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SaveEvent::Saved { local_id, .. } => Some(*local_id),
            _ => None,
        })
        .collect();
    let first_id = session.completed_blocks()[0].id;
    let second_id = session.completed_blocks()[1].id;
    assert_eq!(saved, vec![second_id, first_id]);
    assert!(session.completed_blocks().iter().all(|b| b.server_id.is_some()));
    assert!(session.is_diverged());

    // clock out rewrites the stored order
    let shift = saver.complete_shift(&mut session).await.unwrap();
    let starts: Vec<_> = shift.blocks.iter().map(|b| b.start).collect();
    assert_eq!(starts, vec![t("08:00"), t("09:00")]);
}

/// Leave the store holding 08-09 and 09-10 with the later block stored first,
/// as happens when the process dies before clock out.
async fn crash_after_out_of_order_saves(store: &Arc<InMemoryShiftStore>) {
    store.delay_next_appends(&[Duration::from_millis(40)]);
    let mut saver = saver(store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    saver.drain(&mut session).await;
}

#[tokio::test]
async fn resume_after_out_of_order_saves_keeps_time_order() {
    let store = Arc::new(InMemoryShiftStore::new());
    crash_after_out_of_order_saves(&store).await;

    let open = recovery::find_open_shift(store.as_ref()).await.unwrap().unwrap();
    let stored: Vec<_> = open.blocks.iter().map(|b| b.tasks.clone()).collect();
    assert_eq!(stored, vec!["B", "A"]);

    let outcome = recovery::resolve(store.as_ref(), open, RecoveryChoice::Resume)
        .await
        .unwrap();
    let RecoveryOutcome::Resumed(mut session, shift) = outcome else {
        panic!("expected resume");
    };

    let spans: Vec<_> = session.completed_blocks().iter().map(|b| b.span()).collect();
    assert_eq!(
        spans,
        vec![Some((t("08:00"), t("09:00"))), Some((t("09:00"), t("10:00")))]
    );
    assert!(session.completed_blocks().iter().all(|b| b.is_real()));
    assert!(!session.has_unfilled_gaps());
    assert!(session.gap_descriptor().is_none());
    assert_eq!(session.current_block().unwrap().start, Some(t("10:00")));
    assert!(session.is_diverged());

    let mut saver = AutoSaver::resume(Arc::clone(&store), &shift);
    let closed = saver.complete_shift(&mut session).await.unwrap();
    let tasks: Vec<_> = closed.blocks.iter().map(|b| b.tasks.as_str()).collect();
    assert_eq!(tasks, vec!["A", "B"]);
    assert_eq!(closed.clock_in, Some(t("08:00")));
    assert_eq!(closed.clock_out, Some(t("10:00")));
    assert_eq!(closed.total_hours, Some(2.0));
}

#[tokio::test]
async fn close_out_after_out_of_order_saves_uses_time_bounds() {
    let store = Arc::new(InMemoryShiftStore::new());
    crash_after_out_of_order_saves(&store).await;

    let open = recovery::find_open_shift(store.as_ref()).await.unwrap().unwrap();
    let outcome = recovery::resolve(store.as_ref(), open, RecoveryChoice::CloseOut)
        .await
        .unwrap();

    let RecoveryOutcome::Closed(shift) = outcome else {
        panic!("expected close");
    };
    assert_eq!(shift.clock_in, Some(t("08:00")));
    assert_eq!(shift.clock_out, Some(t("10:00")));
    assert_eq!(shift.total_hours, Some(2.0));
}

#[tokio::test]
async fn resume_overnight_shift_stored_out_of_order() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.seed_open_shift(
        d("2025-03-02"),
        &[
            work("23:00", "00:00", "B"),
            work("00:00", "00:30", "C"),
            work("22:00", "23:00", "A"),
        ],
    );

    let open = recovery::find_open_shift(store.as_ref()).await.unwrap().unwrap();
    assert_eq!(open.block_bounds(), Some((t("22:00"), t("00:30"))));

    let outcome = recovery::resolve(store.as_ref(), open, RecoveryChoice::Resume)
        .await
        .unwrap();
    let RecoveryOutcome::Resumed(session, _) = outcome else {
        panic!("expected resume");
    };
    let tasks: Vec<_> = session
        .completed_blocks()
        .iter()
        .map(|b| b.tasks.as_str())
        .collect();
    assert_eq!(tasks, vec!["A", "B", "C"]);
    assert!(!session.has_unfilled_gaps());
    assert_eq!(session.current_block().unwrap().start, Some(t("00:30")));
}

#[tokio::test]
async fn resume_in_stored_order_is_not_diverged() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.seed_open_shift(
        d("2025-03-02"),
        &[work("08:00", "09:00", "A"), work("09:00", "10:00", "B")],
    );

    let open = recovery::find_open_shift(store.as_ref()).await.unwrap().unwrap();
    let RecoveryOutcome::Resumed(session, _) =
        recovery::resolve(store.as_ref(), open, RecoveryChoice::Resume)
            .await
            .unwrap()
    else {
        panic!("expected resume");
    };
    assert!(!session.is_diverged());
}

#[tokio::test]
async fn injected_failure_hits_the_append_called_first() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.delay_next_appends(&[Duration::from_millis(40)]);
    store.fail_next_appends(1, StoreError::Network("offline".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    let first_id = session.completed_blocks()[0].id;
    let second_id = session.completed_blocks()[1].id;
    let events = saver.drain(&mut session).await;

    // B finishes first but was called second, so it succeeds
    assert!(events.iter().any(|e| matches!(
        e,
        SaveEvent::Saved { local_id, .. } if *local_id == second_id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SaveEvent::RolledBack {
            local_id,
            outcome: Rollback::KeptUnsaved,
            ..
        } if *local_id == first_id
    )));
    assert!(session.completed_blocks()[0].server_id.is_none());
    assert!(session.completed_blocks()[1].server_id.is_some());
}

#[tokio::test]
async fn save_for_deleted_block_is_a_no_op() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    let deleted_id = session.completed_blocks()[1].id;
    session.delete_block(1).unwrap();

    let events = saver.drain(&mut session).await;

    assert!(events.contains(&SaveEvent::Stale {
        local_id: deleted_id
    }));
    assert_eq!(session.completed_blocks().len(), 1);

    let shift = saver.complete_shift(&mut session).await.unwrap();
    assert_eq!(shift.blocks.len(), 1);
    assert_eq!(shift.total_hours, Some(1.0));
}

#[tokio::test]
async fn clock_out_flushes_current_block_and_closes() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "10:00", "A");
    session.set_current_end(t("11:30")).unwrap();
    session.add_task("B");

    let shift = saver.complete_shift(&mut session).await.unwrap();

    assert_eq!(shift.status, ShiftStatus::Pending);
    assert_eq!(shift.clock_in, Some(t("08:00")));
    assert_eq!(shift.clock_out, Some(t("11:30")));
    assert_eq!(shift.total_hours, Some(3.5));
    assert_eq!(shift.blocks.len(), 2);
    assert!(session.sequence().is_empty());
    assert!(store.get_open_shift().await.unwrap().is_none());
}

#[tokio::test]
async fn clock_out_with_edit_uses_replace() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    saver.drain(&mut session).await;

    session.begin_edit(1).unwrap();
    session.save_edit(t("09:00"), t("10:30"), Some("B longer")).unwrap();

    let shift = saver.complete_shift(&mut session).await.unwrap();
    assert_eq!(shift.total_hours, Some(2.5));
    assert_eq!(shift.blocks[1].tasks, "B longer");
    assert_eq!(shift.clock_out, Some(t("10:30")));
}

#[tokio::test]
async fn clock_out_refused_with_open_gap() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();

    complete(&mut session, &mut saver, "09:00", "A");
    complete(&mut session, &mut saver, "10:00", "B");
    complete(&mut session, &mut saver, "11:00", "C");
    session.delete_block(1).unwrap();

    let err = saver.complete_shift(&mut session).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(!store.calls().contains(&"close".to_string()));
    assert_eq!(session.completed_blocks().len(), 3);
}

#[tokio::test]
async fn close_failure_keeps_local_state() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.fail_close(StoreError::Network("timeout".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();
    complete(&mut session, &mut saver, "09:00", "A");

    let err = saver.complete_shift(&mut session).await.unwrap_err();
    assert!(matches!(err, AppError::Store(StoreError::Network(_))));
    assert_eq!(session.completed_blocks().len(), 1);

    // second attempt goes through
    let shift = saver.complete_shift(&mut session).await.unwrap();
    assert_eq!(shift.total_hours, Some(1.0));
}

#[tokio::test]
async fn discard_clears_local_state_even_on_failure() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.fail_discard(StoreError::Network("offline".into()));
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();
    complete(&mut session, &mut saver, "09:00", "A");

    let result = saver.discard_shift(&mut session).await;

    assert!(result.is_err());
    assert!(session.sequence().is_empty());
    assert!(saver.shift_id().is_none());
}

#[tokio::test]
async fn discard_removes_shift() {
    let store = Arc::new(InMemoryShiftStore::new());
    let mut saver = saver(&store);
    let mut session = Session::new();
    session.clock_in(&clock(), true).unwrap();
    complete(&mut session, &mut saver, "09:00", "A");

    saver.discard_shift(&mut session).await.unwrap();
    assert_eq!(store.shift_count(), 0);
}

#[tokio::test]
async fn store_rejects_inconsistent_total() {
    let store = InMemoryShiftStore::new();
    let id = store.seed_open_shift(d("2025-03-03"), &[work("08:00", "09:00", "A")]);

    let err = store.close(id, t("08:00"), t("09:00"), 2.0).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store
        .append_block(999, &work("09:00", "10:00", "B"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::NotFound(999));
}

#[tokio::test]
async fn recovery_resume_rehydrates_session() {
    let store = Arc::new(InMemoryShiftStore::new());
    store.seed_open_shift(
        d("2025-03-02"),
        &[work("08:00", "09:00", "A"), work("09:00", "10:00", "B")],
    );

    let open = recovery::find_open_shift(store.as_ref()).await.unwrap().unwrap();
    let outcome = recovery::resolve(store.as_ref(), open, RecoveryChoice::Resume)
        .await
        .unwrap();

    let RecoveryOutcome::Resumed(mut session, shift) = outcome else {
        panic!("expected resume");
    };
    let ids: Vec<_> = session.completed_blocks().iter().map(|b| b.id as i64).collect();
    let stored: Vec<_> = shift.blocks.iter().map(|b| b.id).collect();
    assert_eq!(ids, stored);
    assert_eq!(session.current_block().unwrap().start, Some(t("10:00")));

    // keep going and clock out into the same shift
    let mut saver = AutoSaver::resume(Arc::clone(&store), &shift);
    complete(&mut session, &mut saver, "11:00", "C");
    let closed = saver.complete_shift(&mut session).await.unwrap();
    assert_eq!(closed.id, shift.id);
    assert_eq!(closed.total_hours, Some(3.0));
    assert!(!store.calls().contains(&"open".to_string()));
}

#[tokio::test]
async fn recovery_close_out_uses_block_bounds() {
    let store = InMemoryShiftStore::new();
    let id = store.seed_open_shift(
        d("2025-03-02"),
        &[work("08:00", "09:00", "A"), work("09:00", "09:50", "B")],
    );
    let open = recovery::find_open_shift(&store).await.unwrap().unwrap();

    let outcome = recovery::resolve(&store, open, RecoveryChoice::CloseOut)
        .await
        .unwrap();

    let RecoveryOutcome::Closed(shift) = outcome else {
        panic!("expected close");
    };
    assert_eq!(shift.id, id);
    assert_eq!(shift.clock_in, Some(t("08:00")));
    assert_eq!(shift.clock_out, Some(t("09:50")));
    assert_eq!(shift.total_hours, Some(1.75));
}

#[tokio::test]
async fn recovery_discard_and_empty_close() {
    let store = InMemoryShiftStore::new();
    store.seed_open_shift(d("2025-03-02"), &[]);
    let open = recovery::find_open_shift(&store).await.unwrap().unwrap();

    let err = recovery::resolve(&store, open.clone(), RecoveryChoice::CloseOut)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let outcome = recovery::resolve(&store, open, RecoveryChoice::Discard)
        .await
        .unwrap();
    assert!(matches!(outcome, RecoveryOutcome::Discarded));
    assert!(recovery::find_open_shift(&store).await.unwrap().is_none());
}

#[test]
fn recovery_choice_parsing() {
    assert_eq!(RecoveryChoice::from_input(" Resume "), Some(RecoveryChoice::Resume));
    assert_eq!(RecoveryChoice::from_input("c"), Some(RecoveryChoice::CloseOut));
    assert_eq!(RecoveryChoice::from_input("discard"), Some(RecoveryChoice::Discard));
    assert_eq!(RecoveryChoice::from_input("maybe"), None);
}
