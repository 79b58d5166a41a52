use rshiftlog::core::log::LogLogic;
use rshiftlog::db::pool::DbPool;
use rshiftlog::errors::StoreError;
use rshiftlog::models::shift::ShiftStatus;
use rshiftlog::store::ShiftStore;
use rshiftlog::store::sqlite::SqliteShiftStore;

mod common;
use common::{d, setup_test_db, t, work};

#[tokio::test]
async fn append_and_reload_open_shift() {
    let store = SqliteShiftStore::in_memory().unwrap();
    let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();

    let b1 = store
        .append_block(id, &work("08:00", "09:00", "A"))
        .await
        .unwrap();
    let b2 = store
        .append_block(id, &work("09:00", "10:00", "B"))
        .await
        .unwrap();

    let open = store.get_open_shift().await.unwrap().expect("open shift");
    assert_eq!(open.id, id);
    assert_eq!(open.status, ShiftStatus::InProgress);
    let ids: Vec<_> = open.blocks.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![b1, b2]);
    assert_eq!(open.blocks[1].tasks, "B");
}

#[tokio::test]
async fn close_checks_total_and_marks_pending() {
    let store = SqliteShiftStore::in_memory().unwrap();
    let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();
    store
        .append_block(id, &work("08:00", "09:00", "A"))
        .await
        .unwrap();
    store
        .append_block(id, &work("09:00", "09:50", "B"))
        .await
        .unwrap();

    let err = store.close(id, t("08:00"), t("09:50"), 2.0).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let shift = store.close(id, t("08:00"), t("09:50"), 1.75).await.unwrap();
    assert_eq!(shift.status, ShiftStatus::Pending);
    assert_eq!(shift.clock_in, Some(t("08:00")));
    assert_eq!(shift.clock_out, Some(t("09:50")));
    assert_eq!(shift.total_hours, Some(1.75));

    assert!(store.get_open_shift().await.unwrap().is_none());

    // a closed shift takes no more blocks
    let err = store
        .append_block(id, &work("09:50", "10:30", "C"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::NotFound(id));
}

#[tokio::test]
async fn replace_overwrites_blocks_in_order() {
    let store = SqliteShiftStore::in_memory().unwrap();
    let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();
    store
        .append_block(id, &work("09:00", "10:00", "B"))
        .await
        .unwrap();
    store
        .append_block(id, &work("08:00", "09:00", "A"))
        .await
        .unwrap();

    let ids = store
        .replace_blocks(
            id,
            &[work("08:00", "09:00", "A"), work("09:00", "10:30", "B+")],
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let open = store.get_open_shift().await.unwrap().unwrap();
    let starts: Vec<_> = open.blocks.iter().map(|b| b.start).collect();
    assert_eq!(starts, vec![t("08:00"), t("09:00")]);
    assert_eq!(open.blocks[1].tasks, "B+");
}

#[tokio::test]
async fn discard_deletes_shift_and_blocks() {
    let store = SqliteShiftStore::in_memory().unwrap();
    let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();
    store
        .append_block(id, &work("08:00", "09:00", "A"))
        .await
        .unwrap();

    store.discard(id).await.unwrap();

    assert!(store.get_open_shift().await.unwrap().is_none());
    assert!(store.list_shifts().await.unwrap().is_empty());
    assert_eq!(store.discard(id).await.unwrap_err(), StoreError::NotFound(id));
}

#[tokio::test]
async fn operations_are_audited() {
    let db_path = setup_test_db("store_audit");
    {
        let store = SqliteShiftStore::open(&db_path).unwrap();
        let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();
        store
            .append_block(id, &work("08:00", "09:00", "A"))
            .await
            .unwrap();
        store.close(id, t("08:00"), t("09:00"), 1.0).await.unwrap();
    }

    let pool = DbPool::new(&db_path).unwrap();
    let ops: Vec<String> = LogLogic::load(&pool)
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();

    assert!(ops.contains(&"migration_applied".to_string()));
    let tail: Vec<&str> = ops.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["open", "append", "close"]);
}

#[tokio::test]
async fn reopening_database_keeps_data() {
    let db_path = setup_test_db("store_reopen");
    let id = {
        let store = SqliteShiftStore::open(&db_path).unwrap();
        let id = store.open(d("2025-03-03"), t("08:00")).await.unwrap();
        store
            .append_block(id, &work("08:00", "09:00", "A"))
            .await
            .unwrap();
        id
    };

    let store = SqliteShiftStore::open(&db_path).unwrap();
    let open = store.get_open_shift().await.unwrap().unwrap();
    assert_eq!(open.id, id);
    assert_eq!(open.blocks.len(), 1);
}
