//! # Storage Invariant Tests
//!
//! Property-style checks over the heap and page layer:
//!
//! - page header accounting: `free_start = 6 + 4 * row_count` and
//!   `free_start + free_space = free_end`
//! - the row index always maps a live row id to the slot holding it
//! - `next_row_id` stays above every live row id, including after reopen
//! - redo twice leaves the same heap as redo once

use tarndb::records::Row;
use tarndb::schema::{Catalog, Column, Schema};
use tarndb::storage::{HeapTable, Pager, SlottedPage, PAGE_HEADER_SIZE, SLOT_SIZE};
use tarndb::types::{DataType, Value};
use tempfile::tempdir;

fn users_schema() -> Schema {
    Schema::new(
        "users",
        vec![
            Column::new("id", DataType::Int32, 0, false),
            Column::new("name", DataType::Text, 255, true),
        ],
    )
}

fn user_row(id: i32, name: &str) -> Row {
    Row::new(vec![Value::Int32(id), Value::Text(name.to_string())])
}

#[test]
fn page_header_accounting_holds_under_mixed_operations() {
    let mut page = SlottedPage::new();
    for i in 0..40 {
        page.insert_row(format!("row-{i}").as_bytes()).unwrap();
    }
    for slot in (0..40).step_by(3) {
        page.delete_row(slot).unwrap();
    }
    page.insert_row(b"after-deletes").unwrap();

    assert_eq!(
        page.free_space_start() as usize,
        PAGE_HEADER_SIZE + page.row_count() as usize * SLOT_SIZE
    );
    assert_eq!(
        page.free_space_start() + page.free_space(),
        page.free_space_end()
    );
}

#[test]
fn row_index_tracks_every_live_row() {
    let dir = tempdir().unwrap();
    let pager = Pager::open(&dir.path().join("users.db")).unwrap();
    let mut table = HeapTable::open("users", users_schema(), pager).unwrap();

    for i in 0..100 {
        table.insert(&mut user_row(i, &format!("user-{i}"))).unwrap();
    }
    for id in (1..=100).step_by(7) {
        table.delete(id).unwrap();
    }

    let live = table.scan().unwrap();
    for row in &live {
        let location = table
            .location_of(row.row_id())
            .expect("every scanned row is indexed");
        let fetched = table.find_by_row_id(row.row_id()).unwrap();
        assert_eq!(&fetched, row, "index points at the row's slot");
        let _ = location;
    }

    let max_live = live.iter().map(|r| r.row_id()).max().unwrap();
    assert!(table.next_row_id() > max_live);
}

#[test]
fn next_row_id_survives_reopen_above_all_live_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.db");
    {
        let pager = Pager::open(&path).unwrap();
        let mut table = HeapTable::open("users", users_schema(), pager).unwrap();
        let mut explicit = user_row(1, "late");
        explicit.set_row_id(500);
        table.insert(&mut explicit).unwrap();
        table.insert(&mut user_row(2, "after")).unwrap();
        table.close().unwrap();
    }

    let pager = Pager::open(&path).unwrap();
    let table = HeapTable::open("users", users_schema(), pager).unwrap();
    assert_eq!(table.next_row_id(), 502);
}

#[test]
fn updates_keep_the_index_valid_across_page_spills() {
    let dir = tempdir().unwrap();
    let pager = Pager::open(&dir.path().join("users.db")).unwrap();
    let mut table = HeapTable::open("users", users_schema(), pager).unwrap();

    // Fill a page nearly full, then grow one row until it must spill.
    for i in 0..8 {
        table.insert(&mut user_row(i, &"x".repeat(400))).unwrap();
    }
    let victim = 1i64;
    for growth in [800usize, 1600, 3200] {
        table
            .update(victim, &user_row(1, &"y".repeat(growth)))
            .unwrap();
        let row = table.find_by_row_id(victim).unwrap();
        match &row.values()[1] {
            Value::Text(s) => assert_eq!(s.len(), growth),
            other => panic!("expected Text, got {other:?}"),
        }
    }
    assert_eq!(table.scan().unwrap().len(), 8);
}

mod recovery_idempotence {
    use super::*;
    use std::sync::Arc;
    use tarndb::txn::RecoveryManager;
    use tarndb::wal::Wal;

    #[test]
    fn redo_twice_equals_redo_once() {
        let dir = tempdir().unwrap();
        let wal = Arc::new(Wal::open(&dir.path().join("wal.log")).unwrap());
        let catalog = Arc::new(Catalog::open(dir.path()).unwrap());
        catalog.create_table(users_schema()).unwrap();

        wal.log_begin(1);
        let image = Row::with_id(10, vec![Value::Int32(1), Value::Text("alice".into())]).encode();
        wal.log_insert(1, "users", 10, image);
        wal.log_commit(1);
        wal.flush().unwrap();

        let rm = RecoveryManager::new(Arc::clone(&wal), Arc::clone(&catalog));
        rm.recover().unwrap();
        rm.recover().unwrap();

        let table = catalog.table("users").unwrap();
        let rows = table.lock().scan().unwrap();
        assert_eq!(rows.len(), 1, "the committed insert is applied exactly once");
        assert_eq!(rows[0].row_id(), 10);
    }

    #[test]
    fn undo_twice_equals_undo_once() {
        let dir = tempdir().unwrap();
        let wal = Arc::new(Wal::open(&dir.path().join("wal.log")).unwrap());
        let catalog = Arc::new(Catalog::open(dir.path()).unwrap());
        catalog.create_table(users_schema()).unwrap();

        // The crashed transaction's insert reached the heap, but its
        // commit never made it to the log.
        {
            let table = catalog.table("users").unwrap();
            let mut row =
                Row::with_id(10, vec![Value::Int32(1), Value::Text("alice".into())]);
            table.lock().insert(&mut row).unwrap();
        }
        let image = Row::with_id(10, vec![Value::Int32(1), Value::Text("alice".into())]).encode();
        wal.log_begin(1);
        wal.log_insert(1, "users", 10, image);
        wal.flush().unwrap();

        let rm = RecoveryManager::new(Arc::clone(&wal), Arc::clone(&catalog));
        let first = rm.recover().unwrap();
        assert_eq!(first.undo_applied, 1);
        assert_eq!(first.rolled_back_txns, 1);
        let heap_after_first = {
            let table = catalog.table("users").unwrap();
            let rows = table.lock().scan().unwrap();
            rows
        };
        assert!(heap_after_first.is_empty(), "the crashed insert is undone");

        // The second pass sees the Rollback marker written by the first
        // and must not re-apply the inverse or emit another Compensate.
        let second = rm.recover().unwrap();
        assert_eq!(second.undo_applied, 0);
        assert_eq!(second.rolled_back_txns, 0);
        let heap_after_second = {
            let table = catalog.table("users").unwrap();
            let rows = table.lock().scan().unwrap();
            rows
        };
        assert_eq!(heap_after_second, heap_after_first);

        let rollbacks = wal
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.kind == tarndb::wal::LogKind::Rollback)
            .count();
        assert_eq!(rollbacks, 1, "only the first pass rolls the txn back");
    }
}
