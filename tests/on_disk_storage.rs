//! Persistence across reopen of a file-backed database.

mod common;

use danci_srs::srs::{Grade, QueueLimit, ScopeFilter};
use danci_srs::storage::migrations::{get_current_version, CURRENT_SCHEMA_VERSION};
use danci_srs::Storage;

#[test]
fn progress_and_errors_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("srs.db");

    {
        let env = common::create_test_env_with(Storage::open(&path).unwrap());
        env.engine.record_answer("S", "W", Grade::CORRECT).unwrap();
        env.engine.record_answer("S", "W", Grade::INCORRECT).unwrap();
    }

    let storage = Storage::open(&path).unwrap();
    {
        let conn = storage.get_connection().unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    let progress = storage.progress().get("S", "W").unwrap().unwrap();
    assert_eq!((progress.repetitions, progress.interval_days), (0, 1));
    assert_eq!(storage.error_ledger().count_for_word("S", "W", None).unwrap(), 1);

    let env = common::create_test_env_with(storage);
    env.clock.advance_days(1);
    let queue = env
        .queue
        .build_queue("S", &ScopeFilter::all(), QueueLimit::All)
        .unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].error_count, 1);
}
