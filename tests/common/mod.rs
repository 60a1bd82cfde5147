#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;

use danci_srs::srs::{ReviewQueueBuilder, SchedulingEngine};
use danci_srs::{FixedClock, Storage};

pub struct TestEnv {
    pub storage: Storage,
    pub clock: Arc<FixedClock>,
    pub engine: SchedulingEngine,
    pub queue: ReviewQueueBuilder,
}

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date")
}

pub fn create_test_env() -> TestEnv {
    create_test_env_with(Storage::in_memory().expect("in-memory storage"))
}

pub fn create_test_env_with(storage: Storage) -> TestEnv {
    let clock = Arc::new(FixedClock::on(start_date()));
    let engine = SchedulingEngine::new(storage.clone(), clock.clone());
    let queue = ReviewQueueBuilder::new(storage.clone(), clock.clone());
    TestEnv {
        storage,
        clock,
        engine,
        queue,
    }
}
