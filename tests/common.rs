#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use chrono::{NaiveDate, NaiveTime};
use rshiftlog::models::shift::NewBlock;
use std::env;
use std::fs;
use std::path::PathBuf;

pub fn rsl() -> Command {
    cargo_bin_cmd!("rshiftlog")
}

/// Create a unique test DB path inside the system temp dir and remove any existing file
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_rshiftlog.sqlite", name));
    let db_path = path.to_string_lossy().to_string();
    fs::remove_file(&db_path).ok();
    db_path
}

/// Initialize an empty DB through the CLI
pub fn init_db(db_path: &str) {
    rsl()
        .args(["--db", db_path, "--test", "init"])
        .assert()
        .success();
}

pub fn t(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap()
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn work(start: &str, end: &str, tasks: &str) -> NewBlock {
    NewBlock {
        start: t(start),
        end: t(end),
        tasks: tasks.to_string(),
        is_break: false,
    }
}
