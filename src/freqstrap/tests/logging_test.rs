//! Run log naming and retention tests

use chrono::{Local, TimeZone};
use freqstrap::logging::{log_file_name, prune_old_logs};
use std::fs::File;
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(24 * 3600);

#[test]
fn test_log_file_name_is_timestamped() {
    let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(log_file_name(now), "freqstrap-20240102-030405.log");
}

#[test]
fn test_prune_removes_only_expired_run_logs() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();

    let old_log = dir.path().join("freqstrap-20240101-000000.log");
    let fresh_log = dir.path().join("freqstrap-20240108-000000.log");
    let old_other = dir.path().join("syslog.log");
    for path in [&old_log, &fresh_log, &old_other] {
        File::create(path).unwrap();
    }
    File::options()
        .write(true)
        .open(&old_log)
        .unwrap()
        .set_modified(now - 10 * DAY)
        .unwrap();
    File::options()
        .write(true)
        .open(&old_other)
        .unwrap()
        .set_modified(now - 10 * DAY)
        .unwrap();

    let removed = prune_old_logs(dir.path(), 7 * DAY, now).unwrap();

    assert_eq!(removed, vec![old_log.clone()]);
    assert!(!old_log.exists());
    assert!(fresh_log.exists());
    assert!(old_other.exists());
}

#[test]
fn test_prune_ignores_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("freqstrap-archive.log")).unwrap();

    let removed = prune_old_logs(dir.path(), Duration::ZERO, SystemTime::now() + DAY).unwrap();
    assert!(removed.is_empty());
    assert!(dir.path().join("freqstrap-archive.log").is_dir());
}
