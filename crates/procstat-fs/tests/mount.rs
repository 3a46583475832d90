//! End-to-end tests against a real FUSE mount.
//!
//! These need `/dev/fuse` and `fusermount`, so they are ignored by default:
//! `cargo test -- --ignored`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use procstat::{MountConfig, ProcStat};

#[test]
#[ignore]
fn test_mount_read_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let config = MountConfig {
        auto_unmount: false,
        ttl: Duration::ZERO,
        ..MountConfig::new(dir.path().join("stats"))
    };
    let stats = ProcStat::create(&config).unwrap();
    // Give the session thread a moment to finish the FUSE handshake.
    std::thread::sleep(Duration::from_millis(200));

    let value = Arc::new(AtomicU64::new(41));
    let jobs = stats.context().create_directory(None, "jobs").unwrap();
    stats
        .context()
        .create_u64(Some(jobs), "done", value.clone())
        .unwrap();

    let root = stats.mount_point().to_path_buf();
    let listed: Vec<String> = std::fs::read_dir(root.join("jobs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(listed, vec!["done"]);

    assert_eq!(std::fs::read_to_string(root.join("jobs/done")).unwrap(), "41\n");
    value.fetch_add(1, Ordering::Relaxed);
    assert_eq!(std::fs::read_to_string(root.join("jobs/done")).unwrap(), "42\n");

    assert!(std::fs::write(root.join("jobs/done"), b"0").is_err());

    stats.context().remove(jobs);
    assert!(!root.join("jobs").exists());

    // destroy returns only after the session thread has exited, and the
    // tree is released after that.
    let context = stats.context().clone();
    stats.destroy();
    assert_eq!(context.live_items(), 1);
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}
