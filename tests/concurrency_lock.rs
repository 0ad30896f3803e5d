//! Exclusive-access behavior across invocations
//!
//! The lock file serializes commands against one image. These tests
//! cover contention, release on every exit path, and interleaved
//! commands from multiple threads.

use tempfile::TempDir;
use vdiskfs::{decode_listing, dispatch, Command, EngineConfig, Geometry};

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path().join("vdisk.img"), Geometry::default())
}

#[test]
fn test_foreign_lock_file_makes_commands_busy() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    std::fs::write(cfg.lock_path(), b"424242").unwrap();

    assert_eq!(dispatch::run(&cfg, Command::List), "ERROR:Busy");
    // The losing command must not have stolen or removed the lock.
    assert_eq!(std::fs::read(cfg.lock_path()).unwrap(), b"424242");
    assert!(!cfg.image.exists());
}

#[test]
fn test_lock_is_released_on_success_and_on_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    dispatch::run(
        &cfg,
        Command::Create {
            name: "a".to_string(),
            content: "x".to_string(),
        },
    );
    assert!(!cfg.lock_path().exists());

    assert_eq!(
        dispatch::run(
            &cfg,
            Command::Read {
                name: "ghost".to_string()
            }
        ),
        "ERROR:File_Not_Found"
    );
    assert!(!cfg.lock_path().exists());
}

#[test]
fn test_threads_serialize_on_one_image() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cfg = cfg.clone();
                scope.spawn(move || {
                    dispatch::run(
                        &cfg,
                        Command::Create {
                            name: format!("file{i}"),
                            content: format!("content {i}"),
                        },
                    )
                })
            })
            .collect();

        for handle in handles {
            let line = handle.join().unwrap();
            assert!(
                line.starts_with("SUCCESS:Created_at_Block_"),
                "create lost under contention: {line}"
            );
        }
    });

    let listing = decode_listing(&dispatch::run(&cfg, Command::List)).unwrap();
    assert_eq!(listing.records.len(), 4);

    // Serialized commits mean four distinct single-block allocations.
    let mut starts: Vec<u64> = listing.records.iter().map(|r| r.start).collect();
    starts.sort_unstable();
    assert_eq!(starts, vec![0, 1, 2, 3]);

    for i in 0..4 {
        assert_eq!(
            dispatch::run(
                &cfg,
                Command::Read {
                    name: format!("file{i}")
                }
            ),
            format!("content {i}")
        );
    }
}
