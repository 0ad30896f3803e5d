//! End-to-end verb semantics through the dispatcher
//!
//! Each test drives full load-mutate-commit cycles against a real
//! image file and asserts on the exact response lines.

use tempfile::TempDir;
use vdiskfs::{dispatch, Command, EngineConfig, Geometry};

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path().join("vdisk.img"), Geometry::default())
}

fn small_config(dir: &TempDir) -> EngineConfig {
    EngineConfig::new(dir.path().join("vdisk.img"), Geometry::new(4, 10).unwrap())
}

fn create(cfg: &EngineConfig, name: &str, content: &str) -> String {
    dispatch::run(
        cfg,
        Command::Create {
            name: name.to_string(),
            content: content.to_string(),
        },
    )
}

fn update(cfg: &EngineConfig, name: &str, content: &str) -> String {
    dispatch::run(
        cfg,
        Command::Update {
            name: name.to_string(),
            content: content.to_string(),
        },
    )
}

fn read(cfg: &EngineConfig, name: &str) -> String {
    dispatch::run(
        cfg,
        Command::Read {
            name: name.to_string(),
        },
    )
}

fn delete(cfg: &EngineConfig, name: &str) -> String {
    dispatch::run(
        cfg,
        Command::Delete {
            name: name.to_string(),
        },
    )
}

fn list(cfg: &EngineConfig) -> String {
    dispatch::run(cfg, Command::List)
}

#[test]
fn test_full_session_create_list_read_delete() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    assert_eq!(list(&cfg), "NONE");

    assert_eq!(create(&cfg, "a", &"x".repeat(2100)), "SUCCESS:Created_at_Block_0");
    assert_eq!(create(&cfg, "b", "0123456789"), "SUCCESS:Created_at_Block_3");
    assert_eq!(create(&cfg, "c", &"z".repeat(3000)), "SUCCESS:Created_at_Block_4");

    assert_eq!(list(&cfg), "a,0,2100;b,3,10;c,4,3000");
    assert_eq!(read(&cfg, "b"), "0123456789");

    assert_eq!(delete(&cfg, "b"), "SUCCESS:Deleted");
    assert_eq!(list(&cfg), "a,0,2100;c,4,3000");
    assert_eq!(read(&cfg, "b"), "ERROR:File_Not_Found");
}

#[test]
fn test_freed_gap_is_reused_lowest_first() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "a", &"a".repeat(2100)); // blocks 0..3
    create(&cfg, "b", &"b".repeat(10)); // block 3
    create(&cfg, "c", &"c".repeat(3000)); // blocks 4..7
    delete(&cfg, "a");

    // One block fits the freed gap at 0; three blocks fit it too.
    assert_eq!(create(&cfg, "d", "tiny"), "SUCCESS:Created_at_Block_0");
    assert_eq!(create(&cfg, "e", &"e".repeat(2048)), "SUCCESS:Created_at_Block_1");
}

#[test]
fn test_no_scatter_when_only_fragments_remain() {
    let dir = TempDir::new().unwrap();
    let cfg = small_config(&dir); // 10 blocks of 4 bytes

    create(&cfg, "a", "aaaa"); // block 0
    create(&cfg, "b", "bbbb"); // block 1
    create(&cfg, "c", "cccc"); // block 2
    create(&cfg, "d", "dddd"); // block 3
    delete(&cfg, "a");
    delete(&cfg, "c");

    // Eight free blocks total, but the largest contiguous run is six.
    assert_eq!(
        create(&cfg, "big", &"x".repeat(7 * 4)),
        "ERROR:Out_Of_Space"
    );
    // A request matching the largest run still succeeds.
    assert_eq!(
        create(&cfg, "fits", &"y".repeat(6 * 4)),
        "SUCCESS:Created_at_Block_4"
    );
}

#[test]
fn test_update_in_place_and_shrink_releases_tail() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "a", &"a".repeat(3000)); // blocks 0..3
    create(&cfg, "b", &"b".repeat(10)); // block 3

    // Shrink keeps the leading block and frees the rest immediately.
    assert_eq!(update(&cfg, "a", "short"), "SUCCESS:Updated_Content");
    assert_eq!(list(&cfg), "a,0,5;b,3,10");
    assert_eq!(read(&cfg, "a"), "short");

    // The freed tail is allocatable right away.
    assert_eq!(create(&cfg, "c", &"c".repeat(2048)), "SUCCESS:Created_at_Block_1");
}

#[test]
fn test_update_grow_moves_but_keeps_listing_order() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "a", &"a".repeat(10)); // block 0
    create(&cfg, "b", &"b".repeat(10)); // block 1

    assert_eq!(update(&cfg, "a", &"A".repeat(3000)), "SUCCESS:Updated_Content");
    // Moved past b, but still listed first.
    assert_eq!(list(&cfg), "a,2,3000;b,1,10");
    assert_eq!(read(&cfg, "a"), "A".repeat(3000));
    assert_eq!(read(&cfg, "b"), "b".repeat(10));
}

#[test]
fn test_update_grow_can_reclaim_own_blocks() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "only", &"x".repeat(10)); // block 0

    // The old range is released before the new one is allocated, so a
    // lone file grows in place.
    assert_eq!(update(&cfg, "only", &"y".repeat(2000)), "SUCCESS:Updated_Content");
    assert_eq!(list(&cfg), "only,0,2000");
}

#[test]
fn test_update_too_large_fails_without_losing_the_file() {
    let dir = TempDir::new().unwrap();
    let cfg = small_config(&dir); // 10 blocks of 4 bytes

    create(&cfg, "a", &"a".repeat(8));
    assert_eq!(update(&cfg, "a", &"x".repeat(100)), "ERROR:Out_Of_Space");

    // The persisted image still has the old content.
    assert_eq!(read(&cfg, "a"), "a".repeat(8));
    assert_eq!(list(&cfg), "a,0,8");
}

#[test]
fn test_empty_file_occupies_no_blocks() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    assert_eq!(create(&cfg, "empty", ""), "SUCCESS:Created_at_Block_0");
    assert_eq!(create(&cfg, "data", "abc"), "SUCCESS:Created_at_Block_0");
    assert_eq!(list(&cfg), "empty,0,0;data,0,3");
    assert_eq!(read(&cfg, "empty"), "");

    assert_eq!(update(&cfg, "data", ""), "SUCCESS:Updated_Content");
    assert_eq!(list(&cfg), "empty,0,0;data,0,0");
}

#[test]
fn test_duplicate_and_invalid_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    assert_eq!(create(&cfg, "a", "x"), "SUCCESS:Created_at_Block_0");
    assert_eq!(create(&cfg, "a", "y"), "ERROR:File_Exists");
    // The original content survives the rejected create.
    assert_eq!(read(&cfg, "a"), "x");

    for bad in ["", "a,b", "a;b", "a\nb", "a\rb"] {
        assert_eq!(create(&cfg, bad, "x"), "ERROR:Invalid_Name");
    }

    // 255 bytes is the longest accepted name.
    assert_eq!(create(&cfg, &"n".repeat(255), "x"), "SUCCESS:Created_at_Block_1");
    assert_eq!(create(&cfg, &"m".repeat(256), "x"), "ERROR:Invalid_Name");
}

#[test]
fn test_optimize_packs_files_and_preserves_content() {
    let dir = TempDir::new().unwrap();
    let cfg = small_config(&dir); // 10 blocks of 4 bytes

    create(&cfg, "a", &"a".repeat(8)); // blocks 0..2
    create(&cfg, "b", "bb"); // block 2
    delete(&cfg, "a");

    // Contiguous first-fit cannot use the leading fragment for three
    // blocks, so c lands after b.
    assert_eq!(create(&cfg, "c", &"c".repeat(12)), "SUCCESS:Created_at_Block_3");
    assert_eq!(list(&cfg), "b,2,2;c,3,12");

    assert_eq!(
        dispatch::run(&cfg, Command::Optimize),
        "SUCCESS:Defragmentation_Complete"
    );
    assert_eq!(list(&cfg), "b,0,2;c,1,12");
    assert_eq!(read(&cfg, "b"), "bb");
    assert_eq!(read(&cfg, "c"), "c".repeat(12));

    // Defragmentation makes the freed fragment usable as one run.
    assert_eq!(create(&cfg, "d", &"d".repeat(24)), "SUCCESS:Created_at_Block_4");
}

#[test]
fn test_optimize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "a", &"a".repeat(10));
    create(&cfg, "b", &"b".repeat(5000));
    delete(&cfg, "a");

    dispatch::run(&cfg, Command::Optimize);
    let once = list(&cfg);
    dispatch::run(&cfg, Command::Optimize);
    assert_eq!(list(&cfg), once);
}

#[test]
fn test_geometry_flags_apply_only_at_creation() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("vdisk.img");

    let small = EngineConfig::new(&image, Geometry::new(4, 10).unwrap());
    create(&small, "a", &"x".repeat(12));

    // Same image opened with different flags: the header wins, so the
    // 12-byte file still spans three 4-byte blocks.
    let other = EngineConfig::new(&image, Geometry::default());
    assert_eq!(list(&other), "a,0,12");
    assert_eq!(create(&other, "b", &"y".repeat(4)), "SUCCESS:Created_at_Block_3");
}

#[test]
fn test_read_only_commands_do_not_bump_the_image() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    create(&cfg, "a", "x");
    let before = std::fs::read(&cfg.image).unwrap();

    list(&cfg);
    read(&cfg, "a");
    read(&cfg, "ghost");

    assert_eq!(std::fs::read(&cfg.image).unwrap(), before);
}
