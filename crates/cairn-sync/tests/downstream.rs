mod common;

use cairn_store::SyncState;
use cairn_sync::{LocalNote, SyncEngine};
use common::{MemoryRemote, read_file, workspace, write_file};
use std::fs;

#[test]
fn pulls_notes_with_header_and_records_versions() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note(
        "20-projects/20.01-garden.md",
        "20.01",
        "Garden",
        "# Garden\n\nPlant tomatoes.\n",
        2,
    );
    remote.seed_note("50-events/trip/day-one.md", "50.00", "Day One", "Left early.\n", 1);

    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    let report = SyncEngine::new(&remote, &init.paths)
        .sync_down(&mut state, false)
        .expect("sync down");

    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(report.errors, 0);

    let raw = read_file(&init.paths.root.join("20-projects/20.01-garden.md"));
    assert!(raw.starts_with("---\njdId: \"20.01\"\ntitle: \"Garden\"\nversion: 2\nsynced_at: "));
    assert!(raw.ends_with("---\n\n# Garden\n\nPlant tomatoes.\n"));

    let nested = LocalNote::read(
        &init.paths.root.join("50-events/trip/day-one.md"),
        "50-events/trip/day-one.md",
    )
    .expect("nested note");
    assert_eq!(nested.header.version(), Some(1));
    assert_eq!(nested.body, "Left early.\n");

    let reloaded = SyncState::from_workspace(&init.paths).expect("reload");
    assert_eq!(reloaded.version_of("20-projects/20.01-garden.md"), Some(2));
    assert_eq!(reloaded.version_of("50-events/trip/day-one.md"), Some(1));
    assert!(reloaded.last_sync.is_some());
}

#[test]
fn second_pull_without_remote_changes_writes_nothing() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("60-ideas/a.md", "60.00", "A", "alpha", 1);
    remote.seed_note("60-ideas/b.md", "60.00", "B", "beta", 4);

    let engine = SyncEngine::new(&remote, &init.paths);
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    engine.sync_down(&mut state, false).expect("first pull");

    let note_path = init.paths.root.join("60-ideas/a.md");
    fs::write(&note_path, "local scribble").expect("edit locally");

    let report = engine.sync_down(&mut state, false).expect("second pull");
    assert_eq!(report.skipped, 2);
    assert_eq!(report.created + report.updated + report.removed, 0);
    assert_eq!(read_file(&note_path), "local scribble");
    assert_eq!(state.version_of("60-ideas/b.md"), Some(4));
}

#[test]
fn newer_remote_version_overwrites_local_copy() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("60-ideas/a.md", "60.00", "A", "v1", 1);

    let engine = SyncEngine::new(&remote, &init.paths);
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    engine.sync_down(&mut state, false).expect("first pull");

    remote.seed_note("60-ideas/a.md", "60.00", "A", "v2", 2);
    let report = engine.sync_down(&mut state, false).expect("second pull");

    assert_eq!(report.updated, 1);
    assert!(read_file(&init.paths.root.join("60-ideas/a.md")).ends_with("\n\nv2"));
    assert_eq!(state.version_of("60-ideas/a.md"), Some(2));
}

#[test]
fn notes_deleted_remotely_are_removed_locally() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("30-people/ada.md", "30.00", "Ada", "a", 1);
    remote.seed_note("30-people/bob.md", "30.00", "Bob", "b", 1);

    let engine = SyncEngine::new(&remote, &init.paths);
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    engine.sync_down(&mut state, false).expect("first pull");

    remote.remove_note("30-people/bob.md");
    let report = engine.sync_down(&mut state, false).expect("second pull");

    assert_eq!(report.removed, 1);
    assert!(!init.paths.root.join("30-people/bob.md").exists());
    assert!(init.paths.root.join("30-people/ada.md").exists());
    assert_eq!(state.version_of("30-people/bob.md"), None);
    assert_eq!(
        SyncState::from_workspace(&init.paths)
            .expect("reload")
            .version_of("30-people/bob.md"),
        None
    );
}

#[test]
fn orphan_entry_without_local_file_is_dropped_silently() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("30-people/ada.md", "30.00", "Ada", "a", 1);

    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    state.record("30-people/ghost.md", 3);

    let report = SyncEngine::new(&remote, &init.paths)
        .sync_down(&mut state, false)
        .expect("pull");

    assert_eq!(report.removed, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(state.version_of("30-people/ghost.md"), None);
}

#[test]
fn empty_remote_listing_changes_nothing() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();

    let note_path = init.paths.root.join("10-reference/keep.md");
    write_file(&note_path, "precious");
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    state.record("10-reference/keep.md", 5);

    let report = SyncEngine::new(&remote, &init.paths)
        .sync_down(&mut state, false)
        .expect("pull");

    assert_eq!(report.remote_notes, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(read_file(&note_path), "precious");
    assert_eq!(state.version_of("10-reference/keep.md"), Some(5));
    assert!(!init.paths.sync_state_path.exists());
}

#[test]
fn force_rewrites_every_note() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("70-home/a.md", "70.00", "A", "remote a", 1);
    remote.seed_note("70-home/b.md", "70.00", "B", "remote b", 1);

    let engine = SyncEngine::new(&remote, &init.paths);
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    engine.sync_down(&mut state, false).expect("first pull");

    let edited = init.paths.root.join("70-home/a.md");
    fs::write(&edited, "local edit").expect("edit");

    let report = engine.sync_down(&mut state, true).expect("forced pull");
    assert_eq!(report.updated, 2);
    assert_eq!(report.skipped, 0);
    assert!(read_file(&edited).ends_with("\n\nremote a"));
}

#[test]
fn failed_write_keeps_previous_entry_and_continues() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("40-media/blocked.md", "40.00", "Blocked", "v1", 1);
    remote.seed_note("40-media/fine.md", "40.00", "Fine", "v1", 1);

    let engine = SyncEngine::new(&remote, &init.paths);
    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    engine.sync_down(&mut state, false).expect("first pull");

    // A directory where the note should be makes the write fail.
    let blocked = init.paths.root.join("40-media/blocked.md");
    fs::remove_file(&blocked).expect("remove note");
    fs::create_dir_all(&blocked).expect("block path");

    remote.seed_note("40-media/blocked.md", "40.00", "Blocked", "v2", 2);
    remote.seed_note("40-media/fine.md", "40.00", "Fine", "v2", 2);

    let report = engine.sync_down(&mut state, false).expect("second pull");
    assert_eq!(report.errors, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failures[0].path, "40-media/blocked.md");
    assert_eq!(state.version_of("40-media/blocked.md"), Some(1));
    assert_eq!(state.version_of("40-media/fine.md"), Some(2));
}

#[test]
fn remote_paths_escaping_the_workspace_are_rejected() {
    let (temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("../outside.md", "00.00", "Evil", "x", 1);
    remote.seed_note("00-index/ok.md", "00.00", "Ok", "fine", 1);

    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    let report = SyncEngine::new(&remote, &init.paths)
        .sync_down(&mut state, false)
        .expect("pull");

    assert_eq!(report.errors, 1);
    assert_eq!(report.created, 1);
    assert!(!temp.path().join("outside.md").exists());
    assert_eq!(state.version_of("../outside.md"), None);
}

#[test]
fn untracked_remote_note_is_created_at_its_remote_version() {
    let (_temp, init) = workspace();
    let remote = MemoryRemote::new();
    remote.seed_note("20-projects/a.md", "20.00", "A", "alpha\n", 3);

    let mut state = SyncState::from_workspace(&init.paths).expect("state");
    assert_eq!(state.version_of("20-projects/a.md"), None);

    let report = SyncEngine::new(&remote, &init.paths)
        .sync_down(&mut state, false)
        .expect("pull");

    assert_eq!(report.created, 1);
    let note = LocalNote::read(&init.paths.root.join("20-projects/a.md"), "20-projects/a.md")
        .expect("read note");
    assert_eq!(note.header.version(), Some(3));
    assert_eq!(
        SyncState::from_workspace(&init.paths)
            .expect("reload")
            .version_of("20-projects/a.md"),
        Some(3)
    );
}
