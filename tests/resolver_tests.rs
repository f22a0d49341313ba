// Tests for parent-chain path resolution

use drift::index::{Digests, FileIndex, FileRecord, PathResolver, RootPolicy, StatInfo};
use drift::SyncError;

fn dir(path: &str, id: &str, parent: Option<&str>) -> FileRecord {
    let mut record = FileRecord::from_parts(path, None, Digests::default(), StatInfo::default())
        .with_backend_id(id);
    if let Some(parent) = parent {
        record = record.with_parent_id(parent);
    }
    record
}

fn file(name: &str, id: &str, parent: &str) -> FileRecord {
    FileRecord::from_parts(
        name,
        Some(format!("drive://{}", id)),
        Digests::from_md5("h1"),
        StatInfo::new(10, 1000),
    )
    .with_backend_id(id)
    .with_parent_id(parent)
}

fn resolver() -> PathResolver {
    PathResolver::new(
        RootPolicy::new("/home/user/drive")
            .with_root_ids(&["root"])
            .with_drive_root_name("My Drive"),
    )
}

fn no_fetch(id: &str) -> Result<Option<FileRecord>, SyncError> {
    panic!("unexpected fetch of {}", id);
}

#[test]
fn test_resolve_through_known_ancestors() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("My Drive", "root-dir", None).with_is_root(true))
        .unwrap();
    index
        .insert_directory(dir("docs", "dir-docs", Some("root-dir")))
        .unwrap();
    index
        .insert_directory(dir("2024", "dir-2024", Some("dir-docs")))
        .unwrap();

    let record = file("notes.txt", "file-1", "dir-2024");
    let path = resolver()
        .resolve(&mut index, &record, &mut no_fetch)
        .unwrap();
    assert_eq!(path, "/home/user/drive/docs/2024/notes.txt");
}

#[test]
fn test_resolve_stops_at_root_sentinel_id() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("docs", "dir-docs", Some("root")))
        .unwrap();

    let record = file("notes.txt", "file-1", "dir-docs");
    let path = resolver()
        .resolve(&mut index, &record, &mut no_fetch)
        .unwrap();
    assert_eq!(path, "/home/user/drive/docs/notes.txt");
}

#[test]
fn test_resolve_fetches_missing_ancestor_once() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("docs", "dir-docs", Some("dir-missing")))
        .unwrap();

    let mut fetches = Vec::new();
    let mut fetch = |id: &str| {
        fetches.push(id.to_string());
        Ok(Some(dir("archive", "dir-missing", Some("root"))))
    };

    let record = file("old.txt", "file-1", "dir-docs");
    let path = resolver().resolve(&mut index, &record, &mut fetch).unwrap();
    assert_eq!(path, "/home/user/drive/archive/docs/old.txt");
    assert_eq!(fetches, vec!["dir-missing"]);

    // the fetched ancestor is now indexed: a second resolution reuses it
    let record2 = file("new.txt", "file-2", "dir-docs");
    let path2 = resolver()
        .resolve(&mut index, &record2, &mut |id| {
            panic!("refetched {}", id);
        })
        .unwrap();
    assert_eq!(path2, "/home/user/drive/archive/docs/new.txt");
}

#[test]
fn test_unresolvable_ancestor_is_orphaned_not_truncated() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("docs", "dir-docs", Some("dir-deleted")))
        .unwrap();

    let record = file("notes.txt", "file-1", "dir-docs");
    let err = resolver()
        .resolve(&mut index, &record, &mut |_| Ok(None))
        .unwrap_err();
    match err {
        SyncError::OrphanedRecord { id, .. } => assert_eq!(id, "dir-deleted"),
        other => panic!("expected OrphanedRecord, got {:?}", other),
    }
}

#[test]
fn test_parent_cycle_is_orphaned_not_infinite() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("a", "dir-a", Some("dir-b")))
        .unwrap();
    index
        .insert_directory(dir("b", "dir-b", Some("dir-a")))
        .unwrap();

    let record = file("looped.txt", "file-1", "dir-a");
    let err = resolver()
        .resolve(&mut index, &record, &mut no_fetch)
        .unwrap_err();
    assert!(matches!(err, SyncError::OrphanedRecord { .. }));
}

#[test]
fn test_drive_root_name_is_rewritten_to_base_dir() {
    let mut index = FileIndex::new();
    index
        .insert_directory(dir("My Drive", "root-dir", None))
        .unwrap();

    let record = file("top.txt", "file-1", "root-dir");
    let path = resolver()
        .resolve(&mut index, &record, &mut no_fetch)
        .unwrap();
    assert_eq!(path, "/home/user/drive/top.txt");
}

#[test]
fn test_record_without_parent_resolves_under_base_dir() {
    let mut index = FileIndex::new();
    let record = FileRecord::from_parts(
        "loose.txt",
        None,
        Digests::from_md5("h1"),
        StatInfo::new(1, 1),
    );
    let path = resolver()
        .resolve(&mut index, &record, &mut no_fetch)
        .unwrap();
    assert_eq!(path, "/home/user/drive/loose.txt");
}
