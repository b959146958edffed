//! Deletion and rewrite behavior over real files.

mod common;

use kovcheg_common::CancelFlag;
use kovcheg_zip::{delete_entries, CompressionMethod, DeleteOptions, Error, ZipArchive};

use common::{archive_file, build_archive, sample_data, Spec};

fn three_entry_specs() -> Vec<Spec> {
    vec![
        Spec::stored("empty.bin", Vec::new()),
        Spec::deflated("notes/readme.txt", sample_data(120)),
        Spec::deflated("notes/secret.dat", sample_data(40_000)).encrypted(b"hunter2"),
    ]
}

#[test]
fn test_delete_middle_entry_keeps_others_byte_identical() {
    let file = archive_file(&three_entry_specs(), b"");
    let cancel = CancelFlag::new();

    let report = delete_entries(
        file.path(),
        &["notes/readme.txt"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();
    assert_eq!(report.deleted, vec!["notes/readme.txt".to_string()]);
    assert!(report.unmatched.is_empty());

    let archive = ZipArchive::open(file.path()).unwrap();
    let names: Vec<_> = archive.entries().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["empty.bin", "notes/secret.dat"]);

    // Retained entries decode with their original checksums.
    let empty = archive.find("empty.bin").unwrap();
    assert_eq!(archive.read(empty, None, &cancel).unwrap(), Vec::<u8>::new());

    let secret = archive.find("notes/secret.dat").unwrap();
    let data = archive.read(secret, Some(b"hunter2"), &cancel).unwrap();
    assert_eq!(data, sample_data(40_000));
}

#[test]
fn test_delete_encrypted_entry_in_place_without_backup() {
    // The end-to-end scenario: 0, 120 and 40000 byte entries, one
    // stored, two deflated, one encrypted; the encrypted one goes away
    // in place and the rest must extract bit-exact afterwards.
    let file = archive_file(&three_entry_specs(), b"");
    let cancel = CancelFlag::new();

    let options = DeleteOptions {
        use_backup: false,
        preserve_empty_root: false,
    };
    let report =
        delete_entries(file.path(), &["NOTES/SECRET.DAT"], &options, &cancel).unwrap();
    assert_eq!(report.deleted, vec!["notes/secret.dat".to_string()]);

    let archive = ZipArchive::open(file.path()).unwrap();
    assert_eq!(archive.entry_count(), 2);

    let readme = archive.find("notes/readme.txt").unwrap();
    assert_eq!(
        archive.read(readme, None, &cancel).unwrap(),
        sample_data(120)
    );
    assert_eq!(archive.read(archive.find("empty.bin").unwrap(), None, &cancel).unwrap(), b"");
}

#[test]
fn test_retained_raw_ranges_are_byte_identical() {
    let specs = three_entry_specs();
    let original = build_archive(&specs, b"");
    let file = archive_file(&specs, b"");
    let cancel = CancelFlag::new();

    // Raw compressed bytes of the encrypted entry in the original.
    let before = ZipArchive::open(file.path()).unwrap();
    let entry = before.find("notes/secret.dat").unwrap().clone();
    let view =
        kovcheg_zip::LocalHeaderView::parse(&original, entry.local_header_offset() as u64).unwrap();
    let raw = original[view.data_offset as usize
        ..view.data_offset as usize + entry.compressed_size() as usize]
        .to_vec();
    drop(before);

    delete_entries(
        file.path(),
        &["empty.bin"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();

    let after = ZipArchive::open(file.path()).unwrap();
    let moved = after.find("notes/secret.dat").unwrap();
    assert_eq!(moved.crc32(), entry.crc32());
    assert_eq!(moved.compressed_size(), entry.compressed_size());

    let view = kovcheg_zip::LocalHeaderView::parse(
        after.data(),
        moved.local_header_offset() as u64,
    )
    .unwrap();
    let moved_raw = &after.data()[view.data_offset as usize
        ..view.data_offset as usize + moved.compressed_size() as usize];
    assert_eq!(moved_raw, raw, "compressed bytes were altered by the move");
}

#[test]
fn test_unmatched_names_are_reported_not_fatal() {
    let file = archive_file(&three_entry_specs(), b"");
    let original = std::fs::read(file.path()).unwrap();
    let cancel = CancelFlag::new();

    let report = delete_entries(
        file.path(),
        &["absent.txt", "also/absent"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.unmatched.len(), 2);

    // Nothing matched, so the file must be untouched.
    assert_eq!(std::fs::read(file.path()).unwrap(), original);
}

#[test]
fn test_delete_is_idempotent_for_absent_names() {
    let file = archive_file(&three_entry_specs(), b"");
    let cancel = CancelFlag::new();

    delete_entries(
        file.path(),
        &["empty.bin"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();
    let after_first = std::fs::read(file.path()).unwrap();

    let report = delete_entries(
        file.path(),
        &["empty.bin"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();
    assert_eq!(report.unmatched, vec!["empty.bin".to_string()]);
    assert_eq!(std::fs::read(file.path()).unwrap(), after_first);
}

#[test]
fn test_comment_survives_rewrite() {
    let file = archive_file(&three_entry_specs(), b"release build 42");
    let cancel = CancelFlag::new();

    delete_entries(
        file.path(),
        &["empty.bin"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    assert_eq!(archive.comment(), b"release build 42");
}

#[test]
fn test_preserve_empty_root_synthesizes_directory_entry() {
    let specs = vec![
        Spec::stored("pkg/a.txt", sample_data(16)),
        Spec::stored("pkg/b.txt", sample_data(24)),
    ];
    let file = archive_file(&specs, b"");
    let cancel = CancelFlag::new();

    let options = DeleteOptions {
        use_backup: true,
        preserve_empty_root: true,
    };
    delete_entries(file.path(), &["pkg/a.txt", "pkg/b.txt"], &options, &cancel).unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    assert_eq!(archive.entry_count(), 1);
    let root = &archive.entries()[0];
    assert_eq!(root.name(), "pkg/");
    assert!(root.is_dir());
    assert_eq!(root.uncompressed_size(), 0);
    assert_eq!(root.method(), CompressionMethod::Store);
}

#[test]
fn test_deleting_everything_leaves_empty_archive() {
    let specs = vec![Spec::stored("only.txt", sample_data(8))];
    let file = archive_file(&specs, b"");
    let cancel = CancelFlag::new();

    delete_entries(
        file.path(),
        &["only.txt"],
        &DeleteOptions::default(),
        &cancel,
    )
    .unwrap();

    assert!(matches!(
        ZipArchive::open(file.path()),
        Err(Error::EmptyArchive)
    ));
}
