//! Extraction driver behavior: sinks, password loop, corruption policy.

mod common;

use std::path::Path;

use kovcheg_common::CancelFlag;
use kovcheg_zip::{
    extract_all, Decision, DecisionSink, ExtractOptions, FixedDecisions, NullProgress,
    PasswordReply, ProgressSink, Prompt, VolumeAction, VolumeProvider, ZipArchive,
};

use common::{archive_file, sample_data, Spec};

struct ScriptedSink {
    passwords: Vec<Vec<u8>>,
    prompts: usize,
}

impl DecisionSink for ScriptedSink {
    fn resolve(&mut self, _prompt: Prompt<'_>) -> Decision {
        self.prompts += 1;
        Decision::Skip
    }

    fn request_password(&mut self, _entry_name: &str, _first_attempt: bool) -> PasswordReply {
        match self.passwords.pop() {
            Some(p) => PasswordReply::Password(p),
            None => PasswordReply::Skip,
        }
    }
}

struct CountingProgress {
    reports: usize,
    last: (u64, u64),
}

impl ProgressSink for CountingProgress {
    fn report_progress(&mut self, bytes_done: u64, bytes_total: u64) {
        self.reports += 1;
        self.last = (bytes_done, bytes_total);
    }
}

#[test]
fn test_extract_all_plain_entries() {
    let specs = vec![
        Spec::stored("a/empty.bin", Vec::new()),
        Spec::deflated("a/data.bin", sample_data(40_000)),
        Spec::stored("top.txt", sample_data(64)),
    ];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: false,
    };
    let mut progress = CountingProgress {
        reports: 0,
        last: (0, 0),
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut progress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.extracted, 3);
    assert_eq!(report.skipped, 0);
    assert!(report.failed.is_empty());

    assert_eq!(
        std::fs::read(dest.path().join("a/data.bin")).unwrap(),
        sample_data(40_000)
    );
    assert_eq!(
        std::fs::read(dest.path().join("a/empty.bin")).unwrap(),
        Vec::<u8>::new()
    );

    assert!(progress.reports > 0);
    let (done, total) = progress.last;
    assert_eq!(done, total);
    assert_eq!(total, 40_000 + 64);
}

#[test]
fn test_password_loop_retries_until_correct() {
    let specs = vec![Spec::deflated("locked.bin", sample_data(500)).encrypted(b"sesame")];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();

    let archive = ZipArchive::open(file.path()).unwrap();
    // Popped back to front: two wrong guesses, then the right one.
    let mut decisions = ScriptedSink {
        passwords: vec![b"sesame".to_vec(), b"guess2".to_vec(), b"guess1".to_vec()],
        prompts: 0,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.extracted, 1);
    assert!(decisions.passwords.is_empty());
    assert_eq!(
        std::fs::read(dest.path().join("locked.bin")).unwrap(),
        sample_data(500)
    );
}

#[test]
fn test_wrong_password_exhausted_skips_entry() {
    let specs = vec![
        Spec::deflated("locked.bin", sample_data(100)).encrypted(b"right"),
        Spec::stored("open.txt", sample_data(10)),
    ];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = ScriptedSink {
        passwords: vec![b"wrong".to_vec()],
        prompts: 0,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped, 1);
    assert!(!Path::new(&dest.path().join("locked.bin")).exists());
    assert!(dest.path().join("open.txt").exists());
}

#[test]
fn test_existing_file_skipped_without_overwrite() {
    let specs = vec![Spec::stored("keep.txt", sample_data(32))];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();

    std::fs::write(dest.path().join("keep.txt"), b"pre-existing").unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: false,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(
        std::fs::read(dest.path().join("keep.txt")).unwrap(),
        b"pre-existing"
    );
}

#[test]
fn test_overwrite_all_replaces_existing_files() {
    let specs = vec![Spec::stored("keep.txt", sample_data(32))];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();

    std::fs::write(dest.path().join("keep.txt"), b"old").unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: true,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(
        std::fs::read(dest.path().join("keep.txt")).unwrap(),
        sample_data(32)
    );
}

#[test]
fn test_corrupt_entry_continues_with_remaining() {
    let specs = vec![
        Spec::deflated("bad.bin", sample_data(2_000)),
        Spec::stored("good.txt", sample_data(20)),
    ];
    let mut bytes = common::build_archive(&specs, b"");

    // Flip a byte inside the first entry's deflate stream. The local
    // header for "bad.bin" ends at 30 + name, data follows.
    let data_start = 30 + "bad.bin".len();
    bytes[data_start + 40] ^= 0xFF;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &bytes).unwrap();

    let dest = tempfile::tempdir().unwrap();
    let cancel = CancelFlag::new();
    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: false,
    };

    // A flipped byte either breaks the deflate stream or survives decode
    // and fails the checksum; both count as per-entry corruption and
    // must not stop the remaining entries.
    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad.bin");
    assert_eq!(report.extracted, 1);
    assert_eq!(
        std::fs::read(dest.path().join("good.txt")).unwrap(),
        sample_data(20)
    );
}

#[test]
fn test_cancellation_before_start() {
    let specs = vec![Spec::stored("x.txt", sample_data(10))];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: false,
    };

    let err = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &cancel,
    )
    .unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_one_provider_serves_every_entry() {
    struct NoVolumes;
    impl VolumeProvider for NoVolumes {
        fn request_volume(&mut self, _n: u32, _first: bool) -> std::io::Result<VolumeAction> {
            Ok(VolumeAction::Abort)
        }
    }

    let specs = vec![
        Spec::stored("one.txt", sample_data(8)),
        Spec::stored("two.txt", sample_data(8)),
        Spec::deflated("three.bin", sample_data(1_000)),
    ];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: true,
    };
    // The single-volume archive never consults the provider; the same
    // instance must still be usable for every entry of the walk.
    let mut provider = NoVolumes;

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        Some(&mut provider),
        &ExtractOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(report.extracted, 3);
    assert!(report.failed.is_empty());
}

#[test]
fn test_blocked_parent_directory_skips_entry() {
    let specs = vec![
        Spec::stored("blocked/inner.txt", sample_data(8)),
        Spec::stored("ok.txt", sample_data(8)),
    ];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();

    // A plain file where the first entry's parent directory must go.
    std::fs::write(dest.path().join("blocked"), b"in the way").unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: true,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        std::fs::read(dest.path().join("ok.txt")).unwrap(),
        sample_data(8)
    );
    assert_eq!(
        std::fs::read(dest.path().join("blocked")).unwrap(),
        b"in the way"
    );
}

#[test]
fn test_blocked_directory_entry_skips_and_continues() {
    let specs = vec![
        Spec::stored("sub/", Vec::new()),
        Spec::stored("top.txt", sample_data(4)),
    ];
    let file = archive_file(&specs, b"");
    let dest = tempfile::tempdir().unwrap();

    std::fs::write(dest.path().join("sub"), b"file").unwrap();

    let archive = ZipArchive::open(file.path()).unwrap();
    let mut decisions = FixedDecisions {
        password: None,
        overwrite: true,
    };

    let report = extract_all(
        &archive,
        dest.path(),
        &mut decisions,
        &mut NullProgress,
        None,
        &ExtractOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();

    assert_eq!(report.extracted, 1);
    assert_eq!(report.skipped, 1);
    assert!(dest.path().join("top.txt").exists());
}
