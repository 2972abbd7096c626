use dupeguard::duplicates::DuplicateFinder;
use dupeguard::quarantine::actionlog::ACTION_LOG_FILE;
use dupeguard::quarantine::batch::FILES_DIR;
use dupeguard::quarantine::journal::JOURNAL_FILE;
use dupeguard::quarantine::{
    inspect, list_batches, read_journal, Action, Layout, Outcome, QuarantineConfig,
    QuarantineError, QuarantineItem, QuarantineManager, RelocateError, Relocator,
    RenameRelocator, UndoEngine,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scan(root: &Path) -> Vec<QuarantineItem> {
    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[root.to_path_buf()])
        .unwrap();
    QuarantineItem::from_groups(&report.groups)
}

fn manager(root: &Path) -> QuarantineManager {
    QuarantineManager::new(QuarantineConfig::new(root.to_path_buf()))
}

/// Three copies of `doc.txt` under `scan`, with `A` the oldest directory.
fn three_copies(scan: &Path) -> [PathBuf; 3] {
    let paths = [
        scan.join("A").join("doc.txt"),
        scan.join("B").join("doc.txt"),
        scan.join("C").join("doc.txt"),
    ];
    for path in &paths {
        write(path, b"report body");
        sleep(Duration::from_millis(20));
    }
    paths
}

#[test]
fn test_quarantine_then_undo_round_trip() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let [a, b, c] = three_copies(scan_dir.path());

    let items = scan(scan_dir.path());
    assert_eq!(items.len(), 2);

    let report = manager(quarantine_dir.path()).quarantine(&items).unwrap();
    assert_eq!(report.moved.len(), 2);
    assert!(!report.has_failures());
    assert!(a.exists());
    assert!(!b.exists());
    assert!(!c.exists());

    // Both copies share a name, so the second lands on a suffixed path.
    let batch_dir = report.batch_dir.clone().unwrap();
    let files = batch_dir.join(FILES_DIR);
    assert!(files.join("doc.txt").exists());
    assert!(files.join("doc (1).txt").exists());
    let log = fs::read_to_string(batch_dir.join(ACTION_LOG_FILE)).unwrap();
    assert!(log.contains("finished: 2 moved, 0 failed, 0 skipped"));

    let undo = UndoEngine::new().undo(&batch_dir).unwrap();
    assert_eq!(undo.restored.len(), 2);
    assert!(undo.is_complete());
    assert_eq!(fs::read(&b).unwrap(), b"report body");
    assert_eq!(fs::read(&c).unwrap(), b"report body");
    assert!(!files.join("doc.txt").exists());
    assert!(!files.join("doc (1).txt").exists());

    let status = inspect(&batch_dir).unwrap();
    assert!(status.sealed);
    assert!(status.fully_restored());
}

#[test]
fn test_undo_reverses_in_descending_sequence() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    three_copies(scan_dir.path());

    let report = manager(quarantine_dir.path())
        .quarantine(&scan(scan_dir.path()))
        .unwrap();
    let batch_dir = report.batch_dir.unwrap();
    let undo = UndoEngine::new().undo(&batch_dir).unwrap();

    let origins: Vec<u64> = undo
        .restored
        .iter()
        .filter_map(|r| r.origin_seq)
        .collect();
    let mut expected: Vec<u64> = report.moved.iter().map(|r| r.seq).collect();
    expected.reverse();
    assert_eq!(origins, expected);
}

#[test]
fn test_undo_with_missing_quarantined_file() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    three_copies(scan_dir.path());

    let report = manager(quarantine_dir.path())
        .quarantine(&scan(scan_dir.path()))
        .unwrap();
    let lost = &report.moved[0];
    fs::remove_file(&lost.destination).unwrap();

    let undo = UndoEngine::new()
        .undo(report.batch_dir.as_ref().unwrap())
        .unwrap();

    assert_eq!(undo.restored.len(), 1);
    assert_eq!(undo.failed.len(), 1);
    assert_eq!(undo.failed[0].origin_seq, Some(lost.seq));
    assert!(undo.failed[0].reason.is_some());
    assert!(!lost.source.exists());
    assert!(report.moved[1].source.exists());
}

#[test]
fn test_undo_does_not_overwrite_new_file() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let [_, b, _] = three_copies(scan_dir.path());

    let report = manager(quarantine_dir.path())
        .quarantine(&scan(scan_dir.path()))
        .unwrap();
    write(&b, b"newer content");

    let undo = UndoEngine::new()
        .undo(report.batch_dir.as_ref().unwrap())
        .unwrap();

    assert_eq!(undo.restored.len(), 2);
    assert_eq!(undo.renamed, 1);
    assert_eq!(fs::read(&b).unwrap(), b"newer content");
    let restored = b.with_file_name("doc (restored 1).txt");
    assert_eq!(fs::read(&restored).unwrap(), b"report body");
}

#[test]
fn test_second_undo_is_a_no_op() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    three_copies(scan_dir.path());

    let report = manager(quarantine_dir.path())
        .quarantine(&scan(scan_dir.path()))
        .unwrap();
    let batch_dir = report.batch_dir.unwrap();

    let first = UndoEngine::new().undo(&batch_dir).unwrap();
    assert_eq!(first.restored.len(), 2);
    let second = UndoEngine::new().undo(&batch_dir).unwrap();
    assert!(second.restored.is_empty());
    assert_eq!(second.already_restored, 2);

    let restores = read_journal(&batch_dir.join(JOURNAL_FILE))
        .unwrap()
        .into_iter()
        .filter(|r| r.action == Action::Restore)
        .count();
    assert_eq!(restores, 2);
}

#[test]
fn test_vanished_source_fails_alone() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let [_, b, c] = three_copies(scan_dir.path());

    let items = scan(scan_dir.path());
    fs::remove_file(&b).unwrap();
    let report = manager(quarantine_dir.path()).quarantine(&items).unwrap();

    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, b);
    assert_eq!(report.failed[0].outcome, Outcome::Failed);
    assert!(!c.exists());

    let status = inspect(report.batch_dir.as_ref().unwrap()).unwrap();
    assert_eq!(status.quarantined, 1);
    assert_eq!(status.failed, 1);
}

#[test]
fn test_mirror_layout_keeps_structure() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let [_, b, _] = three_copies(scan_dir.path());

    let config = QuarantineConfig::new(quarantine_dir.path().to_path_buf()).with_layout(Layout::Mirror);
    let report = QuarantineManager::new(config)
        .quarantine(&scan(scan_dir.path()))
        .unwrap();

    let moved_b = report
        .moved
        .iter()
        .find(|r| r.source == b)
        .unwrap();
    assert!(moved_b.destination.ends_with(Path::new("B").join("doc.txt")));
    assert!(moved_b.destination.exists());
}

#[test]
fn test_batches_are_listed() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    three_copies(scan_dir.path());

    let report = manager(quarantine_dir.path())
        .quarantine(&scan(scan_dir.path()))
        .unwrap();

    let batches = list_batches(quarantine_dir.path()).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(Some(batches[0].id.clone()), report.batch_id);
    assert_eq!(batches[0].quarantined, 2);
    assert_eq!(batches[0].state(), "sealed");
}

#[test]
fn test_no_items_creates_no_batch() {
    let quarantine_dir = tempdir().unwrap();
    let report = manager(quarantine_dir.path()).quarantine(&[]).unwrap();
    assert!(report.batch_dir.is_none());
    assert!(list_batches(quarantine_dir.path()).unwrap().is_empty());
}

#[test]
fn test_same_root_spelled_twice_moves_nothing() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let only = scan_dir.path().join("A").join("doc.txt");
    write(&only, b"the only copy");

    let roots = vec![
        scan_dir.path().to_path_buf(),
        scan_dir.path().join("A").join(".."),
    ];
    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&roots)
        .unwrap();
    let items = QuarantineItem::from_groups(&report.groups);
    assert!(items.is_empty());

    let outcome = manager(quarantine_dir.path()).quarantine(&items).unwrap();
    assert!(outcome.moved.is_empty());
    assert_eq!(fs::read(&only).unwrap(), b"the only copy");
}

#[cfg(unix)]
#[test]
fn test_relative_root_is_journaled_with_absolute_sources() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let [_, b, c] = three_copies(scan_dir.path());

    // Spell the scan root relative to the test's working directory.
    let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
    let target = scan_dir.path().canonicalize().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    let relative = relative.join(target.strip_prefix("/").unwrap());
    assert!(relative.is_relative());

    let items = scan(&relative);
    assert_eq!(items.len(), 2);
    let report = manager(quarantine_dir.path()).quarantine(&items).unwrap();
    let batch_dir = report.batch_dir.unwrap();

    let records = read_journal(&batch_dir.join(JOURNAL_FILE)).unwrap();
    let sources: Vec<_> = records.iter().map(|r| r.source.clone()).collect();
    assert!(sources.iter().all(|p| p.is_absolute()));
    assert!(sources.contains(&target.join("B").join("doc.txt")));
    assert!(sources.contains(&target.join("C").join("doc.txt")));

    UndoEngine::new().undo(&batch_dir).unwrap();
    assert!(b.exists());
    assert!(c.exists());
}

#[cfg(unix)]
#[test]
fn test_non_utf8_name_is_quarantined_and_restored() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let paths = [
        scan_dir.path().join("a.txt"),
        scan_dir.path().join(OsStr::from_bytes(b"caf\xff.txt")),
        scan_dir.path().join("c.txt"),
    ];
    for path in &paths {
        write(path, b"x");
    }
    let items: Vec<_> = paths.iter().cloned().map(QuarantineItem::new).collect();

    let report = manager(quarantine_dir.path()).quarantine(&items).unwrap();
    assert_eq!(report.moved.len(), 3);
    assert!(paths.iter().all(|p| !p.exists()));

    let batch_dir = report.batch_dir.unwrap();
    let records = read_journal(&batch_dir.join(JOURNAL_FILE)).unwrap();
    assert_eq!(records[1].source, paths[1]);
    assert!(inspect(&batch_dir).unwrap().sealed);

    let undo = UndoEngine::new().undo(&batch_dir).unwrap();
    assert!(undo.is_complete());
    assert!(paths.iter().all(|p| p.exists()));
}

/// Moves normally, but deletes the batch journal after the first move.
struct LosesJournal;

impl Relocator for LosesJournal {
    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), RelocateError> {
        RenameRelocator.relocate(src, dst)?;
        let batch_dir = dst.parent().and_then(Path::parent).unwrap();
        let _ = fs::remove_file(batch_dir.join(JOURNAL_FILE));
        Ok(())
    }
}

#[test]
fn test_journal_failure_stops_the_batch() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let paths: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|name| scan_dir.path().join(name))
        .collect();
    for path in &paths {
        write(path, b"x");
    }
    let items: Vec<_> = paths.iter().cloned().map(QuarantineItem::new).collect();

    let manager = QuarantineManager::new(
        QuarantineConfig::new(quarantine_dir.path().to_path_buf())
            .with_relocator(Arc::new(LosesJournal)),
    );
    let err = manager.quarantine(&items).unwrap_err();
    assert!(matches!(err, QuarantineError::Journal(_)));

    assert!(!paths[0].exists());
    assert!(paths[1].exists());
    assert!(paths[2].exists());
}
