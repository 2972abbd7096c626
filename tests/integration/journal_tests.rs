use dupeguard::quarantine::journal::{read_journal_raw, NewOperation, JOURNAL_FILE};
use dupeguard::quarantine::{
    inspect, read_journal, Action, Batch, Outcome, QuarantineConfig, QuarantineItem,
    QuarantineManager, UndoEngine,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn quarantine_op(source: &Path, destination: &Path) -> NewOperation {
    NewOperation {
        action: Action::Quarantine,
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        origin_seq: None,
        size: None,
        digest: None,
    }
}

#[test]
fn test_every_move_is_journaled_before_and_after() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let files: Vec<PathBuf> = ["one.txt", "two.txt", "three.txt"]
        .iter()
        .map(|name| scan_dir.path().join(name))
        .collect();
    for file in &files {
        write(file, b"x");
    }
    let items: Vec<QuarantineItem> = files.iter().cloned().map(QuarantineItem::new).collect();

    let report = QuarantineManager::new(QuarantineConfig::new(quarantine_dir.path().to_path_buf()))
        .quarantine(&items)
        .unwrap();
    let journal = report.batch_dir.unwrap().join(JOURNAL_FILE);

    let raw = read_journal_raw(&journal).unwrap();
    assert_eq!(raw.len(), 6);
    for pair in raw.chunks(2) {
        assert_eq!(pair[0].seq, pair[1].seq);
        assert_eq!(pair[0].outcome, Outcome::Pending);
        assert_eq!(pair[1].outcome, Outcome::Ok);
    }

    let seqs: Vec<u64> = read_journal(&journal).unwrap().iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    let sources: Vec<PathBuf> = read_journal(&journal)
        .unwrap()
        .into_iter()
        .map(|r| r.source)
        .collect();
    assert_eq!(sources, files);
}

#[test]
fn test_crash_after_move_is_recovered_by_undo() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let moved = scan_dir.path().join("moved.txt");
    let untouched = scan_dir.path().join("untouched.txt");
    write(&moved, b"moved");
    write(&untouched, b"untouched");

    let batch_dir = {
        let mut batch = Batch::create(quarantine_dir.path()).unwrap();
        let files = batch.files_dir();

        // Crash after the rename, before the outcome line.
        let first = batch
            .journal_mut()
            .begin(quarantine_op(&moved, &files.join("moved.txt")))
            .unwrap();
        fs::rename(&moved, &first.record().destination).unwrap();

        // Crash before the rename.
        let _second = batch
            .journal_mut()
            .begin(quarantine_op(&untouched, &files.join("untouched.txt")))
            .unwrap();

        batch.dir().to_path_buf()
    };

    let status = inspect(&batch_dir).unwrap();
    assert_eq!(status.pending, 2);
    assert!(!status.sealed);
    assert_eq!(status.state(), "incomplete");

    let undo = UndoEngine::new().undo(&batch_dir).unwrap();
    assert_eq!(undo.restored.len(), 1);
    assert_eq!(undo.unresolved.len(), 1);
    assert_eq!(undo.unresolved[0].source, untouched);
    assert!(!undo.is_complete());
    assert_eq!(fs::read(&moved).unwrap(), b"moved");
    assert!(untouched.exists());
}

#[test]
fn test_torn_last_line_is_ignored() {
    let scan_dir = tempdir().unwrap();
    let quarantine_dir = tempdir().unwrap();
    let file = scan_dir.path().join("a.bin");
    write(&file, b"abc");

    let report = QuarantineManager::new(QuarantineConfig::new(quarantine_dir.path().to_path_buf()))
        .quarantine(&[QuarantineItem::new(file.clone())])
        .unwrap();
    let batch_dir = report.batch_dir.unwrap();

    let mut journal = OpenOptions::new()
        .append(true)
        .open(batch_dir.join(JOURNAL_FILE))
        .unwrap();
    journal.write_all(b"{\"batch_id\":\"x\",\"seq\":9").unwrap();
    drop(journal);

    let records = read_journal(&batch_dir.join(JOURNAL_FILE)).unwrap();
    assert_eq!(records.len(), 1);

    let undo = UndoEngine::new().undo(&batch_dir).unwrap();
    assert_eq!(undo.restored.len(), 1);
    assert!(file.exists());

    let records = read_journal(&batch_dir.join(JOURNAL_FILE)).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].action, Action::Restore);
}

#[test]
fn test_corrupt_complete_line_is_an_error() {
    let quarantine_dir = tempdir().unwrap();
    let batch_dir = quarantine_dir.path().join("broken");
    write(&batch_dir.join(JOURNAL_FILE), b"not json\n");

    assert!(read_journal(&batch_dir.join(JOURNAL_FILE)).is_err());
    assert!(UndoEngine::new().undo(&batch_dir).is_err());
}
