use dupeguard::duplicates::{DuplicateFinder, FinderConfig, FinderError, Role, WarningKind};
use dupeguard::scanner::WalkerConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// `A` is created (and written) strictly before `B`.
fn older_and_newer(root: &Path) -> (PathBuf, PathBuf) {
    let a = root.join("A");
    let b = root.join("B");
    write(&a.join("doc.txt"), b"same bytes");
    sleep(Duration::from_millis(50));
    write(&b.join("doc.txt"), b"same bytes");
    (a, b)
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.summary.total_files, 0);
    assert_eq!(report.summary.duplicate_groups, 0);
}

#[test]
fn test_original_in_older_directory() {
    let dir = tempdir().unwrap();
    let (a, b) = older_and_newer(dir.path());

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.len(), 2);
    assert_eq!(group.original().record.path, a.join("doc.txt"));
    let copies: Vec<_> = group.copies().collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].record.path, b.join("doc.txt"));
    assert_eq!(copies[0].role, Role::Copy);
    assert_eq!(report.summary.total_duplicate_size, 10);
}

#[test]
fn test_classification_is_stable_across_runs() {
    let dir = tempdir().unwrap();
    older_and_newer(dir.path());
    write(&dir.path().join("C").join("doc.txt"), b"same bytes");

    let finder = DuplicateFinder::with_defaults();
    let first = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();
    let second = finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(first.groups, second.groups);
}

#[test]
fn test_name_and_digest_must_both_match() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("x").join("a.txt"), b"identical");
    write(&dir.path().join("y").join("b.txt"), b"identical");
    write(&dir.path().join("x").join("same.txt"), b"one");
    write(&dir.path().join("y").join("same.txt"), b"two");

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.summary.total_files, 4);
}

#[test]
fn test_multiple_roots_and_overlap() {
    let dir = tempdir().unwrap();
    let left = dir.path().join("left");
    let right = dir.path().join("right");
    write(&left.join("photo.jpg"), b"jpeg-ish");
    write(&right.join("photo.jpg"), b"jpeg-ish");

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[left.clone(), right.clone(), left.clone()])
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].len(), 2);
    assert_eq!(report.summary.total_files, 2);
}

#[test]
fn test_filters_apply_before_grouping() {
    let dir = tempdir().unwrap();
    for sub in ["one", "two"] {
        write(&dir.path().join(sub).join("keep.txt"), b"0123456789");
        write(&dir.path().join(sub).join("small.txt"), b"01");
        write(&dir.path().join(sub).join("skip.tmp"), b"0123456789");
    }

    let config = FinderConfig::default().with_walker_config(
        WalkerConfig::default()
            .with_min_size(5)
            .with_exclude_names(vec!["*.tmp".to_string()]),
    );
    let report = DuplicateFinder::new(config)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].name_key, "keep.txt");
    assert_eq!(report.summary.total_files, 2);
}

#[test]
fn test_zero_byte_files_group() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a").join("empty.log"), b"");
    write(&dir.path().join("b").join("empty.log"), b"");

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.summary.total_duplicate_size, 0);
}

#[test]
fn test_missing_root() {
    let dir = tempdir().unwrap();
    let result = DuplicateFinder::with_defaults().find_duplicates(&[dir.path().join("absent")]);
    assert!(matches!(result, Err(FinderError::PathNotFound(_))));
}

#[test]
fn test_root_is_a_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    write(&file, b"x");
    let result = DuplicateFinder::with_defaults().find_duplicates(&[file]);
    assert!(matches!(result, Err(FinderError::NotADirectory(_))));
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_a_warning() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let locked = dir.path().join("p").join("data.bin");
    write(&locked, b"payload");
    write(&dir.path().join("q").join("data.bin"), b"payload");
    write(&dir.path().join("r").join("data.bin"), b"payload");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read regardless of mode.
    if fs::File::open(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let report = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].len(), 2);
    assert!(report.groups[0]
        .members
        .iter()
        .all(|m| m.record.path != locked));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, locked);
    assert_eq!(report.warnings[0].kind, WarningKind::Unreadable);
}
