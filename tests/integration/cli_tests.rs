use clap::Parser;
use dupeguard::cli::Cli;
use dupeguard::error::ExitCode;
use dupeguard::quarantine::list_batches;
use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["dupeguard", "-q"];
    argv.extend_from_slice(args);
    dupeguard::run_app(Cli::try_parse_from(argv).unwrap())
}

fn write(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_scan_without_duplicates() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"one");
    write(&dir.path().join("b.txt"), b"two");

    let code = run(&["scan", s(dir.path())]).unwrap();
    assert_eq!(code, ExitCode::NoDuplicates);
}

#[test]
fn test_scan_writes_csv() {
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let csv = out.path().join("report.csv");
    write(&dir.path().join("A").join("doc.txt"), b"same");
    sleep(Duration::from_millis(20));
    write(&dir.path().join("B").join("doc.txt"), b"same");

    let code = run(&["scan", s(dir.path()), "--csv", s(&csv)]).unwrap();
    assert_eq!(code, ExitCode::Success);

    let content = fs::read_to_string(&csv).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "group,kind,role,path,size,digest");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",original,"));
    assert!(lines[1].contains("doc.txt"));
    assert!(lines[2].contains(",copy,"));
}

#[test]
fn test_scan_quarantine_then_undo() {
    let dir = tempdir().unwrap();
    let quarantine = tempdir().unwrap();
    let original = dir.path().join("A").join("doc.txt");
    let copy = dir.path().join("B").join("doc.txt");
    write(&original, b"same");
    sleep(Duration::from_millis(20));
    write(&copy, b"same");

    let code = run(&[
        "scan",
        s(dir.path()),
        "--quarantine",
        "--quarantine-root",
        s(quarantine.path()),
        "--yes",
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(original.exists());
    assert!(!copy.exists());

    let batches = list_batches(quarantine.path()).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].quarantined, 1);

    let code = run(&["undo", s(&batches[0].dir)]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read(&copy).unwrap(), b"same");

    let code = run(&["batches", s(quarantine.path())]).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_quarantine_root_inside_scan_root_is_rejected() {
    let dir = tempdir().unwrap();
    let copy = dir.path().join("B").join("doc.txt");
    write(&dir.path().join("A").join("doc.txt"), b"same");
    write(&copy, b"same");
    let inner = dir.path().join("quarantine");

    let err = run(&[
        "scan",
        s(dir.path()),
        "--quarantine",
        "--quarantine-root",
        s(&inner),
        "--yes",
    ])
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidConfig);
    assert!(copy.exists());
}

#[test]
fn test_invalid_threshold_is_rejected_before_scanning() {
    let dir = tempdir().unwrap();
    let err = run(&["scan", s(dir.path()), "--similar", "--similar-threshold", "65"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidConfig);
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = run(&["--config", s(&missing), "scan", s(dir.path())]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidConfig);
}

#[test]
fn test_missing_scan_root() {
    let dir = tempdir().unwrap();
    let err = run(&["scan", s(&dir.path().join("absent"))]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_undo_of_non_batch_directory() {
    let dir = tempdir().unwrap();
    assert!(run(&["undo", s(dir.path())]).is_err());
}

#[test]
fn test_batches_on_empty_root() {
    let dir = tempdir().unwrap();
    let code = run(&["batches", s(&dir.path().join("none"))]).unwrap();
    assert_eq!(code, ExitCode::Success);
}

#[test]
fn test_undo_defaults_to_newest_batch() {
    let dir = tempdir().unwrap();
    let quarantine = tempdir().unwrap();
    let first_copy = dir.path().join("B").join("one.txt");
    let second_copy = dir.path().join("B").join("two.txt");
    write(&dir.path().join("A").join("one.txt"), b"1");
    write(&dir.path().join("A").join("two.txt"), b"2");
    sleep(Duration::from_millis(20));
    write(&first_copy, b"1");
    write(&second_copy, b"2");

    // Two batches: quarantine only `one.txt`, then only `two.txt`.
    for mask in ["one.txt", "two.txt"] {
        let code = run(&[
            "scan",
            s(dir.path()),
            "--include",
            mask,
            "--quarantine",
            "--quarantine-root",
            s(quarantine.path()),
            "--yes",
        ])
        .unwrap();
        assert_eq!(code, ExitCode::Success);
    }
    assert!(!first_copy.exists());
    assert!(!second_copy.exists());
    assert_eq!(list_batches(quarantine.path()).unwrap().len(), 2);

    let code = run(&["undo", "--quarantine-root", s(quarantine.path())]).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(!first_copy.exists());
    assert_eq!(fs::read(&second_copy).unwrap(), b"2");
}

#[test]
fn test_undo_without_batches_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(run(&["undo", "--quarantine-root", s(dir.path())]).is_err());
}
