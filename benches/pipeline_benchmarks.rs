use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dupeguard::duplicates::{classify, DuplicateFinder, NamePolicy};
use dupeguard::scanner::{FileRecord, HashPipeline, HashedFile, Hasher, PipelineConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// `dirs` directories each holding the same `files` names, so every name
// forms one duplicate group.
fn setup_tree(dirs: usize, files: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for d in 0..dirs {
        let dir = temp_dir.path().join(format!("dir_{}", d));
        fs::create_dir_all(&dir).expect("Failed to create dir");
        for f in 0..files {
            fs::write(dir.join(format!("file_{}.txt", f)), format!("content {}", f))
                .expect("Failed to write file");
        }
    }
    temp_dir
}

fn records_in(root: &Path) -> Vec<FileRecord> {
    let mut records = Vec::new();
    for dir in fs::read_dir(root).unwrap() {
        let dir = dir.unwrap().path();
        for file in fs::read_dir(&dir).unwrap() {
            let path = file.unwrap().path();
            let size = fs::metadata(&path).unwrap().len();
            records.push(FileRecord::new(path, size, SystemTime::UNIX_EPOCH));
        }
    }
    records
}

fn bench_hasher(c: &mut Criterion) {
    let mut group = c.benchmark_group("hasher");
    let hasher = Hasher::new();

    for size_kb in [1, 1024, 10240] {
        let data = vec![b'a'; size_kb * 1024];
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("bench_file.dat");
        fs::write(&file_path, &data).expect("Failed to write bench file");

        group.bench_with_input(format!("blake3_{}KB", size_kb), &file_path, |b, path| {
            b.iter(|| black_box(hasher.full_hash(path).unwrap()));
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let temp_dir = setup_tree(4, 50);
    let records = records_in(temp_dir.path());
    let mut group = c.benchmark_group("pipeline");

    for workers in [1, 4] {
        let pipeline = HashPipeline::new(PipelineConfig::default().with_workers(workers));
        group.bench_function(format!("hash_200_files_{}_workers", workers), |b| {
            b.iter(|| black_box(pipeline.run(records.clone())));
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let files: Vec<HashedFile> = (0..10_000u64)
        .map(|i| {
            let name = format!("file_{}.txt", i % 2_000);
            let mut digest = [0u8; 32];
            digest[..8].copy_from_slice(&(i % 2_000).to_le_bytes());
            HashedFile {
                record: FileRecord::new(
                    PathBuf::from(format!("/data/dir_{}/{}", i / 2_000, name)),
                    128,
                    SystemTime::UNIX_EPOCH + Duration::from_secs(i / 2_000),
                ),
                digest,
                fingerprint: None,
            }
        })
        .collect();

    c.bench_function("classify_10k_records", |b| {
        b.iter(|| black_box(classify(&files, NamePolicy::default())));
    });
}

fn bench_full_scan(c: &mut Criterion) {
    let temp_dir = setup_tree(4, 50);
    let roots = vec![temp_dir.path().to_path_buf()];
    let finder = DuplicateFinder::with_defaults();

    c.bench_function("full_scan_200_files", |b| {
        b.iter(|| black_box(finder.find_duplicates(&roots).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_hasher,
    bench_pipeline,
    bench_classify,
    bench_full_scan
);
criterion_main!(benches);
