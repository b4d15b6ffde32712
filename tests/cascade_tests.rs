use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use cascade_dups::{CascadePipeline, FileRecord, Mode, Stage, run};
use tempfile::{TempDir, tempdir};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> FileRecord {
    let path = dir.path().join(name);
    fs::write(&path, data).unwrap();
    FileRecord::new(path, data.len() as u64)
}

/// Sparse file of `len` zero bytes with single-byte patches.
fn sparse_file(dir: &TempDir, name: &str, len: u64, patches: &[(u64, u8)]) -> FileRecord {
    let path = dir.path().join(name);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    file.set_len(len).unwrap();
    for (offset, byte) in patches {
        file.seek(SeekFrom::Start(*offset)).unwrap();
        file.write_all(&[*byte]).unwrap();
    }
    FileRecord::new(path, len)
}

fn patterned(len: usize, salt: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(7).wrapping_add(salt))
        .collect()
}

fn group_sets(groups: &[cascade_dups::CandidateGroup]) -> Vec<HashSet<PathBuf>> {
    groups
        .iter()
        .map(|group| group.files.iter().cloned().collect())
        .collect()
}

fn set_of(paths: &[&PathBuf]) -> HashSet<PathBuf> {
    paths.iter().map(|p| (*p).clone()).collect()
}

#[test]
fn identical_small_files_group_in_every_mode() {
    let dir = tempdir().unwrap();
    let data = patterned(10_000, 3);
    let records = vec![
        write_file(&dir, "a.bin", &data),
        write_file(&dir, "b.bin", &data),
    ];

    for mode in [Mode::Fast, Mode::Normal, Mode::Full] {
        let outcome = run(&records, mode, false).unwrap();
        assert_eq!(outcome.groups.len(), 1, "{mode}");
        assert_eq!(outcome.groups[0].size, 10_000);
        assert_eq!(
            outcome.groups[0].files,
            vec![records[0].path.clone(), records[1].path.clone()]
        );
    }
}

#[test]
fn full_mode_separates_files_that_differ_between_anchors() {
    let dir = tempdir().unwrap();
    let size = 50 * MIB;
    let records = vec![
        sparse_file(&dir, "a.img", size, &[]),
        sparse_file(&dir, "b.img", size, &[(12 * MIB, 0xff)]),
    ];

    let fast = run(&records, Mode::Fast, false).unwrap();
    assert_eq!(fast.groups.len(), 1);

    // The first-quarter region starts at 12.25 MiB, past the differing byte.
    let normal = run(&records, Mode::Normal, false).unwrap();
    assert_eq!(normal.groups.len(), 1);

    let full = run(&records, Mode::Full, false).unwrap();
    assert!(full.groups.is_empty());
}

#[test]
fn empty_files_never_reported() {
    let dir = tempdir().unwrap();
    let records = vec![
        write_file(&dir, "empty1", b""),
        write_file(&dir, "empty2", b""),
        write_file(&dir, "x", b"content"),
    ];
    for mode in [Mode::Fast, Mode::Normal, Mode::Full] {
        let outcome = run(&records, mode, true).unwrap();
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.stats.unwrap().get(Stage::Size).group_count, 0);
    }
}

#[test]
fn no_duplicates_reports_zero_groups_at_every_stage() {
    let dir = tempdir().unwrap();
    let records: Vec<FileRecord> = (1..=5)
        .map(|i| write_file(&dir, &format!("f{i}"), &patterned(i * 100, i as u8)))
        .collect();

    let outcome = run(&records, Mode::Normal, true).unwrap();
    assert!(outcome.groups.is_empty());
    let stats = outcome.stats.unwrap();
    for (stage, data) in stats.iter() {
        assert_eq!(data.group_count, 0, "{stage:?}");
        assert_eq!(data.file_count, 0, "{stage:?}");
    }
    assert!(outcome.total_elapsed.is_some());
}

#[test]
fn unreadable_file_is_dropped_without_failing_the_run() {
    let dir = tempdir().unwrap();
    let data = patterned(4096, 9);
    let mut records = vec![
        write_file(&dir, "a", &data),
        write_file(&dir, "b", &data),
        write_file(&dir, "c", &data),
    ];
    let baseline = run(&records, Mode::Full, false).unwrap();

    records.insert(1, FileRecord::new(dir.path().join("vanished"), data.len() as u64));
    let outcome = run(&records, Mode::Full, true).unwrap();

    assert_eq!(outcome.groups, baseline.groups);
    assert_eq!(outcome.groups[0].files.len(), 3);
    // The missing file still counted in the size bucket, then fell away.
    let stats = outcome.stats.unwrap();
    assert_eq!(stats.get(Stage::Size).file_count, 4);
    assert_eq!(stats.get(Stage::Partial).file_count, 3);
}

#[test]
fn file_removed_after_cataloging_is_isolated() {
    let dir = tempdir().unwrap();
    let data = patterned(2048, 1);
    let records = vec![
        write_file(&dir, "keep1", &data),
        write_file(&dir, "gone", &data),
        write_file(&dir, "keep2", &data),
    ];
    fs::remove_file(&records[1].path).unwrap();

    let outcome = run(&records, Mode::Normal, false).unwrap();
    assert_eq!(
        group_sets(&outcome.groups),
        vec![set_of(&[&records[0].path, &records[2].path])]
    );
}

#[test]
fn groups_are_pruned_and_size_homogeneous() {
    let dir = tempdir().unwrap();
    let mut records = Vec::new();
    for i in 0..12u8 {
        // Four contents, two of which share a size.
        let (len, salt) = match i % 4 {
            0 => (1000, 1),
            1 => (1000, 2),
            2 => (3000, 3),
            _ => (5000 + i as usize, 4),
        };
        records.push(write_file(&dir, &format!("f{i}"), &patterned(len, salt)));
    }

    for mode in [Mode::Fast, Mode::Normal, Mode::Full] {
        let outcome = run(&records, mode, false).unwrap();
        assert_eq!(outcome.groups.len(), 3, "{mode}");
        for group in &outcome.groups {
            assert!(group.files.len() >= 2);
            for path in &group.files {
                let record = records.iter().find(|r| &r.path == path).unwrap();
                assert_eq!(record.size, group.size);
            }
        }
    }
}

#[test]
fn modes_agree_through_middle() {
    let dir = tempdir().unwrap();
    let size = MIB;
    let records = vec![
        sparse_file(&dir, "a", size, &[]),
        sparse_file(&dir, "b", size, &[]),
        sparse_file(&dir, "c", size, &[(250 * KIB, 1)]),
        sparse_file(&dir, "d", size, &[(10, 1)]),
        sparse_file(&dir, "e", size, &[(10, 1)]),
        sparse_file(&dir, "f", size, &[(1000 * KIB, 2)]),
    ];

    let stats: Vec<_> = [Mode::Fast, Mode::Normal, Mode::Full]
        .into_iter()
        .map(|mode| run(&records, mode, true).unwrap().stats.unwrap())
        .collect();
    for stage in [Stage::Size, Stage::Partial, Stage::End, Stage::Middle] {
        let counts: Vec<_> = stats
            .iter()
            .map(|s| (s.get(stage).group_count, s.get(stage).file_count))
            .collect();
        assert!(counts.windows(2).all(|w| w[0] == w[1]), "{stage:?}: {counts:?}");
    }
    assert_eq!(stats[0].get(Stage::Middle).group_count, 2);
    assert_eq!(stats[0].get(Stage::FirstQuarter).group_count, 0);
    assert_eq!(stats[2].get(Stage::Full).group_count, 2);
    assert_eq!(stats[2].get(Stage::Full).file_count, 4);
}

#[test]
fn normal_mode_skips_third_quarter_when_first_quarter_separates_nothing() {
    let dir = tempdir().unwrap();
    let size = MIB;
    // Differ only inside the third-quarter region [736K, 800K).
    let records = vec![
        sparse_file(&dir, "a", size, &[]),
        sparse_file(&dir, "b", size, &[(750 * KIB, 1)]),
    ];

    let outcome = run(&records, Mode::Normal, true).unwrap();
    assert_eq!(outcome.groups.len(), 1);
    let stats = outcome.stats.unwrap();
    assert_eq!(stats.get(Stage::FirstQuarter).group_count, 1);
    assert_eq!(stats.get(Stage::ThirdQuarter).group_count, 0);
    assert!(stats.get(Stage::ThirdQuarter).elapsed.is_zero());
}

#[test]
fn normal_mode_runs_third_quarter_after_first_quarter_separates() {
    let dir = tempdir().unwrap();
    let size = MIB;
    // `c` differs inside the first-quarter region [224K, 288K).
    let records = vec![
        sparse_file(&dir, "a", size, &[(750 * KIB, 1)]),
        sparse_file(&dir, "b", size, &[(750 * KIB, 1)]),
        sparse_file(&dir, "c", size, &[(250 * KIB, 1)]),
    ];

    let outcome = run(&records, Mode::Normal, true).unwrap();
    assert_eq!(
        group_sets(&outcome.groups),
        vec![set_of(&[&records[0].path, &records[1].path])]
    );
    let stats = outcome.stats.unwrap();
    assert_eq!(stats.get(Stage::ThirdQuarter).group_count, 1);
    assert_eq!(stats.get(Stage::ThirdQuarter).file_count, 2);
}

#[test]
fn third_quarter_splits_files_after_separation() {
    let dir = tempdir().unwrap();
    let size = MIB;
    let records = vec![
        sparse_file(&dir, "a", size, &[]),
        sparse_file(&dir, "b", size, &[(750 * KIB, 1)]),
        sparse_file(&dir, "c", size, &[(250 * KIB, 1)]),
    ];

    let outcome = run(&records, Mode::Normal, false).unwrap();
    assert!(outcome.groups.is_empty());
}

#[test]
fn small_files_are_read_once_across_all_stages() {
    let dir = tempdir().unwrap();
    let data = patterned(8000, 5);
    let records = vec![
        write_file(&dir, "a", &data),
        write_file(&dir, "b", &data),
        write_file(&dir, "c", &data),
    ];

    for mode in [Mode::Fast, Mode::Normal, Mode::Full] {
        let fresh: Vec<FileRecord> = records
            .iter()
            .map(|r| FileRecord::new(r.path.clone(), r.size))
            .collect();
        let pipeline = CascadePipeline::new(mode);
        let outcome = pipeline.run(&fresh, false).unwrap();
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(pipeline.engine().reads(), 3, "{mode}");
        assert!(fresh.iter().all(|r| r.cached_full_digest().is_some()));
    }
}

#[test]
fn full_mode_reads_each_large_candidate_once_more() {
    let dir = tempdir().unwrap();
    let records = vec![
        sparse_file(&dir, "a", 2 * MIB, &[]),
        sparse_file(&dir, "b", 2 * MIB, &[]),
    ];
    let pipeline = CascadePipeline::new(Mode::Full).with_threads(1);
    let outcome = pipeline.run(&records, false).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    // Front, end and middle regions, then the whole file.
    assert_eq!(pipeline.engine().reads(), 8);
    assert_eq!(pipeline.engine().bytes_read(), 2 * (3 * 64 * KIB + 2 * MIB));
}

#[test]
fn output_follows_size_bucket_order_regardless_of_threads() {
    let dir = tempdir().unwrap();
    let mut records = Vec::new();
    for size in (1..=20usize).rev() {
        let data = patterned(size * 97, size as u8);
        records.push(write_file(&dir, &format!("{size}-a"), &data));
        records.push(write_file(&dir, &format!("{size}-b"), &data));
    }

    let sequential = CascadePipeline::new(Mode::Normal)
        .with_threads(1)
        .run(&records, false)
        .unwrap();
    let parallel = CascadePipeline::new(Mode::Normal)
        .with_threads(4)
        .run(&records, false)
        .unwrap();

    assert_eq!(sequential.groups.len(), 20);
    assert_eq!(sequential.groups, parallel.groups);
    let sizes: Vec<u64> = sequential.groups.iter().map(|g| g.size).collect();
    let mut sorted = sizes.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(sizes, sorted);
}
