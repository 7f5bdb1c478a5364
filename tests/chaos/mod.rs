//! Chaos tests for snaplink
//!
//! Exercises robustness under adverse conditions: concurrent runs
//! contending for the backup root, snapshot corruption, interrupted
//! transfers, and damaged alias state.

use crate::integration::BackupTestHarness;
use ::snaplink::*;
use filetime::FileTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Fault injector for snapshot trees
pub struct ChaosEngine {
    rng: StdRng,
}

impl ChaosEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Flip one byte in up to `count` files under `dir`
    ///
    /// Size and mtime are preserved, so the damage is invisible to the
    /// quick verification depth and only a content hash can find it.
    pub fn corrupt_random_files(
        &mut self,
        dir: &Path,
        count: usize,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut candidates = regular_files_under(dir)?;
        let mut corrupted = Vec::new();

        for _ in 0..count {
            if candidates.is_empty() {
                break;
            }
            let idx = self.rng.random_range(0..candidates.len());
            let path = candidates.remove(idx);

            let mtime = FileTime::from_last_modification_time(&fs::metadata(&path)?);
            let mut content = fs::read(&path)?;
            let pos = self.rng.random_range(0..content.len());
            content[pos] ^= 0xff;
            fs::write(&path, &content)?;
            filetime::set_file_mtime(&path, mtime)?;

            info!("corrupted {:?} at byte {}", path, pos);
            corrupted.push(path);
        }

        Ok(corrupted)
    }

    /// Delete up to `count` files under `dir`
    pub fn delete_random_files(
        &mut self,
        dir: &Path,
        count: usize,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut candidates = regular_files_under(dir)?;
        let mut deleted = Vec::new();

        for _ in 0..count {
            if candidates.is_empty() {
                break;
            }
            let idx = self.rng.random_range(0..candidates.len());
            let path = candidates.remove(idx);
            fs::remove_file(&path)?;
            deleted.push(path);
        }

        Ok(deleted)
    }
}

/// Non-empty regular files under a directory
fn regular_files_under(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.metadata()?.len() > 0 {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_concurrent_runs_elect_single_writer() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runner = harness.runner.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    runner.run(RunOptions::default())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert!(successes >= 1, "at least one racer must win the lock");
        for result in &results {
            if let Err(e) = result {
                assert!(e.is_recoverable(), "unexpected error under contention: {}", e);
            }
        }

        // Every winner left a complete snapshot and the alias resolves.
        assert_eq!(harness.runner.list().unwrap().len(), successes);
        let latest = harness.runner.latest().unwrap().unwrap();
        let report = harness
            .runner
            .verify(&latest, VerifyOptions::default())
            .unwrap();
        assert!(report.is_valid(), "latest after the race: {}", report.summary());
    }

    #[test]
    fn test_corruption_found_only_by_checksum() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();
        let run = harness.take_snapshot();
        let snapshot = harness
            .runner
            .resolve_snapshot(&run.snapshot_name)
            .unwrap();

        let mut chaos = ChaosEngine::new(42);
        let corrupted = chaos
            .corrupt_random_files(&run.snapshot_path, 1)
            .unwrap();
        assert_eq!(corrupted.len(), 1);

        // Size and mtime still match, so the quick depth stays clean.
        let quick = harness
            .runner
            .verify(&snapshot, VerifyOptions::default())
            .unwrap();
        assert!(quick.is_valid());

        let full = harness
            .runner
            .verify(&snapshot, VerifyOptions { checksum: true })
            .unwrap();
        assert!(!full.is_valid());
        assert_eq!(full.mismatched.len(), 1);
        assert_eq!(full.mismatched[0].kind, MismatchKind::Content);
    }

    #[test]
    fn test_deleted_snapshot_files_reported_missing() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();
        let run = harness.take_snapshot();
        let snapshot = harness
            .runner
            .resolve_snapshot(&run.snapshot_name)
            .unwrap();

        let mut chaos = ChaosEngine::new(7);
        let deleted = chaos.delete_random_files(&run.snapshot_path, 1).unwrap();
        assert_eq!(deleted.len(), 1);
        let rel = deleted[0].strip_prefix(&run.snapshot_path).unwrap();

        let report = harness
            .runner
            .verify(&snapshot, VerifyOptions::default())
            .unwrap();
        assert!(!report.is_valid());
        assert!(report.missing.contains(&rel.to_path_buf()));
    }

    #[test]
    #[cfg(unix)]
    fn test_interrupted_transfer_leaves_partial_and_alias() {
        use std::os::unix::fs::PermissionsExt;

        let harness = BackupTestHarness::new();
        let root = harness.source_dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("blocked.txt"), "secret").unwrap();
        let first = harness.take_snapshot();

        // New content forces a copy; removing read permission makes it fail.
        fs::write(root.join("blocked.txt"), "new secret").unwrap();
        fs::set_permissions(
            root.join("blocked.txt"),
            fs::Permissions::from_mode(0o000),
        )
        .unwrap();
        if fs::read(root.join("blocked.txt")).is_ok() {
            // Privileged processes read through 0o000; the fault cannot be staged.
            return;
        }

        let err = loop {
            match harness.runner.run(RunOptions::default()) {
                Err(SnaplinkError::SnapshotExists(_)) => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => break e,
                Ok(report) => panic!("run succeeded unexpectedly: {}", report.snapshot_name),
            }
        };
        assert!(matches!(err, SnaplinkError::SyncIncomplete { .. }));
        assert!(err.leaves_partial_snapshot());

        // The partial snapshot stays on disk for inspection...
        assert_eq!(harness.runner.list().unwrap().len(), 2);
        // ...while the alias still names the last complete snapshot.
        assert_eq!(
            harness.runner.latest().unwrap().unwrap().name,
            first.snapshot_name
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_dangling_alias_downgrades_to_full_copy() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();
        let first = harness.take_snapshot();

        // Remove the snapshot out from under the alias.
        fs::remove_dir_all(&first.snapshot_path).unwrap();
        assert!(harness.runner.latest().unwrap().is_none());

        let second = harness.take_snapshot();
        assert_eq!(second.stats.files_linked, 0);
        assert_eq!(second.stats.files_copied, 2);
        assert_eq!(
            harness.runner.latest().unwrap().unwrap().name,
            second.snapshot_name
        );
    }

    #[test]
    fn test_stale_alias_stage_is_cleared() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();
        fs::write(harness.backup_dir.path().join("latest.tmp"), "leftover").unwrap();

        let report = harness.take_snapshot();

        assert_eq!(
            harness.runner.latest().unwrap().unwrap().name,
            report.snapshot_name
        );
        assert!(!harness.backup_dir.path().join("latest.tmp").exists());
    }

    #[test]
    #[traced_test]
    fn test_source_mutation_during_run_does_not_abort() {
        let mut harness = BackupTestHarness::new();
        harness
            .generate_complex_project(Default::default())
            .unwrap();

        let targets: Vec<PathBuf> = regular_files_under(harness.source_dir.path()).unwrap();
        let writer_targets = targets.clone();
        let writer = thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(99);
            for round in 0..50 {
                let idx = rng.random_range(0..writer_targets.len());
                let _ = fs::write(
                    &writer_targets[idx],
                    format!("rewritten in round {}", round),
                );
                thread::sleep(Duration::from_millis(2));
            }
        });

        // Overlaps the writer; modified-in-place files copy without error.
        let mid_flight = harness.take_snapshot();
        assert!(mid_flight.stats.files_total() > 0);

        writer.join().unwrap();

        // Once the source is quiet, the next run settles into a clean state.
        let settled = harness.take_snapshot();
        let snapshot = harness
            .runner
            .resolve_snapshot(&settled.snapshot_name)
            .unwrap();
        let report = harness
            .runner
            .verify(&snapshot, VerifyOptions { checksum: true })
            .unwrap();
        assert!(report.is_valid(), "settled snapshot: {}", report.summary());
    }
}
