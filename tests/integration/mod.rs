//! Integration tests for snaplink
//!
//! Exercises complete backup runs end to end: first snapshots,
//! incremental runs with hard-link deduplication, alias management,
//! verification, and diffing.

use ::snaplink::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Test harness for multi-run backup scenarios
pub struct BackupTestHarness {
    pub source_dir: TempDir,
    pub backup_dir: TempDir,
    pub runner: SnapshotRunner,
    pub file_generator: FileGenerator,
}

impl BackupTestHarness {
    /// Create a harness with the default exclusion list
    pub fn new() -> Self {
        Self::with_excludes(vec![])
    }

    /// Create a harness with explicit exclusion patterns
    pub fn with_excludes(excludes: Vec<String>) -> Self {
        let source_dir = TempDir::new().unwrap();
        let backup_dir = TempDir::new().unwrap();

        let mut builder = SnapshotRunner::builder();
        if !excludes.is_empty() {
            builder = builder.exclude_patterns(excludes);
        }
        let runner = builder
            .build(
                source_dir.path().to_path_buf(),
                backup_dir.path().to_path_buf(),
            )
            .unwrap();

        Self {
            source_dir,
            backup_dir,
            runner,
            file_generator: FileGenerator::new(42),
        }
    }

    /// Write the canonical three-entry source tree
    ///
    /// `a.txt` and `b.txt` are ordinary files; `.cache/x` sits under the
    /// default exclusion.
    pub fn seed_canonical_source(&self) {
        let root = self.source_dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("b.txt"), "world").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("x"), "scratch").unwrap();
    }

    /// Take a snapshot, waiting out same-second name collisions
    ///
    /// Snapshot names have one-second granularity, so back-to-back runs
    /// inside the same second collide; the collision is recoverable and
    /// the retry succeeds once the clock ticks.
    pub fn take_snapshot(&self) -> RunReport {
        self.take_snapshot_with(RunOptions::default())
    }

    /// Take a snapshot with explicit options, retrying name collisions
    pub fn take_snapshot_with(&self, options: RunOptions) -> RunReport {
        for _ in 0..40 {
            match self.runner.run(options.clone()) {
                Ok(report) => return report,
                Err(SnaplinkError::SnapshotExists(_)) => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => panic!("snapshot run failed: {}", e),
            }
        }
        panic!("snapshot name collision never cleared");
    }

    /// Generate a nested project tree under the source directory
    pub fn generate_complex_project(&mut self, config: ProjectConfig) -> anyhow::Result<()> {
        let root = self.source_dir.path();

        for dir_depth in 1..=config.max_depth {
            for dir_idx in 0..config.dirs_per_level {
                let mut path = root.to_path_buf();
                for level in 0..dir_depth {
                    path = path.join(format!("dir_{}_{}", level, dir_idx));
                }
                fs::create_dir_all(&path)?;

                for file_idx in 0..config.files_per_dir {
                    let file_path = path.join(format!("file_{}.txt", file_idx));
                    let content = self
                        .file_generator
                        .generate_file_content(config.file_size_range.clone());
                    fs::write(&file_path, &content)?;
                }
            }
        }

        Ok(())
    }

    /// Apply random mutations to source files
    pub fn mutate_files(&mut self, config: MutationConfig) -> anyhow::Result<Vec<FileChange>> {
        let mut changes = Vec::new();
        let root = self.source_dir.path();

        let mut all_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                all_files.push(entry.path().to_path_buf());
            }
        }

        for mutation_idx in 0..config.num_mutations {
            if all_files.is_empty() {
                break;
            }

            let mutation_type = self.file_generator.rng.random_range(0..3);
            match mutation_type {
                0 => {
                    let idx = self.file_generator.rng.random_range(0..all_files.len());
                    let file_path = &all_files[idx];
                    let new_content = self
                        .file_generator
                        .generate_file_content(config.file_size_range.clone());
                    fs::write(file_path, &new_content)?;

                    changes.push(FileChange::Modified(file_path.clone()));
                }
                1 => {
                    let idx = self.file_generator.rng.random_range(0..all_files.len());
                    let file_path = all_files.remove(idx);
                    fs::remove_file(&file_path)?;

                    changes.push(FileChange::Deleted(file_path.clone()));
                }
                2 => {
                    let file_path = root.join(format!("mutated_file_{}.txt", mutation_idx));
                    let content = self
                        .file_generator
                        .generate_file_content(config.file_size_range.clone());
                    fs::write(&file_path, &content)?;

                    all_files.push(file_path.clone());
                    changes.push(FileChange::Added(file_path.clone()));
                }
                _ => unreachable!(),
            }
        }

        Ok(changes)
    }

    /// Paths that were added or modified and still exist in the source
    ///
    /// A file mutated twice counts once; a file added and later deleted
    /// does not count at all. These are exactly the files a subsequent
    /// run must copy rather than link.
    pub fn surviving_changes(&self, changes: &[FileChange]) -> HashSet<PathBuf> {
        let mut changed = HashSet::new();
        for change in changes {
            match change {
                FileChange::Added(path) | FileChange::Modified(path) => {
                    changed.insert(path.clone());
                }
                FileChange::Deleted(path) => {
                    changed.remove(path);
                }
            }
        }
        changed
    }

    /// Count regular files currently in the source tree
    pub fn count_source_files(&self) -> usize {
        walkdir::WalkDir::new(self.source_dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

/// File generator for test data
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate realistic text content
    pub fn generate_file_content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        let mut content = Vec::with_capacity(size);

        let words = [
            "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "lorem", "ipsum",
        ];
        while content.len() < size {
            let word = words[self.rng.random_range(0..words.len())];
            content.extend_from_slice(word.as_bytes());
            content.push(b' ');
        }

        content.truncate(size);
        content
    }

    /// Generate binary content
    pub fn generate_binary_content(&mut self, size: usize) -> Vec<u8> {
        let mut content = vec![0u8; size];
        self.rng.fill(&mut content[..]);
        content
    }
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub max_depth: usize,
    pub dirs_per_level: usize,
    pub files_per_dir: usize,
    pub file_size_range: std::ops::Range<usize>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            dirs_per_level: 3,
            files_per_dir: 5,
            file_size_range: 100..1_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MutationConfig {
    pub num_mutations: usize,
    pub file_size_range: std::ops::Range<usize>,
}

#[derive(Debug)]
pub enum FileChange {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

/// Inode number of a path (files linked to the same inode share it)
#[cfg(unix)]
pub fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).unwrap().ino()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_first_snapshot_copies_everything() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        let report = harness.take_snapshot();

        assert_eq!(report.stats.files_copied, 2);
        assert_eq!(report.stats.files_linked, 0);
        assert_eq!(report.stats.bytes_copied, 10);
        assert_eq!(report.stats.entries_excluded, 1);

        let snap = &report.snapshot_path;
        assert_eq!(fs::read_to_string(snap.join("a.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(snap.join("b.txt")).unwrap(), "world");
        assert!(!snap.join(".cache").exists());

        let latest = harness.runner.latest().unwrap().unwrap();
        assert_eq!(latest.name, report.snapshot_name);
    }

    #[test]
    #[cfg(unix)]
    fn test_second_snapshot_links_unchanged_files() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        let first = harness.take_snapshot();
        fs::write(harness.source_dir.path().join("b.txt"), "world!").unwrap();
        let second = harness.take_snapshot();

        assert_eq!(second.stats.files_linked, 1);
        assert_eq!(second.stats.files_copied, 1);

        // Unchanged a.txt shares an inode with the previous snapshot.
        assert_eq!(
            inode(&first.snapshot_path.join("a.txt")),
            inode(&second.snapshot_path.join("a.txt"))
        );
        // Changed b.txt does not.
        assert_ne!(
            inode(&first.snapshot_path.join("b.txt")),
            inode(&second.snapshot_path.join("b.txt"))
        );

        // Both snapshots read back their own version.
        assert_eq!(
            fs::read_to_string(first.snapshot_path.join("b.txt")).unwrap(),
            "world"
        );
        assert_eq!(
            fs::read_to_string(second.snapshot_path.join("b.txt")).unwrap(),
            "world!"
        );
    }

    #[test]
    fn test_alias_follows_newest_snapshot() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        let first = harness.take_snapshot();
        assert_eq!(
            harness.runner.latest().unwrap().unwrap().name,
            first.snapshot_name
        );

        let second = harness.take_snapshot();
        assert_eq!(
            harness.runner.latest().unwrap().unwrap().name,
            second.snapshot_name
        );

        let names: Vec<String> = harness
            .runner
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec![first.snapshot_name, second.snapshot_name]);
    }

    #[test]
    fn test_missing_source_creates_nothing() {
        let backup_dir = TempDir::new().unwrap();
        let runner = SnapshotRunner::new(
            PathBuf::from("/nonexistent/source/for/snaplink"),
            backup_dir.path().to_path_buf(),
        )
        .unwrap();

        let err = runner.run(RunOptions::default()).unwrap_err();
        assert!(matches!(err, SnaplinkError::SourceUnavailable { .. }));

        assert!(runner.list().unwrap().is_empty());
        assert!(runner.latest().unwrap().is_none());
    }

    #[test]
    fn test_dry_run_plans_without_writing() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        let report = harness.take_snapshot_with(RunOptions {
            dry_run: true,
            ..Default::default()
        });

        assert!(report.dry_run);
        assert_eq!(report.stats.files_copied, 2);
        assert!(!report.snapshot_path.exists());
        assert!(harness.runner.list().unwrap().is_empty());
        assert!(harness.runner.latest().unwrap().is_none());
    }

    #[test]
    fn test_custom_excludes_replace_default() {
        let harness = BackupTestHarness::with_excludes(vec!["*.log".to_string()]);
        let root = harness.source_dir.path();
        fs::write(root.join("keep.txt"), "keep").unwrap();
        fs::write(root.join("noise.log"), "drop").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("x"), "kept now").unwrap();

        let report = harness.take_snapshot();

        let snap = &report.snapshot_path;
        assert!(snap.join("keep.txt").exists());
        assert!(!snap.join("noise.log").exists());
        // Replacing the pattern list drops the default `.cache` exclusion.
        assert!(snap.join(".cache").join("x").exists());
    }

    #[test]
    fn test_exclusion_is_top_level_only() {
        let harness = BackupTestHarness::new();
        let root = harness.source_dir.path();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("x"), "dropped").unwrap();
        fs::create_dir_all(root.join("project").join(".cache")).unwrap();
        fs::write(root.join("project").join(".cache").join("y"), "kept").unwrap();

        let report = harness.take_snapshot();

        let snap = &report.snapshot_path;
        assert!(!snap.join(".cache").exists());
        assert!(snap.join("project").join(".cache").join("y").exists());
    }

    #[test]
    #[traced_test]
    fn test_complex_project_incremental_cost() {
        let mut harness = BackupTestHarness::new();
        harness
            .generate_complex_project(ProjectConfig::default())
            .unwrap();

        let first = harness.take_snapshot();
        let total_files = harness.count_source_files();
        assert_eq!(first.stats.files_copied, total_files);

        let changes = harness
            .mutate_files(MutationConfig {
                num_mutations: 10,
                file_size_range: 100..1_000,
            })
            .unwrap();
        let changed = harness.surviving_changes(&changes);

        let second = harness.take_snapshot();
        let remaining_files = harness.count_source_files();

        assert_eq!(second.stats.files_copied, changed.len());
        assert_eq!(second.stats.files_linked, remaining_files - changed.len());
    }

    #[test]
    #[cfg(unix)]
    fn test_link_stats_reflect_dedup() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();

        harness.take_snapshot();
        fs::write(harness.source_dir.path().join("b.txt"), "world!").unwrap();
        harness.take_snapshot();

        let stats = harness.runner.link_stats().unwrap();
        assert_eq!(stats.snapshot_count, 2);
        assert_eq!(stats.file_count, 4);
        // a.txt is stored once, b.txt twice.
        assert_eq!(stats.unique_file_count, 3);
        assert!(stats.physical_bytes < stats.logical_bytes);
        assert_eq!(stats.saved_bytes(), 5);
        assert_eq!(stats.per_snapshot.len(), 2);
        // The second snapshot only owns the rewritten b.txt.
        assert_eq!(stats.per_snapshot[1].owned_bytes, 6);
    }

    #[test]
    fn test_verify_clean_then_detects_drift() {
        let harness = BackupTestHarness::new();
        harness.seed_canonical_source();
        let report = harness.take_snapshot();
        let snapshot = harness
            .runner
            .resolve_snapshot(&report.snapshot_name)
            .unwrap();

        let clean = harness
            .runner
            .verify(&snapshot, VerifyOptions::default())
            .unwrap();
        assert!(clean.is_valid(), "fresh snapshot should verify: {}", clean.summary());

        // Edit the source; verification reads the drift as mismatches.
        fs::write(harness.source_dir.path().join("a.txt"), "hello!!").unwrap();
        fs::remove_file(harness.source_dir.path().join("b.txt")).unwrap();
        fs::write(harness.source_dir.path().join("c.txt"), "new").unwrap();

        let drifted = harness
            .runner
            .verify(&snapshot, VerifyOptions::default())
            .unwrap();
        assert!(!drifted.is_valid());
        assert_eq!(drifted.missing, vec![PathBuf::from("c.txt")]);
        assert_eq!(drifted.extra, vec![PathBuf::from("b.txt")]);
        assert_eq!(drifted.mismatched.len(), 1);
        assert_eq!(drifted.mismatched[0].path, PathBuf::from("a.txt"));
    }

    #[test]
    fn test_diff_between_snapshots() {
        let harness = BackupTestHarness::new();
        let root = harness.source_dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("b.txt"), "world").unwrap();
        let first = harness.take_snapshot();

        fs::remove_file(root.join("a.txt")).unwrap();
        fs::write(root.join("b.txt"), "world!").unwrap();
        fs::write(root.join("c.txt"), "new").unwrap();
        let second = harness.take_snapshot();

        let from = harness
            .runner
            .resolve_snapshot(&first.snapshot_name)
            .unwrap();
        let to = harness
            .runner
            .resolve_snapshot(&second.snapshot_name)
            .unwrap();
        let diff = harness.runner.diff(&from, &to, DiffOptions::default()).unwrap();

        assert_eq!(diff.added, vec![PathBuf::from("c.txt")]);
        assert_eq!(diff.deleted, vec![PathBuf::from("a.txt")]);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].path, PathBuf::from("b.txt"));
        assert_eq!(diff.modified[0].from_size, 5);
        assert_eq!(diff.modified[0].to_size, 6);
        assert_eq!(diff.stats.entries_added, 1);
        assert_eq!(diff.stats.entries_deleted, 1);
        assert_eq!(diff.stats.files_modified, 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_survive_as_symlinks() {
        let harness = BackupTestHarness::new();
        let root = harness.source_dir.path();
        fs::write(root.join("target.txt"), "content").unwrap();
        std::os::unix::fs::symlink("target.txt", root.join("link.txt")).unwrap();

        let report = harness.take_snapshot();
        assert_eq!(report.stats.symlinks_recreated, 1);

        let snap_link = report.snapshot_path.join("link.txt");
        let meta = fs::symlink_metadata(&snap_link).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            fs::read_link(&snap_link).unwrap(),
            PathBuf::from("target.txt")
        );
        // Reading through it inside the snapshot resolves to the copy.
        assert_eq!(fs::read_to_string(&snap_link).unwrap(), "content");
    }

    #[test]
    fn test_content_policy_end_to_end() {
        let harness = BackupTestHarness::new();
        let root = harness.source_dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        harness.take_snapshot();

        // Same size, new bytes, mtime forged back to the snapshot's.
        let previous = harness.runner.latest().unwrap().unwrap();
        let old_mtime = filetime::FileTime::from_last_modification_time(
            &fs::metadata(previous.path.join("a.txt")).unwrap(),
        );
        fs::write(root.join("a.txt"), "jello").unwrap();
        filetime::set_file_mtime(root.join("a.txt"), old_mtime).unwrap();

        let report = harness.take_snapshot_with(RunOptions {
            match_policy: MatchPolicy::Content,
            ..Default::default()
        });

        assert_eq!(report.stats.files_copied, 1);
        assert_eq!(report.stats.files_linked, 0);
        assert_eq!(
            fs::read_to_string(report.snapshot_path.join("a.txt")).unwrap(),
            "jello"
        );
    }
}
