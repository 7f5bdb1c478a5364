//! # Snaplink CLI - Incremental directory backups
//!
//! Command-line interface for the snaplink backup library.
//!
//! ## Features
//! - Take timestamped snapshots with hard-link deduplication
//! - List snapshots and resolve the `latest` alias
//! - Verify snapshots against the source tree
//! - Compare two snapshots
//! - Report how much disk space hard links save
//!
//! ## Usage
//! ```bash
//! # Back up a directory
//! snaplink -s ~/documents -b /backups/documents run
//!
//! # List snapshots
//! snaplink -b /backups/documents list
//!
//! # Verify the newest snapshot, hashing file contents
//! snaplink -s ~/documents -b /backups/documents verify --checksum
//!
//! # What changed between two snapshots?
//! snaplink -b /backups/documents diff 2024-06-01_14:03:59 latest
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use snaplink::{
    DiffOptions, MatchPolicy, ProgressCallback, ProgressInfo, Result, RunOptions, SnaplinkError,
    Snapshot, SnapshotRunner, VerifyOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Snaplink CLI - incremental snapshot backups with hard links
#[derive(Parser)]
#[command(name = "snaplink")]
#[command(version)]
#[command(about = "Incremental directory backups: full browsable snapshots, incremental disk cost")]
#[command(long_about = None)]
struct Cli {
    /// Source directory to back up (defaults to current directory)
    #[arg(short, long, global = true, env = "SNAPLINK_SOURCE")]
    source: Option<PathBuf>,

    /// Backup root that holds the snapshots
    #[arg(short, long, global = true, env = "SNAPLINK_BACKUP")]
    backup: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a snapshot
    Run {
        /// Top-level names to exclude (glob patterns; replaces the default `.cache`)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Hash file contents instead of trusting size and mtime
        #[arg(long)]
        checksum: bool,

        /// Plan the run without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Show progress
        #[arg(long)]
        progress: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List snapshots, oldest first
    #[command(alias = "ls")]
    List {
        /// Show per-snapshot file and byte counts
        #[arg(short, long)]
        detailed: bool,

        /// Limit results to the newest N snapshots
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the snapshot list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the snapshot the `latest` alias points at
    Latest {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify a snapshot against the source tree
    Verify {
        /// Snapshot name (defaults to latest)
        snapshot: Option<String>,

        /// Top-level names to exclude, matching the run that took the snapshot
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Hash file contents instead of comparing mtimes
        #[arg(long)]
        checksum: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two snapshots
    Diff {
        /// Older snapshot name, or `latest`
        from: String,

        /// Newer snapshot name, or `latest`
        to: String,

        /// Hash same-size file pairs instead of comparing mtimes
        #[arg(long)]
        checksum: bool,

        /// Show only statistics
        #[arg(long)]
        stat: bool,

        /// Print the diff as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show hard-link deduplication statistics
    Stats {
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let source = cli.source.unwrap_or_else(|| PathBuf::from("."));
    let backup_root = cli.backup.ok_or_else(|| {
        SnaplinkError::internal("no backup root specified; pass --backup or set SNAPLINK_BACKUP")
    })?;

    match cli.command {
        Commands::Run {
            exclude,
            checksum,
            dry_run,
            progress,
            json,
        } => cmd_run(
            build_runner(source, backup_root, exclude)?,
            checksum,
            dry_run,
            progress,
            json,
        ),
        Commands::List {
            detailed,
            limit,
            json,
        } => cmd_list(build_runner(source, backup_root, vec![])?, detailed, limit, json),
        Commands::Latest { json } => cmd_latest(build_runner(source, backup_root, vec![])?, json),
        Commands::Verify {
            snapshot,
            exclude,
            checksum,
            json,
        } => cmd_verify(
            build_runner(source, backup_root, exclude)?,
            snapshot,
            checksum,
            json,
        ),
        Commands::Diff {
            from,
            to,
            checksum,
            stat,
            json,
        } => cmd_diff(
            build_runner(source, backup_root, vec![])?,
            from,
            to,
            checksum,
            stat,
            json,
        ),
        Commands::Stats { json } => cmd_stats(build_runner(source, backup_root, vec![])?, json),
    }
}

/// Build a runner; an empty exclude list keeps the defaults
fn build_runner(
    source: PathBuf,
    backup_root: PathBuf,
    exclude: Vec<String>,
) -> Result<SnapshotRunner> {
    let mut builder = SnapshotRunner::builder();
    if !exclude.is_empty() {
        builder = builder.exclude_patterns(exclude);
    }
    builder.build(source, backup_root)
}

/// Take a snapshot
///
/// Every run creates a complete browsable copy of the source; files
/// unchanged since the previous snapshot are hard links, so the run only
/// costs disk space for what changed.
fn cmd_run(
    runner: SnapshotRunner,
    checksum: bool,
    dry_run: bool,
    show_progress: bool,
    json: bool,
) -> Result<()> {
    let match_policy = if checksum {
        MatchPolicy::Content
    } else {
        MatchPolicy::SizeAndMtime
    };

    if !json {
        if dry_run {
            println!("{}", "Planning snapshot (dry run)...".blue().bold());
        } else {
            println!("{}", "Taking snapshot...".blue().bold());
        }
    }

    let progress = if show_progress && !json {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message("Scanning source...");
        Some(pb)
    } else {
        None
    };

    let progress_callback = progress.as_ref().map(|pb| {
        let pb = pb.clone();
        Arc::new(move |info: ProgressInfo| {
            if let Some(item) = &info.current_item {
                pb.set_message(format!(
                    "{}/{} {}",
                    info.processed,
                    info.total.unwrap_or(0),
                    item
                ));
            }
            pb.tick();
        }) as ProgressCallback
    });

    let report = runner.run(RunOptions {
        match_policy,
        dry_run,
        progress_callback,
    })?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.dry_run {
        println!(
            "{} Would create snapshot {}",
            "✓".green().bold(),
            report.snapshot_name.yellow().bold()
        );
    } else {
        println!(
            "{} Created snapshot {}",
            "✓".green().bold(),
            report.snapshot_name.yellow().bold()
        );
    }

    let stats = &report.stats;
    println!(
        "  Linked: {} files ({})",
        stats.files_linked.to_string().cyan(),
        format_bytes(stats.bytes_linked).cyan()
    );
    println!(
        "  Copied: {} files ({})",
        stats.files_copied.to_string().cyan(),
        format_bytes(stats.bytes_copied).cyan()
    );
    println!(
        "  Directories: {} | Symlinks: {}",
        stats.dirs_created, stats.symlinks_recreated
    );
    if stats.entries_excluded > 0 {
        println!("  Excluded: {} top-level entries", stats.entries_excluded);
    }
    if stats.bytes_total() > 0 {
        println!(
            "  Deduplicated: {}",
            format!("{:.1}%", stats.dedup_ratio() * 100.0).green()
        );
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms))
            .to_string()
            .cyan()
    );

    Ok(())
}

/// List snapshots
///
/// Snapshots are shown oldest first; the one `latest` points at is
/// marked with `*`.
fn cmd_list(
    runner: SnapshotRunner,
    detailed: bool,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let snapshots = runner.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("{}", "No snapshots found.".yellow());
        return Ok(());
    }

    let latest_name = runner.latest()?.map(|s| s.name);
    let usage_by_name = if detailed {
        runner
            .link_stats()?
            .per_snapshot
            .into_iter()
            .map(|u| (u.name.clone(), u))
            .collect()
    } else {
        std::collections::HashMap::new()
    };

    println!("{}", "Snapshots:".blue().bold());
    println!();

    let display_count = limit.unwrap_or(snapshots.len()).min(snapshots.len());
    let skipped = snapshots.len() - display_count;

    for snapshot in snapshots.iter().skip(skipped) {
        let marker = if latest_name.as_deref() == Some(snapshot.name.as_str()) {
            "*".green().bold()
        } else {
            " ".normal()
        };
        print!("{} {}", marker, snapshot.name.yellow().bold());
        if latest_name.as_deref() == Some(snapshot.name.as_str()) {
            print!(" {}", "(latest)".green().dimmed());
        }
        println!();

        if detailed {
            if let Some(usage) = usage_by_name.get(&snapshot.name) {
                println!(
                    "    Files: {} | Size: {} | New data: {}",
                    usage.file_count.to_string().dimmed(),
                    format_bytes(usage.logical_bytes).dimmed(),
                    format_bytes(usage.owned_bytes).dimmed()
                );
            }
        }
    }

    if skipped > 0 {
        println!(
            "\n{}",
            format!("Showing {} of {} snapshots", display_count, snapshots.len()).dimmed()
        );
    }

    Ok(())
}

/// Print the snapshot the `latest` alias points at
fn cmd_latest(runner: SnapshotRunner, json: bool) -> Result<()> {
    let latest = runner.latest()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&latest)?);
        return Ok(());
    }

    match latest {
        Some(snapshot) => {
            println!("{}", snapshot.name.yellow().bold());
            println!("  Path: {}", snapshot.path.display().to_string().cyan());
        }
        None => println!("{}", "No latest snapshot.".yellow()),
    }

    Ok(())
}

/// Verify a snapshot against the source tree
///
/// Exits non-zero when the snapshot differs from the source, so the
/// command can gate scripts the way `diff -q` does.
fn cmd_verify(
    runner: SnapshotRunner,
    snapshot: Option<String>,
    checksum: bool,
    json: bool,
) -> Result<()> {
    let snapshot = resolve_named(&runner, snapshot.as_deref().unwrap_or("latest"))?;

    if !json {
        println!(
            "{} {}",
            "Verifying snapshot".blue().bold(),
            snapshot.name.yellow()
        );
    }

    let report = runner.verify(&snapshot, VerifyOptions { checksum })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_valid() {
        println!(
            "{} {}",
            "✓".green().bold(),
            report.summary().green()
        );
    } else {
        if !report.missing.is_empty() {
            println!("\n{}", "Missing from snapshot:".red().bold());
            for path in report.missing.iter().take(10) {
                println!("  - {}", path.display().to_string().red());
            }
            if report.missing.len() > 10 {
                println!("  ... and {} more", report.missing.len() - 10);
            }
        }
        if !report.extra.is_empty() {
            println!("\n{}", "Not in source:".yellow().bold());
            for path in report.extra.iter().take(10) {
                println!("  + {}", path.display().to_string().yellow());
            }
            if report.extra.len() > 10 {
                println!("  ... and {} more", report.extra.len() - 10);
            }
        }
        if !report.mismatched.is_empty() {
            println!("\n{}", "Mismatched:".yellow().bold());
            for mismatch in report.mismatched.iter().take(10) {
                println!(
                    "  ~ {} ({}: {})",
                    mismatch.path.display().to_string().yellow(),
                    mismatch.kind.as_str(),
                    mismatch.detail.dimmed()
                );
            }
            if report.mismatched.len() > 10 {
                println!("  ... and {} more", report.mismatched.len() - 10);
            }
        }
        println!();
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(SnaplinkError::VerificationFailed(report.summary()))
    }
}

/// Compare two snapshots
///
/// Changes between snapshots are normal output, not failures; the
/// command exits zero whether or not the snapshots differ.
fn cmd_diff(
    runner: SnapshotRunner,
    from: String,
    to: String,
    checksum: bool,
    stat_only: bool,
    json: bool,
) -> Result<()> {
    let from = resolve_named(&runner, &from)?;
    let to = resolve_named(&runner, &to)?;

    let diff = runner.diff(&from, &to, DiffOptions { checksum })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    println!(
        "{} {} → {}",
        "Comparing".blue().bold(),
        diff.from_name.yellow(),
        diff.to_name.yellow()
    );
    println!();

    println!("{}", "Summary:".bold());
    println!(
        "  Added: {} entries ({})",
        diff.stats.entries_added.to_string().green(),
        format_bytes(diff.stats.bytes_added).green()
    );
    println!(
        "  Deleted: {} entries ({})",
        diff.stats.entries_deleted.to_string().red(),
        format_bytes(diff.stats.bytes_deleted).red()
    );
    println!(
        "  Modified: {} files",
        diff.stats.files_modified.to_string().yellow()
    );
    println!(
        "  Unchanged: {} files ({} hard-linked)",
        diff.stats.files_unchanged, diff.stats.files_linked
    );

    if stat_only || diff.is_empty() {
        return Ok(());
    }

    if !diff.added.is_empty() {
        println!("\n{}", "Added:".green().bold());
        for path in diff.added.iter().take(10) {
            println!("  + {}", path.display().to_string().green());
        }
        if diff.added.len() > 10 {
            println!("  ... and {} more", diff.added.len() - 10);
        }
    }

    if !diff.modified.is_empty() {
        println!("\n{}", "Modified:".yellow().bold());
        for entry in diff.modified.iter().take(10) {
            println!(
                "  ~ {} ({} → {})",
                entry.path.display().to_string().yellow(),
                format_bytes(entry.from_size),
                format_bytes(entry.to_size)
            );
        }
        if diff.modified.len() > 10 {
            println!("  ... and {} more", diff.modified.len() - 10);
        }
    }

    if !diff.deleted.is_empty() {
        println!("\n{}", "Deleted:".red().bold());
        for path in diff.deleted.iter().take(10) {
            println!("  - {}", path.display().to_string().red());
        }
        if diff.deleted.len() > 10 {
            println!("  ... and {} more", diff.deleted.len() - 10);
        }
    }

    Ok(())
}

/// Show hard-link deduplication statistics
fn cmd_stats(runner: SnapshotRunner, json: bool) -> Result<()> {
    let stats = runner.link_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Backup root statistics:".blue().bold());
    println!();
    println!("  Snapshots: {}", stats.snapshot_count.to_string().cyan());
    println!(
        "  File entries: {} ({} unique)",
        stats.file_count.to_string().cyan(),
        stats.unique_file_count.to_string().cyan()
    );
    println!(
        "  Logical size: {}",
        format_bytes(stats.logical_bytes).cyan()
    );
    println!(
        "  On disk: {}",
        format_bytes(stats.physical_bytes).cyan()
    );
    println!(
        "  Saved by hard links: {} ({:.1}x)",
        format_bytes(stats.saved_bytes()).green(),
        stats.dedup_ratio()
    );

    if !stats.per_snapshot.is_empty() {
        println!("\n{}", "Per snapshot:".bold());
        for usage in &stats.per_snapshot {
            println!(
                "  {} {} files, {} total, {} new",
                usage.name.yellow(),
                usage.file_count,
                format_bytes(usage.logical_bytes).dimmed(),
                format_bytes(usage.owned_bytes).dimmed()
            );
        }
    }

    Ok(())
}

// Helper functions

/// Resolve a snapshot argument; `latest` follows the alias
fn resolve_named(runner: &SnapshotRunner, name: &str) -> Result<Snapshot> {
    if name == "latest" {
        runner
            .latest()?
            .ok_or_else(|| SnaplinkError::SnapshotNotFound("latest".to_string()))
    } else {
        runner.resolve_snapshot(name)
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
