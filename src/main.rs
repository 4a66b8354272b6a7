mod cli;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use cli::{Cli, Command};
use disktrend::config::Config;
use disktrend::logging;
use disktrend::model::{Entry, SnapshotStatus};
use disktrend::orchestrator::{ScanEvent, ScanOutcome};
use disktrend::service::DiskTrend;
use disktrend::util::{format_delta, format_size, format_timestamp};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let app = DiskTrend::open(&config).await?;

    match cli.command {
        Command::Scan { mount } => scan(&app, mount, cli.json).await,
        Command::Status => status(&app, cli.json).await,
        Command::Snapshots { mount, limit } => {
            let snapshots = app.list_snapshots(mount.as_deref(), limit).await?;
            if cli.json {
                return print_json(&snapshots);
            }
            println!("{:>6}  {:<16}  {:<10}  {:>10}  {:>10}  MOUNT", "ID", "STARTED", "STATUS", "SIZE", "FILES");
            for snapshot in snapshots {
                let (size, files) = snapshot
                    .totals
                    .map(|t| (format_size(t.size), t.files.to_string()))
                    .unwrap_or_else(|| ("-".into(), "-".into()));
                println!(
                    "{:>6}  {:<16}  {:<10}  {:>10}  {:>10}  {}",
                    snapshot.id,
                    format_timestamp(snapshot.started_at),
                    snapshot.status,
                    size,
                    files,
                    snapshot.mount_point
                );
            }
            Ok(())
        }
        Command::Browse { path, snapshot } => {
            let path = path.unwrap_or_else(|| {
                config
                    .scanner
                    .mount_points
                    .first()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "/".to_string())
            });
            let listing = app.browse(snapshot, &path).await?;
            if cli.json {
                return print_json(&listing);
            }
            println!("Snapshot {}", listing.snapshot_id);
            print_entry(&listing.current);
            for child in &listing.children {
                print!("  ");
                print_entry(child);
            }
            Ok(())
        }
        Command::History { path, days } => {
            let points = app.history(&path, days).await?;
            if cli.json {
                return print_json(&points);
            }
            if points.is_empty() {
                println!("No history for {path} in the last {days} days");
            }
            for point in points {
                println!(
                    "{:<16}  {:>10}  {:>8} files  {:>6} dirs",
                    format_timestamp(point.taken_at),
                    format_size(point.size),
                    point.file_count,
                    point.dir_count
                );
            }
            Ok(())
        }
        Command::Growth { limit, mount, removed, min_depth } => {
            let report = app.growth_report(mount.as_deref(), limit, removed, min_depth).await?;
            if cli.json {
                return print_json(&report);
            }
            let Some(report) = report else {
                println!("Need at least two completed snapshots to compare");
                return Ok(());
            };
            println!(
                "Growth from snapshot {} ({}) to {} ({})",
                report.earlier.id,
                format_timestamp(report.earlier.started_at),
                report.later.id,
                format_timestamp(report.later.started_at)
            );
            for row in &report.growth {
                println!(
                    "{:>10}  {:>8.1}%  {:>10}  {}",
                    format_delta(row.delta),
                    row.growth_percent,
                    format_size(row.current_size),
                    row.path
                );
            }
            if removed {
                println!("Removed:");
                for row in &report.removed {
                    println!("{:>10}  {}", format_size(row.previous_size), row.path);
                }
            }
            Ok(())
        }
        Command::Errors { snapshot, limit } => {
            let errors = app.scan_errors(snapshot, limit).await?;
            if cli.json {
                return print_json(&errors);
            }
            for error in errors {
                println!("{:<18}  {}  {}", error.kind, error.path, error.message);
            }
            Ok(())
        }
        Command::Prune { days } => {
            let days = days.unwrap_or(config.retention.days);
            let removed = app.prune(days).await?;
            if cli.json {
                return print_json(&serde_json::json!({ "removed": removed }));
            }
            println!("Removed {removed} snapshot(s)");
            Ok(())
        }
    }
}

async fn scan(app: &DiskTrend, mount: Option<PathBuf>, json: bool) -> Result<()> {
    // Subscribe before the run starts so the first event is not missed
    let mut events = app.orchestrator().hub().subscribe();
    let handle = app.trigger_scan(mount.as_deref())?;

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut cancelling = false;

    let outcomes: Vec<ScanOutcome> = loop {
        tokio::select! {
            outcomes = &mut wait => break outcomes?,
            event = events.recv() => match event {
                Ok(ScanEvent::Started { mount_point, .. }) => {
                    spinner.set_message(format!("Scanning {mount_point}"));
                }
                Ok(ScanEvent::Progress(progress)) => {
                    spinner.set_message(format!(
                        "{} entries, {} errors  {}",
                        progress.entries_processed, progress.errors_recorded, progress.path_being_scanned
                    ));
                }
                Ok(ScanEvent::Finished { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break (&mut wait).await?,
            },
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                cancelling = true;
                app.cancel_scan();
                spinner.set_message("Cancelling...");
            }
        }
    };
    spinner.finish_and_clear();

    if json {
        return print_json(&outcomes);
    }
    for outcome in &outcomes {
        match (outcome.status, outcome.totals) {
            (SnapshotStatus::Completed, Some(totals)) => println!(
                "{}: snapshot {} completed, {} in {} files and {} dirs, {} errors ({:.1}s)",
                outcome.mount_point,
                outcome.snapshot_id,
                format_size(totals.size),
                totals.files,
                totals.dirs,
                outcome.errors_recorded,
                outcome.elapsed_ms as f64 / 1000.0
            ),
            _ => println!(
                "{}: snapshot {} {}: {}",
                outcome.mount_point,
                outcome.snapshot_id,
                outcome.status,
                outcome.failure.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    Ok(())
}

async fn status(app: &DiskTrend, json: bool) -> Result<()> {
    let status = app.get_status();
    let overview = app.get_overview().await?;
    if json {
        return print_json(&serde_json::json!({ "status": status, "overview": overview }));
    }

    if let Some(progress) = &status.progress {
        println!(
            "Scan running: snapshot {} on {}, {} entries so far",
            progress.snapshot_id, progress.mount_point, progress.entries_processed
        );
    }
    let Some(snapshot) = &overview.snapshot else {
        println!("No completed snapshots yet");
        return Ok(());
    };
    let totals = snapshot.totals.unwrap_or_default();
    println!(
        "Snapshot {} of {} at {}: {} in {} files and {} dirs",
        snapshot.id,
        snapshot.mount_point,
        format_timestamp(snapshot.started_at),
        format_size(totals.size),
        totals.files,
        totals.dirs
    );

    println!("\nLargest directories:");
    for entry in &overview.top_directories {
        println!("{:>10}  {}", format_size(entry.size), entry.path);
    }
    if !overview.top_growth.is_empty() {
        println!("\nFastest growing:");
        for row in &overview.top_growth {
            println!("{:>10}  {}", format_delta(row.delta), row.path);
        }
    }
    Ok(())
}

fn print_entry(entry: &Entry) {
    let marker = if entry.is_dir { "/" } else { "" };
    println!(
        "{:>10}  {:>8} files  {:>6} dirs  {}{}",
        format_size(entry.size),
        entry.file_count,
        entry.dir_count,
        entry.name,
        marker
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
