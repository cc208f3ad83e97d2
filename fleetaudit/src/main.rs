//! Fleet validation CLI.
//!
//! Thin collaborator around `fleetaudit-core`: parses arguments, runs the
//! validation engine, writes the JSON result tree, and maps unit failures
//! to the process exit code.
//!
//! Exit codes: 0 when every unit passed, 1 when at least one unit failed
//! validation, 2 on a run-fatal error (no databases found, unwritable
//! scratch directory, invalid configuration).

use clap::{Args, Parser};
use fleetaudit_core::{AuditConfig, FleetValidator, ValidationReport, init_logging};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fleetaudit")]
#[command(about = "Integrity, concurrency, and backup validation for SQLite fleets")]
#[command(version)]
#[command(long_about = "
fleetaudit - SQLite fleet validation

Discovers file-backed SQLite databases under a root directory and validates:
- Foreign-key referential integrity (orphaned records)
- Cross-database table relationships (name-matched, heuristic)
- Concurrent access behavior (connection, lock, throughput trials)
- Backup/restore round-trip integrity
- Compliance posture heuristics (audit, retention, security)

The engine is read-only apart from backup artifacts written to the scratch
directory and a brief lock probe. Databases are never modified.

EXAMPLES:
  fleetaudit --root ./databases --scratch-dir ./backups
  fleetaudit --root /var/lib/fleet --depth 2 --exclude backups,tmp -o report.json
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Root directory to search for database files
    #[arg(long, env = "FLEETAUDIT_ROOT", default_value = "databases")]
    root: PathBuf,

    /// Directory that receives backup and restore artifacts
    #[arg(long, env = "FLEETAUDIT_SCRATCH", default_value = "database_backups")]
    scratch_dir: PathBuf,

    /// Maximum directory depth for discovery
    #[arg(long, default_value = "3")]
    depth: usize,

    /// Comma-separated path components to exclude from discovery
    #[arg(long, value_delimiter = ',', default_value = "backup,backups")]
    exclude: Vec<String>,

    /// Worker pool size for parallel per-database validation
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Concurrent connections opened by the connection trial
    #[arg(long, default_value = "5")]
    connection_fanout: usize,

    /// Bounded reader wait for the lock trial, in milliseconds
    #[arg(long, default_value = "10000")]
    lock_wait_ms: u64,

    /// Concurrent queries issued by the throughput trial
    #[arg(long, default_value = "10")]
    throughput_fanout: usize,

    /// Average latency threshold for an EXCELLENT throughput rating (ms)
    #[arg(long, default_value = "100")]
    latency_threshold_ms: u64,

    /// Output file for the JSON result tree
    #[arg(short, long, default_value = "fleetaudit_report.json")]
    output: PathBuf,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only show errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> (AuditConfig, PathBuf) {
        let config = AuditConfig::new(self.root, self.scratch_dir)
            .with_max_discovery_depth(self.depth)
            .with_denylist(self.exclude)
            .with_worker_pool(self.workers)
            .with_connection_fanout(self.connection_fanout)
            .with_lock_wait(Duration::from_millis(self.lock_wait_ms))
            .with_throughput_fanout(self.throughput_fanout)
            .with_latency_threshold_ms(self.latency_threshold_ms as f64);
        (config, self.output)
    }
}

fn print_summary(report: &ValidationReport) {
    println!(
        "Validated {} databases: {} passed, {} failed ({}ms)",
        report.summary.total_units,
        report.summary.units_passed,
        report.summary.units_failed,
        report.summary.duration_ms
    );

    for db in &report.databases {
        match &db.error {
            Some(error) => println!("  {} - FAILED: {}", db.name, error),
            None => {
                let orphans: u64 = db.orphan_findings.iter().map(|f| f.orphaned_rows).sum();
                println!(
                    "  {} - {:?}: {} tables, {} foreign keys, {} orphaned rows",
                    db.name,
                    db.status,
                    db.tables.len(),
                    db.foreign_key_edges.len(),
                    orphans
                );
            }
        }
    }

    if !report.shared_patterns.is_empty() {
        println!(
            "Shared table names across databases (lexical match only): {}",
            report.shared_patterns.len()
        );
    }
}

async fn run(cli: Cli) -> anyhow::Result<ValidationReport> {
    let (config, output) = cli.into_config();

    if fleetaudit_core::runner::scratch_inside_root(&config) {
        warn!(
            "Scratch directory {} is inside the discovery root; backup artifacts \
             will be candidates for the next run unless denylisted",
            config.scratch_dir.display()
        );
    }

    let report = FleetValidator::new(config).run().await?;

    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&output, json).await?;
    info!("Report written to {}", output.display());

    Ok(report)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    match run(cli).await {
        Ok(report) => {
            print_summary(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Validation run failed: {:#}", e);
            std::process::exit(2);
        }
    }
}
