//! Cross-database integrity, concurrency, and backup validation engine for
//! fleets of file-backed SQLite databases.
//!
//! The engine discovers database files under a root directory, introspects
//! their schemas, builds relationship graphs, counts orphaned records,
//! probes concurrent-access behavior, verifies backup/restore round-trips,
//! and scores compliance posture. It detects and reports; it never repairs
//! data or replicates anything.
//!
//! # Failure Policy
//! Every per-unit or per-trial failure is converted into result data at its
//! own boundary. A run produces a complete [`models::ValidationReport`]
//! covering every discovered unit, with failures visible as data rather
//! than process crashes. Only an empty discovery or an unusable scratch
//! directory is fatal.
//!
//! # Architecture
//! - Read-only database access everywhere except the lock-contention
//!   writer probe and `VACUUM INTO` backups
//! - Bounded worker pool across units; bounded fan-outs within trials
//! - Explicit tagged result structures per phase, no ad-hoc dictionaries

pub mod backup;
pub mod compliance;
pub mod concurrency;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod integrity;
pub mod introspect;
pub mod logging;
pub mod models;
pub mod runner;

// Re-export commonly used types
pub use config::AuditConfig;
pub use error::{AuditError, Result};
pub use logging::init_logging;
pub use models::{
    BackupArtifact, BackupRestoreResult, ComplianceScoreRecord, ConcurrencyTrialResult,
    DatabaseReport, DatabaseUnit, DependencyGraph, FindingSeverity, ForeignKeyEdge,
    OrphanFinding, RunSummary, SchemaSnapshot, SharedTablePattern, TableDescriptor,
    TrialKind, TrialStatus, UnitStatus, ValidationReport,
};
pub use runner::{FleetValidator, run_validation};
