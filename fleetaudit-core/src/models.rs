//! Data model for validation runs.
//!
//! Every type here is created fresh at the start of a run, owned by exactly
//! one component while it is being built, and assembled into the immutable
//! [`ValidationReport`] tree that is the engine's sole output contract.
//! Each phase reports through its own tagged structure so consumers match
//! exhaustively instead of probing optional keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One discovered file-backed database under validation.
///
/// Deduplicated by canonical (symlink-resolved) path; immutable after
/// discovery for the remainder of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUnit {
    /// Resolved, symlink-free path to the database file
    pub canonical_path: PathBuf,
    /// Human-facing name, derived from the file stem
    pub display_name: String,
}

impl DatabaseUnit {
    /// Creates a unit from a canonical path, deriving the display name.
    pub fn new(canonical_path: PathBuf) -> Self {
        let display_name = canonical_path
            .file_stem()
            .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            canonical_path,
            display_name,
        }
    }
}

/// Column metadata from `PRAGMA table_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: u32,
}

/// A single-column foreign-key reference.
///
/// Composite foreign keys appear as one edge per column pair, the shape
/// `PRAGMA foreign_key_list` reports them in. The target table always lives
/// in the same database; cross-database relationships are inferred by name
/// matching only (see [`SharedTablePattern`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

/// Table metadata owned by one [`DatabaseUnit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyEdge>,
    pub row_count: Option<u64>,
}

/// Trigger metadata, consumed by the compliance scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    pub table_name: String,
    pub definition: Option<String>,
}

/// PRAGMA-derived engine facts for one database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAttributes {
    pub size_bytes: u64,
    pub journal_mode: String,
    pub foreign_keys_enforced: bool,
}

/// Full introspection output for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableDescriptor>,
    pub triggers: Vec<TriggerDescriptor>,
    pub engine: EngineAttributes,
}

impl SchemaSnapshot {
    /// All foreign-key edges across the snapshot's tables.
    pub fn foreign_key_edges(&self) -> Vec<ForeignKeyEdge> {
        self.tables
            .iter()
            .flat_map(|t| t.foreign_keys.iter().cloned())
            .collect()
    }
}

/// Severity of an orphaned-record finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingSeverity {
    /// No orphaned rows
    Ok,
    /// The check could not run because the table or column vanished
    /// between introspection and counting
    Warning,
    /// One or more orphaned rows
    High,
}

/// Orphaned-record count for one foreign-key edge.
///
/// Derived and recomputed every run; never persisted across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanFinding {
    pub edge: ForeignKeyEdge,
    pub orphaned_rows: u64,
    pub severity: FindingSeverity,
}

/// Which concurrency probe a trial result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialKind {
    Connection,
    Lock,
    Throughput,
}

/// Trial outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrialStatus {
    Pass,
    Fail,
}

/// Latency rating for the throughput trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PerformanceRating {
    Excellent,
    Good,
}

/// Aggregate latency in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Result of one bounded, cancellable concurrency probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyTrialResult {
    pub kind: TrialKind,
    pub status: TrialStatus,
    /// Completed attempts over total attempts, always within [0, 1]
    pub success_rate: f64,
    pub latency: Option<LatencyStats>,
    pub rating: Option<PerformanceRating>,
    pub detail: Option<String>,
}

/// The consistent, point-in-time copy produced for restore verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub size_bytes: u64,
    /// Source file size at the instant the backup was taken
    pub source_size_bytes: u64,
    /// False is a reported discrepancy, never silently accepted
    pub size_consistent: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Backup/restore round-trip verification outcome for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRestoreResult {
    pub artifact: Option<BackupArtifact>,
    pub restore_path: Option<PathBuf>,
    pub structure_matches: bool,
    pub row_counts_match: bool,
    /// Tables whose structure or row count diverged between source and
    /// restored copy
    pub mismatched_tables: Vec<String>,
    pub integrity_verified: bool,
    pub error: Option<String>,
}

impl BackupRestoreResult {
    /// A result representing a backup or restore failure. An unreadable
    /// comparison target is a discrepancy, not a pass.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            artifact: None,
            restore_path: None,
            structure_matches: false,
            row_counts_match: false,
            mismatched_tables: Vec::new(),
            integrity_verified: false,
            error: Some(error.into()),
        }
    }
}

/// Heuristic compliance scores for one unit. Trend indicators only,
/// never a certification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceScoreRecord {
    pub audit_score: f64,
    pub retention_score: f64,
    pub security_score: f64,
    /// Unweighted mean of the three sub-scores, clamped to [0, 100]
    pub overall: f64,
}

/// Upstream/downstream classification for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableLineage {
    /// Tables this table references through its foreign keys
    pub upstream: Vec<String>,
    /// Tables whose foreign keys reference this table
    pub downstream: Vec<String>,
}

/// Per-database table dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub tables: Vec<String>,
    pub edges: Vec<ForeignKeyEdge>,
    pub lineage: BTreeMap<String, TableLineage>,
}

/// Tables bearing the identical name in two or more databases.
///
/// Confidence is purely lexical equality; this is a heuristic join
/// candidate, not a referential guarantee. All occurrences are listed and
/// none is treated as canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedTablePattern {
    pub table_name: String,
    pub databases: Vec<String>,
}

/// A path skipped during discovery, recorded as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryErrorRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Overall pass/fail classification for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Passed,
    Failed,
}

/// Everything the run learned about one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseReport {
    pub name: String,
    pub path: PathBuf,
    pub status: UnitStatus,
    pub tables: Vec<String>,
    pub foreign_key_edges: Vec<ForeignKeyEdge>,
    pub dependency_graph: Option<DependencyGraph>,
    pub orphan_findings: Vec<OrphanFinding>,
    pub concurrency_trials: Vec<ConcurrencyTrialResult>,
    pub backup_restore: Option<BackupRestoreResult>,
    pub compliance: Option<ComplianceScoreRecord>,
    /// Set when the unit could not be introspected at all
    pub error: Option<String>,
}

impl DatabaseReport {
    /// A report for a unit whose file could not be opened or introspected.
    pub fn connection_failed(unit: &DatabaseUnit, error: impl Into<String>) -> Self {
        Self {
            name: unit.display_name.clone(),
            path: unit.canonical_path.clone(),
            status: UnitStatus::Failed,
            tables: Vec::new(),
            foreign_key_edges: Vec::new(),
            dependency_graph: None,
            orphan_findings: Vec::new(),
            concurrency_trials: Vec::new(),
            backup_restore: None,
            compliance: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate run statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_units: usize,
    pub units_passed: usize,
    pub units_failed: usize,
    pub duration_ms: u64,
}

/// The immutable result tree handed to the external report generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: uuid::Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub databases: Vec<DatabaseReport>,
    pub shared_patterns: Vec<SharedTablePattern>,
    pub discovery_errors: Vec<DiscoveryErrorRecord>,
    pub summary: RunSummary,
}

impl ValidationReport {
    /// True when at least one unit failed after a successful discovery.
    /// Callers map this to a non-zero process status.
    pub fn has_failures(&self) -> bool {
        self.summary.units_failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_unit_display_name_from_stem() {
        let unit = DatabaseUnit::new(PathBuf::from("/data/analytics.db"));
        assert_eq!(unit.display_name, "analytics");
        assert_eq!(unit.canonical_path, PathBuf::from("/data/analytics.db"));
    }

    #[test]
    fn test_backup_restore_failed_is_discrepancy() {
        let result = BackupRestoreResult::failed("restored copy unreadable");
        assert!(!result.integrity_verified);
        assert!(!result.structure_matches);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_report_serde_roundtrip() {
        let report = ValidationReport {
            run_id: uuid::Uuid::nil(),
            started_at: chrono::Utc::now(),
            databases: Vec::new(),
            shared_patterns: vec![SharedTablePattern {
                table_name: "users".to_string(),
                databases: vec!["a".to_string(), "b".to_string()],
            }],
            discovery_errors: Vec::new(),
            summary: RunSummary {
                total_units: 0,
                units_passed: 0,
                units_failed: 0,
                duration_ms: 12,
            },
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.shared_patterns, report.shared_patterns);
        assert!(!parsed.has_failures());
    }

    #[test]
    fn test_has_failures() {
        let mut report = ValidationReport {
            run_id: uuid::Uuid::nil(),
            started_at: chrono::Utc::now(),
            databases: Vec::new(),
            shared_patterns: Vec::new(),
            discovery_errors: Vec::new(),
            summary: RunSummary {
                total_units: 3,
                units_passed: 3,
                units_failed: 0,
                duration_ms: 0,
            },
        };
        assert!(!report.has_failures());

        report.summary.units_failed = 1;
        assert!(report.has_failures());
    }
}
