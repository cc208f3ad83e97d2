//! Validation run orchestration.
//!
//! Discovery feeds a bounded worker pool that validates units in parallel;
//! within one unit the phases run in dependency order (introspection before
//! graph and integrity, backup before restore). No lock is held across
//! units and no ordering is guaranteed between them — the report is an
//! unordered aggregation keyed by database name, sorted only for stable
//! output.
//!
//! Failure policy: every per-unit failure becomes result data at its own
//! boundary. Only an empty discovery or an unusable scratch directory
//! aborts the run.

use futures::StreamExt;
use std::path::Path;

use crate::Result;
use crate::backup::validate_backup_restore;
use crate::compliance::score_unit;
use crate::concurrency::run_trials;
use crate::config::AuditConfig;
use crate::discovery::discover_databases;
use crate::error::AuditError;
use crate::graph::{build_dependency_graph, find_shared_patterns};
use crate::integrity::check_integrity;
use crate::introspect::{introspect_unit, open_read_only};
use crate::models::{
    DatabaseReport, DatabaseUnit, FindingSeverity, RunSummary, TrialStatus, UnitStatus,
    ValidationReport,
};

/// Runs the full validation pipeline for a fleet of databases.
#[derive(Debug, Clone)]
pub struct FleetValidator {
    config: AuditConfig,
}

impl FleetValidator {
    /// Creates a validator with the given configuration.
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the validator configuration.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Executes a validation run and returns the immutable result tree.
    ///
    /// # Errors
    /// Fails only when the configuration is invalid, discovery yields zero
    /// units, or the scratch directory is not writable.
    pub async fn run(&self) -> Result<ValidationReport> {
        self.config.validate()?;

        let started_at = chrono::Utc::now();
        let clock = std::time::Instant::now();
        let run_id = uuid::Uuid::new_v4();
        // Artifact names carry the run timestamp plus a run tag so repeated
        // runs against the same scratch directory never collide.
        let run_tag = run_id.simple().to_string();
        let run_tag = run_tag.get(..8).unwrap_or(run_tag.as_str());
        let run_stamp = format!("{}_{}", started_at.format("%Y%m%d_%H%M%S"), run_tag);

        tracing::info!(
            "Starting validation run {} under {}",
            run_id,
            self.config.root.display()
        );

        let discovery = discover_databases(&self.config);
        if discovery.units.is_empty() {
            return Err(AuditError::NoDatabases {
                root: self.config.root.clone(),
            });
        }

        self.prepare_scratch_dir()?;

        let total_units = discovery.units.len();
        let mut databases: Vec<DatabaseReport> = futures::stream::iter(
            discovery.units.into_iter().enumerate().map(|(index, unit)| {
                // The index disambiguates same-named files from different
                // directories; no two units ever write the same artifact.
                self.validate_unit(unit, format!("{}_{}", run_stamp, index))
            }),
        )
        .buffer_unordered(self.config.worker_pool)
        .collect()
        .await;

        databases.sort_by(|a, b| a.name.cmp(&b.name));

        let table_sets: Vec<(String, Vec<String>)> = databases
            .iter()
            .map(|report| (report.name.clone(), report.tables.clone()))
            .collect();
        let shared_patterns = find_shared_patterns(&table_sets);

        let units_failed = databases
            .iter()
            .filter(|r| r.status == UnitStatus::Failed)
            .count();

        let summary = RunSummary {
            total_units,
            units_passed: total_units.saturating_sub(units_failed),
            units_failed,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        tracing::info!(
            "Validation run {} complete: {}/{} units passed in {}ms",
            run_id,
            summary.units_passed,
            summary.total_units,
            summary.duration_ms
        );

        Ok(ValidationReport {
            run_id,
            started_at,
            databases,
            shared_patterns,
            discovery_errors: discovery.errors,
            summary,
        })
    }

    /// Creates the scratch directory and verifies it is writable.
    /// Unwritable scratch is run-fatal: backup artifacts would have
    /// nowhere to go.
    fn prepare_scratch_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.scratch_dir).map_err(|e| {
            AuditError::configuration(format!(
                "scratch directory {} cannot be created: {}",
                self.config.scratch_dir.display(),
                e
            ))
        })?;

        let probe = self.config.scratch_dir.join(".fleetaudit_write_probe");
        std::fs::write(&probe, b"probe").map_err(|e| {
            AuditError::configuration(format!(
                "scratch directory {} is not writable: {}",
                self.config.scratch_dir.display(),
                e
            ))
        })?;
        let _ = std::fs::remove_file(&probe);
        Ok(())
    }

    /// Runs every validation phase for one unit, converting failures into
    /// report fields.
    async fn validate_unit(&self, unit: DatabaseUnit, artifact_stamp: String) -> DatabaseReport {
        tracing::debug!("Validating unit {}", unit.display_name);

        let snapshot = match introspect_unit(&unit).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Unit {} failed introspection: {}", unit.display_name, e);
                return DatabaseReport::connection_failed(&unit, e.to_string());
            }
        };

        let dependency_graph = build_dependency_graph(&snapshot);
        let foreign_key_edges = snapshot.foreign_key_edges();

        let orphan_findings = match open_read_only(&unit.canonical_path).await {
            Ok(pool) => {
                let findings = check_integrity(&pool, &foreign_key_edges).await;
                pool.close().await;
                findings
            }
            Err(e) => {
                tracing::warn!(
                    "Unit {} became unreadable before integrity checks: {}",
                    unit.display_name,
                    e
                );
                return DatabaseReport::connection_failed(&unit, e.to_string());
            }
        };

        let concurrency_trials = run_trials(&unit.canonical_path, &self.config).await;
        let backup_restore =
            validate_backup_restore(&unit, &self.config.scratch_dir, &artifact_stamp).await;
        let compliance = score_unit(&snapshot, &unit.canonical_path);

        let integrity_failed = orphan_findings
            .iter()
            .any(|f| f.severity == FindingSeverity::High);
        let trials_failed = concurrency_trials
            .iter()
            .any(|t| t.status == TrialStatus::Fail);
        let backup_failed = !backup_restore.integrity_verified;

        let status = if integrity_failed || trials_failed || backup_failed {
            UnitStatus::Failed
        } else {
            UnitStatus::Passed
        };

        DatabaseReport {
            name: unit.display_name.clone(),
            path: unit.canonical_path.clone(),
            status,
            tables: snapshot.tables.iter().map(|t| t.name.clone()).collect(),
            foreign_key_edges,
            dependency_graph: Some(dependency_graph),
            orphan_findings,
            concurrency_trials,
            backup_restore: Some(backup_restore),
            compliance: Some(compliance),
            error: None,
        }
    }
}

/// Convenience entry point: validates the fleet described by `config`.
pub async fn run_validation(config: AuditConfig) -> Result<ValidationReport> {
    FleetValidator::new(config).run().await
}

/// True when the scratch directory sits inside the discovery root.
///
/// The CLI uses this to warn the operator: without a matching denylist
/// entry, a later run would validate this run's backup artifacts.
pub fn scratch_inside_root(config: &AuditConfig) -> bool {
    fn normalized(path: &Path) -> std::path::PathBuf {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
    }
    normalized(&config.scratch_dir).starts_with(normalized(&config.root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_discovery_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig::new(dir.path(), dir.path().join("scratch"));

        let result = FleetValidator::new(config).run().await;
        assert!(matches!(result, Err(AuditError::NoDatabases { .. })));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            AuditConfig::new(dir.path(), dir.path().join("scratch")).with_connection_fanout(0);

        let result = FleetValidator::new(config).run().await;
        assert!(matches!(result, Err(AuditError::Configuration { .. })));
    }

    #[test]
    fn test_scratch_inside_root_detection() {
        let dir = tempfile::tempdir().unwrap();
        let inside = AuditConfig::new(dir.path(), dir.path().join("scratch"));
        assert!(scratch_inside_root(&inside));

        let other = tempfile::tempdir().unwrap();
        let outside = AuditConfig::new(dir.path(), other.path());
        assert!(!scratch_inside_root(&outside));
    }
}
