//! Backup/restore round-trip verification.
//!
//! The backup is taken with `VACUUM INTO` — the engine's transactionally
//! consistent copy of a read-only source, never a raw byte copy that could
//! capture a torn write. The artifact is then restored to a fresh location
//! and compared against the source on declared table structure and
//! per-table row counts.
//!
//! This is the only component that writes new files; everything lands under
//! the caller-specified scratch directory with unique names and is never
//! cleaned up here. An unreadable backup or restored copy is reported as a
//! discrepancy — it never passes by default.

use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

use crate::Result;
use crate::error::AuditError;
use crate::introspect::open_read_only;
use crate::models::{BackupArtifact, BackupRestoreResult, DatabaseUnit};

/// Structure and row-count comparison between a source and its restored
/// copy.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub structure_matches: bool,
    pub row_counts_match: bool,
    pub mismatched_tables: Vec<String>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Runs the full backup → restore → compare cycle for one unit.
///
/// Every failure is captured into the result; nothing here aborts the run
/// or another unit's processing.
pub async fn validate_backup_restore(
    unit: &DatabaseUnit,
    scratch_dir: &Path,
    run_stamp: &str,
) -> BackupRestoreResult {
    let backup_path = scratch_dir.join(format!("{}_backup_{}.db", unit.display_name, run_stamp));
    let restore_path =
        scratch_dir.join(format!("{}_restored_{}.db", unit.display_name, run_stamp));

    let artifact = match create_backup(&unit.canonical_path, &backup_path).await {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::warn!("Backup failed for {}: {}", unit.display_name, e);
            return BackupRestoreResult::failed(e.to_string());
        }
    };

    if !artifact.size_consistent {
        tracing::warn!(
            "Backup size discrepancy for {}: source {} bytes, backup {} bytes",
            unit.display_name,
            artifact.source_size_bytes,
            artifact.size_bytes
        );
    }

    if let Err(e) = restore_backup(&backup_path, &restore_path).await {
        tracing::warn!("Restore failed for {}: {}", unit.display_name, e);
        let mut result = BackupRestoreResult::failed(e.to_string());
        result.artifact = Some(artifact);
        return result;
    }

    match compare_databases(&unit.canonical_path, &restore_path).await {
        Ok(outcome) => {
            let integrity_verified = outcome.structure_matches && outcome.row_counts_match;
            if !integrity_verified {
                tracing::warn!(
                    "Backup round-trip mismatch for {}: {:?}",
                    unit.display_name,
                    outcome.mismatched_tables
                );
            }
            BackupRestoreResult {
                artifact: Some(artifact),
                restore_path: Some(restore_path),
                structure_matches: outcome.structure_matches,
                row_counts_match: outcome.row_counts_match,
                mismatched_tables: outcome.mismatched_tables,
                integrity_verified,
                error: None,
            }
        }
        Err(e) => {
            // Unreadable comparison target: a discrepancy, not a pass.
            tracing::warn!("Comparison failed for {}: {}", unit.display_name, e);
            let mut result = BackupRestoreResult::failed(format!("comparison failed: {}", e));
            result.artifact = Some(artifact);
            result.restore_path = Some(restore_path);
            result
        }
    }
}

/// Creates a consistent backup of `source` at `backup_path`.
pub async fn create_backup(source: &Path, backup_path: &Path) -> Result<BackupArtifact> {
    let source_size_bytes = std::fs::metadata(source)
        .map_err(|e| AuditError::io(format!("stat {}", source.display()), e))?
        .len();

    let pool = open_read_only(source).await?;
    let vacuum = format!(
        "VACUUM INTO '{}'",
        quote_sql_string(&backup_path.to_string_lossy())
    );
    let result = sqlx::query(&vacuum).execute(&pool).await;
    pool.close().await;
    result.map_err(|e| {
        AuditError::backup_failed(format!("consistent copy of {}", source.display()), e)
    })?;

    let size_bytes = std::fs::metadata(backup_path)
        .map_err(|e| AuditError::io(format!("stat {}", backup_path.display()), e))?
        .len();

    Ok(BackupArtifact {
        source_path: source.to_path_buf(),
        backup_path: backup_path.to_path_buf(),
        size_bytes,
        source_size_bytes,
        size_consistent: size_bytes == source_size_bytes,
        created_at: chrono::Utc::now(),
    })
}

/// Restores a backup artifact to a fresh location.
pub async fn restore_backup(backup_path: &Path, restore_path: &Path) -> Result<()> {
    let pool = open_read_only(backup_path).await?;
    let vacuum = format!(
        "VACUUM INTO '{}'",
        quote_sql_string(&restore_path.to_string_lossy())
    );
    let result = sqlx::query(&vacuum).execute(&pool).await;
    pool.close().await;
    result.map_err(|e| {
        AuditError::backup_failed(format!("restore to {}", restore_path.display()), e)
    })?;
    Ok(())
}

/// Compares declared table structure and per-table row counts between a
/// source database and a restored copy.
pub async fn compare_databases(source: &Path, restored: &Path) -> Result<ComparisonOutcome> {
    let source_pool = open_read_only(source).await?;
    let restored_pool = open_read_only(restored).await?;

    let outcome = compare_pools(&source_pool, &restored_pool).await;

    source_pool.close().await;
    restored_pool.close().await;
    outcome
}

async fn compare_pools(
    source: &SqlitePool,
    restored: &SqlitePool,
) -> Result<ComparisonOutcome> {
    let source_tables = table_definitions(source).await?;
    let restored_tables = table_definitions(restored).await?;

    let mut mismatched: Vec<String> = Vec::new();

    for (name, sql) in &source_tables {
        match restored_tables.get(name) {
            Some(restored_sql) if restored_sql == sql => {}
            _ => mismatched.push(name.clone()),
        }
    }
    for name in restored_tables.keys() {
        if !source_tables.contains_key(name) {
            mismatched.push(name.clone());
        }
    }

    let structure_matches = mismatched.is_empty();

    let mut row_counts_match = true;
    for name in source_tables.keys() {
        let source_count = count_rows(source, name).await?;
        // A table missing or unreadable in the restored copy is a count
        // mismatch for that table.
        let restored_count = count_rows(restored, name).await.ok();
        if restored_count != Some(source_count) {
            row_counts_match = false;
            if !mismatched.contains(name) {
                mismatched.push(name.clone());
            }
        }
    }

    mismatched.sort();
    mismatched.dedup();

    Ok(ComparisonOutcome {
        structure_matches,
        row_counts_match,
        mismatched_tables: mismatched,
    })
}

async fn table_definitions(pool: &SqlitePool) -> Result<BTreeMap<String, Option<String>>> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT name, sql
        FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AuditError::introspection_failed("Failed to read table definitions", e))?;

    Ok(rows.into_iter().collect())
}

async fn count_rows(pool: &SqlitePool, table: &str) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count: i64 = sqlx::query_scalar(&query).fetch_one(pool).await.map_err(|e| {
        AuditError::introspection_failed(format!("Failed to count rows in '{}'", table), e)
    })?;
    Ok(count.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_sql_string() {
        assert_eq!(quote_sql_string("/tmp/it's.db"), "/tmp/it''s.db");
    }
}
