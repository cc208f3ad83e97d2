//! Compliance posture scoring.
//!
//! Heuristic, explicitly non-authoritative trend indicators: audit-trail
//! coverage, retention-policy evidence, and basic security posture,
//! averaged into a bounded overall score. These numbers track drift between
//! runs; they certify nothing.

use std::path::Path;

use crate::models::{ComplianceScoreRecord, SchemaSnapshot};

/// Journal modes accepted by the durability check.
const ACCEPTED_JOURNAL_MODES: [&str; 2] = ["WAL", "DELETE"];

/// Column-name fragments indicating an expiry/retention policy.
const EXPIRY_KEYWORDS: [&str; 4] = ["expiry", "expire", "retention", "delete_at"];

/// Trigger-body fragments indicating cleanup automation.
const CLEANUP_KEYWORDS: [&str; 3] = ["delete", "expire", "cleanup"];

/// Scores one unit from its schema snapshot and file path.
pub fn score_unit(snapshot: &SchemaSnapshot, path: &Path) -> ComplianceScoreRecord {
    let audit = audit_score(snapshot);
    let retention = retention_score(snapshot);
    let security = security_score(snapshot, file_permissions_ok(path));

    ComplianceScoreRecord {
        audit_score: audit,
        retention_score: retention,
        security_score: security,
        overall: ((audit + retention + security) / 3.0).clamp(0.0, 100.0),
    }
}

/// Audit-trail heuristic: tables named for auditing, trigger coverage, and
/// tables carrying timestamp/date columns.
///
/// `min(100, audit_tables*20 + triggers*10 + timestamp_tables*5)`
pub fn audit_score(snapshot: &SchemaSnapshot) -> f64 {
    let audit_table_count = snapshot
        .tables
        .iter()
        .filter(|t| t.name.to_lowercase().contains("audit"))
        .count();

    let trigger_count = snapshot.triggers.len();

    let timestamp_table_count = snapshot
        .tables
        .iter()
        .filter(|t| {
            t.columns.iter().any(|c| {
                let name = c.name.to_lowercase();
                name.contains("timestamp") || name.contains("date")
            })
        })
        .count();

    let raw = audit_table_count * 20 + trigger_count * 10 + timestamp_table_count * 5;
    raw.min(100) as f64
}

/// Retention heuristic: expiry columns, archive/history tables, and
/// cleanup triggers, ten points each. Unclamped; the overall mean is
/// clamped instead.
pub fn retention_score(snapshot: &SchemaSnapshot) -> f64 {
    let expiry_column_count: usize = snapshot
        .tables
        .iter()
        .flat_map(|t| t.columns.iter())
        .filter(|c| {
            let name = c.name.to_lowercase();
            EXPIRY_KEYWORDS.iter().any(|k| name.contains(k))
        })
        .count();

    let archive_table_count = snapshot
        .tables
        .iter()
        .filter(|t| {
            let name = t.name.to_lowercase();
            name.contains("archive") || name.contains("history")
        })
        .count();

    let cleanup_trigger_count = snapshot
        .triggers
        .iter()
        .filter(|t| {
            t.definition.as_ref().is_some_and(|sql| {
                let sql = sql.to_lowercase();
                CLEANUP_KEYWORDS.iter().any(|k| sql.contains(k))
            })
        })
        .count();

    ((expiry_column_count + archive_table_count + cleanup_trigger_count) * 10) as f64
}

/// Security heuristic: 25 points each for file permissions, foreign-key
/// enforcement, and an accepted journal mode.
///
/// Encryption always contributes 0 — SQLite has no native encryption; this
/// is an intentional, documented gap in the score, not a defect.
pub fn security_score(snapshot: &SchemaSnapshot, permissions_ok: bool) -> f64 {
    let mut score = 0.0;
    if permissions_ok {
        score += 25.0;
    }
    if snapshot.engine.foreign_keys_enforced {
        score += 25.0;
    }
    if ACCEPTED_JOURNAL_MODES
        .iter()
        .any(|mode| snapshot.engine.journal_mode.eq_ignore_ascii_case(mode))
    {
        score += 25.0;
    }
    score
}

/// File-permission probe: the database file must not be world-writable.
///
/// On non-Unix platforms the probe passes whenever the file is statable.
pub fn file_permissions_ok(path: &Path) -> bool {
    match std::fs::metadata(path) {
        #[cfg(unix)]
        Ok(metadata) => {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode() & 0o002 == 0
        }
        #[cfg(not(unix))]
        Ok(_) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ColumnDescriptor, EngineAttributes, TableDescriptor, TriggerDescriptor,
    };

    fn column(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: "TEXT".to_string(),
            is_nullable: true,
            is_primary_key: false,
            ordinal_position: 0,
        }
    }

    fn table(name: &str, columns: Vec<ColumnDescriptor>) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            columns,
            foreign_keys: Vec::new(),
            row_count: None,
        }
    }

    fn trigger(name: &str, sql: &str) -> TriggerDescriptor {
        TriggerDescriptor {
            name: name.to_string(),
            table_name: "t".to_string(),
            definition: Some(sql.to_string()),
        }
    }

    fn snapshot(
        tables: Vec<TableDescriptor>,
        triggers: Vec<TriggerDescriptor>,
        journal_mode: &str,
        fk: bool,
    ) -> SchemaSnapshot {
        SchemaSnapshot {
            tables,
            triggers,
            engine: EngineAttributes {
                size_bytes: 4096,
                journal_mode: journal_mode.to_string(),
                foreign_keys_enforced: fk,
            },
        }
    }

    #[test]
    fn test_audit_score_components() {
        let snap = snapshot(
            vec![
                table("audit_log", vec![column("created_date")]),
                table("users", vec![column("name")]),
            ],
            vec![trigger("trg", "AFTER INSERT")],
            "wal",
            true,
        );

        // 1 audit table (20) + 1 trigger (10) + 1 timestamp table (5)
        assert_eq!(audit_score(&snap), 35.0);
    }

    #[test]
    fn test_audit_score_caps_at_100() {
        let tables: Vec<TableDescriptor> = (0..10)
            .map(|i| table(&format!("audit_{}", i), vec![column("timestamp")]))
            .collect();
        let snap = snapshot(tables, Vec::new(), "wal", true);

        assert_eq!(audit_score(&snap), 100.0);
    }

    #[test]
    fn test_retention_score_unclamped() {
        let tables: Vec<TableDescriptor> = (0..6)
            .map(|i| table(&format!("history_{}", i), vec![column("expiry_at")]))
            .collect();
        let snap = snapshot(tables, vec![trigger("cleanup", "DELETE FROM x")], "wal", true);

        // 6 expiry columns + 6 archive tables + 1 cleanup trigger = 13 * 10
        assert_eq!(retention_score(&snap), 130.0);
    }

    #[test]
    fn test_security_score_without_encryption_caps_at_75() {
        let snap = snapshot(Vec::new(), Vec::new(), "WAL", true);
        assert_eq!(security_score(&snap, true), 75.0);
    }

    #[test]
    fn test_security_score_rejects_unknown_journal_mode() {
        let snap = snapshot(Vec::new(), Vec::new(), "memory", false);
        assert_eq!(security_score(&snap, false), 0.0);
    }

    #[test]
    fn test_overall_bounded_for_any_input() {
        let huge: Vec<TableDescriptor> = (0..50)
            .map(|i| {
                table(
                    &format!("audit_history_{}", i),
                    vec![column("expiry_timestamp"), column("delete_at_date")],
                )
            })
            .collect();
        let snap = snapshot(huge, Vec::new(), "WAL", true);
        let record = score_unit(&snap, Path::new("/nonexistent"));

        assert!(record.overall >= 0.0);
        assert!(record.overall <= 100.0);

        let empty = snapshot(Vec::new(), Vec::new(), "off", false);
        let record = score_unit(&empty, Path::new("/nonexistent"));
        assert!(record.overall >= 0.0);
        assert!(record.overall <= 100.0);
    }

    #[test]
    fn test_permission_probe_missing_file_fails() {
        assert!(!file_permissions_ok(Path::new("/no/such/file.db")));
    }
}
