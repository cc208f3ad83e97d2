//! Orphaned-record detection.
//!
//! For every foreign-key edge, counts the source rows whose non-NULL key
//! value matches no row in the target table. The check is read-only and
//! idempotent: re-running against an unchanged database yields identical
//! findings.
//!
//! External writers may drop a table between introspection and counting;
//! that race downgrades the affected finding to a warning instead of
//! aborting the unit.

use sqlx::SqlitePool;

use crate::models::{FindingSeverity, ForeignKeyEdge, OrphanFinding};

/// Quotes an identifier for interpolation into a SQL statement.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Counts orphaned rows for each foreign-key edge.
///
/// Every edge produces exactly one finding: `High` when orphaned rows
/// exist, `Ok` when none do, and `Warning` when the count could not be
/// computed (vanished table or column, or an unresolvable implicit
/// primary-key reference).
pub async fn check_integrity(pool: &SqlitePool, edges: &[ForeignKeyEdge]) -> Vec<OrphanFinding> {
    let mut findings = Vec::with_capacity(edges.len());

    for edge in edges {
        findings.push(check_edge(pool, edge).await);
    }

    findings
}

async fn check_edge(pool: &SqlitePool, edge: &ForeignKeyEdge) -> OrphanFinding {
    if edge.target_column.is_empty() {
        tracing::warn!(
            "Foreign key {}.{} -> {} has no resolvable target column",
            edge.source_table,
            edge.source_column,
            edge.target_table
        );
        return OrphanFinding {
            edge: edge.clone(),
            orphaned_rows: 0,
            severity: FindingSeverity::Warning,
        };
    }

    let query = format!(
        "SELECT COUNT(*) FROM {src} s \
         LEFT JOIN {tgt} t ON s.{src_col} = t.{tgt_col} \
         WHERE t.{tgt_col} IS NULL AND s.{src_col} IS NOT NULL",
        src = quote_ident(&edge.source_table),
        tgt = quote_ident(&edge.target_table),
        src_col = quote_ident(&edge.source_column),
        tgt_col = quote_ident(&edge.target_column),
    );

    match sqlx::query_scalar::<_, i64>(&query).fetch_one(pool).await {
        Ok(count) => {
            let orphaned_rows = count.unsigned_abs();
            let severity = if orphaned_rows > 0 {
                FindingSeverity::High
            } else {
                FindingSeverity::Ok
            };
            OrphanFinding {
                edge: edge.clone(),
                orphaned_rows,
                severity,
            }
        }
        Err(e) => {
            // Table or column gone since introspection, or any other
            // per-edge failure: report a warning, never abort the unit.
            tracing::warn!(
                "Orphan check for {}.{} -> {}.{} could not run: {}",
                edge.source_table,
                edge.source_column,
                edge.target_table,
                edge.target_column,
                e
            );
            OrphanFinding {
                edge: edge.clone(),
                orphaned_rows: 0,
                severity: FindingSeverity::Warning,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    fn edge(src: &str, src_col: &str, tgt: &str, tgt_col: &str) -> ForeignKeyEdge {
        ForeignKeyEdge {
            source_table: src.to_string(),
            source_column: src_col.to_string(),
            target_table: tgt.to_string(),
            target_column: tgt_col.to_string(),
        }
    }

    /// In-memory fixture with enforcement off so orphaned rows can be
    /// seeded.
    async fn parent_child_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().foreign_keys(false))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE parent (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER,
                FOREIGN KEY (parent_id) REFERENCES parent(id)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_single_orphan_detected() {
        let pool = parent_child_pool().await;
        sqlx::query("INSERT INTO parent (id) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO child (id, parent_id) VALUES (1, 1), (2, 999)")
            .execute(&pool)
            .await
            .unwrap();

        let edges = vec![edge("child", "parent_id", "parent", "id")];
        let findings = check_integrity(&pool, &edges).await;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].orphaned_rows, 1);
        assert_eq!(findings[0].severity, FindingSeverity::High);
    }

    #[tokio::test]
    async fn test_clean_edge_is_ok() {
        let pool = parent_child_pool().await;
        sqlx::query("INSERT INTO parent (id) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO child (id, parent_id) VALUES (1, 1)")
            .execute(&pool)
            .await
            .unwrap();

        let edges = vec![edge("child", "parent_id", "parent", "id")];
        let findings = check_integrity(&pool, &edges).await;

        assert_eq!(findings[0].orphaned_rows, 0);
        assert_eq!(findings[0].severity, FindingSeverity::Ok);
    }

    #[tokio::test]
    async fn test_null_keys_are_not_orphans() {
        let pool = parent_child_pool().await;
        sqlx::query("INSERT INTO child (id, parent_id) VALUES (1, NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let edges = vec![edge("child", "parent_id", "parent", "id")];
        let findings = check_integrity(&pool, &edges).await;

        assert_eq!(findings[0].orphaned_rows, 0);
        assert_eq!(findings[0].severity, FindingSeverity::Ok);
    }

    #[tokio::test]
    async fn test_vanished_table_downgrades_to_warning() {
        let pool = parent_child_pool().await;

        let edges = vec![edge("child", "parent_id", "gone", "id")];
        let findings = check_integrity(&pool, &edges).await;

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, FindingSeverity::Warning);
        assert_eq!(findings[0].orphaned_rows, 0);
    }

    #[tokio::test]
    async fn test_unresolved_target_column_is_warning() {
        let pool = parent_child_pool().await;

        let edges = vec![edge("child", "parent_id", "parent", "")];
        let findings = check_integrity(&pool, &edges).await;

        assert_eq!(findings[0].severity, FindingSeverity::Warning);
    }

    #[tokio::test]
    async fn test_idempotent_findings() {
        let pool = parent_child_pool().await;
        sqlx::query("INSERT INTO child (id, parent_id) VALUES (1, 5), (2, 6)")
            .execute(&pool)
            .await
            .unwrap();

        let edges = vec![edge("child", "parent_id", "parent", "id")];
        let first = check_integrity(&pool, &edges).await;
        let second = check_integrity(&pool, &edges).await;

        assert_eq!(first[0].orphaned_rows, 2);
        assert_eq!(first[0].orphaned_rows, second[0].orphaned_rows);
        assert_eq!(first[0].severity, second[0].severity);
    }
}
