//! SQLite schema introspection.
//!
//! Opens one discovered unit in read-only mode and collects the metadata
//! the later phases depend on: tables and columns, foreign-key edges, row
//! counts, triggers, and engine attributes.
//!
//! # SQLite System Tables
//! - `sqlite_master`: schema definitions for all database objects
//! - `PRAGMA table_info()`: column information for a table
//! - `PRAGMA foreign_key_list()`: foreign-key information
//! - `PRAGMA page_count` / `PRAGMA page_size`: file size
//! - `PRAGMA journal_mode` / `PRAGMA foreign_keys`: engine attributes
//!
//! A unit whose file cannot be opened or queried yields a `Connection`
//! error for that unit only; the caller continues with the remaining units.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::error::AuditError;
use crate::models::{
    ColumnDescriptor, DatabaseUnit, EngineAttributes, ForeignKeyEdge, SchemaSnapshot,
    TableDescriptor, TriggerDescriptor,
};

/// Quotes an identifier for interpolation into a SQL statement.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes a string for interpolation into a PRAGMA argument.
fn quote_pragma_arg(name: &str) -> String {
    name.replace('\'', "''")
}

/// Opens a read-only connection pool for a database file.
///
/// The pool is verified with a `sqlite_master` probe: SQLite opens files
/// lazily, so a corrupt or non-database file only surfaces on first query.
pub async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(|e| {
            AuditError::connection_failed(format!("Failed to open {}", path.display()), e)
        })?;

    let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            AuditError::connection_failed(
                format!("{} is not a readable SQLite database", path.display()),
                e,
            )
        })?;

    Ok(pool)
}

/// Introspects one unit into a [`SchemaSnapshot`].
pub async fn introspect_unit(unit: &DatabaseUnit) -> Result<SchemaSnapshot> {
    let start = std::time::Instant::now();
    let pool = open_read_only(&unit.canonical_path).await?;

    tracing::debug!("Introspecting {}", unit.display_name);

    let mut tables = collect_tables(&pool).await?;
    resolve_implicit_pk_targets(&mut tables);

    let triggers = collect_triggers(&pool).await?;
    let engine = collect_engine_attributes(&pool, &unit.canonical_path).await;

    pool.close().await;

    tracing::info!(
        "Introspected {}: {} tables, {} triggers in {:.2}s",
        unit.display_name,
        tables.len(),
        triggers.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(SchemaSnapshot {
        tables,
        triggers,
        engine,
    })
}

/// Collects all user tables with columns, foreign keys, and row counts.
async fn collect_tables(pool: &SqlitePool) -> Result<Vec<TableDescriptor>> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AuditError::introspection_failed("Failed to enumerate tables", e))?;

    let mut tables = Vec::with_capacity(names.len());

    for name in names {
        let columns = collect_table_columns(pool, &name).await?;
        let foreign_keys = collect_table_foreign_keys(pool, &name).await?;

        // A table dropped by a concurrent writer mid-introspection loses its
        // count but keeps its descriptor.
        let row_count = match count_rows(pool, &name).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Row count unavailable for '{}': {}", name, e);
                None
            }
        };

        tracing::debug!(
            "Collected table '{}' with {} columns, {} foreign keys",
            name,
            columns.len(),
            foreign_keys.len()
        );

        tables.push(TableDescriptor {
            name,
            columns,
            foreign_keys,
            row_count,
        });
    }

    Ok(tables)
}

/// Collects column metadata for a specific table.
async fn collect_table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let query = format!("PRAGMA table_info('{}')", quote_pragma_arg(table));

    let rows = sqlx::query(&query).fetch_all(pool).await.map_err(|e| {
        AuditError::introspection_failed(
            format!("Failed to collect columns for table '{}'", table),
            e,
        )
    })?;

    let mut columns = Vec::with_capacity(rows.len());

    for row in &rows {
        let cid: i32 = row.try_get("cid").unwrap_or(0);
        let name: String = row.try_get("name").unwrap_or_default();
        let declared_type: String = row.try_get("type").unwrap_or_default();
        let notnull: i32 = row.try_get("notnull").unwrap_or(0);
        let pk: i32 = row.try_get("pk").unwrap_or(0);

        columns.push(ColumnDescriptor {
            name,
            declared_type,
            // PRIMARY KEY columns are implicitly NOT NULL in SQLite even
            // when PRAGMA reports otherwise
            is_nullable: notnull == 0 && pk == 0,
            is_primary_key: pk > 0,
            ordinal_position: cid.unsigned_abs(),
        });
    }

    Ok(columns)
}

/// Collects foreign-key edges for a table, one edge per column pair.
async fn collect_table_foreign_keys(
    pool: &SqlitePool,
    table: &str,
) -> Result<Vec<ForeignKeyEdge>> {
    let query = format!("PRAGMA foreign_key_list('{}')", quote_pragma_arg(table));

    let rows = sqlx::query(&query).fetch_all(pool).await.map_err(|e| {
        AuditError::introspection_failed(
            format!("Failed to collect foreign keys for table '{}'", table),
            e,
        )
    })?;

    let mut edges = Vec::with_capacity(rows.len());

    for row in &rows {
        let target_table: String = row.try_get("table").unwrap_or_default();
        let source_column: String = row.try_get("from").unwrap_or_default();
        // "to" is NULL when the declaration references the target's primary
        // key implicitly; resolved after all tables are collected.
        let target_column: Option<String> = row.try_get("to").ok();

        edges.push(ForeignKeyEdge {
            source_table: table.to_string(),
            source_column,
            target_table,
            target_column: target_column.unwrap_or_default(),
        });
    }

    Ok(edges)
}

/// Fills in empty target columns with the target table's single-column
/// primary key, when one exists.
fn resolve_implicit_pk_targets(tables: &mut [TableDescriptor]) {
    let pk_by_table: std::collections::BTreeMap<String, String> = tables
        .iter()
        .filter_map(|table| {
            let pks: Vec<&ColumnDescriptor> =
                table.columns.iter().filter(|c| c.is_primary_key).collect();
            match pks.as_slice() {
                [only] => Some((table.name.clone(), only.name.clone())),
                _ => None,
            }
        })
        .collect();

    for table in tables.iter_mut() {
        for edge in table.foreign_keys.iter_mut() {
            if edge.target_column.is_empty() {
                if let Some(pk) = pk_by_table.get(&edge.target_table) {
                    edge.target_column = pk.clone();
                }
            }
        }
    }
}

/// Counts rows in a table.
async fn count_rows(pool: &SqlitePool, table: &str) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));

    let count: i64 = sqlx::query_scalar(&query).fetch_one(pool).await.map_err(|e| {
        AuditError::introspection_failed(
            format!("Failed to count rows in table '{}'", table),
            e,
        )
    })?;

    Ok(count.unsigned_abs())
}

/// Collects triggers from `sqlite_master`.
async fn collect_triggers(pool: &SqlitePool) -> Result<Vec<TriggerDescriptor>> {
    let rows = sqlx::query(
        r#"
        SELECT name, tbl_name, sql
        FROM sqlite_master
        WHERE type = 'trigger'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AuditError::introspection_failed("Failed to collect triggers", e))?;

    let mut triggers = Vec::with_capacity(rows.len());

    for row in &rows {
        triggers.push(TriggerDescriptor {
            name: row.try_get("name").unwrap_or_default(),
            table_name: row.try_get("tbl_name").unwrap_or_default(),
            definition: row.try_get("sql").ok(),
        });
    }

    Ok(triggers)
}

/// Collects PRAGMA-derived engine attributes.
///
/// Individual PRAGMA failures fall back to neutral values; these feed
/// heuristic compliance scoring, not integrity verdicts.
async fn collect_engine_attributes(pool: &SqlitePool, path: &Path) -> EngineAttributes {
    let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
        .fetch_one(pool)
        .await
        .unwrap_or(0);
    let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
        .fetch_one(pool)
        .await
        .unwrap_or(4096);

    let size_bytes = u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0);
    let size_bytes = if size_bytes == 0 {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    } else {
        size_bytes
    };

    let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(pool)
        .await
        .unwrap_or_else(|_| "unknown".to_string());

    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    EngineAttributes {
        size_bytes,
        journal_mode,
        foreign_keys_enforced: foreign_keys != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_pragma_arg() {
        assert_eq!(quote_pragma_arg("it's"), "it''s");
    }

    #[test]
    fn test_resolve_implicit_pk_targets() {
        let mut tables = vec![
            TableDescriptor {
                name: "parent".to_string(),
                columns: vec![ColumnDescriptor {
                    name: "id".to_string(),
                    declared_type: "INTEGER".to_string(),
                    is_nullable: false,
                    is_primary_key: true,
                    ordinal_position: 0,
                }],
                foreign_keys: Vec::new(),
                row_count: None,
            },
            TableDescriptor {
                name: "child".to_string(),
                columns: Vec::new(),
                foreign_keys: vec![ForeignKeyEdge {
                    source_table: "child".to_string(),
                    source_column: "parent_id".to_string(),
                    target_table: "parent".to_string(),
                    target_column: String::new(),
                }],
                row_count: None,
            },
        ];

        resolve_implicit_pk_targets(&mut tables);
        assert_eq!(tables[1].foreign_keys[0].target_column, "id");
    }

    #[test]
    fn test_resolve_leaves_composite_pk_unresolved() {
        let mut tables = vec![
            TableDescriptor {
                name: "pair".to_string(),
                columns: vec![
                    ColumnDescriptor {
                        name: "a".to_string(),
                        declared_type: "INTEGER".to_string(),
                        is_nullable: false,
                        is_primary_key: true,
                        ordinal_position: 0,
                    },
                    ColumnDescriptor {
                        name: "b".to_string(),
                        declared_type: "INTEGER".to_string(),
                        is_nullable: false,
                        is_primary_key: true,
                        ordinal_position: 1,
                    },
                ],
                foreign_keys: Vec::new(),
                row_count: None,
            },
            TableDescriptor {
                name: "ref".to_string(),
                columns: Vec::new(),
                foreign_keys: vec![ForeignKeyEdge {
                    source_table: "ref".to_string(),
                    source_column: "pair_a".to_string(),
                    target_table: "pair".to_string(),
                    target_column: String::new(),
                }],
                row_count: None,
            },
        ];

        resolve_implicit_pk_targets(&mut tables);
        assert!(tables[1].foreign_keys[0].target_column.is_empty());
    }
}
