//! Relationship graph construction.
//!
//! Two structures come out of this module: a per-database table dependency
//! graph with upstream/downstream lineage, and the cross-database shared
//! table-name matrix. The cross-database match is lexical equality only —
//! a join *candidate*, reported as such, with no referential guarantee.

use std::collections::BTreeMap;

use crate::models::{DependencyGraph, SchemaSnapshot, SharedTablePattern, TableLineage};

/// Builds the dependency graph for one database snapshot.
///
/// Nodes are tables, edges are foreign-key references. A table's upstream
/// set holds the tables it references; its downstream set holds the tables
/// that reference it. Edges pointing at tables missing from the snapshot
/// (dropped mid-run) still appear in the edge list but contribute no
/// lineage entry for the missing side.
pub fn build_dependency_graph(snapshot: &SchemaSnapshot) -> DependencyGraph {
    let tables: Vec<String> = snapshot.tables.iter().map(|t| t.name.clone()).collect();
    let edges = snapshot.foreign_key_edges();

    let mut lineage: BTreeMap<String, TableLineage> = tables
        .iter()
        .map(|name| (name.clone(), TableLineage::default()))
        .collect();

    for edge in &edges {
        if let Some(entry) = lineage.get_mut(&edge.source_table) {
            if !entry.upstream.contains(&edge.target_table) {
                entry.upstream.push(edge.target_table.clone());
            }
        }
        if let Some(entry) = lineage.get_mut(&edge.target_table) {
            if !entry.downstream.contains(&edge.source_table) {
                entry.downstream.push(edge.source_table.clone());
            }
        }
    }

    DependencyGraph {
        tables,
        edges,
        lineage,
    }
}

/// Finds table names shared by two or more databases.
///
/// Every database carrying the name is listed as an occurrence; none is
/// treated as canonical. Input order does not affect the output: patterns
/// are sorted by table name and occurrences by database name.
pub fn find_shared_patterns(snapshots: &[(String, Vec<String>)]) -> Vec<SharedTablePattern> {
    let mut occurrences: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (database, tables) in snapshots {
        for table in tables {
            let entry = occurrences.entry(table.clone()).or_default();
            if !entry.contains(database) {
                entry.push(database.clone());
            }
        }
    }

    occurrences
        .into_iter()
        .filter(|(_, databases)| databases.len() >= 2)
        .map(|(table_name, mut databases)| {
            databases.sort();
            SharedTablePattern {
                table_name,
                databases,
            }
        })
        .collect()
}
