//! Database file discovery.
//!
//! Read-only filesystem walk under the configured root: bounded depth, no
//! symlink following, extension filter, and a caller-supplied denylist of
//! path components that excludes backup/temp copies of the workspace from
//! validation. Candidates are deduplicated by canonical path, so the same
//! file reached through two names yields one [`DatabaseUnit`].
//!
//! Unreadable or non-canonicalizable paths become [`DiscoveryErrorRecord`]s
//! and are skipped; discovery itself never fails the run. The runner treats
//! an empty unit set as fatal.

use std::collections::BTreeSet;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::AuditConfig;
use crate::models::{DatabaseUnit, DiscoveryErrorRecord};

/// Outcome of a discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Units sorted by canonical path, deduplicated
    pub units: Vec<DatabaseUnit>,
    /// Paths that were skipped, with reasons
    pub errors: Vec<DiscoveryErrorRecord>,
}

/// Walks the configured root and returns the discovered units.
///
/// Running twice against an unchanged filesystem yields an identical set of
/// units: the walk order does not matter because results are keyed and
/// sorted by canonical path.
pub fn discover_databases(config: &AuditConfig) -> DiscoveryOutcome {
    let mut canonical = BTreeSet::new();
    let mut errors = Vec::new();

    if !config.root.exists() {
        errors.push(DiscoveryErrorRecord {
            path: config.root.clone(),
            reason: "root directory does not exist".to_string(),
        });
        return DiscoveryOutcome {
            units: Vec::new(),
            errors,
        };
    }

    let walker = WalkDir::new(&config.root)
        .max_depth(config.max_discovery_depth)
        .follow_links(false);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map_or_else(|| config.root.clone(), PathBuf::from);
                tracing::warn!("Skipping unreadable path {}: {}", path.display(), e);
                errors.push(DiscoveryErrorRecord {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !config.matches_extension(path) {
            continue;
        }
        if config.is_denied(path) {
            tracing::debug!("Excluding denylisted candidate {}", path.display());
            continue;
        }

        match path.canonicalize() {
            Ok(resolved) => {
                // A denylisted component may only be visible after resolving
                // symlinks in the prefix.
                if config.is_denied(&resolved) {
                    tracing::debug!("Excluding denylisted candidate {}", resolved.display());
                    continue;
                }
                canonical.insert(resolved);
            }
            Err(e) => {
                tracing::warn!("Cannot canonicalize {}: {}", path.display(), e);
                errors.push(DiscoveryErrorRecord {
                    path: path.to_path_buf(),
                    reason: format!("canonicalization failed: {}", e),
                });
            }
        }
    }

    let units: Vec<DatabaseUnit> = canonical.into_iter().map(DatabaseUnit::new).collect();

    tracing::info!(
        "Discovered {} database files under {} ({} paths skipped)",
        units.len(),
        config.root.display(),
        errors.len()
    );

    DiscoveryOutcome { units, errors }
}
