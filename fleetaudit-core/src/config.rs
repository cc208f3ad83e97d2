//! Validation run configuration.
//!
//! All tunables are injected through [`AuditConfig`]; the engine carries no
//! global state and no hard-coded workspace paths. The denylist is a plain
//! list of path components supplied by the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a validation run.
///
/// # Example
/// ```rust
/// use fleetaudit_core::config::AuditConfig;
///
/// let config = AuditConfig::new("/var/lib/fleet", "/tmp/fleetaudit-scratch")
///     .with_max_discovery_depth(2)
///     .with_connection_fanout(5);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Root directory to search for database files
    pub root: PathBuf,
    /// Directory that receives backup and restore artifacts
    pub scratch_dir: PathBuf,
    /// Maximum directory depth for discovery
    pub max_discovery_depth: usize,
    /// File extensions treated as database files
    pub extensions: Vec<String>,
    /// Path components that exclude a candidate (backup/temp copies of the
    /// workspace itself)
    pub denylist: Vec<String>,
    /// Bounded worker pool size for per-database validation phases
    pub worker_pool: usize,
    /// Concurrent connections opened by the connection trial
    pub connection_fanout: usize,
    /// Bounded wait per connection attempt
    pub connection_wait: Duration,
    /// How long the lock trial's writer holds its exclusive section
    pub lock_hold: Duration,
    /// Delay before the lock trial's reader attempts access
    pub lock_reader_delay: Duration,
    /// Bounded wait for the lock trial's reader
    pub lock_wait: Duration,
    /// Concurrent queries issued by the throughput trial
    pub throughput_fanout: usize,
    /// Average latency below which throughput rates EXCELLENT
    pub latency_threshold_ms: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("databases"),
            scratch_dir: PathBuf::from("database_backups"),
            max_discovery_depth: 3,
            extensions: vec![
                "db".to_string(),
                "sqlite".to_string(),
                "sqlite3".to_string(),
            ],
            denylist: vec!["backup".to_string(), "backups".to_string()],
            worker_pool: 4,
            connection_fanout: 5,
            connection_wait: Duration::from_secs(5),
            lock_hold: Duration::from_secs(2),
            lock_reader_delay: Duration::from_millis(500),
            lock_wait: Duration::from_secs(10),
            throughput_fanout: 10,
            latency_threshold_ms: 100.0,
        }
    }
}

impl AuditConfig {
    /// Creates a config for the given root and scratch directory with
    /// default thresholds.
    pub fn new(root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch_dir: scratch_dir.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the discovery depth bound.
    pub fn with_max_discovery_depth(mut self, depth: usize) -> Self {
        self.max_discovery_depth = depth;
        self
    }

    /// Builder method to set the recognized file extensions.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Builder method to set the path-component denylist.
    pub fn with_denylist(mut self, denylist: Vec<String>) -> Self {
        self.denylist = denylist;
        self
    }

    /// Builder method to set the worker pool size.
    pub fn with_worker_pool(mut self, workers: usize) -> Self {
        self.worker_pool = workers;
        self
    }

    /// Builder method to set the connection trial fan-out.
    pub fn with_connection_fanout(mut self, fanout: usize) -> Self {
        self.connection_fanout = fanout;
        self
    }

    /// Builder method to set the per-attempt connection wait.
    pub fn with_connection_wait(mut self, wait: Duration) -> Self {
        self.connection_wait = wait;
        self
    }

    /// Builder method to set the lock trial's writer hold duration.
    pub fn with_lock_hold(mut self, hold: Duration) -> Self {
        self.lock_hold = hold;
        self
    }

    /// Builder method to set the lock trial's reader delay.
    pub fn with_lock_reader_delay(mut self, delay: Duration) -> Self {
        self.lock_reader_delay = delay;
        self
    }

    /// Builder method to set the lock trial's reader wait bound.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Builder method to set the throughput trial fan-out.
    pub fn with_throughput_fanout(mut self, fanout: usize) -> Self {
        self.throughput_fanout = fanout;
        self
    }

    /// Builder method to set the EXCELLENT latency threshold.
    pub fn with_latency_threshold_ms(mut self, threshold: f64) -> Self {
        self.latency_threshold_ms = threshold;
        self
    }

    /// Validates configuration parameters.
    ///
    /// # Errors
    /// Returns a configuration error for zero fan-outs, zero waits, an empty
    /// extension list, or a zero-sized worker pool.
    pub fn validate(&self) -> crate::Result<()> {
        if self.extensions.is_empty() {
            return Err(crate::error::AuditError::configuration(
                "extensions cannot be empty",
            ));
        }
        if self.worker_pool == 0 {
            return Err(crate::error::AuditError::configuration(
                "worker_pool must be greater than 0",
            ));
        }
        if self.connection_fanout == 0 {
            return Err(crate::error::AuditError::configuration(
                "connection_fanout must be greater than 0",
            ));
        }
        if self.throughput_fanout == 0 {
            return Err(crate::error::AuditError::configuration(
                "throughput_fanout must be greater than 0",
            ));
        }
        if self.connection_wait.is_zero() || self.lock_wait.is_zero() {
            return Err(crate::error::AuditError::configuration(
                "trial waits must be greater than 0",
            ));
        }
        if self.latency_threshold_ms <= 0.0 {
            return Err(crate::error::AuditError::configuration(
                "latency_threshold_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    /// True when any component of `path` matches the denylist.
    pub fn is_denied(&self, path: &std::path::Path) -> bool {
        path.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.denylist.iter().any(|denied| name.eq_ignore_ascii_case(denied))
        })
    }

    /// True when the file extension is one of the recognized ones.
    pub fn matches_extension(&self, path: &std::path::Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy())
            .is_some_and(|ext| {
                self.extensions.iter().any(|known| ext.eq_ignore_ascii_case(known))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_thresholds() {
        let config = AuditConfig::default();
        assert_eq!(config.max_discovery_depth, 3);
        assert_eq!(config.connection_fanout, 5);
        assert_eq!(config.throughput_fanout, 10);
        assert_eq!(config.connection_wait, Duration::from_secs(5));
        assert_eq!(config.lock_wait, Duration::from_secs(10));
        assert_eq!(config.latency_threshold_ms, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AuditConfig::new("/data", "/scratch")
            .with_max_discovery_depth(1)
            .with_connection_fanout(3)
            .with_throughput_fanout(6)
            .with_lock_hold(Duration::from_millis(50));

        assert_eq!(config.root, PathBuf::from("/data"));
        assert_eq!(config.scratch_dir, PathBuf::from("/scratch"));
        assert_eq!(config.max_discovery_depth, 1);
        assert_eq!(config.connection_fanout, 3);
        assert_eq!(config.throughput_fanout, 6);
        assert_eq!(config.lock_hold, Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let config = AuditConfig::default().with_connection_fanout(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_extensions() {
        let config = AuditConfig::default().with_extensions(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_denylist_matches_any_component() {
        let config = AuditConfig::default()
            .with_denylist(vec!["backups".to_string(), "tmp".to_string()]);

        assert!(config.is_denied(Path::new("/data/backups/app.db")));
        assert!(config.is_denied(Path::new("/data/TMP/app.db")));
        assert!(!config.is_denied(Path::new("/data/live/app.db")));
    }

    #[test]
    fn test_extension_filter() {
        let config = AuditConfig::default();
        assert!(config.matches_extension(Path::new("a.db")));
        assert!(config.matches_extension(Path::new("a.SQLITE")));
        assert!(config.matches_extension(Path::new("a.sqlite3")));
        assert!(!config.matches_extension(Path::new("a.txt")));
        assert!(!config.matches_extension(Path::new("noext")));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = AuditConfig::new("/data", "/scratch").with_worker_pool(2);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AuditConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.root, config.root);
        assert_eq!(parsed.worker_pool, 2);
    }
}
