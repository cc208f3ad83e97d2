//! Concurrent-access trials.
//!
//! Three bounded, cancellable probes per database: a connection fan-out, a
//! lock-contention probe, and a throughput burst. The validator never
//! implements its own locking — it only exercises the mutual-exclusion
//! discipline SQLite provides natively and records how the engine behaved
//! under contention.
//!
//! Every blocking call carries a bounded wait with a definite failure
//! outcome on expiry; a trial can time out, but it cannot hang.

use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::AuditConfig;
use crate::models::{
    ConcurrencyTrialResult, LatencyStats, PerformanceRating, TrialKind, TrialStatus,
};

/// Connection-trial pass threshold, boundary inclusive.
const CONNECTION_PASS_RATE: f64 = 0.8;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn read_only_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
}

/// Opens a connection and runs a trivial metadata query, returning the
/// elapsed time on success.
async fn probe_metadata(options: SqliteConnectOptions) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    let mut conn: SqliteConnection = options.connect().await?;
    let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
        .fetch_one(&mut conn)
        .await?;
    Ok(started.elapsed())
}

/// Classifies a connection trial by its success rate.
fn connection_status(success_rate: f64) -> TrialStatus {
    if success_rate >= CONNECTION_PASS_RATE {
        TrialStatus::Pass
    } else {
        TrialStatus::Fail
    }
}

/// Rates a throughput trial by its average latency.
fn throughput_rating(avg_ms: f64, threshold_ms: f64) -> PerformanceRating {
    if avg_ms < threshold_ms {
        PerformanceRating::Excellent
    } else {
        PerformanceRating::Good
    }
}

/// Runs all three trials for one database, sequentially within the unit so
/// the lock probe's writer hold cannot distort the other trials' latencies.
pub async fn run_trials(path: &Path, config: &AuditConfig) -> Vec<ConcurrencyTrialResult> {
    vec![
        connection_trial(path, config).await,
        lock_trial(path, config).await,
        throughput_trial(path, config).await,
    ]
}

/// Fans out read-only connections, each bounded by `connection_wait`.
///
/// Passes when at least 80% of attempts complete a metadata query in time.
/// Completes within `fanout * connection_wait` wall time in the worst case.
pub async fn connection_trial(path: &Path, config: &AuditConfig) -> ConcurrencyTrialResult {
    let attempted = config.connection_fanout;
    let wait = config.connection_wait;

    let mut handles = Vec::with_capacity(attempted);
    for _ in 0..attempted {
        let options = read_only_options(path);
        handles.push(tokio::spawn(async move {
            match tokio::time::timeout(wait, probe_metadata(options)).await {
                Ok(Ok(elapsed)) => Some(elapsed),
                Ok(Err(_)) | Err(_) => None,
            }
        }));
    }

    let mut latencies = Vec::with_capacity(attempted);
    let mut completed = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Some(elapsed)) => {
                completed += 1;
                latencies.push(elapsed.as_secs_f64() * 1000.0);
            }
            Ok(None) | Err(_) => {}
        }
    }

    let success_rate = completed as f64 / attempted as f64;
    let status = connection_status(success_rate);

    tracing::debug!(
        "Connection trial for {}: {}/{} completed ({:?})",
        path.display(),
        completed,
        attempted,
        status
    );

    ConcurrencyTrialResult {
        kind: TrialKind::Connection,
        status,
        success_rate,
        latency: latency_stats(&latencies),
        rating: None,
        detail: Some(format!("{} of {} connections completed", completed, attempted)),
    }
}

/// Holds a write lock while a delayed reader attempts access.
///
/// The writer takes `BEGIN IMMEDIATE`, holds it for `lock_hold`, then rolls
/// back — the probe contends for the reserved lock without mutating data.
/// The reader starts after `lock_reader_delay` with `lock_wait` as its busy
/// timeout. The trial passes when both sides complete without a lock
/// timeout.
pub async fn lock_trial(path: &Path, config: &AuditConfig) -> ConcurrencyTrialResult {
    let hold = config.lock_hold;
    let reader_delay = config.lock_reader_delay;
    let reader_wait = config.lock_wait;
    // Outer bounds keep the trial finite even if a side wedges below its
    // own timeout.
    let writer_bound = hold.saturating_add(reader_wait);
    let reader_bound = reader_delay.saturating_add(reader_wait).saturating_add(hold);

    let writer_path = path.to_path_buf();
    let writer = tokio::spawn(async move {
        tokio::time::timeout(writer_bound, hold_write_lock(&writer_path, hold))
            .await
            .map_err(|_| "timed out".to_string())
            .and_then(|r| r)
    });

    let reader_path = path.to_path_buf();
    let reader = tokio::spawn(async move {
        tokio::time::sleep(reader_delay).await;
        let options = read_only_options(&reader_path).busy_timeout(reader_wait);
        match tokio::time::timeout(reader_bound, probe_metadata(options)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timed out".to_string()),
        }
    });

    let writer_result = writer.await.unwrap_or_else(|e| Err(e.to_string()));
    let reader_result = reader.await.unwrap_or_else(|e| Err(e.to_string()));

    let completed = usize::from(writer_result.is_ok()) + usize::from(reader_result.is_ok());
    let status = if completed == 2 {
        TrialStatus::Pass
    } else {
        TrialStatus::Fail
    };

    let detail = format!(
        "writer {}, reader {}",
        writer_result.as_ref().map_or_else(|e| e.as_str(), |_| "completed"),
        reader_result.as_ref().map_or_else(|e| e.as_str(), |_| "completed"),
    );

    tracing::debug!("Lock trial for {}: {}", path.display(), detail);

    ConcurrencyTrialResult {
        kind: TrialKind::Lock,
        status,
        success_rate: completed as f64 / 2.0,
        latency: None,
        rating: None,
        detail: Some(detail),
    }
}

async fn hold_write_lock(path: &Path, hold: Duration) -> Result<(), String> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(false)
        .create_if_missing(false);

    let mut conn: SqliteConnection = options.connect().await.map_err(|e| e.to_string())?;

    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut conn)
        .await
        .map_err(|e| e.to_string())?;

    tokio::time::sleep(hold).await;

    sqlx::query("ROLLBACK")
        .execute(&mut conn)
        .await
        .map_err(|e| e.to_string())?;

    Ok(())
}

/// Bursts concurrent trivial reads and records latency statistics.
///
/// Fails only when no query succeeds; otherwise the trial passes with an
/// EXCELLENT or GOOD rating against the configured latency threshold.
pub async fn throughput_trial(path: &Path, config: &AuditConfig) -> ConcurrencyTrialResult {
    let attempted = config.throughput_fanout;
    let wait = config.connection_wait;

    let mut handles = Vec::with_capacity(attempted);
    for _ in 0..attempted {
        let options = read_only_options(path);
        handles.push(tokio::spawn(async move {
            match tokio::time::timeout(wait, probe_metadata(options)).await {
                Ok(Ok(elapsed)) => Some(elapsed),
                Ok(Err(_)) | Err(_) => None,
            }
        }));
    }

    let mut latencies = Vec::with_capacity(attempted);
    for handle in handles {
        if let Ok(Some(elapsed)) = handle.await {
            latencies.push(elapsed.as_secs_f64() * 1000.0);
        }
    }

    let success_rate = latencies.len() as f64 / attempted as f64;
    let latency = latency_stats(&latencies);

    let (status, rating) = match latency {
        Some(stats) => (
            TrialStatus::Pass,
            Some(throughput_rating(stats.avg_ms, config.latency_threshold_ms)),
        ),
        None => (TrialStatus::Fail, None),
    };

    ConcurrencyTrialResult {
        kind: TrialKind::Throughput,
        status,
        success_rate,
        latency,
        rating,
        detail: Some(format!("{} of {} queries completed", latencies.len(), attempted)),
    }
}

fn latency_stats(latencies_ms: &[f64]) -> Option<LatencyStats> {
    if latencies_ms.is_empty() {
        return None;
    }
    let sum: f64 = latencies_ms.iter().sum();
    let max = latencies_ms.iter().fold(0.0_f64, |acc, &x| acc.max(x));
    Some(LatencyStats {
        avg_ms: round2(sum / latencies_ms.len() as f64),
        max_ms: round2(max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_boundary_inclusive() {
        assert_eq!(connection_status(0.8), TrialStatus::Pass);
        assert_eq!(connection_status(1.0), TrialStatus::Pass);
        assert_eq!(connection_status(0.79), TrialStatus::Fail);
        assert_eq!(connection_status(0.0), TrialStatus::Fail);
    }

    #[test]
    fn test_four_of_five_is_exactly_the_boundary() {
        let rate = 4.0 / 5.0;
        assert_eq!(connection_status(rate), TrialStatus::Pass);
    }

    #[test]
    fn test_throughput_rating() {
        assert_eq!(throughput_rating(50.0, 100.0), PerformanceRating::Excellent);
        assert_eq!(throughput_rating(100.0, 100.0), PerformanceRating::Good);
        assert_eq!(throughput_rating(250.0, 100.0), PerformanceRating::Good);
    }

    #[test]
    fn test_latency_stats() {
        assert!(latency_stats(&[]).is_none());

        let stats = latency_stats(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(stats.avg_ms, 20.0);
        assert_eq!(stats.max_ms, 30.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.2345), 1.23);
        assert_eq!(round2(1.236), 1.24);
    }
}
