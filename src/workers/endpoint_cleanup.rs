use crate::adapters::database::DbPool;
use crate::adapters::database::endpoint_repo::EndpointRepository;
use crate::domain::endpoint::EndpointStats;
use crate::error::Result;
use crate::telemetry::METER_NAME;
use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use opentelemetry::{global, metrics::Counter};
use std::str::FromStr;
use std::time::Duration;
use tracing::Instrument;

/// Daily pass at midnight local time.
const DAILY_SCHEDULE: &str = "0 0 0 * * *";
/// Deeper optimization pass while traffic is quiet.
const OPTIMIZE_SCHEDULE: &str = "0 0 2 * * *";
/// Hourly guard against sudden endpoint die-off.
const MONITOR_SCHEDULE: &str = "0 0 * * * *";

const ALWAYS_PURGE_AGE_DAYS: i64 = 14;
const DEGRADED_PURGE_AGE_DAYS: i64 = 7;
const MONITOR_PURGE_AGE_DAYS: i64 = 3;
const DEGRADED_EFFICIENCY: f64 = 70.0;
const CRITICAL_EFFICIENCY: f64 = 50.0;
const OPTIMIZE_EFFICIENCY: f64 = 80.0;
const EMERGENCY_EFFICIENCY: f64 = 30.0;
const EMERGENCY_MIN_TOTAL: i64 = 100;
const OLD_INACTIVE_ALARM: i64 = 50;
const TOTAL_WARN_THRESHOLD: i64 = 2000;

/// Fallback pause when a cron expression cannot produce a next occurrence.
const RESCHEDULE_FALLBACK: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
struct Metrics {
    deleted_total: Counter<u64>,
    runs_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            deleted_total: meter
                .u64_counter("lawcast_endpoints_purged_total")
                .with_description("Inactive endpoints physically deleted by cleanup")
                .build(),
            runs_total: meter
                .u64_counter("lawcast_cleanup_runs_total")
                .with_description("Cleanup passes executed across all schedules")
                .build(),
        }
    }
}

/// Periodic removal of soft-deleted endpoints, with intensity adapted to the
/// observed active ratio. Three independent schedules share the same
/// repository and read the aggregate stats once per pass.
#[derive(Debug)]
pub struct EndpointCleanupWorker {
    pool: DbPool,
    repo: EndpointRepository,
    timezone: Tz,
    metrics: Metrics,
}

impl EndpointCleanupWorker {
    /// # Errors
    /// Returns an error when the configured timezone is unknown.
    pub fn new(pool: DbPool, repo: EndpointRepository, timezone: &str) -> anyhow::Result<Self> {
        let timezone = Tz::from_str(timezone).map_err(|e| anyhow::anyhow!("unknown CRON_TIMEZONE: {e}"))?;
        Ok(Self { pool, repo, timezone, metrics: Metrics::new() })
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let Ok(daily) = Schedule::from_str(DAILY_SCHEDULE) else { return };
        let Ok(optimize) = Schedule::from_str(OPTIMIZE_SCHEDULE) else { return };
        let Ok(monitor) = Schedule::from_str(MONITOR_SCHEDULE) else { return };

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => {}
                () = sleep_until_next(&daily, self.timezone) => {
                    if let Err(e) = self.run_daily().instrument(tracing::info_span!("daily_cleanup")).await {
                        tracing::error!(error = %e, "Daily cleanup failed");
                    }
                }
                () = sleep_until_next(&optimize, self.timezone) => {
                    if let Err(e) = self.run_optimization().instrument(tracing::info_span!("weekly_optimization")).await {
                        tracing::error!(error = %e, "Optimization pass failed");
                    }
                }
                () = sleep_until_next(&monitor, self.timezone) => {
                    if let Err(e) = self.run_monitor().instrument(tracing::info_span!("realtime_monitor")).await {
                        tracing::error!(error = %e, "Real-time monitor pass failed");
                    }
                }
            }
        }
        tracing::info!("Endpoint cleanup worker shutting down...");
    }

    /// Always purges long-dead rows; degraded efficiency widens the net.
    ///
    /// # Errors
    /// Returns a database error if a query fails.
    pub async fn run_daily(&self) -> Result<u64> {
        self.metrics.runs_total.add(1, &[]);
        let mut conn = self.pool.acquire().await?;
        let stats = self.repo.stats(&mut conn).await?;
        self.log_diagnostics(&stats);

        let mut deleted = self.repo.cleanup_older_inactive(&mut conn, ALWAYS_PURGE_AGE_DAYS).await?;
        if stats.efficiency() < DEGRADED_EFFICIENCY {
            deleted += self.repo.cleanup_older_inactive(&mut conn, DEGRADED_PURGE_AGE_DAYS).await?;
        }
        if stats.efficiency() < CRITICAL_EFFICIENCY {
            deleted += self.repo.cleanup_older_inactive(&mut conn, 0).await?;
        }

        if deleted > 0 {
            tracing::info!(deleted, "Daily cleanup removed inactive endpoints");
            self.metrics.deleted_total.add(deleted, &[]);
        }
        Ok(deleted)
    }

    /// # Errors
    /// Returns a database error if a query fails.
    pub async fn run_optimization(&self) -> Result<u64> {
        self.metrics.runs_total.add(1, &[]);
        let mut conn = self.pool.acquire().await?;
        let stats = self.repo.stats(&mut conn).await?;

        if stats.total > TOTAL_WARN_THRESHOLD {
            tracing::warn!(total = stats.total, "Endpoint table unusually large");
        }

        let mut deleted = 0;
        if stats.efficiency() < OPTIMIZE_EFFICIENCY && stats.inactive > 0 {
            deleted = self.repo.cleanup_older_inactive(&mut conn, 0).await?;
            tracing::info!(deleted, efficiency = stats.efficiency(), "Optimization pass purged inactive endpoints");
            self.metrics.deleted_total.add(deleted, &[]);
        }
        Ok(deleted)
    }

    /// # Errors
    /// Returns a database error if a query fails.
    pub async fn run_monitor(&self) -> Result<u64> {
        self.metrics.runs_total.add(1, &[]);
        let mut conn = self.pool.acquire().await?;
        let stats = self.repo.stats(&mut conn).await?;

        let deleted = if stats.efficiency() < EMERGENCY_EFFICIENCY && stats.total > EMERGENCY_MIN_TOTAL {
            tracing::warn!(efficiency = stats.efficiency(), "Emergency purge of all inactive endpoints");
            self.repo.cleanup_older_inactive(&mut conn, 0).await?
        } else if stats.old_inactive > OLD_INACTIVE_ALARM {
            self.repo.cleanup_older_inactive(&mut conn, MONITOR_PURGE_AGE_DAYS).await?
        } else {
            0
        };

        if deleted > 0 {
            tracing::info!(deleted, "Real-time monitor removed inactive endpoints");
            self.metrics.deleted_total.add(deleted, &[]);
        }
        Ok(deleted)
    }

    fn log_diagnostics(&self, stats: &EndpointStats) {
        tracing::info!(
            total = stats.total,
            active = stats.active,
            inactive = stats.inactive,
            efficiency = format!("{:.1}", stats.efficiency()),
            grade = stats.grade(),
            "Endpoint health"
        );
    }
}

/// Sleeps until the next occurrence of `schedule` in `timezone`.
async fn sleep_until_next(schedule: &Schedule, timezone: Tz) {
    let Some(next) = schedule.upcoming(timezone).next() else {
        tokio::time::sleep(RESCHEDULE_FALLBACK).await;
        return;
    };
    let wait = (next.with_timezone(&Utc) - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}
