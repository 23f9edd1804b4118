//! Cron scheduler for the periodic sweeps.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use seatmeter_core::config::WorkerConfig;
use seatmeter_core::error::AppError;
use seatmeter_realtime::meter::MeterClock;

use crate::jobs::{AllowanceSweep, SessionSweep};

/// Cron-based scheduler for the session and allowance sweeps
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
    /// Time source shared with the usage meter
    clock: MeterClock,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler reading time from `clock`
    pub async fn new(clock: MeterClock) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, clock })
    }

    /// Register both sweeps with the configured schedules
    pub async fn register_default_tasks(
        &self,
        config: &WorkerConfig,
        sessions: Arc<SessionSweep>,
        allowances: Arc<AllowanceSweep>,
    ) -> Result<(), AppError> {
        self.register_session_sweep(&config.session_sweep_cron, sessions)
            .await?;
        self.register_allowance_sweep(&config.allowance_sweep_cron, allowances)
            .await?;

        tracing::info!("All scheduled sweeps registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Stale session purge
    pub async fn register_session_sweep(
        &self,
        cron: &str,
        sweep: Arc<SessionSweep>,
    ) -> Result<(), AppError> {
        let clock = self.clock;
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let sweep = Arc::clone(&sweep);
            Box::pin(async move {
                tracing::debug!("Running session sweep");
                if let Err(e) = sweep.run(clock.now()).await {
                    tracing::error!("Session sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid session sweep schedule '{}': {}", cron, e))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add session sweep schedule: {}", e))
        })?;

        tracing::info!("Registered: session_sweep ({})", cron);
        Ok(())
    }

    /// Allowance status sweep
    pub async fn register_allowance_sweep(
        &self,
        cron: &str,
        sweep: Arc<AllowanceSweep>,
    ) -> Result<(), AppError> {
        let clock = self.clock;
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let sweep = Arc::clone(&sweep);
            Box::pin(async move {
                tracing::debug!("Running allowance sweep");
                if let Err(e) = sweep.run(clock.now()).await {
                    tracing::error!("Allowance sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid allowance sweep schedule '{}': {}",
                cron, e
            ))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add allowance sweep schedule: {}", e))
        })?;

        tracing::info!("Registered: allowance_sweep ({})", cron);
        Ok(())
    }
}
