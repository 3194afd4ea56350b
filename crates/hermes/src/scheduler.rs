//! Cron scheduler for the due-trigger sweep

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use registrar::AppState;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::Config;

/// Scheduler that sweeps due triggers on a cron schedule
pub struct TriggerScheduler {
    config: Arc<Config>,
    state: AppState,
    scheduler: JobScheduler,
}

impl TriggerScheduler {
    pub async fn new(config: Arc<Config>, state: AppState) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            config,
            state,
            scheduler,
        })
    }

    pub async fn setup_jobs(&mut self) -> Result<()> {
        self.add_trigger_sweep_job().await
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Shutdown the scheduler gracefully
    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn add_trigger_sweep_job(&self) -> Result<()> {
        let state = self.state.clone();
        let batch_size = self.config.schedules.batch_size;
        let cron_expr = self.config.schedules.trigger_poll.clone();

        tracing::info!("Adding trigger sweep job: {}", cron_expr);

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let state = state.clone();

            Box::pin(async move {
                match state.processor().process_due(Utc::now(), batch_size).await {
                    Ok(summary) if summary.completed + summary.failed + summary.skipped == 0 => {
                        tracing::trace!("No due triggers");
                    }
                    Ok(summary) => {
                        tracing::info!(
                            "Trigger sweep: completed={}, failed={}, skipped={}",
                            summary.completed,
                            summary.failed,
                            summary.skipped
                        );
                    }
                    Err(e) => {
                        tracing::error!("Trigger sweep failed: {}", e);
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }
}
