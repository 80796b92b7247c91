// Job Scheduler - Periodic deadline and workload checks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::deadline_tracker::DeadlineTracker;
use crate::automation::{AutomationEngine, AutomationHooks};
use crate::clock::Clock;

pub const DEADLINE_CHECK_JOB: &str = "deadline_check";
pub const WORKLOAD_CHECK_JOB: &str = "workload_check";

/// Execution logs kept in memory
const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub deadline_check_interval_minutes: u32,
    pub workload_check_interval_minutes: u32,
    pub workload_threshold: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            deadline_check_interval_minutes: 15,
            workload_check_interval_minutes: 60,
            workload_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i64,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

/// Six-field cron expression for "every N minutes". Only intervals that
/// divide an hour or a day evenly give a fixed period.
pub fn interval_cron(minutes: u32) -> JobResult<String> {
    match minutes {
        0 => Err(JobError::ConfigError("interval must be at least one minute".to_string())),
        m if m < 60 && 60 % m == 0 => Ok(format!("0 */{} * * * *", m)),
        m if m % 60 == 0 && 24 % (m / 60) == 0 && m / 60 < 24 => Ok(format!("0 0 */{} * * *", m / 60)),
        m if m == 24 * 60 => Ok("0 0 0 * * *".to_string()),
        m => Err(JobError::ConfigError(format!(
            "unsupported interval of {} minutes, use a divisor of an hour or of a day in whole hours",
            m
        ))),
    }
}

fn finish_log(
    job_name: &str,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    items_processed: i64,
    errors: Vec<String>,
    failed: bool,
) -> JobExecutionLog {
    let status = if failed {
        JobStatus::Failed
    } else if errors.is_empty() {
        JobStatus::Completed
    } else {
        JobStatus::PartialFailure
    };

    JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: job_name.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status,
        items_processed,
        errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    }
}

async fn run_deadline_check(
    engine: &AutomationEngine,
    tracker: &DeadlineTracker,
    clock: &dyn Clock,
) -> JobExecutionLog {
    let started_at = clock.now();
    info!("Running deadline check job");

    let outcome = tracker.check_deadlines(engine).await;
    let completed_at = clock.now();

    match outcome {
        Ok(result) => finish_log(
            DEADLINE_CHECK_JOB,
            started_at,
            completed_at,
            result.deadlines_checked as i64,
            result.errors,
            false,
        ),
        Err(e) => {
            error!("Deadline check failed: {}", e);
            finish_log(DEADLINE_CHECK_JOB, started_at, completed_at, 0, vec![e.to_string()], true)
        }
    }
}

async fn run_workload_check(hooks: &AutomationHooks, threshold: i64, clock: &dyn Clock) -> JobExecutionLog {
    let started_at = clock.now();
    info!("Running workload check job");

    let outcome = hooks.check_workload_balance(threshold).await;
    let completed_at = clock.now();

    match outcome {
        Ok(overloaded) => finish_log(
            WORKLOAD_CHECK_JOB,
            started_at,
            completed_at,
            overloaded as i64,
            Vec::new(),
            false,
        ),
        Err(e) => {
            error!("Workload check failed: {}", e);
            finish_log(WORKLOAD_CHECK_JOB, started_at, completed_at, 0, vec![e.to_string()], true)
        }
    }
}

async fn record(logs: &RwLock<Vec<JobExecutionLog>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}

/// Runs are not serialized: a slow run can overlap the next tick.
pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<AutomationEngine>,
    tracker: Arc<DeadlineTracker>,
    hooks: Arc<AutomationHooks>,
    clock: Arc<dyn Clock>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(
        engine: Arc<AutomationEngine>,
        tracker: Arc<DeadlineTracker>,
        hooks: Arc<AutomationHooks>,
        clock: Arc<dyn Clock>,
        config: JobConfig,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            tracker,
            hooks,
            clock,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_deadline_check().await?;
        self.schedule_workload_check().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_deadline_check(&self) -> JobResult<()> {
        let interval = self.config.deadline_check_interval_minutes;
        let cron_expr = interval_cron(interval)?;

        let engine = self.engine.clone();
        let tracker = self.tracker.clone();
        let clock = self.clock.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            let tracker = tracker.clone();
            let clock = clock.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log = run_deadline_check(&engine, &tracker, clock.as_ref()).await;
                record(&logs, log).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled deadline check to run every {} minutes", interval);

        Ok(())
    }

    async fn schedule_workload_check(&self) -> JobResult<()> {
        let interval = self.config.workload_check_interval_minutes;
        let cron_expr = interval_cron(interval)?;
        let threshold = self.config.workload_threshold;

        let hooks = self.hooks.clone();
        let clock = self.clock.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let hooks = hooks.clone();
            let clock = clock.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log = run_workload_check(&hooks, threshold, clock.as_ref()).await;
                record(&logs, log).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled workload check every {} minutes (threshold {})",
            interval, threshold
        );

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Run a job immediately, outside its schedule. The run is recorded like
    /// a scheduled one.
    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobExecutionLog> {
        let log = match job_name {
            DEADLINE_CHECK_JOB => run_deadline_check(&self.engine, &self.tracker, self.clock.as_ref()).await,
            WORKLOAD_CHECK_JOB => {
                run_workload_check(&self.hooks, self.config.workload_threshold, self.clock.as_ref()).await
            }
            _ => return Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        };

        record(&self.execution_logs, log.clone()).await;

        if log.status == JobStatus::Failed {
            return Err(JobError::ExecutionError(log.errors.join("; ")));
        }
        Ok(log)
    }
}
