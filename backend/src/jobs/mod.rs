// Background Jobs
//
// Deadline tracking and the periodic checks that drive time-based triggers.
// Jobs are scheduled with tokio-cron-scheduler at fixed intervals.

pub mod deadline_tracker;
pub mod scheduler;

pub use deadline_tracker::{DeadlineCheckResult, DeadlineTracker};
pub use scheduler::{JobConfig, JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
