pub mod notifier;
pub mod workload;
