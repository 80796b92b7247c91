use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use crate::jobs::JobConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database URL the service runs against the in-memory store
    pub database_url: Option<String>,
    pub server_addr: String,
    pub app_url: String,
    pub smtp: SmtpConfig,
    pub jobs: JobConfig,
}

/// SMTP configuration for sending emails
#[derive(Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let job_defaults = JobConfig::default();

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            server_addr: env::var("SERVER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            app_url: env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or_default(),
                port: parse_or("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_email: env::var("SMTP_FROM_EMAIL")
                    .unwrap_or_else(|_| "automation@quoteflow.local".to_string()),
                from_name: env::var("SMTP_FROM_NAME")
                    .unwrap_or_else(|_| "Quoteflow Automation".to_string()),
                use_tls: parse_or("SMTP_USE_TLS", true),
            },
            jobs: JobConfig {
                deadline_check_interval_minutes: parse_or(
                    "DEADLINE_CHECK_INTERVAL_MINUTES",
                    job_defaults.deadline_check_interval_minutes,
                ),
                workload_check_interval_minutes: parse_or(
                    "WORKLOAD_CHECK_INTERVAL_MINUTES",
                    job_defaults.workload_check_interval_minutes,
                ),
                workload_threshold: parse_or("WORKLOAD_THRESHOLD", job_defaults.workload_threshold),
            },
        })
    }
}

impl SmtpConfig {
    /// Check if SMTP is properly configured
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}
