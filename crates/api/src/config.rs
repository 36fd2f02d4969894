use std::time::Duration;

use waitline_core::config::QueueConfig;
use waitline_core::idle::IdleConfig;
use waitline_core::types::DbId;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Queue engine knobs.
    pub queue: QueueSettings,
    /// Dashboard idle-session timeout.
    pub idle: IdleConfig,
}

/// Queue engine settings applied to every seeded queue.
///
/// In deployment the merchant configuration module supplies per-queue values;
/// this only seeds the in-memory directory the server starts with.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Queues to seed into the directory at startup.
    pub seed_queue_ids: Vec<DbId>,
    /// Verification code length (clamped to 4..=6).
    pub code_length: usize,
    /// Per-queue capacity. `None` is unlimited.
    pub capacity: Option<u32>,
    /// Auto-revert an unacknowledged call after this long. `None` disables.
    pub call_timeout: Option<Duration>,
    /// Grace-period length after a cancellation.
    pub grace_period: Duration,
    /// Terminal entry retention before archival.
    pub retention: Duration,
    /// Interval between background sweeps.
    pub sweep_interval: Duration,
    /// Average per-party service time used for wait estimates.
    pub avg_service_time: Duration,
}

impl QueueSettings {
    /// Queue configuration for a seeded queue.
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            open: true,
            capacity: self.capacity,
            single_called: true,
            call_timeout: self.call_timeout,
            grace_period: self.grace_period,
            retention: self.retention,
            reject_duplicate_contact: true,
            avg_service_time: self.avg_service_time,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `SEED_QUEUE_IDS`        | `1`                     |
    /// | `CODE_LENGTH`           | `4`                     |
    /// | `QUEUE_CAPACITY`        | `0` (unlimited)         |
    /// | `CALL_TIMEOUT_SECS`     | `0` (disabled)          |
    /// | `GRACE_PERIOD_SECS`     | `300`                   |
    /// | `RETENTION_SECS`        | `3600`                  |
    /// | `SWEEP_INTERVAL_SECS`   | `60`                    |
    /// | `AVG_SERVICE_SECS`      | `600`                   |
    /// | `IDLE_SESSION_SECS`     | `1800`                  |
    /// | `IDLE_WARNING_SECS`     | `120`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = env_parsed("PORT", "3000");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let seed_queue_ids: Vec<DbId> = std::env::var("SEED_QUEUE_IDS")
            .unwrap_or_else(|_| "1".into())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .expect("SEED_QUEUE_IDS must be comma-separated integers")
            })
            .collect();

        let capacity: u32 = env_parsed("QUEUE_CAPACITY", "0");
        let call_timeout_secs: u64 = env_parsed("CALL_TIMEOUT_SECS", "0");

        let queue = QueueSettings {
            seed_queue_ids,
            code_length: env_parsed("CODE_LENGTH", "4"),
            capacity: (capacity > 0).then_some(capacity),
            call_timeout: (call_timeout_secs > 0)
                .then(|| Duration::from_secs(call_timeout_secs)),
            grace_period: Duration::from_secs(env_parsed("GRACE_PERIOD_SECS", "300")),
            retention: Duration::from_secs(env_parsed("RETENTION_SECS", "3600")),
            sweep_interval: Duration::from_secs(env_parsed("SWEEP_INTERVAL_SECS", "60")),
            avg_service_time: Duration::from_secs(env_parsed("AVG_SERVICE_SECS", "600")),
        };

        let idle = IdleConfig {
            duration: Duration::from_secs(env_parsed("IDLE_SESSION_SECS", "1800")),
            warning_window: Duration::from_secs(env_parsed("IDLE_WARNING_SECS", "120")),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS", "30"),
            shutdown_timeout_secs: env_parsed("SHUTDOWN_TIMEOUT_SECS", "30"),
            jwt: JwtConfig::from_env(),
            queue,
            idle,
        }
    }
}

/// Read an env var with a default and parse it, panicking on malformed input.
///
/// Misconfiguration should fail fast at startup, not at first use.
fn env_parsed<T: std::str::FromStr>(name: &str, default: &str) -> T
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.into());
    raw.parse()
        .unwrap_or_else(|e| panic!("{name} must be valid: {e}"))
}
