use serde::{Deserialize, Serialize};

/// Layered TOML settings for the `oms_server` binary (SPEC_FULL.md §2 item
/// 10), loaded via `toml_edit` the way the teacher's `core::config` loads
/// `AppSettings` — a single `#[derive(Deserialize)]` struct, no ad-hoc
/// `env::var` scattered through business logic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub dispatcher: DispatcherSettings,
    pub reconciler: ReconcilerSettings,
    pub queue: QueueSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    16
}

/// `dispatcher_pool_size` scoped per engine family (spec.md §2 item 5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherSettings {
    #[serde(default = "default_pool_size")]
    pub ccxt_pool_size: usize,
    #[serde(default = "default_pool_size")]
    pub ccxtpro_pool_size: usize,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_ring_capacity")]
    pub event_ring_capacity: usize,
}

fn default_pool_size() -> usize {
    4
}

fn default_bind_addr() -> String {
    "127.0.0.1:7777".to_owned()
}

fn default_session_ttl() -> u64 {
    300
}

fn default_ring_capacity() -> usize {
    5000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: i64,
    #[serde(default = "default_symbol_fallback_limit")]
    pub symbol_fallback_limit: usize,
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_lookback_seconds() -> i64 {
    3_600
}

fn default_symbol_fallback_limit() -> usize {
    20
}

/// Backoff for the queue worker (spec.md §4.8, SPEC_FULL.md §9 Open
/// Question resolution: a fixed `delay_seconds`, not implicit exponential
/// growth).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_retry_delay() -> i64 {
    30
}

fn default_max_attempts() -> i32 {
    10
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Overrides the log4rs config discovery walk (SPEC_FULL.md §2 item 11),
    /// mirroring the teacher's `MMB_NO_LOGS` environment-variable precedent.
    #[serde(default)]
    pub config_path: Option<std::path::PathBuf>,
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let document = raw.parse::<toml_edit::Document>()?;
        let value = document.to_string();
        Ok(toml_edit::de::from_str(&value)?)
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("unable to load settings file {}: {err}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let raw = r#"
            [database]
            url = "postgres://localhost/oms"

            [dispatcher]

            [reconciler]

            [queue]
        "#;
        let settings = Settings::from_toml_str(raw).unwrap();
        assert_eq!(settings.dispatcher.ccxt_pool_size, 4);
        assert_eq!(settings.queue.retry_delay_seconds, 30);
        assert_eq!(settings.database.max_connections, 16);
    }
}
