use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("expected `text` or `json`, got `{other}`")),
        }
    }
}

pub struct Config {
    pub listen_addr: SocketAddr,
    pub batch_interval: Duration,
    pub event_bus_capacity: usize,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            batch_interval: Duration::from_secs(15),
            event_bus_capacity: 256,
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_millis(30000),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to
    /// defaults for unset variables.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("BLOG_LISTEN_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid BLOG_LISTEN_ADDR: {raw}"))?,
            None => defaults.listen_addr,
        };

        let batch_secs: u64 = match lookup("BLOG_BATCH_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BLOG_BATCH_INTERVAL_SECS: {raw}"))?,
            None => defaults.batch_interval.as_secs(),
        };
        if batch_secs == 0 {
            bail!("BLOG_BATCH_INTERVAL_SECS must be greater than zero");
        }

        let event_bus_capacity: usize = match lookup("BLOG_EVENT_BUS_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BLOG_EVENT_BUS_CAPACITY: {raw}"))?,
            None => defaults.event_bus_capacity,
        };
        if event_bus_capacity == 0 {
            bail!("BLOG_EVENT_BUS_CAPACITY must be greater than zero");
        }

        let cors_allow = lookup("BLOG_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let timeout_ms: u64 = match lookup("BLOG_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BLOG_REQUEST_TIMEOUT_MS: {raw}"))?,
            None => defaults.request_timeout.as_millis() as u64,
        };
        if timeout_ms == 0 {
            bail!("BLOG_REQUEST_TIMEOUT_MS must be greater than zero");
        }

        let log_format = match lookup("BLOG_LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .with_context(|| format!("Invalid BLOG_LOG_FORMAT: {raw}"))?,
            None => defaults.log_format,
        };

        Ok(Self {
            listen_addr,
            batch_interval: Duration::from_secs(batch_secs),
            event_bus_capacity,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            log_format,
        })
    }
}
