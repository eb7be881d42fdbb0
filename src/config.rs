// ABOUTME: Client configuration: service URL, HTTP timeout and poll policy
// ABOUTME: Layered as defaults, then an optional TOML file, then environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::BuilderError;
use crate::poll::PollPolicy;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const ENV_BASE_URL: &str = "APP_BUILDER_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "APP_BUILDER_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
        }
    }
}

/// On-disk shape. Every key is optional; durations are milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    #[serde(default)]
    poll: PollSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PollSection {
    interval_ms: Option<u64>,
    multiplier: Option<f64>,
    max_interval_ms: Option<u64>,
    jitter: Option<f64>,
    max_attempts: Option<u32>,
    max_duration_secs: Option<u64>,
    max_consecutive_errors: Option<u32>,
}

impl ClientConfig {
    /// Loads defaults, the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw).context("Failed to parse TOML")?;
        let mut config = Self::default();

        if let Some(url) = file.base_url {
            config.base_url = url;
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }

        let p = file.poll;
        let policy = &mut config.poll;
        if let Some(ms) = p.interval_ms {
            policy.interval = Duration::from_millis(ms);
        }
        if let Some(m) = p.multiplier {
            policy.multiplier = m;
        }
        match p.max_interval_ms {
            Some(ms) => policy.max_interval = Duration::from_millis(ms),
            // A lone interval sets a fixed period, so the cap follows it.
            None => policy.max_interval = policy.max_interval.max(policy.interval),
        }
        if let Some(j) = p.jitter {
            policy.jitter = j;
        }
        if p.max_attempts.is_some() {
            policy.max_attempts = p.max_attempts;
        }
        if let Some(secs) = p.max_duration_secs {
            // 0 disables the bound
            policy.max_duration = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(n) = p.max_consecutive_errors {
            policy.max_consecutive_errors = (n > 0).then_some(n);
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides through `lookup` so tests need not touch process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                BuilderError::Config(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    ENV_POLL_INTERVAL_MS, raw
                ))
            })?;
            self.poll.interval = Duration::from_millis(ms);
            self.poll.max_interval = self.poll.max_interval.max(self.poll.interval);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BuilderError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BuilderError::Config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        self.poll.validate()
    }

    /// Base URL without a trailing slash, ready for path joins.
    pub fn api_base(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }
}
