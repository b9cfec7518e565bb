//! Engine configuration.
//!
//! Defaults cover everything except the list of groups; `from_env` layers
//! `REMINDR_*` variables on top, and `validate` turns the raw values into
//! typed [`RunSettings`].

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use remindr_core::{parse_timezone, DomainError, SourceGroup};

use crate::jobs::{RetrySettings, DEFAULT_CONCURRENCY};
use crate::scan::DEFAULT_PAGE_SIZE;
use crate::writeback::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Raw engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source groups, scanned in this order.
    pub groups: Vec<String>,
    pub page_size: u64,
    pub write_chunk_size: usize,
    pub concurrency: usize,
    /// Status label (case-insensitive) marking a record as complete.
    pub done_sentinel: String,
    pub dedup_enabled: bool,
    pub skip_weekends: bool,
    /// IANA timezone the run's "today" is pinned to.
    pub timezone: String,
    pub delivery_retry: RetrySettings,
    pub fetch_retry: RetrySettings,
    pub write_retry: RetrySettings,
    pub shutdown_grace_ms: u64,
    /// When set, runs are triggered on this period.
    pub schedule_interval_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            write_chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            done_sentinel: "done".to_string(),
            dedup_enabled: true,
            skip_weekends: false,
            timezone: "UTC".to_string(),
            delivery_retry: RetrySettings::new(5, 1_000, 30_000),
            fetch_retry: RetrySettings::new(3, 500, 10_000),
            write_retry: RetrySettings::new(3, 500, 10_000),
            shutdown_grace_ms: 30_000,
            schedule_interval_secs: None,
        }
    }
}

/// Validated, typed settings consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub groups: Vec<SourceGroup>,
    pub page_size: u64,
    pub done_sentinel: String,
    pub dedup_enabled: bool,
    pub skip_weekends: bool,
    pub timezone: Tz,
}

impl EngineConfig {
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_write_chunk_size(mut self, chunk_size: usize) -> Self {
        self.write_chunk_size = chunk_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_skip_weekends(mut self, skip: bool) -> Self {
        self.skip_weekends = skip;
        self
    }

    pub fn with_delivery_retry(mut self, retry: RetrySettings) -> Self {
        self.delivery_retry = retry;
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn schedule_interval(&self) -> Option<Duration> {
        self.schedule_interval_secs.map(Duration::from_secs)
    }

    /// Defaults overlaid with `REMINDR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup` (keyed like the env vars).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(groups) = lookup("REMINDR_GROUPS") {
            cfg.groups = groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("REMINDR_DONE_SENTINEL") {
            cfg.done_sentinel = v;
        }
        if let Some(v) = lookup("REMINDR_TIMEZONE") {
            cfg.timezone = v;
        }

        read(&lookup, "REMINDR_PAGE_SIZE", &mut cfg.page_size)?;
        read(&lookup, "REMINDR_WRITE_CHUNK_SIZE", &mut cfg.write_chunk_size)?;
        read(&lookup, "REMINDR_CONCURRENCY", &mut cfg.concurrency)?;
        read(&lookup, "REMINDR_DEDUP", &mut cfg.dedup_enabled)?;
        read(&lookup, "REMINDR_SKIP_WEEKENDS", &mut cfg.skip_weekends)?;
        read(&lookup, "REMINDR_SHUTDOWN_GRACE_MS", &mut cfg.shutdown_grace_ms)?;
        read(&lookup, "REMINDR_DELIVERY_MAX_RETRIES", &mut cfg.delivery_retry.max_retries)?;
        read(&lookup, "REMINDR_DELIVERY_BASE_DELAY_MS", &mut cfg.delivery_retry.base_delay_ms)?;
        read(&lookup, "REMINDR_DELIVERY_MAX_DELAY_MS", &mut cfg.delivery_retry.max_delay_ms)?;

        if let Some(raw) = lookup("REMINDR_SCHEDULE_INTERVAL_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::invalid("REMINDR_SCHEDULE_INTERVAL_SECS", e.to_string())
            })?;
            cfg.schedule_interval_secs = Some(secs);
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<RunSettings, ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::invalid("groups", "at least one group is required"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be positive"));
        }
        if self.write_chunk_size == 0 {
            return Err(ConfigError::invalid("write_chunk_size", "must be positive"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be positive"));
        }
        if self.schedule_interval_secs == Some(0) {
            return Err(ConfigError::invalid("schedule_interval_secs", "must be positive"));
        }
        for (key, retry) in [
            ("delivery_retry", &self.delivery_retry),
            ("fetch_retry", &self.fetch_retry),
            ("write_retry", &self.write_retry),
        ] {
            if retry.base_delay_ms > retry.max_delay_ms {
                return Err(ConfigError::invalid(key, "base delay exceeds max delay"));
            }
        }

        let groups = self
            .groups
            .iter()
            .map(|g| SourceGroup::new(g.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RunSettings {
            groups,
            page_size: self.page_size,
            done_sentinel: self.done_sentinel.clone(),
            dedup_enabled: self.dedup_enabled,
            skip_weekends: self.skip_weekends,
            timezone: parse_timezone(&self.timezone)?,
        })
    }
}

fn read<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))?;
    }
    Ok(())
}
