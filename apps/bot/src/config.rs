use std::env::var;
use std::time::Duration;

use anyhow::{Context, Result};
use coin::PollerConfig;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub version: String,
    pub poller: PollerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = PollerConfig::default();

        Ok(Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?,
            version: var("APP_VERSION").unwrap_or_else(|_| "Unknown".to_string()),
            poller: PollerConfig {
                interval: env_secs("POLL_INTERVAL_SECS")?.unwrap_or(defaults.interval),
                fetch_timeout: env_secs("FETCH_TIMEOUT_SECS")?.unwrap_or(defaults.fetch_timeout),
                store_timeout: env_secs("STORE_TIMEOUT_SECS")?.unwrap_or(defaults.store_timeout),
                concurrency: env_parse("POLL_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has invalid value {raw:?}")),
        _ => Ok(None),
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    match env_parse::<u64>(name)? {
        Some(0) => anyhow::bail!("{name} must be greater than zero"),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}
