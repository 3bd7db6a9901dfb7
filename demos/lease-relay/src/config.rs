//! Relay configuration.
//!
//! Loaded from a TOML file, then overridden from the environment.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Endpoint URI messages are leased from
    pub source_uri: String,
    /// Endpoint URI messages are sent to
    pub destination_uri: String,
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,
    /// How long shutdown waits for in-flight messages, in seconds
    pub drain_timeout_secs: u64,
    /// Messages enqueued on the source at startup
    pub seed_messages: usize,
    /// Prometheus scrape address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source_uri: "leasebus://queue?queueName=orders".to_string(),
            destination_uri: "leasebus://topic?topicPath=order-events&subscriptionName=audit"
                .to_string(),
            poll_interval_ms: 500,
            drain_timeout_secs: 30,
            seed_messages: 10,
            metrics_addr: None,
        }
    }
}

impl RelayConfig {
    /// Load from `path` if given, then apply `LEASE_RELAY_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override or the resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(uri) = env::var("LEASE_RELAY_SOURCE_URI") {
            config.source_uri = uri;
        }
        if let Ok(uri) = env::var("LEASE_RELAY_DESTINATION_URI") {
            config.destination_uri = uri;
        }
        if let Ok(interval) = env::var("LEASE_RELAY_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval
                .parse()
                .context("LEASE_RELAY_POLL_INTERVAL_MS must be a number of milliseconds")?;
        }
        if let Ok(addr) = env::var("LEASE_RELAY_METRICS_ADDR") {
            config.metrics_addr = Some(addr.parse().context("LEASE_RELAY_METRICS_ADDR")?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the relay cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_uri == self.destination_uri {
            bail!("source and destination must differ");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        Ok(())
    }

    /// Delay between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Shutdown drain timeout.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
