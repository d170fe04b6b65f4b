//! Configuration types for the allocator, clients and shutdown coordinator.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PoolError;
use crate::pool::{Frequency, FrequencyPool};

/// Top-level configuration.
///
/// Loaded from JSON at runtime; every section falls back to its defaults
/// when omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Resource universe and release behaviour
    pub pool: PoolConfig,

    /// Demonstration client timing
    pub client: ClientConfig,

    /// Shutdown polling
    pub shutdown: ShutdownConfig,
}

/// The fixed universe of frequencies handed to the allocator at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Frequencies in initial pool order (head is granted first)
    pub frequencies: Vec<Frequency>,

    /// Delay injected into the release path after the holder is unlinked
    /// (milliseconds). Zero disables it.
    pub release_delay_ms: u64,
}

/// Timing of the acquire/hold/release cycle run by each client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a granted frequency is held before release (milliseconds)
    pub hold_ms: u64,

    /// Pause between a release (or a denial) and the next request (milliseconds)
    pub pause_ms: u64,
}

/// How long the coordinator waits for clients and adapters to disappear.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Number of liveness polls after the allocator has been stopped
    pub max_retries: usize,

    /// Interval between polls (milliseconds)
    pub retry_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            frequencies: (10..=15).collect(),
            release_delay_ms: 0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hold_ms: 100,
            pause_ms: 50,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            max_retries: 20,
            retry_interval_ms: 25,
        }
    }
}

impl PoolConfig {
    /// Reject a universe that lists the same frequency twice.
    pub fn validate(&self) -> Result<(), PoolError> {
        FrequencyPool::new(self.frequencies.iter().copied()).map(|_| ())
    }
}

impl FrequencyConfig {
    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid configuration JSON")?;
        config.pool.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
