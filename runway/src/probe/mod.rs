//! HTTP readiness probe with bounded polling and backoff.
//!
//! Replaces the blind fixed sleep a deploy script would use before its
//! health check: the probe polls the collaborator's health endpoint until
//! a 2xx arrives, backing off between attempts, bounded by an attempt
//! budget and a per-request timeout.

use crate::errors::ProbeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Backoff strategy for delays between probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Configuration for the readiness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// The health endpoint URL; success is any 2xx response.
    pub url: String,
    /// Maximum attempts (including the first).
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Cap applied to the computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Whether to randomize each delay between 0 and the computed value.
    pub jitter: bool,
}

impl ProbeConfig {
    /// Creates a config with default pacing for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            request_timeout_ms: 2_000,
            backoff: BackoffStrategy::Exponential,
            jitter: false,
        }
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout_ms(mut self, timeout: u64) -> Self {
        self.request_timeout_ms = timeout;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables full jitter on computed delays.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Computes the delay before the attempt after `attempt` (0-indexed).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let raw = match self.backoff {
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt as u32)),
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64 + 1),
            BackoffStrategy::Constant => self.base_delay_ms,
        };
        let capped = raw.min(self.max_delay_ms);

        let final_ms = if self.jitter && capped > 0 {
            rand::thread_rng().gen_range(0..=capped)
        } else {
            capped
        };

        Duration::from_millis(final_ms)
    }
}

/// Polls an HTTP health endpoint until it reports ready.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl ReadinessProbe {
    /// Creates a probe from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    /// Returns the probed URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Polls until a 2xx response arrives or the attempt budget is spent.
    ///
    /// Returns the number of attempts used on success.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Unhealthy`] carrying the last HTTP status
    /// observed (if any response arrived at all).
    pub async fn wait_ready(&self) -> Result<usize, ProbeError> {
        let mut last_status = None;

        for attempt in 0..self.config.max_attempts {
            match self.client.get(&self.config.url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        url = %self.config.url,
                        attempts = attempt + 1,
                        "Endpoint ready"
                    );
                    return Ok(attempt + 1);
                }
                Ok(response) => {
                    last_status = Some(response.status().as_u16());
                    debug!(
                        url = %self.config.url,
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        "Endpoint not ready yet"
                    );
                }
                Err(err) => {
                    debug!(
                        url = %self.config.url,
                        error = %err,
                        attempt = attempt + 1,
                        "Endpoint not reachable yet"
                    );
                }
            }

            if attempt + 1 < self.config.max_attempts {
                tokio::time::sleep(self.config.delay_for(attempt)).await;
            }
        }

        Err(ProbeError::Unhealthy {
            url: self.config.url.clone(),
            attempts: self.config.max_attempts,
            last_status,
        })
    }
}
