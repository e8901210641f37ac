//! HTTP readiness probing for supervised services.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::models::service::ReadinessSpec;
use crate::{AppError, Result};

/// Terminal outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// An attempt completed with a 2xx status before the deadline.
    Ready,
    /// The deadline elapsed without a successful attempt.
    TimedOut,
}

/// Polls one HTTP endpoint until it answers 2xx or a deadline passes.
///
/// Holds no mutable state; a probe may be driven concurrently against the
/// same target without interference.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    url: String,
    interval: Duration,
}

impl ReadinessProbe {
    /// Build a probe for one readiness endpoint.
    ///
    /// The HTTP client carries a per-attempt timeout equal to the poll
    /// interval, so one stalled connection can never eat more than a single
    /// polling slot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the HTTP client cannot be constructed.
    pub fn new(spec: &ReadinessSpec) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(spec.interval())
            .build()
            .map_err(|err| AppError::Io(format!("failed to build probe client: {err}")))?;
        Ok(Self {
            client,
            url: spec.url(),
            interval: spec.interval(),
        })
    }

    /// Probe target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Poll the endpoint until it is ready or `deadline` elapses.
    ///
    /// The first attempt fires immediately. Connection errors, per-attempt
    /// timeouts, and non-2xx responses are retried on the interval. The
    /// deadline is wall-clock: when it passes with an attempt in flight,
    /// the attempt is dropped, not awaited.
    pub async fn wait_ready(&self, deadline: Duration) -> ProbeOutcome {
        let started = Instant::now();
        loop {
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                return ProbeOutcome::TimedOut;
            };
            let attempt_started = Instant::now();
            match tokio::time::timeout(remaining, self.attempt()).await {
                Ok(true) => return ProbeOutcome::Ready,
                Ok(false) => {}
                Err(_) => return ProbeOutcome::TimedOut,
            }
            // Sleep out the rest of the polling slot, never past the deadline.
            if let Some(pause) = self.interval.checked_sub(attempt_started.elapsed()) {
                let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                    return ProbeOutcome::TimedOut;
                };
                tokio::time::sleep(pause.min(remaining)).await;
            }
        }
    }

    /// One GET attempt; `true` only on a 2xx response.
    async fn attempt(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let ready = response.status().is_success();
                if !ready {
                    debug!(url = %self.url, status = %response.status(), "endpoint not ready");
                }
                ready
            }
            Err(err) => {
                debug!(url = %self.url, error = %err, "probe attempt failed");
                false
            }
        }
    }
}
