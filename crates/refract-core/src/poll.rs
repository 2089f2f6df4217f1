//! Bounded completion polling against the read-side location.
//!
//! The transform backend never calls back, so readiness is observed the only
//! way it can be: probe the location the processed artifact will eventually
//! occupy, a bounded number of times, and give up loudly when the budget runs
//! out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use refract_config::PollPlan;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::{PipelineError, PipelineResult};
use crate::keys::derive_processed_key;
use crate::progress::ProgressSink;

/// Existence check against a single read-side location.
///
/// `Ok(true)` means the artifact is observably there, `Ok(false)` means it is
/// not there yet. An `Err` is a transient transport problem and counts as a
/// missed attempt rather than a run failure.
#[async_trait]
pub trait ArtifactProbe: Send + Sync {
    /// Probe `location` once.
    async fn exists(&self, location: &Url) -> anyhow::Result<bool>;
}

/// Probe that issues a `HEAD` request, the cheapest check a plain HTTP
/// read side supports.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Build a probe on top of an existing HTTP client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactProbe for HttpProbe {
    async fn exists(&self, location: &Url) -> anyhow::Result<bool> {
        let response = self.client.head(location.clone()).send().await?;
        Ok(response.status().is_success())
    }
}

/// Pause between probe attempts. Injectable so tests run without timers.
#[async_trait]
pub trait ProbeDelay: Send + Sync {
    /// Wait out one inter-probe interval.
    async fn pause(&self, interval: Duration);
}

/// Delay backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl ProbeDelay for TokioDelay {
    async fn pause(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Poller that waits for a processed artifact to appear.
pub struct CompletionPoller {
    probe: Arc<dyn ArtifactProbe>,
    read_base: Url,
    plan: PollPlan,
    delay: Arc<dyn ProbeDelay>,
}

impl CompletionPoller {
    /// Build a poller that probes over HTTP and paces with the tokio timer.
    #[must_use]
    pub fn new(client: Client, read_base: Url, plan: PollPlan) -> Self {
        Self::with_parts(
            Arc::new(HttpProbe::new(client)),
            read_base,
            plan,
            Arc::new(TokioDelay),
        )
    }

    /// Build a poller from explicit parts.
    #[must_use]
    pub fn with_parts(
        probe: Arc<dyn ArtifactProbe>,
        read_base: Url,
        plan: PollPlan,
        delay: Arc<dyn ProbeDelay>,
    ) -> Self {
        Self {
            probe,
            read_base,
            plan,
            delay,
        }
    }

    /// Read-side location derived for `object_key`.
    ///
    /// Substitutes the raw key segment for the processed one and resolves the
    /// result against the read base. Keys without a raw segment probe their
    /// original location.
    #[must_use]
    pub fn artifact_location(&self, object_key: &str) -> Url {
        let derived = derive_processed_key(object_key);
        let mut location = self.read_base.clone();
        if let Ok(mut segments) = location.path_segments_mut() {
            segments.pop_if_empty().extend(derived.split('/'));
        }
        location
    }

    /// Wait until the processed artifact for `object_key` is available,
    /// reporting unified progress on each attempt.
    ///
    /// Pacing: a fixed pause follows every unsuccessful attempt, including
    /// the last one, so exhausting a budget of `n` waits out `n` full
    /// intervals. Success returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Timeout`] when the budget is exhausted
    /// without the artifact ever appearing.
    pub async fn await_completion(
        &self,
        object_key: &str,
        progress: &dyn ProgressSink,
    ) -> PipelineResult<Url> {
        let location = self.artifact_location(object_key);
        let budget = self.plan.max_attempts;

        for attempt in 1..=budget {
            progress.publish(poll_percent(attempt - 1, budget));
            match self.probe.exists(&location).await {
                Ok(true) => {
                    debug!(attempt, location = %location, "processed artifact is available");
                    return Ok(location);
                }
                Ok(false) => {
                    debug!(attempt, budget, "artifact not ready");
                }
                Err(err) => {
                    // Transient probe trouble is just a missed attempt.
                    debug!(attempt, budget, error = %err, "probe failed");
                }
            }
            self.delay.pause(self.plan.interval()).await;
        }

        warn!(
            attempts = budget,
            location = %location,
            "gave up waiting for the processed artifact"
        );
        Err(PipelineError::Timeout { attempts: budget })
    }
}

/// Unified progress for a poll attempt: the second half of the scale, spread
/// evenly across the budget. `attempt_index` is zero-based.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn poll_percent(attempt_index: u32, budget: u32) -> u8 {
    if budget == 0 {
        return 50;
    }
    let fraction = f64::from(attempt_index) / f64::from(budget);
    50 + (fraction * 50.0).round() as u8
}
