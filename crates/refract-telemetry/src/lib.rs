//! Telemetry primitives shared across the Refract workspace.
//!
//! This crate centralises logging and metrics helpers so the pipeline and its
//! collaborators can adopt a consistent observability story.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;
use tracing::Instrument;
use tracing_subscriber::{EnvFilter, fmt};

/// Default logging target when `RUST_LOG` is not provided.
const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the tracing subscriber cannot be installed (for example,
/// because another subscriber has already been set globally).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    BUILD_SHA
        .set(config.build_sha.to_string())
        .ok()
        .or(Some(()));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level));

    let install = |format: LogFormat| {
        let builder = fmt::fmt()
            .with_env_filter(env_filter.clone())
            .with_target(false)
            .with_thread_ids(false);

        match format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        }
    };

    install(config.format).map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    pub level: &'a str,
    pub format: LogFormat,
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Access the build SHA recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}

/// Execute the provided future with the supplied run identifier available to
/// downstream telemetry.
///
/// The future runs inside a `run` span carrying the identifier, so every log
/// line emitted within is correlated with the run.
pub async fn with_run_context<Fut, T>(run_id: impl Into<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let run_id = run_id.into();
    let span = tracing::info_span!("run", run_id = %run_id);
    let context = RunContext {
        run_id: Arc::from(run_id),
    };
    ACTIVE_RUN_CONTEXT.scope(context, fut.instrument(span)).await
}

/// Retrieve the run identifier from the current task, if one is set.
#[must_use]
pub fn current_run_id() -> Option<String> {
    ACTIVE_RUN_CONTEXT
        .try_with(|ctx| ctx.run_id.as_ref().to_string())
        .ok()
}

#[derive(Clone)]
struct RunContext {
    run_id: Arc<str>,
}

tokio::task_local! {
    static ACTIVE_RUN_CONTEXT: RunContext;
}

/// Prometheus-backed metrics registry shared across pipeline instances.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    runs_started_total: IntCounter,
    runs_completed_total: IntCounter,
    runs_failed_total: IntCounterVec,
    probe_attempts_total: IntCounter,
    transfer_bytes_total: IntCounter,
    events_emitted_total: IntCounterVec,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started_total: u64,
    pub runs_completed_total: u64,
    pub probe_attempts_total: u64,
    pub transfer_bytes_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let runs_started_total = IntCounter::with_opts(Opts::new(
            "pipeline_runs_started_total",
            "Pipeline runs started",
        ))?;
        let runs_completed_total = IntCounter::with_opts(Opts::new(
            "pipeline_runs_completed_total",
            "Pipeline runs that reached the ready state",
        ))?;
        let runs_failed_total = IntCounterVec::new(
            Opts::new(
                "pipeline_runs_failed_total",
                "Pipeline runs that failed, by phase",
            ),
            &["phase"],
        )?;
        let probe_attempts_total = IntCounter::with_opts(Opts::new(
            "pipeline_probe_attempts_total",
            "Completion probes issued",
        ))?;
        let transfer_bytes_total = IntCounter::with_opts(Opts::new(
            "pipeline_transfer_bytes_total",
            "Payload bytes accepted by write destinations",
        ))?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )?;

        registry.register(Box::new(runs_started_total.clone()))?;
        registry.register(Box::new(runs_completed_total.clone()))?;
        registry.register(Box::new(runs_failed_total.clone()))?;
        registry.register(Box::new(probe_attempts_total.clone()))?;
        registry.register(Box::new(transfer_bytes_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                runs_started_total,
                runs_completed_total,
                runs_failed_total,
                probe_attempts_total,
                transfer_bytes_total,
                events_emitted_total,
            }),
        })
    }

    /// Increment the started-run counter.
    pub fn inc_run_started(&self) {
        self.inner.runs_started_total.inc();
    }

    /// Increment the completed-run counter.
    pub fn inc_run_completed(&self) {
        self.inner.runs_completed_total.inc();
    }

    /// Increment the failed-run counter for the phase that failed.
    pub fn inc_run_failed(&self, phase: &str) {
        self.inner
            .runs_failed_total
            .with_label_values(&[phase])
            .inc();
    }

    /// Increment the completion-probe counter.
    pub fn inc_probe_attempt(&self) {
        self.inner.probe_attempts_total.inc();
    }

    /// Record payload bytes accepted by a write destination.
    pub fn add_transfer_bytes(&self, bytes: u64) {
        self.inner.transfer_bytes_total.inc_by(bytes);
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the scalar counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started_total: self.inner.runs_started_total.get(),
            runs_completed_total: self.inner.runs_completed_total.get(),
            probe_attempts_total: self.inner.probe_attempts_total.get(),
            transfer_bytes_total: self.inner.transfer_bytes_total.get(),
        }
    }
}
