//! Run state machine that drives the pipeline phases in order.
//!
//! The controller owns the observable [`PipelineState`] and is the only
//! writer to it. A run walks `Idle → Validating → NegotiatingSlot →
//! Transferring → Polling → Ready`, bailing to `Failed` the moment any phase
//! errors, and every transition is mirrored onto the event bus.

use std::sync::Arc;

use refract_auth::IdentityProvider;
use refract_config::{ConfigResult, PipelineConfig, UploadLimits};
use refract_events::{Event, EventBus, PipelinePhase};
use refract_telemetry::{Metrics, with_run_context};
use reqwest::Client;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::keys::{KeyGenerator, UuidKeyGenerator, suggested_key};
use crate::model::{PipelineState, TransformRequest};
use crate::negotiate::SlotNegotiator;
use crate::poll::CompletionPoller;
use crate::progress::{NullProgressSink, ProgressGauge, ProgressSink};
use crate::transfer::TransferExecutor;
use crate::validate::validate_candidate;

/// Unified progress pinned when slot negotiation begins.
const PROGRESS_NEGOTIATING: u8 = 5;

/// Unified progress pinned once the transfer has been accepted. The transfer
/// owns the first half of the scale, polling the second.
const PROGRESS_TRANSFERRED: u8 = 50;

/// Unified progress pinned when the processed artifact is available.
const PROGRESS_READY: u8 = 100;

/// Successful outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifact {
    /// Storage key the raw payload was written under.
    pub object_key: String,
    /// Read-side location of the processed artifact.
    pub result_reference: Url,
}

/// Orchestrator for the upload-and-poll pipeline.
///
/// Runs are strictly sequential: `run` takes `&mut self`, so a second run
/// cannot start while one is in flight.
pub struct PipelineController {
    negotiator: SlotNegotiator,
    transfer: TransferExecutor,
    poller: CompletionPoller,
    limits: UploadLimits,
    identity: Arc<dyn IdentityProvider>,
    keys: Arc<dyn KeyGenerator>,
    events: EventBus,
    metrics: Metrics,
    sink: Arc<dyn ProgressSink>,
    state: PipelineState,
}

impl PipelineController {
    /// Build a controller from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the control endpoint or read base
    /// is missing or malformed.
    pub fn new(
        config: &PipelineConfig,
        identity: Arc<dyn IdentityProvider>,
        events: EventBus,
        metrics: Metrics,
    ) -> ConfigResult<Self> {
        let client = Client::new();
        Ok(Self {
            negotiator: SlotNegotiator::new(client.clone(), config.endpoints.negotiate_url()?),
            transfer: TransferExecutor::new(client.clone()),
            poller: CompletionPoller::new(
                client,
                config.endpoints.read_base_url()?,
                config.polling,
            ),
            limits: config.limits.clone(),
            identity,
            keys: Arc::new(UuidKeyGenerator),
            events,
            metrics,
            sink: Arc::new(NullProgressSink),
            state: PipelineState::idle(),
        })
    }

    /// Replace the progress sink observers receive unified updates on.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the generator used to compose suggested storage keys.
    #[must_use]
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    /// Replace the completion poller, e.g. to change probing or pacing.
    #[must_use]
    pub fn with_poller(mut self, poller: CompletionPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Snapshot of the current observable state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.clone()
    }

    /// Discard all per-run state and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = PipelineState::idle();
        info!("pipeline reset to idle");
    }

    /// Drive one payload through the full pipeline.
    ///
    /// Progress lands on the configured sink as a monotonic series on the
    /// unified 0 to 100 scale; the run never reports a value lower than one
    /// it already reported. On failure the observable progress resets to 0
    /// and the error's rendering becomes the failure reason.
    ///
    /// # Errors
    ///
    /// Returns the first phase error encountered; the run stops at that
    /// phase and no later phase is attempted.
    pub async fn run(
        &mut self,
        request: &TransformRequest,
        payload: Vec<u8>,
    ) -> PipelineResult<RunArtifact> {
        let run_id = Uuid::new_v4();
        with_run_context(run_id.to_string(), self.run_inner(run_id, request, payload)).await
    }

    async fn run_inner(
        &mut self,
        run_id: Uuid,
        request: &TransformRequest,
        payload: Vec<u8>,
    ) -> PipelineResult<RunArtifact> {
        self.state = PipelineState::idle();
        self.metrics.inc_run_started();
        info!(
            filename = %request.candidate().filename,
            size_bytes = request.candidate().size_bytes,
            "pipeline run started"
        );
        self.publish(Event::RunStarted {
            run_id,
            filename: request.candidate().filename.clone(),
        });

        let gauge = Arc::new(ProgressGauge::new(Arc::new(RunProgress {
            run_id,
            caller: self.sink.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        })));

        self.enter_phase(run_id, PipelinePhase::Validating);
        if let Err(err) = validate_candidate(request.candidate(), &self.limits) {
            return Err(self.fail(run_id, err));
        }

        self.enter_phase(run_id, PipelinePhase::NegotiatingSlot);
        gauge.advance(PROGRESS_NEGOTIATING);
        self.state.progress_percent = gauge.current();
        let identity = self.identity.current_identity().await;
        let token = self.identity.current_token().await;
        let suggestion = suggested_key(
            identity.as_ref().map(|who| who.id.as_str()),
            &request.candidate().filename,
            self.keys.as_ref(),
        );
        let slot = match self
            .negotiator
            .negotiate(request, Some(&suggestion), token.as_deref())
            .await
        {
            Ok(slot) => slot,
            Err(err) => return Err(self.fail(run_id, err)),
        };
        let object_key = slot.object_key.clone();
        self.state.object_key = Some(object_key.clone());
        self.publish(Event::SlotNegotiated {
            run_id,
            object_key: object_key.clone(),
        });

        self.enter_phase(run_id, PipelinePhase::Transferring);
        let scaled: Arc<dyn ProgressSink> = Arc::new(TransferScale {
            gauge: gauge.clone(),
        });
        let ack = match self
            .transfer
            .execute(slot, payload, &request.candidate().mime_type, scaled)
            .await
        {
            Ok(ack) => ack,
            Err(err) => return Err(self.fail(run_id, err)),
        };
        self.metrics.add_transfer_bytes(ack.bytes_sent);
        gauge.advance(PROGRESS_TRANSFERRED);
        self.state.progress_percent = gauge.current();
        self.publish(Event::TransferCompleted {
            run_id,
            bytes_total: ack.bytes_sent,
        });

        self.enter_phase(run_id, PipelinePhase::Polling);
        let counting = ProbeCount {
            gauge: gauge.clone(),
            metrics: self.metrics.clone(),
        };
        let reference = match self.poller.await_completion(&object_key, &counting).await {
            Ok(reference) => reference,
            Err(err) => return Err(self.fail(run_id, err)),
        };

        gauge.advance(PROGRESS_READY);
        self.state.progress_percent = gauge.current();
        self.state.result_reference = Some(reference.clone());
        self.enter_phase(run_id, PipelinePhase::Ready);
        self.publish(Event::ArtifactReady {
            run_id,
            reference: reference.to_string(),
        });
        self.metrics.inc_run_completed();
        info!(object_key = %object_key, reference = %reference, "pipeline run ready");

        Ok(RunArtifact {
            object_key,
            result_reference: reference,
        })
    }

    fn enter_phase(&mut self, run_id: Uuid, phase: PipelinePhase) {
        self.state.phase = phase;
        info!(phase = phase.as_str(), "pipeline phase changed");
        self.publish(Event::PhaseChanged { run_id, phase });
    }

    /// Record a failure: the run lands in `Failed`, observable progress
    /// resets to 0, and the error's rendering becomes the failure reason.
    fn fail(&mut self, run_id: Uuid, err: PipelineError) -> PipelineError {
        let phase = self.state.phase;
        let reason = err.to_string();
        warn!(phase = phase.as_str(), error = %reason, "pipeline run failed");
        self.metrics.inc_run_failed(phase.as_str());
        self.state.phase = PipelinePhase::Failed;
        self.state.progress_percent = 0;
        self.state.failure_reason = Some(reason.clone());
        self.publish(Event::RunFailed {
            run_id,
            phase,
            reason,
        });
        err
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
    }
}

/// Fan-out target behind the run's monotonic gauge: caller sink, event
/// stream, and the emission counter.
struct RunProgress {
    run_id: Uuid,
    caller: Arc<dyn ProgressSink>,
    events: EventBus,
    metrics: Metrics,
}

impl ProgressSink for RunProgress {
    fn publish(&self, percent: u8) {
        let event = Event::Progress {
            run_id: self.run_id,
            percent,
        };
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
        self.caller.publish(percent);
    }
}

/// The transfer reports percentages for its own bytes; on the unified scale
/// it owns only the first half.
struct TransferScale {
    gauge: Arc<ProgressGauge>,
}

impl ProgressSink for TransferScale {
    fn publish(&self, percent: u8) {
        self.gauge.advance(percent.min(100) / 2);
    }
}

/// Poll updates are already unified; each one also counts a probe attempt.
struct ProbeCount {
    gauge: Arc<ProgressGauge>,
    metrics: Metrics,
}

impl ProgressSink for ProbeCount {
    fn publish(&self, percent: u8) {
        self.metrics.inc_probe_attempt();
        self.gauge.advance(percent);
    }
}
