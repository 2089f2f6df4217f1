//! Streaming byte transfer into a negotiated write slot.

use std::convert::Infallible;
use std::sync::Arc;

use futures_util::stream;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{TransferAck, WriteSlot};
use crate::progress::ProgressSink;

/// Granularity at which the payload is handed to the transport and progress
/// is reported.
const PROGRESS_CHUNK_BYTES: usize = 64 * 1024;

/// Executor that pushes a payload into a write slot with a single `PUT`.
pub struct TransferExecutor {
    client: Client,
}

impl TransferExecutor {
    /// Build an executor on top of an existing HTTP client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send `payload` to the slot's destination.
    ///
    /// The slot is consumed: a destination accepts exactly one write, so the
    /// type system forbids replaying it. `mime_type` is forwarded verbatim as
    /// the payload's `Content-Type`. Progress lands on `progress` as
    /// transfer-local percentages from 0 to 100, one update per chunk handed
    /// to the transport.
    ///
    /// There is no retry here. A rejected or broken transfer fails the run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransferRejected`] when the destination
    /// answers outside the success range and
    /// [`PipelineError::TransferTransport`] when the connection itself fails.
    pub async fn execute(
        &self,
        slot: WriteSlot,
        payload: Vec<u8>,
        mime_type: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> PipelineResult<TransferAck> {
        let bytes_total = payload.len() as u64;
        debug!(
            destination = %slot.upload_url,
            bytes_total,
            "starting transfer"
        );

        let response = self
            .client
            .put(slot.upload_url.clone())
            .header(CONTENT_TYPE, mime_type)
            .body(chunked_body(payload, progress))
            .send()
            .await
            .map_err(|err| {
                let reason = format!("upload failed: {err}");
                PipelineError::TransferTransport {
                    reason,
                    source: Some(err),
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, bytes_total, "transfer accepted");
            Ok(TransferAck {
                status: status.as_u16(),
                bytes_sent: bytes_total,
            })
        } else {
            Err(PipelineError::TransferRejected {
                status: status.as_u16(),
            })
        }
    }
}

/// Wrap the payload in a chunked body that reports progress as the transport
/// drains it.
fn chunked_body(payload: Vec<u8>, progress: Arc<dyn ProgressSink>) -> reqwest::Body {
    let bytes_total = payload.len() as u64;
    let chunks: Vec<Vec<u8>> = payload
        .chunks(PROGRESS_CHUNK_BYTES)
        .map(<[u8]>::to_vec)
        .collect();

    let mut bytes_sent: u64 = 0;
    let stream = stream::iter(chunks.into_iter().map(move |chunk| {
        bytes_sent += chunk.len() as u64;
        progress.publish(transfer_percent(bytes_sent, bytes_total));
        Ok::<Vec<u8>, Infallible>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

/// Transfer-local percentage, rounded to the nearest whole point.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn transfer_percent(bytes_sent: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        return 100;
    }
    ((bytes_sent as f64 / bytes_total as f64) * 100.0).round() as u8
}
