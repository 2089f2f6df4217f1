//! Control-endpoint client that negotiates one-time write slots.

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{TransformRequest, WriteSlot};

/// Request body the control endpoint expects, serialized in its own casing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    filename: &'a str,
    content_type: &'a str,
    width: u32,
    height: u32,
    quality: u8,
    format: &'a str,
    watermark: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotResponseBody {
    upload_url: String,
    key: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    message: Option<String>,
}

/// Client for the slot-negotiation endpoint.
pub struct SlotNegotiator {
    client: Client,
    endpoint: Url,
}

impl SlotNegotiator {
    /// Build a negotiator for the given control endpoint.
    #[must_use]
    pub const fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Negotiate a write slot for the run described by `request`.
    ///
    /// `suggested_key` is a hint only; the key in the returned slot is the
    /// one the endpoint actually allocated. `token` attaches a bearer
    /// credential when present, and its absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Negotiation`] when the endpoint cannot be
    /// reached, answers with a non-success status, or produces a response
    /// the client cannot interpret.
    pub async fn negotiate(
        &self,
        request: &TransformRequest,
        suggested_key: Option<&str>,
        token: Option<&str>,
    ) -> PipelineResult<WriteSlot> {
        let params = request.params();
        let body = SlotRequestBody {
            key: suggested_key,
            filename: &request.candidate().filename,
            content_type: &request.candidate().mime_type,
            width: params.width,
            height: params.height,
            quality: params.quality,
            format: params.format.as_str(),
            watermark: params.watermark.as_deref().unwrap_or(""),
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|err| {
            let message = format!("failed to reach the control endpoint: {err}");
            PipelineError::Negotiation {
                message,
                source: Some(err),
            }
        })?;

        if !response.status().is_success() {
            return Err(classify_negotiation_failure(response).await);
        }

        let body: SlotResponseBody = response.json().await.map_err(|err| {
            let message = format!("control endpoint answered with an unreadable body: {err}");
            PipelineError::Negotiation {
                message,
                source: Some(err),
            }
        })?;

        let upload_url = Url::parse(&body.upload_url).map_err(|_| PipelineError::Negotiation {
            message: format!(
                "control endpoint answered with an invalid upload URL '{}'",
                body.upload_url
            ),
            source: None,
        })?;
        let expires_at = body
            .expires_in
            .and_then(Duration::try_seconds)
            .and_then(|window| Utc::now().checked_add_signed(window));

        debug!(
            object_key = %body.key,
            expires_in = ?body.expires_in,
            "write slot negotiated"
        );
        Ok(WriteSlot {
            upload_url,
            object_key: body.key,
            expires_at,
        })
    }
}

/// Turn a non-success negotiation response into an error, preferring the
/// server's own message when the body carries one.
async fn classify_negotiation_failure(response: reqwest::Response) -> PipelineError {
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();

    let message = serde_json::from_slice::<FailureBody>(&bytes)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("failed to create an upload slot (status {status})"));

    PipelineError::Negotiation {
        message,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutputFormat, TransformParams, UploadCandidate};
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use refract_test_support::fixtures;
    use serde_json::json;

    fn request() -> TransformRequest {
        TransformRequest::new(
            UploadCandidate::new("photo.jpg", "image/jpeg", 2_048),
            TransformParams {
                width: 1_024,
                height: 768,
                quality: 90,
                format: OutputFormat::Webp,
                watermark: Some("demo".to_string()),
            },
        )
        .expect("request should be valid")
    }

    #[tokio::test]
    async fn negotiation_posts_the_full_parameter_set() {
        let server = MockServer::start_async().await;
        let upload_url = server.url("/put/users/u1/1.jpg");
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/upload-url").json_body(json!({
                "key": "users/u1/1.jpg",
                "filename": "photo.jpg",
                "contentType": "image/jpeg",
                "width": 1_024,
                "height": 768,
                "quality": 90,
                "format": "webp",
                "watermark": "demo",
            }));
            then.status(200)
                .json_body(fixtures::negotiation_success_body(
                    &upload_url,
                    "uploads/users/u1/1.jpg",
                ));
        });

        let negotiator = SlotNegotiator::new(
            Client::new(),
            server.url("/v1/upload-url").parse().expect("mock URL"),
        );
        let slot = negotiator
            .negotiate(&request(), Some("users/u1/1.jpg"), None)
            .await
            .expect("negotiation should succeed");

        mock.assert();
        assert_eq!(slot.upload_url.as_str(), upload_url);
        assert_eq!(slot.object_key, "uploads/users/u1/1.jpg");
        let expires_at = slot.expires_at.expect("expiry should be surfaced");
        assert!(expires_at > Utc::now());
    }

    #[tokio::test]
    async fn bearer_credential_is_attached_when_present() {
        let server = MockServer::start_async().await;
        let upload_url = server.url("/put/next");
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/upload-url")
                .header("authorization", "Bearer token-123");
            then.status(200)
                .json_body(fixtures::negotiation_success_body(&upload_url, "uploads/a"));
        });

        let negotiator = SlotNegotiator::new(
            Client::new(),
            server.url("/v1/upload-url").parse().expect("mock URL"),
        );
        negotiator
            .negotiate(&request(), None, Some("token-123"))
            .await
            .expect("authenticated negotiation should succeed");
        mock.assert();
    }

    #[tokio::test]
    async fn missing_watermark_is_sent_as_an_empty_string() {
        let server = MockServer::start_async().await;
        let upload_url = server.url("/put/next");
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/upload-url").json_body(json!({
                "filename": "photo.jpg",
                "contentType": "image/jpeg",
                "width": 800,
                "height": 600,
                "quality": 85,
                "format": "jpeg",
                "watermark": "",
            }));
            then.status(200)
                .json_body(fixtures::negotiation_success_body(&upload_url, "uploads/b"));
        });

        let plain = TransformRequest::new(
            UploadCandidate::new("photo.jpg", "image/jpeg", 2_048),
            TransformParams::default(),
        )
        .expect("request should be valid");
        let negotiator = SlotNegotiator::new(
            Client::new(),
            server.url("/v1/upload-url").parse().expect("mock URL"),
        );
        negotiator
            .negotiate(&plain, None, None)
            .await
            .expect("negotiation without a suggestion should succeed");
        mock.assert();
    }

    #[tokio::test]
    async fn server_message_becomes_the_failure_reason() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/upload-url");
            then.status(400)
                .json_body(fixtures::negotiation_failure_body("quota exceeded"));
        });

        let negotiator = SlotNegotiator::new(
            Client::new(),
            server.url("/v1/upload-url").parse().expect("mock URL"),
        );
        let err = negotiator
            .negotiate(&request(), None, None)
            .await
            .expect_err("rejection should surface");
        assert!(matches!(err, PipelineError::Negotiation { .. }));
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn unparseable_rejection_falls_back_to_a_generic_message() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/upload-url");
            then.status(500).body("<html>boom</html>");
        });

        let negotiator = SlotNegotiator::new(
            Client::new(),
            server.url("/v1/upload-url").parse().expect("mock URL"),
        );
        let err = negotiator
            .negotiate(&request(), None, None)
            .await
            .expect_err("server error should surface");
        assert_eq!(
            err.to_string(),
            "failed to create an upload slot (status 500 Internal Server Error)"
        );
    }
}
