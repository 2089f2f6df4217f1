//! Client for the run-history record store.
//!
//! After a pipeline run completes, embedders can persist what happened and
//! later page through past runs. The store is a thin JSON API: one endpoint
//! accepts a record, the other lists records for a user. This client speaks
//! that wire shape verbatim and adds the read-side URL fallback the store
//! itself may omit.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Page size requested when the caller does not pick one.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Convenient result alias for record-store operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Failure talking to the record store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The store answered with a non-success status.
    #[error("{message}")]
    Rejected {
        /// Server-provided message, or a generic fallback.
        message: String,
        /// HTTP status the store answered with.
        status: u16,
    },

    /// The request never completed, or the response body was unreadable.
    #[error("record store request failed: {source}")]
    Transport {
        /// Underlying client error.
        #[from]
        source: reqwest::Error,
    },
}

/// Transform parameters remembered alongside a stored run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Target width the run requested.
    pub width: u32,
    /// Target height the run requested.
    pub height: u32,
    /// Output quality the run requested.
    pub quality: u8,
    /// Output format label the run requested.
    pub format: String,
    /// Watermark text, empty when none was stamped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
}

/// Record describing one completed run, as submitted to the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Identity the run belongs to.
    pub user_id: String,
    /// Storage key of the raw payload, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_key: Option<String>,
    /// Storage key of the processed artifact.
    pub processed_key: String,
    /// Transform parameters used for the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
}

/// Acknowledgement returned when a record is accepted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SaveReceipt {
    /// Confirmation message from the store.
    pub message: String,
    /// Store-assigned timestamp, as the store rendered it.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One stored run, as the store lists it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Identity the record belongs to.
    pub user_id: String,
    /// Storage key of the raw payload, when recorded.
    #[serde(default)]
    pub original_key: Option<String>,
    /// Storage key of the processed artifact.
    pub processed_key: String,
    /// Store-assigned timestamp, as the store rendered it.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Transform parameters remembered for the run.
    #[serde(default)]
    pub metadata: Option<RecordMetadata>,
    /// Ready-to-use processed location, when the store provides one.
    #[serde(default)]
    pub processed_url: Option<String>,
    /// Ready-to-use original location, when the store provides one.
    #[serde(default)]
    pub original_url: Option<String>,
}

impl HistoryRecord {
    /// Read-side location of the processed artifact.
    ///
    /// Prefers the store-provided URL; otherwise derives one by resolving
    /// the processed key against `read_base`.
    #[must_use]
    pub fn processed_location(&self, read_base: &Url) -> Url {
        self.processed_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
            .unwrap_or_else(|| resolve_key(read_base, &self.processed_key))
    }

    /// Read-side location of the raw payload, when one was recorded.
    #[must_use]
    pub fn original_location(&self, read_base: &Url) -> Option<Url> {
        if let Some(url) = self
            .original_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok())
        {
            return Some(url);
        }
        self.original_key
            .as_deref()
            .map(|key| resolve_key(read_base, key))
    }
}

/// Page of stored runs for one user.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    /// Number of records in this page.
    pub count: u64,
    /// The records themselves, newest first.
    pub items: Vec<HistoryRecord>,
    /// Identity the page was listed for, as echoed by the store.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    error: Option<String>,
}

/// Client for the record store's save and list endpoints.
pub struct HistoryClient {
    client: Client,
    save_endpoint: Url,
    list_endpoint: Url,
}

impl HistoryClient {
    /// Build a client for the given endpoints.
    #[must_use]
    pub const fn new(client: Client, save_endpoint: Url, list_endpoint: Url) -> Self {
        Self {
            client,
            save_endpoint,
            list_endpoint,
        }
    }

    /// Persist one completed run.
    ///
    /// `token` attaches a bearer credential when present; its absence is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Rejected`] when the store turns the record
    /// away (for example, when required fields are missing) and
    /// [`HistoryError::Transport`] when the request itself fails.
    pub async fn save(
        &self,
        record: &RunRecord,
        token: Option<&str>,
    ) -> HistoryResult<SaveReceipt> {
        let mut builder = self.client.post(self.save_endpoint.clone()).json(record);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(classify_rejection(response, "failed to save run history").await);
        }
        let receipt: SaveReceipt = response.json().await?;
        debug!(
            user_id = %record.user_id,
            processed_key = %record.processed_key,
            "run history saved"
        );
        Ok(receipt)
    }

    /// List stored runs for `user_id`, newest first.
    ///
    /// `limit` caps the page size, defaulting to [`DEFAULT_PAGE_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Rejected`] when the store refuses the query
    /// and [`HistoryError::Transport`] when the request itself fails.
    pub async fn list(
        &self,
        user_id: &str,
        limit: Option<u32>,
        token: Option<&str>,
    ) -> HistoryResult<HistoryPage> {
        let mut endpoint = self.list_endpoint.clone();
        endpoint
            .query_pairs_mut()
            .append_pair("userId", user_id)
            .append_pair("limit", &limit.unwrap_or(DEFAULT_PAGE_LIMIT).to_string());

        let mut builder = self.client.get(endpoint);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(classify_rejection(response, "failed to list run history").await);
        }
        let page: HistoryPage = response.json().await?;
        debug!(user_id, count = page.count, "run history listed");
        Ok(page)
    }
}

/// Resolve a storage key against the read-side base location.
fn resolve_key(read_base: &Url, key: &str) -> Url {
    let mut location = read_base.clone();
    if let Ok(mut segments) = location.path_segments_mut() {
        segments.pop_if_empty().extend(key.split('/'));
    }
    location
}

/// Turn a non-success store response into an error, preferring the store's
/// own message when the body carries one.
async fn classify_rejection(response: reqwest::Response, fallback: &str) -> HistoryError {
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();

    let message = serde_json::from_slice::<FailureBody>(&bytes)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("{fallback} (status {status})"));

    HistoryError::Rejected {
        message,
        status: status.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use refract_test_support::fixtures;
    use serde_json::json;

    fn client_for(server: &MockServer) -> HistoryClient {
        HistoryClient::new(
            Client::new(),
            server.url("/v1/history").parse().expect("save URL"),
            server.url("/v1/history").parse().expect("list URL"),
        )
    }

    fn record() -> RunRecord {
        RunRecord {
            user_id: "user-1".to_string(),
            original_key: Some("uploads/users/user-1/1.jpg".to_string()),
            processed_key: "processed/users/user-1/1.jpg".to_string(),
            metadata: Some(RecordMetadata {
                width: 800,
                height: 600,
                quality: 85,
                format: "jpeg".to_string(),
                watermark: Some(String::new()),
            }),
        }
    }

    #[tokio::test]
    async fn save_posts_the_record_and_reads_the_receipt() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/history")
                .header("authorization", "Bearer tok-1")
                .json_body(json!({
                    "userId": "user-1",
                    "originalKey": "uploads/users/user-1/1.jpg",
                    "processedKey": "processed/users/user-1/1.jpg",
                    "metadata": {
                        "width": 800,
                        "height": 600,
                        "quality": 85,
                        "format": "jpeg",
                        "watermark": "",
                    },
                }));
            then.status(200)
                .json_body(fixtures::history_saved_body("2024-05-01T12:00:00"));
        });

        let receipt = client_for(&server)
            .save(&record(), Some("tok-1"))
            .await
            .expect("save should succeed");

        mock.assert();
        assert_eq!(receipt.message, "Image history saved successfully");
        assert_eq!(receipt.timestamp.as_deref(), Some("2024-05-01T12:00:00"));
    }

    #[tokio::test]
    async fn store_rejection_surfaces_its_own_message() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v1/history");
            then.status(400)
                .json_body(json!({ "error": "userId and processedKey are required" }));
        });

        let err = client_for(&server)
            .save(&record(), None)
            .await
            .expect_err("rejection should surface");

        assert!(matches!(err, HistoryError::Rejected { status: 400, .. }));
        assert_eq!(err.to_string(), "userId and processedKey are required");
    }

    #[tokio::test]
    async fn unreadable_rejection_falls_back_to_a_generic_message() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v1/history");
            then.status(500).body("oops");
        });

        let err = client_for(&server)
            .list("user-1", None, None)
            .await
            .expect_err("server error should surface");
        assert_eq!(
            err.to_string(),
            "failed to list run history (status 500 Internal Server Error)"
        );
    }

    #[tokio::test]
    async fn list_queries_by_user_with_the_default_limit() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/history")
                .query_param("userId", "user-1")
                .query_param("limit", "50");
            then.status(200).json_body(fixtures::history_page_body(
                "user-1",
                vec![
                    fixtures::history_item_body(
                        "user-1",
                        "uploads/users/user-1/1.jpg",
                        "processed/users/user-1/1.jpg",
                    ),
                    fixtures::history_item_body(
                        "user-1",
                        "uploads/users/user-1/2.jpg",
                        "processed/users/user-1/2.jpg",
                    ),
                ],
            ));
        });

        let page = client_for(&server)
            .list("user-1", None, None)
            .await
            .expect("list should succeed");

        mock.assert();
        assert_eq!(page.count, 2);
        assert_eq!(page.user_id.as_deref(), Some("user-1"));
        assert_eq!(page.items.len(), 2);
        let first = &page.items[0];
        assert_eq!(first.processed_key, "processed/users/user-1/1.jpg");
        assert_eq!(first.metadata.as_ref().map(|m| m.width), Some(800));
        assert_eq!(first.timestamp.as_deref(), Some("2024-05-01T12:00:00"));
    }

    #[tokio::test]
    async fn explicit_limit_overrides_the_default() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/history")
                .query_param("limit", "5");
            then.status(200)
                .json_body(fixtures::history_page_body("user-1", Vec::new()));
        });

        let page = client_for(&server)
            .list("user-1", Some(5), None)
            .await
            .expect("list should succeed");
        mock.assert();
        assert_eq!(page.count, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn processed_location_prefers_the_store_url() {
        let read_base = Url::parse("https://cdn.example.test").expect("base URL");
        let mut record: HistoryRecord = serde_json::from_value(fixtures::history_item_body(
            "user-1",
            "uploads/users/user-1/1.jpg",
            "processed/users/user-1/1.jpg",
        ))
        .expect("fixture should deserialize");

        assert_eq!(
            record.processed_location(&read_base).as_str(),
            "https://cdn.example.test/processed/users/user-1/1.jpg"
        );

        record.processed_url = Some("https://signed.example.test/abc?sig=1".to_string());
        assert_eq!(
            record.processed_location(&read_base).as_str(),
            "https://signed.example.test/abc?sig=1"
        );
    }

    #[test]
    fn original_location_requires_a_key_or_url() {
        let read_base = Url::parse("https://cdn.example.test").expect("base URL");
        let record = HistoryRecord {
            user_id: "user-1".to_string(),
            original_key: None,
            processed_key: "processed/a.jpg".to_string(),
            timestamp: None,
            metadata: None,
            processed_url: None,
            original_url: None,
        };
        assert!(record.original_location(&read_base).is_none());

        let with_key = HistoryRecord {
            original_key: Some("uploads/a.jpg".to_string()),
            ..record
        };
        assert_eq!(
            with_key
                .original_location(&read_base)
                .expect("derived location")
                .as_str(),
            "https://cdn.example.test/uploads/a.jpg"
        );
    }
}
