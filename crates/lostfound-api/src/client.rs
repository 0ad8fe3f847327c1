//! Typed HTTP client for the lost-and-found API

use std::time::Duration;

use lostfound_core::{IngestionState, PollOutcome, PollPolicy, TopK};
use reqwest::{multipart, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    DeleteRequest, DeleteResponse, SearchResponse, SimilarSearchRequest, StatusResponse,
    TextSearchRequest, UploadResponse,
};

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} ({kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
}

impl ClientError {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Client for a running lost-and-found server
#[derive(Debug, Clone)]
pub struct LostFoundClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl LostFoundClient {
    /// Create a client that sends `token` as a bearer credential.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Upload a found item.
    pub async fn upload(
        &self,
        title: &str,
        description: &str,
        location: &str,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResponse, ClientError> {
        let image = multipart::Part::bytes(image)
            .file_name("image")
            .mime_str(content_type)?;
        let form = multipart::Form::new()
            .text("title", title.to_string())
            .text("description", description.to_string())
            .text("location", location.to_string())
            .part("image", image);

        let response = self
            .authorized(self.http.post(self.url("/upload")))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    /// Search by free text.
    pub async fn search_text(
        &self,
        query: &str,
        min_similarity: Option<f32>,
        top_k: Option<TopK>,
    ) -> Result<SearchResponse, ClientError> {
        let body = TextSearchRequest {
            query: query.to_string(),
            min_similarity,
            top_k,
        };
        let response = self
            .authorized(self.http.post(self.url("/search/text")))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    /// Find items similar to a stored item.
    pub async fn search_similar(
        &self,
        item_id: &str,
        min_similarity: Option<f32>,
        top_k: Option<TopK>,
    ) -> Result<SearchResponse, ClientError> {
        let body = SimilarSearchRequest {
            item_id: item_id.to_string(),
            min_similarity,
            top_k,
        };
        let response = self
            .authorized(self.http.post(self.url("/search/similar")))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    /// Fetch the ingestion status of an uploaded item.
    pub async fn status(&self, item_id: &str) -> Result<StatusResponse, ClientError> {
        let response = self
            .authorized(self.http.get(self.url("/status")))
            .query(&[("imageId", item_id)])
            .send()
            .await?;
        decode(response).await
    }

    /// Delete an item and its image.
    pub async fn delete(
        &self,
        item_id: &str,
        file_name: Option<&str>,
    ) -> Result<DeleteResponse, ClientError> {
        let body = DeleteRequest {
            item_id: item_id.to_string(),
            file_name: file_name.map(str::to_string),
        };
        let response = self
            .authorized(self.http.post(self.url("/delete")))
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    /// Poll `/status` with backoff until the item is indexed or failed.
    pub async fn wait_for_ingestion(&self, item_id: &str, policy: &PollPolicy) -> PollOutcome {
        poll_status(policy, || self.status(item_id)).await
    }
}

async fn poll_status<F, Fut>(policy: &PollPolicy, mut fetch: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<StatusResponse, ClientError>>,
{
    lostfound_core::poll_until_terminal(policy, || {
        let request = fetch();
        async move {
            let status = request.await?;
            if !status.exists {
                return Ok(None);
            }
            Ok::<_, ClientError>(parse_state(&status.status).map(|state| (state, status.message)))
        }
    })
    .await
}

fn parse_state(raw: &str) -> Option<IngestionState> {
    match raw {
        "pending" => Some(IngestionState::Pending),
        "processing" => Some(IngestionState::Processing),
        "indexed" => Some(IngestionState::Indexed),
        "failed" => Some(IngestionState::Failed),
        _ => None,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    debug!("API returned {}: {}", status, text);
    Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => ClientError::Api {
            status: status.as_u16(),
            kind: envelope.error.kind,
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            kind: "unknown".to_string(),
            message: status
                .canonical_reason()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_str())
                .to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(1),
            multiplier: 1.5,
            max_interval: Duration::from_millis(5),
            max_attempts: 5,
        }
    }

    #[tokio::test]
    async fn test_search_text_sends_bearer_and_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/text"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "id": "a1",
                    "title": "Blue backpack",
                    "description": "Navy blue",
                    "location": "Library",
                    "image_url": "/images/a1.png",
                    "submitter_email": "finder@example.com",
                    "score": 0.91
                }]
            })))
            .mount(&server)
            .await;

        let client = LostFoundClient::new(server.uri(), "secret-token").unwrap();
        let response = client
            .search_text("blue backpack", Some(0.5), Some(TopK::Limit(3)))
            .await
            .unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].id, "a1");
    }

    #[tokio::test]
    async fn test_error_envelope_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/delete"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "success": false,
                "error": {"type": "authorization_error", "message": "not yours"}
            })))
            .mount(&server)
            .await;

        let client = LostFoundClient::new(server.uri(), "t").unwrap();
        let err = client.delete("a1", None).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        match err {
            ClientError::Api { kind, message, .. } => {
                assert_eq!(kind, "authorization_error");
                assert_eq!(message, "not yours");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_ingestion_stops_at_terminal_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(query_param("imageId", "a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": true,
                "status": "processing",
                "message": "Embedding",
                "attemptCount": 1
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": true,
                "status": "indexed",
                "message": "Searchable",
                "attemptCount": 3
            })))
            .mount(&server)
            .await;

        let client = LostFoundClient::new(server.uri(), "t").unwrap();
        let outcome = client.wait_for_ingestion("a1", &fast_policy()).await;
        assert_eq!(
            outcome,
            PollOutcome::Finished {
                state: IngestionState::Indexed,
                message: "Searchable".to_string(),
                attempts: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_wait_for_ingestion_reports_unknown_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": false,
                "status": "unknown",
                "message": "No ingestion is tracked for gone",
                "attemptCount": 0
            })))
            .mount(&server)
            .await;

        let client = LostFoundClient::new(server.uri(), "t").unwrap();
        let outcome = client.wait_for_ingestion("gone", &fast_policy()).await;
        assert_eq!(outcome, PollOutcome::Unknown { attempts: 1 });
    }

    #[tokio::test]
    async fn test_wait_for_ingestion_exhausts_on_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LostFoundClient::new(server.uri(), "t").unwrap();
        let outcome = client.wait_for_ingestion("a1", &fast_policy()).await;
        assert_eq!(
            outcome,
            PollOutcome::Exhausted {
                last_state: None,
                attempts: 5,
            }
        );
    }
}
