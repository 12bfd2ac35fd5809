//! Backend REST API Client
//!
//! HTTP client for the document backend, built on reqwest.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::dto::{DocumentRecord, RecentDocumentsResponse, TagUpdate};
use super::{BackendError, BackendResult, DocumentBackend};
use crate::document::{DocumentId, UploadFile};

/// Document backend over HTTP/JSON
pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
}

/// Configuration for the HTTP backend client
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL for the API (e.g., "http://localhost:8000/api")
    pub base_url: String,
    /// Bearer token attached to every request
    pub api_token: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Retries for idempotent reads after the first attempt
    pub max_retries: u32,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            api_token: None,
            request_timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl HttpBackend {
    /// Create a new client with the given configuration
    pub fn new(config: HttpBackendConfig) -> BackendResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| BackendError::InvalidConfig(format!("api token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn document_url(&self, id: &DocumentId, suffix: &str) -> String {
        self.url(&format!(
            "/documents/{}{}",
            urlencoding::encode(id.as_str()),
            suffix
        ))
    }

    /// Send a GET request, retrying transient failures
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> BackendResult<T> {
        let mut last_error = BackendError::Unavailable;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Backoff: 1s, 4s, 9s...
                let delay = Duration::from_secs((attempt as u64).pow(2));
                tokio::time::sleep(delay).await;
            }

            let result = match self.client.get(url).send().await {
                Ok(response) => decode_json(response).await,
                Err(e) => Err(map_send_error(e)),
            };

            match result {
                Err(e) if e.is_transient() => {
                    tracing::debug!(url, attempt, error = %e, "Retrying backend read");
                    last_error = e;
                }
                other => return other,
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl DocumentBackend for HttpBackend {
    async fn upload_document(&self, file: UploadFile) -> BackendResult<DocumentRecord> {
        let url = self.url("/documents/upload");
        let size = file.size();

        let part = Part::bytes(file.bytes)
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)?;
        let form = Form::new().part("file", part);

        tracing::debug!(filename = %file.filename, size, "Uploading document");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        decode_json(response).await
    }

    async fn recent_documents(&self) -> BackendResult<Vec<DocumentRecord>> {
        let url = self.url("/documents/recent");
        let response: RecentDocumentsResponse = self.get_json(&url).await?;
        Ok(response.into_records())
    }

    async fn get_document(&self, id: &DocumentId) -> BackendResult<DocumentRecord> {
        let url = self.document_url(id, "");
        self.get_json(&url).await.map_err(|e| with_id(e, id))
    }

    async fn update_tags(
        &self,
        id: &DocumentId,
        update: &TagUpdate,
    ) -> BackendResult<DocumentRecord> {
        let url = self.document_url(id, "/tags");

        let response = self
            .client
            .put(&url)
            .json(update)
            .send()
            .await
            .map_err(map_send_error)?;

        decode_json(response).await.map_err(|e| with_id(e, id))
    }

    async fn add_to_records(&self, id: &DocumentId) -> BackendResult<()> {
        let url = self.document_url(id, "/add-to-records");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        expect_success(response).await.map_err(|e| with_id(e, id))
    }

    async fn delete_document(&self, id: &DocumentId) -> BackendResult<()> {
        let url = self.document_url(id, "");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        expect_success(response).await.map_err(|e| with_id(e, id))
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::Unavailable
    } else {
        BackendError::Request(e)
    }
}

/// Attach the document id to a bare 404
fn with_id(err: BackendError, id: &DocumentId) -> BackendError {
    match err {
        BackendError::NotFound(_) => BackendError::NotFound(id.to_string()),
        other => other,
    }
}

async fn error_from(response: Response) -> BackendError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        BackendError::NotFound(text)
    } else {
        BackendError::ApiError {
            status: status.as_u16(),
            message: text,
        }
    }
}

async fn expect_success(response: Response) -> BackendResult<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from(response).await)
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }

    let bytes = response.bytes().await.map_err(map_send_error)?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStatus;
    use axum::{
        extract::{Multipart, Path},
        http::StatusCode as AxumStatus,
        routing::{get, post, put},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serve a router on an ephemeral port and return its base URL
    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    fn backend_for(base_url: String) -> HttpBackend {
        HttpBackend::new(HttpBackendConfig {
            base_url,
            max_retries: 0,
            ..Default::default()
        })
        .unwrap()
    }

    async fn get_document_handler(Path(id): Path<String>) -> Result<Json<Value>, AxumStatus> {
        if id == "missing" {
            return Err(AxumStatus::NOT_FOUND);
        }
        Ok(Json(json!({
            "id": 17,
            "filename": "q1.pdf",
            "status": "complete",
            "ai_confidence": 0.75,
            "tags": [{"tag": "period", "value": "January 2024", "year": 2024, "month": 1}]
        })))
    }

    async fn upload_handler(mut multipart: Multipart) -> Json<Value> {
        let mut filename = String::new();
        let mut size = 0;
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("file") {
                filename = field.file_name().unwrap_or_default().to_string();
                size = field.bytes().await.unwrap().len();
            }
        }
        Json(json!({"id": "srv-1", "filename": filename, "status": "analyzing", "size": size}))
    }

    async fn tags_handler(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
        let mut tags = vec![json!({"tag": "status", "value": "added_to_records"})];
        if let (Some(year), Some(month)) = (body["year"].as_i64(), body["month"].as_u64()) {
            tags.push(json!({"tag": "period", "value": "", "year": year, "month": month}));
        }
        for value in body["custom_tags"].as_array().cloned().unwrap_or_default() {
            tags.push(json!({"tag": "custom", "value": value}));
        }
        Json(json!({"id": id, "status": "complete", "tags": tags}))
    }

    fn router() -> Router {
        Router::new()
            .route("/api/documents/upload", post(upload_handler))
            .route(
                "/api/documents/recent",
                get(|| async { Json(json!({"documents": [{"id": 3, "status": "analyzing"}]})) }),
            )
            .route(
                "/api/documents/:id",
                get(get_document_handler).delete(|| async { AxumStatus::NO_CONTENT }),
            )
            .route("/api/documents/:id/tags", put(tags_handler))
            .route(
                "/api/documents/:id/add-to-records",
                post(|Path(id): Path<String>| async move {
                    if id == "locked" {
                        (AxumStatus::CONFLICT, "already committed".to_string())
                    } else {
                        (AxumStatus::OK, "ok".to_string())
                    }
                }),
            )
    }

    #[test]
    fn test_default_config() {
        let config = HttpBackendConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/api");
        assert_eq!(config.max_retries, 3);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_document_url_encodes_id() {
        let backend = backend_for("http://example.test/api/".to_string());
        let url = backend.document_url(&DocumentId::new("a b/c"), "/tags");
        assert_eq!(url, "http://example.test/api/documents/a%20b%2Fc/tags");
    }

    #[test]
    fn test_rejects_invalid_token() {
        let result = HttpBackend::new(HttpBackendConfig {
            api_token: Some("bad\ntoken".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(BackendError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_get_document() {
        let backend = backend_for(spawn_backend(router()).await);

        let record = backend.get_document(&DocumentId::new("17")).await.unwrap();
        assert_eq!(record.id, DocumentId::new("17"));
        assert_eq!(record.status, DocumentStatus::Complete);
        assert_eq!(record.ai_confidence, Some(0.75));
        assert_eq!(record.tags().len(), 1);
    }

    #[tokio::test]
    async fn test_get_retries_transient_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/api/documents/:id",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AxumStatus::SERVICE_UNAVAILABLE)
                    } else {
                        Ok(Json(json!({"id": 8, "status": "analyzing"})))
                    }
                }
            }),
        );
        let backend = HttpBackend::new(HttpBackendConfig {
            base_url: spawn_backend(router).await,
            max_retries: 1,
            ..Default::default()
        })
        .unwrap();

        let record = backend.get_document(&DocumentId::new("8")).await.unwrap();
        assert_eq!(record.status, DocumentStatus::Analyzing);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_without_retries_makes_one_attempt() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/api/documents/:id",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::SERVICE_UNAVAILABLE
                }
            }),
        );
        let backend = backend_for(spawn_backend(router).await);

        let err = backend.get_document(&DocumentId::new("8")).await.unwrap_err();
        assert!(matches!(err, BackendError::ApiError { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let backend = backend_for(spawn_backend(router()).await);

        let err = backend
            .get_document(&DocumentId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_upload_sends_multipart() {
        let backend = backend_for(spawn_backend(router()).await);

        let file = UploadFile::new("invoice.pdf", vec![0u8; 128]);
        let record = backend.upload_document(file).await.unwrap();
        assert_eq!(record.id, DocumentId::new("srv-1"));
        assert_eq!(record.filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(record.status, DocumentStatus::Analyzing);
    }

    #[tokio::test]
    async fn test_recent_documents() {
        let backend = backend_for(spawn_backend(router()).await);

        let records = backend.recent_documents().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, DocumentId::new("3"));
    }

    #[tokio::test]
    async fn test_update_tags_round_trip() {
        let backend = backend_for(spawn_backend(router()).await);

        let update = TagUpdate {
            year: Some(2024),
            month: Some(2),
            custom_tags: vec!["payroll".to_string()],
        };
        let record = backend
            .update_tags(&DocumentId::new("5"), &update)
            .await
            .unwrap();

        let tags = record.tags();
        assert_eq!(tags.len(), 3);
        assert!(tags.iter().any(|t| t.is_added_to_records()));
    }

    #[tokio::test]
    async fn test_add_to_records_and_delete() {
        let backend = backend_for(spawn_backend(router()).await);

        backend.add_to_records(&DocumentId::new("5")).await.unwrap();
        let err = backend
            .add_to_records(&DocumentId::new("locked"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ApiError { status: 409, .. }));

        backend.delete_document(&DocumentId::new("5")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let backend = backend_for("http://127.0.0.1:1/api".to_string());
        let err = backend.recent_documents().await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable));
    }
}
