//! Firestore REST API client.
//!
//! Every request goes through [`FirestoreClient::send`], which attaches a
//! bearer token and retries once with a fresh token when the server reports
//! an expired one. Calls are wrapped in a tracing span and recorded in the
//! `firestore_*` metrics.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{info_span, Instrument};

use crate::auth::Authenticator;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

const GOOGLE_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually "(default)"
    pub database_id: String,
    /// `host:port` of a local emulator; disables Google auth
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .unwrap_or_default();
        if project_id.trim().is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let timeout_secs: u64 = std::env::var("FIRESTORE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID").unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST").ok().filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    fn endpoint(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}", host),
            None => GOOGLE_ENDPOINT.to_string(),
        }
    }
}

/// Write precondition on the target document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Document must already exist.
    Exists,
    /// Document must not have changed since this update time.
    UpdateTime(String),
}

impl Precondition {
    fn query_param(&self) -> String {
        match self {
            Precondition::Exists => "currentDocument.exists=true".to_string(),
            Precondition::UpdateTime(ts) => {
                format!("currentDocument.updateTime={}", urlencoding::encode(ts))
            }
        }
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Authenticator,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let auth = if config.emulator_host.is_some() {
            Authenticator::emulator()
        } else {
            Authenticator::google().await?
        };
        let endpoint = config.endpoint();
        Self::with_endpoint(config, &endpoint, auth)
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    /// Client against an explicit endpoint (emulator, test server).
    pub fn with_endpoint(config: FirestoreConfig, endpoint: &str, auth: Authenticator) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("reel-firestore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            endpoint.trim_end_matches('/'),
            config.project_id,
            config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth,
        })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Get a document, `None` when it does not exist.
    pub async fn get_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute("get_document", collection, Some(doc_id), async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document; fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute("create_document", collection, Some(doc_id), async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!("{}/{}", collection, doc_id))),
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Merge `fields` into an existing document. Only the given fields are
    /// touched; a field set to null is cleared.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        self.update_document_with_precondition(collection, doc_id, fields, Precondition::Exists)
            .await
    }

    /// Merge `fields` only if `precondition` holds. A stale `UpdateTime`
    /// yields [`FirestoreError::PreconditionFailed`].
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        precondition: Precondition,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = fields
            .keys()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.push(precondition.query_param());
        let url = format!("{}?{}", self.document_url(collection, doc_id), params.join("&"));
        let body = Document::new(fields);

        self.execute("update_document", collection, Some(doc_id), async {
            let response = self
                .send(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id))),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let body = response.text().await.unwrap_or_default();
                    crate::metrics::record_conflict(collection);
                    Err(FirestoreError::PreconditionFailed(format!("{}/{}: {}", collection, doc_id, body)))
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query. An empty `parent_path` queries top-level
    /// collections; otherwise it names the document holding the collection,
    /// e.g. `users/USER_ID`.
    pub async fn run_query(&self, parent_path: &str, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{}:runQuery", self.base_url, parent_path)
        };
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute("run_query", parent_path, None, async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let rows: Vec<RunQueryResponse> = response.json().await?;
                    Ok(rows.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::error_from(status, &url, response).await),
            }
        })
        .await
    }

    /// Run `op` under this client's retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    /// Send with a bearer token, refreshing it once if it expired.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.auth.is_emulator() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !(body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")) {
            return Err(FirestoreError::auth_error(body));
        }
        self.auth.invalidate().await;
        let token = self.auth.token().await?;
        Ok(build(&token).send().await?)
    }

    async fn execute<T, F>(
        &self,
        operation: &'static str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation,
            collection = %collection,
            doc_id = doc_id.unwrap_or_default()
        );
        let start = Instant::now();
        let result = fut.instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, start.elapsed().as_secs_f64());
        result
    }

    async fn error_from(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
