//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so hosts can plug
//! in whatever stack they already carry (reqwest, hyper, a platform
//! webview bridge). Bodies are JSON on both endpoints.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use driftsync_protocol::{
    PushChangesRequest, PushChangesResponse, ResolveConflictRequest, ResolveConflictResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Endpoint for pushing pending changes.
pub const CHANGES_ENDPOINT: &str = "/sync/changes";
/// Endpoint for posting a conflict resolution.
pub const RESOLVE_CONFLICT_ENDPOINT: &str = "/sync/resolve-conflict";

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP stack. A transport
/// failure is reported as a plain message; the engine decides whether
/// and when to retry.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// HTTP-based sync transport with JSON request/response bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, body)
            .await
            .map_err(SyncError::transport_retryable)?;

        serde_json::from_slice(&response)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push_changes(&self, request: &PushChangesRequest) -> SyncResult<PushChangesResponse> {
        self.post_json(CHANGES_ENDPOINT, request).await
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.post_json(RESOLVE_CONFLICT_ENDPOINT, request).await
    }
}
