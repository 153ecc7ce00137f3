//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use driftsync_protocol::{
    PushChangesRequest, PushChangesResponse, ResolveConflictRequest, ResolveConflictResponse,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A sync transport handles communication with the remote authority.
///
/// This trait abstracts the network layer, allowing different
/// implementations (HTTP, in-process loopback, mock for testing).
/// Retries and timeouts are the engine's concern, not the transport's.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Pushes pending changes to the remote authority.
    async fn push_changes(&self, request: &PushChangesRequest) -> SyncResult<PushChangesResponse>;

    /// Posts a conflict resolution choice.
    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn push_changes(&self, request: &PushChangesRequest) -> SyncResult<PushChangesResponse> {
        (**self).push_changes(request).await
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        (**self).resolve_conflict(request).await
    }
}

/// A mock transport for testing.
///
/// Responses are scripted per endpoint; every request is recorded so
/// tests can assert on call counts (the single-flight invariant) and
/// payloads. An optional latency makes overlap observable.
#[derive(Default)]
pub struct MockTransport {
    push_response: Mutex<Option<PushChangesResponse>>,
    resolve_response: Mutex<Option<ResolveConflictResponse>>,
    failure: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    push_requests: Mutex<Vec<PushChangesRequest>>,
    resolve_requests: Mutex<Vec<ResolveConflictRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scripted push response.
    pub fn set_push_response(&self, response: PushChangesResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets the scripted resolve response.
    pub fn set_resolve_response(&self, response: ResolveConflictResponse) {
        *self.resolve_response.lock() = Some(response);
    }

    /// Makes every request fail with the given message until cleared.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    /// Adds artificial latency to every request.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns the number of push requests received.
    pub fn push_request_count(&self) -> usize {
        self.push_requests.lock().len()
    }

    /// Returns every recorded push request.
    pub fn push_requests(&self) -> Vec<PushChangesRequest> {
        self.push_requests.lock().clone()
    }

    /// Returns every recorded resolve request.
    pub fn resolve_requests(&self) -> Vec<ResolveConflictRequest> {
        self.resolve_requests.lock().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push_changes(&self, request: &PushChangesRequest) -> SyncResult<PushChangesResponse> {
        self.push_requests.lock().push(request.clone());
        self.simulate_latency().await;

        if let Some(message) = self.failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        self.push_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock push response set".into()))
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.resolve_requests.lock().push(request.clone());
        self.simulate_latency().await;

        if let Some(message) = self.failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }
        self.resolve_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock resolve response set".into()))
    }
}
