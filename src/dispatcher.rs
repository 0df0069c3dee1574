//! Delivery of blocks to the local backend.
//!
//! One dispatch is one POST of `{file_path, search_content, replace_content}`.
//! A 2xx status is success; any other status or a transport error is a
//! failure. Dispatches are fire-and-forget: the attempt runs on its own task
//! and reports back through the completion channel, so the scan loop never
//! waits on the network.

use crate::extractor::BlockRecord;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default backend endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3030/api/diff";

/// Request body sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPayload {
    pub file_path: String,
    pub search_content: String,
    pub replace_content: String,
}

impl From<&BlockRecord> for PatchPayload {
    fn from(block: &BlockRecord) -> Self {
        Self {
            file_path: block.file_path.clone(),
            search_content: block.search_content.clone(),
            replace_content: block.replace_content.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend could not be reached or did not answer in time
    #[error("Connection failed: {0}")]
    Connect(String),
}

impl TransportError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Http(e)
        }
    }
}

/// Carries a payload to the backend and returns the response status
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, payload: &PatchPayload) -> Result<u16, TransportError>;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `endpoint`. The timeout, if any, is the
    /// transport's own; the scanner does not impose one.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            endpoint: endpoint.into(),
            http: builder.build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn post(&self, payload: &PatchPayload) -> Result<u16, TransportError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(TransportError::from_send)?;
        Ok(resp.status().as_u16())
    }
}

/// Why a dispatch did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The backend answered with a non-2xx status
    Backend(u16),
    /// The backend could not be reached
    Connect(String),
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Backend(status) => write!(f, "backend returned {}", status),
            DispatchFailure::Connect(reason) => write!(f, "connection failed: {}", reason),
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure(DispatchFailure),
}

impl DispatchOutcome {
    fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            DispatchOutcome::Success
        } else {
            DispatchOutcome::Failure(DispatchFailure::Backend(status))
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Outcome of a fire-and-forget dispatch, delivered back to the scanner
#[derive(Debug, Clone)]
pub struct DispatchCompletion {
    pub fingerprint: Fingerprint,
    pub file_path: String,
    pub outcome: DispatchOutcome,
}

/// Turns blocks into outbound requests
#[derive(Clone)]
pub struct SyncDispatcher {
    transport: Arc<dyn Transport>,
    completions: mpsc::UnboundedSender<DispatchCompletion>,
}

impl SyncDispatcher {
    /// Create a dispatcher and the receiver its completions arrive on
    pub fn new(transport: Arc<dyn Transport>) -> (Self, mpsc::UnboundedReceiver<DispatchCompletion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        (
            Self {
                transport,
                completions,
            },
            rx,
        )
    }

    /// Make one delivery attempt and wait for its outcome
    pub async fn deliver(&self, block: &BlockRecord) -> DispatchOutcome {
        deliver_payload(self.transport.as_ref(), &PatchPayload::from(block)).await
    }

    /// Start a delivery attempt in the background.
    ///
    /// Must be called from within a tokio runtime. The outcome arrives on the
    /// completion receiver; nothing here waits for it.
    pub fn dispatch(&self, block: &BlockRecord, fingerprint: Fingerprint) {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions.clone();
        let payload = PatchPayload::from(block);

        trace!("Dispatching {} ({})", payload.file_path, fingerprint);

        tokio::spawn(async move {
            let outcome = deliver_payload(transport.as_ref(), &payload).await;
            let completion = DispatchCompletion {
                fingerprint,
                file_path: payload.file_path,
                outcome,
            };
            if completions.send(completion).is_err() {
                debug!("Completion receiver dropped, discarding outcome for {}", fingerprint);
            }
        });
    }
}

async fn deliver_payload(transport: &dyn Transport, payload: &PatchPayload) -> DispatchOutcome {
    match transport.post(payload).await {
        Ok(status) => {
            let outcome = DispatchOutcome::from_status(status);
            if !outcome.is_success() {
                warn!("Backend rejected {}: status {}", payload.file_path, status);
            }
            outcome
        }
        Err(e) => {
            warn!("Failed to send {}: {}", payload.file_path, e);
            DispatchOutcome::Failure(DispatchFailure::Connect(e.to_string()))
        }
    }
}
