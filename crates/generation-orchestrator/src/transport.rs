//! Progress transport seam
//!
//! A transport delivers raw text frames for one protocol, in emission
//! order, over a bounded channel. The stream ending without a terminal
//! frame means the connection dropped.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failure
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to connect to progress stream: {0}")]
    ConnectionFailed(String),

    #[error("Progress stream closed")]
    Closed,
}

/// Opens progress streams keyed by protocol (and optionally session)
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Subscribe to frames for `protocol_id`
    ///
    /// With a `session_id`, frames tagged with another session are not
    /// delivered.
    async fn connect(
        &self,
        protocol_id: &str,
        session_id: Option<&str>,
    ) -> Result<mpsc::Receiver<String>, TransportError>;
}

#[async_trait]
impl<T: ProgressTransport + ?Sized> ProgressTransport for Arc<T> {
    async fn connect(
        &self,
        protocol_id: &str,
        session_id: Option<&str>,
    ) -> Result<mpsc::Receiver<String>, TransportError> {
        (**self).connect(protocol_id, session_id).await
    }
}
