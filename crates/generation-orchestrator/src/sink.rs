//! Delivery of read-model snapshots to callers
//!
//! The driver publishes a `GenerationProgress` after every state change.
//! The sink abstracts over where those snapshots go (UI bridge, channel,
//! test collector).

use parking_lot::Mutex;
use thiserror::Error;

use crate::progress::GenerationProgress;

/// Error when a snapshot could not be delivered
#[derive(Debug, Clone, Error)]
#[error("Progress sink error: {message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn closed() -> Self {
        Self {
            message: "Sink closed".to_string(),
        }
    }
}

/// Receives read-model snapshots
pub trait ProgressSink: Send + Sync {
    /// Deliver a snapshot
    ///
    /// Failures are logged by the driver and never stop generation.
    fn send(&self, progress: GenerationProgress) -> Result<(), SinkError>;
}

/// Discards every snapshot
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn send(&self, _progress: GenerationProgress) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Collects snapshots in memory
#[derive(Default)]
pub struct VecProgressSink {
    snapshots: Mutex<Vec<GenerationProgress>>,
}

impl VecProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected snapshots, oldest first
    pub fn snapshots(&self) -> Vec<GenerationProgress> {
        self.snapshots.lock().clone()
    }

    pub fn last(&self) -> Option<GenerationProgress> {
        self.snapshots.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.snapshots.lock().clear();
    }
}

impl ProgressSink for VecProgressSink {
    fn send(&self, progress: GenerationProgress) -> Result<(), SinkError> {
        self.snapshots.lock().push(progress);
        Ok(())
    }
}
