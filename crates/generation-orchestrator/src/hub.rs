//! In-process progress hub
//!
//! Fans progress frames out to per-protocol subscribers over bounded
//! channels. An emitter waits up to the configured timeout for room in a
//! full channel. A progress frame that still does not fit is dropped, since
//! later frames carry the cumulative section list. A terminal frame that
//! does not fit ends that subscriber's stream instead, so the listener sees
//! a dropped connection rather than waiting forever.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use protocol_contracts::{SECTION_GROUPS, TOTAL_SECTIONS};
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::config::GenerationConfig;
use crate::constants::messages;
use crate::events::{FrameKind, ProgressEnvelope, ProgressPayload};
use crate::progress::percentage;
use crate::transport::{ProgressTransport, TransportError};

/// Progress of one section group, as reported by a generation service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupProgress {
    pub current_group: Option<String>,
    pub group_index: Option<usize>,
    pub total_groups: Option<usize>,
    pub sections_completed: Vec<u8>,
    pub message: Option<String>,
}

impl GroupProgress {
    pub fn new(sections_completed: Vec<u8>) -> Self {
        Self {
            sections_completed,
            ..Default::default()
        }
    }

    /// Tag with the section group at `index` (0-based)
    pub fn in_group(mut self, index: usize) -> Self {
        if let Some(group) = SECTION_GROUPS.get(index) {
            self.current_group = Some(group.name.to_string());
            self.group_index = Some(index);
            self.total_groups = Some(SECTION_GROUPS.len());
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

struct Subscriber {
    id: u64,
    session_id: Option<String>,
    tx: mpsc::Sender<String>,
}

impl Subscriber {
    fn wants(&self, session_id: Option<&str>) -> bool {
        match (&self.session_id, session_id) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_protocol: HashMap<String, Vec<Subscriber>>,
}

impl Subscribers {
    /// Remove closed and listed subscribers, dropping protocols left empty
    fn prune(&mut self, protocol_id: &str, evicted: &[u64]) -> usize {
        let Some(subs) = self.by_protocol.get_mut(protocol_id) else {
            return 0;
        };
        subs.retain(|s| !s.tx.is_closed() && !evicted.contains(&s.id));
        let remaining = subs.len();
        if remaining == 0 {
            self.by_protocol.remove(protocol_id);
        }
        remaining
    }
}

/// Per-protocol fan-out of progress frames
pub struct ProgressHub {
    subscribers: Mutex<Subscribers>,
    buffer: usize,
    emit_timeout: Duration,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::with_config(&GenerationConfig::default())
    }
}

impl ProgressHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::default()),
            buffer: buffer.max(1),
            emit_timeout: GenerationConfig::default().emit_timeout(),
        }
    }

    pub fn with_config(config: &GenerationConfig) -> Self {
        Self::new(config.listener_buffer).with_emit_timeout(config.emit_timeout())
    }

    pub fn with_emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }

    /// Subscribe to frames for a protocol
    ///
    /// The first frame on the channel is a `connected` acknowledgement.
    pub fn subscribe(&self, protocol_id: &str, session_id: Option<&str>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.buffer);

        let mut ack = ProgressEnvelope::connected(protocol_id);
        ack.session_id = session_id.map(str::to_string);
        match serde_json::to_string(&ack) {
            Ok(frame) => {
                if let Err(e) = tx.try_send(frame) {
                    log::warn!("Failed to acknowledge subscriber for {}: {}", protocol_id, e);
                }
            }
            Err(e) => log::error!("Failed to serialize connected frame: {}", e),
        }

        let mut subscribers = self.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        let entry = subscribers.by_protocol.entry(protocol_id.to_string()).or_default();
        entry.push(Subscriber {
            id,
            session_id: session_id.map(str::to_string),
            tx,
        });
        log::debug!(
            "Subscribed to progress for protocol {} ({} subscribers)",
            protocol_id,
            entry.len()
        );
        rx
    }

    /// Emit a progress frame; returns how many subscribers received it
    pub async fn emit_progress(&self, protocol_id: &str, session_id: &str, progress: GroupProgress) -> usize {
        let payload = ProgressPayload {
            percentage: Some(percentage(progress.sections_completed.len(), TOTAL_SECTIONS)),
            current_group: progress.current_group,
            group_index: progress.group_index,
            total_groups: progress.total_groups,
            sections_completed: Some(progress.sections_completed),
            message: progress.message,
            ..Default::default()
        };
        log::debug!(
            "Emitting progress for protocol {}: group {:?}, {}%",
            protocol_id,
            payload.current_group,
            payload.percentage.unwrap_or_default()
        );
        self.emit(ProgressEnvelope::new(FrameKind::Progress, protocol_id, Some(session_id), payload))
            .await
    }

    /// Emit an error frame, optionally with sections completed so far
    pub async fn emit_error(
        &self,
        protocol_id: &str,
        session_id: &str,
        error: &str,
        sections_completed: &[u8],
    ) -> usize {
        let payload = ProgressPayload {
            message: Some(format!("{}: {}", messages::GENERATION_FAILED, error)),
            error: Some(error.to_string()),
            sections_completed: (!sections_completed.is_empty()).then(|| sections_completed.to_vec()),
            ..Default::default()
        };
        self.emit(ProgressEnvelope::new(FrameKind::Error, protocol_id, Some(session_id), payload))
            .await
    }

    /// Emit a completion frame
    pub async fn emit_complete(&self, protocol_id: &str, session_id: &str, sections_completed: &[u8]) -> usize {
        let payload = ProgressPayload {
            sections_completed: Some(sections_completed.to_vec()),
            message: Some(messages::GENERATION_COMPLETE.to_string()),
            percentage: Some(100),
            ..Default::default()
        };
        self.emit(ProgressEnvelope::new(FrameKind::Complete, protocol_id, Some(session_id), payload))
            .await
    }

    /// Push an already-encoded frame to every subscriber of a protocol
    pub async fn emit_raw(&self, protocol_id: &str, frame: &str) -> usize {
        self.broadcast(protocol_id, None, frame, false).await
    }

    /// Drop every subscriber of a protocol, ending their streams
    pub fn close(&self, protocol_id: &str) -> usize {
        let removed = self
            .subscribers
            .lock()
            .by_protocol
            .remove(protocol_id)
            .map(|subs| subs.len())
            .unwrap_or(0);
        if removed > 0 {
            log::info!("Closed {} progress subscriber(s) for protocol {}", removed, protocol_id);
        }
        removed
    }

    /// Live subscribers for a protocol
    pub fn subscriber_count(&self, protocol_id: &str) -> usize {
        self.subscribers.lock().prune(protocol_id, &[])
    }

    /// Protocols with at least one registered subscriber
    pub fn protocol_count(&self) -> usize {
        self.subscribers.lock().by_protocol.len()
    }

    async fn emit(&self, envelope: ProgressEnvelope) -> usize {
        let Some(protocol_id) = envelope.protocol_id.clone() else {
            return 0;
        };
        let terminal = matches!(envelope.kind, FrameKind::Complete | FrameKind::Error);
        match serde_json::to_string(&envelope) {
            Ok(frame) => {
                self.broadcast(&protocol_id, envelope.session_id.as_deref(), &frame, terminal)
                    .await
            }
            Err(e) => {
                log::error!("Failed to serialize progress frame for {}: {}", protocol_id, e);
                0
            }
        }
    }

    async fn broadcast(&self, protocol_id: &str, session_id: Option<&str>, frame: &str, terminal: bool) -> usize {
        // Senders are cloned out so the lock is not held across awaits
        let targets: Vec<(u64, mpsc::Sender<String>)> = {
            let subscribers = self.subscribers.lock();
            match subscribers.by_protocol.get(protocol_id) {
                Some(subs) => subs
                    .iter()
                    .filter(|sub| sub.wants(session_id))
                    .map(|sub| (sub.id, sub.tx.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, tx) in targets {
            match tx.send_timeout(frame.to_string(), self.emit_timeout).await {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Timeout(_)) if terminal => {
                    log::warn!(
                        "Progress subscriber for {} stayed full, ending its stream",
                        protocol_id
                    );
                    evicted.push(id);
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    log::warn!("Progress subscriber for {} is full, dropping frame", protocol_id);
                }
                Err(SendTimeoutError::Closed(_)) => evicted.push(id),
            }
        }

        self.subscribers.lock().prune(protocol_id, &evicted);
        delivered
    }
}

#[async_trait]
impl ProgressTransport for ProgressHub {
    async fn connect(
        &self,
        protocol_id: &str,
        session_id: Option<&str>,
    ) -> Result<mpsc::Receiver<String>, TransportError> {
        Ok(self.subscribe(protocol_id, session_id))
    }
}
