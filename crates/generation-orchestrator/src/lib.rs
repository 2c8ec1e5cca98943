//! Generation Orchestrator - resumable 13-section protocol generation
//!
//! Drives a protocol generation job from a cold start to 13/13 sections,
//! exposing live progress, categorized errors and resumability from the
//! last completed section.
//!
//! # Architecture
//!
//! - `GenerationOrchestrator`: synchronous state machine, idempotent under
//!   duplicate and out-of-order progress
//! - `GenerationDriver`: async wrapper that calls the `GenerationService`,
//!   listens on a `ProgressTransport` and reconnects after a fixed backoff
//! - `ProgressHub`: in-process transport with per-protocol bounded channels
//! - `GenerationProgress`: read-model snapshot published to a `ProgressSink`
//!
//! Flowchart generation is not invoked from here; callers compose this
//! crate with `flowchart-engine` once a session succeeds.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use generation_orchestrator::{GenerationOrchestrator, GenerationStatus, ProgressEvent};
//! use protocol_contracts::GenerationMode;
//!
//! let mut orchestrator = GenerationOrchestrator::new();
//! orchestrator.start_generation(GenerationMode::Automatic, Instant::now());
//! orchestrator.apply_event(ProgressEvent::progress(&[1, 2, 3], None).unwrap(), Instant::now());
//!
//! let progress = orchestrator.progress();
//! assert_eq!(progress.status, GenerationStatus::Generating);
//! assert_eq!(progress.completed_sections, vec![1, 2, 3]);
//! assert!(orchestrator.can_continue());
//! ```

pub mod classify;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod events;
pub mod hub;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod session;
pub mod sink;
pub mod transport;

// Re-export key types
pub use classify::{classify_error, ErrorKind};
pub use config::GenerationConfig;
pub use driver::GenerationDriver;
pub use error::{GenerationError, Result};
pub use events::{parse_frame, FrameKind, ProgressEnvelope, ProgressEvent, ProgressPayload, WireError};
pub use hub::{GroupProgress, ProgressHub};
pub use orchestrator::{EventOutcome, GenerationOrchestrator, ResumePoint};
pub use progress::{estimate_time_remaining, FailureInfo, GenerationProgress};
pub use service::{GenerationRequest, GenerationService, ServiceError};
pub use session::{GenerationSession, GenerationStatus, GenerationStep, SessionId};
pub use sink::{NullProgressSink, ProgressSink, SinkError, VecProgressSink};
pub use transport::{ProgressTransport, TransportError};
