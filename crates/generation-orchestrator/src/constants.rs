//! Orchestrator-wide constants
//!
//! Single source of truth for defaults and user-facing messages.

/// Reconnect configuration
pub mod reconnect {
    /// Fixed delay before reconnecting a dropped progress stream
    pub const BACKOFF_MS: u64 = 5_000;
    /// Reconnect attempts before the session is failed
    pub const MAX_ATTEMPTS: u32 = 5;
}

/// Progress channel configuration
pub mod channels {
    /// Bounded capacity of each subscriber channel
    pub const LISTENER_BUFFER: usize = 64;
    /// How long an emitter waits for room in a full subscriber channel
    pub const EMIT_TIMEOUT_MS: u64 = 5_000;
}

/// Error classification
pub mod classification {
    /// Substring reported by the model provider when the organization is unverified
    pub const MODEL_VERIFICATION_MARKER: &str = "verified to use the model";
}

/// User-facing status messages
pub mod messages {
    pub const READY: &str = "Ready to start";
    pub const RESEARCH_STARTED: &str = "Starting medical research...";
    pub const MANUAL_STARTED: &str = "Starting guided generation...";
    pub const PROCESSING_MATERIAL: &str = "Processing uploaded documents...";
    pub const GENERATION_FAILED: &str = "Error during protocol generation";
    pub const GENERATION_COMPLETE: &str = "Protocol generated successfully!";
    pub const CONNECTION_LOST: &str = "Connection to the server was lost";
    pub const UNKNOWN_ERROR: &str = "Unknown error during generation";
    pub const MODEL_UNVERIFIED: &str =
        "The model requires verification of your organization with the provider. Wait 15 minutes or use another model.";
}
