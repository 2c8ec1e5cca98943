//! Async driver around the generation state machine
//!
//! The driver owns the orchestrator behind a mutex, calls the generation
//! service and runs one progress listener task per session. The listener
//! selects over a cancellation signal and the progress stream, applies
//! validated frames in arrival order and reconnects after a fixed backoff
//! when the stream drops. Failures end up in the read-model; only caller
//! contract violations are returned as errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::GenerationConfig;
use crate::error::{GenerationError, Result};
use crate::events::parse_frame;
use crate::orchestrator::{EventOutcome, GenerationOrchestrator, ResumePoint};
use crate::progress::GenerationProgress;
use crate::service::{GenerationRequest, GenerationService, ServiceError};
use crate::session::SessionId;
use crate::sink::ProgressSink;
use crate::transport::ProgressTransport;

fn publish(sink: &dyn ProgressSink, progress: GenerationProgress) {
    if let Err(e) = sink.send(progress) {
        log::warn!("Failed to publish generation progress: {}", e);
    }
}

struct Listener {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives generation sessions for one caller
///
/// Callers must not start two generations for the same protocol
/// concurrently.
pub struct GenerationDriver<S, T>
where
    S: GenerationService,
    T: ProgressTransport + 'static,
{
    service: S,
    transport: Arc<T>,
    sink: Arc<dyn ProgressSink>,
    config: GenerationConfig,
    state: Arc<Mutex<GenerationOrchestrator>>,
    request: Mutex<Option<GenerationRequest>>,
    listener: Mutex<Option<Listener>>,
}

impl<S, T> GenerationDriver<S, T>
where
    S: GenerationService,
    T: ProgressTransport + 'static,
{
    pub fn new(service: S, transport: Arc<T>, sink: Arc<dyn ProgressSink>, config: GenerationConfig) -> Self {
        Self {
            service,
            transport,
            sink,
            config,
            state: Arc::new(Mutex::new(GenerationOrchestrator::new())),
            request: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Current read-model snapshot
    pub fn progress(&self) -> GenerationProgress {
        self.state.lock().progress()
    }

    pub fn can_continue(&self) -> bool {
        self.state.lock().can_continue()
    }

    /// Start a fresh session
    pub async fn start(&self, request: GenerationRequest) -> SessionId {
        self.stop_listener().await;
        let session_id = self.state.lock().start_generation(request.mode, Instant::now());
        self.launch(request, session_id.clone()).await;
        session_id
    }

    /// Discard the current session and start over from section 1
    pub async fn retry(&self, request: GenerationRequest) -> Result<SessionId> {
        let session_id = self.state.lock().retry_generation(request.mode, Instant::now())?;
        self.stop_listener().await;
        self.launch(request, session_id.clone()).await;
        Ok(session_id)
    }

    /// Resume the current session after its last completed section
    pub async fn continue_generation(&self) -> Result<ResumePoint> {
        let request = self
            .request
            .lock()
            .clone()
            .ok_or(GenerationError::NoSessionToContinue)?;
        let resume = self.state.lock().continue_generation(Instant::now())?;
        self.stop_listener().await;
        self.publish();

        self.spawn_listener(&request.protocol_id, &resume.session_id).await;
        if let Err(e) = self.service.resume(&request, &resume).await {
            self.service_failed(&resume.session_id, e).await;
        }
        Ok(resume)
    }

    /// Stop listening; completed sections are kept for a later continue
    pub async fn cancel(&self) {
        self.stop_listener().await;
        self.state.lock().detach();
        self.publish();
    }

    async fn launch(&self, request: GenerationRequest, session_id: SessionId) {
        self.publish();
        *self.request.lock() = Some(request.clone());

        self.spawn_listener(&request.protocol_id, &session_id).await;
        if let Err(e) = self.service.start(&request, &session_id).await {
            self.service_failed(&session_id, e).await;
        }
    }

    async fn service_failed(&self, session_id: &SessionId, error: ServiceError) {
        {
            let mut state = self.state.lock();
            if state.session_id() != Some(session_id) {
                return;
            }
            state.fail(&error.message, &error.completed(), Instant::now());
        }
        self.stop_listener().await;
        self.publish();
    }

    /// Connect first, then hand the stream to a listener task
    ///
    /// Connecting before the service is called means no early frame is
    /// missed.
    async fn spawn_listener(&self, protocol_id: &str, session_id: &SessionId) {
        let context = ListenerContext {
            protocol_id: protocol_id.to_string(),
            session_id: session_id.clone(),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            backoff: self.config.reconnect_backoff(),
            max_attempts: self.config.max_reconnect_attempts,
        };

        let initial = context.connect().await;
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(context.run(initial, cancel_rx));

        let previous = self.listener.lock().replace(Listener { cancel, task });
        if let Some(previous) = previous {
            Self::shutdown(previous).await;
        }
    }

    async fn stop_listener(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            Self::shutdown(listener).await;
        }
    }

    async fn shutdown(listener: Listener) {
        let _ = listener.cancel.send(true);
        if let Err(e) = listener.task.await {
            log::warn!("Progress listener ended abnormally: {}", e);
        }
    }

    fn publish(&self) {
        let snapshot = self.state.lock().progress();
        publish(self.sink.as_ref(), snapshot);
    }
}

enum StreamEnd {
    /// Cancelled by the driver
    Cancelled,
    /// Session reached a terminal state or was replaced
    Finished,
    /// Stream ended without a terminal frame
    Dropped,
}

/// Everything a listener task needs, owned so the task is `'static`
struct ListenerContext<T: ProgressTransport + 'static> {
    protocol_id: String,
    session_id: SessionId,
    transport: Arc<T>,
    state: Arc<Mutex<GenerationOrchestrator>>,
    sink: Arc<dyn ProgressSink>,
    backoff: Duration,
    max_attempts: u32,
}

impl<T: ProgressTransport + 'static> ListenerContext<T> {
    async fn run(self, initial: Option<mpsc::Receiver<String>>, mut cancel: watch::Receiver<bool>) {
        let mut stream = initial;
        let mut attempts: u32 = 0;

        loop {
            if let Some(rx) = stream.take() {
                match self.drain(rx, &mut cancel, &mut attempts).await {
                    StreamEnd::Cancelled | StreamEnd::Finished => return,
                    StreamEnd::Dropped => {
                        self.with_session(|state| state.transport_lost("Progress stream closed"));
                    }
                }
            }

            if !self.still_listening() {
                return;
            }

            attempts += 1;
            if attempts > self.max_attempts {
                log::error!(
                    "Giving up on progress stream for protocol {} after {} reconnect attempts",
                    self.protocol_id,
                    self.max_attempts
                );
                let reason = format!("Progress stream unavailable after {} reconnect attempts", self.max_attempts);
                self.with_session(|state| state.transport_exhausted(&reason, Instant::now()));
                return;
            }

            log::info!(
                "Reconnecting to progress stream for protocol {} in {:?} (attempt {}/{})",
                self.protocol_id,
                self.backoff,
                attempts,
                self.max_attempts
            );
            tokio::select! {
                _ = cancel.changed() => return,
                _ = tokio::time::sleep(self.backoff) => {}
            }

            stream = self.connect().await;
        }
    }

    async fn connect(&self) -> Option<mpsc::Receiver<String>> {
        match self
            .transport
            .connect(&self.protocol_id, Some(self.session_id.as_str()))
            .await
        {
            Ok(rx) => {
                self.with_session(|state| state.transport_connected());
                Some(rx)
            }
            Err(e) => {
                log::warn!("Progress stream connection for {} failed: {}", self.protocol_id, e);
                self.with_session(|state| state.transport_lost(&e.to_string()));
                None
            }
        }
    }

    async fn drain(
        &self,
        mut rx: mpsc::Receiver<String>,
        cancel: &mut watch::Receiver<bool>,
        attempts: &mut u32,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                _ = cancel.changed() => return StreamEnd::Cancelled,
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        return StreamEnd::Dropped;
                    };
                    match parse_frame(&frame) {
                        Ok(None) => log::debug!("Progress stream for {} acknowledged", self.protocol_id),
                        Ok(Some(event)) => {
                            let outcome = self
                                .with_session(|state| state.apply_event(event, Instant::now()))
                                .unwrap_or(EventOutcome::Ignored);
                            match outcome {
                                EventOutcome::Completed | EventOutcome::Failed => return StreamEnd::Finished,
                                EventOutcome::Advanced | EventOutcome::PhaseChanged => *attempts = 0,
                                EventOutcome::Ignored => {}
                            }
                            if !self.still_listening() {
                                return StreamEnd::Finished;
                            }
                        }
                        Err(e) => log::warn!("Skipping progress frame for {}: {}", self.protocol_id, e),
                    }
                }
            }
        }
    }

    /// Run `f` only while this listener's session is current, then publish
    fn with_session<R>(&self, f: impl FnOnce(&mut GenerationOrchestrator) -> R) -> Option<R> {
        let (result, snapshot) = {
            let mut state = self.state.lock();
            if state.session_id() != Some(&self.session_id) {
                return None;
            }
            let result = f(&mut state);
            (result, state.progress())
        };
        publish(self.sink.as_ref(), snapshot);
        Some(result)
    }

    fn still_listening(&self) -> bool {
        let state = self.state.lock();
        state.session_id() == Some(&self.session_id) && state.is_listening()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::hub::{GroupProgress, ProgressHub};
    use crate::session::GenerationStatus;
    use crate::sink::VecProgressSink;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use protocol_contracts::{SECTION_GROUPS, TOTAL_SECTIONS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PROTOCOL: &str = "proto-1";

    enum Script {
        /// Emit every group, then a complete frame
        Complete,
        /// Emit progress and keep the stream open
        Emit(Vec<u8>),
        /// Emit progress, then fail reporting those sections
        FailAfter(Vec<u8>),
    }

    struct ScriptedService {
        hub: Arc<ProgressHub>,
        script: Script,
        resumes: AtomicUsize,
    }

    impl ScriptedService {
        fn new(hub: Arc<ProgressHub>, script: Script) -> Arc<Self> {
            Arc::new(Self {
                hub,
                script,
                resumes: AtomicUsize::new(0),
            })
        }

        async fn emit_groups_from(&self, session_id: &str, first: u8) {
            for (index, group) in SECTION_GROUPS.iter().enumerate() {
                let last = group.sections[group.sections.len() - 1];
                if last < first {
                    continue;
                }
                let done: Vec<u8> = (1..=last).collect();
                self.hub
                    .emit_progress(PROTOCOL, session_id, GroupProgress::new(done).in_group(index))
                    .await;
            }
            let all: Vec<u8> = (1..=TOTAL_SECTIONS as u8).collect();
            self.hub.emit_complete(PROTOCOL, session_id, &all).await;
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn start(&self, _request: &GenerationRequest, session_id: &SessionId) -> std::result::Result<(), ServiceError> {
            match &self.script {
                Script::Complete => {
                    self.emit_groups_from(session_id.as_str(), 1).await;
                    Ok(())
                }
                Script::Emit(sections) => {
                    self.hub
                        .emit_progress(PROTOCOL, session_id.as_str(), GroupProgress::new(sections.clone()))
                        .await;
                    Ok(())
                }
                Script::FailAfter(sections) => {
                    self.hub
                        .emit_progress(PROTOCOL, session_id.as_str(), GroupProgress::new(sections.clone()))
                        .await;
                    Err(ServiceError::new("upstream timeout").with_completed(sections.clone()))
                }
            }
        }

        async fn resume(&self, _request: &GenerationRequest, resume: &ResumePoint) -> std::result::Result<(), ServiceError> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            self.emit_groups_from(resume.session_id.as_str(), resume.after_section.get() + 1)
                .await;
            Ok(())
        }
    }

    struct UnreachableTransport;

    #[async_trait]
    impl ProgressTransport for UnreachableTransport {
        async fn connect(
            &self,
            _protocol_id: &str,
            _session_id: Option<&str>,
        ) -> std::result::Result<mpsc::Receiver<String>, TransportError> {
            Err(TransportError::ConnectionFailed("connection refused".to_string()))
        }
    }

    fn fast_config() -> GenerationConfig {
        GenerationConfig {
            reconnect_backoff_ms: 10,
            max_reconnect_attempts: 2,
            ..Default::default()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(PROTOCOL, "Community-acquired pneumonia")
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    async fn wait_for(
        read: impl Fn() -> GenerationProgress,
        what: &str,
        done: impl Fn(&GenerationProgress) -> bool,
    ) -> GenerationProgress {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let progress = read();
            if done(&progress) {
                return progress;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for {}: {:?}", what, progress);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn assert_monotonic(sink: &VecProgressSink) {
        let counts: Vec<usize> = sink
            .snapshots()
            .iter()
            .filter(|p| p.status != GenerationStatus::Idle)
            .map(|p| p.completed_count())
            .collect();
        assert!(
            counts.windows(2).all(|w| w[0] <= w[1]),
            "completed sections went backwards: {:?}",
            counts
        );
    }

    #[tokio::test]
    async fn test_full_generation_reaches_success() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let sink = Arc::new(VecProgressSink::new());
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Complete),
            hub.clone(),
            sink.clone(),
            fast_config(),
        );

        let session_id = driver.start(request()).await;
        let progress = wait_for(|| driver.progress(), "success", |p| p.status == GenerationStatus::Success).await;

        assert_eq!(progress.session_id, Some(session_id));
        assert_eq!(progress.completed_count(), 13);
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.current_group.as_deref(), Some("Specifics and Quality"));
        assert!(progress.error.is_none());
        assert_monotonic(&sink);
    }

    #[tokio::test]
    async fn test_small_listener_buffer_still_reaches_success() {
        init_logs();
        let config = GenerationConfig {
            listener_buffer: 4,
            ..fast_config()
        };
        let hub = Arc::new(ProgressHub::with_config(&config));
        let sink = Arc::new(VecProgressSink::new());
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Complete),
            hub.clone(),
            sink.clone(),
            config,
        );

        driver.start(request()).await;
        let progress = wait_for(|| driver.progress(), "success", |p| p.status == GenerationStatus::Success).await;
        assert_eq!(progress.completed_count(), 13);
        assert!(progress.error.is_none());
        assert_monotonic(&sink);
    }

    #[tokio::test]
    async fn test_service_failure_then_continue() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let service = ScriptedService::new(hub.clone(), Script::FailAfter(vec![1, 2, 3]));
        let driver = GenerationDriver::new(
            service.clone(),
            hub.clone(),
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );

        let session_id = driver.start(request()).await;
        let failed = driver.progress();
        assert_eq!(failed.status, GenerationStatus::Error);
        assert_eq!(failed.completed_sections, vec![1, 2, 3]);
        let failure = failed.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::Generic);
        assert_eq!(failure.message, "upstream timeout");
        assert!(failure.can_retry);
        assert!(failure.can_continue);
        assert!(driver.can_continue());

        let resume = driver.continue_generation().await.unwrap();
        assert_eq!(resume.session_id, session_id);
        assert_eq!(resume.after_section.get(), 3);
        assert_eq!(service.resumes.load(Ordering::SeqCst), 1);

        let done = wait_for(|| driver.progress(), "success", |p| p.status == GenerationStatus::Success).await;
        assert_eq!(done.session_id, Some(session_id));
        assert_eq!(done.completed_count(), 13);
    }

    #[tokio::test]
    async fn test_stream_drop_reconnects_without_losing_sections() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let sink = Arc::new(VecProgressSink::new());
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Emit(vec![1, 2])),
            hub.clone(),
            sink.clone(),
            fast_config(),
        );

        let session_id = driver.start(request()).await;
        wait_for(|| driver.progress(), "two sections", |p| p.completed_count() == 2).await;

        hub.close(PROTOCOL);
        // The hub has no subscribers until the listener reconnects
        wait_for(|| driver.progress(), "reconnect", |p| {
            p.is_connected
                && hub.subscriber_count(PROTOCOL) == 1
                && sink
                    .snapshots()
                    .iter()
                    .any(|s| s.error.as_ref().map(|e| e.kind) == Some(ErrorKind::Transport))
        })
        .await;

        let lost = sink
            .snapshots()
            .into_iter()
            .find(|p| p.error.is_some())
            .unwrap();
        assert_eq!(lost.status, GenerationStatus::Generating);
        assert_eq!(lost.completed_count(), 2);
        assert!(!lost.is_connected);

        hub.emit_progress(PROTOCOL, session_id.as_str(), GroupProgress::new(vec![1, 2, 3, 4, 5]))
            .await;
        let resumed = wait_for(|| driver.progress(), "five sections", |p| p.completed_count() == 5).await;
        assert!(resumed.error.is_none());
        assert!(resumed.is_connected);
        assert_monotonic(&sink);
    }

    #[tokio::test]
    async fn test_unreachable_transport_fails_session() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let driver = GenerationDriver::new(
            ScriptedService::new(hub, Script::Emit(vec![])),
            Arc::new(UnreachableTransport),
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );

        driver.start(request()).await;
        let progress = wait_for(|| driver.progress(), "failure", |p| p.status == GenerationStatus::Error).await;
        let failure = progress.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::Transport);
        assert!(failure.can_retry);
        assert!(!failure.can_continue);
        assert!(!progress.is_connected);
    }

    #[tokio::test]
    async fn test_cancel_keeps_sections_for_continue() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Emit(vec![1, 2])),
            hub.clone(),
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );

        let session_id = driver.start(request()).await;
        wait_for(|| driver.progress(), "two sections", |p| p.completed_count() == 2).await;

        driver.cancel().await;
        let cancelled = driver.progress();
        assert!(!cancelled.is_connected);
        assert_eq!(cancelled.completed_count(), 2);

        // Nobody is listening any more
        assert_eq!(
            hub.emit_progress(PROTOCOL, session_id.as_str(), GroupProgress::new(vec![1, 2, 3]))
                .await,
            0
        );
        assert_eq!(driver.progress().completed_count(), 2);

        let resume = driver.continue_generation().await.unwrap();
        assert_eq!(resume.session_id, session_id);
        assert_eq!(resume.after_section.get(), 2);
        wait_for(|| driver.progress(), "success", |p| p.status == GenerationStatus::Success).await;
    }

    #[tokio::test]
    async fn test_retry_rejected_while_running() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Emit(vec![1])),
            hub.clone(),
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );

        let first = driver.start(request()).await;
        assert!(matches!(
            driver.retry(request()).await,
            Err(GenerationError::InvalidTransition { .. })
        ));

        driver.cancel().await;
        let second = driver.retry(request()).await.unwrap();
        assert_ne!(first, second);
        let progress = wait_for(|| driver.progress(), "new session progress", |p| p.completed_count() == 1).await;
        assert_eq!(progress.session_id, Some(second));
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        init_logs();
        let hub = Arc::new(ProgressHub::new(64));
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Emit(vec![])),
            hub.clone(),
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );

        let session_id = driver.start(request()).await;
        hub.emit_raw(PROTOCOL, "garbage").await;
        hub.emit_raw(PROTOCOL, r#"{"type":"progress","data":{"sectionsCompleted":[99]}}"#)
            .await;
        hub.emit_progress(PROTOCOL, session_id.as_str(), GroupProgress::new(vec![1]).in_group(0))
            .await;

        let progress = wait_for(|| driver.progress(), "one section", |p| p.completed_count() == 1).await;
        assert_eq!(progress.status, GenerationStatus::Generating);
        assert!(progress.error.is_none());
    }

    #[tokio::test]
    async fn test_continue_without_start() {
        let hub = Arc::new(ProgressHub::new(64));
        let driver = GenerationDriver::new(
            ScriptedService::new(hub.clone(), Script::Complete),
            hub,
            Arc::new(VecProgressSink::new()),
            fast_config(),
        );
        assert!(matches!(
            driver.continue_generation().await,
            Err(GenerationError::NoSessionToContinue)
        ));
    }
}
