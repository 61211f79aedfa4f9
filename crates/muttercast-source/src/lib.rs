//! muttercast-source — the capture lifecycle controller.
//!
//! Binds the three asynchronous actors together: the compositor's session
//! protocol (`muttercast-session`), the local frame pipeline
//! (`muttercast-pipeline`), and the host's show/hide/update lifecycle.
//!
//! ```text
//! host thread                        session worker thread
//! ───────────                        ─────────────────────────────────────
//! show() ──────spawn───────────▶    current-thread runtime:
//!        ◀─────ready/failed────      create_session → record → event loop
//!                                      ├─ StreamAdded → attach → start
//! hide() ──────stop────────────▶      ├─ frames → emit_frame(Some(..))
//!        ◀─────join────────────      └─ Closed/EOS/error → teardown
//!                                    teardown: pipeline → session → blank
//! ```
//!
//! All session-local mutation happens on the worker's single execution
//! context; the host-facing handle only hands off into it and blocks until
//! the requested transition completes, so the host never observes a
//! half-built session.

mod worker;

use std::sync::Arc;

use muttercast_core::{NormalizedFrame, SessionConfig};
use muttercast_pipeline::{GstTransport, TransportBackend};
use muttercast_session::{MutterConnector, SessionConnector};
use tracing::debug;

use worker::SessionWorker;

// ── Host boundary ─────────────────────────────────────────────────────────────

/// Host side of the frame hand-off. `None` blanks the source so stale video
/// is never shown.
pub trait FrameOutput: Send + Sync + 'static {
    fn emit_frame(&self, frame: Option<NormalizedFrame>);
}

// ── CaptureSource ─────────────────────────────────────────────────────────────

/// A capture source bound to one host video source.
///
/// `new` allocates bookkeeping only; `show`/`hide`/`update` drive the
/// session. Dropping the source performs an orderly teardown, joining the
/// worker before the handle is released.
pub struct CaptureSource<C = MutterConnector, T = GstTransport> {
    output: Arc<dyn FrameOutput>,
    config: SessionConfig,
    connector: C,
    transport: T,
    worker: Option<SessionWorker>,
}

impl CaptureSource {
    /// Create a source feeding `output`. No side effects beyond bookkeeping.
    pub fn new(output: Arc<dyn FrameOutput>, config: SessionConfig) -> Self {
        Self::with_backends(output, config, MutterConnector::new(), GstTransport)
    }
}

impl<C, T> CaptureSource<C, T>
where
    C: SessionConnector + Clone + Send + 'static,
    T: TransportBackend + Clone,
{
    /// Create a source with explicit negotiation/transport backends.
    pub fn with_backends(
        output: Arc<dyn FrameOutput>,
        config: SessionConfig,
        connector: C,
        transport: T,
    ) -> Self {
        Self { output, config, connector, transport, worker: None }
    }

    /// True while a session worker is live.
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Start capturing. Blocks until the session worker is accepting events.
    ///
    /// A negotiation failure leaves the source idle; it is logged inside the
    /// worker, never raised to the host.
    pub fn show(&mut self) {
        if self.is_active() {
            debug!("show: session already active");
            return;
        }
        // Reap a worker that ended on its own (remote close, pipeline error).
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        match SessionWorker::spawn(
            self.config.clone(),
            Arc::clone(&self.output),
            self.connector.clone(),
            self.transport.clone(),
        ) {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => debug!("capture session did not start: {}", e),
        }
    }

    /// Stop capturing. Idempotent; blocks until the worker has torn down and
    /// been joined.
    pub fn hide(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shutdown();
    }

    /// Replace the configuration. Restarts the session only when one is
    /// live; otherwise the new config simply takes effect on the next show.
    pub fn update(&mut self, config: SessionConfig) {
        self.config = config;
        let live = self.is_active();
        self.hide();
        if live {
            self.show();
        }
    }

    /// The configuration the next session will start with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<C, T> Drop for CaptureSource<C, T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}
