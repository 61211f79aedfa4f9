//! The per-session execution context: one worker thread running a
//! current-thread runtime whose event loop serializes compositor session
//! events, pipeline frame/error delivery, and host stop requests.

use std::sync::Arc;
use std::thread;

use muttercast_core::{LifecycleError, SessionConfig};
use muttercast_pipeline::{PipelineEvent, TransportBackend, TransportPipeline};
use muttercast_session::{CaptureSession, SessionConnector, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::FrameOutput;

/// Depth of the event channel between the pipeline and the worker.
const EVENT_QUEUE_DEPTH: usize = 8;

// ── SessionWorker ─────────────────────────────────────────────────────────────

/// Handle to one session's worker thread. Owned by the `CaptureSource`;
/// always joined before the handle is released.
pub(crate) struct SessionWorker {
    thread: Option<thread::JoinHandle<()>>,
    stop_tx: mpsc::Sender<()>,
}

impl SessionWorker {
    /// Spawn the session context. Blocks until the worker either accepts
    /// events or fails negotiation, so the caller never observes a
    /// half-built session.
    pub(crate) fn spawn<C, T>(
        config: SessionConfig,
        output: Arc<dyn FrameOutput>,
        connector: C,
        transport: T,
    ) -> Result<Self, LifecycleError>
    where
        C: SessionConnector + Send + 'static,
        T: TransportBackend,
    {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = thread::Builder::new()
            .name("muttercast-session".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("session runtime: {}", e);
                        let _ = ready_tx.send(false);
                        return;
                    }
                };
                runtime.block_on(run_session(
                    config, output, connector, transport, stop_rx, ready_tx,
                ));
            })
            .map_err(|e| LifecycleError::Spawn { reason: e.to_string() })?;

        match ready_rx.recv() {
            Ok(true) => Ok(Self { thread: Some(thread), stop_tx }),
            Ok(false) | Err(_) => {
                let _ = thread.join();
                Err(LifecycleError::StartupFailed)
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Orderly stop: signal the event loop, then join it.
    pub(crate) fn shutdown(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("session worker panicked");
            }
        }
    }
}

// ── Session event loop ────────────────────────────────────────────────────────

async fn run_session<C, T>(
    config: SessionConfig,
    output: Arc<dyn FrameOutput>,
    mut connector: C,
    mut transport: T,
    mut stop_rx: mpsc::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<bool>,
) where
    C: SessionConnector,
    T: TransportBackend,
{
    let mut session = match connector.create_session().await {
        Ok(session) => session,
        Err(e) => {
            error!("create_session: {}", e);
            let _ = ready_tx.send(false);
            return;
        }
    };

    if let Err(e) = session.record(&config.target, config.cursor_mode).await {
        error!("record: {}", e);
        if let Err(e) = session.stop().await {
            warn!("session stop after failed record: {}", e);
        }
        let _ = ready_tx.send(false);
        return;
    }

    // From here on the host has observed a started session; every exit path
    // below runs the teardown and blanks the output exactly once.
    let _ = ready_tx.send(true);
    info!(target = ?config.target, "capture session starting");

    let (pipe_tx, mut pipe_rx) = mpsc::channel::<PipelineEvent>(EVENT_QUEUE_DEPTH);
    let mut pipeline: Option<T::Pipeline> = None;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!("stop requested by host");
                break;
            }

            event = session.next_event() => match event {
                SessionEvent::StreamAdded { node_id } => {
                    if pipeline.is_some() {
                        warn!("duplicate stream announcement ignored");
                        continue;
                    }
                    let mut built = match transport.attach(node_id, &config, pipe_tx.clone()) {
                        Ok(built) => built,
                        Err(e) => {
                            error!("pipeline attach: {}", e);
                            break;
                        }
                    };
                    if let Err(e) = built.start() {
                        error!("pipeline start: {}", e);
                        built.stop();
                        break;
                    }
                    // Only now is a consumer in place for the stream.
                    if let Err(e) = session.start().await {
                        error!("session start: {}", e);
                        built.stop();
                        break;
                    }
                    info!(node_id, "stream active");
                    pipeline = Some(built);
                }
                SessionEvent::Closed => {
                    info!("session closed by compositor");
                    break;
                }
            },

            event = pipe_rx.recv() => match event {
                Some(PipelineEvent::Frame(frame)) => output.emit_frame(Some(frame)),
                Some(PipelineEvent::Closed(error)) => {
                    match error {
                        Some(e) => error!("pipeline failed: {}", e),
                        None => info!("pipeline end of stream"),
                    }
                    break;
                }
                // Unreachable while we hold pipe_tx, but ends the session
                // cleanly if that ever changes.
                None => break,
            },
        }
    }

    // Teardown order matters: pipeline first, then the remote session, then
    // the signal subscriptions (dropped with `session`). Close the event
    // channel first so a sender blocked in the frame callback cannot stall
    // the pipeline's state change.
    pipe_rx.close();
    if let Some(mut built) = pipeline.take() {
        built.stop();
    }
    if let Err(e) = session.stop().await {
        warn!("session stop: {}", e);
    }
    output.emit_frame(None);
    info!("capture session ended");
}
