//! muttercast-session — compositor-side session negotiation.
//!
//! Talks to `org.gnome.Mutter.ScreenCast` on the session bus:
//!
//! ```text
//! CreateSession({dummy})            → /org/gnome/Mutter/ScreenCast/Session/uN
//! Session.RecordMonitor(connector,  → /org/gnome/Mutter/ScreenCast/Stream/uM
//!                       {cursor-mode})
//!   Stream.PipeWireStreamAdded(u)   ← node id, after the consumer attaches
//!   Session.Closed()                ← compositor-side teardown
//! Session.Start() / Session.Stop()
//! ```
//!
//! Signal subscriptions are surfaced as a typed [`SessionEvent`] stream via
//! [`CaptureSession::next_event`] and released when the session value drops.
//! The seam traits exist so the lifecycle controller can run against mocks.

mod enumerate;
mod mutter;

pub use enumerate::{list_monitors, list_windows, MonitorInfo, WindowInfo};
pub use mutter::{session_bus, MutterConnector, MutterSession};

use async_trait::async_trait;
use muttercast_core::{CaptureTarget, CursorMode, NegotiationError};

// ── Session events ────────────────────────────────────────────────────────────

/// Lifecycle events delivered by the compositor for an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The stream's PipeWire node is ready for a consumer.
    StreamAdded { node_id: u32 },
    /// The compositor closed the session (display unplug, user stop, ...).
    Closed,
}

// ── Seam traits ───────────────────────────────────────────────────────────────

/// One remote capture session, from creation to stop.
#[async_trait(?Send)]
pub trait CaptureSession {
    /// Ask the compositor to record `target`. The resulting stream's routing
    /// token arrives later as [`SessionEvent::StreamAdded`], not here.
    async fn record(
        &mut self,
        target: &CaptureTarget,
        cursor: CursorMode,
    ) -> Result<(), NegotiationError>;

    /// Start frame production. Only valid once the stream has been announced
    /// and a consumer is attached, otherwise frames race the consumer.
    async fn start(&mut self) -> Result<(), NegotiationError>;

    /// Stop the session. No-op when the session is already closed.
    async fn stop(&mut self) -> Result<(), NegotiationError>;

    /// Wait for the next lifecycle event. Pends forever once `Closed` has
    /// been delivered.
    async fn next_event(&mut self) -> SessionEvent;
}

/// Factory for capture sessions.
#[async_trait(?Send)]
pub trait SessionConnector {
    type Session: CaptureSession;

    /// Create a remote session and subscribe to its lifecycle signals.
    async fn create_session(&mut self) -> Result<Self::Session, NegotiationError>;
}
