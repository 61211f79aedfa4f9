use thiserror::Error;

/// Remote call or connection failure while negotiating with the compositor.
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("cannot connect to session bus: {reason}")]
    Connect { reason: String },

    #[error("{method} failed: {reason}")]
    RemoteCall { method: &'static str, reason: String },

    #[error("malformed reply to {method}: {reason}")]
    MalformedReply { method: &'static str, reason: String },
}

/// Local pipeline construction or runtime failure.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("pipeline construction failed: {reason}")]
    Construct { reason: String },

    #[error("pipeline state change failed: {reason}")]
    StateChange { reason: String },

    #[error("pipeline error: {reason}")]
    Runtime { reason: String },
}

/// Per-frame conversion failure. Never fatal to the session.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported video format: {format}")]
    UnsupportedFormat { format: String },

    #[error("malformed frame: {reason}")]
    Malformed { reason: String },
}

/// Session worker handoff failure. Invalid lifecycle transitions are no-ops,
/// not errors; these cover the worker thread itself.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("cannot spawn session worker: {reason}")]
    Spawn { reason: String },

    #[error("session worker failed before accepting events")]
    StartupFailed,
}
