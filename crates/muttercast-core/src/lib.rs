pub mod config;
pub mod errors;
pub mod frame;

pub use config::{CaptureTarget, CursorMode, SessionConfig, TimestampMode};
pub use errors::{DecodeError, LifecycleError, NegotiationError, TransportError};
pub use frame::*;
