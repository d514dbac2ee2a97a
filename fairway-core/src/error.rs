//! Domain-specific error types for the bridge.
//!
//! All fallible operations return `Result<T, BridgeError>`.
//! Nothing here is fatal on its own: the caller decides whether an
//! error ends a session, is logged and skipped, or stops startup.

use thiserror::Error;

/// The canonical error type for the bridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// There is no live socket to write to.
    #[error("not connected")]
    NotConnected,

    /// A single frame grew past the codec limit without terminating.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Decode Errors ────────────────────────────────────────────
    /// A frame or outgoing message could not be (de)serialized.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A state transition was not valid from the current phase.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A message was well-formed but its content was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    // ── Downstream Consumer Errors ───────────────────────────────
    /// Appending to the shot log failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The capture controller rejected a request.
    #[error("capture error: {0}")]
    Capture(String),
}
