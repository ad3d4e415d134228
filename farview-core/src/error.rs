//! Domain-specific error types for the farview compositor core.
//!
//! All fallible operations return `Result<T, FarviewError>`.
//! No panics on untrusted input: malformed telemetry and signaling
//! payloads are typed and recoverable, and bind failures stay scoped to
//! the client that caused them.

use thiserror::Error;

use crate::native::ClientId;
use crate::scene::SurfaceId;

/// The canonical error type for the compositor core.
#[derive(Debug, Error)]
pub enum FarviewError {
    // ── Registry Errors ──────────────────────────────────────────
    /// The interface name is absent from the handler table.
    #[error("unsupported global: {0}")]
    UnsupportedGlobal(String),

    /// A bind was attempted for a client with no transport session.
    #[error("no transport session for client {0}")]
    NoSession(ClientId),

    // ── Transport Errors ─────────────────────────────────────────
    /// The requested transport mode conflicts with the one already chosen.
    #[error("invalid transport mode: {0}")]
    InvalidMode(&'static str),

    /// Inbound signaling arrived before a transport mode was chosen.
    #[error("transport mode not negotiated")]
    NotNegotiated,

    /// The peer connection rejected an operation.
    #[error("peer connection error: {0}")]
    PeerConnection(String),

    // ── Scene Errors ─────────────────────────────────────────────
    /// No surface with this id exists in the scene graph.
    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceId),

    /// Re-parenting would make a surface its own ancestor.
    #[error("surface {0} cannot be parented under its own descendant")]
    SurfaceCycle(SurfaceId),

    // ── Input Errors ─────────────────────────────────────────────
    /// A telemetry message was too short to carry both fields.
    #[error("malformed telemetry: {len} bytes (need at least 4)")]
    MalformedTelemetry { len: usize },

    /// A signaling payload failed to parse.
    #[error("malformed signal: {0}")]
    MalformedSignal(String),

    // ── Native Errors ────────────────────────────────────────────
    /// The native protocol layer refused an operation.
    #[error("native protocol error: {0}")]
    Native(String),

    /// The IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl FarviewError {
    /// Returns `true` for errors caused by bad input from a peer, which
    /// are logged and skipped rather than surfaced.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedTelemetry { .. } | Self::MalformedSignal(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for FarviewError {
    fn from(s: String) -> Self {
        FarviewError::Other(s)
    }
}

impl From<&str> for FarviewError {
    fn from(s: &str) -> Self {
        FarviewError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for FarviewError {
    fn from(e: serde_json::Error) -> Self {
        FarviewError::MalformedSignal(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FarviewError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        FarviewError::ChannelClosed
    }
}
