//! # farview-core
//!
//! Core of the farview remote-display compositor.
//!
//! This crate contains:
//! - **Registry**: `GlobalRegistry`, `ShimGlobal`, `SessionTable`: classify
//!   advertised globals and bind each protocol object to a native resource
//!   plus a (local adapter, remote shim) pair
//! - **Scene**: `SceneGraph`, `View`, `RenderState`: per-surface transforms
//!   and per-scene visibility
//! - **Pacing**: `FrameScheduler`, `FrameFeedback`, `FramePacer`: adaptive
//!   frame-callback pacing and the raw wire records it emits
//! - **Transport**: `TransportNegotiator`: P2S / P2P peer transport and
//!   its signaling exchange
//! - **Geometry**: `Mat4`, `Region` over `kurbo` primitives
//! - **Native**: the traits the native protocol layer implements
//! - **Error**: `FarviewError`: typed, `thiserror`-based error hierarchy

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod error;
pub mod geometry;
pub mod native;
pub mod pacing;
pub mod registry;
pub mod scene;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::FarviewError;
pub use geometry::{Mat4, Point, Rect, Region, Size, Vec2};
pub use native::{ClientId, DISPLAY_OBJECT_ID, NativeClient, NativeDisplay};
pub use pacing::{
    EventCodec, FrameFeedback, FramePacer, FrameScheduler, PacingConfig, PendingFrame, Telemetry,
    WireEvent,
};
pub use registry::{
    ClientSession, GlobalDescriptor, GlobalKind, GlobalRegistry, Namespace, RemoteProxy,
    RemoteRegistry, ResourcePair, SessionTable, ShimGlobal, classify,
};
pub use scene::{RenderState, Scene, SceneGraph, SceneId, SurfaceId, View};
pub use transport::{
    BlobTransfer, IceCandidate, IceServer, PeerConnection, PeerConnectionFactory, PeerEvent,
    PeerHandle, RtcConfiguration, SessionDescription, Signal, SignalingSink, TransportMode,
    TransportNegotiator,
};

// ── Poison-tolerant lock helpers ─────────────────────────────────

/// Lock `m`, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}
