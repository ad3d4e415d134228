//! Global dispatch: classifies advertised globals and binds each
//! inbound protocol object to a native resource plus a
//! (local adapter, remote shim) pair.
//!
//! ```text
//!  native bind ──► GlobalRegistry::bind ──► ShimGlobal::bind
//!                                              │
//!           SessionTable ◄── resolve session ──┤
//!           RemoteRegistry ◄── bind proxy ─────┤
//!                                              ▼
//!                 ResourcePair { LocalAdapter, RemoteShim }
//! ```

pub mod global;
pub mod handlers;
pub mod session;

pub use global::{GlobalDescriptor, GlobalRegistry, ShimGlobal};
pub use handlers::{GlobalKind, HANDLERS, HandlerSet, Namespace, classify};
pub use session::{
    ClientSession, LocalAdapter, RemoteProxy, RemoteRegistry, RemoteShim, ResourcePair,
    SessionTable,
};
