//! Static handler table mapping interface names to handler sets.
//!
//! Two disjoint namespaces are recognised:
//!
//! | Namespace   | Prefix | Objects                                   |
//! |-------------|--------|-------------------------------------------|
//! | `Extension` | `fv_`  | custom remoting objects                   |
//! | `Standard`  | `xdg_` | desktop-shell objects                     |
//!
//! Anything absent from [`HANDLERS`] is rejected with
//! [`FarviewError::UnsupportedGlobal`], including unknown names that
//! happen to carry a recognised prefix.

use std::fmt;
use std::sync::Arc;

use crate::error::FarviewError;
use crate::native::NativeClient;
use crate::registry::session::{ClientSession, LocalAdapter, RemoteProxy, RemoteShim};

// ── Namespace ────────────────────────────────────────────────────

/// Interface namespace a global belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Custom remoting objects.
    Extension,
    /// Desktop-shell objects.
    Standard,
}

impl Namespace {
    /// The interface-name prefix of this namespace.
    pub const fn prefix(self) -> &'static str {
        match self {
            Namespace::Extension => "fv_",
            Namespace::Standard => "xdg_",
        }
    }

    /// The namespace an interface name claims by prefix, if any.
    pub fn of(interface: &str) -> Option<Self> {
        [Namespace::Extension, Namespace::Standard]
            .into_iter()
            .find(|ns| interface.starts_with(ns.prefix()))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Extension => write!(f, "extension"),
            Namespace::Standard => write!(f, "standard"),
        }
    }
}

// ── GlobalKind ───────────────────────────────────────────────────

/// Which concrete adapter/shim pair a global instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Compositor,
    Subcompositor,
    Seat,
    Output,
    DataDeviceManager,
    Shell,
    RtcPeerConnectionFactory,
    XdgWmBase,
}

// ── HandlerSet ───────────────────────────────────────────────────

/// The three behaviors needed to bind one interface: create the native
/// wire resource, construct the local adapter, construct the remote shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSet {
    /// Interface name as advertised to remote peers.
    pub interface: &'static str,
    /// Interface name of the native wire resource.
    pub native_interface: &'static str,
    /// Namespace the interface belongs to.
    pub namespace: Namespace,
    /// Adapter/shim variant.
    pub kind: GlobalKind,
}

impl HandlerSet {
    /// Create the native resource `id` backing this global on `client`.
    pub fn create_wire_resource(
        &self,
        client: &dyn NativeClient,
        version: u32,
        id: u32,
    ) -> Result<(), FarviewError> {
        client.create_resource(self.native_interface, version, id)
    }

    /// Construct the native-facing adapter bound to `session`.
    pub fn create_local_adapter(&self, session: Arc<ClientSession>) -> LocalAdapter {
        LocalAdapter::new(self.kind, session)
    }

    /// Construct the remote-facing shim wrapping `proxy`.
    pub fn create_shim(&self, proxy: Arc<RemoteProxy>, session: Arc<ClientSession>) -> RemoteShim {
        RemoteShim::new(self.kind, proxy, session)
    }
}

const fn extension(
    interface: &'static str,
    native_interface: &'static str,
    kind: GlobalKind,
) -> HandlerSet {
    HandlerSet {
        interface,
        native_interface,
        namespace: Namespace::Extension,
        kind,
    }
}

/// Every interface the registry can bind.
pub const HANDLERS: &[HandlerSet] = &[
    extension("fv_compositor", "wl_compositor", GlobalKind::Compositor),
    extension("fv_subcompositor", "wl_subcompositor", GlobalKind::Subcompositor),
    extension("fv_seat", "wl_seat", GlobalKind::Seat),
    extension("fv_output", "wl_output", GlobalKind::Output),
    extension(
        "fv_data_device_manager",
        "wl_data_device_manager",
        GlobalKind::DataDeviceManager,
    ),
    extension("fv_shell", "wl_shell", GlobalKind::Shell),
    extension(
        "fv_rtc_peer_connection_factory",
        "fv_rtc_peer_connection_factory",
        GlobalKind::RtcPeerConnectionFactory,
    ),
    HandlerSet {
        interface: "xdg_wm_base",
        native_interface: "xdg_wm_base",
        namespace: Namespace::Standard,
        kind: GlobalKind::XdgWmBase,
    },
];

/// Resolve the handler set for `interface`.
pub fn classify(interface: &str) -> Result<&'static HandlerSet, FarviewError> {
    HANDLERS
        .iter()
        .find(|h| h.interface == interface)
        .ok_or_else(|| FarviewError::UnsupportedGlobal(interface.to_string()))
}
