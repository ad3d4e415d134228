//! Seam to the native display-protocol object model.
//!
//! The core never implements the wire marshalling of the native protocol
//! itself. It consumes these traits: creating and destroying globals,
//! creating resources, posting protocol errors, and pushing a handful of
//! pre-encoded event records straight into a client connection.

use std::fmt;

use crate::error::FarviewError;

/// Identity of a native client connection.
///
/// Sessions are looked up by this handle; the core never owns the
/// connection it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Object id of the connection's root (display) object.
pub const DISPLAY_OBJECT_ID: u32 = 1;

/// One native client connection, as seen by the core.
pub trait NativeClient: Send + Sync {
    /// The handle this connection is known by.
    fn id(&self) -> ClientId;

    /// Create a resource `id` of `interface` at `version` on this client.
    fn create_resource(&self, interface: &str, version: u32, id: u32) -> Result<(), FarviewError>;

    /// Post a protocol error on resource `resource`.
    fn post_error(&self, resource: u32, code: u32, message: &str);

    /// Queue pre-encoded event records on the connection.
    fn send_events(&self, bytes: &[u8]) -> Result<(), FarviewError>;

    /// Flush queued events to the client socket.
    fn flush(&self) -> Result<(), FarviewError>;

    /// Destroy resource `id` without emitting a destroy notification.
    fn destroy_resource_silently(&self, id: u32);
}

/// The native display: owner of advertised globals.
pub trait NativeDisplay: Send + Sync {
    /// Advertise a global under `name`.
    fn create_global(&self, name: u32, interface: &str, version: u32) -> Result<(), FarviewError>;

    /// Withdraw the global advertised under `name`.
    fn destroy_global(&self, name: u32);
}
