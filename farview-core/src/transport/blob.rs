//! Auxiliary bulk-transfer objects riding on a negotiated session.

use std::sync::{Arc, Weak};

use crate::transport::negotiator::TransportNegotiator;
use crate::transport::peer::PeerConnection;

/// A blob transfer allocated on a transport session.
///
/// The descriptor is opaque caller-supplied correlation data; this type
/// does not try to match it back to whoever produced it.
#[derive(Debug)]
pub struct BlobTransfer {
    id: u32,
    descriptor: String,
    transport: Weak<TransportNegotiator>,
}

impl BlobTransfer {
    pub(crate) fn new(id: u32, descriptor: String, transport: &Arc<TransportNegotiator>) -> Self {
        Self {
            id,
            descriptor,
            transport: Arc::downgrade(transport),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Wait for the session's peer connection to carry this transfer.
    ///
    /// Returns `None` if the session is gone.
    pub async fn peer_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        let transport = self.transport.upgrade()?;
        transport.on_peer_connection().await
    }
}
