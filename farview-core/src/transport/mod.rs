//! Peer transport negotiation for client sessions.
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `signal`     | JSON signaling payloads (candidates, descriptions)   |
//! | `peer`       | External peer-connection seam and configuration      |
//! | `negotiator` | P2S / P2P state machine and offer/answer exchange    |
//! | `blob`       | Auxiliary bulk-transfer objects                      |

pub mod blob;
pub mod negotiator;
pub mod peer;
pub mod signal;

pub use blob::BlobTransfer;
pub use negotiator::{PeerHandle, TransportMode, TransportNegotiator};
pub use peer::{
    IceServer, OfferOptions, PeerConnection, PeerConnectionFactory, PeerConnectionState,
    PeerEvent, PeerEventSender, RtcConfiguration, SignalingSink,
};
pub use signal::{IceCandidate, SdpType, SessionDescription, Signal};
