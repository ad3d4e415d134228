//! Seam to the external peer-connection implementation.
//!
//! The negotiator drives a [`PeerConnection`] through offer/answer and
//! candidate exchange; the connection reports back through a
//! [`PeerEvent`] channel handed to it at construction.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::FarviewError;
use crate::transport::signal::{IceCandidate, SessionDescription};

// ── Configuration ────────────────────────────────────────────────

/// One ICE server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    /// A relay (TURN) server with credentials.
    pub fn relay(urls: impl Into<String>, username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// A public discovery (STUN) server.
    pub fn discovery(urls: impl Into<String>) -> Self {
        Self {
            urls: urls.into(),
            username: None,
            credential: None,
        }
    }
}

/// Peer-connection configuration: one relay server, one discovery server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
}

impl RtcConfiguration {
    pub fn new(relay: IceServer, discovery: IceServer) -> Self {
        Self {
            ice_servers: vec![relay, discovery],
        }
    }
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self::new(
            IceServer::relay("turn:localhost:3478?transport=tcp", "farview", "farview"),
            IceServer::discovery("stun:stun.l.google.com:19302"),
        )
    }
}

/// Options for building a local offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
    pub voice_activity_detection: bool,
    pub ice_restart: bool,
}

impl OfferOptions {
    /// Data-only renegotiation: no media reception, no VAD, no ICE restart.
    pub const fn renegotiation() -> Self {
        Self {
            offer_to_receive_audio: false,
            offer_to_receive_video: false,
            voice_activity_detection: false,
            ice_restart: false,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Aggregate connection state of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Notifications emitted by a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A local candidate was discovered; `None` marks end-of-candidates.
    IceCandidate(Option<IceCandidate>),
    /// The connection wants a fresh offer/answer exchange.
    NegotiationNeeded,
    ConnectionStateChanged(PeerConnectionState),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

// ── Traits ───────────────────────────────────────────────────────

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, FarviewError>;

    async fn create_answer(&self) -> Result<SessionDescription, FarviewError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), FarviewError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), FarviewError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), FarviewError>;

    /// The description last installed locally, if any.
    fn local_description(&self) -> Option<SessionDescription>;

    fn connection_state(&self) -> PeerConnectionState;

    fn close(&self);
}

/// Builds peer connections for P2S sessions.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        config: &RtcConfiguration,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, FarviewError>;
}

/// Outbound signaling on the session's peer-connection resource.
pub trait SignalingSink: Send + Sync {
    fn server_ice_candidates(&self, description: &str);

    fn server_sdp_offer(&self, description: &str);

    fn server_sdp_reply(&self, description: &str);

    /// Tell the client the connection is initialised (P2P mode).
    fn init(&self);
}
