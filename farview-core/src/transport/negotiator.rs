//! Per-session transport negotiation.
//!
//! ```text
//!                 ensure_p2s()
//!  Uninitialized ─────────────► P2s(peer connection)
//!       │
//!       │ ensure_p2p(h)
//!       ▼
//!   P2p(h)           (no transition between P2s and P2p)
//! ```
//!
//! In P2S mode this session terminates the peer connection itself and
//! runs the offer/answer exchange against it. In P2P mode it owns no
//! peer connection at all: inbound signaling is relayed verbatim to the
//! counterpart session's resource.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::FarviewError;
use crate::lock;
use crate::transport::blob::BlobTransfer;
use crate::transport::peer::{
    OfferOptions, PeerConnection, PeerConnectionFactory, PeerEvent, RtcConfiguration,
    SignalingSink,
};
use crate::transport::signal::{IceCandidate, Signal};

// ── PeerHandle ───────────────────────────────────────────────────

/// Identity of the counterpart session in P2P mode.
#[derive(Clone)]
pub struct PeerHandle {
    id: u64,
    sink: Arc<dyn SignalingSink>,
}

impl PeerHandle {
    pub fn new(id: u64, sink: Arc<dyn SignalingSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerHandle {}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle").field("id", &self.id).finish()
    }
}

// ── TransportMode ────────────────────────────────────────────────

/// Observable transport mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Uninitialized,
    /// Peer-to-server: this session terminates the peer connection.
    P2s,
    /// Peer-to-peer: pure signaling relay to another session.
    P2p,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::P2s => write!(f, "P2S"),
            Self::P2p => write!(f, "P2P"),
        }
    }
}

enum Mode {
    Uninitialized,
    P2s {
        peer: Arc<dyn PeerConnection>,
        pump: JoinHandle<()>,
    },
    P2p(PeerHandle),
}

/// Mode-specific target for inbound signaling.
enum Delegate {
    P2s(Arc<dyn PeerConnection>),
    P2p(PeerHandle),
}

struct NegotiatorState {
    mode: Mode,
    blob_transfers: HashMap<u32, Arc<BlobTransfer>>,
}

// ── TransportNegotiator ──────────────────────────────────────────

/// Negotiates and maintains one session's peer transport.
pub struct TransportNegotiator {
    sink: Arc<dyn SignalingSink>,
    factory: Arc<dyn PeerConnectionFactory>,
    config: RtcConfiguration,
    state: Mutex<NegotiatorState>,
    destroyed: AtomicBool,
    peer_tx: watch::Sender<Option<Arc<dyn PeerConnection>>>,
}

impl TransportNegotiator {
    pub fn new(
        sink: Arc<dyn SignalingSink>,
        factory: Arc<dyn PeerConnectionFactory>,
        config: RtcConfiguration,
    ) -> Arc<Self> {
        let (peer_tx, _) = watch::channel(None);
        Arc::new(Self {
            sink,
            factory,
            config,
            state: Mutex::new(NegotiatorState {
                mode: Mode::Uninitialized,
                blob_transfers: HashMap::new(),
            }),
            destroyed: AtomicBool::new(false),
            peer_tx,
        })
    }

    pub fn mode(&self) -> TransportMode {
        match lock(&self.state).mode {
            Mode::Uninitialized => TransportMode::Uninitialized,
            Mode::P2s { .. } => TransportMode::P2s,
            Mode::P2p(_) => TransportMode::P2p,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // ── Mode selection ───────────────────────────────────────────

    /// Set up a peer connection terminated by this session.
    ///
    /// Valid from: `Uninitialized` (creates the connection) and `P2s`
    /// (no-op). Fails with `InvalidMode` from `P2p`, and with
    /// `PeerConnection` outside a tokio runtime.
    pub fn ensure_p2s(self: &Arc<Self>) -> Result<(), FarviewError> {
        if self.is_destroyed() {
            return Err(FarviewError::ChannelClosed);
        }

        let peer = {
            let mut state = lock(&self.state);
            match &state.mode {
                Mode::P2s { .. } => return Ok(()),
                Mode::P2p(_) => {
                    return Err(FarviewError::InvalidMode(
                        "already initialized in peer-to-peer mode",
                    ));
                }
                Mode::Uninitialized => {}
            }

            let runtime = Handle::try_current().map_err(|_| {
                FarviewError::PeerConnection("peer-to-server mode needs a tokio runtime".into())
            })?;

            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let peer = self.factory.create(&self.config, events_tx)?;
            debug!(state = ?peer.connection_state(), "created peer connection");

            let pump = runtime.spawn(Self::pump_peer_events(Arc::downgrade(self), events_rx));
            state.mode = Mode::P2s {
                peer: Arc::clone(&peer),
                pump,
            };
            peer
        };

        self.peer_tx.send_replace(Some(peer));
        Ok(())
    }

    /// Relay signaling to `counterpart` without a local peer connection.
    ///
    /// Valid from: `Uninitialized` and `P2p` with the same counterpart
    /// (no-op). Fails with `InvalidMode` from `P2s` or when already
    /// paired with a different counterpart.
    pub fn ensure_p2p(&self, counterpart: PeerHandle) -> Result<(), FarviewError> {
        if self.is_destroyed() {
            return Err(FarviewError::ChannelClosed);
        }

        {
            let mut state = lock(&self.state);
            match &state.mode {
                Mode::P2s { .. } => {
                    return Err(FarviewError::InvalidMode(
                        "already initialized in peer-to-server mode",
                    ));
                }
                Mode::P2p(current) if *current == counterpart => return Ok(()),
                Mode::P2p(_) => {
                    return Err(FarviewError::InvalidMode(
                        "already initialized with another peer",
                    ));
                }
                Mode::Uninitialized => {}
            }
            debug!(counterpart = counterpart.id(), "relaying signaling peer-to-peer");
            state.mode = Mode::P2p(counterpart);
        }

        self.sink.init();
        Ok(())
    }

    /// Resolves with the peer connection once one exists (P2S only).
    ///
    /// Returns `None` if the negotiator is dropped first.
    pub async fn on_peer_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        let mut rx = self.peer_tx.subscribe();
        let peer = rx.wait_for(|p| p.is_some()).await.ok()?;
        peer.clone()
    }

    // ── Inbound signaling ────────────────────────────────────────

    /// Remote ICE candidates from the client.
    pub async fn on_ice_candidates(&self, description: &str) -> Result<(), FarviewError> {
        let peer = match self.delegate()? {
            Some(Delegate::P2p(counterpart)) => {
                counterpart.sink.server_ice_candidates(description);
                return Ok(());
            }
            Some(Delegate::P2s(peer)) => peer,
            None => return Ok(()),
        };

        let Some(candidate) = Self::parse_or_skip(Signal::parse_candidate(description)) else {
            return Ok(());
        };
        debug!("received remote ice candidate");
        peer.add_ice_candidate(candidate).await
    }

    /// Remote SDP offer from the client: answer it.
    pub async fn on_sdp_offer(&self, description: &str) -> Result<(), FarviewError> {
        let peer = match self.delegate()? {
            Some(Delegate::P2p(counterpart)) => {
                counterpart.sink.server_sdp_offer(description);
                return Ok(());
            }
            Some(Delegate::P2s(peer)) => peer,
            None => return Ok(()),
        };

        let Some(offer) = Self::parse_or_skip(Signal::parse_sdp(description)) else {
            return Ok(());
        };
        debug!("received remote sdp offer");
        peer.set_remote_description(offer).await?;
        if self.is_destroyed() {
            return Ok(());
        }

        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        if self.is_destroyed() {
            return Ok(());
        }

        let local = peer.local_description().unwrap_or(answer);
        let reply = Signal::Sdp { sdp: local }.to_json()?;
        debug!("sending local sdp answer");
        self.sink.server_sdp_reply(&reply);
        Ok(())
    }

    /// Remote SDP answer from the client.
    pub async fn on_sdp_reply(&self, description: &str) -> Result<(), FarviewError> {
        let peer = match self.delegate()? {
            Some(Delegate::P2p(counterpart)) => {
                counterpart.sink.server_sdp_reply(description);
                return Ok(());
            }
            Some(Delegate::P2s(peer)) => peer,
            None => return Ok(()),
        };

        let Some(answer) = Self::parse_or_skip(Signal::parse_sdp(description)) else {
            return Ok(());
        };
        debug!("received remote sdp answer");
        peer.set_remote_description(answer).await
    }

    // ── Blob transfers ───────────────────────────────────────────

    /// Allocate blob transfer `id` carrying the caller's `descriptor`.
    pub fn create_blob_transfer(
        self: &Arc<Self>,
        id: u32,
        descriptor: impl Into<String>,
    ) -> Result<Arc<BlobTransfer>, FarviewError> {
        if self.is_destroyed() {
            return Err(FarviewError::ChannelClosed);
        }
        let mut state = lock(&self.state);
        if state.blob_transfers.contains_key(&id) {
            return Err(FarviewError::Native(format!("blob transfer {id} already exists")));
        }
        let transfer = Arc::new(BlobTransfer::new(id, descriptor.into(), self));
        state.blob_transfers.insert(id, Arc::clone(&transfer));
        Ok(transfer)
    }

    pub fn blob_transfer(&self, id: u32) -> Option<Arc<BlobTransfer>> {
        lock(&self.state).blob_transfers.get(&id).cloned()
    }

    pub fn destroy_blob_transfer(&self, id: u32) -> bool {
        lock(&self.state).blob_transfers.remove(&id).is_some()
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Tear the session down. Pending negotiation steps become no-ops.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mode = {
            let mut state = lock(&self.state);
            state.blob_transfers.clear();
            std::mem::replace(&mut state.mode, Mode::Uninitialized)
        };
        if let Mode::P2s { peer, pump } = mode {
            pump.abort();
            peer.close();
        }
        debug!("transport session destroyed");
    }

    // ── Internal ─────────────────────────────────────────────────

    /// `Ok(None)` once destroyed; `NotNegotiated` before a mode is chosen.
    fn delegate(&self) -> Result<Option<Delegate>, FarviewError> {
        if self.is_destroyed() {
            return Ok(None);
        }
        match &lock(&self.state).mode {
            Mode::Uninitialized => Err(FarviewError::NotNegotiated),
            Mode::P2s { peer, .. } => Ok(Some(Delegate::P2s(Arc::clone(peer)))),
            Mode::P2p(counterpart) => Ok(Some(Delegate::P2p(counterpart.clone()))),
        }
    }

    fn p2s_peer(&self) -> Option<Arc<dyn PeerConnection>> {
        match &lock(&self.state).mode {
            Mode::P2s { peer, .. } => Some(Arc::clone(peer)),
            _ => None,
        }
    }

    fn parse_or_skip<T>(parsed: Result<T, FarviewError>) -> Option<T> {
        parsed
            .inspect_err(|e| warn!("dropping signaling message: {e}"))
            .ok()
    }

    async fn pump_peer_events(
        this: Weak<Self>,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(this) = this.upgrade() else { break };
            if this.is_destroyed() {
                break;
            }
            this.handle_peer_event(event).await;
        }
    }

    async fn handle_peer_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(Some(candidate)) => self.send_local_candidate(candidate),
            PeerEvent::IceCandidate(None) => trace!("end of local ice candidates"),
            PeerEvent::NegotiationNeeded => {
                debug!("negotiation needed");
                if let Err(e) = self.send_offer().await {
                    warn!("renegotiation failed: {e}");
                }
            }
            PeerEvent::ConnectionStateChanged(state) => {
                debug!(?state, "peer connection state changed");
            }
        }
    }

    fn send_local_candidate(&self, candidate: IceCandidate) {
        match (Signal::Candidate { candidate }).to_json() {
            Ok(json) => {
                debug!("sending local ice candidate");
                self.sink.server_ice_candidates(&json);
            }
            Err(e) => warn!("failed to encode local candidate: {e}"),
        }
    }

    async fn send_offer(&self) -> Result<(), FarviewError> {
        let Some(peer) = self.p2s_peer() else {
            return Ok(());
        };
        let offer = peer.create_offer(OfferOptions::renegotiation()).await?;
        peer.set_local_description(offer.clone()).await?;
        if self.is_destroyed() {
            return Ok(());
        }
        let local = peer.local_description().unwrap_or(offer);
        let json = Signal::Sdp { sdp: local }.to_json()?;
        debug!("sending local sdp offer");
        self.sink.server_sdp_offer(&json);
        Ok(())
    }
}

impl fmt::Debug for TransportNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportNegotiator")
            .field("mode", &self.mode())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFactory, RecordingSink};
    use crate::transport::signal::SessionDescription;

    fn negotiator() -> (Arc<TransportNegotiator>, Arc<RecordingSink>, Arc<FakeFactory>) {
        let sink = Arc::new(RecordingSink::default());
        let factory = Arc::new(FakeFactory::default());
        let n = TransportNegotiator::new(sink.clone(), factory.clone(), RtcConfiguration::default());
        (n, sink, factory)
    }

    fn handle(id: u64) -> (PeerHandle, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (PeerHandle::new(id, sink.clone()), sink)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn ensure_p2s_outside_runtime_builds_nothing() {
        let (n, _, factory) = negotiator();
        assert!(matches!(n.ensure_p2s(), Err(FarviewError::PeerConnection(_))));
        assert_eq!(factory.created(), 0);
        assert_eq!(n.mode(), TransportMode::Uninitialized);
    }

    #[tokio::test]
    async fn ensure_p2s_twice_creates_one_connection() {
        let (n, _, factory) = negotiator();
        n.ensure_p2s().unwrap();
        n.ensure_p2s().unwrap();
        assert_eq!(factory.created(), 1);
        assert_eq!(n.mode(), TransportMode::P2s);
    }

    #[tokio::test]
    async fn ensure_p2s_after_p2p_is_invalid() {
        let (n, _, factory) = negotiator();
        let (h, _) = handle(1);
        n.ensure_p2p(h).unwrap();
        assert!(matches!(n.ensure_p2s(), Err(FarviewError::InvalidMode(_))));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn ensure_p2p_same_handle_is_noop() {
        let (n, sink, _) = negotiator();
        let (h, _) = handle(1);
        n.ensure_p2p(h.clone()).unwrap();
        n.ensure_p2p(h).unwrap();
        assert_eq!(sink.inits.load(std::sync::atomic::Ordering::SeqCst), 1);

        let (other, _) = handle(2);
        assert!(matches!(n.ensure_p2p(other), Err(FarviewError::InvalidMode(_))));
    }

    #[tokio::test]
    async fn ensure_p2p_after_p2s_is_invalid() {
        let (n, _, _) = negotiator();
        n.ensure_p2s().unwrap();
        let (h, _) = handle(1);
        assert!(matches!(n.ensure_p2p(h), Err(FarviewError::InvalidMode(_))));
    }

    #[tokio::test]
    async fn inbound_before_mode_is_not_negotiated() {
        let (n, _, _) = negotiator();
        assert!(matches!(
            n.on_ice_candidates("{}").await,
            Err(FarviewError::NotNegotiated)
        ));
    }

    #[tokio::test]
    async fn offer_is_answered() {
        let (n, sink, factory) = negotiator();
        n.ensure_p2s().unwrap();
        let offer = Signal::Sdp {
            sdp: SessionDescription::offer("v=0 remote"),
        }
        .to_json()
        .unwrap();
        n.on_sdp_offer(&offer).await.unwrap();

        let peer = factory.peer().unwrap();
        assert_eq!(*lock(&peer.remote), vec![SessionDescription::offer("v=0 remote")]);
        let replies = sink.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            Signal::parse_sdp(&replies[0]).unwrap(),
            SessionDescription::answer("v=0 local-answer")
        );
    }

    #[tokio::test]
    async fn reply_and_candidate_reach_peer() {
        let (n, _, factory) = negotiator();
        n.ensure_p2s().unwrap();
        let answer = Signal::Sdp {
            sdp: SessionDescription::answer("v=0 remote-answer"),
        }
        .to_json()
        .unwrap();
        n.on_sdp_reply(&answer).await.unwrap();
        n.on_ice_candidates(r#"{"candidate":{"candidate":"candidate:1 1 udp 1 1.2.3.4 5 typ host"}}"#)
            .await
            .unwrap();

        let peer = factory.peer().unwrap();
        assert_eq!(lock(&peer.remote).len(), 1);
        assert_eq!(lock(&peer.candidates).len(), 1);
    }

    #[tokio::test]
    async fn malformed_signal_is_skipped() {
        let (n, sink, factory) = negotiator();
        n.ensure_p2s().unwrap();
        n.on_sdp_offer("{not json").await.unwrap();
        n.on_ice_candidates(r#"{"sdp":{"type":"offer","sdp":"x"}}"#)
            .await
            .unwrap();
        assert!(sink.replies().is_empty());
        assert!(lock(&factory.peer().unwrap().candidates).is_empty());

        let offer = Signal::Sdp {
            sdp: SessionDescription::offer("v=0"),
        }
        .to_json()
        .unwrap();
        n.on_sdp_offer(&offer).await.unwrap();
        assert_eq!(sink.replies().len(), 1);
    }

    #[tokio::test]
    async fn local_candidates_forwarded_without_end_marker() {
        let (n, sink, factory) = negotiator();
        n.ensure_p2s().unwrap();
        let events = factory.events().unwrap();
        events
            .send(PeerEvent::IceCandidate(Some(IceCandidate::new("candidate:a"))))
            .unwrap();
        events.send(PeerEvent::IceCandidate(None)).unwrap();
        settle().await;

        let sent = sink.candidates();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            Signal::parse_candidate(&sent[0]).unwrap(),
            IceCandidate::new("candidate:a")
        );
    }

    #[tokio::test]
    async fn negotiation_needed_sends_offer() {
        let (n, sink, factory) = negotiator();
        n.ensure_p2s().unwrap();
        factory
            .events()
            .unwrap()
            .send(PeerEvent::NegotiationNeeded)
            .unwrap();
        settle().await;

        let peer = factory.peer().unwrap();
        assert_eq!(*lock(&peer.offers), vec![OfferOptions::renegotiation()]);
        assert_eq!(sink.offers().len(), 1);
    }

    #[tokio::test]
    async fn p2p_relays_verbatim() {
        let (n, _, factory) = negotiator();
        let (h, counterpart) = handle(7);
        n.ensure_p2p(h).unwrap();

        n.on_ice_candidates("raw-candidate").await.unwrap();
        n.on_sdp_offer("raw-offer").await.unwrap();
        n.on_sdp_reply("raw-reply").await.unwrap();

        assert_eq!(counterpart.candidates(), vec!["raw-candidate"]);
        assert_eq!(counterpart.offers(), vec!["raw-offer"]);
        assert_eq!(counterpart.replies(), vec!["raw-reply"]);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn on_peer_connection_resolves_after_p2s() {
        let (n, _, _) = negotiator();
        let waiter = {
            let n = Arc::clone(&n);
            tokio::spawn(async move { n.on_peer_connection().await.is_some() })
        };
        settle().await;
        n.ensure_p2s().unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn destroy_makes_session_inert() {
        let (n, sink, factory) = negotiator();
        n.ensure_p2s().unwrap();
        n.create_blob_transfer(1, "clipboard").unwrap();
        n.destroy();

        let peer = factory.peer().unwrap();
        assert!(peer.closed.load(std::sync::atomic::Ordering::SeqCst));
        assert!(n.blob_transfer(1).is_none());
        n.on_sdp_offer(r#"{"sdp":{"type":"offer","sdp":"x"}}"#)
            .await
            .unwrap();
        assert!(sink.replies().is_empty());
        assert!(matches!(n.ensure_p2s(), Err(FarviewError::ChannelClosed)));
    }

    #[tokio::test]
    async fn blob_transfers_are_tracked() {
        let (n, _, _) = negotiator();
        let transfer = n.create_blob_transfer(3, "image/png").unwrap();
        assert_eq!(transfer.descriptor(), "image/png");
        assert!(n.create_blob_transfer(3, "again").is_err());
        assert!(n.blob_transfer(3).is_some());
        assert!(n.destroy_blob_transfer(3));
        assert!(!n.destroy_blob_transfer(3));

        n.ensure_p2s().unwrap();
        assert!(transfer.peer_connection().await.is_some());
    }
}
