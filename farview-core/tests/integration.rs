//! Integration tests: bind, commit, tick and done-event emission end to
//! end, plus P2S / P2P negotiation between two sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use farview_core::transport::{
    OfferOptions, PeerConnectionState, PeerEventSender, SessionDescription,
};
use farview_core::{
    ClientId, ClientSession, FarviewError, FramePacer, FrameScheduler, GlobalRegistry,
    IceCandidate, NativeClient, NativeDisplay, PacingConfig, PeerConnection,
    PeerConnectionFactory, PeerHandle, Point, Rect, Region, RemoteProxy, RemoteRegistry,
    RtcConfiguration, Scene, SceneGraph, SceneId, SessionTable, Signal, SignalingSink, Size,
    SurfaceId, Telemetry, TransportMode, TransportNegotiator,
};

// ── Fakes ────────────────────────────────────────────────────────

#[derive(Default)]
struct Client {
    id: u64,
    resources: Mutex<Vec<u32>>,
    wire: Mutex<Vec<u8>>,
    flushes: AtomicUsize,
    destroyed: Mutex<Vec<u32>>,
}

impl NativeClient for Client {
    fn id(&self) -> ClientId {
        ClientId(self.id)
    }

    fn create_resource(&self, _interface: &str, _version: u32, id: u32) -> Result<(), FarviewError> {
        self.resources.lock().unwrap().push(id);
        Ok(())
    }

    fn post_error(&self, _resource: u32, _code: u32, _message: &str) {}

    fn send_events(&self, bytes: &[u8]) -> Result<(), FarviewError> {
        self.wire.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&self) -> Result<(), FarviewError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy_resource_silently(&self, id: u32) {
        self.destroyed.lock().unwrap().push(id);
    }
}

#[derive(Default)]
struct Display;

impl NativeDisplay for Display {
    fn create_global(&self, _name: u32, _interface: &str, _version: u32) -> Result<(), FarviewError> {
        Ok(())
    }

    fn destroy_global(&self, _name: u32) {}
}

#[derive(Default)]
struct Remote {
    next: AtomicUsize,
}

impl RemoteRegistry for Remote {
    fn bind(&self, _name: u32, interface: &str, version: u32) -> Result<Arc<RemoteProxy>, FarviewError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) as u32 + 1000;
        Ok(Arc::new(RemoteProxy::new(id, interface, version)))
    }

    fn send_request(&self, _proxy_id: u32, _opcode: u16, _payload: &[u8]) -> Result<(), FarviewError> {
        Ok(())
    }

    fn release(&self, _proxy_id: u32) {}
}

#[derive(Default)]
struct Sink {
    candidates: Mutex<Vec<String>>,
    offers: Mutex<Vec<String>>,
    replies: Mutex<Vec<String>>,
    inits: AtomicUsize,
}

impl SignalingSink for Sink {
    fn server_ice_candidates(&self, description: &str) {
        self.candidates.lock().unwrap().push(description.into());
    }

    fn server_sdp_offer(&self, description: &str) {
        self.offers.lock().unwrap().push(description.into());
    }

    fn server_sdp_reply(&self, description: &str) {
        self.replies.lock().unwrap().push(description.into());
    }

    fn init(&self) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Peer {
    local: Mutex<Option<SessionDescription>>,
}

#[async_trait]
impl PeerConnection for Peer {
    async fn create_offer(&self, _options: OfferOptions) -> Result<SessionDescription, FarviewError> {
        Ok(SessionDescription::offer("v=0 server-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, FarviewError> {
        Ok(SessionDescription::answer("v=0 server-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), FarviewError> {
        *self.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, _description: SessionDescription) -> Result<(), FarviewError> {
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), FarviewError> {
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    fn connection_state(&self) -> PeerConnectionState {
        PeerConnectionState::New
    }

    fn close(&self) {}
}

#[derive(Default)]
struct Factory {
    created: AtomicUsize,
}

impl PeerConnectionFactory for Factory {
    fn create(
        &self,
        _config: &RtcConfiguration,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, FarviewError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        drop(events);
        Ok(Arc::new(Peer::default()))
    }
}

fn transport(sink: Arc<Sink>, factory: Arc<Factory>) -> Arc<TransportNegotiator> {
    TransportNegotiator::new(sink, factory, RtcConfiguration::default())
}

// ── Bind → commit → tick → done ──────────────────────────────────

#[tokio::test]
async fn test_bind_commit_tick_emits_done_records() {
    let sessions = Arc::new(SessionTable::new());
    let registry = GlobalRegistry::new(Arc::new(Display), Arc::clone(&sessions));
    registry.advertise(1, "fv_compositor", 4).unwrap();

    let client = Arc::new(Client {
        id: 1,
        ..Client::default()
    });
    let native: Arc<dyn NativeClient> = client.clone();
    let factory = Arc::new(Factory::default());
    sessions.insert(ClientSession::new(
        Arc::clone(&native),
        Arc::new(Remote::default()),
        transport(Arc::new(Sink::default()), factory),
    ));
    registry.bind(1, ClientId(1), 4, 3).unwrap();
    assert_eq!(*client.resources.lock().unwrap(), vec![3]);

    // surface commit updates the view before callbacks are scheduled
    let mut graph = SceneGraph::new();
    graph.add_scene(Scene::new(
        SceneId(0),
        Region::from_rect(Rect::new(0.0, 0.0, 1920.0, 1080.0)),
    ));
    let surface = SurfaceId(10);
    graph.add_surface(surface);
    graph.set_size(surface, Some(Size::new(640.0, 480.0))).unwrap();
    graph.assign_role(surface).unwrap();
    graph.set_position(surface, Point::new(100.0, 100.0)).unwrap();
    graph.apply_transformations(surface);
    assert_eq!(graph.view(surface).unwrap().relevant_scene(), Some(SceneId(0)));

    let pacer = FramePacer::new(FrameScheduler::new(PacingConfig::default()));
    pacer.commit(&native, vec![7]);
    let feedback = pacer.controller(ClientId(1)).unwrap();
    assert_eq!(feedback.parked_len(), 1);

    // telemetry wakes the parked batch; delay is zero so one tick fires it
    let telemetry = Telemetry {
        refresh_interval_ms: 16,
        processing_duration_ms: 0,
    };
    feedback.on_telemetry(&telemetry.encode()).unwrap();
    assert_eq!(pacer.scheduler().tick(), 1);

    let wire = client.wire.lock().unwrap().clone();
    assert_eq!(wire.len(), 24);
    assert_eq!(&wire[0..8], &[7, 0, 0, 0, 0, 0, 12, 0]);
    assert_eq!(&wire[12..24], &[1, 0, 0, 0, 1, 0, 12, 0, 7, 0, 0, 0]);
    assert_eq!(client.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(*client.destroyed.lock().unwrap(), vec![7]);

    // disconnect: queued work becomes inert
    pacer.commit(&native, vec![8]);
    assert!(pacer.disconnect(ClientId(1)));
    pacer.scheduler().tick();
    assert_eq!(client.wire.lock().unwrap().len(), 24);
}

#[tokio::test]
async fn test_delay_tracks_encoding_cost() {
    let client: Arc<dyn NativeClient> = Arc::new(Client::default());
    let pacer = FramePacer::new(FrameScheduler::new(PacingConfig {
        initial_tick: Duration::from_millis(10),
        ..PacingConfig::default()
    }));
    let feedback = pacer.controller_for(&client);

    let t0 = Instant::now();
    feedback.encoding_done_at(t0 + Duration::from_millis(25), t0);
    feedback
        .on_telemetry_at(
            t0,
            &Telemetry {
                refresh_interval_ms: 10,
                processing_duration_ms: 5,
            }
            .encode(),
        )
        .unwrap();
    assert_eq!(feedback.callback_delay(), Duration::from_millis(25));

    feedback.commit_notify_at(t0, vec![1]);
    assert_eq!(pacer.scheduler().tick(), 0);
    assert_eq!(pacer.scheduler().tick(), 0);
    assert_eq!(pacer.scheduler().tick(), 1);
}

// ── Negotiation ──────────────────────────────────────────────────

#[tokio::test]
async fn test_p2s_offer_answer() {
    let sink = Arc::new(Sink::default());
    let factory = Arc::new(Factory::default());
    let session = transport(Arc::clone(&sink), Arc::clone(&factory));

    session.ensure_p2s().unwrap();
    session.ensure_p2s().unwrap();
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert!(session.on_peer_connection().await.is_some());

    let offer = Signal::Sdp {
        sdp: SessionDescription::offer("v=0 browser"),
    }
    .to_json()
    .unwrap();
    session.on_sdp_offer(&offer).await.unwrap();

    let replies = sink.replies.lock().unwrap().clone();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("server-answer"));
    assert!(replies[0].contains("\"type\":\"answer\""));

    let other = PeerHandle::new(2, Arc::new(Sink::default()));
    assert!(matches!(
        session.ensure_p2p(other),
        Err(FarviewError::InvalidMode(_))
    ));
}

#[tokio::test]
async fn test_p2p_sessions_relay_to_each_other() {
    let left_sink = Arc::new(Sink::default());
    let right_sink = Arc::new(Sink::default());
    let left = transport(Arc::clone(&left_sink), Arc::new(Factory::default()));
    let right = transport(Arc::clone(&right_sink), Arc::new(Factory::default()));

    left.ensure_p2p(PeerHandle::new(2, right_sink.clone())).unwrap();
    right.ensure_p2p(PeerHandle::new(1, left_sink.clone())).unwrap();
    assert_eq!(left.mode(), TransportMode::P2p);
    assert_eq!(left_sink.inits.load(Ordering::SeqCst), 1);

    left.on_sdp_offer(r#"{"sdp":{"type":"offer","sdp":"v=0 a"}}"#)
        .await
        .unwrap();
    right
        .on_sdp_reply(r#"{"sdp":{"type":"answer","sdp":"v=0 b"}}"#)
        .await
        .unwrap();
    left.on_ice_candidates(r#"{"candidate":{"candidate":"c"}}"#)
        .await
        .unwrap();

    assert_eq!(right_sink.offers.lock().unwrap().len(), 1);
    assert_eq!(left_sink.replies.lock().unwrap().len(), 1);
    assert_eq!(right_sink.candidates.lock().unwrap().len(), 1);

    // re-pairing with the same counterpart is a no-op, another one is not
    left.ensure_p2p(PeerHandle::new(2, right_sink.clone())).unwrap();
    assert!(matches!(
        left.ensure_p2p(PeerHandle::new(3, right_sink)),
        Err(FarviewError::InvalidMode(_))
    ));
    assert!(matches!(left.ensure_p2s(), Err(FarviewError::InvalidMode(_))));
}

#[tokio::test]
async fn test_signaling_before_mode_is_rejected() {
    let session = transport(Arc::new(Sink::default()), Arc::new(Factory::default()));
    assert!(matches!(
        session.on_sdp_reply("{}").await,
        Err(FarviewError::NotNegotiated)
    ));
}
