//! In-memory fakes for the native and peer-connection seams.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::FarviewError;
use crate::lock;
use crate::native::{ClientId, NativeClient, NativeDisplay};
use crate::registry::{RemoteProxy, RemoteRegistry};
use crate::transport::peer::{
    OfferOptions, PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEventSender,
    RtcConfiguration, SignalingSink,
};
use crate::transport::signal::{IceCandidate, SessionDescription};

// ── Native ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNativeClient {
    id: u64,
    pub resources: Mutex<Vec<(String, u32, u32)>>,
    pub errors: Mutex<Vec<(u32, u32, String)>>,
    sent: Mutex<Vec<Vec<u8>>>,
    flushes: AtomicUsize,
    destroyed: Mutex<Vec<u32>>,
    pub fail_create: AtomicBool,
}

impl RecordingNativeClient {
    pub fn new(id: ClientId) -> Self {
        Self {
            id: id.0,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.sent).clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> Vec<u32> {
        lock(&self.destroyed).clone()
    }

    pub fn errors(&self) -> Vec<(u32, u32, String)> {
        lock(&self.errors).clone()
    }

    pub fn resources(&self) -> Vec<(String, u32, u32)> {
        lock(&self.resources).clone()
    }
}

impl NativeClient for RecordingNativeClient {
    fn id(&self) -> ClientId {
        ClientId(self.id)
    }

    fn create_resource(&self, interface: &str, version: u32, id: u32) -> Result<(), FarviewError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FarviewError::Native("out of ids".into()));
        }
        lock(&self.resources).push((interface.to_string(), version, id));
        Ok(())
    }

    fn post_error(&self, resource: u32, code: u32, message: &str) {
        lock(&self.errors).push((resource, code, message.to_string()));
    }

    fn send_events(&self, bytes: &[u8]) -> Result<(), FarviewError> {
        lock(&self.sent).push(bytes.to_vec());
        Ok(())
    }

    fn flush(&self) -> Result<(), FarviewError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy_resource_silently(&self, id: u32) {
        lock(&self.destroyed).push(id);
    }
}

#[derive(Default)]
pub struct FakeDisplay {
    pub globals: Mutex<Vec<(u32, String, u32)>>,
    pub destroyed: Mutex<Vec<u32>>,
}

impl NativeDisplay for FakeDisplay {
    fn create_global(&self, name: u32, interface: &str, version: u32) -> Result<(), FarviewError> {
        lock(&self.globals).push((name, interface.to_string(), version));
        Ok(())
    }

    fn destroy_global(&self, name: u32) {
        lock(&self.destroyed).push(name);
    }
}

#[derive(Default)]
pub struct FakeRemoteRegistry {
    next_id: AtomicU32,
    pub proxies: Mutex<Vec<Arc<RemoteProxy>>>,
    pub requests: Mutex<Vec<(u32, u16, Vec<u8>)>>,
    pub fail_bind: AtomicBool,
    released: Mutex<Vec<u32>>,
}

impl FakeRemoteRegistry {
    pub fn released(&self) -> Vec<u32> {
        lock(&self.released).clone()
    }

    pub fn last_proxy(&self) -> Option<Arc<RemoteProxy>> {
        lock(&self.proxies).last().cloned()
    }
}

impl RemoteRegistry for FakeRemoteRegistry {
    fn bind(&self, name: u32, interface: &str, version: u32) -> Result<Arc<RemoteProxy>, FarviewError> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(FarviewError::Other(format!("remote refused global {name}")));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        let proxy = Arc::new(RemoteProxy::new(id, interface, version));
        lock(&self.proxies).push(Arc::clone(&proxy));
        Ok(proxy)
    }

    fn send_request(&self, proxy_id: u32, opcode: u16, payload: &[u8]) -> Result<(), FarviewError> {
        lock(&self.requests).push((proxy_id, opcode, payload.to_vec()));
        Ok(())
    }

    fn release(&self, proxy_id: u32) {
        lock(&self.released).push(proxy_id);
    }
}

// ── Peer connection ──────────────────────────────────────────────

#[derive(Default)]
pub struct FakePeerConnection {
    pub remote: Mutex<Vec<SessionDescription>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub offers: Mutex<Vec<OfferOptions>>,
    pub closed: AtomicBool,
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, FarviewError> {
        lock(&self.offers).push(options);
        Ok(SessionDescription::offer("v=0 local-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, FarviewError> {
        Ok(SessionDescription::answer("v=0 local-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), FarviewError> {
        *lock(&self.local) = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), FarviewError> {
        lock(&self.remote).push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), FarviewError> {
        lock(&self.candidates).push(candidate);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.local).clone()
    }

    fn connection_state(&self) -> PeerConnectionState {
        if self.closed.load(Ordering::SeqCst) {
            PeerConnectionState::Closed
        } else {
            PeerConnectionState::New
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub created: AtomicUsize,
    last: Mutex<Option<(Arc<FakePeerConnection>, PeerEventSender)>>,
}

impl FakeFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn peer(&self) -> Option<Arc<FakePeerConnection>> {
        lock(&self.last).as_ref().map(|(peer, _)| Arc::clone(peer))
    }

    pub fn events(&self) -> Option<PeerEventSender> {
        lock(&self.last).as_ref().map(|(_, tx)| tx.clone())
    }
}

impl PeerConnectionFactory for FakeFactory {
    fn create(
        &self,
        _config: &RtcConfiguration,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, FarviewError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let peer = Arc::new(FakePeerConnection::default());
        *lock(&self.last) = Some((Arc::clone(&peer), events));
        Ok(peer)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub candidates: Mutex<Vec<String>>,
    pub offers: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<String>>,
    pub inits: AtomicUsize,
}

impl RecordingSink {
    pub fn candidates(&self) -> Vec<String> {
        lock(&self.candidates).clone()
    }

    pub fn offers(&self) -> Vec<String> {
        lock(&self.offers).clone()
    }

    pub fn replies(&self) -> Vec<String> {
        lock(&self.replies).clone()
    }
}

impl SignalingSink for RecordingSink {
    fn server_ice_candidates(&self, description: &str) {
        lock(&self.candidates).push(description.to_string());
    }

    fn server_sdp_offer(&self, description: &str) {
        lock(&self.offers).push(description.to_string());
    }

    fn server_sdp_reply(&self, description: &str) {
        lock(&self.replies).push(description.to_string());
    }

    fn init(&self) {
        self.inits.fetch_add(1, Ordering::SeqCst);
    }
}
