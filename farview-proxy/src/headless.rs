//! Headless native backend.
//!
//! Stands in for a real display server when the proxy runs without
//! one: globals, resources and event records are tracked in memory and
//! traced, so the pacing loop and session plumbing can run end to end.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use farview_core::transport::PeerEventSender;
use farview_core::{
    ClientId, FarviewError, NativeClient, NativeDisplay, PeerConnection, PeerConnectionFactory,
    RemoteProxy, RemoteRegistry, RtcConfiguration, SignalingSink,
};
use tracing::{debug, info, trace, warn};

// ── Display ──────────────────────────────────────────────────────

/// Keeps advertised globals in a table.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    globals: Mutex<BTreeMap<u32, (String, u32)>>,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> Vec<(u32, String, u32)> {
        self.globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, (interface, version))| (*name, interface.clone(), *version))
            .collect()
    }
}

impl NativeDisplay for HeadlessDisplay {
    fn create_global(&self, name: u32, interface: &str, version: u32) -> Result<(), FarviewError> {
        let mut globals = self.globals.lock().unwrap_or_else(PoisonError::into_inner);
        if globals.contains_key(&name) {
            return Err(FarviewError::Native(format!("global {name} already exists")));
        }
        debug!(name, interface, version, "global created");
        globals.insert(name, (interface.to_string(), version));
        Ok(())
    }

    fn destroy_global(&self, name: u32) {
        if self
            .globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name)
            .is_some()
        {
            debug!(name, "global destroyed");
        }
    }
}

// ── Client ───────────────────────────────────────────────────────

/// A client connection that counts what would have gone on the wire.
#[derive(Debug)]
pub struct HeadlessClient {
    id: ClientId,
    resources: Mutex<HashSet<u32>>,
    bytes_sent: AtomicU64,
    flushes: AtomicU64,
}

impl HeadlessClient {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            resources: Mutex::new(HashSet::new()),
            bytes_sent: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn has_resource(&self, id: u32) -> bool {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

impl NativeClient for HeadlessClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn create_resource(&self, interface: &str, version: u32, id: u32) -> Result<(), FarviewError> {
        let inserted = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if !inserted {
            return Err(FarviewError::Native(format!("resource {id} already in use")));
        }
        trace!(client = %self.id, interface, version, id, "resource created");
        Ok(())
    }

    fn post_error(&self, resource: u32, code: u32, message: &str) {
        warn!(client = %self.id, resource, code, "protocol error: {message}");
    }

    fn send_events(&self, bytes: &[u8]) -> Result<(), FarviewError> {
        self.bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<(), FarviewError> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn destroy_resource_silently(&self, id: u32) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

// ── Remote side ──────────────────────────────────────────────────

/// Hands out proxy ids locally; requests are only traced.
#[derive(Debug, Default)]
pub struct LoopbackRegistry {
    next_id: AtomicU32,
}

impl RemoteRegistry for LoopbackRegistry {
    fn bind(&self, name: u32, interface: &str, version: u32) -> Result<Arc<RemoteProxy>, FarviewError> {
        // ids below 2 belong to the remote display and registry
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 2;
        trace!(name, interface, version, proxy = id, "remote proxy bound");
        Ok(Arc::new(RemoteProxy::new(id, interface, version)))
    }

    fn send_request(&self, proxy_id: u32, opcode: u16, payload: &[u8]) -> Result<(), FarviewError> {
        trace!(proxy = proxy_id, opcode, len = payload.len(), "remote request");
        Ok(())
    }

    fn release(&self, proxy_id: u32) {
        trace!(proxy = proxy_id, "remote proxy released");
    }
}

/// Logs outbound signaling.
#[derive(Debug)]
pub struct TracingSignaling {
    client: ClientId,
}

impl TracingSignaling {
    pub fn new(client: ClientId) -> Self {
        Self { client }
    }
}

impl SignalingSink for TracingSignaling {
    fn server_ice_candidates(&self, description: &str) {
        debug!(client = %self.client, "ice candidates → {description}");
    }

    fn server_sdp_offer(&self, description: &str) {
        debug!(client = %self.client, "sdp offer → {description}");
    }

    fn server_sdp_reply(&self, description: &str) {
        debug!(client = %self.client, "sdp reply → {description}");
    }

    fn init(&self) {
        info!(client = %self.client, "peer-to-peer signaling ready");
    }
}

/// No media stack is linked in: peer-to-server mode is refused.
#[derive(Debug, Default)]
pub struct NoPeerConnections;

impl PeerConnectionFactory for NoPeerConnections {
    fn create(
        &self,
        config: &RtcConfiguration,
        _events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>, FarviewError> {
        warn!(servers = config.ice_servers.len(), "no peer-connection backend available");
        Err(FarviewError::PeerConnection(
            "no peer-connection backend available".into(),
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────────
