//! Client sessions and the resource pairs bound inside them.
//!
//! A [`ClientSession`] ties one native client connection to its remote
//! object registry and its transport negotiator. Sessions are owned by
//! the connecting infrastructure and only looked up here, through the
//! [`SessionTable`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, warn};

use crate::error::FarviewError;
use crate::native::{ClientId, NativeClient};
use crate::registry::handlers::GlobalKind;
use crate::transport::TransportNegotiator;
use crate::{lock, read, write};

type ErrorHook = Arc<dyn Fn(u32, &str) + Send + Sync>;

// ── RemoteRegistry ───────────────────────────────────────────────

/// The remote peer's object registry, reached through the session transport.
pub trait RemoteRegistry: Send + Sync {
    /// Bind a remote proxy for global `name` of `interface` at `version`.
    fn bind(&self, name: u32, interface: &str, version: u32) -> Result<Arc<RemoteProxy>, FarviewError>;

    /// Send a request on remote object `proxy_id`.
    fn send_request(&self, proxy_id: u32, opcode: u16, payload: &[u8]) -> Result<(), FarviewError>;

    /// Drop remote proxy `proxy_id` that never got a native counterpart.
    fn release(&self, proxy_id: u32);
}

// ── RemoteProxy ──────────────────────────────────────────────────

/// Client-side handle to an object living on the remote peer.
pub struct RemoteProxy {
    id: u32,
    interface: String,
    version: u32,
    on_error: Mutex<Option<ErrorHook>>,
}

impl RemoteProxy {
    pub fn new(id: u32, interface: impl Into<String>, version: u32) -> Self {
        Self {
            id,
            interface: interface.into(),
            version,
            on_error: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Install the hook invoked when the remote side reports an error
    /// on this object. Replaces any previous hook.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(u32, &str) + Send + Sync + 'static,
    {
        *lock(&self.on_error) = Some(Arc::new(hook));
    }

    /// Remove the error hook.
    pub fn clear_error_hook(&self) {
        lock(&self.on_error).take();
    }

    /// Deliver a remote error on this object.
    ///
    /// The hook runs without the hook lock held, so it may replace or
    /// clear itself.
    pub fn raise_error(&self, code: u32, message: &str) {
        let hook = lock(&self.on_error).clone();
        match hook {
            Some(hook) => hook(code, message),
            None => warn!(proxy = self.id, code, "remote error with no hook: {message}"),
        }
    }
}

impl std::fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("id", &self.id)
            .field("interface", &self.interface)
            .field("version", &self.version)
            .finish()
    }
}

// ── LocalAdapter ─────────────────────────────────────────────────

/// Native-facing half of a resource pair; owner of the native resource.
#[derive(Debug)]
pub struct LocalAdapter {
    kind: GlobalKind,
    session: Weak<ClientSession>,
    resource: Option<u32>,
}

impl LocalAdapter {
    pub(crate) fn new(kind: GlobalKind, session: Arc<ClientSession>) -> Self {
        Self {
            kind,
            session: Arc::downgrade(&session),
            resource: None,
        }
    }

    pub fn kind(&self) -> GlobalKind {
        self.kind
    }

    /// The native resource this adapter owns, once created.
    pub fn resource(&self) -> Option<u32> {
        self.resource
    }

    pub(crate) fn set_resource(&mut self, id: u32) {
        self.resource = Some(id);
    }

    /// Post a protocol error on the owned native resource.
    pub fn post_error(&self, code: u32, message: &str) {
        let (Some(resource), Some(session)) = (self.resource, self.session.upgrade()) else {
            return;
        };
        session.client().post_error(resource, code, message);
    }
}

// ── RemoteShim ───────────────────────────────────────────────────

/// Remote-facing half of a resource pair: forwards native requests to
/// the remote proxy over the session.
#[derive(Debug)]
pub struct RemoteShim {
    kind: GlobalKind,
    proxy: Arc<RemoteProxy>,
    session: Weak<ClientSession>,
}

impl RemoteShim {
    pub(crate) fn new(kind: GlobalKind, proxy: Arc<RemoteProxy>, session: Arc<ClientSession>) -> Self {
        Self {
            kind,
            proxy,
            session: Arc::downgrade(&session),
        }
    }

    pub fn kind(&self) -> GlobalKind {
        self.kind
    }

    pub fn proxy(&self) -> &Arc<RemoteProxy> {
        &self.proxy
    }

    /// Forward a request to the remote object.
    pub fn forward(&self, opcode: u16, payload: &[u8]) -> Result<(), FarviewError> {
        let session = self.session.upgrade().ok_or(FarviewError::ChannelClosed)?;
        session
            .remote_registry()
            .send_request(self.proxy.id(), opcode, payload)
    }
}

// ── ResourcePair ─────────────────────────────────────────────────

/// One bound protocol object: adapter and shim live and die together.
#[derive(Debug)]
pub struct ResourcePair {
    pub adapter: LocalAdapter,
    pub shim: RemoteShim,
}

impl Drop for ResourcePair {
    fn drop(&mut self) {
        self.shim.proxy().clear_error_hook();
    }
}

// ── ClientSession ────────────────────────────────────────────────

/// One native client connection paired with its transport session.
pub struct ClientSession {
    client: Arc<dyn NativeClient>,
    remote_registry: Arc<dyn RemoteRegistry>,
    transport: Arc<TransportNegotiator>,
    resources: Mutex<HashMap<u32, ResourcePair>>,
}

impl ClientSession {
    pub fn new(
        client: Arc<dyn NativeClient>,
        remote_registry: Arc<dyn RemoteRegistry>,
        transport: Arc<TransportNegotiator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            remote_registry,
            transport,
            resources: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> ClientId {
        self.client.id()
    }

    pub fn client(&self) -> &Arc<dyn NativeClient> {
        &self.client
    }

    pub fn remote_registry(&self) -> &Arc<dyn RemoteRegistry> {
        &self.remote_registry
    }

    pub fn transport(&self) -> &Arc<TransportNegotiator> {
        &self.transport
    }

    pub(crate) fn insert_resource(&self, id: u32, pair: ResourcePair) {
        lock(&self.resources).insert(id, pair);
    }

    /// Drop the resource pair bound to native resource `id`.
    ///
    /// Returns `false` if no pair was bound under that id.
    pub fn destroy_resource(&self, id: u32) -> bool {
        let removed = lock(&self.resources).remove(&id);
        if removed.is_some() {
            debug!(client = %self.id(), resource = id, "resource pair destroyed");
        }
        removed.is_some()
    }

    /// Run `f` against the resource pair bound to `id`.
    pub fn with_resource<R>(&self, id: u32, f: impl FnOnce(&ResourcePair) -> R) -> Option<R> {
        lock(&self.resources).get(&id).map(f)
    }

    /// Number of live resource pairs.
    pub fn resource_count(&self) -> usize {
        lock(&self.resources).len()
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("client", &self.id())
            .field("resources", &self.resource_count())
            .finish()
    }
}

// ── SessionTable ─────────────────────────────────────────────────

/// Lookup from native client handle to its session.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<ClientId, Arc<ClientSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session`, returning any session it replaced.
    pub fn insert(&self, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        write(&self.sessions).insert(session.id(), session)
    }

    pub fn get(&self, client: ClientId) -> Option<Arc<ClientSession>> {
        read(&self.sessions).get(&client).cloned()
    }

    pub fn remove(&self, client: ClientId) -> Option<Arc<ClientSession>> {
        write(&self.sessions).remove(&client)
    }

    /// Handles of every registered client.
    pub fn clients(&self) -> Vec<ClientId> {
        read(&self.sessions).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeFactory, FakeRemoteRegistry, RecordingNativeClient, RecordingSink};
    use crate::transport::RtcConfiguration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(id: u64) -> Arc<ClientSession> {
        let transport = TransportNegotiator::new(
            Arc::new(RecordingSink::default()),
            Arc::new(FakeFactory::default()),
            RtcConfiguration::default(),
        );
        ClientSession::new(
            Arc::new(RecordingNativeClient::new(ClientId(id))),
            Arc::new(FakeRemoteRegistry::default()),
            transport,
        )
    }

    #[test]
    fn table_insert_replace_remove() {
        let table = SessionTable::new();
        assert!(table.insert(session(1)).is_none());
        assert!(table.insert(session(2)).is_none());
        assert!(table.insert(session(1)).is_some());
        assert_eq!(table.len(), 2);

        let mut clients = table.clients();
        clients.sort();
        assert_eq!(clients, vec![ClientId(1), ClientId(2)]);

        assert!(table.remove(ClientId(1)).is_some());
        assert!(table.get(ClientId(1)).is_none());
        assert_eq!(table.clients(), vec![ClientId(2)]);
    }

    #[test]
    fn hook_may_clear_itself() {
        let proxy = Arc::new(RemoteProxy::new(6, "wl_output", 1));
        let calls = Arc::new(AtomicUsize::new(0));
        let (weak, counter) = (Arc::downgrade(&proxy), Arc::clone(&calls));
        proxy.on_error(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(proxy) = weak.upgrade() {
                proxy.clear_error_hook();
            }
        });

        proxy.raise_error(2, "gone");
        proxy.raise_error(2, "gone again");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn proxy_error_without_hook_is_dropped() {
        let proxy = RemoteProxy::new(5, "wl_seat", 1);
        proxy.raise_error(1, "nobody listening");
        proxy.on_error(|_, _| panic!("cleared hook must not run"));
        proxy.clear_error_hook();
        proxy.raise_error(1, "still nobody");
        assert_eq!(proxy.interface(), "wl_seat");
    }
}
