//! Proxy service core logic.
//!
//! Owns the advertised globals, the client session table, the shared
//! frame pacer and the scene graph, and drives the pacing tick loop
//! until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use farview_core::{
    ClientId, ClientSession, FarviewError, FramePacer, FrameScheduler, GlobalRegistry,
    NativeClient, NativeDisplay, PeerConnectionFactory, RemoteRegistry, SceneGraph, SessionTable,
    SignalingSink, TransportNegotiator,
};

use crate::config::ProxyConfig;

// ── ProxyService ─────────────────────────────────────────────────

/// The top-level proxy service.
pub struct ProxyService {
    config: ProxyConfig,
    running: Arc<AtomicBool>,
    sessions: Arc<SessionTable>,
    registry: GlobalRegistry,
    pacer: FramePacer,
    scene: Mutex<SceneGraph>,
}

impl ProxyService {
    /// Create a service advertising on `display`.
    pub fn new(config: ProxyConfig, display: Arc<dyn NativeDisplay>) -> Self {
        let sessions = Arc::new(SessionTable::new());
        let scheduler = FrameScheduler::new(config.to_pacing_config());
        Self {
            registry: GlobalRegistry::new(display, Arc::clone(&sessions)),
            pacer: FramePacer::new(scheduler),
            sessions,
            scene: Mutex::new(SceneGraph::new()),
            running: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    pub fn registry(&self) -> &GlobalRegistry {
        &self.registry
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task or a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Advertise every configured global, numbering names from 1.
    ///
    /// Globals that fail are logged and skipped. Returns how many were
    /// advertised.
    pub fn advertise_globals(&self) -> usize {
        let mut advertised = 0;
        for (entry, name) in self.config.globals.advertise.iter().zip(1u32..) {
            match self.registry.advertise(name, &entry.interface, entry.version) {
                Ok(()) => advertised += 1,
                Err(e) => warn!(interface = %entry.interface, "skipping global: {e}"),
            }
        }
        advertised
    }

    // ── Clients ──────────────────────────────────────────────────

    /// Register a newly connected client and its transport session.
    ///
    /// A session already registered under the same handle is replaced,
    /// and its transport and frame feedback are torn down. Frame feedback
    /// for the new session is created by its first commit carrying frame
    /// callbacks.
    pub fn connect_client(
        &self,
        client: Arc<dyn NativeClient>,
        remote: Arc<dyn RemoteRegistry>,
        sink: Arc<dyn SignalingSink>,
        factory: Arc<dyn PeerConnectionFactory>,
    ) -> Arc<ClientSession> {
        let transport = TransportNegotiator::new(sink, factory, self.config.to_rtc_configuration());
        let session = ClientSession::new(Arc::clone(&client), remote, transport);
        if let Some(old) = self.sessions.insert(Arc::clone(&session)) {
            warn!(client = %old.id(), "replacing existing session");
            old.transport().destroy();
            self.pacer.disconnect(old.id());
        }
        info!(client = %session.id(), "client connected");
        session
    }

    /// Tear down everything held for `client`. Returns `false` if the
    /// client was not connected.
    pub fn disconnect_client(&self, client: ClientId) -> bool {
        let Some(session) = self.sessions.remove(client) else {
            return false;
        };
        session.transport().destroy();
        self.pacer.disconnect(client);
        info!(client = %client, "client disconnected");
        true
    }

    /// Native bind of global `name` by `client`.
    pub fn bind(&self, name: u32, client: ClientId, version: u32, id: u32) -> Result<(), FarviewError> {
        self.registry.bind(name, client, version, id)
    }

    /// A surface commit carrying frame callbacks `callback_ids`.
    pub fn commit(&self, client: ClientId, callback_ids: Vec<u32>) -> Result<(), FarviewError> {
        let session = self
            .sessions
            .get(client)
            .ok_or(FarviewError::NoSession(client))?;
        self.pacer.commit(session.client(), callback_ids);
        Ok(())
    }

    /// A telemetry message from the remote peer of `client`.
    ///
    /// Ignored until the client has committed frame callbacks.
    pub fn telemetry(&self, client: ClientId, data: &[u8]) -> Result<(), FarviewError> {
        if self.sessions.get(client).is_none() {
            return Err(FarviewError::NoSession(client));
        }
        match self.pacer.controller(client) {
            Some(feedback) => feedback.on_telemetry(data),
            None => {
                debug!(client = %client, "telemetry before any frame callback");
                Ok(())
            }
        }
    }

    /// Run `f` with exclusive access to the scene graph.
    pub fn with_scene<R>(&self, f: impl FnOnce(&mut SceneGraph) -> R) -> R {
        let mut scene = self.scene.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut scene)
    }

    // ── Run loop ─────────────────────────────────────────────────

    /// Run the service until stopped.
    ///
    /// 1. Advertises the configured globals.
    /// 2. Spawns the frame scheduler's tick loop.
    /// 3. Waits for `running` to become `false`.
    /// 4. Disconnects every client and withdraws the globals.
    pub async fn run(&self) -> Result<(), FarviewError> {
        self.running.store(true, Ordering::SeqCst);

        let advertised = self.advertise_globals();
        if advertised == 0 && !self.config.globals.advertise.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(FarviewError::Other("no global could be advertised".into()));
        }
        info!("{advertised} globals advertised");

        let scheduler = self.pacer.scheduler().clone();
        let ticker = tokio::spawn(async move { scheduler.run().await });

        Self::wait_for_stop(&self.running).await;

        self.pacer.scheduler().stop();
        ticker.abort();
        if let Err(e) = ticker.await {
            if !e.is_cancelled() {
                error!("frame scheduler task failed: {e}");
            }
        }

        for client in self.sessions.clients() {
            self.disconnect_client(client);
        }
        self.registry.teardown();

        self.running.store(false, Ordering::SeqCst);
        info!("proxy service stopped");
        Ok(())
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

impl std::fmt::Debug for ProxyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyService")
            .field("running", &self.is_running())
            .field("sessions", &self.sessions.len())
            .field("registry", &self.registry)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
