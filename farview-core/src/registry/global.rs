//! Advertised globals and the bind sequence.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::error::FarviewError;
use crate::lock;
use crate::native::{ClientId, NativeDisplay};
use crate::registry::handlers::{HandlerSet, classify};
use crate::registry::session::{ResourcePair, SessionTable};

// ── GlobalDescriptor ─────────────────────────────────────────────

/// An advertised capability: `(name, interface, version)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDescriptor {
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

// ── ShimGlobal ───────────────────────────────────────────────────

/// A global whose binds produce a local adapter / remote shim pair.
#[derive(Debug, Clone)]
pub struct ShimGlobal {
    descriptor: GlobalDescriptor,
    handlers: &'static HandlerSet,
}

impl ShimGlobal {
    /// Classify `descriptor.interface` and build the global.
    pub fn new(descriptor: GlobalDescriptor) -> Result<Self, FarviewError> {
        let handlers = classify(&descriptor.interface)?;
        Ok(Self {
            descriptor,
            handlers,
        })
    }

    pub fn descriptor(&self) -> &GlobalDescriptor {
        &self.descriptor
    }

    pub fn handlers(&self) -> &'static HandlerSet {
        self.handlers
    }

    /// Bind this global for `client` as native resource `id`.
    ///
    /// 1. Resolve the client's transport session.
    /// 2. Bind a remote proxy through the session's remote registry.
    /// 3. Build the local adapter.
    /// 4. Build the remote shim around the proxy.
    /// 5. Create the native resource owned by the adapter.
    /// 6. Route remote errors on the proxy to the native resource.
    pub fn bind(
        &self,
        sessions: &SessionTable,
        client: ClientId,
        version: u32,
        id: u32,
    ) -> Result<(), FarviewError> {
        let session = sessions.get(client).ok_or(FarviewError::NoSession(client))?;

        let proxy = session.remote_registry().bind(
            self.descriptor.name,
            &self.descriptor.interface,
            version,
        )?;

        let mut adapter = self.handlers.create_local_adapter(Arc::clone(&session));
        let shim = self
            .handlers
            .create_shim(Arc::clone(&proxy), Arc::clone(&session));

        if let Err(e) = self
            .handlers
            .create_wire_resource(session.client().as_ref(), version, id)
        {
            session.remote_registry().release(proxy.id());
            return Err(e);
        }
        adapter.set_resource(id);

        let native = Arc::clone(session.client());
        proxy.on_error(move |code, message| native.post_error(id, code, message));

        session.insert_resource(id, ResourcePair { adapter, shim });
        Ok(())
    }
}

// ── GlobalRegistry ───────────────────────────────────────────────

/// Every global advertised on the native display.
pub struct GlobalRegistry {
    display: Arc<dyn NativeDisplay>,
    sessions: Arc<SessionTable>,
    globals: Mutex<BTreeMap<u32, ShimGlobal>>,
}

impl GlobalRegistry {
    pub fn new(display: Arc<dyn NativeDisplay>, sessions: Arc<SessionTable>) -> Self {
        Self {
            display,
            sessions,
            globals: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Advertise `interface` under `name`. Unsupported interfaces are
    /// rejected before anything reaches the display.
    pub fn advertise(&self, name: u32, interface: &str, version: u32) -> Result<(), FarviewError> {
        let global = ShimGlobal::new(GlobalDescriptor {
            name,
            interface: interface.to_string(),
            version,
        })?;
        self.display
            .create_global(name, global.handlers().native_interface, version)?;
        info!(name, interface, version, "global advertised");
        lock(&self.globals).insert(name, global);
        Ok(())
    }

    /// Withdraw the global under `name`. Returns `false` if unknown.
    pub fn remove(&self, name: u32) -> bool {
        let removed = lock(&self.globals).remove(&name);
        if removed.is_some() {
            self.display.destroy_global(name);
        }
        removed.is_some()
    }

    /// Withdraw every global.
    pub fn teardown(&self) {
        let globals = std::mem::take(&mut *lock(&self.globals));
        for name in globals.keys() {
            self.display.destroy_global(*name);
        }
    }

    pub fn descriptors(&self) -> Vec<GlobalDescriptor> {
        lock(&self.globals)
            .values()
            .map(|g| g.descriptor().clone())
            .collect()
    }

    /// Entry point for a native bind of global `name`.
    ///
    /// Failures are logged and returned to the caller; they never take
    /// down other clients.
    pub fn bind(&self, name: u32, client: ClientId, version: u32, id: u32) -> Result<(), FarviewError> {
        let global = lock(&self.globals)
            .get(&name)
            .cloned()
            .ok_or_else(|| FarviewError::Native(format!("no global named {name}")))?;

        global
            .bind(&self.sessions, client, version, id)
            .inspect_err(|e| {
                error!(
                    client = %client,
                    interface = %global.descriptor().interface,
                    resource = id,
                    "bind failed: {e}"
                );
            })
    }
}

impl std::fmt::Debug for GlobalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRegistry")
            .field("globals", &lock(&self.globals).len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
