//! Client-to-controller table in front of the shared scheduler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::native::{ClientId, NativeClient};
use crate::pacing::feedback::FrameFeedback;
use crate::pacing::scheduler::FrameScheduler;
use crate::{read, write};

/// Owns one [`FrameFeedback`] per client, all sharing one scheduler.
pub struct FramePacer {
    scheduler: FrameScheduler,
    controllers: RwLock<HashMap<ClientId, Arc<FrameFeedback>>>,
}

impl FramePacer {
    pub fn new(scheduler: FrameScheduler) -> Self {
        Self {
            scheduler,
            controllers: RwLock::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn controller(&self, client: ClientId) -> Option<Arc<FrameFeedback>> {
        read(&self.controllers).get(&client).cloned()
    }

    /// The client's controller, created on first use.
    pub fn controller_for(&self, client: &Arc<dyn NativeClient>) -> Arc<FrameFeedback> {
        let id = client.id();
        if let Some(existing) = self.controller(id) {
            return existing;
        }
        write(&self.controllers)
            .entry(id)
            .or_insert_with(|| {
                debug!(client = %id, "creating frame feedback");
                FrameFeedback::new(Arc::clone(client), self.scheduler.clone())
            })
            .clone()
    }

    /// Surface commit carrying frame callbacks.
    pub fn commit(&self, client: &Arc<dyn NativeClient>, callback_ids: Vec<u32>) {
        if callback_ids.is_empty() {
            return;
        }
        self.controller_for(client).commit_notify(callback_ids);
    }

    /// Destroy and forget the client's controller.
    pub fn disconnect(&self, client: ClientId) -> bool {
        match write(&self.controllers).remove(&client) {
            Some(controller) => {
                controller.destroy();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        read(&self.controllers).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.controllers).is_empty()
    }
}

impl std::fmt::Debug for FramePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePacer")
            .field("scheduler", &self.scheduler)
            .field("clients", &self.len())
            .finish()
    }
}
