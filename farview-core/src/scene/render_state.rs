//! Render targets and per-(view, scene) render state.

use std::fmt;

use tracing::trace;

use crate::geometry::{Region, Size};

/// Identity of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u32);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// A render target (an output) and its visible extent.
///
/// GPU context and shaders live with the renderer; the scene graph only
/// reads the id and region.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    id: SceneId,
    region: Region,
}

impl Scene {
    pub fn new(id: SceneId, region: Region) -> Self {
        Self { id, region }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub(crate) fn set_region(&mut self, region: Region) {
        self.region = region;
    }
}

/// Backing store handle. Its size is fixed at allocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackingStore {
    pub size: Size,
}

/// Cached visible region and backing store of one view on one scene.
///
/// Only exists while the view and the scene intersect.
#[derive(Debug)]
pub struct RenderState {
    scene: SceneId,
    visible: Region,
    backing: BackingStore,
}

impl RenderState {
    pub(crate) fn new(scene: SceneId, visible: Region, buffer_size: Size) -> Self {
        trace!(%scene, ?buffer_size, "render state allocated");
        Self {
            scene,
            visible,
            backing: BackingStore { size: buffer_size },
        }
    }

    pub fn scene(&self) -> SceneId {
        self.scene
    }

    /// The part of the scene this view covers.
    pub fn visible_region(&self) -> &Region {
        &self.visible
    }

    pub fn backing(&self) -> BackingStore {
        self.backing
    }

    pub(crate) fn update_visible(&mut self, visible: &Region) {
        self.visible.copy_from(visible);
    }

    pub(crate) fn destroy(self) {
        trace!(scene = %self.scene, "render state released");
    }
}
