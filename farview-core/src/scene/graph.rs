//! Surface tree and the views hanging off it.
//!
//! ```text
//!   SceneGraph
//!   ├── scenes:   SceneId   → Scene { region }
//!   └── surfaces: SurfaceId → SurfaceNode
//!                             ├── parent / children
//!                             ├── position, size, buffer size
//!                             └── view: Option<View>   (set on role assignment)
//! ```
//!
//! A view's parent is never stored: it is the view of its surface's
//! parent surface, looked up on demand. The effective dirty state walks
//! that chain and costs O(depth).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::debug;

use crate::error::FarviewError;
use crate::geometry::{Mat4, Point, Region, Size};
use crate::scene::render_state::{Scene, SceneId};
use crate::scene::view::View;

/// Identity of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct SurfaceNode {
    parent: Option<SurfaceId>,
    children: Vec<SurfaceId>,
    position: Point,
    size: Option<Size>,
    buffer_size: Option<Size>,
    view: Option<View>,
}

/// Owns surfaces, their views, and the known scenes.
#[derive(Debug, Default)]
pub struct SceneGraph {
    surfaces: HashMap<SurfaceId, SurfaceNode>,
    scenes: BTreeMap<SceneId, Scene>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scenes ───────────────────────────────────────────────────

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    /// Add or replace a scene. Every view is marked dirty.
    pub fn add_scene(&mut self, scene: Scene) {
        debug!(scene = %scene.id(), "scene added");
        self.scenes.insert(scene.id(), scene);
        self.mark_all_dirty();
    }

    pub fn remove_scene(&mut self, id: SceneId) -> Option<Scene> {
        let removed = self.scenes.remove(&id);
        if removed.is_some() {
            debug!(scene = %id, "scene removed");
            self.mark_all_dirty();
        }
        removed
    }

    pub fn set_scene_region(&mut self, id: SceneId, region: Region) -> bool {
        let Some(scene) = self.scenes.get_mut(&id) else {
            return false;
        };
        scene.set_region(region);
        self.mark_all_dirty();
        true
    }

    fn mark_all_dirty(&mut self) {
        for node in self.surfaces.values_mut() {
            if let Some(view) = node.view.as_mut() {
                view.mark_dirty();
            }
        }
    }

    // ── Surfaces ─────────────────────────────────────────────────

    /// Returns `false` if the surface already exists.
    pub fn add_surface(&mut self, id: SurfaceId) -> bool {
        if self.surfaces.contains_key(&id) {
            return false;
        }
        self.surfaces.insert(id, SurfaceNode::default());
        true
    }

    /// Destroy a surface and its view. Children become roots.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> bool {
        let Some(mut node) = self.surfaces.remove(&id) else {
            return false;
        };
        if let Some(view) = node.view.as_mut() {
            view.destroy();
        }
        if let Some(parent) = node.parent.and_then(|p| self.surfaces.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in node.children {
            if let Some(child) = self.surfaces.get_mut(&child) {
                child.parent = None;
                if let Some(view) = child.view.as_mut() {
                    view.mark_dirty();
                }
            }
        }
        true
    }

    pub fn contains_surface(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    pub fn parent(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.surfaces.get(&id)?.parent
    }

    pub fn children(&self, id: SurfaceId) -> &[SurfaceId] {
        self.surfaces
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Re-parent `child` under `parent` (or make it a root).
    pub fn set_parent(
        &mut self,
        child: SurfaceId,
        parent: Option<SurfaceId>,
    ) -> Result<(), FarviewError> {
        if !self.surfaces.contains_key(&child) {
            return Err(FarviewError::UnknownSurface(child));
        }
        if let Some(parent) = parent {
            if !self.surfaces.contains_key(&parent) {
                return Err(FarviewError::UnknownSurface(parent));
            }
            let mut ancestor = Some(parent);
            while let Some(current) = ancestor {
                if current == child {
                    return Err(FarviewError::SurfaceCycle(child));
                }
                ancestor = self.parent(current);
            }
        }

        let old = self.parent(child);
        if old == parent {
            return Ok(());
        }
        if let Some(old) = old.and_then(|p| self.surfaces.get_mut(&p)) {
            old.children.retain(|c| *c != child);
        }
        if let Some(new) = parent.and_then(|p| self.surfaces.get_mut(&p)) {
            new.children.push(child);
        }
        self.mark_surface_dirty(child, |node| node.parent = parent)
    }

    /// Position relative to the parent surface.
    pub fn set_position(&mut self, id: SurfaceId, position: Point) -> Result<(), FarviewError> {
        self.mark_surface_dirty(id, |node| node.position = position)
    }

    /// Logical size; `None` while no buffer is attached.
    pub fn set_size(&mut self, id: SurfaceId, size: Option<Size>) -> Result<(), FarviewError> {
        self.mark_surface_dirty(id, |node| node.size = size)
    }

    /// Size of the attached buffer, used when allocating render states.
    pub fn set_buffer_size(&mut self, id: SurfaceId, size: Option<Size>) -> Result<(), FarviewError> {
        let node = self
            .surfaces
            .get_mut(&id)
            .ok_or(FarviewError::UnknownSurface(id))?;
        node.buffer_size = size;
        Ok(())
    }

    pub fn surface_size(&self, id: SurfaceId) -> Option<Size> {
        self.surfaces.get(&id)?.size
    }

    fn mark_surface_dirty(
        &mut self,
        id: SurfaceId,
        update: impl FnOnce(&mut SurfaceNode),
    ) -> Result<(), FarviewError> {
        let node = self
            .surfaces
            .get_mut(&id)
            .ok_or(FarviewError::UnknownSurface(id))?;
        update(node);
        if let Some(view) = node.view.as_mut() {
            view.mark_dirty();
        }
        Ok(())
    }

    // ── Views ────────────────────────────────────────────────────

    /// Give the surface a role, creating its view.
    pub fn assign_role(&mut self, id: SurfaceId) -> Result<&mut View, FarviewError> {
        let node = self
            .surfaces
            .get_mut(&id)
            .ok_or(FarviewError::UnknownSurface(id))?;
        Ok(node.view.get_or_insert_with(View::new))
    }

    pub fn view(&self, id: SurfaceId) -> Option<&View> {
        self.surfaces.get(&id)?.view.as_ref()
    }

    pub fn view_mut(&mut self, id: SurfaceId) -> Option<&mut View> {
        self.surfaces.get_mut(&id)?.view.as_mut()
    }

    /// Surface whose view is this view's parent.
    pub fn parent_view(&self, id: SurfaceId) -> Option<SurfaceId> {
        let parent = self.parent(id)?;
        self.view(parent).map(|_| parent)
    }

    /// Own flag or any ancestor view's flag. O(depth).
    pub fn is_dirty(&self, id: SurfaceId) -> bool {
        let mut current = Some(id);
        while let Some(surface) = current {
            match self.view(surface) {
                // a destroyed view never recomputes, so it cannot dirty its subtree
                Some(view) if view.is_destroyed() => return false,
                Some(view) if view.own_dirty() => return true,
                Some(_) => current = self.parent_view(surface),
                None => return false,
            }
        }
        false
    }

    /// Recompute transform, region and render states if dirty, then
    /// recurse into child views.
    ///
    /// The tree must not change while this runs, including from inside
    /// a transformation listener.
    pub fn apply_transformations(&mut self, id: SurfaceId) {
        match self.view(id) {
            Some(view) if !view.is_destroyed() => {}
            _ => return,
        }
        if !self.is_dirty(id) {
            return;
        }

        let parent_transform = self
            .parent_view(id)
            .and_then(|p| self.view(p))
            .map_or(Mat4::IDENTITY, View::transform);

        let Self { surfaces, scenes } = self;
        let Some(node) = surfaces.get_mut(&id) else {
            return;
        };
        let (position, size, buffer_size) = (node.position, node.size, node.buffer_size);
        let children: Vec<SurfaceId> =
            node.children.iter().copied().filter(|c| *c != id).collect();
        let Some(view) = node.view.as_mut() else {
            return;
        };
        let transform = view.compute_transform(parent_transform, position);
        view.set_transform(transform);
        view.update_region(size, buffer_size, scenes.values());

        for child in children {
            self.apply_transformations(child);
        }

        if let Some(view) = self.view_mut(id) {
            view.finish_transformations();
        }
    }

    /// Destroy only the view, keeping the surface.
    pub fn destroy_view(&mut self, id: SurfaceId) -> bool {
        match self.view_mut(id) {
            Some(view) if !view.is_destroyed() => {
                view.destroy();
                true
            }
            _ => false,
        }
    }

    // ── Coordinate mapping ───────────────────────────────────────

    pub fn to_view_space_from_compositor(&self, id: SurfaceId, point: Point) -> Option<Point> {
        Some(self.view(id)?.to_view_space_from_compositor(point))
    }

    pub fn to_view_space_from_surface(&self, id: SurfaceId, point: Point) -> Option<Point> {
        Some(
            self.view(id)?
                .to_view_space_from_surface(self.surface_size(id), point),
        )
    }

    pub fn to_surface_space(&self, id: SurfaceId, point: Point) -> Option<Point> {
        Some(self.view(id)?.to_surface_space(self.surface_size(id), point))
    }
}

// ── Tests ────────────────────────────────────────────────────────
