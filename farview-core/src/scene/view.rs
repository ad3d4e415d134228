//! Per-surface transformation and visibility node.
//!
//! A [`View`] caches its effective transform, the inverse, and its
//! bounding region in compositor space. Everything that depends on the
//! surface tree (parent transform, surface size, children) is supplied
//! by [`SceneGraph`](super::SceneGraph), which owns the views.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use tokio::sync::watch;
use tracing::debug;

use crate::geometry::{Mat4, Point, Rect, Region, Size, Vec2};
use crate::scene::render_state::{RenderState, Scene, SceneId};

/// Handle returned when registering a transformation listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type TransformListener = Box<dyn FnMut(&Mat4) + Send>;

pub struct View {
    transform: Mat4,
    inverse: Mat4,
    custom_transform: Option<Mat4>,
    position_offset: Vec2,
    window_geometry_offset: Mat4,
    dirty: bool,
    destroyed: bool,
    region_rect: Rect,
    region: Region,
    render_states: BTreeMap<SceneId, RenderState>,
    relevant_scene: Option<SceneId>,
    listeners: Vec<(ListenerId, TransformListener)>,
    next_listener: u64,
    destroy_tx: watch::Sender<bool>,
}

impl View {
    pub(crate) fn new() -> Self {
        let (destroy_tx, _) = watch::channel(false);
        Self {
            transform: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
            custom_transform: None,
            position_offset: Vec2::ZERO,
            window_geometry_offset: Mat4::IDENTITY,
            dirty: true,
            destroyed: false,
            region_rect: Rect::ZERO,
            region: Region::empty(),
            render_states: BTreeMap::new(),
            relevant_scene: None,
            listeners: Vec::new(),
            next_listener: 0,
            destroy_tx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn inverse_transform(&self) -> Mat4 {
        self.inverse
    }

    pub fn custom_transform(&self) -> Option<Mat4> {
        self.custom_transform
    }

    pub fn position_offset(&self) -> Vec2 {
        self.position_offset
    }

    pub fn window_geometry_offset(&self) -> Mat4 {
        self.window_geometry_offset
    }

    /// This view's own flag only. Use
    /// [`SceneGraph::is_dirty`](super::SceneGraph::is_dirty) for the
    /// effective state, which includes the parent chain.
    pub fn own_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Axis-aligned bounds of the surface rectangle in compositor space.
    pub fn region_rect(&self) -> Rect {
        self.region_rect
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn render_states(&self) -> impl Iterator<Item = &RenderState> {
        self.render_states.values()
    }

    pub fn render_state(&self, scene: SceneId) -> Option<&RenderState> {
        self.render_states.get(&scene)
    }

    /// The single scene used for input hit-testing, if any is covered.
    pub fn relevant_scene(&self) -> Option<SceneId> {
        self.relevant_scene
    }

    // ── Mutators ─────────────────────────────────────────────────

    pub fn mark_dirty(&mut self) {
        if !self.destroyed {
            self.dirty = true;
        }
    }

    /// Override the computed transform. No-op when unchanged.
    pub fn set_custom_transform(&mut self, transform: Option<Mat4>) {
        if self.destroyed || self.custom_transform == transform {
            return;
        }
        self.custom_transform = transform;
        self.dirty = true;
    }

    /// No-op when unchanged.
    pub fn set_position_offset(&mut self, offset: Vec2) {
        if self.destroyed || self.position_offset == offset {
            return;
        }
        self.position_offset = offset;
        self.dirty = true;
    }

    pub fn set_window_geometry_offset(&mut self, offset: Mat4) {
        if self.destroyed {
            return;
        }
        self.window_geometry_offset = offset;
        self.dirty = true;
    }

    pub fn add_transform_listener(
        &mut self,
        listener: impl FnMut(&Mat4) + Send + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_transform_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    // ── Transform pipeline (driven by the graph) ─────────────────

    /// Custom override, else `parent · translate(position + offset)`
    /// with the window-geometry offset composed on top when set.
    pub(crate) fn compute_transform(&self, parent: Mat4, surface_position: Point) -> Mat4 {
        if let Some(custom) = self.custom_transform {
            return custom;
        }
        let origin = surface_position + self.position_offset;
        let positioned = parent * Mat4::translation(origin.x, origin.y);
        if self.window_geometry_offset.is_identity() {
            positioned
        } else {
            positioned * self.window_geometry_offset
        }
    }

    pub(crate) fn set_transform(&mut self, transform: Mat4) {
        if self.destroyed {
            return;
        }
        self.transform = transform;
        self.inverse = transform.inverse();
    }

    /// Map the surface rectangle through the current transform and
    /// refresh per-scene render states.
    pub(crate) fn update_region<'a>(
        &mut self,
        surface_size: Option<Size>,
        buffer_size: Option<Size>,
        scenes: impl Iterator<Item = &'a Scene>,
    ) {
        let extent = surface_size.unwrap_or(Size::ZERO);
        self.region_rect = self
            .transform
            .map_rect_to_bounding_box(Rect::from_origin_size(Point::ORIGIN, extent));
        self.region = Region::from_rect(self.region_rect);
        self.ensure_render_states(scenes, buffer_size.unwrap_or(Size::ZERO));
    }

    fn ensure_render_states<'a>(
        &mut self,
        scenes: impl Iterator<Item = &'a Scene>,
        buffer_size: Size,
    ) {
        let visible: BTreeMap<SceneId, Region> = scenes
            .map(|scene| (scene.id(), self.region.intersect(scene.region())))
            .filter(|(_, region)| !region.is_empty())
            .collect();

        for (scene, region) in &visible {
            match self.render_states.get_mut(scene) {
                Some(state) => state.update_visible(region),
                None => {
                    debug!(%scene, "view entered scene");
                    self.render_states
                        .insert(*scene, RenderState::new(*scene, region.clone(), buffer_size));
                }
            }
        }

        let gone: Vec<SceneId> = self
            .render_states
            .keys()
            .filter(|scene| !visible.contains_key(scene))
            .copied()
            .collect();
        for scene in gone {
            if let Some(state) = self.render_states.remove(&scene) {
                debug!(%scene, "view left scene");
                state.destroy();
            }
        }

        self.relevant_scene = self.render_states.keys().next().copied();
    }

    pub(crate) fn finish_transformations(&mut self) {
        self.dirty = false;
        let transform = self.transform;
        for (_, listener) in &mut self.listeners {
            listener(&transform);
        }
    }

    // ── Coordinate mapping ───────────────────────────────────────

    pub fn to_view_space_from_compositor(&self, point: Point) -> Point {
        self.inverse.map_point(point)
    }

    /// Scale from surface-logical size to the view's region size.
    pub fn to_view_space_from_surface(&self, surface_size: Option<Size>, point: Point) -> Point {
        let Some(surface) = surface_size else {
            return point;
        };
        let region = self.region_rect.size();
        if surface == region || surface.width == 0.0 || surface.height == 0.0 {
            return point;
        }
        Point::new(
            point.x * region.width / surface.width,
            point.y * region.height / surface.height,
        )
    }

    /// Compositor point to surface-local coordinates.
    ///
    /// Without a surface size the point is returned as given.
    pub fn to_surface_space(&self, surface_size: Option<Size>, point: Point) -> Point {
        let Some(surface) = surface_size else {
            return point;
        };
        let view_point = self.to_view_space_from_compositor(point);
        let region = self.region_rect.size();
        if surface == region || region.width == 0.0 || region.height == 0.0 {
            return view_point;
        }
        Point::new(
            view_point.x * surface.width / region.width,
            view_point.y * surface.height / region.height,
        )
    }

    // ── Teardown ─────────────────────────────────────────────────

    /// Release every render state and resolve the destruction signal.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for (_, state) in std::mem::take(&mut self.render_states) {
            state.destroy();
        }
        self.relevant_scene = None;
        self.dirty = false;
        self.destroyed = true;
        self.destroy_tx.send_replace(true);
    }

    /// Resolves once the view is destroyed (or dropped).
    pub fn on_destroy(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.destroy_tx.subscribe();
        async move {
            let _ = rx.wait_for(|destroyed| *destroyed).await;
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("transform", &self.transform)
            .field("dirty", &self.dirty)
            .field("destroyed", &self.destroyed)
            .field("region_rect", &self.region_rect)
            .field("render_states", &self.render_states.len())
            .finish_non_exhaustive()
    }
}
