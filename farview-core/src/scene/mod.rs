//! View scene graph: per-surface transforms and per-scene visibility.
//!
//! | Module         | Purpose                                           |
//! |----------------|---------------------------------------------------|
//! | `graph`        | Surface tree, scenes, transform propagation       |
//! | `view`         | Cached transform, region, render-state map        |
//! | `render_state` | Scenes and per-(view, scene) render state         |

pub mod graph;
pub mod render_state;
pub mod view;

pub use graph::{SceneGraph, SurfaceId};
pub use render_state::{BackingStore, RenderState, Scene, SceneId};
pub use view::{ListenerId, View};
