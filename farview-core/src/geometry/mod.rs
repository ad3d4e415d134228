//! Transform and region math consumed by the scene graph.

pub mod mat4;
pub mod region;

pub use kurbo::{Point, Rect, Size, Vec2};
pub use mat4::Mat4;
pub use region::Region;
