//! Axis-aligned region sets.
//!
//! A [`Region`] is a list of non-empty rectangles. Only the operations the
//! scene graph needs are provided: construction from a rectangle,
//! intersection, union, emptiness and containment tests.

use kurbo::Rect;

/// A set of axis-aligned rectangles.
///
/// Rectangles with zero area are never stored, so an empty list is the
/// one and only empty region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// The empty region.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A region covering exactly `rect` (empty if `rect` has no area).
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        if rect.area() > 0.0 {
            Self { rects: vec![rect] }
        } else {
            Self::empty()
        }
    }

    /// The rectangles making up this region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Returns `true` if the region covers no area.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The intersection of `self` and `other`.
    pub fn intersect(&self, other: &Region) -> Region {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                let i = a.intersect(*b);
                if i.area() > 0.0 {
                    rects.push(i);
                }
            }
        }
        Region { rects }
    }

    /// The union of `self` and `other`. Overlapping rectangles are kept as-is.
    pub fn union(&self, other: &Region) -> Region {
        let mut rects = self.rects.clone();
        rects.extend(other.rects.iter().copied());
        Region { rects }
    }

    /// Returns `true` if every rectangle of `other` lies inside one
    /// rectangle of `self`. Exact when `self` is a single rectangle.
    pub fn contains_region(&self, other: &Region) -> bool {
        other.rects.iter().all(|inner| {
            self.rects.iter().any(|outer| {
                inner.x0 >= outer.x0
                    && inner.y0 >= outer.y0
                    && inner.x1 <= outer.x1
                    && inner.y1 <= outer.y1
            })
        })
    }

    /// Smallest rectangle enclosing the whole region, if any.
    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.rects.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| acc.union(*r)))
    }

    /// Replace the contents of `self` with those of `other`.
    pub fn copy_from(&mut self, other: &Region) {
        self.rects.clear();
        self.rects.extend_from_slice(&other.rects);
    }
}
