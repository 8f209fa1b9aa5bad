//! Axis-aligned bounding boxes in image-pixel space.
//!
//! Origin is top-left; `x0 <= x1` and `y0 <= y1` hold for every box the
//! engine produces. Coordinates are `f32` so that region recognitions
//! translated back into page space keep sub-pixel accuracy.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Create a box, normalizing corner order so the invariants hold.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Build from left/top/width/height as emitted by recognizer TSV.
    pub fn from_ltwh(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self::new(left, top, left + width.max(0.0), top + height.max(0.0))
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Coerce the box into `[0, width] x [0, height]`.
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }

    /// Tight union of two boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Intersection area, zero when disjoint.
    pub fn intersection_area(&self, other: &Self) -> f32 {
        let w = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let h = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        w * h
    }

    /// Intersection-over-union in `[0, 1]`.
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Fraction of the shorter box's vertical extent shared with `other`.
    pub fn vertical_overlap_ratio(&self, other: &Self) -> f32 {
        let overlap = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        let shorter = self.height().min(other.height());
        if shorter <= 0.0 { 0.0 } else { overlap / shorter }
    }

    /// Fraction of the narrower box's horizontal extent shared with `other`.
    pub fn horizontal_overlap_ratio(&self, other: &Self) -> f32 {
        let overlap = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let narrower = self.width().min(other.width());
        if narrower <= 0.0 { 0.0 } else { overlap / narrower }
    }

    /// Horizontal gap between the boxes; zero when they overlap in x.
    pub fn min_horizontal_gap(&self, other: &Self) -> f32 {
        if self.x1 < other.x0 {
            other.x0 - self.x1
        } else if other.x1 < self.x0 {
            self.x0 - other.x1
        } else {
            0.0
        }
    }

    /// Grow the box by `pad` on every side.
    pub fn expand(&self, pad: f32) -> Self {
        Self::new(self.x0 - pad, self.y0 - pad, self.x1 + pad, self.y1 + pad)
    }

    /// Shift the box by a pixel offset.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let b = BBox::new(10.0, 20.0, 5.0, 2.0);
        assert_eq!(b.x0, 5.0);
        assert_eq!(b.y0, 2.0);
        assert_eq!(b.x1, 10.0);
        assert_eq!(b.y1, 20.0);
    }

    #[test]
    fn test_clamp_into_page() {
        let b = BBox::new(-5.0, -2.0, 120.0, 80.0).clamp(100.0, 50.0);
        assert_eq!(b, BBox::new(0.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vertical_overlap_ratio() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(0.0, 5.0, 10.0, 15.0);
        assert!((a.vertical_overlap_ratio(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_min_horizontal_gap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(14.0, 0.0, 20.0, 10.0);
        assert_eq!(a.min_horizontal_gap(&b), 4.0);
        assert_eq!(b.min_horizontal_gap(&a), 4.0);
        let c = BBox::new(5.0, 0.0, 12.0, 10.0);
        assert_eq!(a.min_horizontal_gap(&c), 0.0);
    }

    #[test]
    fn test_union_is_tight() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 20.0, 8.0);
        assert_eq!(a.union(&b), BBox::new(0.0, 0.0, 20.0, 10.0));
    }
}
