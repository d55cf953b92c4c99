use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle. `width`/`height` are at least 1 for any
/// rectangle built from pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing both inclusive corners.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Pixel count, widened so large frames can't overflow.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Geometric center in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Whether pixel `(x, y)` lies inside.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Bounding box of both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Chebyshev gap between the two rectangles; 0 when they touch or overlap.
    pub fn gap(&self, other: &Rect) -> u32 {
        let dx = if other.x >= self.right() {
            other.x - self.right()
        } else if self.x >= other.right() {
            self.x - other.right()
        } else {
            0
        };
        let dy = if other.y >= self.bottom() {
            other.y - self.bottom()
        } else if self.y >= other.bottom() {
            self.y - other.bottom()
        } else {
            0
        };
        dx.max(dy)
    }

    /// Grows by `pad` on every side, clipped to `width` x `height`.
    pub fn padded(&self, pad: u32, width: u32, height: u32) -> Rect {
        let x = self.x.saturating_sub(pad);
        let y = self.y.saturating_sub(pad);
        let right = (self.right() + pad).min(width);
        let bottom = (self.bottom() + pad).min(height);
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.gap(&Rect::new(10, 0, 5, 5)), 0);
        assert_eq!(a.gap(&Rect::new(15, 0, 5, 5)), 5);
        assert_eq!(a.gap(&Rect::new(12, 20, 5, 5)), 10);
        assert_eq!(a.gap(&Rect::new(2, 2, 3, 3)), 0);
        assert_eq!(Rect::new(15, 0, 5, 5).gap(&a), 5);
    }

    #[test]
    fn test_union_and_contains() {
        let u = Rect::new(0, 0, 4, 4).union(&Rect::new(10, 6, 2, 2));
        assert_eq!(u, Rect::new(0, 0, 12, 8));
        assert!(u.contains(11, 7));
        assert!(!u.contains(12, 7));
    }

    #[test]
    fn test_padded_is_clipped() {
        let r = Rect::new(2, 3, 10, 10).padded(5, 14, 100);
        assert_eq!(r, Rect::new(0, 0, 14, 18));
    }
}
