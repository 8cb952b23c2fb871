/// Axis-aligned rectangle in physical texture pixels (top-left origin).
///
/// Used for crop regions of captured frames. Coordinates are integral since
/// they address texels directly in copy operations.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rect covering a whole `width` x `height` texture.
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge. Saturates instead of wrapping.
    #[inline]
    pub fn right(self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge. Saturates instead of wrapping.
    #[inline]
    pub fn bottom(self) -> u32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, px: u32, py: u32) -> bool {
        px >= self.x && py >= self.y && px < self.right() && py < self.bottom()
    }

    #[inline]
    pub fn intersect(self, other: PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
        }
    }

    /// Clips the rect to a `width` x `height` texture. `None` if nothing remains.
    #[inline]
    pub fn clamp_to(self, width: u32, height: u32) -> Option<PixelRect> {
        self.intersect(PixelRect::from_size(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: u32, y: u32, w: u32, h: u32) -> PixelRect {
        PixelRect::new(x, y, w, h)
    }

    // ── contains ──────────────────────────────────────────────────────────

    #[test]
    fn contains_top_left_inclusive() {
        assert!(r(0, 0, 10, 10).contains(0, 0));
    }

    #[test]
    fn contains_bottom_right_exclusive() {
        assert!(!r(0, 0, 10, 10).contains(10, 10));
        assert!(r(0, 0, 10, 10).contains(9, 9));
    }

    // ── intersect ─────────────────────────────────────────────────────────

    #[test]
    fn intersect_overlapping() {
        assert_eq!(r(0, 0, 10, 10).intersect(r(5, 5, 10, 10)), Some(r(5, 5, 5, 5)));
    }

    #[test]
    fn intersect_touching_edge_returns_none() {
        assert!(r(0, 0, 10, 10).intersect(r(10, 0, 10, 10)).is_none());
    }

    #[test]
    fn intersect_saturates_at_u32_max() {
        let huge = r(u32::MAX - 1, 0, 10, 1);
        assert_eq!(huge.right(), u32::MAX);
        assert_eq!(huge.intersect(r(0, 0, u32::MAX, 1)), Some(r(u32::MAX - 1, 0, 1, 1)));
    }

    // ── clamp_to ──────────────────────────────────────────────────────────

    #[test]
    fn clamp_to_trims_overhang() {
        assert_eq!(r(1500, 800, 1000, 1000).clamp_to(1920, 1080), Some(r(1500, 800, 420, 280)));
    }

    #[test]
    fn clamp_to_outside_is_none() {
        assert!(r(2000, 0, 10, 10).clamp_to(1920, 1080).is_none());
    }

    #[test]
    fn empty_and_area() {
        assert!(r(3, 3, 0, 7).is_empty());
        assert_eq!(r(0, 0, 1920, 1080).area(), 2_073_600);
    }
}
