use serde::Deserialize;

/// An axis-aligned rectangle in image pixel coordinates.
///
/// `x`/`y` is the top-left corner; the right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Regions reported by the detector are plain rectangles too.
pub type BoundingBox = Region;

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a region from inclusive corner coordinates.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the region lies entirely inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    pub fn contains_region(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Region) -> bool {
        (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }

    /// True if the two regions overlap or the gap between them is at most
    /// `distance` pixels on both axes.
    pub fn is_near(&self, other: &Region, distance: u32) -> bool {
        let gap_x = (self.x.max(other.x) as u64).saturating_sub(self.right().min(other.right()));
        let gap_y = (self.y.max(other.y) as u64).saturating_sub(self.bottom().min(other.bottom()));
        gap_x <= distance as u64 && gap_y <= distance as u64
    }

    /// Smallest region covering both.
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Region::new(x, y, (right - x as u64) as u32, (bottom - y as u64) as u32)
    }

    pub fn translate(&self, dx: u32, dy: u32) -> Region {
        Region::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow by `padding` on every side, clamped to a `width` x `height` image.
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Region {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let right = (self.right() + padding as u64).min(width as u64);
        let bottom = (self.bottom() + padding as u64).min(height as u64);
        Region::new(
            x,
            y,
            right.saturating_sub(x as u64) as u32,
            bottom.saturating_sub(y as u64) as u32,
        )
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts.as_slice() else {
            return Err(format!("expected x,y,width,height, got '{s}'"));
        };
        let num = |v: &str| {
            v.parse::<u32>()
                .map_err(|e| format!("invalid region component '{v}': {e}"))
        };
        Ok(Region::new(num(x)?, num(y)?, num(w)?, num(h)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_covers_overlap_touch_and_gap() {
        let a = Region::new(0, 0, 10, 10);
        assert!(a.is_near(&Region::new(5, 5, 10, 10), 0));
        assert!(a.is_near(&Region::new(10, 0, 5, 5), 0), "touching edges");
        assert!(!a.is_near(&Region::new(13, 0, 5, 5), 2));
        assert!(a.is_near(&Region::new(13, 0, 5, 5), 3));
        assert!(!a.is_near(&Region::new(13, 13, 5, 5), 2));
    }

    #[test]
    fn union_spans_both() {
        let u = Region::new(2, 3, 4, 4).union(&Region::new(10, 1, 2, 2));
        assert_eq!(u, Region::new(2, 1, 10, 6));
    }

    #[test]
    fn padded_is_clamped_to_image() {
        let r = Region::new(2, 90, 10, 10).padded(5, 100, 100);
        assert_eq!(r, Region::new(0, 85, 17, 15));
        assert!(r.fits_within(100, 100));
    }

    #[test]
    fn parse_from_cli_string() {
        let r: Region = "1500, 100,300,600".parse().unwrap();
        assert_eq!(r, Region::new(1500, 100, 300, 600));
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("1,2,3,x".parse::<Region>().is_err());
    }
}
