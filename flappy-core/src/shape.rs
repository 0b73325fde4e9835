//! Occupancy shapes for collision tests.
//!
//! Each entity type picks its [`Occupancy`] once, at construction. Obstacles
//! are always solid rectangles; agents may use a bounding box or a pixel mask.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Open-interval overlap: touching edges do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    #[inline]
    pub fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right()
    }
}

/// Row-major silhouette. A set pixel `(px, py)` occupies the unit square with
/// its top-left corner at `(px, py)` relative to the entity origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl PixelMask {
    pub fn filled(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![true; (width as usize) * (height as usize)],
        }
    }

    /// Builds a mask from text rows; `#` marks a set pixel. Short rows are
    /// padded with clear pixels.
    pub fn from_rows(rows: &[&str]) -> Self {
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0) as u32;
        let height = rows.len() as u32;
        let mut bits = vec![false; (width as usize) * (height as usize)];
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    bits[y * width as usize + x] = true;
                }
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Masks read from JSON carry their own `bits`; the length must match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let expected = self.width as usize * self.height as usize;
        if self.bits.len() != expected {
            return Err(ConfigError::MaskSize {
                expected,
                actual: self.bits.len(),
            });
        }
        Ok(())
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.bits.get(index).copied().unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Occupancy {
    BoundingBox { width: f64, height: f64 },
    Mask(PixelMask),
}

impl Occupancy {
    pub fn bounding_box(width: f64, height: f64) -> Self {
        Self::BoundingBox { width, height }
    }

    pub fn width(&self) -> f64 {
        match self {
            Self::BoundingBox { width, .. } => *width,
            Self::Mask(mask) => mask.width() as f64,
        }
    }

    pub fn height(&self) -> f64 {
        match self {
            Self::BoundingBox { height, .. } => *height,
            Self::Mask(mask) => mask.height() as f64,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::BoundingBox { .. } => Ok(()),
            Self::Mask(mask) => mask.validate(),
        }
    }

    pub fn bounds(&self, x: f64, y: f64) -> Rect {
        Rect::new(x, y, self.width(), self.height())
    }

    /// True when the shape placed at `(x, y)` intersects the solid `rect`.
    pub fn overlaps_rect(&self, x: f64, y: f64, rect: &Rect) -> bool {
        let bounds = self.bounds(x, y);
        if !bounds.intersects(rect) {
            return false;
        }
        match self {
            Self::BoundingBox { .. } => true,
            Self::Mask(mask) => {
                // Only scan the rows/columns that can touch the rect.
                let min_px = (rect.x - x).floor().max(0.0) as u32;
                let max_px = ((rect.right() - x).ceil().max(0.0) as u32).min(mask.width());
                let min_py = (rect.y - y).floor().max(0.0) as u32;
                let max_py = ((rect.bottom() - y).ceil().max(0.0) as u32).min(mask.height());
                for py in min_py..max_py {
                    for px in min_px..max_px {
                        if !mask.get(px, py) {
                            continue;
                        }
                        let cell = Rect::new(x + px as f64, y + py as f64, 1.0, 1.0);
                        if cell.intersects(rect) {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        let c = Rect::new(9.5, 9.5, 10.0, 10.0);
        assert!(a.intersects(&c));
    }

    #[test]
    fn mask_ignores_clear_corner() {
        let mask = Occupancy::Mask(PixelMask::from_rows(&[".##", "###", "###"]));
        // A wall clipping only the clear top-left pixel.
        let corner = Rect::new(-5.0, -5.0, 5.5, 5.5);
        assert!(!mask.overlaps_rect(0.0, 0.0, &corner));
        let boxed = Occupancy::bounding_box(3.0, 3.0);
        assert!(boxed.overlaps_rect(0.0, 0.0, &corner));
    }

    #[test]
    fn mask_bit_count_must_match_its_size() {
        let short: PixelMask =
            serde_json::from_str(r#"{ "width": 16, "height": 16, "bits": [true] }"#)
                .expect("parse");
        assert_eq!(
            short.validate(),
            Err(ConfigError::MaskSize {
                expected: 256,
                actual: 1
            })
        );
        // Out-of-range bits read as clear instead of panicking.
        assert!(!short.get(12, 0));
        assert!(short.get(0, 0));

        let rows = PixelMask::from_rows(&["#.", ".#", "##"]);
        assert!(rows.validate().is_ok());
        assert!(rows.get(1, 1) && !rows.get(1, 0));
        assert!(Occupancy::Mask(rows).validate().is_ok());
    }

    #[test]
    fn filled_mask_matches_bounding_box() {
        let mask = Occupancy::Mask(PixelMask::filled(34, 24));
        let boxed = Occupancy::bounding_box(34.0, 24.0);
        let walls = [
            Rect::new(30.0, 20.0, 10.0, 10.0),
            Rect::new(34.0, 0.0, 10.0, 10.0),
            Rect::new(-10.0, 23.5, 100.0, 3.0),
            Rect::new(0.0, 24.0, 34.0, 5.0),
        ];
        for wall in walls {
            assert_eq!(
                mask.overlaps_rect(2.25, 0.0, &wall),
                boxed.overlaps_rect(2.25, 0.0, &wall),
                "wall {wall:?}"
            );
        }
    }
}
