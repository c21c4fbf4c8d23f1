//! Pixel-accurate terrain queries against a static transparency mask.
//!
//! A pixel with non-zero alpha is solid. Rectangles are tested along their perimeter
//! only, which keeps a query at O(width + height); obstacles that fit entirely inside
//! a rectangle without touching its edge are not detected.

use crate::assets::AssetError;
use image::RgbaImage;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CollisionMap {
    width: u32,
    height: u32,
    /// Row-major, `true` where the terrain is solid.
    solid: Vec<bool>,
}

impl CollisionMap {
    /// A fully passable map of the given size.
    pub fn open_area(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            solid: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_rgba(image: &RgbaImage) -> Result<Self, AssetError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AssetError::EmptyMap { width, height });
        }
        let solid = image.pixels().map(|pixel| pixel.0[3] != 0).collect();
        Ok(Self {
            width,
            height,
            solid,
        })
    }

    pub fn open(path: &Path) -> Result<Self, AssetError> {
        let image = image::open(path).map_err(|source| AssetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_rgba(&image.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Marks a rectangle as solid, clipped to the map.
    pub fn fill_solid(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x.min(self.width)..x_end {
                let index = self.index(px, py);
                self.solid[index] = true;
            }
        }
    }

    /// True when the pixel is solid or outside the map.
    pub fn is_blocked(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return true;
        }
        self.solid[self.index(x as u32, y as u32)]
    }

    /// Whether a `width` x `height` rectangle with its top-left corner at `(x, y)`
    /// may occupy this position. A zero-sized rectangle is tested as the single pixel
    /// at `(x, y)`.
    pub fn is_legal(&self, x: f32, y: f32, width: u32, height: u32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let left = x.floor() as i64;
        let top = y.floor() as i64;
        // The top-left pixel must be on the map; this also bounds `right` and `bottom`.
        if self.is_blocked(left, top) {
            return false;
        }
        let right = left + (width.max(1) as i64) - 1;
        let bottom = top + (height.max(1) as i64) - 1;

        // Top and bottom edges
        for px in left..=right {
            if self.is_blocked(px, top) || self.is_blocked(px, bottom) {
                return false;
            }
        }
        // Left and right edges
        for py in top..=bottom {
            if self.is_blocked(left, py) || self.is_blocked(right, py) {
                return false;
            }
        }
        true
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Players and bullets collide against separate masks so that, for example, water
/// can stop characters while letting projectiles pass.
#[derive(Debug, Clone)]
pub struct CollisionMaps {
    pub player: CollisionMap,
    pub bullet: CollisionMap,
}

impl CollisionMaps {
    /// Uses the same geometry for players and bullets.
    pub fn shared(map: CollisionMap) -> Self {
        Self {
            player: map.clone(),
            bullet: map,
        }
    }
}
