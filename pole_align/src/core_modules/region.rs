// THEORY:
// A `Region` is the output of the spatial grouping stage: one connected patch of
// target-colored pixels, summarized by the smallest rotated rectangle that
// encloses it. Like every per-frame data container in this crate it is "dumb":
// it has no identity across frames and no memory of where it was before.
//
// Geometry is expressed in pixel-edge coordinates. A pixel at column x covers
// [x, x+1), so a solid block of columns 165..=174 is 10 px wide and centered at
// x = 170.0. Width is always the side closer to horizontal and the rotation is
// normalized into (-45, 45] degrees, so an upright bar reads as narrow and tall.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A connected foreground shape and its minimum-area rotated bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: PointF,
    /// Side of the rectangle nearer the horizontal axis.
    pub width: f64,
    pub height: f64,
    /// Rectangle area (width * height), not the pixel count.
    pub area_px: f64,
    /// Angle of the width side from the +x axis, in (-45, 45].
    pub rotation_deg: f64,
    pub width_height_ratio: f64,
    /// Axis-aligned pixel bounds, inclusive: (min_x, min_y, max_x, max_y).
    pub bounds: (u32, u32, u32, u32),
    /// Number of foreground pixels in the connected component.
    pub pixel_count: usize,
}

impl Region {
    pub fn from_rect(
        center: PointF,
        width: f64,
        height: f64,
        rotation_deg: f64,
        bounds: (u32, u32, u32, u32),
        pixel_count: usize,
    ) -> Self {
        let width_height_ratio = if height > 0.0 { width / height } else { 0.0 };
        Self {
            center,
            width,
            height,
            area_px: width * height,
            rotation_deg,
            width_height_ratio,
            bounds,
            pixel_count,
        }
    }

    /// Height over width; large for poles.
    pub fn aspect(&self) -> f64 {
        if self.width > 0.0 { self.height / self.width } else { 0.0 }
    }
}
