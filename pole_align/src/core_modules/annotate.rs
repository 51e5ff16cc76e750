// Debug overlay: outlines each region's axis-aligned bounds on an output frame.

use crate::core_modules::region::Region;
use image::{Rgb, RgbImage};

pub const OUTLINE_GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Draws a `thickness`-pixel box just inside each region's bounds.
pub fn draw_regions(canvas: &mut RgbImage, regions: &[Region], color: Rgb<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    for region in regions {
        let (x0, y0, x1, y1) = region.bounds;
        if x0 >= width || y0 >= height {
            continue;
        }
        let (x1, y1) = (x1.min(width - 1), y1.min(height - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                let on_edge = x < x0 + thickness
                    || x + thickness > x1
                    || y < y0 + thickness
                    || y + thickness > y1;
                if on_edge {
                    canvas.put_pixel(x, y, color);
                }
            }
        }
    }
}
