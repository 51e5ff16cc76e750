// THEORY:
// The `RegionExtractor` is the engine of the spatial grouping layer. It takes
// the binary mask from the segmenter and turns every connected patch of
// foreground into a `Region`.
//
// Algorithm steps:
// 1.  **Component discovery**: a raster scan finds the first unlabeled
//     foreground pixel. Because nothing above it or to its left belongs to the
//     same patch, that pixel is guaranteed to sit on the patch's outer border.
// 2.  **Region growing**: an explicit-stack flood fill (8-connected) marks the
//     whole patch with its component label and collects its pixel count and
//     axis-aligned bounds.
// 2b. **Hole marking**: background inside the bounds is flooded (4-connected)
//     from the bounds' rim. Whatever the flood cannot reach is a hole of the
//     patch and is marked enclosed. A later patch whose first pixel is enclosed
//     sits inside a hole; it is grown so its pixels are consumed but it is never
//     traced or reported. Hole borders are never traced either, so only
//     external contours come out.
// 3.  **Boundary tracing**: Moore-neighbor tracing walks the outer border
//     clockwise from the start pixel until the first step repeats.
// 4.  **Rectangle fitting**: the contour pixels' corners are reduced to their
//     convex hull, and rotating calipers pick the hull edge whose aligned
//     bounding box has the least area.
//
// Every buffer (label map, hole map, flood stacks, contour, hull) lives on the
// extractor and is cleared, not reallocated, between frames. The output vector is
// owned by the caller for the same reason.

use crate::core_modules::frame_segmenter::{ColorMask, MASK_ON};
use crate::core_modules::region::{PointF, Region};

/// Moore neighborhood, clockwise on screen (y grows downward), starting east.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;
/// Background neighbors; the dual of 8-connected foreground.
const EDGE_NEIGHBORS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];
/// Label of a pixel no patch has claimed yet.
const UNLABELED: u32 = 0;

#[inline]
fn direction_index(dx: i64, dy: i64) -> usize {
    match (dx, dy) {
        (1, 0) => 0,
        (1, 1) => 1,
        (0, 1) => 2,
        (-1, 1) => 3,
        (-1, 0) => 4,
        (-1, -1) => 5,
        (0, -1) => 6,
        _ => 7,
    }
}

#[inline]
fn cross(o: (i64, i64), a: (i64, i64), b: (i64, i64)) -> i64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

#[derive(Default)]
pub struct RegionExtractor {
    labels: Vec<u32>,
    enclosed: Vec<bool>,
    outside: Vec<bool>,
    stack: Vec<(u32, u32)>,
    contour: Vec<(i64, i64)>,
    corners: Vec<(i64, i64)>,
    hull: Vec<(i64, i64)>,
}

impl RegionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents of `regions` with one entry per external contour,
    /// in raster order of each contour's top-left pixel. Patches lying inside a
    /// hole of another patch are not reported.
    pub fn extract(&mut self, mask: &ColorMask, regions: &mut Vec<Region>) {
        regions.clear();
        let (width, height) = mask.dimensions();
        let data = mask.data();
        self.labels.clear();
        self.labels.resize(data.len(), UNLABELED);
        self.enclosed.clear();
        self.enclosed.resize(data.len(), false);
        let mut next_label = UNLABELED;

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if data[index] != MASK_ON || self.labels[index] != UNLABELED {
                    continue;
                }

                next_label += 1;
                let (pixel_count, bounds) = self.grow_region(mask, x, y, next_label);
                self.mark_holes(width, bounds, next_label);
                // A patch is discovered before anything in its holes, so this
                // check always sees the enclosing patch's marks.
                if self.enclosed[index] {
                    continue;
                }
                self.trace_outer_border(mask, x, y, pixel_count);
                if let Some(region) = self.fit_rotated_rect(bounds, pixel_count) {
                    regions.push(region);
                }
            }
        }
    }

    /// Flood fill from `(x, y)` stamping `label`; returns the pixel count and
    /// inclusive bounds.
    fn grow_region(&mut self, mask: &ColorMask, x: u32, y: u32, label: u32) -> (usize, (u32, u32, u32, u32)) {
        let width = mask.width();
        let height = mask.height();
        let data = mask.data();

        self.stack.clear();
        self.stack.push((x, y));
        self.labels[(y * width + x) as usize] = label;

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
        let mut pixel_count = 0usize;

        while let Some((cx, cy)) = self.stack.pop() {
            pixel_count += 1;
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);

            for (dx, dy) in DIRECTIONS {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let neighbor = (ny as u32 * width + nx as u32) as usize;
                if self.labels[neighbor] == UNLABELED && data[neighbor] == MASK_ON {
                    self.labels[neighbor] = label;
                    self.stack.push((nx as u32, ny as u32));
                }
            }
        }

        (pixel_count, (min_x, min_y, max_x, max_y))
    }

    /// Marks every pixel inside `bounds` that is cut off from the bounds' rim
    /// by the patch carrying `label`. Pixels of other patches count as
    /// background here, so islands inside a hole get marked too.
    fn mark_holes(&mut self, width: u32, bounds: (u32, u32, u32, u32), label: u32) {
        let (min_x, min_y, max_x, max_y) = bounds;
        if max_x - min_x < 2 || max_y - min_y < 2 {
            return;
        }
        let box_w = max_x - min_x + 1;
        let box_h = max_y - min_y + 1;
        self.outside.clear();
        self.outside.resize((box_w * box_h) as usize, false);
        self.stack.clear();

        for by in 0..box_h {
            for bx in 0..box_w {
                let on_rim = bx == 0 || by == 0 || bx == box_w - 1 || by == box_h - 1;
                if !on_rim {
                    continue;
                }
                let frame_index = ((min_y + by) * width + min_x + bx) as usize;
                if self.labels[frame_index] != label {
                    self.outside[(by * box_w + bx) as usize] = true;
                    self.stack.push((bx, by));
                }
            }
        }

        while let Some((bx, by)) = self.stack.pop() {
            for (dx, dy) in EDGE_NEIGHBORS {
                let nx = bx as i64 + dx;
                let ny = by as i64 + dy;
                if nx < 0 || ny < 0 || nx >= box_w as i64 || ny >= box_h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let local = (ny * box_w + nx) as usize;
                let frame_index = ((min_y + ny) * width + min_x + nx) as usize;
                if !self.outside[local] && self.labels[frame_index] != label {
                    self.outside[local] = true;
                    self.stack.push((nx, ny));
                }
            }
        }

        for by in 1..box_h - 1 {
            for bx in 1..box_w - 1 {
                let frame_index = ((min_y + by) * width + min_x + bx) as usize;
                if !self.outside[(by * box_w + bx) as usize] && self.labels[frame_index] != label {
                    self.enclosed[frame_index] = true;
                }
            }
        }
    }

    /// Moore-neighbor tracing of the outer border starting at the patch's first
    /// raster pixel, whose west neighbor is known to be background.
    fn trace_outer_border(&mut self, mask: &ColorMask, x: u32, y: u32, pixel_count: usize) {
        self.contour.clear();
        let start = (x as i64, y as i64);
        self.contour.push(start);

        let mut current = start;
        let mut backtrack = WEST;
        let mut first_step: Option<(i64, i64)> = None;
        let step_limit = 8 * pixel_count + 16;

        for _ in 0..step_limit {
            let mut found = None;
            for k in 1..=8 {
                let d = (backtrack + k) % 8;
                let candidate = (current.0 + DIRECTIONS[d].0, current.1 + DIRECTIONS[d].1);
                if mask.is_set(candidate.0, candidate.1) {
                    found = Some((candidate, (backtrack + k - 1) % 8));
                    break;
                }
            }
            // A lone pixel has no neighbors to walk to.
            let Some((next, checked_before)) = found else {
                break;
            };

            if current == start {
                match first_step {
                    None => first_step = Some(next),
                    Some(step) if step == next => break,
                    Some(_) => {}
                }
            }

            let background = (
                current.0 + DIRECTIONS[checked_before].0,
                current.1 + DIRECTIONS[checked_before].1,
            );
            backtrack = direction_index(background.0 - next.0, background.1 - next.1);
            current = next;
            self.contour.push(current);
        }
    }

    fn fit_rotated_rect(&mut self, bounds: (u32, u32, u32, u32), pixel_count: usize) -> Option<Region> {
        self.corners.clear();
        for &(x, y) in &self.contour {
            self.corners
                .extend_from_slice(&[(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)]);
        }
        convex_hull(&mut self.corners, &mut self.hull);
        let (center, side_a, side_b, angle_deg) = min_area_rect(&self.hull)?;

        if side_a * side_b <= 0.0 {
            return None;
        }

        // Normalize so width is the side nearer horizontal, rotation in (-45, 45].
        let (width, height, rotation) = if angle_deg > 45.0 {
            (side_b, side_a, angle_deg - 90.0)
        } else if angle_deg <= -45.0 {
            (side_b, side_a, angle_deg + 90.0)
        } else {
            (side_a, side_b, angle_deg)
        };

        Some(Region::from_rect(center, width, height, rotation, bounds, pixel_count))
    }
}

/// Andrew's monotone chain. Sorts and dedups `points` in place.
fn convex_hull(points: &mut Vec<(i64, i64)>, hull: &mut Vec<(i64, i64)>) {
    points.sort_unstable();
    points.dedup();
    hull.clear();
    if points.len() < 3 {
        hull.extend_from_slice(points);
        return;
    }

    for &p in points.iter() {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in points.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
}

/// Rotating calipers over hull edges. Returns (center, side along edge,
/// side across edge, edge angle in (-90, 90] degrees).
fn min_area_rect(hull: &[(i64, i64)]) -> Option<(PointF, f64, f64, f64)> {
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, PointF, f64, f64, f64)> = None;
    for i in 0..hull.len() {
        let origin = hull[i];
        let next = hull[(i + 1) % hull.len()];
        let (ex, ey) = ((next.0 - origin.0) as f64, (next.1 - origin.1) as f64);
        let length = ex.hypot(ey);
        if length == 0.0 {
            continue;
        }
        let (ux, uy) = (ex / length, ey / length);
        let (nx, ny) = (-uy, ux);

        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for &(px, py) in hull {
            let (dx, dy) = ((px - origin.0) as f64, (py - origin.1) as f64);
            let u = dx * ux + dy * uy;
            let v = dx * nx + dy * ny;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let side_a = max_u - min_u;
        let side_b = max_v - min_v;
        let area = side_a * side_b;
        if best.is_none_or(|(best_area, ..)| area < best_area - 1e-9) {
            let mid_u = (min_u + max_u) / 2.0;
            let mid_v = (min_v + max_v) / 2.0;
            let center = PointF::new(
                origin.0 as f64 + ux * mid_u + nx * mid_v,
                origin.1 as f64 + uy * mid_u + ny * mid_v,
            );
            let mut angle = uy.atan2(ux).to_degrees();
            if angle <= -90.0 {
                angle += 180.0;
            } else if angle > 90.0 {
                angle -= 180.0;
            }
            best = Some((area, center, side_a, side_b, angle));
        }
    }

    best.map(|(_, center, a, b, angle)| (center, a, b, angle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmenterConfig;
    use crate::core_modules::frame_segmenter::FrameSegmenter;
    use crate::pipeline::Orientation;
    use approx::assert_abs_diff_eq;
    use image::{Rgb, RgbImage};

    const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn regions_of(frame: &RgbImage) -> Vec<Region> {
        let mut config = SegmenterConfig::default();
        config.close_iterations = 0;
        let mut segmenter = FrameSegmenter::new(config, Orientation::Upright);
        let mut extractor = RegionExtractor::new();
        let mut regions = Vec::new();
        extractor.extract(segmenter.segment(frame), &mut regions);
        regions
    }

    fn block(w: u32, h: u32, x0: u32, y0: u32, bw: u32, bh: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x0..x0 + bw).contains(&x) && (y0..y0 + bh).contains(&y) { ORANGE } else { BLUE }
        })
    }

    #[test]
    fn empty_mask_yields_no_regions() {
        let regions = regions_of(&RgbImage::from_pixel(64, 48, BLUE));
        assert!(regions.is_empty());
    }

    #[test]
    fn upright_bar_measures_in_pixel_edges() {
        let regions = regions_of(&block(320, 240, 165, 100, 10, 40));
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert_abs_diff_eq!(r.center.x, 170.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.center.y, 120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.width, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.height, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.area_px, 400.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.rotation_deg, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.width_height_ratio, 0.25, epsilon = 1e-9);
        assert_eq!(r.bounds, (165, 100, 174, 139));
        assert_eq!(r.pixel_count, 400);
    }

    #[test]
    fn wide_block_reports_wide_width() {
        let regions = regions_of(&block(100, 100, 10, 10, 50, 20));
        assert_eq!(regions.len(), 1);
        assert_abs_diff_eq!(regions[0].width, 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(regions[0].height, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn single_pixel_is_a_unit_square() {
        let regions = regions_of(&block(10, 10, 4, 4, 1, 1));
        assert_eq!(regions.len(), 1);
        assert_abs_diff_eq!(regions[0].area_px, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(regions[0].center.x, 4.5, epsilon = 1e-9);
    }

    #[test]
    fn hollow_ring_is_one_external_contour() {
        let frame = RgbImage::from_fn(40, 40, |x, y| {
            let outer = (5..35).contains(&x) && (5..35).contains(&y);
            let inner = (10..30).contains(&x) && (10..30).contains(&y);
            if outer && !inner { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 1);
        assert_abs_diff_eq!(regions[0].width, 30.0, epsilon = 1e-9);
        assert_eq!(regions[0].pixel_count, 30 * 30 - 20 * 20);
    }

    #[test]
    fn island_inside_a_ring_is_not_reported() {
        let frame = RgbImage::from_fn(60, 60, |x, y| {
            let outer = (5..55).contains(&x) && (5..55).contains(&y);
            let inner = (10..50).contains(&x) && (10..50).contains(&y);
            let island = (25..35).contains(&x) && (25..35).contains(&y);
            if (outer && !inner) || island { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 1);
        assert_abs_diff_eq!(regions[0].width, 50.0, epsilon = 1e-9);
        assert_eq!(regions[0].pixel_count, 50 * 50 - 40 * 40);
    }

    #[test]
    fn blob_next_to_a_ring_is_still_reported() {
        let frame = RgbImage::from_fn(80, 40, |x, y| {
            let outer = (5..35).contains(&x) && (5..35).contains(&y);
            let inner = (10..30).contains(&x) && (10..30).contains(&y);
            let beside = (50..60).contains(&x) && (15..25).contains(&y);
            if (outer && !inner) || beside { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 2);
        assert_abs_diff_eq!(regions[1].center.x, 55.0, epsilon = 1e-9);
    }

    #[test]
    fn separate_blobs_come_out_in_raster_order() {
        let frame = RgbImage::from_fn(60, 40, |x, y| {
            let right_high = (40..50).contains(&x) && (2..8).contains(&y);
            let left_low = (5..15).contains(&x) && (20..35).contains(&y);
            if right_high || left_low { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].center.y < regions[1].center.y);
        assert_abs_diff_eq!(regions[0].center.x, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn diagonal_touching_pixels_join_one_region() {
        let frame = RgbImage::from_fn(10, 10, |x, y| if x == y { ORANGE } else { BLUE });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].pixel_count, 10);
    }

    #[test]
    fn tilted_bar_reports_its_rotation() {
        // A 60x8 bar rotated by 30 degrees about (100, 100).
        let (c, s) = (30f64.to_radians().cos(), 30f64.to_radians().sin());
        let frame = RgbImage::from_fn(200, 200, |x, y| {
            let (dx, dy) = (x as f64 + 0.5 - 100.0, y as f64 + 0.5 - 100.0);
            let along = dx * c + dy * s;
            let across = -dx * s + dy * c;
            if along.abs() <= 30.0 && across.abs() <= 4.0 { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert!((r.rotation_deg - 30.0).abs() < 3.0, "rotation {}", r.rotation_deg);
        assert!((r.width - 60.0).abs() < 3.0, "width {}", r.width);
        assert!((r.height - 8.0).abs() < 3.0, "height {}", r.height);
        assert_abs_diff_eq!(r.center.x, 100.0, epsilon = 1.0);
        assert_abs_diff_eq!(r.center.y, 100.0, epsilon = 1.0);
    }

    #[test]
    fn concave_shape_traces_its_outline() {
        // An L: the hull, not the pixel set, drives the rectangle.
        let frame = RgbImage::from_fn(50, 50, |x, y| {
            let stem = (10..14).contains(&x) && (10..40).contains(&y);
            let foot = (10..30).contains(&x) && (36..40).contains(&y);
            if stem || foot { ORANGE } else { BLUE }
        });
        let regions = regions_of(&frame);
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert!(r.area_px <= 20.0 * 30.0 + 1e-6);
        assert_eq!(r.bounds, (10, 10, 29, 39));
    }

    #[test]
    fn extraction_is_repeatable() {
        let frame = RgbImage::from_fn(80, 60, |x, y| {
            if ((x / 7) + (y / 9)) % 3 == 0 { ORANGE } else { BLUE }
        });
        let first = regions_of(&frame);
        let second = regions_of(&frame);
        assert_eq!(first, second);
    }

    #[test]
    fn hull_of_square_corners() {
        let mut points = vec![(0, 0), (2, 0), (1, 1), (2, 2), (0, 2), (0, 0)];
        let mut hull = Vec::new();
        convex_hull(&mut points, &mut hull);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&(1, 1)));
    }
}
