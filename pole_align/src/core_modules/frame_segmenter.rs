// THEORY:
// The `FrameSegmenter` is the first spatial stage. It answers one question per
// pixel, "is this the target color?", and produces a binary `ColorMask`.
//
// Algorithm:
// 1.  **Threshold**: each pixel is converted to packed 8-bit HSV and marked 255
//     iff every channel lies inside the inclusive [lower, upper] bounds.
// 2.  **Closing**: one (or more) 3x3 dilate-then-erode passes knit together
//     speckled edges and fill pinholes so the contour stage sees solid shapes.
//     Pixels outside the frame never contribute: dilation ignores them and
//     erosion does not eat into the border because of them.
//
// Cameras mounted upside down deliver frames rotated by 180 degrees. Rather than
// copy the frame, the threshold pass writes each pixel to its mirrored index,
// which is exactly a 180 degree rotation of a row-major buffer.
//
// The segmenter owns its mask and scratch buffers and reuses them on every call;
// it holds no other state between frames.

use crate::config::SegmenterConfig;
use crate::core_modules::pixel::pixel::rgb_to_hsv;
use crate::pipeline::Orientation;
use image::{GrayImage, RgbImage};

pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;

/// A binary image, 255 for target-colored pixels and 0 elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColorMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![MASK_OFF; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn is_set(&self, x: i64, y: i64) -> bool {
        x >= 0
            && y >= 0
            && x < self.width as i64
            && y < self.height as i64
            && self.data[(y as usize) * self.width as usize + x as usize] == MASK_ON
    }

    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&v| v == MASK_ON).count()
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([self.data[(y * self.width + x) as usize]])
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.data.clear();
            self.data.resize((width * height) as usize, MASK_OFF);
        }
    }
}

pub struct FrameSegmenter {
    config: SegmenterConfig,
    orientation: Orientation,
    mask: ColorMask,
    /// Intermediate buffers for the separable 3x3 passes.
    scratch_a: Vec<u8>,
    scratch_b: Vec<u8>,
}

impl FrameSegmenter {
    pub fn new(config: SegmenterConfig, orientation: Orientation) -> Self {
        Self {
            config,
            orientation,
            mask: ColorMask::new(0, 0),
            scratch_a: Vec::new(),
            scratch_b: Vec::new(),
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// The mask produced by the most recent call.
    pub fn mask(&self) -> &ColorMask {
        &self.mask
    }

    /// Segments an RGB frame and returns the cleaned mask.
    pub fn segment(&mut self, frame: &RgbImage) -> &ColorMask {
        let (width, height) = frame.dimensions();
        self.threshold(frame.as_raw(), 3, width, height);
        self.close();
        &self.mask
    }

    /// Segments a packed RGBA buffer. The caller has already checked its length.
    pub fn segment_rgba(&mut self, buffer: &[u8], width: u32, height: u32) -> &ColorMask {
        self.threshold(buffer, 4, width, height);
        self.close();
        &self.mask
    }

    fn threshold(&mut self, buffer: &[u8], stride: usize, width: u32, height: u32) {
        self.mask.resize(width, height);
        let bounds = self.config.bounds;
        let last = self.mask.data.len().saturating_sub(1);
        let flip = self.orientation == Orientation::UpsideDown;

        for (i, px) in buffer.chunks_exact(stride).enumerate() {
            let hsv = rgb_to_hsv(px[0], px[1], px[2]);
            let target = if flip { last - i } else { i };
            self.mask.data[target] = if bounds.contains(hsv) { MASK_ON } else { MASK_OFF };
        }
    }

    fn close(&mut self) {
        let (width, height) = (self.mask.width as usize, self.mask.height as usize);
        let len = width * height;
        self.scratch_a.resize(len, MASK_OFF);
        self.scratch_b.resize(len, MASK_OFF);

        for _ in 0..self.config.close_iterations {
            // Dilate: mask -> a (rows) -> b (columns).
            pass_rows(&self.mask.data, &mut self.scratch_a, width, height, u8::max);
            pass_cols(&self.scratch_a, &mut self.scratch_b, width, height, u8::max);
            // Erode: b -> a (rows) -> mask (columns).
            pass_rows(&self.scratch_b, &mut self.scratch_a, width, height, u8::min);
            pass_cols(&self.scratch_a, &mut self.mask.data, width, height, u8::min);
        }
    }
}

/// One horizontal 1x3 pass; out-of-frame neighbors are skipped.
fn pass_rows(src: &[u8], dst: &mut [u8], width: usize, height: usize, op: fn(u8, u8) -> u8) {
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        let out = &mut dst[y * width..(y + 1) * width];
        for x in 0..width {
            let mut v = row[x];
            if x > 0 {
                v = op(v, row[x - 1]);
            }
            if x + 1 < width {
                v = op(v, row[x + 1]);
            }
            out[x] = v;
        }
    }
}

/// One vertical 3x1 pass; out-of-frame neighbors are skipped.
fn pass_cols(src: &[u8], dst: &mut [u8], width: usize, height: usize, op: fn(u8, u8) -> u8) {
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let mut v = src[i];
            if y > 0 {
                v = op(v, src[i - width]);
            }
            if y + 1 < height {
                v = op(v, src[i + width]);
            }
            dst[i] = v;
        }
    }
}
