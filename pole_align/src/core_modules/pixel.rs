// THEORY (single-pixel color transforms):
// The segmenter decides membership one pixel at a time, so the only color math
// it needs is a single-pixel RGB -> HSV conversion. Nothing here looks at
// neighbors; spatial work (closing, contour tracing) lives in higher modules.
//
// The output follows the common 8-bit HSV packing used by camera tooling:
//   - H: hue angle in degrees halved, so [0, 360) fits in [0, 180)
//   - S: chroma / value, scaled to [0, 255]
//   - V: the brightest channel, [0, 255]
// Threshold constants tuned with that tooling therefore carry over unchanged.

pub mod pixel {
    pub type Channel = u8;
    pub type Hsv = [Channel; 3];

    /// Converts one 8-bit RGB pixel to 8-bit packed HSV.
    #[inline]
    pub fn rgb_to_hsv(red: Channel, green: Channel, blue: Channel) -> Hsv {
        let maximum_channel = red.max(green).max(blue);
        let minimum_channel = red.min(green).min(blue);
        let chroma = (maximum_channel - minimum_channel) as f32;

        let value = maximum_channel;
        if maximum_channel == 0 {
            return [0, 0, 0];
        }
        let saturation = (255.0 * chroma / maximum_channel as f32).round() as u8;

        if chroma <= 0.0 {
            return [0, saturation, value];
        }

        let (r, g, b) = (red as f32, green as f32, blue as f32);
        let inverse_chroma = 1.0 / chroma;
        let (base_difference, sector_offset) = if maximum_channel == red {
            (g - b, 0.0)
        } else if maximum_channel == green {
            (b - r, 2.0)
        } else {
            (r - g, 4.0)
        };

        let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        let mut hue = (hue_degrees / 2.0).round() as u16;
        if hue >= 180 {
            hue -= 180;
        }
        [hue as u8, saturation, value]
    }
}
