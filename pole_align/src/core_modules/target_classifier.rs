// THEORY:
// The classifier is the last stateless stage. It looks at this frame's regions
// and nothing else, and decides what (if anything) the frame shows.
//
// Two flavours share the upstream stages:
// - **Object count**: size-gate the regions, pick one of the survivors, and
//   bucket it by width/height ratio and area into zero, one or four stacked
//   rings. The result is a category, not a measurement.
// - **Pole**: pick the single most plausible tall, narrow region. Which one is
//   "most plausible" is a policy owned by a `PoleSelector`; the default takes
//   the largest qualifying region, i.e. the nearest pole.

use crate::config::{ObjectCountConfig, PoleConfig, TieBreak};
use crate::core_modules::region::{PointF, Region};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingCount {
    Zero,
    One,
    Four,
}

/// What one frame shows. Derived from the current frame only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Classification {
    /// Nothing usable: no pole, or a size-accepted blob that fits no count band.
    NoTarget,
    /// `region` is the bucketed region; `None` when the count is zero.
    ObjectCount { count: RingCount, region: Option<Region> },
    PoleCandidate(Region),
}

impl Classification {
    pub fn pole(&self) -> Option<&Region> {
        match self {
            Classification::PoleCandidate(region) => Some(region),
            _ => None,
        }
    }
}

/// Policy that picks the pole out of a frame's regions.
pub trait PoleSelector: Send {
    fn select(&self, regions: &[Region], config: &PoleConfig) -> Option<Region>;
}

/// Largest tall, narrow region that passes the size gates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestPole;

impl PoleSelector for NearestPole {
    fn select(&self, regions: &[Region], config: &PoleConfig) -> Option<Region> {
        let mut best: Option<&Region> = None;
        for region in regions.iter().filter(|r| is_pole_shaped(r, config)) {
            if best.is_none_or(|b| region.area_px > b.area_px) {
                best = Some(region);
            }
        }
        best.copied()
    }
}

pub fn is_pole_shaped(region: &Region, config: &PoleConfig) -> bool {
    region.width >= config.min_width_px
        && region.width <= config.max_width_px
        && region.height >= config.min_height_px
        && region.aspect() >= config.min_aspect
}

fn size_accepted(region: &Region, config: &ObjectCountConfig) -> bool {
    (config.width_min..=config.width_max).contains(&region.width)
        && (config.height_min..=config.height_max).contains(&region.height)
}

fn distance_sq(a: PointF, b: PointF) -> f64 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

/// Object-count classification of one frame's regions.
pub fn classify_count(
    regions: &[Region],
    config: &ObjectCountConfig,
    frame_center: PointF,
) -> Classification {
    let mut accepted = regions.iter().filter(|r| size_accepted(r, config));

    let chosen = match config.tie_break {
        TieBreak::FirstFound => accepted.next(),
        TieBreak::Largest => accepted.fold(None, |best: Option<&Region>, r| {
            if best.is_none_or(|b| r.area_px > b.area_px) { Some(r) } else { best }
        }),
        TieBreak::MostCentral => accepted.fold(None, |best: Option<&Region>, r| {
            let closer = best.is_none_or(|b| {
                distance_sq(r.center, frame_center) < distance_sq(b.center, frame_center)
            });
            if closer { Some(r) } else { best }
        }),
    };

    let Some(region) = chosen else {
        return Classification::ObjectCount {
            count: RingCount::Zero,
            region: None,
        };
    };

    let ratio = region.width_height_ratio;
    let count = if (config.four_min..=config.one_min).contains(&ratio) && region.area_px >= config.four_area {
        RingCount::Four
    } else if (config.one_min..=config.one_max).contains(&ratio) {
        RingCount::One
    } else {
        return Classification::NoTarget;
    };

    Classification::ObjectCount {
        count,
        region: Some(*region),
    }
}

/// Pole classification of one frame's regions.
pub fn classify_pole(regions: &[Region], config: &PoleConfig, selector: &dyn PoleSelector) -> Classification {
    match selector.select(regions, config) {
        Some(region) => Classification::PoleCandidate(region),
        None => Classification::NoTarget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(cx: f64, cy: f64, w: f64, h: f64) -> Region {
        Region::from_rect(PointF::new(cx, cy), w, h, 0.0, (0, 0, 0, 0), (w * h) as usize)
    }

    const CENTER: PointF = PointF { x: 160.0, y: 120.0 };

    #[test]
    fn no_regions_means_zero_rings() {
        let result = classify_count(&[], &ObjectCountConfig::default(), CENTER);
        assert_eq!(result, Classification::ObjectCount { count: RingCount::Zero, region: None });
    }

    #[test]
    fn out_of_band_regions_count_as_zero() {
        let regions = [rect(10.0, 10.0, 5.0, 5.0), rect(100.0, 100.0, 200.0, 80.0)];
        let result = classify_count(&regions, &ObjectCountConfig::default(), CENTER);
        assert!(matches!(result, Classification::ObjectCount { count: RingCount::Zero, .. }));
    }

    #[test]
    fn flat_ring_is_one() {
        let ring = rect(150.0, 130.0, 50.0, 20.0); // ratio 2.5
        let result = classify_count(&[ring], &ObjectCountConfig::default(), CENTER);
        assert_eq!(result, Classification::ObjectCount { count: RingCount::One, region: Some(ring) });
    }

    #[test]
    fn tall_stack_is_four() {
        let stack = rect(150.0, 130.0, 50.0, 40.0); // ratio 1.25, area 2000
        let result = classify_count(&[stack], &ObjectCountConfig::default(), CENTER);
        assert!(matches!(result, Classification::ObjectCount { count: RingCount::Four, .. }));
    }

    /// A size-accepted region carrying an exact ratio and area.
    fn banded(ratio: f64, area_px: f64) -> Region {
        let mut region = rect(150.0, 130.0, 50.0, 20.0);
        region.width_height_ratio = ratio;
        region.area_px = area_px;
        region
    }

    fn count_of(region: Region) -> Option<RingCount> {
        match classify_count(&[region], &ObjectCountConfig::default(), CENTER) {
            Classification::ObjectCount { count, .. } => Some(count),
            _ => None,
        }
    }

    #[test]
    fn shared_band_edge_counts_as_four_when_big_enough() {
        let config = ObjectCountConfig::default();
        assert_eq!(count_of(banded(config.one_min, 1500.0)), Some(RingCount::Four));
        assert_eq!(count_of(banded(config.one_min, config.four_area)), Some(RingCount::Four));
        assert_eq!(count_of(banded(1.6, config.four_area)), Some(RingCount::Four));
        assert_eq!(count_of(banded(config.four_min, 1200.0)), Some(RingCount::Four));
    }

    #[test]
    fn shared_band_edge_counts_as_one_when_too_small() {
        let config = ObjectCountConfig::default();
        assert_eq!(count_of(banded(config.one_min, 999.0)), Some(RingCount::One));
        assert_eq!(count_of(banded(1.6, 999.0)), None);
    }

    #[test]
    fn one_band_upper_edge_is_inclusive() {
        let config = ObjectCountConfig::default();
        assert_eq!(count_of(banded(config.one_max, 1200.0)), Some(RingCount::One));
        assert_eq!(count_of(banded(config.one_max, 500.0)), Some(RingCount::One));
        assert_eq!(count_of(banded(config.one_max + 0.01, 1200.0)), None);
    }

    #[test]
    fn small_squat_blob_fits_no_band() {
        let blob = rect(150.0, 130.0, 20.0, 20.0); // ratio 1.0 but area 400
        let result = classify_count(&[blob], &ObjectCountConfig::default(), CENTER);
        assert_eq!(result, Classification::NoTarget);
    }

    #[test]
    fn tie_break_policies_pick_different_regions() {
        let first = rect(20.0, 20.0, 50.0, 20.0); // one ring, far from center
        let largest = rect(60.0, 200.0, 55.0, 45.0); // four, biggest
        let central = rect(158.0, 121.0, 48.0, 20.0); // one ring, central
        let regions = [first, largest, central];

        let mut config = ObjectCountConfig::default();
        let pick = |config: &ObjectCountConfig| match classify_count(&regions, config, CENTER) {
            Classification::ObjectCount { region: Some(r), .. } => r,
            other => panic!("unexpected {other:?}"),
        };

        config.tie_break = TieBreak::FirstFound;
        assert_eq!(pick(&config), first);
        config.tie_break = TieBreak::Largest;
        assert_eq!(pick(&config), largest);
        config.tie_break = TieBreak::MostCentral;
        assert_eq!(pick(&config), central);
    }

    #[test]
    fn nearest_pole_prefers_the_biggest_tall_region() {
        let far = rect(100.0, 120.0, 8.0, 60.0);
        let near = rect(200.0, 120.0, 20.0, 120.0);
        let blob = rect(160.0, 120.0, 80.0, 80.0);
        let result = classify_pole(&[far, blob, near], &PoleConfig::default(), &NearestPole);
        assert_eq!(result, Classification::PoleCandidate(near));
    }

    #[test]
    fn no_pole_shaped_region_is_no_target() {
        let blob = rect(160.0, 120.0, 80.0, 80.0);
        let result = classify_pole(&[blob], &PoleConfig::default(), &NearestPole);
        assert_eq!(result, Classification::NoTarget);
        assert!(result.pole().is_none());
    }
}
