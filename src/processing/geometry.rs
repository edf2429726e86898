use crate::models::{MatchedRegionSet, NormalizedBoundingBox, OcrRegion};

/// Average angle beyond which text counts as vertical.
const VERTICAL_ANGLE_THRESHOLD: f64 = 45.0;

/// GeometryMerger turns a matched region set into one box and a rotation.
pub struct GeometryMerger;

impl GeometryMerger {
    /// Enclosing rectangle of every polygon corner plus the snapped rotation.
    /// `None` for an empty set.
    pub fn merge(regions: &MatchedRegionSet) -> Option<NormalizedBoundingBox> {
        if regions.is_empty() {
            return None;
        }

        let corners = regions.iter().flat_map(|r| r.polygon.iter());
        let (mut x_min, mut y_min) = (i32::MAX, i32::MAX);
        let (mut x_max, mut y_max) = (i32::MIN, i32::MIN);
        for [x, y] in corners {
            x_min = x_min.min(*x);
            y_min = y_min.min(*y);
            x_max = x_max.max(*x);
            y_max = y_max.max(*y);
        }

        let angles: Vec<f64> = regions.iter().map(Self::text_angle).collect();
        let average = angles.iter().sum::<f64>() / angles.len() as f64;

        Some(NormalizedBoundingBox {
            x: x_min,
            y: y_min,
            w: x_max - x_min,
            h: y_max - y_min,
            rotation_degrees: Self::snap_rotation(average),
        })
    }

    /// Angle of the top edge in degrees, image coordinates (y grows downward).
    /// 0 is horizontal, +90 runs downward, -90 runs upward.
    pub fn text_angle(region: &OcrRegion) -> f64 {
        let [x1, y1] = region.top_left();
        let [x2, y2] = region.top_right();
        let dy = (y2 - y1) as f64;
        let dx = (x2 - x1) as f64;
        dy.atan2(dx).to_degrees()
    }

    /// Only right-angle corrections are applied: 0, +90 or -90.
    pub fn snap_rotation(average_angle: f64) -> f64 {
        if average_angle.abs() > VERTICAL_ANGLE_THRESHOLD {
            90.0_f64.copysign(average_angle)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(regions: Vec<OcrRegion>) -> MatchedRegionSet {
        MatchedRegionSet::new(regions)
    }

    #[test]
    fn test_single_region_extent() {
        let region = OcrRegion::new("40% ALC BY VOL", [[10, 10], [120, 10], [120, 30], [10, 30]], 0.9);
        let bbox = GeometryMerger::merge(&set(vec![region])).unwrap();
        assert_eq!(bbox.to_array(), [10, 10, 110, 20]);
        assert_eq!(bbox.rotation_degrees, 0.0);
    }

    #[test]
    fn test_single_skewed_region_uses_all_corners() {
        let region = OcrRegion::new("SKEWED", [[12, 40], [100, 20], [105, 45], [17, 65]], 0.9);
        let bbox = GeometryMerger::merge(&set(vec![region])).unwrap();
        assert_eq!(bbox.to_array(), [12, 20, 93, 45]);
        // about -12.8 degrees, below the vertical threshold
        assert_eq!(bbox.rotation_degrees, 0.0);
    }

    #[test]
    fn test_multiple_regions_enclosed() {
        let regions = vec![
            OcrRegion::from_rect("A", 50, 40, 30, 10, 0.9),
            OcrRegion::from_rect("B", 10, 60, 20, 15, 0.9),
        ];
        let bbox = GeometryMerger::merge(&set(regions)).unwrap();
        assert_eq!(bbox.to_array(), [10, 40, 70, 35]);
    }

    #[test]
    fn test_vertical_text_snaps() {
        // Top edge runs downward
        let down = OcrRegion::new("DOWN", [[100, 10], [100, 110], [80, 110], [80, 10]], 0.9);
        let bbox = GeometryMerger::merge(&set(vec![down])).unwrap();
        assert_eq!(bbox.rotation_degrees, 90.0);

        // Top edge runs upward
        let up = OcrRegion::new("UP", [[10, 110], [14, 10], [34, 10], [30, 110]], 0.9);
        let bbox = GeometryMerger::merge(&set(vec![up])).unwrap();
        assert_eq!(bbox.rotation_degrees, -90.0);
    }

    #[test]
    fn test_rotation_is_always_snapped() {
        for angle in [-179.0, -91.0, -60.0, -45.0, -15.0, 0.0, 15.0, 44.9, 46.0, 135.0] {
            let rotation = GeometryMerger::snap_rotation(angle);
            assert!(rotation == 0.0 || rotation == 90.0 || rotation == -90.0);
        }
        assert_eq!(GeometryMerger::snap_rotation(15.0), 0.0);
        assert_eq!(GeometryMerger::snap_rotation(-60.0), -90.0);
    }

    #[test]
    fn test_empty_set() {
        assert!(GeometryMerger::merge(&MatchedRegionSet::empty()).is_none());
    }
}
