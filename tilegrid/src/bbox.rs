use crate::{ceil_deg, floor_deg, GridError};

/// Whole-degree bounding box.
///
/// `min_lon > max_lon` encodes a box crossing the antimeridian; the
/// longitude walk then wraps at W180.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub min_lon: i32,
    pub min_lat: i32,
    pub max_lon: i32,
    pub max_lat: i32,
}

impl BBox {
    pub fn new(min_lon: i32, min_lat: i32, max_lon: i32, max_lat: i32) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Parses a `minLon:minLat:maxLon:maxLat` area string, subtracts
    /// the correction offsets and snaps outward to whole tile edges,
    /// so the result always contains the requested real-valued area.
    pub fn from_area(area: &str, corr_x: f64, corr_y: f64) -> Result<Self, GridError> {
        let mk_err = || GridError::AreaFormat(area.to_owned());
        let mut values = [0.0_f64; 4];
        let mut parts = area.split(':');
        for (value, corr) in values.iter_mut().zip([corr_x, corr_y, corr_x, corr_y]) {
            *value = parts
                .next()
                .and_then(|part| part.trim().parse::<f64>().ok())
                .filter(|parsed| parsed.is_finite())
                .ok_or_else(mk_err)?
                - corr;
        }
        if parts.next().is_some() {
            return Err(mk_err());
        }
        Ok(Self {
            min_lon: floor_deg(values[0]),
            min_lat: floor_deg(values[1]),
            max_lon: ceil_deg(values[2]),
            max_lat: ceil_deg(values[3]),
        })
    }

    /// Longitude columns covered by this box, west to east, wrapping
    /// at the antimeridian when needed.
    pub fn lon_range(&self) -> impl Iterator<Item = i32> {
        let (east_of_min, west_of_max) = if self.min_lon > self.max_lon {
            (self.min_lon..180, -180..self.max_lon)
        } else {
            (self.min_lon..self.max_lon, 0..0)
        };
        east_of_min.chain(west_of_max)
    }

    /// Latitude rows covered by this box, south to north.
    pub fn lat_range(&self) -> std::ops::Range<i32> {
        self.min_lat..self.max_lat
    }
}

#[cfg(test)]
mod tests {
    use super::BBox;

    #[test]
    fn test_from_area_exact_integers() {
        let bbox = BBox::from_area("0:0:10:10", 0.0, 0.0).unwrap();
        assert_eq!(bbox, BBox::new(0, 0, 10, 10));
    }

    #[test]
    fn test_from_area_negative_fractions_snap_outward() {
        let bbox = BBox::from_area("-10.5:-10.5:-0.5:-0.5", 0.0, 0.0).unwrap();
        assert_eq!(bbox, BBox::new(-11, -11, 0, 0));
    }

    #[test]
    fn test_from_area_positive_fractions_snap_outward() {
        let bbox = BBox::from_area("0.5:0.5:10.5:10.5", 0.0, 0.0).unwrap();
        assert_eq!(bbox, BBox::new(0, 0, 11, 11));
    }

    #[test]
    fn test_from_area_contains_requested_box() {
        let bbox = BBox::from_area("5.25:-3.75:7.1:2.9", 0.0, 0.0).unwrap();
        assert_eq!(bbox, BBox::new(5, -4, 8, 3));
    }

    #[test]
    fn test_from_area_applies_corrections() {
        let bbox = BBox::from_area("0.5:0.5:1.5:1.5", 0.5, 0.5).unwrap();
        assert_eq!(bbox, BBox::new(0, 0, 1, 1));
    }

    #[test]
    fn test_from_area_rejects_malformed_strings() {
        assert!(BBox::from_area("", 0.0, 0.0).is_err());
        assert!(BBox::from_area("1:2:3", 0.0, 0.0).is_err());
        assert!(BBox::from_area("1:2:3:4:5", 0.0, 0.0).is_err());
        assert!(BBox::from_area("a:b:c:d", 0.0, 0.0).is_err());
        assert!(BBox::from_area("1:2:3:nan", 0.0, 0.0).is_err());
    }

    #[test]
    fn test_lon_range_plain() {
        let bbox = BBox::new(1, 2, 3, 4);
        assert_eq!(bbox.lon_range().collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn test_lon_range_wraps_at_antimeridian() {
        let bbox = BBox::new(178, 0, -178, 1);
        assert_eq!(bbox.lon_range().collect::<Vec<_>>(), [178, 179, -180, -179]);
    }

    #[test]
    fn test_empty_box_has_no_columns() {
        let bbox = BBox::new(0, 0, 0, 0);
        assert_eq!(bbox.lon_range().count(), 0);
        assert_eq!(bbox.lat_range().count(), 0);
    }
}
