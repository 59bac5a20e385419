use super::helpers::rearrange;

/// A latitude/longitude rectangle, in degrees. Bounds are inclusive.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
    _private: (),
}

impl BoundingBox {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        let (south, north) = rearrange(south, north);
        let (west, east) = rearrange(west, east);
        Self {
            south,
            north,
            west,
            east,
            _private: (),
        }
    }

    /// A square box centered on `(lat, lon)` reaching `half_width` degrees in each direction.
    pub fn around(lat: f64, lon: f64, half_width: f64) -> Self {
        let half_width = half_width.abs();
        Self::new(
            lat - half_width,
            lat + half_width,
            lon - half_width,
            lon + half_width,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.south <= lat && lat <= self.north && self.west <= lon && lon <= self.east
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_around() {
        let bbox = BoundingBox::around(30.2672, -97.7431, 0.25);
        assert!((bbox.south - 30.0172).abs() < 1e-9);
        assert!((bbox.north - 30.5172).abs() < 1e-9);
        assert!((bbox.west - -97.9931).abs() < 1e-9);
        assert!((bbox.east - -97.4931).abs() < 1e-9);
        assert!(bbox.contains(30.2672, -97.7431));
        assert!(!bbox.contains(30.6, -97.7431));
    }

    #[test]
    fn test_new_rearranges() {
        let bbox = BoundingBox::new(31.0, 30.0, -97.0, -98.0);
        assert_eq!(bbox.south, 30.0);
        assert_eq!(bbox.north, 31.0);
        assert_eq!(bbox.west, -98.0);
        assert_eq!(bbox.east, -97.0);
    }
}
