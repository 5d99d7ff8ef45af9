use super::Coordinate;

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance between two coordinates, in meters (haversine).
pub fn distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero() {
        let p = Coordinate::new(48.8584, 2.2945);
        assert_eq!(distance_m(&p, &p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        // One degree of latitude is ~111.2 km on a spherical Earth.
        let a = Coordinate::new(10.0, 20.0);
        let b = Coordinate::new(11.0, 20.0);
        let d = distance_m(&a, &b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = Coordinate::new(-33.8688, 151.2093);
        let b = Coordinate::new(-33.8650, 151.2094);
        assert!((distance_m(&a, &b) - distance_m(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn small_offsets_scale_linearly() {
        let center = Coordinate::new(52.52, 13.405);
        let near = Coordinate::new(52.5202, 13.405);
        let far = Coordinate::new(52.5204, 13.405);
        let d_near = distance_m(&center, &near);
        let d_far = distance_m(&center, &far);
        assert!((d_far / d_near - 2.0).abs() < 1e-6);
    }
}
