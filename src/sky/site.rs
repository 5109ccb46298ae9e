use chrono::{DateTime, Utc};
use std::f64::consts::TAU;

use super::{Horizontal, HorizontalTransform};

/// Observer location on the Earth's surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Site {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Site {
    /// Parses `"lat, lon"` in degrees.
    pub fn from_coordinates(coordinates: &str) -> Option<Self> {
        let parts: Vec<_> = coordinates.split(',').map(|s| s.trim()).collect();
        if parts.len() != 2 {
            return None;
        }
        let lat: f64 = parts[0].parse().ok()?;
        let lon: f64 = parts[1].parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self {
            latitude_deg: lat,
            longitude_deg: lon,
        })
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn local_sidereal_rad(&self, at: DateTime<Utc>) -> f64 {
        let gmst =
            sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&at.naive_utc()));
        (gmst + self.lon_rad()).rem_euclid(TAU)
    }

    /// Altitude/azimuth of an equatorial position (degrees) at `at`.
    /// Azimuth runs from north through east.
    pub fn horizontal_at(&self, ra_deg: f64, dec_deg: f64, at: DateTime<Utc>) -> Horizontal {
        let hour_angle = self.local_sidereal_rad(at) - ra_deg.to_radians();
        let dec = dec_deg.to_radians();
        let lat = self.lat_rad();

        let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * hour_angle.cos();
        let altitude = sin_alt.clamp(-1.0, 1.0).asin();

        let y = -dec.cos() * hour_angle.sin();
        let x = dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos();
        let azimuth = y.atan2(x).rem_euclid(TAU);

        Horizontal {
            altitude_deg: round2(altitude.to_degrees()),
            azimuth_deg: round2(azimuth.to_degrees()).rem_euclid(360.0),
        }
    }
}

impl HorizontalTransform for Site {
    fn to_horizontal(&self, ra_deg: f64, dec_deg: f64) -> Horizontal {
        self.horizontal_at(ra_deg, dec_deg, Utc::now())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn paris() -> Site {
        Site::from_coordinates("48.85, 2.35").unwrap()
    }

    fn local_sidereal_deg(site: &Site, at: DateTime<Utc>) -> f64 {
        site.local_sidereal_rad(at).to_degrees()
    }

    #[test]
    fn parses_coordinates() {
        let site = paris();
        assert_eq!(site.latitude_deg, 48.85);
        assert_eq!(site.longitude_deg, 2.35);
        assert!(Site::from_coordinates("48.85").is_none());
        assert!(Site::from_coordinates("91, 0").is_none());
        assert!(Site::from_coordinates("north, east").is_none());
    }

    #[test]
    fn object_at_local_meridian_and_site_latitude_is_at_zenith() {
        let site = paris();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap();
        let ra = local_sidereal_deg(&site, at);

        let h = site.horizontal_at(ra, site.latitude_deg, at);
        assert!((h.altitude_deg - 90.0).abs() < 0.02, "{:?}", h);
    }

    #[test]
    fn southern_meridian_transit() {
        let site = paris();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap();
        let ra = local_sidereal_deg(&site, at);

        let h = site.horizontal_at(ra, site.latitude_deg - 30.0, at);
        assert!((h.altitude_deg - 60.0).abs() < 0.02, "{:?}", h);
        assert!((h.azimuth_deg - 180.0).abs() < 0.02, "{:?}", h);
    }

    #[test]
    fn celestial_pole_sits_at_site_latitude() {
        let site = paris();
        let at = Utc.with_ymd_and_hms(2026, 7, 14, 3, 30, 0).unwrap();

        let h = site.horizontal_at(123.0, 90.0, at);
        assert!((h.altitude_deg - site.latitude_deg).abs() < 0.02, "{:?}", h);
    }

    #[test]
    fn object_east_of_meridian_has_eastern_azimuth() {
        let site = paris();
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 20, 0, 0).unwrap();
        let ra = local_sidereal_deg(&site, at) + 60.0;

        let h = site.horizontal_at(ra.rem_euclid(360.0), 10.0, at);
        assert!(h.azimuth_deg > 0.0 && h.azimuth_deg < 180.0, "{:?}", h);
    }
}
