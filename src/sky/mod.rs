mod site;

pub use site::Site;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizontal {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
}

/// Converts an equatorial position (degrees) into the mount's horizontal
/// frame for "now".
pub trait HorizontalTransform: Send + Sync {
    fn to_horizontal(&self, ra_deg: f64, dec_deg: f64) -> Horizontal;
}
