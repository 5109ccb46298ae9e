use serde::Serialize;
use serde_json::json;

use super::error::SessionError;
use crate::sky::Horizontal;
use crate::transport::Command;

pub const TAKE_CONTROL: &str = "/v1/app/takeControl";
pub const GO_ABSOLUTE: &str = "/v1/motors/goAbsolute";
pub const START_OBSERVATION: &str = "/v1/general/startObservation";
pub const STOP_OBSERVATION: &str = "/v1/general/stopObservation";
pub const PARK: &str = "/v1/general/park";
pub const FOCUS: &str = "/v1/general/adjustObservationFocus";
pub const OPEN_ARM: &str = "/v1/general/openForMaintenance";
pub const START_AUTO_INIT: &str = "/v1/general/startAutoInit";

// Fixed imaging pipeline settings expected by the controller.
const DO_STACKING: bool = true;
const HISTOGRAM_ENABLED: bool = true;
const HISTOGRAM_LOW: f64 = -0.75;
const HISTOGRAM_MEDIUM: i64 = 5;
const HISTOGRAM_HIGH: i64 = 0;
const BACKGROUND_ENABLED: bool = true;
const BACKGROUND_POLYORDER: i64 = 4;

#[derive(Debug, Serialize)]
pub struct GoAbsolute {
    #[serde(rename = "ALT")]
    pub alt: f64,
    #[serde(rename = "AZ")]
    pub az: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartObservation {
    pub ra: f64,
    pub de: f64,
    #[serde(rename = "isJ2000")]
    pub is_j2000: bool,
    pub rot: i64,
    pub object_id: String,
    pub object_name: String,
    pub gain: i64,
    pub exposure_micro_sec: i64,
    pub do_stacking: bool,
    pub histogram_enabled: bool,
    pub histogram_low: f64,
    pub histogram_medium: i64,
    pub histogram_high: i64,
    pub background_enabled: bool,
    pub background_polyorder: i64,
}

impl StartObservation {
    pub fn new(ra: f64, dec: f64, name: &str, exposure_s: f64, gain: f64) -> Self {
        Self {
            ra,
            de: dec,
            is_j2000: true,
            rot: 0,
            object_id: object_id(name),
            object_name: name.to_string(),
            gain: gain_units(gain),
            exposure_micro_sec: exposure_micros(exposure_s),
            do_stacking: DO_STACKING,
            histogram_enabled: HISTOGRAM_ENABLED,
            histogram_low: HISTOGRAM_LOW,
            histogram_medium: HISTOGRAM_MEDIUM,
            histogram_high: HISTOGRAM_HIGH,
            background_enabled: BACKGROUND_ENABLED,
            background_polyorder: BACKGROUND_POLYORDER,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AutoInit {
    pub latitude: f64,
    pub longitude: f64,
    /// Wall clock at send time, epoch milliseconds.
    pub time: i64,
}

/// Collapses whitespace runs and joins the words with underscores.
pub fn object_id(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Exposure in whole microseconds.
///
/// Rounds to nearest rather than truncating, so `0.1` s is sent as `100000`
/// instead of `99999`. Older controller clients truncate, which can differ
/// by one unit on the wire.
pub fn exposure_micros(seconds: f64) -> i64 {
    (seconds * 1_000_000.0).round() as i64
}

/// Gain in tenths, rounded to nearest like [`exposure_micros`]: `2.35`
/// becomes `24` where a truncating client would send `23`.
pub fn gain_units(gain: f64) -> i64 {
    (gain * 10.0).round() as i64
}

pub fn build<P: Serialize>(endpoint: &str, payload: &P) -> Result<Command, SessionError> {
    let payload =
        serde_json::to_value(payload).map_err(|e| SessionError::InvalidArgument(e.to_string()))?;
    Ok(Command::new(endpoint, payload))
}

pub fn empty(endpoint: &str) -> Command {
    Command::new(endpoint, json!({}))
}

pub fn go_absolute(target: Horizontal) -> Result<Command, SessionError> {
    build(
        GO_ABSOLUTE,
        &GoAbsolute {
            alt: target.altitude_deg,
            az: target.azimuth_deg,
        },
    )
}

/// Status label shown once the controller accepted a command.
pub fn acknowledgement_label(endpoint: &str, target_name: &str) -> Option<String> {
    let label = match endpoint {
        TAKE_CONTROL => "Control acquired".to_string(),
        GO_ABSOLUTE => "Slewing to target".to_string(),
        START_OBSERVATION if target_name.is_empty() => "Observing".to_string(),
        START_OBSERVATION => format!("Observing {}", target_name),
        STOP_OBSERVATION => "Observation stopped".to_string(),
        PARK => "Parked".to_string(),
        FOCUS => "Focusing".to_string(),
        OPEN_ARM => "Arm open".to_string(),
        START_AUTO_INIT => "Initializing".to_string(),
        _ => return None,
    };
    Some(label)
}

pub fn validate_equatorial(ra_deg: f64, dec_deg: f64) -> Result<(), SessionError> {
    if !ra_deg.is_finite() || !(0.0..360.0).contains(&ra_deg) {
        return Err(SessionError::InvalidArgument(format!(
            "right ascension {} outside [0, 360)",
            ra_deg
        )));
    }
    if !dec_deg.is_finite() || !(-90.0..=90.0).contains(&dec_deg) {
        return Err(SessionError::InvalidArgument(format!(
            "declination {} outside [-90, 90]",
            dec_deg
        )));
    }
    Ok(())
}

pub fn validate_exposure(exposure_s: f64, gain: f64) -> Result<(), SessionError> {
    if !exposure_s.is_finite() || exposure_s <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "exposure {} s must be positive",
            exposure_s
        )));
    }
    if !gain.is_finite() || gain < 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "gain {} must not be negative",
            gain
        )));
    }
    Ok(())
}

pub fn validate_site(latitude: f64, longitude: f64) -> Result<(), SessionError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(SessionError::InvalidArgument(format!(
            "latitude {} outside [-90, 90]",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(SessionError::InvalidArgument(format!(
            "longitude {} outside [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_is_whitespace_free() {
        assert_eq!(object_id("M 42 Nebula"), "M_42_Nebula");
        assert_eq!(object_id("  Andromeda \t  Galaxy\n"), "Andromeda_Galaxy");
        assert_eq!(object_id("Vega"), "Vega");
        assert_eq!(object_id(""), "");
    }

    #[test]
    fn observation_payload_matches_wire_contract() {
        let command = build(
            START_OBSERVATION,
            &StartObservation::new(10.0, 20.0, "M 42 Nebula", 30.0, 20.0),
        )
        .unwrap();
        let payload = command.payload.as_object().unwrap();

        let keys: Vec<_> = payload.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "ra",
                "de",
                "isJ2000",
                "rot",
                "objectId",
                "objectName",
                "gain",
                "exposureMicroSec",
                "doStacking",
                "histogramEnabled",
                "histogramLow",
                "histogramMedium",
                "histogramHigh",
                "backgroundEnabled",
                "backgroundPolyorder",
            ]
        );
        assert_eq!(payload["exposureMicroSec"], json!(30_000_000));
        assert!(payload["exposureMicroSec"].is_i64());
        assert_eq!(payload["gain"], json!(200));
        assert!(payload["gain"].is_i64());
        assert_eq!(payload["objectId"], json!("M_42_Nebula"));
        assert_eq!(payload["objectName"], json!("M 42 Nebula"));
        assert_eq!(payload["isJ2000"], json!(true));
        assert_eq!(payload["histogramLow"], json!(-0.75));
        assert!(payload["histogramMedium"].is_i64());
        assert!(payload["ra"].is_f64());
    }

    #[test]
    fn fractional_units_are_rounded() {
        assert_eq!(exposure_micros(0.1), 100_000);
        assert_eq!(exposure_micros(2.5), 2_500_000);
        assert_eq!(gain_units(12.34), 123);
        assert_eq!(gain_units(2.35), 24);
    }

    #[test]
    fn go_absolute_uses_upper_case_fields() {
        let command = go_absolute(Horizontal {
            altitude_deg: 45.0,
            azimuth_deg: 180.0,
        })
        .unwrap();
        assert_eq!(command.endpoint, GO_ABSOLUTE);
        assert_eq!(command.payload, json!({ "ALT": 45.0, "AZ": 180.0 }));
    }

    #[test]
    fn argument_ranges() {
        assert!(validate_equatorial(0.0, -90.0).is_ok());
        assert!(validate_equatorial(359.99, 90.0).is_ok());
        assert!(validate_equatorial(360.0, 0.0).is_err());
        assert!(validate_equatorial(-1.0, 0.0).is_err());
        assert!(validate_equatorial(10.0, 90.5).is_err());
        assert!(validate_equatorial(f64::NAN, 0.0).is_err());
        assert!(validate_exposure(0.0, 20.0).is_err());
        assert!(validate_exposure(30.0, -1.0).is_err());
        assert!(validate_site(48.8, 2.3).is_ok());
        assert!(validate_site(48.8, 200.0).is_err());
    }

    #[test]
    fn acknowledgement_labels() {
        assert_eq!(
            acknowledgement_label(START_OBSERVATION, "M31").as_deref(),
            Some("Observing M31")
        );
        assert_eq!(acknowledgement_label(PARK, "").as_deref(), Some("Parked"));
        assert_eq!(acknowledgement_label("/v1/unknown", ""), None);
    }
}
