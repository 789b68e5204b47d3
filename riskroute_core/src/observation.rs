//! Hazard observations - wire form, validation and content hashing.
//!
//! Producers send loosely typed JSON ([`RawObservation`]) inside an
//! [`ObservationEnvelope`]. Each payload is validated exactly once into a
//! [`HazardObservation`]; anything malformed becomes a [`ValidationError`]
//! that the fusion engine counts and drops.

use crate::decay::{DepthCalibration, FlowRegime};
use crate::geodesy::Coordinate;
use crate::graph::{EdgeRef, NodeId};
use riskroute_env::ObservationEnvelope;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TYPED OBSERVATION
// ============================================================================

/// Where an observation came from. Each kind has its own trust weight and
/// temporal decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Agency bulletins, gauges, flood models
    Official,
    /// Citizen reports, social posts
    Crowdsourced,
    /// Long-term flood history
    Historical,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Official, SourceKind::Crowdsourced, SourceKind::Historical];

    /// Dense index for per-kind arrays.
    pub fn index(self) -> usize {
        match self {
            SourceKind::Official => 0,
            SourceKind::Crowdsourced => 1,
            SourceKind::Historical => 2,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "official" => Some(SourceKind::Official),
            "crowdsourced" | "crowd" => Some(SourceKind::Crowdsourced),
            "historical" => Some(SourceKind::Historical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Official => "official",
            SourceKind::Crowdsourced => "crowdsourced",
            SourceKind::Historical => "historical",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point observation spreads to nearby edges; an edge observation applies
/// to that edge only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HazardLocation {
    Point(Coordinate),
    Edge(EdgeRef),
}

/// What the observation measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HazardMeasure {
    /// Direct severity estimate in [0, 1]
    Severity(f64),
    /// Water depth in meters, converted through the depth calibration
    DepthMeters(f64),
}

impl HazardMeasure {
    pub fn severity(&self, calibration: &DepthCalibration) -> f64 {
        match *self {
            HazardMeasure::Severity(s) => s,
            HazardMeasure::DepthMeters(depth) => calibration.risk(depth),
        }
    }
}

/// A validated hazard observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardObservation {
    pub source_kind: SourceKind,
    pub location: HazardLocation,
    pub measure: HazardMeasure,
    /// Producer confidence in [0, 1]
    pub confidence: f64,
    /// Unix seconds
    pub observed_at: f64,
    /// Deduplication key (supplied or derived)
    pub content_key: String,
    /// Overrides the configured radius of influence
    pub radius_m: Option<f64>,
    /// Overrides the configured spatial decay shape
    pub flow: Option<FlowRegime>,
}

impl HazardObservation {
    /// Stable 64-bit hash of the content key.
    pub fn content_hash(&self) -> u64 {
        content_hash(&self.content_key)
    }
}

/// FNV-1a over the UTF-8 bytes of `key`. Stable across processes and
/// platforms, unlike `std`'s randomized hasher.
pub fn content_hash(key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    key.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

// ============================================================================
// WIRE FORM
// ============================================================================

/// Edge reference as producers send it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub from: u64,
    pub to: u64,
    #[serde(default)]
    pub key: u32,
}

/// Unix seconds or RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

/// Observation as received on the wire. Every field is optional so that
/// decoding never fails on a missing field; [`RawObservation::validate`]
/// decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObservation {
    pub source: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub edge: Option<RawEdge>,
    pub severity: Option<f64>,
    pub depth_m: Option<f64>,
    pub confidence: Option<f64>,
    pub observed_at: Option<RawTimestamp>,
    pub content_key: Option<String>,
    pub radius_m: Option<f64>,
    pub flow: Option<FlowRegime>,
}

impl RawObservation {
    /// Validates into a typed observation.
    ///
    /// # Arguments
    /// * `now` - Current unix time in seconds
    /// * `max_future_skew_s` - How far ahead of `now` a timestamp may be
    pub fn validate(self, now: f64, max_future_skew_s: f64) -> Result<HazardObservation, ValidationError> {
        let source = self.source.ok_or(ValidationError::MissingField("source"))?;
        let source_kind = SourceKind::parse(&source).ok_or(ValidationError::UnknownSource(source))?;

        let location = match (self.edge, self.lat, self.lon) {
            (Some(edge), _, _) => HazardLocation::Edge(EdgeRef::new(NodeId(edge.from), NodeId(edge.to), edge.key)),
            (None, Some(lat), Some(lon)) => {
                let point = Coordinate::new(lat, lon);
                if !point.is_valid() {
                    return Err(ValidationError::InvalidCoordinates { lat, lon });
                }
                HazardLocation::Point(point)
            }
            _ => return Err(ValidationError::MissingLocation),
        };

        // A physical depth reading takes precedence over a severity guess
        let measure = match (self.depth_m, self.severity) {
            (Some(depth), _) => {
                if !depth.is_finite() || depth < 0.0 {
                    return Err(ValidationError::OutOfRange { field: "depth_m", value: depth });
                }
                HazardMeasure::DepthMeters(depth)
            }
            (None, Some(severity)) => HazardMeasure::Severity(unit_interval("severity", severity)?),
            (None, None) => return Err(ValidationError::MissingField("severity")),
        };

        let confidence = unit_interval(
            "confidence",
            self.confidence.ok_or(ValidationError::MissingField("confidence"))?,
        )?;

        let observed_at = parse_timestamp(self.observed_at.ok_or(ValidationError::MissingField("observed_at"))?)?;
        if observed_at > now + max_future_skew_s {
            return Err(ValidationError::FutureTimestamp { observed_at, now });
        }

        if let Some(radius) = self.radius_m {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(ValidationError::OutOfRange { field: "radius_m", value: radius });
            }
        }

        let content_key = match self.content_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => derive_content_key(source_kind, &location, &measure, observed_at),
        };

        Ok(HazardObservation {
            source_kind,
            location,
            measure,
            confidence,
            observed_at,
            content_key,
            radius_m: self.radius_m,
            flow: self.flow,
        })
    }
}

/// Decodes and validates one envelope payload.
pub fn decode_envelope(
    envelope: &ObservationEnvelope,
    now: f64,
    max_future_skew_s: f64,
) -> Result<HazardObservation, ValidationError> {
    let raw: RawObservation =
        serde_json::from_slice(&envelope.payload).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    raw.validate(now, max_future_skew_s)
}

// ========== Private Helpers ==========

fn unit_interval(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

fn parse_timestamp(raw: RawTimestamp) -> Result<f64, ValidationError> {
    match raw {
        RawTimestamp::Seconds(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        RawTimestamp::Seconds(secs) => Err(ValidationError::InvalidTimestamp(secs.to_string())),
        RawTimestamp::Text(text) => chrono::DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_millis()) / 1000.0)
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{text}: {e}"))),
    }
}

/// Canonical key for producers that do not supply one. Identical reports
/// (same source, place, reading and second) collapse onto the same key.
fn derive_content_key(kind: SourceKind, location: &HazardLocation, measure: &HazardMeasure, observed_at: f64) -> String {
    let place = match location {
        HazardLocation::Point(p) => format!("pt:{:.6},{:.6}", p.lat, p.lon),
        HazardLocation::Edge(e) => format!("edge:{e}"),
    };
    let reading = match measure {
        HazardMeasure::Severity(s) => format!("sev:{s:.4}"),
        HazardMeasure::DepthMeters(d) => format!("depth:{d:.3}"),
    };
    format!("{kind}|{place}|{reading}|{}", observed_at.floor() as i64)
}

// ============================================================================
// ERRORS
// ============================================================================

/// Reasons an inbound observation is dropped. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Observation has neither a point nor an edge location")]
    MissingLocation,

    #[error("Unknown source kind: {0}")]
    UnknownSource(String),

    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Invalid coordinates ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Timestamp {observed_at} is too far ahead of now ({now})")]
    FutureTimestamp { observed_at: f64, now: f64 },

    #[error("Edge {0} is not part of the road graph")]
    UnknownEdge(EdgeRef),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NOW: f64 = 1_700_000_000.0;

    fn envelope(json: &str) -> ObservationEnvelope {
        ObservationEnvelope::new(json.as_bytes().to_vec(), 0, "test")
    }

    #[test]
    fn test_decode_point_severity() {
        let obs = decode_envelope(
            &envelope(
                r#"{"source":"crowdsourced","lat":14.6,"lon":121.0,"severity":0.8,
                    "confidence":0.9,"observed_at":1700000000,"content_key":"post-1"}"#,
            ),
            NOW,
            300.0,
        )
        .unwrap();
        assert_eq!(obs.source_kind, SourceKind::Crowdsourced);
        assert_eq!(obs.location, HazardLocation::Point(Coordinate::new(14.6, 121.0)));
        assert_eq!(obs.measure, HazardMeasure::Severity(0.8));
        assert_eq!(obs.content_key, "post-1");
    }

    #[test]
    fn test_decode_edge_depth_with_rfc3339() {
        let obs = decode_envelope(
            &envelope(
                r#"{"source":"official","edge":{"from":1,"to":2},"depth_m":0.45,
                    "confidence":1.0,"observed_at":"2023-11-14T22:13:20Z"}"#,
            ),
            NOW,
            300.0,
        )
        .unwrap();
        assert_eq!(obs.location, HazardLocation::Edge(EdgeRef::new(NodeId(1), NodeId(2), 0)));
        assert_relative_eq!(obs.observed_at, NOW);
        assert_relative_eq!(obs.measure.severity(&DepthCalibration::default()), 0.8176, epsilon = 1e-3);
    }

    #[test]
    fn test_rejects_malformed_inputs() {
        let cases = [
            ("not json", "Malformed"),
            (r#"{"source":"official","severity":0.5,"confidence":1,"observed_at":1}"#, "MissingLocation"),
            (r#"{"source":"official","lat":1,"lon":1,"severity":1.5,"confidence":1,"observed_at":1}"#, "OutOfRange"),
            (r#"{"source":"official","lat":1,"lon":1,"depth_m":-0.1,"confidence":1,"observed_at":1}"#, "OutOfRange"),
            (r#"{"source":"radio","lat":1,"lon":1,"severity":0.5,"confidence":1,"observed_at":1}"#, "UnknownSource"),
            (r#"{"source":"official","lat":1,"lon":1,"severity":0.5,"confidence":1,"observed_at":"yesterday"}"#, "InvalidTimestamp"),
            (r#"{"source":"official","lat":95,"lon":1,"severity":0.5,"confidence":1,"observed_at":1}"#, "InvalidCoordinates"),
        ];
        for (json, expected) in cases {
            let err = decode_envelope(&envelope(json), NOW, 300.0).unwrap_err();
            assert!(format!("{err:?}").starts_with(expected), "{json} -> {err:?}");
        }
    }

    #[test]
    fn test_rejects_far_future_timestamp() {
        let raw = RawObservation {
            source: Some("official".into()),
            lat: Some(14.6),
            lon: Some(121.0),
            severity: Some(0.5),
            confidence: Some(1.0),
            observed_at: Some(RawTimestamp::Seconds(NOW + 3600.0)),
            ..Default::default()
        };
        assert!(matches!(
            raw.clone().validate(NOW, 300.0),
            Err(ValidationError::FutureTimestamp { .. })
        ));

        // Small skew is tolerated
        let mut near = raw;
        near.observed_at = Some(RawTimestamp::Seconds(NOW + 60.0));
        assert!(near.validate(NOW, 300.0).is_ok());
    }

    #[test]
    fn test_derived_content_key_is_stable() {
        let raw = RawObservation {
            source: Some("crowdsourced".into()),
            lat: Some(14.6),
            lon: Some(121.0),
            severity: Some(0.7),
            confidence: Some(0.6),
            observed_at: Some(RawTimestamp::Seconds(NOW + 0.4)),
            ..Default::default()
        };
        let a = raw.clone().validate(NOW, 300.0).unwrap();
        let b = raw.validate(NOW, 300.0).unwrap();
        assert_eq!(a.content_key, b.content_key);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(content_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(content_hash("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
