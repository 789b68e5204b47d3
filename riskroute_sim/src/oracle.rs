//! Ground truth oracle for flood scenarios.
//!
//! The oracle knows the true water depth everywhere in the simulated city
//! and turns it into the noisy, duplicated, sometimes broken observation
//! stream the fusion engine has to cope with:
//! - Official gauges read the depth at each flood centre
//! - Crowd reports land at random points inside a flood, with position and
//!   depth noise
//! - Malformed payloads exercise the rejection path

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use riskroute_core::decay::FlowRegime;
use riskroute_core::geodesy::offset_m;
use riskroute_core::observation::{RawEdge, RawTimestamp};
use riskroute_core::{Coordinate, EdgeRef, RawObservation, SourceKind};
use riskroute_env::ObservationEnvelope;
use serde::{Deserialize, Serialize};

/// A circular flooded area with depth falling linearly to zero at the rim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodZone {
    pub center: Coordinate,
    pub radius_m: f64,
    pub peak_depth_m: f64,
    pub flow: FlowRegime,
}

impl FloodZone {
    pub fn new(center: Coordinate, radius_m: f64, peak_depth_m: f64) -> Self {
        Self {
            center,
            radius_m,
            peak_depth_m,
            flow: FlowRegime::Stagnant,
        }
    }

    /// True depth at `point`.
    pub fn depth_at(&self, point: &Coordinate) -> f64 {
        let d = self.center.distance_m(point);
        if d >= self.radius_m {
            0.0
        } else {
            self.peak_depth_m * (1.0 - d / self.radius_m)
        }
    }
}

/// The HazardOracle - maintains ground truth and generates observations.
pub struct HazardOracle {
    /// RNG for report placement and noise
    rng: ChaCha8Rng,

    /// Active floods
    zones: Vec<FloodZone>,

    /// Crowd report position noise standard deviation (meters)
    position_noise_std_m: f64,

    /// Crowd report depth noise standard deviation (meters)
    depth_noise_std_m: f64,

    /// Sequence number for generated content keys
    next_report: u64,
}

impl HazardOracle {
    /// Creates a new oracle with the given seed.
    ///
    /// The seed should be derived separately from the context seed so that
    /// changing the routing workload doesn't move the reports.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            zones: Vec::new(),
            position_noise_std_m: 15.0,
            depth_noise_std_m: 0.05,
            next_report: 0,
        }
    }

    pub fn add_zone(&mut self, zone: FloodZone) {
        self.zones.push(zone);
    }

    /// The water recedes everywhere.
    pub fn clear_zones(&mut self) {
        self.zones.clear();
    }

    pub fn zones(&self) -> &[FloodZone] {
        &self.zones
    }

    /// Deepest true water at `point` over all zones.
    pub fn true_depth_at(&self, point: &Coordinate) -> f64 {
        self.zones
            .iter()
            .map(|z| z.depth_at(point))
            .fold(0.0, f64::max)
    }

    // ========================================================================
    // OBSERVATION GENERATION
    // ========================================================================

    /// One official gauge reading per zone, taken at the zone centre.
    pub fn gauge_readings(&self, now: f64) -> Vec<RawObservation> {
        self.zones
            .iter()
            .enumerate()
            .map(|(i, zone)| RawObservation {
                source: Some(SourceKind::Official.as_str().to_string()),
                lat: Some(zone.center.lat),
                lon: Some(zone.center.lon),
                depth_m: Some(zone.peak_depth_m),
                confidence: Some(0.95),
                observed_at: Some(RawTimestamp::Seconds(now)),
                content_key: Some(format!("gauge-{}-{}", i, now as i64)),
                radius_m: Some(zone.radius_m),
                flow: Some(zone.flow),
                ..Default::default()
            })
            .collect()
    }

    /// `count` crowd reports at random points inside the active zones.
    ///
    /// Reports are a little stale (up to two minutes old) and carry noisy
    /// positions and depths.
    pub fn crowd_reports(&mut self, count: usize, now: f64) -> Vec<RawObservation> {
        if self.zones.is_empty() {
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(count);
        for _ in 0..count {
            let zone = self.zones[self.rng.gen_range(0..self.zones.len())];

            // Uniform over the disc
            let angle = self.rng.gen_range(0.0..std::f64::consts::TAU);
            let r = zone.radius_m * self.rng.gen::<f64>().sqrt();
            let truth = offset_m(&zone.center, r * angle.cos(), r * angle.sin());
            let depth = zone.depth_at(&truth);

            let reported = offset_m(
                &truth,
                self.gaussian(self.position_noise_std_m),
                self.gaussian(self.position_noise_std_m),
            );
            let depth_noise = self.gaussian(self.depth_noise_std_m);
            let confidence = self.rng.gen_range(0.5..0.9);
            let age_s = self.rng.gen_range(0.0..120.0);

            self.next_report += 1;
            reports.push(RawObservation {
                source: Some(SourceKind::Crowdsourced.as_str().to_string()),
                lat: Some(reported.lat),
                lon: Some(reported.lon),
                depth_m: Some((depth + depth_noise).max(0.0)),
                confidence: Some(confidence),
                observed_at: Some(RawTimestamp::Seconds(now - age_s)),
                content_key: Some(format!("crowd-{}", self.next_report)),
                flow: Some(zone.flow),
                ..Default::default()
            });
        }
        reports
    }

    /// A direct report about one edge, e.g. a closed bridge.
    pub fn edge_report(&mut self, kind: SourceKind, edge: EdgeRef, severity: f64, now: f64) -> RawObservation {
        self.next_report += 1;
        RawObservation {
            source: Some(kind.as_str().to_string()),
            edge: Some(RawEdge {
                from: edge.from.0,
                to: edge.to.0,
                key: edge.key,
            }),
            severity: Some(severity),
            confidence: Some(1.0),
            observed_at: Some(RawTimestamp::Seconds(now)),
            content_key: Some(format!("edge-{}-{}", edge, self.next_report)),
            ..Default::default()
        }
    }

    /// Payloads that must all be rejected by validation.
    pub fn malformed_payloads(&mut self, count: usize, now: f64) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                let text = match (i + self.rng.gen_range(0..5)) % 5 {
                    0 => "{not json".to_string(),
                    1 => format!(r#"{{"lat":14.6,"lon":121.0,"severity":0.5,"observed_at":{now}}}"#),
                    2 => format!(r#"{{"source":"official","lat":14.6,"lon":121.0,"severity":1.7,"observed_at":{now}}}"#),
                    3 => format!(r#"{{"source":"rumor","lat":14.6,"lon":121.0,"severity":0.5,"observed_at":{now}}}"#),
                    _ => format!(r#"{{"source":"crowdsourced","lat":95.0,"lon":121.0,"severity":0.5,"observed_at":{now}}}"#),
                };
                text.into_bytes()
            })
            .collect()
    }

    // ========== Private Helper Methods ==========

    fn gaussian(&mut self, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * std_dev
    }
}

/// Wraps a raw observation in a transport envelope.
pub fn to_envelope(
    raw: &RawObservation,
    channel: &str,
    received_at_ms: u64,
) -> Result<ObservationEnvelope, serde_json::Error> {
    Ok(ObservationEnvelope::new(serde_json::to_vec(raw)?, received_at_ms, channel))
}
