//! Versioned wire encoding (spec §4.9, §6): v0 is a flat JSON array for
//! legacy clients, v1 is a structure-of-arrays payload with delta-encoded
//! fixed-point coordinates against a fixed reference point. Grounded on the
//! original Python `Vehicle.to_json_v0`/`to_compressed_json` and
//! `StaticReferenceSystem`/`ReferenceSystem`
//! (`original_source/zet/webserver/webserver.py`).

use serde::Serialize;

use crate::world_model::{RealtimeState, Vehicle, TRAJECTORY_OUTPUT_LENGTH};

pub const REF_LAT: f64 = 45.815;
pub const REF_LON: f64 = 15.9819;
pub const COORD_NUM_DIGITS: i32 = 6;

/// Delta-encode a sequence against `ref_value`, then against its own rolling
/// predecessor: `round((v0 - ref) * 10^digits), round((v1 - v0) * 10^digits), ...`
pub(crate) fn compress_coords(ref_value: f64, values: &[f64]) -> Vec<i64> {
    let factor = 10f64.powi(COORD_NUM_DIGITS);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = ref_value;
    for &v in values {
        out.push(((v - prev) * factor).round() as i64);
        prev = v;
    }
    out
}

fn direction_degrees(direction_radians: Option<f64>) -> Option<i64> {
    direction_radians.map(|r| (r * 180.0 / std::f64::consts::PI).round() as i64)
}

#[derive(Debug, Serialize)]
struct VehicleJsonV0 {
    #[serde(rename = "routeId")]
    route_id: i64,
    timestamp: i64,
    lat: Vec<f64>,
    lon: Vec<f64>,
    #[serde(rename = "directionDegrees")]
    direction_degrees: Option<i64>,
}

impl VehicleJsonV0 {
    fn from_vehicle(v: &Vehicle) -> Self {
        // Oldest-to-newest within the last TRAJECTORY_OUTPUT_LENGTH points;
        // storage is newest-first (front), so reverse after truncating.
        let lat: Vec<f64> = v.lat.iter().take(TRAJECTORY_OUTPUT_LENGTH).rev().copied().collect();
        let lon: Vec<f64> = v.lon.iter().take(TRAJECTORY_OUTPUT_LENGTH).rev().copied().collect();
        VehicleJsonV0 {
            route_id: v.route_id,
            timestamp: v.timestamp,
            lat,
            lon,
            direction_degrees: direction_degrees(v.direction_radians),
        }
    }
}

pub fn encode_v0(state: &RealtimeState) -> Result<String, serde_json::Error> {
    let vehicles: Vec<VehicleJsonV0> = state
        .fresh_vehicles()
        .map(|(_, v)| VehicleJsonV0::from_vehicle(v))
        .collect();
    serde_json::to_string(&vehicles)
}

#[derive(Debug, Serialize)]
struct VehiclesV1 {
    #[serde(rename = "routeIds")]
    route_ids: Vec<i64>,
    #[serde(rename = "shapeIds")]
    shape_ids: Vec<Option<String>>,
    timestamps: Vec<i64>,
    #[serde(rename = "compressedLats")]
    compressed_lats: Vec<Vec<i64>>,
    #[serde(rename = "compressedLons")]
    compressed_lons: Vec<Vec<i64>>,
    #[serde(rename = "directionDegrees")]
    direction_degrees: Vec<Option<i64>>,
}

#[derive(Debug, Serialize)]
struct StateJsonV1 {
    vehicles: VehiclesV1,
    timestamp: i64,
    #[serde(rename = "latestStaticKey")]
    latest_static_key: Option<String>,
}

pub fn encode_v1(state: &RealtimeState) -> Result<String, serde_json::Error> {
    let fresh: Vec<&Vehicle> = state.fresh_vehicles().map(|(_, v)| v).collect();

    let route_ids = fresh.iter().map(|v| v.route_id).collect();
    let shape_ids = fresh.iter().map(|v| v.shape_id.clone()).collect();
    let timestamps = fresh.iter().map(|v| state.timestamp - v.timestamp).collect();
    let direction_degrees = fresh.iter().map(|v| direction_degrees(v.direction_radians)).collect();

    let compressed_lats = fresh
        .iter()
        .map(|v| {
            let newest_first: Vec<f64> = v.lat.iter().take(TRAJECTORY_OUTPUT_LENGTH).copied().collect();
            compress_coords(REF_LAT, &newest_first)
        })
        .collect();
    let compressed_lons = fresh
        .iter()
        .map(|v| {
            let newest_first: Vec<f64> = v.lon.iter().take(TRAJECTORY_OUTPUT_LENGTH).copied().collect();
            compress_coords(REF_LON, &newest_first)
        })
        .collect();

    let payload = StateJsonV1 {
        vehicles: VehiclesV1 {
            route_ids,
            shape_ids,
            timestamps,
            compressed_lats,
            compressed_lons,
            direction_degrees,
        },
        timestamp: state.timestamp,
        latest_static_key: state.latest_static_key.clone(),
    };
    serde_json::to_string(&payload)
}

/// The gateway keeps only the latest encoded pair (spec §4.9).
#[derive(Debug, Clone)]
pub struct EncodedPair {
    pub v0: String,
    pub v1: String,
}

impl EncodedPair {
    pub fn from_state(state: &RealtimeState) -> Result<Self, serde_json::Error> {
        Ok(EncodedPair {
            v0: encode_v0(state)?,
            v1: encode_v1(state)?,
        })
    }

    pub fn for_version(&self, version: u8) -> &str {
        match version {
            0 => &self.v0,
            _ => &self.v1,
        }
    }
}
