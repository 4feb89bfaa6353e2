//! Vehicle world model (spec §3, §4.8): trajectory tails, heading, and
//! staleness eviction for every currently-tracked vehicle. Grounded on the
//! original Python `Vehicle`/`RealtimeState`
//! (`original_source/zet/webserver/webserver.py`), translated from mutable
//! Python lists to a bounded `VecDeque` ring buffer per the "mutable lists
//! as trajectory tails" design note.

use std::collections::{HashMap, VecDeque};

use transit_core::geo::{bearing, haversine_distance_meters};
use transit_core::gtfs_rt::FeedMessage;

use crate::static_index::StaticSnapshotRecord;

pub const MAX_TRAJECTORY_LENGTH: usize = 30;
pub const TRAJECTORY_OUTPUT_LENGTH: usize = 6;
const DIRECTION_THRESHOLD_METERS: f64 = 20.0;
const EVICT_AFTER_MISSES: u32 = 30;

pub type TripId = String;

#[derive(Debug, Clone)]
pub struct ParsedVehicle {
    pub route_id: i64,
    pub trip_id: TripId,
    pub timestamp: i64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub vehicles: Vec<ParsedVehicle>,
    pub timestamp: i64,
}

impl ParsedFeed {
    /// Extract every well-formed vehicle entity from a decoded feed. Entries
    /// missing a required field are dropped with a log, per spec §4.8.
    pub fn from_feed(feed: &FeedMessage) -> Self {
        let timestamp = feed.header.timestamp.map(|t| t as i64).unwrap_or(0);
        let mut vehicles = Vec::new();
        for entity in &feed.entity {
            let Some(vp) = entity.vehicle.as_ref() else {
                continue;
            };
            match parse_vehicle(vp) {
                Some(v) => vehicles.push(v),
                None => tracing::warn!(entity_id = %entity.id, "dropping vehicle entity missing a required field"),
            }
        }
        ParsedFeed { vehicles, timestamp }
    }
}

fn parse_vehicle(vp: &gtfs_realtime::VehiclePosition) -> Option<ParsedVehicle> {
    let trip = vp.trip.as_ref()?;
    let route_id: i64 = trip.route_id.as_ref()?.parse().ok()?;
    let trip_id = trip.trip_id.clone()?;
    let timestamp = vp.timestamp? as i64;
    let position = vp.position.as_ref()?;
    Some(ParsedVehicle {
        route_id,
        trip_id,
        timestamp,
        lat: position.latitude as f64,
        lon: position.longitude as f64,
    })
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub route_id: i64,
    pub shape_id: Option<String>,
    pub timestamp: i64,
    /// Front = most recent position.
    pub lat: VecDeque<f64>,
    pub lon: VecDeque<f64>,
    pub direction_radians: Option<f64>,
    pub no_update_counter: u32,
}

impl Vehicle {
    fn new(route_id: i64, shape_id: Option<String>) -> Self {
        Self {
            route_id,
            shape_id,
            timestamp: 0,
            lat: VecDeque::new(),
            lon: VecDeque::new(),
            direction_radians: None,
            no_update_counter: 0,
        }
    }

    fn apply_update(&mut self, parsed: &ParsedVehicle, shape_id_hint: Option<&String>) {
        self.lat.push_front(parsed.lat);
        self.lon.push_front(parsed.lon);
        if self.lat.len() > MAX_TRAJECTORY_LENGTH {
            self.lat.pop_back();
            self.lon.pop_back();
        }
        self.timestamp = parsed.timestamp;
        self.no_update_counter = 0;
        self.direction_radians = compute_direction(&self.lat, &self.lon);

        if self.shape_id.is_none() {
            if let Some(shape_id) = shape_id_hint {
                self.shape_id = Some(shape_id.clone());
            }
        }
    }

}

/// Heading (spec §4.8.1): scan from newest to oldest, return the bearing to
/// the first point farther than `DIRECTION_THRESHOLD_METERS` from the
/// newest position. `None` if every past point is within that radius.
fn compute_direction(lat: &VecDeque<f64>, lon: &VecDeque<f64>) -> Option<f64> {
    if lat.len() < 2 {
        return None;
    }
    let (newest_lat, newest_lon) = (lat[0], lon[0]);
    for i in 1..lat.len() {
        let dist = haversine_distance_meters(newest_lat, newest_lon, lat[i], lon[i]);
        if dist > DIRECTION_THRESHOLD_METERS {
            return Some(bearing(lat[i], lon[i], newest_lat, newest_lon));
        }
    }
    None
}

#[derive(Debug, Default)]
pub struct RealtimeState {
    pub vehicles: HashMap<TripId, Vehicle>,
    pub timestamp: i64,
    pub latest_static_key: Option<String>,
}

impl RealtimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one realtime feed under a single exclusive critical section
    /// (spec §4.8). `latest_static` is the most recently ingested static
    /// snapshot, if any.
    pub fn ingest(&mut self, feed: ParsedFeed, latest_static: Option<&StaticSnapshotRecord>) {
        for vehicle in self.vehicles.values_mut() {
            vehicle.no_update_counter += 1;
        }

        for parsed in &feed.vehicles {
            let shape_id_hint = latest_static.and_then(|s| s.index.trip_to_shape.get(&parsed.trip_id));
            let vehicle = self.vehicles.entry(parsed.trip_id.clone()).or_insert_with(|| {
                Vehicle::new(parsed.route_id, shape_id_hint.cloned())
            });
            vehicle.apply_update(parsed, shape_id_hint);
        }

        self.vehicles.retain(|_, v| v.no_update_counter < EVICT_AFTER_MISSES);

        self.timestamp = feed.timestamp;
        self.latest_static_key = latest_static.map(|s| s.key.clone());
    }

    pub fn fresh_vehicles(&self) -> impl Iterator<Item = (&TripId, &Vehicle)> {
        self.vehicles.iter().filter(|(_, v)| v.no_update_counter == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(vehicles: Vec<ParsedVehicle>, timestamp: i64) -> ParsedFeed {
        ParsedFeed { vehicles, timestamp }
    }

    fn pv(trip_id: &str, route_id: i64, ts: i64, lat: f64, lon: f64) -> ParsedVehicle {
        ParsedVehicle {
            route_id,
            trip_id: trip_id.to_string(),
            timestamp: ts,
            lat,
            lon,
        }
    }

    #[test]
    fn new_vehicle_has_no_heading_until_second_point() {
        let mut state = RealtimeState::new();
        state.ingest(feed(vec![pv("t1", 5, 100, 45.8, 16.0)], 100), None);
        let v = &state.vehicles["t1"];
        assert_eq!(v.lat.len(), 1);
        assert_eq!(v.direction_radians, None);
    }

    #[test]
    fn heading_threshold_skips_nearby_point() {
        let mut state = RealtimeState::new();
        state.ingest(feed(vec![pv("t1", 5, 1, 45.800, 16.000)], 1), None);
        state.ingest(feed(vec![pv("t1", 5, 2, 45.80001, 16.00001)], 2), None);
        // Second point is < 20m from the first; no heading yet.
        assert_eq!(state.vehicles["t1"].direction_radians, None);

        state.ingest(feed(vec![pv("t1", 5, 3, 45.80050, 16.00050)], 3), None);
        assert!(state.vehicles["t1"].direction_radians.is_some());
    }

    #[test]
    fn eviction_after_thirty_consecutive_misses() {
        let mut state = RealtimeState::new();
        state.ingest(feed(vec![pv("t1", 5, 0, 45.8, 16.0)], 0), None);
        for i in 1..30 {
            state.ingest(feed(vec![], i), None);
            assert!(state.vehicles.contains_key("t1"), "evicted too early at {i}");
        }
        state.ingest(feed(vec![], 30), None);
        assert!(!state.vehicles.contains_key("t1"));
    }

    #[test]
    fn trajectory_tail_caps_at_max_length_newest_first() {
        let mut state = RealtimeState::new();
        for i in 0..(MAX_TRAJECTORY_LENGTH + 5) {
            state.ingest(feed(vec![pv("t1", 5, i as i64, 45.8 + i as f64 * 0.001, 16.0)], i as i64), None);
        }
        let v = &state.vehicles["t1"];
        assert_eq!(v.lat.len(), MAX_TRAJECTORY_LENGTH);
        // Front is the most recently appended (largest lat).
        assert!(v.lat[0] > v.lat[1]);
    }

    #[test]
    fn fresh_vehicles_excludes_stale_ones() {
        let mut state = RealtimeState::new();
        state.ingest(feed(vec![pv("t1", 5, 0, 45.8, 16.0), pv("t2", 6, 0, 45.9, 16.1)], 0), None);
        state.ingest(feed(vec![pv("t1", 5, 1, 45.801, 16.0)], 1), None);
        let fresh: Vec<&TripId> = state.fresh_vehicles().map(|(id, _)| id).collect();
        assert_eq!(fresh, vec!["t1"]);
    }
}
