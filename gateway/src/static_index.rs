//! Gateway-side static snapshot parsing (spec §4.7, §3): a narrow parse of
//! `trips.txt` and `shapes.txt` building a `trip_id → shape_id` map and an
//! ordered polyline per shape. Grounded on the teacher's CSV header-index
//! idiom and zip-open pattern
//! (`providers/timetables/gtfs/static_data.rs`), narrowed to the two
//! tables this system needs — no IFOPT matching, no download/cache layer,
//! since the gateway receives already-fetched snapshots over the push
//! channel.

use std::collections::HashMap;
use std::io::Read;

use crate::error::GatewayError;

pub type TripId = String;
pub type ShapeId = String;

#[derive(Debug, Clone, Default)]
pub struct Shape {
    pub id: ShapeId,
    /// Ordered by `shape_pt_sequence` ascending.
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    pub trip_to_shape: HashMap<TripId, ShapeId>,
    pub shapes: HashMap<ShapeId, Shape>,
}

impl StaticIndex {
    pub fn from_gzipped_zip(gzipped: &[u8]) -> Result<Self, GatewayError> {
        let raw = transit_core::gzip::decompress(gzipped)?;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(raw))?;

        let trip_to_shape = parse_trips(&mut archive)?;
        let shapes = parse_shapes(&mut archive)?;

        Ok(StaticIndex { trip_to_shape, shapes })
    }
}

fn read_entry(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>, name: &str) -> Result<String, GatewayError> {
    let mut file = archive.by_name(name)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

fn parse_trips(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>) -> Result<HashMap<TripId, ShapeId>, GatewayError> {
    let contents = read_entry(archive, "trips.txt")?;
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let headers = reader.headers()?.clone();
    let trip_id_idx = transit_core::csv_util::header_index(&headers, "trip_id")
        .ok_or_else(|| GatewayError::ParseError("trips.txt missing trip_id column".into()))?;
    let shape_id_idx = transit_core::csv_util::header_index(&headers, "shape_id")
        .ok_or_else(|| GatewayError::ParseError("trips.txt missing shape_id column".into()))?;

    let mut trip_to_shape = HashMap::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed trips.txt row");
                continue;
            }
        };
        let (Some(trip_id), Some(shape_id)) = (record.get(trip_id_idx), record.get(shape_id_idx)) else {
            continue;
        };
        trip_to_shape.insert(trip_id.to_string(), shape_id.to_string());
    }
    Ok(trip_to_shape)
}

fn parse_shapes(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>) -> Result<HashMap<ShapeId, Shape>, GatewayError> {
    let contents = read_entry(archive, "shapes.txt")?;
    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let headers = reader.headers()?.clone();
    let shape_id_idx = transit_core::csv_util::header_index(&headers, "shape_id")
        .ok_or_else(|| GatewayError::ParseError("shapes.txt missing shape_id column".into()))?;
    let lat_idx = transit_core::csv_util::header_index(&headers, "shape_pt_lat")
        .ok_or_else(|| GatewayError::ParseError("shapes.txt missing shape_pt_lat column".into()))?;
    let lon_idx = transit_core::csv_util::header_index(&headers, "shape_pt_lon")
        .ok_or_else(|| GatewayError::ParseError("shapes.txt missing shape_pt_lon column".into()))?;
    let seq_idx = transit_core::csv_util::header_index(&headers, "shape_pt_sequence")
        .ok_or_else(|| GatewayError::ParseError("shapes.txt missing shape_pt_sequence column".into()))?;

    // The shape points do not necessarily arrive in sequence order; collect
    // then sort by shape_pt_sequence per shape (spec §3, Design Note
    // "Partial-failure on CSV parse": a malformed row is skipped, not fatal).
    let mut unsorted: HashMap<ShapeId, Vec<(f64, f64, i64)>> = HashMap::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed shapes.txt row");
                continue;
            }
        };
        let parsed = (|| -> Option<(String, f64, f64, i64)> {
            let shape_id = record.get(shape_id_idx)?.to_string();
            let lat: f64 = record.get(lat_idx)?.parse().ok()?;
            let lon: f64 = record.get(lon_idx)?.parse().ok()?;
            let seq: i64 = record.get(seq_idx)?.parse().ok()?;
            Some((shape_id, lat, lon, seq))
        })();
        let Some((shape_id, lat, lon, seq)) = parsed else {
            tracing::warn!("skipping shapes.txt row with unparseable coordinate or sequence");
            continue;
        };
        unsorted.entry(shape_id).or_default().push((lat, lon, seq));
    }

    let mut shapes = HashMap::new();
    for (shape_id, mut points) in unsorted {
        points.sort_by_key(|(_, _, seq)| *seq);
        shapes.insert(
            shape_id.clone(),
            Shape {
                id: shape_id,
                lats: points.iter().map(|(lat, _, _)| *lat).collect(),
                lons: points.iter().map(|(_, lon, _)| *lon).collect(),
            },
        );
    }
    Ok(shapes)
}

/// Gateway's bounded history entry (spec §3, §4.10): a static index plus its
/// cache-addressable key and the pre-formatted JSON served at
/// `GET /static/<key>`.
#[derive(Debug, Clone)]
pub struct StaticSnapshotRecord {
    pub key: String,
    pub index: StaticIndex,
    pub preformatted_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_gzipped_zip(trips_csv: &str, shapes_csv: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = SimpleFileOptions::default();
            writer.start_file("trips.txt", opts).unwrap();
            writer.write_all(trips_csv.as_bytes()).unwrap();
            writer.start_file("shapes.txt", opts).unwrap();
            writer.write_all(shapes_csv.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        transit_core::gzip::compress(&buf).unwrap()
    }

    #[test]
    fn parses_trip_to_shape_mapping() {
        let gzipped = build_gzipped_zip(
            "trip_id,shape_id\nT1,S1\nT2,S2\n",
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n",
        );
        let index = StaticIndex::from_gzipped_zip(&gzipped).unwrap();
        assert_eq!(index.trip_to_shape.get("T1"), Some(&"S1".to_string()));
        assert_eq!(index.trip_to_shape.get("T2"), Some(&"S2".to_string()));
    }

    #[test]
    fn shape_points_sorted_by_sequence_regardless_of_row_order() {
        let gzipped = build_gzipped_zip(
            "trip_id,shape_id\n",
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
             S1,45.2,16.2,2\nS1,45.1,16.1,1\nS1,45.3,16.3,3\n",
        );
        let index = StaticIndex::from_gzipped_zip(&gzipped).unwrap();
        let shape = &index.shapes["S1"];
        assert_eq!(shape.lats, vec![45.1, 45.2, 45.3]);
        assert_eq!(shape.lons, vec![16.1, 16.2, 16.3]);
    }

    #[test]
    fn malformed_shape_row_is_skipped_not_fatal() {
        let gzipped = build_gzipped_zip(
            "trip_id,shape_id\n",
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
             S1,not-a-float,16.1,1\nS1,45.2,16.2,2\n",
        );
        let index = StaticIndex::from_gzipped_zip(&gzipped).unwrap();
        let shape = &index.shapes["S1"];
        assert_eq!(shape.lats, vec![45.2]);
    }
}
