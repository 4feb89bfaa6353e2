//! Realtime snapshot processor (spec §4.3): gzip the raw bytes, attempt a
//! protobuf decode to recover the feed-declared timestamp, but always
//! return a snapshot carrying the raw/gzipped bytes even on decode
//! failure so the archive never loses data.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use transit_core::{gtfs_rt, gzip};

#[derive(Debug, Clone)]
pub struct RealtimeSnapshot {
    pub raw_bytes: Bytes,
    pub gzipped_bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
    pub snapshot_at: i64,
}

impl RealtimeSnapshot {
    pub fn is_valid(&self) -> bool {
        self.snapshot_at > 0
    }
}

pub fn process_gtfs(raw_data: Bytes, fetched_at: DateTime<Utc>) -> RealtimeSnapshot {
    let gzipped_data = match gzip::compress(&raw_data) {
        Ok(g) => Bytes::from(g),
        Err(e) => {
            tracing::error!(error = %e, "failed to gzip realtime payload");
            Bytes::new()
        }
    };

    let snapshot_at = match gtfs_rt::decode_feed(&raw_data) {
        Ok(feed) => gtfs_rt::header_timestamp(&feed),
        Err(e) => {
            tracing::error!(error = %e, "error parsing GTFS-RT data");
            0
        }
    };

    RealtimeSnapshot {
        raw_bytes: raw_data,
        gzipped_bytes: gzipped_data,
        fetched_at,
        snapshot_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_realtime::{FeedHeader, FeedMessage};
    use prost::Message;

    fn feed_bytes(timestamp: Option<u64>) -> Bytes {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: Some(0),
                timestamp,
                feed_version: None,
            },
            entity: Vec::new(),
        };
        Bytes::from(feed.encode_to_vec())
    }

    #[test]
    fn valid_feed_extracts_timestamp() {
        let snapshot = process_gtfs(feed_bytes(Some(1_700_000_000)), Utc::now());
        assert_eq!(snapshot.snapshot_at, 1_700_000_000);
        assert!(snapshot.is_valid());
        assert!(!snapshot.gzipped_bytes.is_empty());
    }

    #[test]
    fn garbage_bytes_yield_invalid_snapshot_but_keep_raw() {
        let raw = Bytes::from_static(b"not a protobuf feed");
        let snapshot = process_gtfs(raw.clone(), Utc::now());
        assert_eq!(snapshot.snapshot_at, 0);
        assert!(!snapshot.is_valid());
        assert_eq!(snapshot.raw_bytes, raw);
    }

    #[test]
    fn missing_header_timestamp_is_invalid() {
        let snapshot = process_gtfs(feed_bytes(None), Utc::now());
        assert_eq!(snapshot.snapshot_at, 0);
        assert!(!snapshot.is_valid());
    }
}
